//! Processor architectures that the patch engine can emit code for.
//!
//! Only 32-bit ARM (A32, little-endian) is implemented. The architecture
//! module is responsible for three things:
//!
//!  * A typed representation of the instructions the engine emits or needs to
//!    recognise in existing code.
//!  * Encoding those instructions at a given address. Branches on ARM are
//!    PC-relative, so the same instruction encodes differently depending on
//!    where it is placed.
//!  * Rendering instruction words back to text, for diagnostics.

pub mod aarch32;
