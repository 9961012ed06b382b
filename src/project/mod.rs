//! Patch directory layout and configuration

mod entry;
mod settings;

pub use entry::{scan_patches_dir, ArtifactKind, PatchEntry};
pub use settings::Settings;
