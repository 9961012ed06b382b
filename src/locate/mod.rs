//! Locating where, inside a vendor UI binary, new control flow is spliced in.
//!
//! The jump and return addresses of each firmware build are known ahead of
//! time (see `targets`). What is discovered per binary is how to get hold of
//! the `MainWindow` receiver at the jump point, and whether the callback was
//! compiled with a frame we can return into.

mod site;
mod targets;

pub use site::{locate_call_site, CallSite, STATUS_BAR_LANDMARK};
pub use targets::{lookup_target, supported_targets, validate_targets, Model, PatchTarget, WAIT_HANDLER};
