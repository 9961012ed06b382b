//! CLI commands

mod build;
mod common;
mod diff;
mod main;
mod symbols;

pub use build::build;
pub use common::Command;
pub use diff::diff;
pub use main::main;
pub use symbols::symbols;
