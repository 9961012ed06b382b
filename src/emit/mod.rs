//! Patch emission: rewriting vendor executables in memory and saving the
//! result next to the original.
//!
//! Every entry point here is idempotent at the file level. If the patched
//! artifact for an input already exists, nothing is read, computed, or
//! written.

mod api;
mod launcher;
mod scratch;
mod tweaks;

pub use api::LanModeOverrides;
pub use launcher::LaunchCommands;

use api::apply_api_patches;
use launcher::{emit_launcher, Helpers};
use scratch::ScratchAllocator;
use tweaks::{replace_labels, stub_status_check, STATUS_CHECK};

use crate::arch::aarch32::{Instruction, PtrVal, INSTRUCTION_SIZE};
use crate::error::Result;
use crate::image::{ExecutableImage, Image};
use crate::locate::{locate_call_site, lookup_target, Model, PatchTarget, STATUS_BAR_LANDMARK};
use crate::runtime::cached_function_table;
use log::Level;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

/// `MainWindow::AcSupportRefresh()`, stubbed out to make room for the
/// launcher.
pub const SCRATCH_FUNCTION: &str = "_ZN10MainWindow16AcSupportRefreshEv";

/// How much of a patched function to list at debug level.
const LISTING_LENGTH: usize = 0x100;

/// What became of one input file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// The patched artifact was written to this path.
    Patched(PathBuf),

    /// The artifact at this path already existed and was left alone.
    Skipped(PathBuf),
}

impl Outcome {
    pub fn artifact(&self) -> &Path {
        match self {
            Outcome::Patched(path) | Outcome::Skipped(path) => path,
        }
    }
}

/// Where the patched copy of `path` is saved.
pub fn artifact_path(path: &Path) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(".patch");

    PathBuf::from(name)
}

fn listing<I: Image>(image: &I, what: &str, address: PtrVal, length: usize) {
    if !log_enabled!(Level::Debug) {
        return;
    }

    match image.disassemble(address, length) {
        Ok(text) => debug!("{} at 0x{:x}:\n{}", what, address, text),
        Err(e) => debug!("{} at 0x{:x} cannot be listed: {}", what, address, e),
    }
}

/// Apply every UI patch for one firmware build to `image`.
pub fn apply_ui_patches<I: Image>(
    image: &mut I,
    model: Model,
    target: &PatchTarget,
    commands: &LaunchCommands,
) -> Result<()> {
    let callback = image.require_symbol(target.callback)?;
    let landmark = image.resolve_symbol(STATUS_BAR_LANDMARK);
    let site = locate_call_site(&*image, target, callback, landmark)?;
    let helpers = Helpers::resolve(&*image, model)?;

    let mut scratch = ScratchAllocator::after_stub(image, SCRATCH_FUNCTION)?;
    let start = emit_launcher(image, &mut scratch, &site, target, &helpers, commands)?;
    debug!("{} bytes left in {}", scratch.remaining(), SCRATCH_FUNCTION);

    image.assemble(
        site.site.target_address,
        &Instruction::branch_if(site.site.operand, start),
    )?;

    let status_check = stub_status_check(image)?;
    replace_labels(image)?;

    listing(&*image, SCRATCH_FUNCTION, scratch.start(), scratch.used());
    listing(&*image, target.callback, callback, LISTING_LENGTH);
    if let Some(check) = status_check {
        listing(&*image, STATUS_CHECK, check, 2 * INSTRUCTION_SIZE as usize);
    }

    Ok(())
}

/// Patch the vendor UI executable at `path`, built for `model` at firmware
/// `version`.
pub fn patch_ui_file(path: &Path, model: Model, version: &str, commands: &LaunchCommands) -> Result<Outcome> {
    let artifact = artifact_path(path);
    if artifact.exists() {
        info!("{} already exists, skipping", artifact.display());
        return Ok(Outcome::Skipped(artifact));
    }

    let target = lookup_target(model, version)?;
    let mut image = ExecutableImage::open(path)?;

    apply_ui_patches(&mut image, model, target, commands)?;
    image.save(&artifact)?;

    info!("Patched {} {} UI into {}", model, version, artifact.display());

    Ok(Outcome::Patched(artifact))
}

/// Patch the vendor API server executable at `path`.
pub fn patch_api_file(path: &Path, model: Model, version: &str, overrides: &LanModeOverrides) -> Result<Outcome> {
    let artifact = artifact_path(path);
    if artifact.exists() {
        info!("{} already exists, skipping", artifact.display());
        return Ok(Outcome::Skipped(artifact));
    }

    let mut image = ExecutableImage::open(path)?;
    let table = cached_function_table(&image, path)?;

    apply_api_patches(&mut image, &table, overrides)?;
    image.save(&artifact)?;

    info!("Patched {} {} API server into {}", model, version, artifact.display());

    Ok(Outcome::Patched(artifact))
}

#[cfg(test)]
mod tests;
