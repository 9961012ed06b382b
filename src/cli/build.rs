//! Patch a whole directory of firmware binaries.

use crate::diff::{ApplyOutcome, DeploymentScript};
use crate::emit::{patch_api_file, patch_ui_file, Outcome};
use crate::error::{Error, Result};
use crate::project::{scan_patches_dir, ArtifactKind, PatchEntry, Settings};
use std::path::Path;
use std::{fs, io};

/// Compile the deployment script for a patched binary, and rehearse it
/// against the original before trusting it.
fn compile_script(original: &Path, artifact: &Path) -> Result<DeploymentScript> {
    let before = fs::read(original)?;
    let after = fs::read(artifact)?;
    let script = DeploymentScript::compile(&before, &after)?;

    let mut rehearsal = before;
    let outcome = script.apply(&mut rehearsal);
    if outcome == ApplyOutcome::Refused || rehearsal != after {
        return Err(Error::InvalidImage(format!(
            "deployment script for {} does not reproduce {}",
            original.display(),
            artifact.display()
        )));
    }

    Ok(script)
}

fn build_entry(entry: &PatchEntry, kind: ArtifactKind, settings: &Settings) -> Result<()> {
    let model = entry.model()?;

    let outcome = match kind {
        ArtifactKind::SysUi => {
            patch_ui_file(entry.path(), model, entry.version(), settings.commands_for(model))?
        }
        ArtifactKind::Api => {
            patch_api_file(entry.path(), model, entry.version(), settings.lan_mode_overrides())?
        }
    };

    let script = compile_script(entry.path(), outcome.artifact())?;
    let script_path = entry.script_path();
    script.write(&script_path)?;

    match outcome {
        Outcome::Patched(_) => info!(
            "Wrote {} ({} runs, {} -> {})",
            script_path.display(),
            script.runs().len(),
            script.before_md5(),
            script.after_md5()
        ),
        Outcome::Skipped(_) => debug!("Refreshed {} for {}", script_path.display(), script.after_md5()),
    }

    Ok(())
}

pub fn build(settings: &Settings) -> io::Result<()> {
    let dir = settings.patches_dir();
    let entries = scan_patches_dir(dir)?;

    info!("Found {} firmware binaries in {}", entries.len(), dir.display());

    let mut failed = 0;
    for entry in entries.iter() {
        let kind = match entry.kind() {
            Some(kind) => kind,
            None => {
                debug!("Nothing to patch in {}", entry.path().display());
                continue;
            }
        };

        info!("Processing {}", entry);

        if let Err(e) = build_entry(entry, kind, settings) {
            error!("{}: {}", entry, e);
            failed += 1;
        }
    }

    if failed > 0 {
        return Err(io::Error::new(
            io::ErrorKind::Other,
            format!("{} of {} firmware binaries could not be patched", failed, entries.len()),
        ));
    }

    Ok(())
}
