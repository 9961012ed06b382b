//! Self-verifying shell scripts that apply a diff on the device.

use crate::diff::{diff_images, merge_runs, DiffRun};
use crate::digest::md5_hex;
use crate::error::Result;
use base64::{engine::general_purpose, Engine as _};
use std::fmt;
use std::fs;
use std::path::Path;

/// What applying a deployment script to a file did.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum ApplyOutcome {
    /// The file already has the patched contents; it was left alone.
    AlreadyPatched,

    /// The file had the original contents and was patched.
    Patched,

    /// The file matched neither; it was left alone.
    Refused,
}

/// Everything needed to turn one known file into its patched version.
#[derive(Clone, Debug)]
pub struct DeploymentScript {
    before_md5: String,
    after_md5: String,
    runs: Vec<DiffRun>,
}

impl DeploymentScript {
    pub fn compile(before: &[u8], after: &[u8]) -> Result<Self> {
        let runs = merge_runs(&diff_images(before, after)?);

        Ok(DeploymentScript {
            before_md5: md5_hex(before),
            after_md5: md5_hex(after),
            runs,
        })
    }

    pub fn compile_files(before: &Path, after: &Path) -> Result<Self> {
        Self::compile(&fs::read(before)?, &fs::read(after)?)
    }

    pub fn before_md5(&self) -> &str {
        &self.before_md5
    }

    pub fn after_md5(&self) -> &str {
        &self.after_md5
    }

    pub fn runs(&self) -> &[DiffRun] {
        &self.runs
    }

    /// Every run's new bytes, concatenated in offset order.
    pub fn payload(&self) -> Vec<u8> {
        self.runs.iter().flat_map(|run| run.payload.iter().copied()).collect()
    }

    /// Apply the script to `target` in memory, with the same checks as the
    /// shell rendition.
    pub fn apply(&self, target: &mut [u8]) -> ApplyOutcome {
        let md5 = md5_hex(target);

        if md5 == self.after_md5 {
            return ApplyOutcome::AlreadyPatched;
        }
        if md5 != self.before_md5 || self.runs.iter().any(|run| run.end() > target.len()) {
            return ApplyOutcome::Refused;
        }

        for run in self.runs.iter() {
            target[run.offset..run.end()].copy_from_slice(&run.payload);
        }

        ApplyOutcome::Patched
    }

    /// Render as a POSIX shell script taking the target path as `$1`.
    pub fn render(&self) -> String {
        self.to_string()
    }

    /// Save the rendered script as an executable file.
    pub fn write(&self, path: &Path) -> Result<()> {
        fs::write(path, self.render())?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(path, fs::Permissions::from_mode(0o755))?;
        }

        Ok(())
    }
}

impl fmt::Display for DeploymentScript {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "#!/bin/sh")?;
        writeln!(f)?;
        writeln!(f, "# This script was automatically generated, don't modify it directly")?;
        writeln!(f, "# Before MD5: {}", self.before_md5)?;
        writeln!(f, "# After MD5: {}", self.after_md5)?;
        writeln!(f)?;
        writeln!(f, "TARGET=$1")?;
        writeln!(f)?;
        writeln!(f, "MD5=$(md5sum \"$TARGET\" | awk '{{print $1}}')")?;
        writeln!(f, "if [ \"$MD5\" = \"{}\" ]; then", self.after_md5)?;
        writeln!(f, "    echo \"$TARGET is already patched, skipping...\"")?;
        writeln!(f, "    exit 0")?;
        writeln!(f, "fi")?;
        writeln!(f, "if [ \"$MD5\" != \"{}\" ]; then", self.before_md5)?;
        writeln!(f, "    echo \"$TARGET hash does not match, skipping patch...\"")?;
        writeln!(f, "    exit 1")?;
        writeln!(f, "fi")?;
        writeln!(f)?;
        writeln!(f, "PATCH_FILE=$(mktemp) || exit 1")?;
        writeln!(f, "trap 'rm -f \"$PATCH_FILE\"' EXIT")?;
        writeln!(
            f,
            "echo '{}' | base64 -d > \"$PATCH_FILE\"",
            general_purpose::STANDARD.encode(self.payload())
        )?;
        writeln!(f)?;

        let mut skip = 0;
        for run in self.runs.iter() {
            writeln!(
                f,
                "dd if=\"$PATCH_FILE\" skip={} ibs=1 of=\"$TARGET\" seek={} obs=1 count={} conv=notrunc 2> /dev/null || exit 1 # 0x{:x} > {}",
                skip,
                run.offset,
                run.len(),
                run.offset,
                hex::encode(&run.payload)
            )?;
            skip += run.len();
        }

        writeln!(f)?;
        writeln!(f, "echo \"$TARGET patched\"")
    }
}
