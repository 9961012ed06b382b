//! Firmware binaries as found in the patches directory.
//!
//! Binaries are named `<name>.<MODEL>_<VERSION>`, e.g. `K3SysUi.K3_2.3.9.3`.
//! Everything produced from a binary is named after it with an extra
//! extension, so generated files never look like inputs.

use crate::error::{Error, Result};
use crate::locate::Model;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::{fmt, fs, io};

/// The vendor executables we know how to patch.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum ArtifactKind {
    /// The Qt touchscreen UI.
    SysUi,

    /// The Go API server.
    Api,
}

impl FromStr for ArtifactKind {
    type Err = ();

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "K3SysUi" => Ok(ArtifactKind::SysUi),
            "gkapi" => Ok(ArtifactKind::Api),
            _ => Err(()),
        }
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArtifactKind::SysUi => write!(f, "K3SysUi"),
            ArtifactKind::Api => write!(f, "gkapi"),
        }
    }
}

/// A recognised firmware binary.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PatchEntry {
    path: PathBuf,
    name: String,
    model: String,
    version: String,
}

fn is_model_code(s: &str) -> bool {
    s.len() > 1
        && s.starts_with('K')
        && s.chars().all(|c| c.is_ascii_uppercase() || c.is_ascii_digit())
}

fn is_version(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_digit() || c == '.')
}

impl PatchEntry {
    /// Recognise a firmware binary by its file name.
    pub fn from_path(path: &Path) -> Option<Self> {
        let file_name = path.file_name()?.to_str()?;
        let (name, rest) = file_name.split_once('.')?;
        let (model, version) = rest.split_once('_')?;

        if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric()) {
            return None;
        }
        if !is_model_code(model) || !is_version(version) {
            return None;
        }

        Some(PatchEntry {
            path: path.to_path_buf(),
            name: name.to_string(),
            model: model.to_string(),
            version: version.to_string(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    /// Which executable this is, if it is one we patch.
    pub fn kind(&self) -> Option<ArtifactKind> {
        ArtifactKind::from_str(&self.name).ok()
    }

    /// The device model, failing for model codes we have no support for.
    pub fn model(&self) -> Result<Model> {
        Model::from_str(&self.model).map_err(|_| Error::UnsupportedTarget {
            model: self.model.clone(),
            version: self.version.clone(),
        })
    }

    /// Where the deployment script for this binary is written.
    pub fn script_path(&self) -> PathBuf {
        let mut name = self.path.clone().into_os_string();
        name.push(".sh");

        PathBuf::from(name)
    }
}

impl fmt::Display for PatchEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} for {} {}", self.name, self.model, self.version)
    }
}

/// List every recognised binary in `dir`, ordered by file name.
pub fn scan_patches_dir(dir: &Path) -> io::Result<Vec<PatchEntry>> {
    let mut entries = Vec::new();

    for dirent in fs::read_dir(dir)? {
        let dirent = dirent?;
        if !dirent.file_type()?.is_file() {
            continue;
        }

        if let Some(entry) = PatchEntry::from_path(&dirent.path()) {
            entries.push(entry);
        }
    }

    entries.sort_by(|a, b| a.path.cmp(&b.path));

    Ok(entries)
}
