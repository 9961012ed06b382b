//! Byte-level differences between an original and a patched executable.
//!
//! Patching never changes the size of a file, so a difference is fully
//! described by the offsets whose bytes changed. Consecutive offsets are
//! merged into runs, which become the unit of deployment.

mod script;

pub use script::{ApplyOutcome, DeploymentScript};

use crate::error::{Error, Result};

/// One byte that differs between two images.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct ByteDiff {
    pub offset: usize,
    pub before: u8,
    pub after: u8,
}

/// A maximal range of consecutive changed bytes, with their new values.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct DiffRun {
    pub offset: usize,
    pub payload: Vec<u8>,
}

impl DiffRun {
    pub fn len(&self) -> usize {
        self.payload.len()
    }

    /// Offset just past the last byte of the run.
    pub fn end(&self) -> usize {
        self.offset + self.payload.len()
    }
}

/// List every differing byte, in ascending offset order.
pub fn diff_images(before: &[u8], after: &[u8]) -> Result<Vec<ByteDiff>> {
    if before.len() != after.len() {
        return Err(Error::SizeMismatch {
            before: before.len(),
            after: after.len(),
        });
    }

    Ok(before
        .iter()
        .zip(after.iter())
        .enumerate()
        .filter(|(_, (b, a))| b != a)
        .map(|(offset, (&before, &after))| ByteDiff {
            offset,
            before,
            after,
        })
        .collect())
}

/// Merge an ascending list of differences into maximal runs.
pub fn merge_runs(diff: &[ByteDiff]) -> Vec<DiffRun> {
    let mut runs: Vec<DiffRun> = Vec::new();

    for byte in diff {
        match runs.last_mut() {
            Some(run) if run.end() == byte.offset => run.payload.push(byte.after),
            _ => runs.push(DiffRun {
                offset: byte.offset,
                payload: vec![byte.after],
            }),
        }
    }

    runs
}
