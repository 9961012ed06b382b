//! Error type for patch construction and deployment script generation

use crate::arch::aarch32::PtrVal;
use std::{io, result};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// The runtime function table is missing, truncated, or points outside of
    /// the image.
    #[error("malformed runtime function table: {reason}")]
    MalformedRuntimeTable { reason: String },

    /// No offsets are known for this device model and firmware version.
    #[error("unsupported target: model {model}, version {version}")]
    UnsupportedTarget { model: String, version: String },

    /// The per-target offset table failed validation.
    #[error("invalid target table entry for {model} {version}: {reason}")]
    InvalidTargetTable {
        model: String,
        version: String,
        reason: String,
    },

    /// None of the call-site heuristics matched.
    #[error("no patch site found in {symbol} near 0x{address:x}")]
    PatchSiteNotFound { symbol: String, address: PtrVal },

    /// Original and patched images differ in length.
    #[error("image size mismatch: original is {before} bytes, patched is {after} bytes")]
    SizeMismatch { before: usize, after: usize },

    #[error("symbol {0} is not present in the image")]
    MissingSymbol(String),

    #[error("access of {length} bytes at 0x{address:x} is outside of the image")]
    OutOfBounds { address: PtrVal, length: usize },

    /// An instruction operand can't be represented in the A32 encoding.
    #[error("cannot encode `{instruction}` at 0x{address:x}: {reason}")]
    Unencodable {
        instruction: String,
        address: PtrVal,
        reason: &'static str,
    },

    /// Emitted code and data would spill out of the stubbed function.
    #[error("{function} has room for {available} more bytes, {needed} were requested")]
    ScratchExhausted {
        function: String,
        needed: usize,
        available: usize,
    },

    #[error("replacement label {replacement:?} does not fit in the {available} bytes of {original:?}")]
    LabelTooLong {
        original: String,
        replacement: String,
        available: usize,
    },

    #[error("not a usable executable image: {0}")]
    InvalidImage(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("ELF parse error: {0}")]
    Elf(#[from] object::read::Error),
}

impl Error {
    pub fn malformed<S: Into<String>>(reason: S) -> Self {
        Error::MalformedRuntimeTable {
            reason: reason.into(),
        }
    }
}

impl From<Error> for io::Error {
    fn from(err: Error) -> io::Error {
        match err {
            Error::Io(e) => e,
            _ => io::Error::new(io::ErrorKind::Other, format!("{}", err)),
        }
    }
}

pub type Result<T> = result::Result<T, Error>;
