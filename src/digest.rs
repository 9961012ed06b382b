//! Content hashing shared by the symbol cache and the deployment script.

use md5::{Digest, Md5};
use std::path::Path;
use std::{fs, io};

/// Lowercase hex MD5 of a byte slice, as printed by `md5sum`.
pub fn md5_hex(data: &[u8]) -> String {
    hex::encode(Md5::digest(data))
}

/// Lowercase hex MD5 of a file's contents.
pub fn md5_file_hex(path: &Path) -> io::Result<String> {
    let mut file = fs::File::open(path)?;
    let mut hasher = Md5::new();
    io::copy(&mut file, &mut hasher)?;

    Ok(hex::encode(hasher.finalize()))
}
