//! On-disk memoization of recovered runtime function tables.
//!
//! Walking a large Go binary's table takes a while, so results are kept in a
//! JSON file next to the binary named after the MD5 of its contents. A
//! changed binary hashes differently and simply misses the cache.

use crate::digest::md5_file_hex;
use crate::error::Result;
use crate::image::Image;
use crate::runtime::{read_function_table, RuntimeFunctionTable};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

fn directory_of(path: &Path) -> &Path {
    match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    }
}

/// Location of the cache file for the binary at `source`.
pub fn cache_path(source: &Path) -> io::Result<PathBuf> {
    let hash = md5_file_hex(source)?;

    Ok(directory_of(source).join(format!("cache_{}.json", hash)))
}

fn load(path: &Path) -> Option<RuntimeFunctionTable> {
    let file = match fs::File::open(path) {
        Ok(file) => file,
        Err(ref e) if e.kind() == io::ErrorKind::NotFound => return None,
        Err(e) => {
            warn!("Cannot open symbol cache {}: {}", path.display(), e);
            return None;
        }
    };

    match serde_json::from_reader(io::BufReader::new(file)) {
        Ok(table) => Some(table),
        Err(e) => {
            warn!("Ignoring unreadable symbol cache {}: {}", path.display(), e);
            None
        }
    }
}

/// Write the table next to its final location, then move it into place, so
/// that an interrupted write never leaves a truncated cache behind.
fn store(path: &Path, table: &RuntimeFunctionTable) -> Result<()> {
    let mut temp = NamedTempFile::new_in(directory_of(path))?;

    serde_json::to_writer(&mut temp, table)?;
    temp.flush()?;
    temp.persist(path).map_err(|e| e.error)?;

    Ok(())
}

/// Recover the runtime function table of the binary at `source`, which has
/// been loaded into `image`, consulting the cache first.
pub fn cached_function_table<I: Image>(image: &I, source: &Path) -> Result<RuntimeFunctionTable> {
    let path = cache_path(source)?;

    if let Some(table) = load(&path) {
        debug!("Using cached runtime table {}", path.display());
        return Ok(table);
    }

    let table = read_function_table(image)?;
    store(&path, &table)?;
    info!(
        "Recovered {} runtime functions, cached in {}",
        table.len(),
        path.display()
    );

    Ok(table)
}
