//! Recovery of function names from the Go runtime's PC line table.
//!
//! Go executables carry a `.gopclntab` section describing every compiled
//! function so that the runtime can produce stack traces. It survives
//! stripping, which makes it the only reliable source of names for the
//! vendor's Go binaries.
//!
//! The table begins with a fixed header of little-endian words:
//!
//! | offset | contents                                  |
//! |--------|-------------------------------------------|
//! | `+8`   | number of functions                       |
//! | `+16`  | text start; function addresses are based here |
//! | `+20`  | offset of the function name blob          |
//! | `+36`  | offset of the function table              |
//!
//! Each function table entry is a pair of words: the function's offset from
//! the text start, and the offset of its descriptor from the start of the
//! function table. The descriptor's second word is the offset of the
//! function's NUL-terminated name within the name blob.

mod cache;

pub use cache::cached_function_table;

use crate::arch::aarch32::PtrVal;
use crate::error::{Error, Result};
use crate::image::Image;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;

/// Name of the section holding the runtime's PC line table.
pub const RUNTIME_TABLE_SECTION: &str = ".gopclntab";

const FUNCTION_COUNT: PtrVal = 8;
const TEXT_START: PtrVal = 16;
const NAME_TABLE: PtrVal = 20;
const FUNCTION_TABLE: PtrVal = 36;

const FUNCTION_ENTRY_SIZE: PtrVal = 8;
const DESCRIPTOR_NAME: PtrVal = 4;

/// Longest function name we are willing to read.
const NAME_LIMIT: usize = 1024;

/// Address-to-name mapping of every function the runtime knows about.
///
/// Serializes as a JSON object keyed by decimal address strings.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    from = "BTreeMap<PtrVal, String>",
    into = "BTreeMap<PtrVal, String>"
)]
pub struct RuntimeFunctionTable {
    by_address: BTreeMap<PtrVal, String>,
    by_name: HashMap<String, PtrVal>,
}

impl From<BTreeMap<PtrVal, String>> for RuntimeFunctionTable {
    fn from(by_address: BTreeMap<PtrVal, String>) -> Self {
        let mut by_name = HashMap::new();
        for (address, name) in by_address.iter() {
            by_name.entry(name.clone()).or_insert(*address);
        }

        RuntimeFunctionTable {
            by_address,
            by_name,
        }
    }
}

impl From<RuntimeFunctionTable> for BTreeMap<PtrVal, String> {
    fn from(table: RuntimeFunctionTable) -> Self {
        table.by_address
    }
}

impl RuntimeFunctionTable {
    pub fn len(&self) -> usize {
        self.by_address.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_address.is_empty()
    }

    /// Name of the function starting at `address`.
    pub fn name_at(&self, address: PtrVal) -> Option<&str> {
        self.by_address.get(&address).map(|s| s.as_ref())
    }

    /// Address of a function by its fully qualified Go name.
    ///
    /// Should a name appear more than once, the lowest address is returned.
    pub fn address_of(&self, name: &str) -> Option<PtrVal> {
        self.by_name.get(name).copied()
    }

    /// Start of the first function after `address`, which bounds the
    /// function containing it.
    pub fn next_function(&self, address: PtrVal) -> Option<PtrVal> {
        self.by_address
            .range((Bound::Excluded(address), Bound::Unbounded))
            .next()
            .map(|(a, _)| *a)
    }

    pub fn iter(&self) -> impl Iterator<Item = (PtrVal, &str)> {
        self.by_address.iter().map(|(a, n)| (*a, n.as_ref()))
    }
}

fn offset(base: PtrVal, offset: PtrVal) -> Result<PtrVal> {
    base.checked_add(offset).ok_or_else(|| {
        Error::malformed(format!(
            "offset 0x{:x} from 0x{:x} overflows the address space",
            offset, base
        ))
    })
}

fn table_word<I: Image>(image: &I, address: PtrVal) -> Result<PtrVal> {
    image
        .read_word(address)
        .map_err(|_| Error::malformed(format!("word at 0x{:x} is outside of the image", address)))
}

/// Read a NUL-terminated function name.
///
/// Names are read a byte at a time so that a name ending close to the end of
/// the image is still readable.
fn table_name<I: Image>(image: &I, address: PtrVal) -> Result<String> {
    let mut name = Vec::new();

    for i in 0..NAME_LIMIT as PtrVal {
        let at = offset(address, i)?;
        let byte = image
            .read(at, 1)
            .map_err(|_| Error::malformed(format!("name at 0x{:x} runs outside of the image", address)))?[0];

        if byte == 0 {
            if name.is_empty() {
                return Err(Error::malformed(format!("empty function name at 0x{:x}", address)));
            }

            return String::from_utf8(name)
                .map_err(|_| Error::malformed(format!("function name at 0x{:x} is not UTF-8", address)));
        }

        name.push(byte);
    }

    Err(Error::malformed(format!(
        "function name at 0x{:x} is not terminated within {} bytes",
        address, NAME_LIMIT
    )))
}

/// Walk the runtime's function table and recover every function name.
///
/// Either the whole table is read, or an error is returned; a partial table
/// is never produced.
pub fn read_function_table<I: Image>(image: &I) -> Result<RuntimeFunctionTable> {
    let base = image.section_address(RUNTIME_TABLE_SECTION).ok_or_else(|| {
        Error::malformed(format!("section {} is missing", RUNTIME_TABLE_SECTION))
    })?;

    let count = table_word(image, offset(base, FUNCTION_COUNT)?)?;
    let text_start = table_word(image, offset(base, TEXT_START)?)?;
    let name_table = offset(base, table_word(image, offset(base, NAME_TABLE)?)?)?;
    let function_table = offset(base, table_word(image, offset(base, FUNCTION_TABLE)?)?)?;

    debug!(
        "runtime table at 0x{:x}: {} functions, text at 0x{:x}",
        base, count, text_start
    );

    let mut functions = BTreeMap::new();
    for i in 0..count {
        let entry = offset(
            function_table,
            i.checked_mul(FUNCTION_ENTRY_SIZE)
                .ok_or_else(|| Error::malformed(format!("function count {} is too large", count)))?,
        )?;

        let address = offset(text_start, table_word(image, entry)?)?;
        let descriptor = offset(function_table, table_word(image, offset(entry, 4)?)?)?;
        let name_offset = table_word(image, offset(descriptor, DESCRIPTOR_NAME)?)?;
        let name = table_name(image, offset(name_table, name_offset)?)?;

        functions.insert(address, name);
    }

    Ok(RuntimeFunctionTable::from(functions))
}
