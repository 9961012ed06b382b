//! ELF32 ARM executable loading

use crate::arch::aarch32::{PtrVal, Word};
use crate::error::{Error, Result};
use crate::image::{ExecutableImage, Image, Region};
use object::{
    Architecture, Object, ObjectSection, ObjectSegment, ObjectSymbol, ObjectSymbolTable,
    SymbolIndex,
};
use std::convert::{TryFrom, TryInto};

/// Size of the lazy-binding header at the start of `.plt`.
const PLT_HEADER_SIZE: PtrVal = 20;

/// Size of one standard (short) ARM PLT entry.
const PLT_ENTRY_SIZE: PtrVal = 12;

/// Every short PLT entry starts with `add ip, pc, #0, 12`.
const PLT_ENTRY_MASK: Word = 0xFFFF_FF00;
const PLT_ENTRY_BITS: Word = 0xE28F_C600;

fn address(value: u64) -> Result<PtrVal> {
    PtrVal::try_from(value)
        .map_err(|_| Error::InvalidImage(format!("address 0x{:x} exceeds 32 bits", value)))
}

fn file_offset(value: u64) -> Result<usize> {
    usize::try_from(value)
        .map_err(|_| Error::InvalidImage(format!("file offset 0x{:x} is too large", value)))
}

impl ExecutableImage {
    /// Parse the contents of an ELF file.
    ///
    /// Only 32-bit little-endian ARM executables are accepted. Loadable
    /// segments become the addressable space of the image; sections and both
    /// static and dynamic symbols are recorded by name, symbols with their
    /// sizes. Imported functions additionally get a symbol pointing at their
    /// PLT stub, so that calls to e.g. `system` can be assembled like calls
    /// to local functions.
    pub(super) fn parse_elf(data: Vec<u8>) -> Result<Self> {
        let (segments, sections, symbols, imports) = {
            let file = object::File::parse(&*data)?;

            if file.architecture() != Architecture::Arm || file.is_64() || !file.is_little_endian() {
                return Err(Error::InvalidImage(
                    "expected a 32-bit little-endian ARM executable".to_string(),
                ));
            }

            let mut segments = Vec::new();
            for seg in file.segments() {
                let (offset, size) = seg.file_range();
                if size == 0 {
                    continue;
                }

                let name = seg.name()?.unwrap_or("");
                segments.push(Region::new(
                    name,
                    address(seg.address())?,
                    file_offset(offset)?,
                    file_offset(size)?,
                ));
            }

            let mut sections = Vec::new();
            for sec in file.sections() {
                let name = sec.name()?;
                let (offset, size) = sec.file_range().unwrap_or((0, 0));
                sections.push(Region::new(
                    name,
                    address(sec.address())?,
                    file_offset(offset)?,
                    file_offset(size)?,
                ));
            }

            let mut symbols = Vec::new();
            for sym in file.symbols().chain(file.dynamic_symbols()) {
                if !sym.is_definition() {
                    continue;
                }

                let name = sym.name()?;
                if !name.is_empty() {
                    // Zero means the size is unknown.
                    let size = usize::try_from(sym.size()).unwrap_or(0);
                    symbols.push((name.to_string(), address(sym.address())?, size));
                }
            }

            (segments, sections, symbols, plt_imports(&file)?)
        };

        let mut image = ExecutableImage::with_segments(data, segments)?;
        for section in sections {
            image.add_section(section);
        }
        for (name, address, size) in symbols {
            image.add_sized_symbol(&name, address, size);
        }

        if let Some((plt, imports)) = imports {
            image.add_plt_symbols(plt, imports);
        }

        Ok(image)
    }

    /// Register PLT stubs for every imported function that is not already
    /// defined locally.
    fn add_plt_symbols(&mut self, plt: PtrVal, imports: Vec<String>) {
        for (i, name) in imports.iter().enumerate() {
            let stub = plt + PLT_HEADER_SIZE + i as PtrVal * PLT_ENTRY_SIZE;

            match self.read_word(stub) {
                Ok(word) if word & PLT_ENTRY_MASK == PLT_ENTRY_BITS => {
                    self.add_symbol(name, stub);
                }
                other => {
                    warn!(
                        "PLT entry for {} at 0x{:x} is not a short ARM stub ({:x?}), skipping PLT symbols",
                        name, stub, other
                    );
                    return;
                }
            }
        }
    }
}

/// Collect the names of PLT-bound imports, in `.rel.plt` order.
///
/// Each `Elf32_Rel` entry is eight bytes: the GOT slot, then `r_info` whose
/// upper 24 bits index the dynamic symbol table.
fn plt_imports(file: &object::File<'_>) -> Result<Option<(PtrVal, Vec<String>)>> {
    let (plt, relocs, dynsym) = match (
        file.section_by_name(".plt"),
        file.section_by_name(".rel.plt"),
        file.dynamic_symbol_table(),
    ) {
        (Some(plt), Some(relocs), Some(dynsym)) => (plt, relocs, dynsym),
        _ => return Ok(None),
    };

    let mut imports = Vec::new();
    for entry in relocs.data()?.chunks_exact(8) {
        let info = u32::from_le_bytes(entry[4..8].try_into().expect("entry is eight bytes"));
        let sym = dynsym.symbol_by_index(SymbolIndex((info >> 8) as usize))?;

        imports.push(sym.name()?.to_string());
    }

    Ok(Some((address(plt.address())?, imports)))
}
