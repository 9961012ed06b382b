//! Types that expose executable files to the patch engine.

mod elf;
mod executable;

pub use executable::{ExecutableImage, Region};

use crate::arch::aarch32::{disassemble, Instruction, PtrVal, Word};
use crate::error::{Error, Result};
use std::convert::TryInto;
use std::path::Path;

/// An Image is an addressable view of a program's bytes.
///
/// All addresses are virtual addresses as the program sees them when loaded,
/// not file offsets. Implementations are responsible for mapping one to the
/// other and for rejecting accesses outside of the mapped program.
///
/// An image is mutated in memory only. Nothing reaches the disk until `save`
/// is called, which consumes the image; a failed patch session therefore
/// never leaves a partially-modified file behind.
pub trait Image {
    /// Retrieve `length` bytes starting at `address`.
    fn read(&self, address: PtrVal, length: usize) -> Result<&[u8]>;

    /// Overwrite bytes starting at `address`.
    ///
    /// Writes never change the size of the image.
    fn write(&mut self, address: PtrVal, data: &[u8]) -> Result<()>;

    /// Resolve a symbol name to its address, if the image has it.
    fn resolve_symbol(&self, name: &str) -> Option<PtrVal>;

    /// Size in bytes of the object a symbol names, if it was recorded.
    fn symbol_size(&self, name: &str) -> Option<usize>;

    /// Resolve a section name to the address it is loaded at.
    fn section_address(&self, name: &str) -> Option<PtrVal>;

    /// Lazily yield the address of every occurrence of `needle`.
    fn search<'a>(&'a self, needle: &'a [u8]) -> Box<dyn Iterator<Item = PtrVal> + 'a>;

    /// Persist the image to a new file.
    fn save(self, path: &Path) -> Result<()>
    where
        Self: Sized;

    /// Resolve a symbol that the current operation cannot do without.
    fn require_symbol(&self, name: &str) -> Result<PtrVal> {
        self.resolve_symbol(name)
            .ok_or_else(|| Error::MissingSymbol(name.to_string()))
    }

    /// Read a little-endian word.
    fn read_word(&self, address: PtrVal) -> Result<Word> {
        let bytes = self.read(address, 4)?;

        Ok(Word::from_le_bytes(
            bytes.try_into().expect("read returned exactly four bytes"),
        ))
    }

    /// Encode an instruction for `address` and write it there.
    fn assemble(&mut self, address: PtrVal, instr: &Instruction) -> Result<()> {
        let bytes = instr.to_bytes(address)?;

        self.write(address, &bytes)
    }

    /// Render `length` bytes of code starting at `address` as text.
    fn disassemble(&self, address: PtrVal, length: usize) -> Result<String> {
        Ok(disassemble(self.read(address, length)?, address))
    }
}
