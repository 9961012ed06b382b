//! Owned, bounds-checked byte arena for a single executable file.

use crate::arch::aarch32::PtrVal;
use crate::error::{Error, Result};
use crate::image::Image;
use std::collections::HashMap;
use std::io::Write;
use std::path::Path;
use std::{fs, iter};
use tempfile::NamedTempFile;

/// A named, contiguous range of the file that is mapped at a known address.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Region {
    name: String,
    address: PtrVal,
    offset: usize,
    size: usize,
}

impl Region {
    pub fn new(name: &str, address: PtrVal, offset: usize, size: usize) -> Self {
        Region {
            name: name.to_string(),
            address,
            offset,
            size,
        }
    }

    pub fn as_name(&self) -> &str {
        &self.name
    }

    pub fn address(&self) -> PtrVal {
        self.address
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Translate an address range into a file offset, if the whole range lies
    /// within this region.
    fn offset_of(&self, address: PtrVal, length: usize) -> Option<usize> {
        let start = (address as u64).checked_sub(self.address as u64)?;
        let end = start.checked_add(length as u64)?;

        if end <= self.size as u64 {
            Some(self.offset + start as usize)
        } else {
            None
        }
    }
}

/// The contents of an executable file, plus enough of its structure to
/// address it the way the loaded program would.
///
/// Segments determine which addresses are readable and writable. Sections
/// and symbols only provide names.
#[derive(Clone, Debug)]
pub struct ExecutableImage {
    data: Vec<u8>,
    segments: Vec<Region>,
    sections: Vec<Region>,
    symbols: HashMap<String, PtrVal>,
    symbol_sizes: HashMap<String, usize>,
}

impl ExecutableImage {
    /// Construct an image whose whole contents are mapped at `base`.
    #[cfg(test)]
    pub fn from_bytes(data: Vec<u8>, base: PtrVal) -> Self {
        let size = data.len();

        ExecutableImage {
            data,
            segments: vec![Region::new("", base, 0, size)],
            sections: Vec::new(),
            symbols: HashMap::new(),
            symbol_sizes: HashMap::new(),
        }
    }

    /// Construct an image with an explicit segment layout.
    ///
    /// Fails if any segment describes bytes beyond the end of `data`.
    pub fn with_segments(data: Vec<u8>, segments: Vec<Region>) -> Result<Self> {
        for seg in segments.iter() {
            if seg.offset.checked_add(seg.size).map_or(true, |end| end > data.len()) {
                return Err(Error::InvalidImage(format!(
                    "segment at 0x{:x} extends past the end of the file",
                    seg.address
                )));
            }
        }

        Ok(ExecutableImage {
            data,
            segments,
            sections: Vec::new(),
            symbols: HashMap::new(),
            symbol_sizes: HashMap::new(),
        })
    }

    /// Open an ELF executable.
    pub fn open(path: &Path) -> Result<Self> {
        let image = Self::parse_elf(fs::read(path)?)?;

        for sec in image.iter_sections() {
            trace!(
                "{}: {} at 0x{:x}, 0x{:x} bytes",
                path.display(),
                sec.as_name(),
                sec.address(),
                sec.size()
            );
        }

        Ok(image)
    }

    pub fn add_section(&mut self, section: Region) {
        self.sections.push(section);
    }

    /// Register a symbol. The first definition of a name wins.
    pub fn add_symbol(&mut self, name: &str, address: PtrVal) {
        self.symbols.entry(name.to_string()).or_insert(address);
    }

    /// Register a symbol along with the size of the object it names.
    pub fn add_sized_symbol(&mut self, name: &str, address: PtrVal, size: usize) {
        if !self.symbols.contains_key(name) {
            self.symbols.insert(name.to_string(), address);
            self.symbol_sizes.insert(name.to_string(), size);
        }
    }

    pub fn iter_sections(&self) -> impl Iterator<Item = &Region> {
        self.sections.iter()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    fn file_offset(&self, address: PtrVal, length: usize) -> Result<usize> {
        self.segments
            .iter()
            .find_map(|seg| seg.offset_of(address, length))
            .ok_or(Error::OutOfBounds { address, length })
    }
}

impl Image for ExecutableImage {
    fn read(&self, address: PtrVal, length: usize) -> Result<&[u8]> {
        let offset = self.file_offset(address, length)?;

        Ok(&self.data[offset..offset + length])
    }

    fn write(&mut self, address: PtrVal, data: &[u8]) -> Result<()> {
        let offset = self.file_offset(address, data.len())?;
        self.data[offset..offset + data.len()].copy_from_slice(data);

        Ok(())
    }

    fn resolve_symbol(&self, name: &str) -> Option<PtrVal> {
        self.symbols.get(name).copied()
    }

    fn symbol_size(&self, name: &str) -> Option<usize> {
        self.symbol_sizes.get(name).copied().filter(|size| *size > 0)
    }

    fn section_address(&self, name: &str) -> Option<PtrVal> {
        self.sections
            .iter()
            .find(|sec| sec.name == name)
            .map(|sec| sec.address)
    }

    fn search<'a>(&'a self, needle: &'a [u8]) -> Box<dyn Iterator<Item = PtrVal> + 'a> {
        if needle.is_empty() {
            return Box::new(iter::empty());
        }

        Box::new(self.segments.iter().flat_map(move |seg| {
            self.data[seg.offset..seg.offset + seg.size]
                .windows(needle.len())
                .enumerate()
                .filter(move |(_, window)| *window == needle)
                .map(move |(i, _)| seg.address.wrapping_add(i as PtrVal))
        }))
    }

    fn save(self, path: &Path) -> Result<()> {
        let dir = match path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir,
            _ => Path::new("."),
        };

        // Written beside the target and renamed over it, so a reader never
        // sees a truncated artifact.
        let mut temp = NamedTempFile::new_in(dir)?;
        temp.write_all(self.as_bytes())?;
        temp.flush()?;
        temp.persist(path).map_err(|e| e.error)?;

        Ok(())
    }
}
