//! Scratch space for replacement code.

use crate::arch::aarch32::{Instruction, PtrVal, Word, INSTRUCTION_SIZE};
use crate::error::{Error, Result};
use crate::image::Image;

/// Hands out space, in program order, from the body of a function that has
/// been stubbed out.
///
/// The cursor only ever moves forward and never past the end of the stubbed
/// function, as given by its symbol size.
#[derive(Debug)]
pub struct ScratchAllocator {
    function: String,
    start: PtrVal,
    cursor: PtrVal,
    end: PtrVal,
}

impl ScratchAllocator {
    /// Overwrite the start of `function` with a bare return, making the rest
    /// of its body unreachable, and allocate from just after that return.
    ///
    /// Functions of unknown size, or too small to hold the stub, are refused.
    pub fn after_stub<I: Image>(image: &mut I, function: &str) -> Result<Self> {
        let stub = image.require_symbol(function)?;
        let size = image.symbol_size(function).unwrap_or(0);
        if size < INSTRUCTION_SIZE as usize {
            return Err(Error::ScratchExhausted {
                function: function.to_string(),
                needed: INSTRUCTION_SIZE as usize,
                available: size,
            });
        }

        let end = stub
            .checked_add(size as PtrVal)
            .ok_or(Error::OutOfBounds { address: stub, length: size })?;
        image.assemble(stub, &Instruction::ret())?;

        Ok(ScratchAllocator {
            function: function.to_string(),
            start: stub,
            cursor: stub + INSTRUCTION_SIZE,
            end,
        })
    }

    /// Address of the stubbed function.
    pub fn start(&self) -> PtrVal {
        self.start
    }

    /// Address the next allocation will be placed at.
    pub fn cursor(&self) -> PtrVal {
        self.cursor
    }

    /// Bytes handed out so far, including the stub itself.
    pub fn used(&self) -> usize {
        (self.cursor - self.start) as usize
    }

    /// Bytes left before the end of the function.
    pub fn remaining(&self) -> usize {
        self.end.saturating_sub(self.cursor) as usize
    }

    fn put<I: Image>(&mut self, image: &mut I, data: &[u8]) -> Result<PtrVal> {
        if data.len() > self.remaining() {
            return Err(Error::ScratchExhausted {
                function: self.function.clone(),
                needed: data.len(),
                available: self.remaining(),
            });
        }

        let at = self.cursor;
        image.write(at, data)?;
        self.cursor += data.len() as PtrVal;

        Ok(at)
    }

    /// Store a NUL-terminated string.
    pub fn put_cstr<I: Image>(&mut self, image: &mut I, string: &str) -> Result<PtrVal> {
        let mut bytes = Vec::with_capacity(string.len() + 1);
        bytes.extend_from_slice(string.as_bytes());
        bytes.push(0);

        self.put(image, &bytes)
    }

    /// Advance to the next instruction boundary.
    pub fn align(&mut self) -> PtrVal {
        let misalign = self.cursor % INSTRUCTION_SIZE;
        if misalign != 0 {
            self.cursor += INSTRUCTION_SIZE - misalign;
        }

        self.cursor
    }

    /// Assemble an instruction at the cursor.
    pub fn emit<I: Image>(&mut self, image: &mut I, instr: &Instruction) -> Result<PtrVal> {
        let bytes = instr.to_bytes(self.cursor)?;

        self.put(image, &bytes)
    }

    /// Store a raw word, either a literal or a pre-encoded instruction.
    pub fn emit_word<I: Image>(&mut self, image: &mut I, word: Word) -> Result<PtrVal> {
        self.put(image, &word.to_le_bytes())
    }
}
