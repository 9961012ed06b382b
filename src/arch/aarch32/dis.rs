//! Textual disassembly of A32 code, for diagnostics.

use crate::arch::aarch32::{Instruction, PtrVal, Word, INSTRUCTION_SIZE};
use std::convert::TryInto;
use std::fmt::Write;

/// Render a single instruction word located at `address`.
///
/// Words outside of the modelled instruction subset are rendered as data.
pub fn disassemble_word(word: Word, address: PtrVal) -> String {
    match Instruction::decode(word, address) {
        Some(instr) => instr.to_string(),
        None => format!(".word 0x{:08x}", word),
    }
}

/// Disassemble a block of code that was read from `address`.
///
/// One line is produced per instruction word; a trailing partial word is
/// ignored.
pub fn disassemble(bytes: &[u8], address: PtrVal) -> String {
    let mut listing = String::new();

    for (i, chunk) in bytes.chunks_exact(INSTRUCTION_SIZE as usize).enumerate() {
        let pc = address.wrapping_add(i as PtrVal * INSTRUCTION_SIZE);
        let word = Word::from_le_bytes(chunk.try_into().expect("chunks are exactly one word"));

        writeln!(listing, "{:08x}:  {:08x}  {}", pc, word, disassemble_word(word, pc))
            .expect("writing to a String cannot fail");
    }

    listing
}
