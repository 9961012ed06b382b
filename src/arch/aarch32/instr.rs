//! A32 instruction repr

use crate::arch::aarch32::{Aarch32Register as Register, Condition, PtrVal, Word};
use crate::error::{Error, Result};
use std::fmt;

/// Represents an A32 instruction the patch engine knows how to encode.
///
/// Only the handful of forms needed to build call sequences and recognise
/// function prologues are modelled. Branch targets are absolute addresses;
/// the PC-relative offset is computed when the instruction is encoded at a
/// particular location.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum Instruction {
    /// B{cond} target / BL{cond} target
    Branch {
        cond: Condition,
        link: bool,
        target: PtrVal,
    },

    /// MOV rd, #immed
    MovImmediate(Register, u32),

    /// MOV rd, rm
    MovRegister(Register, Register),

    /// CMP rn, #immed
    CmpImmediate(Register, u32),

    /// LDR rt, [rn, #offset]
    LoadWord {
        rt: Register,
        rn: Register,
        offset: i32,
    },

    /// STR rt, [rn, #offset]
    StoreWord {
        rt: Register,
        rn: Register,
        offset: i32,
    },

    /// PUSH {reglist}, i.e. STMDB sp!, {reglist}
    Push(u16),
}

const COND_SHIFT: u32 = 28;
const BRANCH_BITS: Word = 0x0A00_0000;
const LINK_BIT: Word = 0x0100_0000;
const MOV_BITS: Word = 0x01A0_0000;
const CMP_BITS: Word = 0x0150_0000;
const IMMEDIATE_BIT: Word = 0x0200_0000;
const LDR_BITS: Word = 0x0510_0000;
const STR_BITS: Word = 0x0500_0000;
const UP_BIT: Word = 0x0080_0000;
const PUSH_BITS: Word = 0x092D_0000;

/// Branches encode a signed 24-bit word offset.
const BRANCH_RANGE: i64 = 1 << 25;

/// Find the rotated 8-bit form of a data processing immediate.
fn encode_immediate(value: u32) -> Option<Word> {
    (0..16).find_map(|rotate: u32| {
        let unrotated = value.rotate_left(rotate * 2);
        if unrotated <= 0xFF {
            Some(rotate << 8 | unrotated)
        } else {
            None
        }
    })
}

fn decode_immediate(field: Word) -> u32 {
    let rotate = (field & 0xF00) >> 8;
    (field & 0xFF).rotate_right(rotate * 2)
}

fn register(word: Word, shift: u32) -> Register {
    Register::from_instr((word >> shift) & 0xF).expect("four bits are always a register")
}

impl Instruction {
    /// `MOV r0, r0`, the traditional ARM no-op.
    pub fn nop() -> Self {
        Instruction::MovRegister(Register::R0, Register::R0)
    }

    /// `MOV pc, lr`, returning to the caller without touching the stack.
    pub fn ret() -> Self {
        Instruction::MovRegister(Register::PC, Register::LR)
    }

    pub fn branch(target: PtrVal) -> Self {
        Instruction::Branch {
            cond: Condition::Always,
            link: false,
            target,
        }
    }

    pub fn branch_if(cond: Condition, target: PtrVal) -> Self {
        Instruction::Branch {
            cond,
            link: false,
            target,
        }
    }

    pub fn call(target: PtrVal) -> Self {
        Instruction::Branch {
            cond: Condition::Always,
            link: true,
            target,
        }
    }

    fn unencodable(&self, address: PtrVal, reason: &'static str) -> Error {
        Error::Unencodable {
            instruction: self.to_string(),
            address,
            reason,
        }
    }

    /// Encode this instruction as if it were placed at `address`.
    pub fn encode(&self, address: PtrVal) -> Result<Word> {
        let always = Condition::Always.into_cond_field() << COND_SHIFT;

        Ok(match *self {
            Instruction::Branch { cond, link, target } => {
                let offset = target as i64 - (address as i64 + 8);
                if offset % 4 != 0 {
                    return Err(self.unencodable(address, "branch target is not word aligned"));
                }
                if offset < -BRANCH_RANGE || offset >= BRANCH_RANGE {
                    return Err(self.unencodable(address, "branch target is out of range"));
                }

                let link = if link { LINK_BIT } else { 0 };
                cond.into_cond_field() << COND_SHIFT
                    | BRANCH_BITS
                    | link
                    | ((offset >> 2) as u32 & 0x00FF_FFFF)
            }
            Instruction::MovImmediate(rd, value) => {
                let immed = encode_immediate(value)
                    .ok_or_else(|| self.unencodable(address, "immediate has no rotated form"))?;
                always | IMMEDIATE_BIT | MOV_BITS | rd.into_instr() << 12 | immed
            }
            Instruction::MovRegister(rd, rm) => always | MOV_BITS | rd.into_instr() << 12 | rm.into_instr(),
            Instruction::CmpImmediate(rn, value) => {
                let immed = encode_immediate(value)
                    .ok_or_else(|| self.unencodable(address, "immediate has no rotated form"))?;
                always | IMMEDIATE_BIT | CMP_BITS | rn.into_instr() << 16 | immed
            }
            Instruction::LoadWord { rt, rn, offset } | Instruction::StoreWord { rt, rn, offset } => {
                if offset.unsigned_abs() > 0xFFF {
                    return Err(self.unencodable(address, "offset exceeds 12 bits"));
                }

                let op = match self {
                    Instruction::LoadWord { .. } => LDR_BITS,
                    _ => STR_BITS,
                };
                let up = if offset >= 0 { UP_BIT } else { 0 };
                always | op | up | rn.into_instr() << 16 | rt.into_instr() << 12 | offset.unsigned_abs()
            }
            Instruction::Push(reglist) => always | PUSH_BITS | reglist as u32,
        })
    }

    /// Encode into the little-endian byte form stored in the image.
    pub fn to_bytes(&self, address: PtrVal) -> Result<[u8; 4]> {
        Ok(self.encode(address)?.to_le_bytes())
    }

    /// Decode an instruction word located at `address`.
    ///
    /// Yields `None` for anything outside of the modelled subset.
    pub fn decode(word: Word, address: PtrVal) -> Option<Self> {
        let cond = Condition::from_cond_field(word >> COND_SHIFT)?;

        if word & 0x0E00_0000 == BRANCH_BITS {
            let offset = ((word & 0x00FF_FFFF) << 8) as i32 >> 6;
            return Some(Instruction::Branch {
                cond,
                link: word & LINK_BIT != 0,
                target: address.wrapping_add(8).wrapping_add(offset as u32),
            });
        }

        if cond != Condition::Always {
            return None;
        }

        match word & 0x0FF0_0000 {
            0x03A0_0000 if word & 0x000F_0000 == 0 => Some(Instruction::MovImmediate(
                register(word, 12),
                decode_immediate(word & 0xFFF),
            )),
            0x01A0_0000 if word & 0x000F_0FF0 == 0 => {
                Some(Instruction::MovRegister(register(word, 12), register(word, 0)))
            }
            0x0350_0000 if word & 0x0000_F000 == 0 => Some(Instruction::CmpImmediate(
                register(word, 16),
                decode_immediate(word & 0xFFF),
            )),
            0x0590_0000 | 0x0510_0000 | 0x0580_0000 | 0x0500_0000 => {
                let magnitude = (word & 0xFFF) as i32;
                let offset = if word & UP_BIT != 0 { magnitude } else { -magnitude };
                let (rt, rn) = (register(word, 12), register(word, 16));

                if word & 0x0010_0000 != 0 {
                    Some(Instruction::LoadWord { rt, rn, offset })
                } else {
                    Some(Instruction::StoreWord { rt, rn, offset })
                }
            }
            0x0920_0000 if word & 0x000F_0000 == 0x000D_0000 => Some(Instruction::Push(word as u16)),
            _ => None,
        }
    }

    /// True for `push {...}`, the first instruction of a framed function.
    pub fn is_push(&self) -> bool {
        matches!(self, Instruction::Push(_))
    }
}

fn fmt_offset(f: &mut fmt::Formatter<'_>, offset: i32) -> fmt::Result {
    if offset < 0 {
        write!(f, "#-0x{:x}", offset.unsigned_abs())
    } else {
        write!(f, "#0x{:x}", offset)
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Instruction::Branch { cond, link, target } => {
                let op = if link { "bl" } else { "b" };
                write!(f, "{}{} 0x{:x}", op, cond.suffix(), target)
            }
            Instruction::MovImmediate(rd, value) => write!(f, "mov {}, #0x{:x}", rd, value),
            Instruction::MovRegister(Register::R0, Register::R0) => write!(f, "nop"),
            Instruction::MovRegister(rd, rm) => write!(f, "mov {}, {}", rd, rm),
            Instruction::CmpImmediate(rn, value) => write!(f, "cmp {}, #0x{:x}", rn, value),
            Instruction::LoadWord { rt, rn, offset } | Instruction::StoreWord { rt, rn, offset } => {
                let op = match self {
                    Instruction::LoadWord { .. } => "ldr",
                    _ => "str",
                };
                write!(f, "{} {}, [{}", op, rt, rn)?;
                if offset != 0 {
                    write!(f, ", ")?;
                    fmt_offset(f, offset)?;
                }
                write!(f, "]")
            }
            Instruction::Push(reglist) => {
                let regs: Vec<String> = (0..16)
                    .filter(|i| reglist & (1 << i) != 0)
                    .filter_map(Register::from_instr)
                    .map(|r| r.to_string())
                    .collect();
                write!(f, "push {{{}}}", regs.join(", "))
            }
        }
    }
}
