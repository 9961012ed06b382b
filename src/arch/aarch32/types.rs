//! Types used by aarch32

use std::{fmt, result, str};

/// The type which represents an ARM AArch32 memory address.
pub type PtrVal = u32;

/// The type which represents a single encoded instruction.
pub type Word = u32;

/// Width of every A32 instruction, in bytes.
pub const INSTRUCTION_SIZE: PtrVal = 4;

#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub enum Aarch32Register {
    R0,
    R1,
    R2,
    R3,
    R4,
    R5,
    R6,
    R7,
    R8,
    R9,
    R10,
    R11,
    R12,
    R13,
    R14,
    R15,
}

impl Aarch32Register {
    /// The frame pointer, as used by GCC for ARM code.
    pub const FP: Self = Aarch32Register::R11;
    pub const SP: Self = Aarch32Register::R13;
    pub const LR: Self = Aarch32Register::R14;
    pub const PC: Self = Aarch32Register::R15;

    pub fn from_instr(reg: u32) -> Option<Aarch32Register> {
        use Aarch32Register::*;

        match reg {
            0 => Some(R0),
            1 => Some(R1),
            2 => Some(R2),
            3 => Some(R3),
            4 => Some(R4),
            5 => Some(R5),
            6 => Some(R6),
            7 => Some(R7),
            8 => Some(R8),
            9 => Some(R9),
            10 => Some(R10),
            11 => Some(R11),
            12 => Some(R12),
            13 => Some(R13),
            14 => Some(R14),
            15 => Some(R15),
            _ => None,
        }
    }

    pub fn into_instr(self) -> u32 {
        self as u32
    }
}

impl fmt::Display for Aarch32Register {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use Aarch32Register::*;

        match self {
            R13 => write!(f, "sp"),
            R14 => write!(f, "lr"),
            R15 => write!(f, "pc"),
            r => write!(f, "r{}", r.into_instr()),
        }
    }
}

impl str::FromStr for Aarch32Register {
    type Err = ();

    fn from_str(s: &str) -> result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_ref() {
            "fp" => Ok(Self::FP),
            "ip" => Ok(Aarch32Register::R12),
            "sp" => Ok(Self::SP),
            "lr" => Ok(Self::LR),
            "pc" => Ok(Self::PC),
            other => other
                .strip_prefix('r')
                .and_then(|n| n.parse::<u32>().ok())
                .and_then(Self::from_instr)
                .ok_or(()),
        }
    }
}

/// A32 condition codes, stored in the top four bits of every instruction.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum Condition {
    Equal,
    NotEqual,
    CarrySet,
    CarryClear,
    Minus,
    Plus,
    Overflow,
    NoOverflow,
    Higher,
    LowerOrSame,
    GreaterOrEqual,
    Less,
    Greater,
    LessOrEqual,
    Always,
}

impl Condition {
    pub fn from_cond_field(cond: u32) -> Option<Self> {
        use Condition::*;

        match cond {
            0 => Some(Equal),
            1 => Some(NotEqual),
            2 => Some(CarrySet),
            3 => Some(CarryClear),
            4 => Some(Minus),
            5 => Some(Plus),
            6 => Some(Overflow),
            7 => Some(NoOverflow),
            8 => Some(Higher),
            9 => Some(LowerOrSame),
            10 => Some(GreaterOrEqual),
            11 => Some(Less),
            12 => Some(Greater),
            13 => Some(LessOrEqual),
            14 => Some(Always),
            _ => None,
        }
    }

    pub fn into_cond_field(self) -> u32 {
        self as u32
    }

    /// Mnemonic suffix for this condition; empty for `Always`.
    pub fn suffix(self) -> &'static str {
        use Condition::*;

        match self {
            Equal => "eq",
            NotEqual => "ne",
            CarrySet => "cs",
            CarryClear => "cc",
            Minus => "mi",
            Plus => "pl",
            Overflow => "vs",
            NoOverflow => "vc",
            Higher => "hi",
            LowerOrSame => "ls",
            GreaterOrEqual => "ge",
            Less => "lt",
            Greater => "gt",
            LessOrEqual => "le",
            Always => "",
        }
    }
}
