//! Receiver and calling convention heuristics.

use crate::arch::aarch32::{
    Aarch32Register as Register, Condition, Instruction, PtrVal, Word, INSTRUCTION_SIZE,
};
use crate::error::{Error, Result};
use crate::image::Image;
use crate::locate::PatchTarget;

/// `MainWindow::BottomStatusBarUiDisplay(unsigned char)`, called with the
/// receiver shortly before most jump points.
pub const STATUS_BAR_LANDMARK: &str = "_ZN10MainWindow24BottomStatusBarUiDisplayEh";

/// How many instructions of the callback's prologue are searched for the
/// receiver being spilled to the stack.
const PROLOGUE_WINDOW: PtrVal = 10;

/// How far back from the jump address the fallback looks for the landmark.
const LANDMARK_WINDOW: PtrVal = 20;

/// `str r0, [r11, #-imm8]`
const STACK_STORE_MASK: Word = 0xFFFF_FF00;
const STACK_STORE_BITS: Word = 0xE50B_0000;

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum CallingConvention {
    /// The callback pushed a frame; the replacement code returns into it.
    Framed,

    /// The callback has no frame of its own and ends in a tail call. The
    /// replacement code must tail call too.
    TailCall,
}

/// Where new control flow is spliced into the callback.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct PatchSite {
    pub target_address: PtrVal,
    pub operand: Condition,
    pub return_address: PtrVal,
    pub convention: CallingConvention,
}

impl PatchSite {
    pub fn uses_tail_call(&self) -> bool {
        self.convention == CallingConvention::TailCall
    }
}

/// How the receiver object is rematerialised in `r0` by replacement code.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum ReceiverStrategy {
    /// The callback spilled a pointer to the receiver into its frame at
    /// `[r11, #-frame_offset]`.
    StackStorePattern { frame_offset: u8 },

    /// The receiver was moved or loaded into `r0` just before a call to the
    /// status bar landmark; that instruction is replayed verbatim.
    RegisterTrackingFallback { instruction: Word },
}

impl ReceiverStrategy {
    /// The raw instruction words that leave the receiver in `r0`, in order.
    pub fn instructions(&self) -> Vec<Word> {
        match *self {
            ReceiverStrategy::StackStorePattern { frame_offset } => vec![
                Instruction::LoadWord {
                    rt: Register::R0,
                    rn: Register::FP,
                    offset: -(frame_offset as i32),
                }
                .encode(0)
                .expect("frame offsets always fit"),
                Instruction::LoadWord {
                    rt: Register::R0,
                    rn: Register::R0,
                    offset: 0,
                }
                .encode(0)
                .expect("zero offsets always fit"),
            ],
            ReceiverStrategy::RegisterTrackingFallback { instruction } => vec![instruction],
        }
    }
}

/// Everything learned about one callback.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct CallSite {
    pub site: PatchSite,
    pub receiver: ReceiverStrategy,
}

/// Words that cannot be read end the scan, as if nothing matched.
fn find_stack_store<I: Image>(image: &I, callback: PtrVal) -> Option<ReceiverStrategy> {
    for i in 0..PROLOGUE_WINDOW {
        let word = match image.read_word(callback.checked_add(i * INSTRUCTION_SIZE)?) {
            Ok(word) => word,
            Err(_) => break,
        };

        if word & STACK_STORE_MASK == STACK_STORE_BITS {
            return Some(ReceiverStrategy::StackStorePattern {
                frame_offset: word as u8,
            });
        }
    }

    None
}

/// True for instructions that leave the receiver in `r0`.
fn materialises_receiver(word: Word, address: PtrVal) -> bool {
    matches!(
        Instruction::decode(word, address),
        Some(Instruction::MovRegister(Register::R0, _))
            | Some(Instruction::LoadWord { rt: Register::R0, .. })
    )
}

fn track_receiver<I: Image>(image: &I, jump: PtrVal, landmark: PtrVal) -> Option<ReceiverStrategy> {
    for i in 0..LANDMARK_WINDOW {
        let address = match jump.checked_sub(i * INSTRUCTION_SIZE) {
            Some(address) => address,
            None => break,
        };

        let expected = match Instruction::call(landmark).encode(address) {
            Ok(word) => word,
            Err(_) => continue,
        };
        match image.read_word(address) {
            Ok(word) if word == expected => {}
            _ => continue,
        }

        // address-8 takes precedence over address-4.
        for back in &[8, 4] {
            let candidate = match address.checked_sub(*back) {
                Some(candidate) => candidate,
                None => continue,
            };
            let word = match image.read_word(candidate) {
                Ok(word) => word,
                Err(_) => continue,
            };

            if materialises_receiver(word, candidate) {
                return Some(ReceiverStrategy::RegisterTrackingFallback { instruction: word });
            }
        }
    }

    None
}

/// Work out the receiver and calling convention of `target`'s callback,
/// which has been resolved to `callback`.
///
/// `landmark` is the address of the status bar method, if the image has it.
/// Without it only the stack store pattern can match.
pub fn locate_call_site<I: Image>(
    image: &I,
    target: &PatchTarget,
    callback: PtrVal,
    landmark: Option<PtrVal>,
) -> Result<CallSite> {
    let not_found = || Error::PatchSiteNotFound {
        symbol: target.callback.to_string(),
        address: target.jump_address,
    };

    let receiver = find_stack_store(image, callback)
        .or_else(|| landmark.and_then(|landmark| track_receiver(image, target.jump_address, landmark)))
        .ok_or_else(not_found)?;

    let prologue = image.read_word(callback)?;
    let convention = match Instruction::decode(prologue, callback) {
        Some(instr) if instr.is_push() => CallingConvention::Framed,
        _ => CallingConvention::TailCall,
    };

    debug!(
        "{}: receiver via {:?}, {:?}",
        target.callback, receiver, convention
    );

    Ok(CallSite {
        site: PatchSite {
            target_address: target.jump_address,
            operand: target.jump_condition,
            return_address: target.return_address,
            convention,
        },
        receiver,
    })
}
