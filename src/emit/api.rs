//! Patches for the vendor's Go API server.
//!
//! The API server is a stripped Go binary; functions are found through the
//! runtime's own function table rather than the ELF symbol table.

use crate::arch::aarch32::{Condition, Instruction, PtrVal, INSTRUCTION_SIZE};
use crate::emit::tweaks::open_broker;
use crate::error::{Error, Result};
use crate::image::Image;
use crate::runtime::RuntimeFunctionTable;
use std::collections::BTreeMap;

/// Reports whether LAN-only mode is switched on.
pub const LAN_PRINT_CHECK: &str = "printerApi/common/config.LanPrintIsOpen";

/// How far past a call to the LAN mode check its result may be tested.
const TEST_WINDOW: PtrVal = 20;

/// Forced LAN mode check results, by calling function.
///
/// Each entry lists, for successive calls to the check within that function,
/// the result the caller should behave as if it had received. Functions are
/// named as the Go runtime names them, or by hexadecimal address.
pub type LanModeOverrides = BTreeMap<String, Vec<bool>>;

fn resolve_function(table: &RuntimeFunctionTable, name: &str) -> Result<PtrVal> {
    if let Some(address) = table.address_of(name) {
        return Ok(address);
    }

    let digits = name.strip_prefix("0x").unwrap_or(name);
    let address =
        PtrVal::from_str_radix(digits, 16).map_err(|_| Error::MissingSymbol(name.to_string()))?;

    match table.name_at(address) {
        Some(known) => debug!("0x{:x} is {}", address, known),
        None => warn!("0x{:x} is not the start of a known function", address),
    }

    Ok(address)
}

/// Find the next `bl callee` after `from`, then make the first `beq` or
/// `bne` that follows it behave as if the callee returned `result`.
///
/// The search for the call stops at `end`, or the end of the image. Returns
/// the address of the call, from which the search for a further call may
/// continue.
pub fn force_branch_after_call<I: Image>(
    image: &mut I,
    from: PtrVal,
    end: Option<PtrVal>,
    callee: PtrVal,
    result: bool,
) -> Result<PtrVal> {
    let mut call = None;
    let mut address = from;

    while let Some(next) = address.checked_add(INSTRUCTION_SIZE) {
        address = next;
        if end.map_or(false, |end| address >= end) {
            break;
        }

        let word = match image.read_word(address) {
            Ok(word) => word,
            Err(_) => break,
        };

        if Instruction::decode(word, address) == Some(Instruction::call(callee)) {
            call = Some(address);
            break;
        }
    }

    let call = call.ok_or_else(|| Error::PatchSiteNotFound {
        symbol: LAN_PRINT_CHECK.to_string(),
        address: from,
    })?;

    for i in 1..TEST_WINDOW {
        let at = call + i * INSTRUCTION_SIZE;

        let (cond, target) = match Instruction::decode(image.read_word(at)?, at) {
            Some(Instruction::Branch {
                cond: cond @ Condition::Equal,
                link: false,
                target,
            })
            | Some(Instruction::Branch {
                cond: cond @ Condition::NotEqual,
                link: false,
                target,
            }) => (cond, target),
            _ => continue,
        };

        // `bne` is taken when the check reports true.
        let taken = result == (cond == Condition::NotEqual);
        let replacement = if taken {
            Instruction::branch(target)
        } else {
            Instruction::nop()
        };

        debug!("0x{:x}: b{} 0x{:x} forced to `{}`", at, cond.suffix(), target, replacement);
        image.assemble(at, &replacement)?;

        return Ok(call);
    }

    warn!(
        "No conditional branch follows the LAN mode check at 0x{:x}, left unchanged",
        call
    );

    Ok(call)
}

/// Apply every API server patch to `image`.
pub fn apply_api_patches<I: Image>(
    image: &mut I,
    table: &RuntimeFunctionTable,
    overrides: &LanModeOverrides,
) -> Result<()> {
    open_broker(image)?;

    if overrides.is_empty() {
        return Ok(());
    }

    let callee = table
        .address_of(LAN_PRINT_CHECK)
        .ok_or_else(|| Error::MissingSymbol(LAN_PRINT_CHECK.to_string()))?;

    for (name, results) in overrides.iter() {
        let function = resolve_function(table, name)?;
        let end = table.next_function(function);

        let mut cursor = function;
        for result in results.iter() {
            cursor = force_branch_after_call(image, cursor, end, callee, *result)?;
        }
    }

    Ok(())
}
