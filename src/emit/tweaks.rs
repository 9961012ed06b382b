//! Small, optional patches applied alongside the main ones.
//!
//! Each of these only fires if the thing it modifies is present in the
//! image; a firmware build lacking it is left alone.

use crate::arch::aarch32::{Aarch32Register as Register, Instruction, PtrVal};
use crate::error::{Error, Result};
use crate::image::Image;

/// `GobalVar::isCustomFirmware(const char *)`
pub const STATUS_CHECK: &str = "_ZN8GobalVar16isCustomFirmwareEPKc";

/// Menu labels renamed to point at the replacement UI, in the order they
/// are applied.
pub const LABEL_REPLACEMENTS: &[(&str, &str)] = &[
    ("Customer Support", "Rinkhals"),
    ("Service Support", "Rinkhals"),
    // One byte short of the name so that it fits.
    ("Support", "Rinkhal"),
];

/// Loopback address the vendor's MQTT broker listens on, and the
/// equal-length any-address replacement.
pub const BROKER_LISTEN: (&[u8], &[u8]) = (b"127.0.0.1:2883", b"0.0.0.0:002883");

/// Make the firmware's custom firmware check always report stock firmware.
pub fn stub_status_check<I: Image>(image: &mut I) -> Result<Option<PtrVal>> {
    let check = match image.resolve_symbol(STATUS_CHECK) {
        Some(check) => check,
        None => {
            debug!("{} not present, not stubbed", STATUS_CHECK);
            return Ok(None);
        }
    };

    image.assemble(check, &Instruction::MovImmediate(Register::R0, 0))?;
    image.assemble(check + 4, &Instruction::ret())?;

    Ok(Some(check))
}

/// Overwrite the first occurrence of `needle` with `replacement`.
///
/// The replacement may be shorter than the needle, in which case the rest of
/// the needle is left in place.
pub fn patch_first_occurrence<I: Image>(
    image: &mut I,
    needle: &[u8],
    replacement: &[u8],
) -> Result<Option<PtrVal>> {
    if replacement.len() > needle.len() {
        return Err(Error::LabelTooLong {
            original: String::from_utf8_lossy(needle).into_owned(),
            replacement: String::from_utf8_lossy(replacement).into_owned(),
            available: needle.len(),
        });
    }

    let found = image.search(needle).next();
    if let Some(address) = found {
        image.write(address, replacement)?;
    }

    Ok(found)
}

fn cstr(string: &str) -> Vec<u8> {
    let mut bytes = string.as_bytes().to_vec();
    bytes.push(0);
    bytes
}

/// Rename the first occurrence of a NUL-terminated label in place.
pub fn replace_label<I: Image>(image: &mut I, original: &str, replacement: &str) -> Result<Option<PtrVal>> {
    let found = patch_first_occurrence(image, &cstr(original), &cstr(replacement))?;

    match found {
        Some(address) => debug!("label {:?} at 0x{:x} renamed {:?}", original, address, replacement),
        None => debug!("label {:?} not present", original),
    }

    Ok(found)
}

pub fn replace_labels<I: Image>(image: &mut I) -> Result<()> {
    for (original, replacement) in LABEL_REPLACEMENTS {
        replace_label(image, original, replacement)?;
    }

    Ok(())
}

/// Make the MQTT broker listen on every interface.
pub fn open_broker<I: Image>(image: &mut I) -> Result<Option<PtrVal>> {
    let (loopback, any) = BROKER_LISTEN;
    let found = patch_first_occurrence(image, loopback, any)?;

    if found.is_none() {
        warn!("Broker listen address not found, left unchanged");
    }

    Ok(found)
}
