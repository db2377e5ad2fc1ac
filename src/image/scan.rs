// Copyright lowRISC contributors.
// Licensed under the Apache License, Version 2.0, see LICENSE for details.
// SPDX-License-Identifier: Apache-2.0

//! Scanning flash for descriptor magic.

use core::ops::Range;

use crate::hardware::flash::Flash;
use crate::image::FailureReason;

/// Searches `range` for an aligned, little-endian, eight-byte `magic` value.
///
/// Starting at the first multiple of `alignment` at or after `range.start`,
/// reads one word per alignment step until it finds `magic` or there are
/// fewer than eight bytes left before `range.end`. Returns the offset the
/// magic was found at.
///
/// `range` must be non-empty and contained within `bounds`, and `alignment`
/// must be a power of two; otherwise, returns `InvalidArgument`.
pub fn scan<F: Flash + ?Sized>(
    flash: &F,
    range: Range<u32>,
    alignment: u32,
    magic: u64,
    bounds: Range<u32>,
) -> Result<u32, FailureReason> {
    check!(range.start < range.end, FailureReason::InvalidArgument);
    check!(
        range.start >= bounds.start && range.end <= bounds.end,
        FailureReason::InvalidArgument
    );
    check!(alignment.is_power_of_two(), FailureReason::InvalidArgument);

    let mask = alignment - 1;
    let mut offset = match range.start.checked_add(mask) {
        Some(x) => x & !mask,
        None => return Err(FailureReason::FailedToLocateMagic),
    };

    let mut word = [0; 8];
    while offset < range.end && range.end - offset >= 8 {
        flash.read(offset, &mut word)?;
        if u64::from_le_bytes(word) == magic {
            trace!("found magic {:#x} at {:#x}", magic, offset);
            return Ok(offset);
        }
        offset = match offset.checked_add(alignment) {
            Some(x) => x,
            None => break,
        };
    }
    Err(FailureReason::FailedToLocateMagic)
}
