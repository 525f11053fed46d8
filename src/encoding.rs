//! Variable-width integer codec.
//!
//! Every integer field in a safepoint table is stored at a per-table byte
//! width in {0, 1, 2, 3, 4}, chosen as the smallest width whose range covers
//! the largest value the field takes anywhere in the table. Width 3 packs as
//! a 2-byte low half followed by a 1-byte high half. Fields that can be
//! absent reserve the all-ones pattern of their width as the absent marker;
//! at this API boundary absence is an `Option`, and the bit pattern never
//! escapes the wire encoding.

use crate::util::constants::BITS_IN_BYTE;
use crate::util::memory_region::{MemoryRegion, MemoryRegionMut};
use static_assertions::const_assert;

/// The widest supported field, in bytes.
pub(crate) const MAX_ENCODING_SIZE: usize = 4;

const_assert!(MAX_ENCODING_SIZE <= std::mem::size_of::<u32>());

/// The all-ones pattern for a field of `num_bytes` bytes.
fn absent_marker(num_bytes: usize) -> u32 {
    debug_assert!((1..=MAX_ENCODING_SIZE).contains(&num_bytes));
    ((1u64 << (num_bytes * BITS_IN_BYTE)) - 1) as u32
}

/// Load a `num_bytes`-wide unsigned integer at `offset`.
/// Width 0 is an always-zero field and touches no memory.
pub(crate) fn load_at(region: MemoryRegion, num_bytes: usize, offset: usize) -> u32 {
    match num_bytes {
        0 => 0,
        1 => region.load_u8(offset) as u32,
        2 => region.load_u16(offset) as u32,
        3 => {
            let low = region.load_u16(offset) as u32;
            let high = region.load_u8(offset + 2) as u32;
            (high << 16) | low
        }
        4 => region.load_u32(offset),
        _ => unreachable!("field width {} out of range", num_bytes),
    }
}

/// Load a field whose all-ones pattern means "absent".
/// A width-0 field is absent at every safepoint.
pub(crate) fn load_optional_at(
    region: MemoryRegion,
    num_bytes: usize,
    offset: usize,
) -> Option<u32> {
    if num_bytes == 0 {
        return None;
    }
    let value = load_at(region, num_bytes, offset);
    if value == absent_marker(num_bytes) {
        None
    } else {
        Some(value)
    }
}

/// Store a `num_bytes`-wide unsigned integer at `offset`.
pub(crate) fn store_at(region: &mut MemoryRegionMut, num_bytes: usize, offset: usize, value: u32) {
    debug_assert!(
        num_bytes == MAX_ENCODING_SIZE || (value as u64) < (1u64 << (num_bytes * BITS_IN_BYTE)),
        "value {:#x} does not fit in {} bytes",
        value,
        num_bytes
    );
    match num_bytes {
        0 => {}
        1 => region.store_u8(offset, value as u8),
        2 => region.store_u16(offset, value as u16),
        3 => {
            region.store_u16(offset, value as u16);
            region.store_u8(offset + 2, (value >> 16) as u8);
        }
        4 => region.store_u32(offset, value),
        _ => unreachable!("field width {} out of range", num_bytes),
    }
}

/// Store a field whose all-ones pattern means "absent".
pub(crate) fn store_optional_at(
    region: &mut MemoryRegionMut,
    num_bytes: usize,
    offset: usize,
    value: Option<u32>,
) {
    match value {
        None => {
            // A width-0 field has no absent marker to write.
            if num_bytes > 0 {
                store_at(region, num_bytes, offset, absent_marker(num_bytes));
            }
        }
        Some(value) => {
            debug_assert!(num_bytes > 0, "present value stored in a width-0 field");
            debug_assert!(
                value < absent_marker(num_bytes),
                "value {:#x} collides with the absent marker of a {}-byte field",
                value,
                num_bytes
            );
            store_at(region, num_bytes, offset, value);
        }
    }
}

/// The smallest width in {0..=4} whose range covers `max_value`.
pub(crate) fn unsigned_encoding_size(max_value: u32) -> usize {
    match max_value {
        0 => 0,
        v if v <= 0xff => 1,
        v if v <= 0xffff => 2,
        v if v <= 0x00ff_ffff => 3,
        _ => 4,
    }
}

/// The smallest width for a field that must also encode "absent".
///
/// `max_value` is the largest present value, or `None` when the field is
/// absent at every safepoint, which encodes at width 0. The chosen width is
/// widened by one byte whenever `max_value` would collide with the absent
/// marker, and is never 0 for a present value.
pub(crate) fn optional_encoding_size(max_value: Option<u32>) -> usize {
    let Some(max_value) = max_value else {
        return 0;
    };
    debug_assert!(
        max_value < u32::MAX,
        "{:#x} is reserved for absence",
        max_value
    );
    let num_bytes = unsigned_encoding_size(max_value).max(1);
    if num_bytes < MAX_ENCODING_SIZE && max_value == absent_marker(num_bytes) {
        num_bytes + 1
    } else {
        num_bytes
    }
}

/// The number of bits needed to store `value`, i.e. zero for zero.
pub(crate) fn minimum_bits_to_store(value: u32) -> usize {
    (u32::BITS - value.leading_zeros()) as usize
}
