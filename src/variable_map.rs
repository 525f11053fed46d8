//! Per-safepoint variable maps.
//!
//! A variable map records, for one frame at one safepoint, where every
//! interpreter-visible variable currently lives. On the wire it is a live
//! bitmap (one bit per variable, ascending variable number) followed by the
//! catalog indices of the live variables only, bit-packed back-to-back.
//! Most variables are dead at most safepoints, so the common case costs a
//! single cleared bit.
//!
//! The map does not store its own variable count; the runtime knows how
//! many variables the method declares and passes that count in, the same
//! way it knows which compiled method a table belongs to.

use crate::encoding::minimum_bits_to_store;
use crate::location::Location;
use crate::table::SafepointTable;
use crate::util::constants::{BITS_IN_BYTE, LOG_BITS_IN_BYTE};
use crate::util::memory_region::MemoryRegion;

/// Decode view of one variable map.
#[derive(Clone, Copy)]
pub struct VariableMap<'a> {
    region: MemoryRegion<'a>,
}

impl<'a> VariableMap<'a> {
    pub(crate) fn new(region: MemoryRegion<'a>) -> Self {
        Self { region }
    }

    /// Whether `variable` holds a value at this safepoint.
    pub fn is_live(&self, variable: u16) -> bool {
        self.region.load_bit(variable as usize)
    }

    /// The number of live variables among the first `num_variables`.
    pub fn live_count(&self, num_variables: u16) -> usize {
        (0..num_variables).filter(|&v| self.is_live(v)).count()
    }

    /// The catalog index stored for live `variable`.
    ///
    /// Dead variables store nothing, so the index field for a live variable
    /// is found by its ordinal among the live: the count of set bits below
    /// `variable` in the bitmap.
    pub fn catalog_index_of(
        &self,
        variable: u16,
        num_variables: u16,
        catalog_count: usize,
    ) -> usize {
        debug_assert!(variable < num_variables);
        debug_assert!(
            self.is_live(variable),
            "variable v{} is dead and has no catalog index",
            variable
        );
        let ordinal = (0..variable).filter(|&v| self.is_live(v)).count();
        let bits_per_index = bits_per_catalog_index(catalog_count);
        let first_bit = live_bitmap_size_in_bytes(num_variables) * BITS_IN_BYTE
            + ordinal * bits_per_index;
        let mut index = 0usize;
        for bit in 0..bits_per_index {
            index |= (self.region.load_bit(first_bit + bit) as usize) << bit;
        }
        debug_assert!(index < catalog_count.max(1));
        index
    }

    /// The location of `variable`, or `None` if it is dead.
    /// Dead variables resolve without touching the catalog.
    pub fn location_of(
        &self,
        variable: u16,
        num_variables: u16,
        table: &SafepointTable,
    ) -> Option<Location> {
        if !self.is_live(variable) {
            return None;
        }
        let index = self.catalog_index_of(variable, num_variables, table.catalog_count());
        Some(table.catalog().location_at(index))
    }
}

/// Byte size of the live bitmap for `num_variables` variables.
pub(crate) fn live_bitmap_size_in_bytes(num_variables: u16) -> usize {
    (num_variables as usize + BITS_IN_BYTE - 1) >> LOG_BITS_IN_BYTE
}

/// Bit width of one packed catalog index. A catalog with at most one entry
/// needs no index bits at all: the only possible index is 0.
pub(crate) fn bits_per_catalog_index(catalog_count: usize) -> usize {
    if catalog_count <= 1 {
        0
    } else {
        minimum_bits_to_store((catalog_count - 1) as u32)
    }
}

/// Total byte size of a map with `live_count` live variables.
pub(crate) fn map_size_in_bytes(
    num_variables: u16,
    live_count: usize,
    catalog_count: usize,
) -> usize {
    let index_bits = live_count * bits_per_catalog_index(catalog_count);
    live_bitmap_size_in_bytes(num_variables) + (index_bits + BITS_IN_BYTE - 1) / BITS_IN_BYTE
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bitmap_and_index_sizing() {
        assert_eq!(live_bitmap_size_in_bytes(0), 0);
        assert_eq!(live_bitmap_size_in_bytes(1), 1);
        assert_eq!(live_bitmap_size_in_bytes(8), 1);
        assert_eq!(live_bitmap_size_in_bytes(9), 2);

        assert_eq!(bits_per_catalog_index(0), 0);
        assert_eq!(bits_per_catalog_index(1), 0);
        assert_eq!(bits_per_catalog_index(2), 1);
        assert_eq!(bits_per_catalog_index(6), 3);
        assert_eq!(bits_per_catalog_index(256), 8);
        assert_eq!(bits_per_catalog_index(257), 9);

        // 5 variables, 3 live, 6-entry catalog: 1 bitmap byte + ceil(9/8).
        assert_eq!(map_size_in_bytes(5, 3, 6), 3);
        // All dead: bitmap only.
        assert_eq!(map_size_in_bytes(5, 0, 6), 1);
    }

    #[test]
    fn dense_indices_skip_dead_variables() {
        // Live pattern [dead, live, dead, live, live] over 5 variables with
        // a 6-entry catalog (3 bits per index). Exactly three index fields
        // are stored, for v1, v3, v4, holding 5, 2, 4.
        let bytes = [0b0001_1010u8, 0b0001_0101, 0b0000_0001];
        let map = VariableMap::new(MemoryRegion::new(&bytes));

        assert!(!map.is_live(0));
        assert!(map.is_live(1));
        assert!(!map.is_live(2));
        assert!(map.is_live(3));
        assert!(map.is_live(4));
        assert_eq!(map.live_count(5), 3);

        assert_eq!(map.catalog_index_of(1, 5, 6), 5);
        assert_eq!(map.catalog_index_of(3, 5, 6), 2);
        // v4's index is the third stored field, not the fifth.
        assert_eq!(map.catalog_index_of(4, 5, 6), 4);
    }

    #[test]
    fn single_entry_catalog_stores_no_index_bits() {
        let bytes = [0b0000_0110u8];
        let map = VariableMap::new(MemoryRegion::new(&bytes));
        assert_eq!(map.catalog_index_of(1, 3, 1), 0);
        assert_eq!(map.catalog_index_of(2, 3, 1), 0);
        assert_eq!(map_size_in_bytes(3, 2, 1), 1);
    }
}
