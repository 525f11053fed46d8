//! Fixed-size safepoint records.
//!
//! Each record is `record_size()` bytes at `records_offset + index *
//! record_size()`, which is what makes indexed access O(1). The internal
//! field order is fixed: stack mask, inline-info offset, variable-map
//! offset, instruction offset, native offset, register mask; each field's
//! byte offset is the accumulated width of the fields before it, so tables
//! with different width choices stay mutually decodable through the header.

use crate::encoding;
use crate::table::SafepointTable;
use crate::util::memory_region::MemoryRegion;

/// Decode view of one safepoint record.
#[derive(Clone, Copy)]
pub struct SafepointRecord<'a> {
    region: MemoryRegion<'a>,
}

impl<'a> SafepointRecord<'a> {
    pub(crate) fn new(region: MemoryRegion<'a>) -> Self {
        Self { region }
    }

    /// The virtual-machine instruction offset this safepoint maps to.
    pub fn instruction_offset(&self, table: &SafepointTable) -> u32 {
        encoding::load_at(
            self.region,
            table.instruction_offset_width(),
            table.record_instruction_offset_offset(),
        )
    }

    /// The native code offset of this safepoint, relative to the start of
    /// the compiled method.
    pub fn native_offset(&self, table: &SafepointTable) -> u32 {
        encoding::load_at(
            self.region,
            table.native_offset_width(),
            table.record_native_offset_offset(),
        )
    }

    /// Bitset of machine registers holding live object references.
    pub fn register_mask(&self, table: &SafepointTable) -> u32 {
        encoding::load_at(
            self.region,
            table.register_mask_width(),
            table.record_register_mask_offset(),
        )
    }

    /// Bit region over the stack mask: bit `i` is set when stack slot `i`
    /// holds a live object reference. The region's size is fixed per table,
    /// independent of this record's other field widths.
    pub fn stack_mask(&self, table: &SafepointTable) -> MemoryRegion<'a> {
        self.region
            .subregion(table.record_stack_mask_offset(), table.stack_mask_size())
    }

    /// Buffer offset of this record's variable map, or `None` when the
    /// safepoint records no variable locations.
    pub fn variable_map_offset(&self, table: &SafepointTable) -> Option<u32> {
        encoding::load_optional_at(
            self.region,
            table.variable_map_offset_width(),
            table.record_variable_map_offset_offset(),
        )
    }

    pub fn has_variable_map(&self, table: &SafepointTable) -> bool {
        self.variable_map_offset(table).is_some()
    }

    /// Buffer offset of this record's inline-info block, or `None` when
    /// nothing is inlined at this safepoint.
    ///
    /// Callers must check [`SafepointTable::has_inline_info`] first: a table
    /// whose methods never inline stores this field at width 0, and asking
    /// such a table for an inline-info offset is a caller bug.
    pub fn inline_info_offset(&self, table: &SafepointTable) -> Option<u32> {
        debug_assert!(
            table.has_inline_info(),
            "inline-info offset read from a table without inline info"
        );
        encoding::load_optional_at(
            self.region,
            table.inline_info_offset_width(),
            table.record_inline_info_offset_offset(),
        )
    }

    pub fn has_inline_info(&self, table: &SafepointTable) -> bool {
        table.has_inline_info() && self.inline_info_offset(table).is_some()
    }
}
