//! The safepoint table: header, owning buffer, and layout resolution.
//!
//! One table describes one compiled method. The header records the byte
//! width chosen for every integer field, the fixed stack-mask bit count,
//! and the record and catalog counts; every other offset in the table is
//! computed from those. The buffer layout is header, location catalog,
//! fixed-size record array, then the variable-map and inline-info blocks.
//!
//! A [`SafepointTable`] owns its buffer exclusively. It is immutable from
//! construction on, so any number of threads may decode it concurrently
//! without synchronization; publication is ownership transfer (typically
//! into an `Arc` stored next to the compiled code). Every decode view
//! borrows from the table, which pins the buffer for as long as a view
//! exists.

use crate::encoding::{optional_encoding_size, unsigned_encoding_size};
use crate::inline_info::{inline_info_size_in_bytes, InlineInfo};
use crate::location::LocationCatalog;
use crate::record::SafepointRecord;
use crate::util::constants::{BITS_IN_BYTE, BYTES_IN_U32};
use crate::util::memory_region::{MemoryRegion, MemoryRegionMut};
use crate::variable_map::{live_bitmap_size_in_bytes, map_size_in_bytes, VariableMap};
use static_assertions::{assert_impl_all, const_assert_eq};

// Header wire offsets. All field widths are single bytes; the bit count and
// the two counts are little-endian u32s.
const INSTRUCTION_OFFSET_WIDTH_OFFSET: usize = 0;
const NATIVE_OFFSET_WIDTH_OFFSET: usize = 1;
const VARIABLE_MAP_OFFSET_WIDTH_OFFSET: usize = 2;
const INLINE_INFO_OFFSET_WIDTH_OFFSET: usize = 3;
const REGISTER_MASK_WIDTH_OFFSET: usize = 4;
const CATALOG_VALUE_WIDTH_OFFSET: usize = 5;
const INLINE_INSTRUCTION_OFFSET_WIDTH_OFFSET: usize = 6;
const INLINE_METHOD_INDEX_WIDTH_OFFSET: usize = 7;
const INLINE_VARIABLE_MAP_OFFSET_WIDTH_OFFSET: usize = 8;
const STACK_MASK_BITS_OFFSET: usize = 9;
const SAFEPOINT_COUNT_OFFSET: usize = STACK_MASK_BITS_OFFSET + BYTES_IN_U32;
const CATALOG_COUNT_OFFSET: usize = SAFEPOINT_COUNT_OFFSET + BYTES_IN_U32;
pub(crate) const HEADER_SIZE: usize = CATALOG_COUNT_OFFSET + BYTES_IN_U32;

const_assert_eq!(HEADER_SIZE, 21);

/// The widths and counts that determine the whole table layout.
///
/// The builder computes one of these before serializing; the table parses
/// one back out of the header. All layout arithmetic lives here so the two
/// sides cannot drift apart.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct TableLayout {
    pub instruction_offset_width: usize,
    pub native_offset_width: usize,
    pub variable_map_offset_width: usize,
    pub inline_info_offset_width: usize,
    pub register_mask_width: usize,
    pub catalog_value_width: usize,
    pub inline_instruction_offset_width: usize,
    pub inline_method_index_width: usize,
    pub inline_variable_map_offset_width: usize,
    pub stack_mask_bits: u32,
    pub safepoint_count: u32,
    pub catalog_count: u32,
}

impl TableLayout {
    pub(crate) fn from_header(region: MemoryRegion) -> Self {
        Self {
            instruction_offset_width: region.load_u8(INSTRUCTION_OFFSET_WIDTH_OFFSET) as usize,
            native_offset_width: region.load_u8(NATIVE_OFFSET_WIDTH_OFFSET) as usize,
            variable_map_offset_width: region.load_u8(VARIABLE_MAP_OFFSET_WIDTH_OFFSET) as usize,
            inline_info_offset_width: region.load_u8(INLINE_INFO_OFFSET_WIDTH_OFFSET) as usize,
            register_mask_width: region.load_u8(REGISTER_MASK_WIDTH_OFFSET) as usize,
            catalog_value_width: region.load_u8(CATALOG_VALUE_WIDTH_OFFSET) as usize,
            inline_instruction_offset_width: region.load_u8(INLINE_INSTRUCTION_OFFSET_WIDTH_OFFSET)
                as usize,
            inline_method_index_width: region.load_u8(INLINE_METHOD_INDEX_WIDTH_OFFSET) as usize,
            inline_variable_map_offset_width: region
                .load_u8(INLINE_VARIABLE_MAP_OFFSET_WIDTH_OFFSET)
                as usize,
            stack_mask_bits: region.load_u32(STACK_MASK_BITS_OFFSET),
            safepoint_count: region.load_u32(SAFEPOINT_COUNT_OFFSET),
            catalog_count: region.load_u32(CATALOG_COUNT_OFFSET),
        }
    }

    pub(crate) fn write_header(&self, region: &mut MemoryRegionMut) {
        region.store_u8(
            INSTRUCTION_OFFSET_WIDTH_OFFSET,
            self.instruction_offset_width as u8,
        );
        region.store_u8(NATIVE_OFFSET_WIDTH_OFFSET, self.native_offset_width as u8);
        region.store_u8(
            VARIABLE_MAP_OFFSET_WIDTH_OFFSET,
            self.variable_map_offset_width as u8,
        );
        region.store_u8(
            INLINE_INFO_OFFSET_WIDTH_OFFSET,
            self.inline_info_offset_width as u8,
        );
        region.store_u8(REGISTER_MASK_WIDTH_OFFSET, self.register_mask_width as u8);
        region.store_u8(CATALOG_VALUE_WIDTH_OFFSET, self.catalog_value_width as u8);
        region.store_u8(
            INLINE_INSTRUCTION_OFFSET_WIDTH_OFFSET,
            self.inline_instruction_offset_width as u8,
        );
        region.store_u8(
            INLINE_METHOD_INDEX_WIDTH_OFFSET,
            self.inline_method_index_width as u8,
        );
        region.store_u8(
            INLINE_VARIABLE_MAP_OFFSET_WIDTH_OFFSET,
            self.inline_variable_map_offset_width as u8,
        );
        region.store_u32(STACK_MASK_BITS_OFFSET, self.stack_mask_bits);
        region.store_u32(SAFEPOINT_COUNT_OFFSET, self.safepoint_count);
        region.store_u32(CATALOG_COUNT_OFFSET, self.catalog_count);
    }

    pub(crate) fn stack_mask_size(&self) -> usize {
        (self.stack_mask_bits as usize + BITS_IN_BYTE - 1) / BITS_IN_BYTE
    }

    // Record fields in wire order; each offset accumulates the widths of
    // the fields before it.
    pub(crate) fn record_stack_mask_offset(&self) -> usize {
        0
    }

    pub(crate) fn record_inline_info_offset_offset(&self) -> usize {
        self.record_stack_mask_offset() + self.stack_mask_size()
    }

    pub(crate) fn record_variable_map_offset_offset(&self) -> usize {
        self.record_inline_info_offset_offset() + self.inline_info_offset_width
    }

    pub(crate) fn record_instruction_offset_offset(&self) -> usize {
        self.record_variable_map_offset_offset() + self.variable_map_offset_width
    }

    pub(crate) fn record_native_offset_offset(&self) -> usize {
        self.record_instruction_offset_offset() + self.instruction_offset_width
    }

    pub(crate) fn record_register_mask_offset(&self) -> usize {
        self.record_native_offset_offset() + self.native_offset_width
    }

    pub(crate) fn record_size(&self) -> usize {
        self.record_register_mask_offset() + self.register_mask_width
    }

    pub(crate) fn catalog_offset(&self) -> usize {
        HEADER_SIZE
    }

    pub(crate) fn catalog_entry_size(&self) -> usize {
        1 + self.catalog_value_width
    }

    pub(crate) fn catalog_size(&self) -> usize {
        self.catalog_count as usize * self.catalog_entry_size()
    }

    pub(crate) fn records_offset(&self) -> usize {
        self.catalog_offset() + self.catalog_size()
    }

    /// Offset of the first variable-map or inline-info block.
    pub(crate) fn blocks_offset(&self) -> usize {
        self.records_offset() + self.safepoint_count as usize * self.record_size()
    }

    pub(crate) fn inline_entry_size(&self) -> usize {
        self.inline_instruction_offset_width
            + self.inline_method_index_width
            + self.inline_variable_map_offset_width
    }

    pub(crate) fn has_inline_info(&self) -> bool {
        self.inline_info_offset_width != 0
    }
}

/// One compiled method's safepoint metadata: the table header plus the
/// buffer holding the whole encoded table.
pub struct SafepointTable {
    buffer: Box<[u8]>,
    layout: TableLayout,
}

// Readers on any thread may decode a published table concurrently.
assert_impl_all!(SafepointTable: Send, Sync);

impl SafepointTable {
    /// Wrap an encoded table buffer.
    ///
    /// The bytes must have been produced by
    /// [`SafepointTableBuilder::encode`](crate::SafepointTableBuilder::encode)
    /// from the same build: there is no version tag and no validation, by
    /// design. An AOT compiler emits `as_bytes()` into its image and the
    /// runtime wraps the loaded bytes with this.
    pub fn from_buffer(buffer: Box<[u8]>) -> Self {
        debug_assert!(buffer.len() >= HEADER_SIZE);
        let layout = TableLayout::from_header(MemoryRegion::new(&buffer));
        debug_assert!(buffer.len() >= layout.blocks_offset());
        Self { buffer, layout }
    }

    /// The raw encoded table, e.g. for emission into an AOT image.
    pub fn as_bytes(&self) -> &[u8] {
        &self.buffer
    }

    /// Total size of the encoded table in bytes.
    pub fn size_in_bytes(&self) -> usize {
        self.buffer.len()
    }

    fn region(&self) -> MemoryRegion<'_> {
        MemoryRegion::new(&self.buffer)
    }

    pub fn instruction_offset_width(&self) -> usize {
        self.layout.instruction_offset_width
    }

    pub fn native_offset_width(&self) -> usize {
        self.layout.native_offset_width
    }

    pub fn variable_map_offset_width(&self) -> usize {
        self.layout.variable_map_offset_width
    }

    pub fn inline_info_offset_width(&self) -> usize {
        self.layout.inline_info_offset_width
    }

    pub fn register_mask_width(&self) -> usize {
        self.layout.register_mask_width
    }

    pub fn catalog_value_width(&self) -> usize {
        self.layout.catalog_value_width
    }

    pub fn inline_instruction_offset_width(&self) -> usize {
        self.layout.inline_instruction_offset_width
    }

    pub fn inline_method_index_width(&self) -> usize {
        self.layout.inline_method_index_width
    }

    pub fn inline_variable_map_offset_width(&self) -> usize {
        self.layout.inline_variable_map_offset_width
    }

    /// Whether any safepoint in this table has inline info. False exactly
    /// when the inline-info offset field is stored at width 0.
    pub fn has_inline_info(&self) -> bool {
        self.layout.has_inline_info()
    }

    /// The stack-mask width in bits, fixed across the table.
    pub fn stack_mask_bits(&self) -> u32 {
        self.layout.stack_mask_bits
    }

    /// The stack-mask width in bytes.
    pub fn stack_mask_size(&self) -> usize {
        self.layout.stack_mask_size()
    }

    /// The number of safepoint records.
    pub fn safepoint_count(&self) -> usize {
        self.layout.safepoint_count as usize
    }

    /// The number of location catalog entries.
    pub fn catalog_count(&self) -> usize {
        self.layout.catalog_count as usize
    }

    /// The fixed byte size shared by every record in this table.
    pub fn record_size(&self) -> usize {
        self.layout.record_size()
    }

    pub(crate) fn record_stack_mask_offset(&self) -> usize {
        self.layout.record_stack_mask_offset()
    }

    pub(crate) fn record_inline_info_offset_offset(&self) -> usize {
        self.layout.record_inline_info_offset_offset()
    }

    pub(crate) fn record_variable_map_offset_offset(&self) -> usize {
        self.layout.record_variable_map_offset_offset()
    }

    pub(crate) fn record_instruction_offset_offset(&self) -> usize {
        self.layout.record_instruction_offset_offset()
    }

    pub(crate) fn record_native_offset_offset(&self) -> usize {
        self.layout.record_native_offset_offset()
    }

    pub(crate) fn record_register_mask_offset(&self) -> usize {
        self.layout.record_register_mask_offset()
    }

    pub(crate) fn inline_entry_size(&self) -> usize {
        self.layout.inline_entry_size()
    }

    /// The record at `index`, resolved in O(1) as
    /// `records_offset + index * record_size`.
    pub fn safepoint_at(&self, index: usize) -> SafepointRecord<'_> {
        debug_assert!(
            index < self.safepoint_count(),
            "safepoint index {} out of range ({} records)",
            index,
            self.safepoint_count()
        );
        let record_size = self.layout.record_size();
        let offset = self.layout.records_offset() + index * record_size;
        SafepointRecord::new(self.region().subregion(offset, record_size))
    }

    /// Iterate over all safepoint records in index order.
    pub fn safepoints(&self) -> impl Iterator<Item = SafepointRecord<'_>> {
        (0..self.safepoint_count()).map(|index| self.safepoint_at(index))
    }

    /// The location catalog of this table.
    pub fn catalog(&self) -> LocationCatalog<'_> {
        let region = self
            .region()
            .subregion(self.layout.catalog_offset(), self.layout.catalog_size());
        LocationCatalog::new(region, self.layout.catalog_value_width)
    }

    /// The variable map of `record` for a method of `num_variables`
    /// variables, or `None` when the safepoint records no locations.
    pub fn variable_map_of(
        &self,
        record: &SafepointRecord,
        num_variables: u16,
    ) -> Option<VariableMap<'_>> {
        let offset = record.variable_map_offset(self)?;
        Some(self.variable_map_at(offset as usize, num_variables))
    }

    /// The variable map owned by the inlined frame at `depth`, or `None`
    /// when that frame records no locations. `num_variables` is the
    /// variable count of the inlined method at that depth.
    pub fn variable_map_at_depth(
        &self,
        inline_info: &InlineInfo,
        depth: usize,
        num_variables: u16,
    ) -> Option<VariableMap<'_>> {
        let offset = inline_info.variable_map_offset_at_depth(self, depth)?;
        Some(self.variable_map_at(offset as usize, num_variables))
    }

    /// The inline-info block of `record`, or `None` when nothing is inlined
    /// at that safepoint (including the whole-table width-0 case).
    pub fn inline_info_of(&self, record: &SafepointRecord) -> Option<InlineInfo<'_>> {
        if !self.has_inline_info() {
            return None;
        }
        let offset = record.inline_info_offset(self)? as usize;
        let depth = self.region().load_u8(offset) as usize;
        let size = inline_info_size_in_bytes(depth, self.layout.inline_entry_size());
        Some(InlineInfo::new(self.region().subregion(offset, size)))
    }

    fn variable_map_at(&self, offset: usize, num_variables: u16) -> VariableMap<'_> {
        // The map's size depends on how many variables are live, so read
        // the live bitmap before carving out the full view.
        let bitmap = self
            .region()
            .subregion(offset, live_bitmap_size_in_bytes(num_variables));
        let live_count = (0..num_variables as usize)
            .filter(|&v| bitmap.load_bit(v))
            .count();
        let size = map_size_in_bytes(num_variables, live_count, self.catalog_count());
        VariableMap::new(self.region().subregion(offset, size))
    }

    /// The record size a table would use, as a pure function of the
    /// per-field maxima observed across it. Offset maxima are `None` when
    /// the corresponding data is absent from every safepoint.
    pub fn compute_record_size(
        stack_mask_bits: u32,
        instruction_offset_max: u32,
        native_offset_max: u32,
        register_mask_max: u32,
        variable_map_offset_max: Option<u32>,
        inline_info_offset_max: Option<u32>,
    ) -> usize {
        (stack_mask_bits as usize + BITS_IN_BYTE - 1) / BITS_IN_BYTE
            + optional_encoding_size(inline_info_offset_max)
            + optional_encoding_size(variable_map_offset_max)
            + unsigned_encoding_size(instruction_offset_max)
            + unsigned_encoding_size(native_offset_max)
            + unsigned_encoding_size(register_mask_max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layout_with_widths() -> TableLayout {
        TableLayout {
            instruction_offset_width: 2,
            native_offset_width: 1,
            variable_map_offset_width: 1,
            inline_info_offset_width: 1,
            register_mask_width: 2,
            catalog_value_width: 1,
            inline_instruction_offset_width: 1,
            inline_method_index_width: 2,
            inline_variable_map_offset_width: 1,
            stack_mask_bits: 10,
            safepoint_count: 3,
            catalog_count: 4,
        }
    }

    #[test]
    fn header_round_trips() {
        let layout = layout_with_widths();
        let mut bytes = vec![0u8; HEADER_SIZE];
        layout.write_header(&mut MemoryRegionMut::new(&mut bytes));
        assert_eq!(TableLayout::from_header(MemoryRegion::new(&bytes)), layout);
    }

    #[test]
    fn record_field_offsets_accumulate_in_wire_order() {
        let layout = layout_with_widths();
        // 10 mask bits round up to 2 bytes.
        assert_eq!(layout.stack_mask_size(), 2);
        assert_eq!(layout.record_stack_mask_offset(), 0);
        assert_eq!(layout.record_inline_info_offset_offset(), 2);
        assert_eq!(layout.record_variable_map_offset_offset(), 3);
        assert_eq!(layout.record_instruction_offset_offset(), 4);
        assert_eq!(layout.record_native_offset_offset(), 6);
        assert_eq!(layout.record_register_mask_offset(), 7);
        assert_eq!(layout.record_size(), 9);
    }

    #[test]
    fn region_offsets_chain() {
        let layout = layout_with_widths();
        assert_eq!(layout.catalog_offset(), HEADER_SIZE);
        assert_eq!(layout.catalog_entry_size(), 2);
        assert_eq!(layout.catalog_size(), 8);
        assert_eq!(layout.records_offset(), HEADER_SIZE + 8);
        assert_eq!(layout.blocks_offset(), HEADER_SIZE + 8 + 3 * 9);
        assert_eq!(layout.inline_entry_size(), 4);
        assert!(layout.has_inline_info());
    }

    #[test]
    fn compute_record_size_matches_layout() {
        let layout = layout_with_widths();
        // Maxima chosen to reproduce the widths above.
        assert_eq!(
            SafepointTable::compute_record_size(
                10,     // 2 mask bytes
                0x1ff,  // 2 bytes
                0x80,   // 1 byte
                0x8000, // 2 bytes
                Some(0x40),
                Some(0x40),
            ),
            layout.record_size()
        );
        // No variable maps, no inlining: both offset fields vanish.
        assert_eq!(SafepointTable::compute_record_size(0, 0, 0, 0, None, None), 0);
    }
}
