//! The two-pass safepoint table encoder.
//!
//! The compiler feeds one [`SafepointEntry`] per safepoint while emitting
//! code; [`SafepointTableBuilder::encode`] then does the rest. Pass one
//! interns every distinct location into the catalog and collects the
//! whole-table maximum of every integer field; pass two serializes with
//! each field at the smallest width that covers its maximum.
//!
//! The three fields holding buffer offsets (variable map, inline info,
//! inline variable map) are circular: their widths change the record size,
//! which moves the blocks they point at. The encoder resolves them with a
//! fixpoint that starts each width at its lower bound and only ever widens,
//! so it terminates after a handful of rounds.
//!
//! Encoding is deterministic: the same entries in the same order produce
//! byte-identical tables, with catalog indices assigned in first-occurrence
//! order.

use std::collections::HashMap;

use crate::encoding::{optional_encoding_size, store_at, store_optional_at, unsigned_encoding_size};
use crate::inline_info::inline_info_size_in_bytes;
use crate::location::Location;
use crate::table::{SafepointTable, TableLayout};
use crate::util::constants::BITS_IN_BYTE;
use crate::util::memory_region::MemoryRegionMut;
use crate::variable_map::{bits_per_catalog_index, live_bitmap_size_in_bytes, map_size_in_bytes};

/// One inlined frame collapsed into a safepoint, from the innermost
/// enclosing frame (depth 0) outward.
#[derive(Clone, Debug, Default)]
pub struct InlineFrameEntry {
    /// Instruction offset within the inlined method.
    pub instruction_offset: u32,
    /// The runtime's index for the inlined method.
    pub method_index: u32,
    /// Location per variable of the inlined method, `None` for dead ones.
    /// An empty vector means the frame has no variable map at all.
    pub variables: Vec<Option<Location>>,
}

/// Everything the compiler records for one safepoint.
#[derive(Clone, Debug, Default)]
pub struct SafepointEntry {
    /// The virtual-machine instruction offset this safepoint maps to.
    pub instruction_offset: u32,
    /// Native code offset from the start of the compiled method.
    pub native_offset: u32,
    /// Bitset of machine registers holding live object references.
    pub register_mask: u32,
    /// Indices of stack slots holding live object references. Each must be
    /// below the table's stack-mask bit count.
    pub live_stack_slots: Vec<u32>,
    /// Location per interpreter variable, `None` for dead ones. An empty
    /// vector means the safepoint has no variable map at all.
    pub variables: Vec<Option<Location>>,
    /// The inlined-frame chain, outermost first. Empty when nothing is
    /// inlined here.
    pub inline_frames: Vec<InlineFrameEntry>,
}

/// Builds the encoded table for one compiled method.
pub struct SafepointTableBuilder {
    stack_mask_bits: u32,
    safepoints: Vec<SafepointEntry>,
}

/// Offsets assigned to one safepoint's variable-size blocks.
#[derive(Clone, Default)]
struct BlockOffsets {
    variable_map: Option<u32>,
    inline_info: Option<u32>,
    inline_variable_maps: Vec<Option<u32>>,
}

/// One full layout round: every block placed, plus the per-field offset
/// maxima the next width guess is derived from.
struct BlockPlacement {
    per_safepoint: Vec<BlockOffsets>,
    total_size: usize,
    max_variable_map_offset: Option<u32>,
    max_inline_info_offset: Option<u32>,
    max_inline_variable_map_offset: Option<u32>,
}

impl SafepointTableBuilder {
    /// Create a builder for a method whose frame has `stack_mask_bits`
    /// stack slots to describe. The stack-mask width is fixed for the
    /// whole table.
    pub fn new(stack_mask_bits: u32) -> Self {
        Self {
            stack_mask_bits,
            safepoints: Vec::with_capacity(16),
        }
    }

    /// Record one safepoint. Safepoints keep the order they are added in;
    /// compilers add them in ascending native offset so that lookup can
    /// binary-search the records.
    pub fn add_safepoint(&mut self, entry: SafepointEntry) {
        debug_assert!(entry.variables.len() <= u16::MAX as usize);
        debug_assert!(entry.inline_frames.len() <= u8::MAX as usize);
        debug_assert!(entry
            .live_stack_slots
            .iter()
            .all(|&slot| slot < self.stack_mask_bits));
        debug_assert!(entry
            .inline_frames
            .iter()
            .all(|frame| frame.variables.len() <= u16::MAX as usize));
        self.safepoints.push(entry);
    }

    pub fn len(&self) -> usize {
        self.safepoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.safepoints.is_empty()
    }

    /// Serialize into an immutable [`SafepointTable`].
    pub fn encode(self) -> SafepointTable {
        let (catalog, catalog_indices) = self.build_catalog();
        let bits_per_index = bits_per_catalog_index(catalog.len());

        let mut layout = self.initial_layout(&catalog);
        let placement = self.place_blocks_fixpoint(&mut layout, bits_per_index);

        let mut buffer = vec![0u8; placement.total_size].into_boxed_slice();
        let mut region = MemoryRegionMut::new(&mut buffer);
        layout.write_header(&mut region);
        Self::write_catalog(&mut region, &layout, &catalog);
        self.write_records(&mut region, &layout, &placement);
        self.write_blocks(&mut region, &layout, &placement, &catalog_indices, bits_per_index);

        debug!(
            "encoded safepoint table: {} safepoints, {} catalog entries, \
             record size {} bytes, {} bytes total",
            self.safepoints.len(),
            catalog.len(),
            layout.record_size(),
            placement.total_size
        );
        SafepointTable::from_buffer(buffer)
    }

    /// Intern every distinct location, assigning indices in
    /// first-occurrence order: safepoints in insertion order, the outer
    /// frame before the inline chain, variables in ascending number.
    fn build_catalog(&self) -> (Vec<Location>, HashMap<Location, usize>) {
        let mut catalog = Vec::new();
        let mut indices = HashMap::new();
        let mut intern = |location: &Location| {
            indices.entry(*location).or_insert_with(|| {
                catalog.push(*location);
                catalog.len() - 1
            });
        };
        for entry in &self.safepoints {
            entry.variables.iter().flatten().for_each(&mut intern);
            for frame in &entry.inline_frames {
                frame.variables.iter().flatten().for_each(&mut intern);
            }
        }
        (catalog, indices)
    }

    /// Layout with every non-circular width final and each circular offset
    /// width at its lower bound: 0 when the data is absent from every
    /// safepoint, else 1.
    fn initial_layout(&self, catalog: &[Location]) -> TableLayout {
        let safepoints = &self.safepoints;
        let max_of = |f: fn(&SafepointEntry) -> u32| safepoints.iter().map(f).max().unwrap_or(0);
        let frames = safepoints.iter().flat_map(|entry| &entry.inline_frames);

        let any_variable_map = safepoints.iter().any(|entry| !entry.variables.is_empty());
        let any_inline = safepoints.iter().any(|entry| !entry.inline_frames.is_empty());
        let any_inline_map = safepoints
            .iter()
            .flat_map(|entry| &entry.inline_frames)
            .any(|frame| !frame.variables.is_empty());

        TableLayout {
            instruction_offset_width: unsigned_encoding_size(max_of(|e| e.instruction_offset)),
            native_offset_width: unsigned_encoding_size(max_of(|e| e.native_offset)),
            variable_map_offset_width: any_variable_map as usize,
            inline_info_offset_width: any_inline as usize,
            register_mask_width: unsigned_encoding_size(max_of(|e| e.register_mask)),
            catalog_value_width: unsigned_encoding_size(
                catalog.iter().map(|location| location.value).max().unwrap_or(0),
            ),
            inline_instruction_offset_width: unsigned_encoding_size(
                frames.clone().map(|f| f.instruction_offset).max().unwrap_or(0),
            ),
            inline_method_index_width: unsigned_encoding_size(
                frames.map(|f| f.method_index).max().unwrap_or(0),
            ),
            inline_variable_map_offset_width: any_inline_map as usize,
            stack_mask_bits: self.stack_mask_bits,
            safepoint_count: self.safepoints.len() as u32,
            catalog_count: catalog.len() as u32,
        }
    }

    /// Resolve the three offset widths. Each round lays every block out
    /// under the current widths and re-derives the widths from the offsets
    /// that produced; widths only ever grow and are capped at 4 bytes, so
    /// this terminates.
    fn place_blocks_fixpoint(
        &self,
        layout: &mut TableLayout,
        bits_per_index: usize,
    ) -> BlockPlacement {
        let mut rounds = 0;
        loop {
            let placement = self.place_blocks(layout, bits_per_index);
            let widths = (
                optional_encoding_size(placement.max_variable_map_offset),
                optional_encoding_size(placement.max_inline_info_offset),
                optional_encoding_size(placement.max_inline_variable_map_offset),
            );
            let current = (
                layout.variable_map_offset_width,
                layout.inline_info_offset_width,
                layout.inline_variable_map_offset_width,
            );
            if widths == current {
                return placement;
            }
            trace!(
                "offset widths {:?} -> {:?}, laying out again",
                current,
                widths
            );
            debug_assert!(
                widths.0 >= current.0 && widths.1 >= current.1 && widths.2 >= current.2,
                "offset widths must grow monotonically"
            );
            (
                layout.variable_map_offset_width,
                layout.inline_info_offset_width,
                layout.inline_variable_map_offset_width,
            ) = widths;
            rounds += 1;
            debug_assert!(rounds <= 12, "offset width fixpoint failed to converge");
        }
    }

    /// Place every variable-size block after the record array, in
    /// safepoint order: the outer variable map, then the inline-info
    /// block, then each inlined frame's map.
    fn place_blocks(&self, layout: &TableLayout, bits_per_index: usize) -> BlockPlacement {
        let catalog_count = layout.catalog_count as usize;
        let mut cursor = layout.blocks_offset();
        let mut per_safepoint = Vec::with_capacity(self.safepoints.len());
        let mut max_variable_map_offset: Option<u32> = None;
        let mut max_inline_info_offset: Option<u32> = None;
        let mut max_inline_variable_map_offset: Option<u32> = None;

        let place = |cursor: &mut usize, size: usize, max: &mut Option<u32>| {
            let offset = *cursor as u32;
            *cursor += size;
            *max = Some(max.map_or(offset, |m| m.max(offset)));
            offset
        };

        for entry in &self.safepoints {
            let mut blocks = BlockOffsets::default();
            if !entry.variables.is_empty() {
                let size = frame_map_size(&entry.variables, catalog_count, bits_per_index);
                blocks.variable_map =
                    Some(place(&mut cursor, size, &mut max_variable_map_offset));
            }
            if !entry.inline_frames.is_empty() {
                let size =
                    inline_info_size_in_bytes(entry.inline_frames.len(), layout.inline_entry_size());
                blocks.inline_info = Some(place(&mut cursor, size, &mut max_inline_info_offset));
                for frame in &entry.inline_frames {
                    blocks.inline_variable_maps.push(if frame.variables.is_empty() {
                        None
                    } else {
                        let size = frame_map_size(&frame.variables, catalog_count, bits_per_index);
                        Some(place(&mut cursor, size, &mut max_inline_variable_map_offset))
                    });
                }
            }
            per_safepoint.push(blocks);
        }

        BlockPlacement {
            per_safepoint,
            total_size: cursor,
            max_variable_map_offset,
            max_inline_info_offset,
            max_inline_variable_map_offset,
        }
    }

    fn write_catalog(region: &mut MemoryRegionMut, layout: &TableLayout, catalog: &[Location]) {
        for (index, location) in catalog.iter().enumerate() {
            let offset = layout.catalog_offset() + index * layout.catalog_entry_size();
            region.store_u8(offset, location.kind as u8);
            store_at(region, layout.catalog_value_width, offset + 1, location.value);
        }
    }

    fn write_records(
        &self,
        region: &mut MemoryRegionMut,
        layout: &TableLayout,
        placement: &BlockPlacement,
    ) {
        for (index, entry) in self.safepoints.iter().enumerate() {
            let base = layout.records_offset() + index * layout.record_size();
            let blocks = &placement.per_safepoint[index];
            for &slot in &entry.live_stack_slots {
                let mask_base = base + layout.record_stack_mask_offset();
                region.store_bit(mask_base * BITS_IN_BYTE + slot as usize, true);
            }
            store_optional_at(
                region,
                layout.inline_info_offset_width,
                base + layout.record_inline_info_offset_offset(),
                blocks.inline_info,
            );
            store_optional_at(
                region,
                layout.variable_map_offset_width,
                base + layout.record_variable_map_offset_offset(),
                blocks.variable_map,
            );
            store_at(
                region,
                layout.instruction_offset_width,
                base + layout.record_instruction_offset_offset(),
                entry.instruction_offset,
            );
            store_at(
                region,
                layout.native_offset_width,
                base + layout.record_native_offset_offset(),
                entry.native_offset,
            );
            store_at(
                region,
                layout.register_mask_width,
                base + layout.record_register_mask_offset(),
                entry.register_mask,
            );
        }
    }

    fn write_blocks(
        &self,
        region: &mut MemoryRegionMut,
        layout: &TableLayout,
        placement: &BlockPlacement,
        catalog_indices: &HashMap<Location, usize>,
        bits_per_index: usize,
    ) {
        for (entry, blocks) in self.safepoints.iter().zip(&placement.per_safepoint) {
            if let Some(offset) = blocks.variable_map {
                write_variable_map(
                    region,
                    offset as usize,
                    &entry.variables,
                    catalog_indices,
                    bits_per_index,
                );
            }
            if let Some(offset) = blocks.inline_info {
                let offset = offset as usize;
                region.store_u8(offset, entry.inline_frames.len() as u8);
                for (depth, frame) in entry.inline_frames.iter().enumerate() {
                    let entry_offset = offset + 1 + depth * layout.inline_entry_size();
                    store_at(
                        region,
                        layout.inline_instruction_offset_width,
                        entry_offset,
                        frame.instruction_offset,
                    );
                    store_at(
                        region,
                        layout.inline_method_index_width,
                        entry_offset + layout.inline_instruction_offset_width,
                        frame.method_index,
                    );
                    store_optional_at(
                        region,
                        layout.inline_variable_map_offset_width,
                        entry_offset
                            + layout.inline_instruction_offset_width
                            + layout.inline_method_index_width,
                        blocks.inline_variable_maps[depth],
                    );
                    if let Some(map_offset) = blocks.inline_variable_maps[depth] {
                        write_variable_map(
                            region,
                            map_offset as usize,
                            &frame.variables,
                            catalog_indices,
                            bits_per_index,
                        );
                    }
                }
            }
        }
    }
}

fn frame_map_size(
    variables: &[Option<Location>],
    catalog_count: usize,
    bits_per_index: usize,
) -> usize {
    debug_assert_eq!(bits_per_index, bits_per_catalog_index(catalog_count));
    let live_count = variables.iter().flatten().count();
    map_size_in_bytes(variables.len() as u16, live_count, catalog_count)
}

/// Serialize one variable map: the live bitmap, then the catalog index of
/// each live variable packed at `bits_per_index` bits, ascending variable
/// number. Dead variables contribute a cleared bit and nothing else.
// TODO: deduplicate identical variable maps across safepoints; consecutive
// safepoints frequently repeat the exact same map.
fn write_variable_map(
    region: &mut MemoryRegionMut,
    offset: usize,
    variables: &[Option<Location>],
    catalog_indices: &HashMap<Location, usize>,
    bits_per_index: usize,
) {
    let bitmap_bytes = live_bitmap_size_in_bytes(variables.len() as u16);
    let mut ordinal = 0;
    for (number, location) in variables.iter().enumerate() {
        let Some(location) = location else { continue };
        region.store_bit(offset * BITS_IN_BYTE + number, true);
        let index = catalog_indices[location];
        let first_bit = (offset + bitmap_bytes) * BITS_IN_BYTE + ordinal * bits_per_index;
        for bit in 0..bits_per_index {
            region.store_bit(first_bit + bit, (index >> bit) & 1 == 1);
        }
        ordinal += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::location::LocationKind;
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha8Rng;

    fn two_safepoint_builder() -> SafepointTableBuilder {
        // Safepoint A: v0 live in r1, v1 dead. Safepoint B: v0 live in r1,
        // v1 live in stack slot 4.
        let mut builder = SafepointTableBuilder::new(8);
        builder.add_safepoint(SafepointEntry {
            instruction_offset: 1,
            native_offset: 0x10,
            register_mask: 0b10,
            live_stack_slots: vec![0],
            variables: vec![Some(Location::register(1)), None],
            ..Default::default()
        });
        builder.add_safepoint(SafepointEntry {
            instruction_offset: 5,
            native_offset: 0x20,
            register_mask: 0b10,
            live_stack_slots: vec![3],
            variables: vec![Some(Location::register(1)), Some(Location::stack_slot(4))],
            ..Default::default()
        });
        builder
    }

    #[test]
    fn end_to_end_two_safepoints() {
        let table = two_safepoint_builder().encode();

        // The catalog deduplicates r1 across both safepoints.
        assert_eq!(table.catalog_count(), 2);
        let catalog = table.catalog();
        assert_eq!(catalog.location_at(0), Location::register(1));
        assert_eq!(catalog.location_at(1), Location::stack_slot(4));
        assert_eq!(catalog.kind_at(0), LocationKind::InRegister);
        assert_eq!(catalog.kind_at(1), LocationKind::InStack);

        let a = table.safepoint_at(0);
        assert_eq!(a.instruction_offset(&table), 1);
        assert_eq!(a.native_offset(&table), 0x10);
        assert_eq!(a.register_mask(&table), 0b10);
        assert!(a.stack_mask(&table).load_bit(0));
        assert!(!a.stack_mask(&table).load_bit(3));
        let a_map = table.variable_map_of(&a, 2).unwrap();
        assert_eq!(a_map.catalog_index_of(0, 2, 2), 0);
        assert_eq!(a_map.location_of(0, 2, &table), Some(Location::register(1)));
        assert_eq!(a_map.location_of(1, 2, &table), None);

        let b = table.safepoint_at(1);
        assert_eq!(b.native_offset(&table), 0x20);
        assert!(b.stack_mask(&table).load_bit(3));
        let b_map = table.variable_map_of(&b, 2).unwrap();
        assert_eq!(b_map.catalog_index_of(0, 2, 2), 0);
        assert_eq!(b_map.catalog_index_of(1, 2, 2), 1);
        assert_eq!(b_map.location_of(0, 2, &table), Some(Location::register(1)));
        assert_eq!(b_map.location_of(1, 2, &table), Some(Location::stack_slot(4)));
    }

    #[test]
    fn encoding_is_deterministic() {
        let first = two_safepoint_builder().encode();
        let second = two_safepoint_builder().encode();
        assert_eq!(first.as_bytes(), second.as_bytes());
    }

    #[test]
    fn two_safepoint_layout_accounting() {
        let table = two_safepoint_builder().encode();
        // Widths: 1-byte mask (8 bits), no inline field, 1-byte map offset,
        // 1-byte instruction offset (max 5), 1-byte native offset (max
        // 0x20), 1-byte register mask (max 2).
        assert_eq!(table.record_size(), 5);
        assert_eq!(table.instruction_offset_width(), 1);
        assert_eq!(table.native_offset_width(), 1);
        assert_eq!(table.register_mask_width(), 1);
        assert_eq!(table.variable_map_offset_width(), 1);
        assert_eq!(table.inline_info_offset_width(), 0);
        assert_eq!(table.catalog_value_width(), 1);
        // 21 header + 2 * 2 catalog + 2 * 5 records + two 2-byte maps.
        assert_eq!(table.size_in_bytes(), 21 + 4 + 10 + 4);
    }

    #[test]
    fn records_are_fixed_size_and_indexable() {
        let mut builder = SafepointTableBuilder::new(4);
        for i in 0..7u32 {
            builder.add_safepoint(SafepointEntry {
                instruction_offset: i * 3,
                native_offset: i * 0x11,
                register_mask: 1 << (i % 5),
                live_stack_slots: vec![i % 4],
                ..Default::default()
            });
        }
        let table = builder.encode();
        assert_eq!(table.safepoint_count(), 7);
        // Every record, including the last, decodes its own values.
        for i in 0..7usize {
            let record = table.safepoint_at(i);
            assert_eq!(record.instruction_offset(&table), i as u32 * 3);
            assert_eq!(record.native_offset(&table), i as u32 * 0x11);
            assert_eq!(record.register_mask(&table), 1 << (i % 5));
            assert!(record.stack_mask(&table).load_bit(i % 4));
        }
        assert_eq!(table.safepoints().count(), 7);
    }

    #[test]
    fn table_without_inlining_stores_no_inline_field() {
        let table = two_safepoint_builder().encode();
        assert!(!table.has_inline_info());
        assert_eq!(table.inline_info_offset_width(), 0);
        let record = table.safepoint_at(0);
        assert!(table.inline_info_of(&record).is_none());
    }

    #[test]
    fn inline_chain_round_trips() {
        let mut builder = SafepointTableBuilder::new(0);
        builder.add_safepoint(SafepointEntry {
            instruction_offset: 1,
            native_offset: 2,
            inline_frames: vec![
                InlineFrameEntry {
                    instruction_offset: 7,
                    method_index: 0x111,
                    variables: vec![Some(Location::register(3))],
                },
                InlineFrameEntry {
                    instruction_offset: 9,
                    method_index: 2,
                    variables: vec![],
                },
                InlineFrameEntry {
                    instruction_offset: 11,
                    method_index: 3,
                    variables: vec![None, Some(Location::constant(9))],
                },
            ],
            ..Default::default()
        });
        let table = builder.encode();

        assert!(table.has_inline_info());
        // No outer frame records locations, so that field vanished.
        assert_eq!(table.variable_map_offset_width(), 0);
        assert_eq!(table.inline_method_index_width(), 2);

        let record = table.safepoint_at(0);
        assert!(!record.has_variable_map(&table));
        assert!(table.variable_map_of(&record, 0).is_none());

        let inline_info = table.inline_info_of(&record).unwrap();
        assert_eq!(inline_info.depth(), 3);
        assert_eq!(inline_info.instruction_offset_at_depth(&table, 0), 7);
        assert_eq!(inline_info.instruction_offset_at_depth(&table, 2), 11);
        assert_eq!(inline_info.method_index_at_depth(&table, 0), 0x111);
        assert_eq!(inline_info.method_index_at_depth(&table, 1), 2);
        assert_eq!(inline_info.method_index_at_depth(&table, 2), 3);
        assert!(inline_info.has_variable_map_at_depth(&table, 0));
        assert!(!inline_info.has_variable_map_at_depth(&table, 1));
        assert!(inline_info.has_variable_map_at_depth(&table, 2));

        let depth0 = table.variable_map_at_depth(&inline_info, 0, 1).unwrap();
        assert_eq!(depth0.location_of(0, 1, &table), Some(Location::register(3)));
        let depth2 = table.variable_map_at_depth(&inline_info, 2, 2).unwrap();
        assert_eq!(depth2.location_of(0, 2, &table), None);
        assert_eq!(depth2.location_of(1, 2, &table), Some(Location::constant(9)));

        // 21 header + 2 * 2 catalog + one 3-byte record + a 13-byte block
        // (count byte + 3 * (1 + 2 + 1)) + two 2-byte inline maps.
        assert_eq!(table.record_size(), 3);
        assert_eq!(table.size_in_bytes(), 21 + 4 + 3 + 13 + 4);
    }

    #[test]
    fn wide_fields_get_wide_encodings() {
        let mut builder = SafepointTableBuilder::new(0);
        builder.add_safepoint(SafepointEntry {
            instruction_offset: 0x12,
            native_offset: 0x1234,
            register_mask: 0x0100_0000,
            ..Default::default()
        });
        let table = builder.encode();
        assert_eq!(table.instruction_offset_width(), 1);
        assert_eq!(table.native_offset_width(), 2);
        assert_eq!(table.register_mask_width(), 4);
        let record = table.safepoint_at(0);
        assert_eq!(record.native_offset(&table), 0x1234);
        assert_eq!(record.register_mask(&table), 0x0100_0000);
    }

    #[test]
    fn all_dead_map_is_bitmap_only() {
        let mut builder = SafepointTableBuilder::new(0);
        builder.add_safepoint(SafepointEntry {
            variables: vec![None, None],
            ..Default::default()
        });
        let table = builder.encode();
        assert_eq!(table.catalog_count(), 0);
        let record = table.safepoint_at(0);
        assert!(record.has_variable_map(&table));
        let map = table.variable_map_of(&record, 2).unwrap();
        assert_eq!(map.live_count(2), 0);
        assert_eq!(map.location_of(0, 2, &table), None);
        assert_eq!(map.location_of(1, 2, &table), None);
        // Record is just the 1-byte map offset; the map is one bitmap byte.
        assert_eq!(table.size_in_bytes(), 21 + 1 + 1);
    }

    #[test]
    fn safepoint_without_variables_has_no_map() {
        let mut builder = SafepointTableBuilder::new(0);
        builder.add_safepoint(SafepointEntry {
            variables: vec![],
            ..Default::default()
        });
        builder.add_safepoint(SafepointEntry {
            variables: vec![Some(Location::register(2))],
            ..Default::default()
        });
        let table = builder.encode();
        assert!(!table.safepoint_at(0).has_variable_map(&table));
        assert!(table.safepoint_at(1).has_variable_map(&table));
    }

    #[test]
    fn empty_table_is_header_only() {
        let table = SafepointTableBuilder::new(16).encode();
        assert_eq!(table.safepoint_count(), 0);
        assert_eq!(table.catalog_count(), 0);
        assert_eq!(table.size_in_bytes(), 21);
        assert_eq!(table.safepoints().count(), 0);
    }

    fn random_location(rng: &mut ChaCha8Rng) -> Location {
        let value = rng.random_range(0..300);
        match rng.random_range(0..4) {
            0 => Location::register(value),
            1 => Location::fpu_register(value),
            2 => Location::stack_slot(value),
            _ => Location::constant(value),
        }
    }

    #[test]
    fn randomized_round_trip() {
        const STACK_MASK_BITS: u32 = 19;
        let mut rng = ChaCha8Rng::seed_from_u64(0x5afe_90a7_15b1_7ab1);
        let mut builder = SafepointTableBuilder::new(STACK_MASK_BITS);
        let mut entries = Vec::new();
        for _ in 0..40 {
            let variables = (0..rng.random_range(0..10usize))
                .map(|_| rng.random_bool(0.4).then(|| random_location(&mut rng)))
                .collect();
            let inline_frames = (0..rng.random_range(0..3usize))
                .map(|_| InlineFrameEntry {
                    instruction_offset: rng.random_range(0..0x400),
                    method_index: rng.random_range(0..0x2_0000),
                    variables: (0..rng.random_range(0..5usize))
                        .map(|_| rng.random_bool(0.5).then(|| random_location(&mut rng)))
                        .collect(),
                })
                .collect();
            let entry = SafepointEntry {
                instruction_offset: rng.random_range(0..0x300),
                native_offset: rng.random_range(0..0x1_0000),
                register_mask: rng.random_range(0..0x1_0000),
                live_stack_slots: (0..rng.random_range(0..6usize))
                    .map(|_| rng.random_range(0..STACK_MASK_BITS))
                    .collect(),
                variables,
                inline_frames,
            };
            entries.push(entry.clone());
            builder.add_safepoint(entry);
        }
        let table = builder.encode();

        assert_eq!(table.safepoint_count(), entries.len());
        for (index, entry) in entries.iter().enumerate() {
            let record = table.safepoint_at(index);
            assert_eq!(record.instruction_offset(&table), entry.instruction_offset);
            assert_eq!(record.native_offset(&table), entry.native_offset);
            assert_eq!(record.register_mask(&table), entry.register_mask);

            let mask = record.stack_mask(&table);
            for slot in 0..STACK_MASK_BITS {
                let expected = entry.live_stack_slots.contains(&slot);
                assert_eq!(mask.load_bit(slot as usize), expected);
            }

            let num_variables = entry.variables.len() as u16;
            match table.variable_map_of(&record, num_variables) {
                Some(map) => {
                    for (number, expected) in entry.variables.iter().enumerate() {
                        assert_eq!(
                            map.location_of(number as u16, num_variables, &table),
                            *expected
                        );
                    }
                }
                None => assert!(entry.variables.is_empty()),
            }

            match table.inline_info_of(&record) {
                Some(inline_info) => {
                    assert_eq!(inline_info.depth(), entry.inline_frames.len());
                    for (depth, frame) in entry.inline_frames.iter().enumerate() {
                        assert_eq!(
                            inline_info.instruction_offset_at_depth(&table, depth),
                            frame.instruction_offset
                        );
                        assert_eq!(
                            inline_info.method_index_at_depth(&table, depth),
                            frame.method_index
                        );
                        let count = frame.variables.len() as u16;
                        match table.variable_map_at_depth(&inline_info, depth, count) {
                            Some(map) => {
                                for (number, expected) in frame.variables.iter().enumerate() {
                                    assert_eq!(
                                        map.location_of(number as u16, count, &table),
                                        *expected
                                    );
                                }
                            }
                            None => assert!(frame.variables.is_empty()),
                        }
                    }
                }
                None => assert!(entry.inline_frames.is_empty()),
            }
        }
    }
}
