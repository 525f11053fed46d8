//! Human-readable rendering of an encoded table.
//!
//! Debug aid for compiler and runtime developers, built strictly on the
//! public decode API so the codec stays testable without it. Inlined
//! frames are listed without their variable maps: each inlined method's
//! variable count is knowledge the caller has and this renderer does not.

use std::fmt;
use std::fmt::Write;

use crate::table::SafepointTable;

/// Write a multi-line description of `table` to `out`. `num_variables` is
/// the variable count of the method the table describes.
pub fn dump(
    out: &mut impl Write,
    table: &SafepointTable,
    num_variables: u16,
) -> fmt::Result {
    writeln!(
        out,
        "safepoint table: {} bytes, {} safepoints, {} catalog entries, \
         record size {}, stack mask {} bits, inline info: {}",
        table.size_in_bytes(),
        table.safepoint_count(),
        table.catalog_count(),
        table.record_size(),
        table.stack_mask_bits(),
        if table.has_inline_info() { "yes" } else { "no" },
    )?;

    let catalog = table.catalog();
    for index in 0..catalog.len() {
        writeln!(out, "  catalog[{}]: {}", index, catalog.location_at(index))?;
    }

    for (index, record) in table.safepoints().enumerate() {
        write!(
            out,
            "  safepoint {}: instruction offset {:#x}, native offset {:#x}, \
             register mask {:#b}, stack mask 0b",
            index,
            record.instruction_offset(table),
            record.native_offset(table),
            record.register_mask(table),
        )?;
        let stack_mask = record.stack_mask(table);
        for bit in (0..table.stack_mask_bits() as usize).rev() {
            write!(out, "{}", stack_mask.load_bit(bit) as u8)?;
        }
        writeln!(out)?;

        if let Some(map) = table.variable_map_of(&record, num_variables) {
            for variable in 0..num_variables {
                if let Some(location) = map.location_of(variable, num_variables, table) {
                    writeln!(out, "    v{}: {}", variable, location)?;
                }
            }
        }

        if let Some(inline_info) = table.inline_info_of(&record) {
            for depth in 0..inline_info.depth() {
                writeln!(
                    out,
                    "    inlined at depth {}: method {} at instruction offset {:#x}{}",
                    depth,
                    inline_info.method_index_at_depth(table, depth),
                    inline_info.instruction_offset_at_depth(table, depth),
                    if inline_info.has_variable_map_at_depth(table, depth) {
                        " (has variable map)"
                    } else {
                        ""
                    },
                )?;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::{SafepointEntry, SafepointTableBuilder};
    use crate::location::Location;

    #[test]
    fn dump_renders_catalog_and_safepoints() {
        let mut builder = SafepointTableBuilder::new(8);
        builder.add_safepoint(SafepointEntry {
            instruction_offset: 1,
            native_offset: 0x10,
            register_mask: 0b10,
            live_stack_slots: vec![4],
            variables: vec![Some(Location::register(1)), Some(Location::stack_slot(4))],
            ..Default::default()
        });
        let table = builder.encode();

        let mut rendered = String::new();
        dump(&mut rendered, &table, 2).unwrap();
        assert!(rendered.contains("1 safepoints"));
        assert!(rendered.contains("catalog[0]: r1"));
        assert!(rendered.contains("catalog[1]: stack[4]"));
        assert!(rendered.contains("v0: r1"));
        assert!(rendered.contains("v1: stack[4]"));
        assert!(rendered.contains("stack mask 0b00010000"));
    }
}
