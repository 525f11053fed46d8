//! Variable locations and the deduplicated location catalog.
//!
//! Every live interpreter variable at a safepoint resolves to a
//! [`Location`]: which machine register, stack slot, or constant currently
//! holds its value. Identical locations are stored once in a per-table
//! catalog and referenced by index from the variable maps, so a variable
//! that sits in the same register across a hundred safepoints costs one
//! catalog entry plus a hundred small indices.

use std::fmt;

use crate::encoding;
use crate::util::memory_region::MemoryRegion;
use static_assertions::const_assert_eq;
use strum_macros::FromRepr;

/// Where a variable's value resides.
#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, FromRepr)]
pub enum LocationKind {
    /// A general-purpose machine register, identified by number.
    InRegister = 0,
    /// A floating-point machine register, identified by number.
    InFpuRegister = 1,
    /// A stack slot of the current frame, identified by slot index.
    InStack = 2,
    /// A compile-time constant; the value is the constant itself.
    Constant = 3,
}

/// A (kind, value) pair describing where one variable's value resides.
///
/// Dead variables have no `Location`; they appear as `None` throughout the
/// decode API and occupy nothing on the wire beyond a cleared live bit.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Location {
    pub kind: LocationKind,
    pub value: u32,
}

const_assert_eq!(std::mem::size_of::<Location>(), 8);

impl Location {
    pub const fn register(number: u32) -> Self {
        Self {
            kind: LocationKind::InRegister,
            value: number,
        }
    }

    pub const fn fpu_register(number: u32) -> Self {
        Self {
            kind: LocationKind::InFpuRegister,
            value: number,
        }
    }

    pub const fn stack_slot(slot: u32) -> Self {
        Self {
            kind: LocationKind::InStack,
            value: slot,
        }
    }

    pub const fn constant(value: u32) -> Self {
        Self {
            kind: LocationKind::Constant,
            value,
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            LocationKind::InRegister => write!(f, "r{}", self.value),
            LocationKind::InFpuRegister => write!(f, "fr{}", self.value),
            LocationKind::InStack => write!(f, "stack[{}]", self.value),
            LocationKind::Constant => write!(f, "#{}", self.value),
        }
    }
}

/// Decode view of the location catalog: `count` entries back-to-back, each
/// one kind byte followed by a value of the table's catalog value width.
///
/// No two entries hold an equal (kind, value) pair; the encoder guarantees
/// this when it interns locations.
#[derive(Clone, Copy)]
pub struct LocationCatalog<'a> {
    region: MemoryRegion<'a>,
    value_width: usize,
}

impl<'a> LocationCatalog<'a> {
    pub(crate) fn new(region: MemoryRegion<'a>, value_width: usize) -> Self {
        Self {
            region,
            value_width,
        }
    }

    fn entry_size(&self) -> usize {
        1 + self.value_width
    }

    /// The number of catalog entries.
    pub fn len(&self) -> usize {
        self.region.size() / self.entry_size()
    }

    pub fn is_empty(&self) -> bool {
        self.region.size() == 0
    }

    /// The kind byte of entry `index`, without decoding the value.
    pub fn kind_at(&self, index: usize) -> LocationKind {
        debug_assert!(index < self.len(), "catalog index {} out of range", index);
        let raw = self.region.load_u8(index * self.entry_size());
        LocationKind::from_repr(raw).expect("invalid location kind byte")
    }

    /// Entry `index` as a full (kind, value) pair.
    pub fn location_at(&self, index: usize) -> Location {
        let offset = index * self.entry_size();
        let value = encoding::load_at(self.region, self.value_width, offset + 1);
        Location {
            kind: self.kind_at(index),
            value,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_round_trips_through_its_repr() {
        for kind in [
            LocationKind::InRegister,
            LocationKind::InFpuRegister,
            LocationKind::InStack,
            LocationKind::Constant,
        ] {
            assert_eq!(LocationKind::from_repr(kind as u8), Some(kind));
        }
        assert_eq!(LocationKind::from_repr(4), None);
    }

    #[test]
    fn display_is_compact() {
        assert_eq!(Location::register(1).to_string(), "r1");
        assert_eq!(Location::fpu_register(2).to_string(), "fr2");
        assert_eq!(Location::stack_slot(4).to_string(), "stack[4]");
        assert_eq!(Location::constant(7).to_string(), "#7");
    }
}
