//! Compact safepoint metadata tables for managed runtimes.
//!
//! A JIT or AOT compiler records, for every safepoint it emits, which
//! registers and stack slots hold live object references, where each
//! interpreter-visible variable currently lives, and the chain of frames
//! it inlined there. This crate encodes all of that into one
//! self-describing byte buffer per compiled method, and decodes it again
//! with zero-copy views, so the garbage collector can scan a suspended
//! frame and the deoptimizer can rebuild interpreter state without locks.
//!
//! The format is aggressively size-minimized. Every integer field is
//! stored at the smallest byte width (0 to 4) that covers the largest
//! value it takes anywhere in the table; fields that can be absent reserve
//! their all-ones pattern instead of spending flag bytes; identical
//! variable locations are deduplicated into a per-table catalog; and a
//! variable map spends one bit on each dead variable. Records stay fixed
//! size within a table, so looking up a safepoint by index is O(1).
//!
//! Encode with [`SafepointTableBuilder`], publish the resulting
//! [`SafepointTable`] alongside the compiled code (it is immutable and
//! freely shared across threads), and decode through
//! [`SafepointTable::safepoint_at`] and the view types it hands out.
//!
//! There is no format version and no corruption checking: the encoder and
//! decoder ship in the same build, and the table's lifetime is tied to the
//! compiled code it describes.

#[macro_use]
extern crate log;

mod builder;
mod encoding;
mod inline_info;
mod location;
mod record;
mod table;
mod variable_map;

pub mod dump;
pub mod util;

pub use crate::builder::{InlineFrameEntry, SafepointEntry, SafepointTableBuilder};
pub use crate::inline_info::InlineInfo;
pub use crate::location::{Location, LocationCatalog, LocationKind};
pub use crate::record::SafepointRecord;
pub use crate::table::SafepointTable;
pub use crate::util::memory_region::MemoryRegion;
pub use crate::variable_map::VariableMap;
