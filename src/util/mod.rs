/// Bit and byte constants.
pub mod constants;
/// Built-in env_logger bootstrap.
pub mod logger;
/// Unaligned little-endian byte access and per-bit access over a byte range.
pub mod memory_region;

pub use self::memory_region::MemoryRegion;
