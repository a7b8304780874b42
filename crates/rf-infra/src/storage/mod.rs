//! Key/value storage adapters for the shared snapshot slots

mod file;
mod memory;

pub use file::FileKeyValueStore;
pub use memory::MemoryKeyValueStore;
