//! Metric store variants.

pub mod file;
pub mod memory;
pub mod relational;

pub use file::FileStore;
pub use memory::MemoryStore;
pub use relational::RelationalStore;
