//! Storage backends for the snapshot cache.
//!
//! - [`InMemoryStore`]: DashMap-backed, process-local
//! - [`FileStore`]: one file per key, survives restarts

pub mod traits;
pub mod memory;
pub mod file;

pub use traits::{KeyValueStore, StorageError};
pub use memory::InMemoryStore;
pub use file::FileStore;
