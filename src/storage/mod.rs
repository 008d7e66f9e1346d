//! Storage layer for propgate.
//!
//! The traits define the plain CRUD collaborator the engine wraps; the
//! in-memory backend is the reference implementation used for embedding
//! and tests.

mod memory;
mod traits;

pub use memory::InMemoryPropertyStore;
pub use traits::{
    FieldFence, FieldSearch, FieldStore, GroupStore, SearchCursor, StorageError, ValueSearch,
    ValueStore,
};
