//! Reference implementations of the external collaborators

pub mod in_memory;

pub use in_memory::{InMemoryIdentifierService, InMemoryIndex, InMemoryRecordStore};
