//! Storage implementations of the entity store

pub mod in_memory;

pub use in_memory::InMemoryStore;
