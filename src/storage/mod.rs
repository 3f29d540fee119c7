//! Storage engine behind every transport.
//!
//! A single in-memory backend guards the whole key space with one
//! reader/writer lock; the adapters only ever reach it through
//! [`StorageBackend`].

pub mod memory;
pub mod traits;

pub use memory::MemoryStorage;
pub use traits::*;
