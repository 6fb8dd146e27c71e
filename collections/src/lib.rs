//! A small open-addressed map keyed by a field of its own value type,
//! built on `slab` + `hashbrown::HashTable` the way the server's client
//! table needs: stable indices for O(1) re-lookup across ticks, insertion
//! and removal without reshuffling every other entry.

pub mod map;

pub use map::{Entry, Index, Key, Map};
