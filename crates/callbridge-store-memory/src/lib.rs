//! In-memory backend for the callbridge call registry.
//!
//! Records live for the lifetime of the process. Nothing is evicted and
//! nothing is persisted.

mod registry;

pub use registry::CallRegistry;
