//! Shared storage for fetched rate snapshots.

pub mod memory;

pub use memory::RateStore;
