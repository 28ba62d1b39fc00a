//! # Memory Management
//!
//! Segmented pools backing component storage.
//!
//! ## Design Philosophy
//!
//! - Slots are stable until released
//! - Released slots are reused before the pool grows
//! - Growth appends a segment, nothing is moved

mod pool;

pub use pool::{PoolAllocator, PoolHandle};
