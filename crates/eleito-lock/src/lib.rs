//! Eleito Lock - Lock record model and store adapter
//!
//! This crate provides:
//! - The versioned lock record representing the current lease holder
//! - The `LockStore` adapter trait (get/create/update with optimistic
//!   concurrency)
//! - An in-memory reference store used by tests and single-process demos

mod model;
mod store;

pub use model::*;
pub use store::*;
