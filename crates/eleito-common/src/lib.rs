//! Eleito Common - Shared types and utilities
//!
//! This crate provides the foundational types used across all eleito components:
//! - Error types
//! - Identity helpers
//! - Common constants

pub mod error;
pub mod utils;

// Re-exports for convenience
pub use error::{EleitoError, Result};
pub use utils::default_identity;

/// Default namespace used when no namespace is specified
pub const DEFAULT_NAMESPACE: &str = "default";

/// Default lock record name
pub const DEFAULT_LOCK_NAME: &str = "eleito-leader";

/// Separator between namespace and name when rendering a lock key
pub const KEY_SEPARATOR: &str = "::";
