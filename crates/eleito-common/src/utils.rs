//! Utility functions

use uuid::Uuid;

/// Build a default replica identity from the local hostname plus a random
/// suffix, so multiple replicas on the same host stay distinguishable.
pub fn default_identity() -> String {
    let host = hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .filter(|h| !h.is_empty())
        .unwrap_or_else(|| "unknown-host".to_string());

    format!("{}_{}", host, Uuid::new_v4())
}
