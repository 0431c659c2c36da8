//! Eleito Kube - Kubernetes Lease-backed lock store
//!
//! Maps the eleito lock record onto a `coordination.k8s.io/v1` Lease
//! object, using `metadata.resourceVersion` as the optimistic
//! concurrency token. Replicas running in the same cluster elect through
//! the apiserver with no extra infrastructure.

mod lease;

pub use lease::KubeLeaseStore;
