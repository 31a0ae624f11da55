//! Different implementations of a common async API for use in Burrow
//!
//! Currently only tokio is provided.

pub(crate) mod tokio;
