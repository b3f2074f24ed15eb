//! Upload progress tracking
//!
//! This module provides the TTL store and the upload progress cache built on it.

pub use cache::UploadProgressCache;
pub use store::TtlStore;

mod cache;
mod store;
