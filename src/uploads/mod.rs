//! File uploads.
//!
//! Files land in the configured upload directory under generated names.
//! Metadata is not persisted; the announcement to `/events` subscribers and
//! the HTTP response are the only records of an upload.

pub mod routes;
pub mod store;

pub use store::{BlobStore, StoreError, StoredBlob};
