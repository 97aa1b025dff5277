// src/storage/mod.rs
//! Shared-file storage layer: object store backends, the distributed lock
//! marker, and the scoped sync sessions built on both.

pub mod gcs_auth;
pub mod lock;
pub mod object_store;
pub mod sync;

pub use gcs_auth::GcsTokenProvider;
pub use lock::{LockError, LockHandle, LockManager};
pub use object_store::{GcsStore, LocalStore, ObjectStore};
pub use sync::{SessionFuture, SyncManager};
