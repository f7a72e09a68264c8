//! objst Store - embedded key-value store binding
//!
//! Each [`KvStore`] is one redb database living in its own directory. A
//! bucket opens three of them; nothing in this crate spans two stores.

pub mod error;
pub mod store;
pub mod tables;

// Re-exports
pub use error::{StoreError, StoreResult};
pub use store::{CompactionOutcome, KvStore, StoreOptions, WriteBatch};

#[cfg(any(test, feature = "testutil"))]
pub use store::StoreHold;
