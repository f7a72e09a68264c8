//! objst - embedded object store
//!
//! An [`Object`] carries a name, an owner, string metadata and an opaque
//! payload. A [`Bucket`] persists objects across three key-value stores
//! (payload, name index, meta index) and answers point lookups and metadata
//! predicate scans described by a [`Query`].
//!
//! ```no_run
//! use objst::{Bucket, Object, OpContext, Query};
//! use objst_common::BucketConfig;
//! use std::io::Write;
//!
//! # fn main() -> objst_common::Result<()> {
//! let bucket = Bucket::open(BucketConfig::with_data_dir("/tmp/objst"))?;
//!
//! let mut obj = Object::new("photo.jpg", "u1")?;
//! obj.set_meta_key("contentType", "image/jpeg");
//! obj.write_all(&[0xFF, 0xD8])?;
//! bucket.create(&mut obj)?;
//!
//! let found = bucket.execute(&OpContext::background(), &Query::new().owner("u1").param("contentType", "image/jpeg"))?;
//! assert_eq!(found.into_objects().len(), 1);
//! # Ok(())
//! # }
//! ```

pub mod bucket;
pub mod context;
pub mod executor;
mod locks;
pub mod maintenance;
pub mod metadata;
pub mod model;
pub mod object;
pub mod query;
pub mod repair;

pub use bucket::Bucket;
pub use context::OpContext;
pub use executor::QueryResult;
pub use maintenance::{CycleReport, MaintenanceHandle};
pub use metadata::{CONTENT_TYPE, MetaKey, Metadata, SystemKey};
pub use model::ObjectModel;
pub use object::Object;
pub use query::{Action, Operation, Query};
pub use repair::{ConsistencyReport, NameEntry};

pub use objst_common::{Error, IndexStep, ObjectId, Result, ValidationError};
