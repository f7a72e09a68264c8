//! objst Common - Shared types and utilities
//!
//! This crate provides the error type, identifier and name validation,
//! and configuration structures used across all objst components.

pub mod config;
pub mod error;
pub mod types;

pub use config::{BucketConfig, Config, HttpConfig, LoggingConfig, MaintenanceConfig, StoreConfig};
pub use error::{Error, IndexStep, Result, ValidationError};
pub use types::*;
