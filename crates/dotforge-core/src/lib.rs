//! Dotforge Core Library
//!
//! This crate provides the persistence layer for Dotforge, including:
//! - Storage drivers (SQLite, in-memory SQLite, PostgreSQL) behind one
//!   capability interface
//! - A process-wide driver registry keyed by backend kind
//! - Per-backend SQL dialect strategies
//! - Versioned schema migrations with a probe-and-revert pending check
//! - A version gate that skips the schema probe when the binary version
//!   is unchanged
//! - Credential records that reference secrets instead of storing them

pub mod config;
pub mod credentials;
pub mod error;
pub mod migrate;
pub mod storage;

pub use error::{Error, Result};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::{BackendKind, DriverConfig};
    pub use crate::credentials::{Credential, CredentialScope};
    pub use crate::error::{Error, Result};
    pub use crate::storage::driver::{Driver, ExecResult, Row, Value};
}
