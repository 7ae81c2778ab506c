//! Storage drivers and backend abstraction
//!
//! The rest of the application reaches every backend through the
//! [`driver::Driver`] trait. Drivers are constructed through the
//! [`registry`], which maps backend kinds to constructors; SQL fragments that
//! differ per engine come from [`dialect`].

pub mod compat;
pub mod dialect;
pub mod driver;
pub mod postgres;
pub mod registry;
pub mod sqlite;

pub use dialect::{Dialect, dialect_for};
pub use driver::{Driver, ExecResult, Row, Transaction, Value};
pub use registry::{create, is_registered, register, registered_kinds};
