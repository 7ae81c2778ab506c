//! Process-wide driver registry
//!
//! The one piece of deliberately global mutable state in the crate: a
//! concurrency-safe map from backend kind to driver constructor. Built-in
//! drivers install themselves on first use; later registrations for the same
//! kind overwrite earlier ones, which is intentional so tests can swap in
//! doubles at process init.

use crate::config::{BackendKind, DriverConfig};
use crate::error::{Error, Result};
use crate::storage::driver::Driver;
use crate::storage::postgres::PostgresDriver;
use crate::storage::sqlite::SqliteDriver;
use std::collections::HashMap;
use std::sync::{LazyLock, Once, RwLock};

/// Constructor for one backend kind.
///
/// Constructors are cheap and synchronous; the returned driver connects
/// lazily.
pub type DriverCtor = fn(&DriverConfig) -> Result<Box<dyn Driver>>;

static REGISTRY: LazyLock<RwLock<HashMap<BackendKind, DriverCtor>>> =
    LazyLock::new(|| RwLock::new(HashMap::new()));

static DEFAULTS: Once = Once::new();

fn sqlite_ctor(config: &DriverConfig) -> Result<Box<dyn Driver>> {
    Ok(Box::new(SqliteDriver::new(config)?))
}

fn postgres_ctor(config: &DriverConfig) -> Result<Box<dyn Driver>> {
    Ok(Box::new(PostgresDriver::new(config)?))
}

/// Install the built-in drivers exactly once.
///
/// Runs before any registration or lookup, so a custom registration made
/// during process init always lands on top of the defaults.
fn install_defaults() {
    DEFAULTS.call_once(|| {
        let mut map = REGISTRY.write().unwrap();
        map.insert(BackendKind::Sqlite, sqlite_ctor as DriverCtor);
        map.insert(BackendKind::Memory, sqlite_ctor as DriverCtor);
        map.insert(BackendKind::Postgres, postgres_ctor as DriverCtor);
    });
}

/// Register a constructor for a backend kind.
///
/// Last registration wins; overwriting is not an error.
pub fn register(kind: BackendKind, ctor: DriverCtor) {
    install_defaults();
    REGISTRY.write().unwrap().insert(kind, ctor);
}

/// Construct a driver for `config.kind`.
///
/// Fails with [`Error::UnsupportedBackend`] when no constructor is
/// registered for the kind.
pub fn create(config: &DriverConfig) -> Result<Box<dyn Driver>> {
    install_defaults();
    let ctor = {
        let map = REGISTRY.read().unwrap();
        map.get(&config.kind).copied()
    };
    match ctor {
        Some(ctor) => ctor(config),
        None => Err(Error::UnsupportedBackend(config.kind.to_string())),
    }
}

/// Whether a constructor is registered for the kind
pub fn is_registered(kind: BackendKind) -> bool {
    install_defaults();
    REGISTRY.read().unwrap().contains_key(&kind)
}

/// All kinds with a registered constructor
pub fn registered_kinds() -> Vec<BackendKind> {
    install_defaults();
    let mut kinds: Vec<BackendKind> = REGISTRY.read().unwrap().keys().copied().collect();
    kinds.sort_by_key(|k| k.as_str());
    kinds
}
