//! Use-time secret resolution
//!
//! Resolution follows the stored indirection: environment lookup for `env`
//! records, OS keyring lookup for `keychain` records. A missing secret is
//! `Ok(None)`, not an error; callers decide whether absence is fatal.

use crate::credentials::{Credential, SOURCE_ENV, SOURCE_KEYCHAIN};
use crate::error::{Error, Result};
use keyring::Entry;

/// Resolve the secret a credential record points at.
///
/// Returns `None` when the indirection target does not exist (env var unset,
/// no keyring entry). The keyring lookup keys the entry by the record's
/// service and name.
pub async fn resolve(credential: &Credential) -> Result<Option<String>> {
    match credential.source.as_str() {
        SOURCE_ENV => {
            let Some(var) = credential.env_var.as_deref().filter(|v| !v.is_empty()) else {
                return Err(Error::MissingRequiredField("env_var"));
            };
            match std::env::var(var) {
                Ok(value) => Ok(Some(value)),
                Err(std::env::VarError::NotPresent) => Ok(None),
                Err(e) => Err(Error::SecretResolution(format!(
                    "environment variable '{var}' is not readable: {e}"
                ))),
            }
        }
        SOURCE_KEYCHAIN => {
            let Some(service) = credential.service.as_deref().filter(|s| !s.is_empty()) else {
                return Err(Error::MissingRequiredField("service"));
            };
            let entry = Entry::new(service, &credential.name).map_err(|e| {
                Error::SecretResolution(format!("failed to open keyring entry: {e}"))
            })?;

            // keyring operations are blocking, so we spawn a blocking task
            let result = tokio::task::spawn_blocking(move || entry.get_password())
                .await
                .map_err(|e| Error::SecretResolution(format!("task join error: {e}")))?;
            match result {
                Ok(secret) => Ok(Some(secret)),
                Err(keyring::Error::NoEntry) => Ok(None),
                Err(e) => Err(Error::SecretResolution(format!(
                    "keyring lookup failed: {e}"
                ))),
            }
        }
        other => Err(Error::PlaintextCredential(format!(
            "source '{other}' is not an allowed indirection"
        ))),
    }
}
