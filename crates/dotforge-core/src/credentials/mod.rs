//! Credential records and the plaintext-rejection contract
//!
//! A credential never carries a secret. It names an indirection — an OS
//! keychain entry or an environment variable — that is resolved at use time
//! by [`resolver`]. Validation is enforced twice: here at create/update, and
//! again by CHECK constraints in the credentials migration, so a caller that
//! bypasses this module and talks to storage directly is still rejected.

pub mod resolver;
pub mod store;

pub use store::CredentialStore;

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Source tag for OS-keychain indirection
pub const SOURCE_KEYCHAIN: &str = "keychain";

/// Source tag for environment-variable indirection
pub const SOURCE_ENV: &str = "env";

/// Hierarchy level a credential is attached to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialScope {
    Ecosystem,
    Domain,
    App,
    Workspace,
    Plugin,
    Theme,
    TerminalProfile,
}

impl CredentialScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ecosystem => "ecosystem",
            Self::Domain => "domain",
            Self::App => "app",
            Self::Workspace => "workspace",
            Self::Plugin => "plugin",
            Self::Theme => "theme",
            Self::TerminalProfile => "terminal_profile",
        }
    }
}

impl fmt::Display for CredentialScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CredentialScope {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "ecosystem" => Ok(Self::Ecosystem),
            "domain" => Ok(Self::Domain),
            "app" => Ok(Self::App),
            "workspace" => Ok(Self::Workspace),
            "plugin" => Ok(Self::Plugin),
            "theme" => Ok(Self::Theme),
            "terminal_profile" => Ok(Self::TerminalProfile),
            other => Err(Error::ConfigError(format!(
                "unknown credential scope: {other}"
            ))),
        }
    }
}

/// A stored reference to a secret, uniquely identified by
/// (scope, scope_id, name).
///
/// `value` is the legacy plaintext field; any record with it populated is
/// rejected on every code path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Credential {
    pub scope: CredentialScope,
    pub scope_id: String,
    pub name: String,
    /// One of [`SOURCE_KEYCHAIN`] or [`SOURCE_ENV`]
    pub source: String,
    /// Keychain service identifier (keychain source only)
    pub service: Option<String>,
    /// Environment variable name (env source only)
    pub env_var: Option<String>,
    /// Legacy plaintext field; must always be absent
    pub value: Option<String>,
}

impl Credential {
    /// A keychain-backed credential reference
    pub fn keychain(
        scope: CredentialScope,
        scope_id: impl Into<String>,
        name: impl Into<String>,
        service: impl Into<String>,
    ) -> Self {
        Self {
            scope,
            scope_id: scope_id.into(),
            name: name.into(),
            source: SOURCE_KEYCHAIN.to_string(),
            service: Some(service.into()),
            env_var: None,
            value: None,
        }
    }

    /// An environment-variable-backed credential reference
    pub fn env(
        scope: CredentialScope,
        scope_id: impl Into<String>,
        name: impl Into<String>,
        env_var: impl Into<String>,
    ) -> Self {
        Self {
            scope,
            scope_id: scope_id.into(),
            name: name.into(),
            source: SOURCE_ENV.to_string(),
            service: None,
            env_var: Some(env_var.into()),
            value: None,
        }
    }
}

/// Application-layer validation, applied to the full record on both create
/// and update so a valid record cannot be mutated into an invalid one.
pub fn validate(credential: &Credential) -> Result<()> {
    if credential
        .value
        .as_deref()
        .is_some_and(|v| !v.is_empty())
    {
        return Err(Error::PlaintextCredential(format!(
            "credential '{}' carries a plaintext value",
            credential.name
        )));
    }

    match credential.source.as_str() {
        SOURCE_KEYCHAIN => {
            if credential.service.as_deref().unwrap_or("").is_empty() {
                return Err(Error::MissingRequiredField("service"));
            }
        }
        SOURCE_ENV => {
            if credential.env_var.as_deref().unwrap_or("").is_empty() {
                return Err(Error::MissingRequiredField("env_var"));
            }
        }
        other => {
            return Err(Error::PlaintextCredential(format!(
                "source '{other}' is not an allowed indirection"
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env_credential() -> Credential {
        Credential::env(CredentialScope::App, "app-1", "db_url", "DATABASE_URL")
    }

    #[test]
    fn test_allowed_sources_accepted() {
        validate(&env_credential()).unwrap();
        validate(&Credential::keychain(
            CredentialScope::Ecosystem,
            "eco-1",
            "api_key",
            "dotforge",
        ))
        .unwrap();
    }

    #[test]
    fn test_disallowed_sources_rejected() {
        for source in ["value", "plaintext", "file", "vault", ""] {
            let mut credential = env_credential();
            credential.source = source.to_string();
            let err = validate(&credential).unwrap_err();
            assert!(
                matches!(err, Error::PlaintextCredential(_)),
                "source '{source}' should be rejected as not allowed"
            );
        }
    }

    #[test]
    fn test_plaintext_value_rejected_regardless_of_source() {
        for source in [SOURCE_KEYCHAIN, SOURCE_ENV, "vault"] {
            let mut credential = env_credential();
            credential.source = source.to_string();
            credential.service = Some("dotforge".to_string());
            credential.value = Some("hunter2".to_string());
            let err = validate(&credential).unwrap_err();
            assert!(matches!(err, Error::PlaintextCredential(_)));
        }
    }

    #[test]
    fn test_empty_legacy_value_is_tolerated() {
        let mut credential = env_credential();
        credential.value = Some(String::new());
        validate(&credential).unwrap();
    }

    #[test]
    fn test_missing_companion_fields_rejected() {
        let mut credential = env_credential();
        credential.env_var = None;
        assert!(matches!(
            validate(&credential),
            Err(Error::MissingRequiredField("env_var"))
        ));

        let mut credential =
            Credential::keychain(CredentialScope::App, "app-1", "api_key", "dotforge");
        credential.service = Some(String::new());
        assert!(matches!(
            validate(&credential),
            Err(Error::MissingRequiredField("service"))
        ));
    }

    #[test]
    fn test_scope_round_trip() {
        for scope in [
            CredentialScope::Ecosystem,
            CredentialScope::Domain,
            CredentialScope::App,
            CredentialScope::Workspace,
            CredentialScope::Plugin,
            CredentialScope::Theme,
            CredentialScope::TerminalProfile,
        ] {
            assert_eq!(scope.as_str().parse::<CredentialScope>().unwrap(), scope);
        }
        assert!("galaxy".parse::<CredentialScope>().is_err());
    }
}
