//! Shared-secret access gate
//!
//! Reviewer mode and admin mode are each unlocked by one shared key taken
//! from the environment. Keys never appear in logs: they are wrapped in
//! [`SecretString`], which redacts itself when formatted.

use sdk::errors::ScreenerError;
use std::fmt;
use tracing::{debug, warn};

use crate::config::AccessConfig;

/// A wrapper for sensitive string data that prevents accidental logging.
///
/// It implements `Debug` and `Display` to always print `[REDACTED]`.
/// To access the actual secret value, use the `unsecure()` method.
#[derive(Clone, PartialEq, Eq)]
pub struct SecretString(String);

impl SecretString {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Access the raw underlying string
    pub fn unsecure(&self) -> &str {
        &self.0
    }

    /// Compare without exiting early on the first differing byte
    fn matches(&self, other: &SecretString) -> bool {
        let a = self.0.as_bytes();
        let b = other.0.as_bytes();
        if a.len() != b.len() {
            return false;
        }
        a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
    }
}

impl fmt::Debug for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SecretString([REDACTED])")
    }
}

impl fmt::Display for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[REDACTED]")
    }
}

impl From<String> for SecretString {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for SecretString {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Which mode a key unlocks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessRole {
    Reviewer,
    Admin,
}

impl fmt::Display for AccessRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccessRole::Reviewer => write!(f, "reviewer"),
            AccessRole::Admin => write!(f, "admin"),
        }
    }
}

/// Holds the configured keys and checks supplied ones against them
#[derive(Debug, Clone)]
pub struct AccessGate {
    reviewer_key_env: String,
    admin_key_env: String,
    reviewer_key: Option<SecretString>,
    admin_key: Option<SecretString>,
}

impl AccessGate {
    /// Read both keys from the variables named in `[access]`
    ///
    /// Missing or empty variables are not an error here; they surface as
    /// `AccessKeyNotConfigured` when the matching mode is requested.
    pub fn from_env(config: &AccessConfig) -> Self {
        let read = |name: &str| {
            std::env::var(name)
                .ok()
                .filter(|v| !v.is_empty())
                .map(SecretString::from)
        };

        Self {
            reviewer_key: read(&config.reviewer_key_env),
            admin_key: read(&config.admin_key_env),
            reviewer_key_env: config.reviewer_key_env.clone(),
            admin_key_env: config.admin_key_env.clone(),
        }
    }

    /// Build a gate from explicit keys
    pub fn with_keys(
        config: &AccessConfig,
        reviewer_key: Option<SecretString>,
        admin_key: Option<SecretString>,
    ) -> Self {
        Self {
            reviewer_key_env: config.reviewer_key_env.clone(),
            admin_key_env: config.admin_key_env.clone(),
            reviewer_key,
            admin_key,
        }
    }

    /// Check `supplied` against the key for `role`
    pub fn verify(&self, role: AccessRole, supplied: &SecretString) -> Result<(), ScreenerError> {
        let (expected, env_name) = match role {
            AccessRole::Reviewer => (&self.reviewer_key, &self.reviewer_key_env),
            AccessRole::Admin => (&self.admin_key, &self.admin_key_env),
        };

        let expected = expected
            .as_ref()
            .ok_or_else(|| ScreenerError::AccessKeyNotConfigured(env_name.clone()))?;

        if expected.matches(supplied) {
            debug!(%role, "Access granted");
            Ok(())
        } else {
            warn!(%role, "Access denied");
            Err(ScreenerError::AccessDenied)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gate() -> AccessGate {
        AccessGate::with_keys(
            &AccessConfig::default(),
            Some(SecretString::from("review-me")),
            Some(SecretString::from("admin-me")),
        )
    }

    #[test]
    fn test_secret_string_redacts() {
        let secret = SecretString::from("hunter2");
        assert_eq!(format!("{}", secret), "[REDACTED]");
        assert_eq!(format!("{:?}", secret), "SecretString([REDACTED])");
        assert_eq!(secret.unsecure(), "hunter2");
    }

    #[test]
    fn test_gate_debug_does_not_leak_keys() {
        let rendered = format!("{:?}", gate());
        assert!(!rendered.contains("review-me"));
        assert!(!rendered.contains("admin-me"));
    }

    #[test]
    fn test_correct_keys_accepted() {
        let gate = gate();
        gate.verify(AccessRole::Reviewer, &"review-me".into())
            .unwrap();
        gate.verify(AccessRole::Admin, &"admin-me".into()).unwrap();
    }

    #[test]
    fn test_keys_are_not_interchangeable() {
        let gate = gate();
        let err = gate
            .verify(AccessRole::Admin, &"review-me".into())
            .unwrap_err();
        assert!(matches!(err, ScreenerError::AccessDenied));

        let err = gate
            .verify(AccessRole::Reviewer, &"review-m".into())
            .unwrap_err();
        assert!(matches!(err, ScreenerError::AccessDenied));
    }

    #[test]
    fn test_missing_key_reports_variable_name() {
        let gate = AccessGate::with_keys(&AccessConfig::default(), None, None);
        let err = gate
            .verify(AccessRole::Admin, &"anything".into())
            .unwrap_err();
        assert!(
            matches!(err, ScreenerError::AccessKeyNotConfigured(ref name) if name == "SCREENER_ADMIN_KEY")
        );
    }
}
