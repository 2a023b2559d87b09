//! Host-side credential ports.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Name of the session cookie that doubles as refresh token.
pub const NPSSO_COOKIE: &str = "npsso";

/// Credentials as the host stores them: `{"cookies": {"npsso": "..."}}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredCredentials {
    #[serde(default)]
    pub cookies: BTreeMap<String, String>,
}

impl StoredCredentials {
    pub fn with_npsso(npsso: impl Into<String>) -> Self {
        let mut cookies = BTreeMap::new();
        cookies.insert(NPSSO_COOKIE.to_string(), npsso.into());
        Self { cookies }
    }

    /// The refresh token, if present and non-empty.
    pub fn npsso(&self) -> Option<&str> {
        self.cookies
            .get(NPSSO_COOKIE)
            .map(String::as_str)
            .filter(|value| !value.is_empty())
    }
}

/// Persists credentials whenever the session observes a rotated refresh token.
pub trait CredentialStore: Send + Sync {
    fn store(&self, credentials: &StoredCredentials);
}

/// Told once per episode that the session can no longer authenticate.
pub trait AuthLostNotifier: Send + Sync {
    fn auth_lost(&self);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_npsso_requires_non_empty_value() {
        assert_eq!(StoredCredentials::with_npsso("abc").npsso(), Some("abc"));
        assert_eq!(StoredCredentials::with_npsso("").npsso(), None);
        assert_eq!(StoredCredentials::default().npsso(), None);
    }

    #[test]
    fn test_deserializes_host_layout() {
        let creds: StoredCredentials =
            serde_json::from_str(r#"{"cookies": {"npsso": "token"}}"#).expect("parse should succeed");
        assert_eq!(creds.npsso(), Some("token"));

        let empty: StoredCredentials = serde_json::from_str("{}").expect("parse should succeed");
        assert_eq!(empty.npsso(), None);
    }
}
