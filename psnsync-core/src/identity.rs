//! Identity types for backend entities

use serde::{Deserialize, Serialize};
use std::fmt;

/// Seconds since the Unix epoch, UTC.
///
/// Used both for unlock times and as the freshness watermark of cached data.
pub type UnixTimestamp = i64;

macro_rules! define_string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }

            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

define_string_id!(
    /// Product identifier of a game as listed in the user's library
    /// (e.g. `CUSA07917_00`).
    GameId
);

define_string_id!(
    /// Backend identifier of a trophy-bearing title (e.g. `NPWR12784_00`).
    ///
    /// A game maps to zero (DLC), one, or many of these (bundles).
    CommunicationId
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_string_id_display_and_accessors() {
        let id = GameId::new("CUSA07917_00");
        assert_eq!(id.as_str(), "CUSA07917_00");
        assert_eq!(id.to_string(), "CUSA07917_00");
        assert_eq!(id.clone().into_inner(), "CUSA07917_00".to_string());
    }

    #[test]
    fn test_string_id_serializes_transparently() {
        let id = CommunicationId::from("NPWR12784_00");
        let json = serde_json::to_string(&id).expect("serialize should succeed");
        assert_eq!(json, "\"NPWR12784_00\"");
        let back: CommunicationId = serde_json::from_str(&json).expect("deserialize should succeed");
        assert_eq!(back, id);
    }
}
