use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

macro_rules! branded_id {
    ($(#[$meta:meta])* $name:ident, $prefix:expr) => {
        $(#[$meta])*
        #[derive(Clone, Debug, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new() -> Self {
                Self(format!("{}_{}", $prefix, Uuid::now_v7()))
            }

            pub fn from_raw(s: impl Into<String>) -> Self {
                Self(s.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl FromStr for $name {
            type Err = std::convert::Infallible;
            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ok(Self(s.to_owned()))
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

branded_id!(
    /// Identifies one conversation session (and its persisted snapshot).
    SessionId,
    "sess"
);
branded_id!(
    /// Identity handle of a [`Part`](crate::parts::Part).
    ///
    /// Minted once when the part is constructed and carried through clones,
    /// pruning and persistence. Graph operations key on this, never on content.
    PartId,
    "part"
);
branded_id!(
    /// Identifies a background tool job.
    JobId,
    "job"
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_have_prefix() {
        assert!(SessionId::new().as_str().starts_with("sess_"));
        assert!(PartId::new().as_str().starts_with("part_"));
        assert!(JobId::new().as_str().starts_with("job_"));
    }

    #[test]
    fn ids_are_unique() {
        let a = PartId::new();
        let b = PartId::new();
        assert_ne!(a, b);
    }

    #[test]
    fn ids_order_by_creation() {
        let a = PartId::new();
        let b = PartId::new();
        assert!(a < b, "uuid v7 ids should sort by creation time");
    }

    #[test]
    fn from_raw_roundtrip() {
        let id = PartId::from_raw("part_custom");
        assert_eq!(id.as_str(), "part_custom");
        assert_eq!(id.to_string(), "part_custom");
        let parsed: PartId = "part_custom".parse().unwrap();
        assert_eq!(parsed, id);
    }

    #[test]
    fn serde_transparent() {
        let id = SessionId::from_raw("sess_abc");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, r#""sess_abc""#);
        let back: SessionId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }
}
