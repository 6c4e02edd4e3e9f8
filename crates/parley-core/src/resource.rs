//! Stateful resources mirrored into the context.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Payload key under which a stateful tool result stores its resource snapshot.
pub const RESOURCE_KEY: &str = "resource";

/// Snapshot of an external resource (e.g. a file) as it was when read into context.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatefulResource {
    /// Stable external key, e.g. an absolute file path.
    pub resource_id: String,
    /// Modification time in milliseconds since the Unix epoch.
    pub last_modified: i64,
    pub size_bytes: i64,
}

impl StatefulResource {
    pub fn new(resource_id: impl Into<String>, last_modified: i64, size_bytes: i64) -> Self {
        Self {
            resource_id: resource_id.into(),
            last_modified,
            size_bytes,
        }
    }

    /// Parse the snapshot a stateful tool stored in its result payload.
    ///
    /// Returns `None` when the key is missing, malformed, or the resource id is
    /// blank. A blank id never identifies a resource.
    pub fn from_payload(payload: &Map<String, Value>) -> Option<Self> {
        let raw = payload.get(RESOURCE_KEY)?;
        let resource: Self = serde_json::from_value(raw.clone()).ok()?;
        if resource.resource_id.trim().is_empty() {
            return None;
        }
        Some(resource)
    }

    /// Store this snapshot into a result payload.
    pub fn write_into(&self, payload: &mut Map<String, Value>) {
        if let Ok(value) = serde_json::to_value(self) {
            payload.insert(RESOURCE_KEY.to_string(), value);
        }
    }

    pub fn meta(&self) -> ResourceMeta {
        ResourceMeta {
            last_modified: self.last_modified,
            size_bytes: self.size_bytes,
        }
    }
}

/// Live state of a resource as reported by a probe.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceMeta {
    pub last_modified: i64,
    pub size_bytes: i64,
}

/// Freshness of a context snapshot against the live resource. Always recomputed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResourceStatus {
    NotInContext,
    Valid,
    Stale,
    Older,
    Deleted,
    Error,
}

impl ResourceStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NotInContext => "NOT_IN_CONTEXT",
            Self::Valid => "VALID",
            Self::Stale => "STALE",
            Self::Older => "OLDER",
            Self::Deleted => "DELETED",
            Self::Error => "ERROR",
        }
    }
}

impl fmt::Display for ResourceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn payload_roundtrip() {
        let res = StatefulResource::new("/tmp/a.txt", 1_700_000_000_000, 12);
        let mut payload = Map::new();
        payload.insert("content".into(), json!("hello"));
        res.write_into(&mut payload);

        assert_eq!(payload["resource"]["resourceId"], "/tmp/a.txt");
        assert_eq!(StatefulResource::from_payload(&payload), Some(res));
    }

    #[test]
    fn blank_resource_id_is_not_stateful() {
        let payload = json!({"resource": {"resourceId": "  ", "lastModified": 1, "sizeBytes": 1}});
        assert_eq!(StatefulResource::from_payload(payload.as_object().unwrap()), None);
    }

    #[test]
    fn malformed_resource_is_not_stateful() {
        let missing = json!({"content": "x"});
        assert_eq!(StatefulResource::from_payload(missing.as_object().unwrap()), None);

        let wrong_shape = json!({"resource": "path"});
        assert_eq!(StatefulResource::from_payload(wrong_shape.as_object().unwrap()), None);

        let null_id = json!({"resource": {"resourceId": null, "lastModified": 1, "sizeBytes": 1}});
        assert_eq!(StatefulResource::from_payload(null_id.as_object().unwrap()), None);
    }

    #[test]
    fn status_display() {
        assert_eq!(ResourceStatus::NotInContext.to_string(), "NOT_IN_CONTEXT");
        assert_eq!(
            serde_json::to_string(&ResourceStatus::Stale).unwrap(),
            r#""STALE""#
        );
    }
}
