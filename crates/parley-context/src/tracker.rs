//! Freshness of external resources mirrored into the context.
//!
//! The tracker never touches storage directly: live state comes from an
//! injected [`LiveProbe`]. [`FsProbe`] is the filesystem implementation.

use std::path::Path;
use std::sync::Arc;
use std::time::UNIX_EPOCH;

use serde::Serialize;

use parley_core::{
    BehaviorLookup, Message, Part, PartId, ResourceMeta, ResourceStatus, StatefulResource,
    ToolBehavior,
};

use crate::error::ProbeError;

/// Reads the live state of a resource.
pub trait LiveProbe: Send + Sync {
    /// `Ok(None)` means the resource no longer exists.
    fn stat(&self, resource_id: &str) -> Result<Option<ResourceMeta>, ProbeError>;
}

/// Treats resource ids as filesystem paths.
#[derive(Clone, Copy, Debug, Default)]
pub struct FsProbe;

impl LiveProbe for FsProbe {
    fn stat(&self, resource_id: &str) -> Result<Option<ResourceMeta>, ProbeError> {
        match std::fs::metadata(Path::new(resource_id)) {
            Ok(meta) => Ok(Some(file_meta(&meta).map_err(|reason| ProbeError::Failed {
                resource_id: resource_id.to_string(),
                reason,
            })?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(ProbeError::Failed {
                resource_id: resource_id.to_string(),
                reason: e.to_string(),
            }),
        }
    }
}

/// Modification time (ms since epoch) and size of a file.
pub fn file_meta(meta: &std::fs::Metadata) -> Result<ResourceMeta, String> {
    let modified = meta.modified().map_err(|e| e.to_string())?;
    let since_epoch = modified
        .duration_since(UNIX_EPOCH)
        .map_err(|e| e.to_string())?;
    Ok(ResourceMeta {
        last_modified: i64::try_from(since_epoch.as_millis()).unwrap_or(i64::MAX),
        size_bytes: i64::try_from(meta.len()).unwrap_or(i64::MAX),
    })
}

/// Compare a context snapshot against a probe result.
pub fn classify(
    snapshot: &ResourceMeta,
    live: Result<Option<ResourceMeta>, &ProbeError>,
) -> ResourceStatus {
    let live = match live {
        Err(_) => return ResourceStatus::Error,
        Ok(None) => return ResourceStatus::Deleted,
        Ok(Some(live)) => live,
    };
    match live.last_modified.cmp(&snapshot.last_modified) {
        std::cmp::Ordering::Greater => ResourceStatus::Stale,
        std::cmp::Ordering::Less => ResourceStatus::Older,
        // Timestamp resolution can be coarser than content changes.
        std::cmp::Ordering::Equal if live.size_bytes != snapshot.size_bytes => {
            ResourceStatus::Stale
        }
        std::cmp::Ordering::Equal => ResourceStatus::Valid,
    }
}

/// The resource a part carries, if it is a result of a stateful-replace tool
/// with a parseable snapshot.
pub fn stateful_resource(part: &Part, behaviors: &dyn BehaviorLookup) -> Option<StatefulResource> {
    let name = part.tool_name()?;
    let payload = part.result_payload()?;
    if behaviors.behavior_of(name) != ToolBehavior::StatefulReplace {
        return None;
    }
    StatefulResource::from_payload(payload)
}

/// Every stateful result in context, in context order.
pub fn stateful_parts<'a>(
    messages: &'a [Message],
    behaviors: &'a dyn BehaviorLookup,
) -> impl Iterator<Item = (&'a PartId, StatefulResource)> + 'a {
    messages
        .iter()
        .flat_map(|m| m.parts.iter())
        .filter_map(move |p| stateful_resource(p, behaviors).map(|r| (&p.id, r)))
}

/// Latest snapshot per distinct resource id. A later occurrence shadows
/// earlier ones and takes their place at the end of the list.
pub fn latest_resources(
    messages: &[Message],
    behaviors: &dyn BehaviorLookup,
) -> Vec<StatefulResource> {
    let mut latest: Vec<StatefulResource> = Vec::new();
    for (_, resource) in stateful_parts(messages, behaviors) {
        latest.retain(|r| r.resource_id != resource.resource_id);
        latest.push(resource);
    }
    latest
}

/// One row of the resource overview.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceRow {
    pub resource: StatefulResource,
    pub status: ResourceStatus,
}

/// Resource status queries against an injected probe.
#[derive(Clone)]
pub struct ResourceTracker {
    probe: Arc<dyn LiveProbe>,
}

impl ResourceTracker {
    pub fn new(probe: Arc<dyn LiveProbe>) -> Self {
        Self { probe }
    }

    pub fn filesystem() -> Self {
        Self::new(Arc::new(FsProbe))
    }

    /// Status of one snapshot against the live resource.
    pub fn status(&self, resource: &StatefulResource) -> ResourceStatus {
        let live = self.probe.stat(&resource.resource_id);
        if let Err(e) = &live {
            tracing::warn!(resource_id = %resource.resource_id, error = %e, "resource probe failed");
        }
        classify(&resource.meta(), live.as_ref().map(|m| *m))
    }

    /// Status of a resource id in the given context.
    pub fn status_of(
        &self,
        messages: &[Message],
        behaviors: &dyn BehaviorLookup,
        resource_id: &str,
    ) -> ResourceStatus {
        latest_resources(messages, behaviors)
            .iter()
            .find(|r| r.resource_id == resource_id)
            .map_or(ResourceStatus::NotInContext, |r| self.status(r))
    }

    /// One row per distinct resource id, latest occurrence only.
    pub fn overview(&self, messages: &[Message], behaviors: &dyn BehaviorLookup) -> Vec<ResourceRow> {
        latest_resources(messages, behaviors)
            .into_iter()
            .map(|resource| {
                let status = self.status(&resource);
                ResourceRow { resource, status }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    use parley_core::Role;
    use serde_json::json;

    /// Scripted probe: id -> live state.
    #[derive(Default)]
    struct MapProbe(Mutex<HashMap<String, Result<Option<ResourceMeta>, String>>>);

    impl MapProbe {
        fn set(&self, id: &str, value: Result<Option<ResourceMeta>, String>) {
            self.0.lock().unwrap().insert(id.to_string(), value);
        }
    }

    impl LiveProbe for MapProbe {
        fn stat(&self, resource_id: &str) -> Result<Option<ResourceMeta>, ProbeError> {
            match self.0.lock().unwrap().get(resource_id) {
                Some(Ok(v)) => Ok(*v),
                Some(Err(reason)) => Err(ProbeError::Failed {
                    resource_id: resource_id.to_string(),
                    reason: reason.clone(),
                }),
                None => Ok(None),
            }
        }
    }

    fn meta(last_modified: i64, size_bytes: i64) -> ResourceMeta {
        ResourceMeta {
            last_modified,
            size_bytes,
        }
    }

    fn behaviors() -> HashMap<String, ToolBehavior> {
        HashMap::from([("read_file".to_string(), ToolBehavior::StatefulReplace)])
    }

    fn read_result(path: &str, t: i64, size: i64) -> Message {
        let mut payload = json!({"content": "..."}).as_object().cloned().unwrap();
        StatefulResource::new(path, t, size).write_into(&mut payload);
        Message::new(Role::Tool, vec![Part::tool_result("c", "read_file", payload)])
    }

    #[test]
    fn decision_table() {
        let snap = meta(100, 10);
        let err = ProbeError::Failed {
            resource_id: "x".into(),
            reason: "denied".into(),
        };
        assert_eq!(classify(&snap, Ok(None)), ResourceStatus::Deleted);
        assert_eq!(classify(&snap, Err(&err)), ResourceStatus::Error);
        assert_eq!(classify(&snap, Ok(Some(meta(101, 10)))), ResourceStatus::Stale);
        assert_eq!(classify(&snap, Ok(Some(meta(99, 10)))), ResourceStatus::Older);
        assert_eq!(classify(&snap, Ok(Some(meta(100, 11)))), ResourceStatus::Stale);
        assert_eq!(classify(&snap, Ok(Some(meta(100, 10)))), ResourceStatus::Valid);
    }

    #[test]
    fn timestamp_dominates_size() {
        let snap = meta(100, 10);
        assert_eq!(classify(&snap, Ok(Some(meta(99, 999)))), ResourceStatus::Older);
        assert_eq!(classify(&snap, Ok(Some(meta(200, 10)))), ResourceStatus::Stale);
    }

    #[test]
    fn overview_keeps_latest_occurrence() {
        let probe = Arc::new(MapProbe::default());
        probe.set("/a", Ok(Some(meta(2, 5))));
        probe.set("/b", Err("io".into()));
        let tracker = ResourceTracker::new(probe);

        let messages = vec![
            read_result("/a", 1, 5),
            read_result("/b", 1, 1),
            read_result("/a", 2, 5),
        ];
        let rows = tracker.overview(&messages, &behaviors());
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].resource.resource_id, "/b");
        assert_eq!(rows[0].status, ResourceStatus::Error);
        assert_eq!(rows[1].resource.last_modified, 2);
        assert_eq!(rows[1].status, ResourceStatus::Valid);
    }

    #[test]
    fn status_of_missing_resource() {
        let tracker = ResourceTracker::new(Arc::new(MapProbe::default()));
        let messages = vec![read_result("/a", 1, 5)];
        assert_eq!(
            tracker.status_of(&messages, &behaviors(), "/zzz"),
            ResourceStatus::NotInContext
        );
        assert_eq!(
            tracker.status_of(&messages, &behaviors(), "/a"),
            ResourceStatus::Deleted
        );
    }

    #[test]
    fn non_stateful_tools_are_ignored() {
        let mut payload = serde_json::Map::new();
        StatefulResource::new("/a", 1, 1).write_into(&mut payload);
        let msg = Message::new(Role::Tool, vec![Part::tool_result("c", "grep", payload)]);
        assert!(latest_resources(&[msg], &behaviors()).is_empty());
    }

    #[test]
    fn fs_probe_reports_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.txt");
        std::fs::write(&path, "hello").unwrap();

        let probe = FsProbe;
        let live = probe.stat(path.to_str().unwrap()).unwrap().unwrap();
        assert_eq!(live.size_bytes, 5);
        assert!(live.last_modified > 0);

        std::fs::remove_file(&path).unwrap();
        assert_eq!(probe.stat(path.to_str().unwrap()).unwrap(), None);
    }

    #[test]
    fn fs_tracker_detects_edit() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.txt");
        std::fs::write(&path, "hello").unwrap();
        let live = FsProbe.stat(path.to_str().unwrap()).unwrap().unwrap();
        let snapshot = StatefulResource::new(path.to_str().unwrap(), live.last_modified, live.size_bytes);

        let tracker = ResourceTracker::filesystem();
        assert_eq!(tracker.status(&snapshot), ResourceStatus::Valid);

        std::fs::write(&path, "hello, world").unwrap();
        assert_eq!(tracker.status(&snapshot), ResourceStatus::Stale);
    }
}
