use crate::prune::PruneReport;

/// Change notifications published by the [`ContextStore`](crate::ContextStore).
#[derive(Clone, Debug, PartialEq)]
pub enum ContextEvent {
    Added { sequence_id: i64 },
    Replaced { count: usize },
    Cleared,
    Pruned { reason: String, report: PruneReport },
}
