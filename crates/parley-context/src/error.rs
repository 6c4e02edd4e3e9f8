#[derive(Debug, thiserror::Error)]
pub enum ContextError {
    #[error("no message with sequence id {0}")]
    MessageNotFound(i64),

    #[error("message {sequence_id} has {len} parts, index {index} out of range")]
    PartIndexOutOfRange {
        sequence_id: i64,
        index: usize,
        len: usize,
    },
}

/// Failure to read the live state of an external resource.
#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    #[error("probe failed for {resource_id}: {reason}")]
    Failed { resource_id: String, reason: String },
}
