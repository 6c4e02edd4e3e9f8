#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("duplicate tool registration: {0}")]
    DuplicateTool(String),

    #[error("provider {name} failed: {reason}")]
    Provider { name: String, reason: String },
}
