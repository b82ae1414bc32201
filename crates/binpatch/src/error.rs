#[derive(Debug, thiserror::Error)]
pub enum PatchError {
    #[error("malformed patch: {0}")]
    Format(String),
    #[error("patch does not apply: {0}")]
    Apply(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
