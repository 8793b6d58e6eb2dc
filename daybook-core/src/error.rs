// Error types for the streaming session pipeline

use thiserror::Error;

/// Failure inside the underlying generation primitive. The engine is an
/// opaque collaborator, so this carries only its message.
#[derive(Debug, Clone, Error)]
#[error("generation engine failed: {0}")]
pub struct EngineError(pub String);

impl EngineError {
    pub fn new(msg: impl Into<String>) -> Self {
        EngineError(msg.into())
    }
}

/// Terminal outcomes of a session that are not normal completion.
///
/// All three kinds surface to the immediate caller; none are retried or
/// swallowed here. Absence of an extracted field is not an error.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The underlying generation call raised; the chunk channel closed
    /// without normal completion.
    #[error(transparent)]
    Generation(#[from] EngineError),

    /// No chunk arrived within the configured read window while the
    /// channel was still open. Text accumulated so far is retained.
    #[error("no output within the read timeout ({} chars received)", .partial.len())]
    ReadTimeout { partial: String },

    /// A raw extracted field could not be converted to its typed form.
    /// Aborts record construction for this session only.
    #[error("cannot coerce field '{field}' from captured value {value:?}")]
    Coercion { field: &'static str, value: String },
}

impl SessionError {
    /// Partial text retained by a timeout, if any.
    pub fn partial_text(&self) -> Option<&str> {
        match self {
            SessionError::ReadTimeout { partial } => Some(partial),
            _ => None,
        }
    }
}
