use js::{HALT_MARKER, ScriptError};
use thiserror::Error;

/// Failures surfaced by a DOM session.
///
/// A full mutation queue is not represented here: dropped mutations are
/// only logged.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Malformed startup input; the session is never created.
    #[error("configuration: {0}")]
    Configuration(String),
    /// The guest script raised.
    #[error("run program: {0}")]
    Execution(ScriptError),
    /// The evaluation was forcibly terminated after the execution timeout.
    #[error("execution {0}")]
    Interrupted(ScriptError),
    /// The addressing string could not be turned into a document expression.
    #[error("malformed path {0}")]
    Path(String),
    /// A network provider failed.
    #[error("network: {0}")]
    Network(String),
    /// The execution thread is gone.
    #[error("session closed")]
    Closed,
}

impl SessionError {
    /// Whether this error stems from a timeout-forced halt.
    #[inline]
    #[must_use]
    pub fn is_interrupt(&self) -> bool {
        self.to_string().contains(HALT_MARKER)
    }
}

impl From<ScriptError> for SessionError {
    fn from(error: ScriptError) -> Self {
        if error.is_halt() {
            Self::Interrupted(error)
        } else {
            Self::Execution(error)
        }
    }
}
