//! Failure types raised and absorbed by guarded execution

use thiserror::Error;

/// Status code of a successful envelope
pub const SUCCESS: i32 = 0;

/// Status code given to every unstructured failure
pub const UNSTRUCTURED: i32 = -1;

/// Structured failure carrying a caller-chosen code and message
///
/// Returned through `?` from a unit of work, it abandons the rest of that work
/// and is written onto the envelope by the enclosing guard. Extraction from a
/// failed envelope raises it again.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message} (code {code})")]
pub struct Failure {
    /// Failure code, `-1` unless the signaler chose one
    pub code: i32,
    /// Failure description
    pub message: String,
}

impl Failure {
    /// Create a failure with an explicit code
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Create a failure with the unstructured code `-1`
    pub fn unstructured(message: impl Into<String>) -> Self {
        Self::new(UNSTRUCTURED, message)
    }
}

/// Faults the guard observes itself rather than receiving as an `Err`
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Interruption {
    /// The unit of work panicked; holds the panic payload text
    #[error("{0}")]
    Panic(String),

    /// The unit of work was abandoned by a cancel signal
    #[error("operation was cancelled")]
    Cancelled,
}

/// Which catch path absorbed a failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// Signaled deliberately with [`signal_failure`] or [`fail!`](crate::fail)
    Structured,
    /// Any other error, panic or cancellation
    Unstructured,
}

impl FailureKind {
    /// Short name used in diagnostics
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Structured => "structured",
            Self::Unstructured => "unstructured",
        }
    }
}

/// Signal a structured failure from inside a unit of work
///
/// Always returns `Err`, so `signal_failure(7, "bad input")?` never continues
/// past the call site.
///
/// # Errors
///
/// Unconditionally returns a [`Failure`] with `code` and `message`.
pub fn signal_failure(code: i32, message: impl Into<String>) -> crate::Result<()> {
    Err(Failure::new(code, message))
}

/// Signal a structured failure with the default code `-1`
///
/// # Errors
///
/// Unconditionally returns a [`Failure`] with code `-1`.
pub fn signal_message(message: impl Into<String>) -> crate::Result<()> {
    signal_failure(UNSTRUCTURED, message)
}

/// Turn a caught panic payload into its message text
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
