//! # Result Envelope
//!
//! A generic envelope carrying either a payload or a structured failure
//! (code + message), plus guards that run one unit of work, absorb anything it
//! raises into the envelope, and extraction methods that hand the payload back
//! or re-raise the stored failure.
//!
//! ```
//! use result_envelope::{signal_failure, Envelope};
//!
//! let envelope: Envelope<u32> = Envelope::run_guarded(|r| {
//!     signal_failure(7, "bad input")?;
//!     r.set_data(42);
//!     Ok(())
//! });
//!
//! assert_eq!(envelope.code(), 7);
//! let failure = envelope.unwrap_or_fail_with("context:").unwrap_err();
//! assert_eq!(failure.message, "context: bad input");
//! ```

#![forbid(unsafe_code)]

pub mod envelope;
pub mod error;
pub mod guard;
mod macros;
pub mod sink;

pub use envelope::Envelope;
pub use error::{
    signal_failure, signal_message, Failure, FailureKind, Interruption, SUCCESS, UNSTRUCTURED,
};
pub use guard::{CallbackTiming, Guard, GuardConfig, HandlerFuture, WorkFuture};
pub use sink::{FailureSink, LogSink, RecordingSink, TracingSink};

/// Result of extraction and signaling: the payload, or the [`Failure`] to re-raise
pub type Result<T> = std::result::Result<T, Failure>;
