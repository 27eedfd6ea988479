//! Guarded execution: run one unit of work and absorb its failures into an envelope
//!
//! A guard creates a fresh [`Envelope`], hands it to the unit of work, and
//! turns whatever the work raises into envelope state:
//!
//! - an `Err` holding a [`Failure`] is structured and keeps its code,
//! - any other `Err`, a panic, or a cancel signal is unstructured (code `-1`).
//!
//! Nothing escapes a guard. The optional error callback only observes; with
//! [`CallbackTiming::Mixed`] it sees a structured failure before the write and
//! an unstructured one after it.

use crate::envelope::Envelope;
use crate::error::{panic_message, Failure, FailureKind, Interruption};
use crate::sink::{FailureSink, LogSink};
use futures::future::BoxFuture;
use futures::FutureExt;
use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tokio::sync::oneshot;

/// Future returned by an asynchronous unit of work
pub type WorkFuture<'a> = BoxFuture<'a, anyhow::Result<()>>;

/// Future returned by an asynchronous error callback
pub type HandlerFuture<'a> = BoxFuture<'a, ()>;

type NoHandler<T> = fn(&Envelope<T>);
type NoAsyncHandler<T> = for<'a> fn(&'a Envelope<T>) -> HandlerFuture<'a>;

/// When the error callback runs relative to the envelope write
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CallbackTiming {
    /// Structured failures call back before `code`/`message` are written,
    /// unstructured failures after
    #[default]
    Mixed,
    /// Every failure calls back after the envelope carries its final status
    AfterWrite,
}

/// Guard settings
#[derive(Debug, Clone, Default)]
pub struct GuardConfig {
    /// Name attached to every diagnostic this guard emits
    pub label: Option<String>,
    /// Callback ordering
    pub callback_timing: CallbackTiming,
}

/// Failure boundary around a single unit of work
///
/// Each absorbed failure reaches the guard's [`FailureSink`] exactly once.
///
/// # Panics and the panic hook
///
/// A panic inside the work is caught and recorded like any other unstructured
/// failure, but the process panic hook runs first, before the unwind reaches
/// the guard. With the default hook that is a second report on stderr. The hook
/// is process state, so the guard leaves it alone; install a quiet one with
/// [`std::panic::set_hook`] when the sink should be the only output.
#[derive(Clone)]
pub struct Guard {
    config: GuardConfig,
    sink: Arc<dyn FailureSink>,
}

impl fmt::Debug for Guard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Guard")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Default for Guard {
    fn default() -> Self {
        Self::with_config(GuardConfig::default())
    }
}

/// A failure on its way from the unit of work to the envelope
#[derive(Debug)]
struct Fault {
    kind: FailureKind,
    failure: Failure,
}

impl Fault {
    fn from_error(error: anyhow::Error) -> Self {
        match error.downcast::<Failure>() {
            Ok(failure) => Self {
                kind: FailureKind::Structured,
                failure,
            },
            Err(other) => Self {
                kind: FailureKind::Unstructured,
                failure: Failure::unstructured(other.to_string()),
            },
        }
    }
}

impl From<Interruption> for Fault {
    fn from(interruption: Interruption) -> Self {
        Self {
            kind: FailureKind::Unstructured,
            failure: Failure::unstructured(interruption.to_string()),
        }
    }
}

fn settle(outcome: Result<anyhow::Result<()>, Box<dyn Any + Send>>) -> Option<Fault> {
    match outcome {
        Ok(Ok(())) => None,
        Ok(Err(error)) => Some(Fault::from_error(error)),
        Err(payload) => Some(Interruption::Panic(panic_message(payload.as_ref())).into()),
    }
}

impl Guard {
    /// Create a guard logging through [`LogSink`]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a guard from explicit settings
    #[must_use]
    pub fn with_config(config: GuardConfig) -> Self {
        Self {
            config,
            sink: Arc::new(LogSink),
        }
    }

    /// Label diagnostics from this guard
    #[must_use]
    pub fn named(mut self, label: impl Into<String>) -> Self {
        self.config.label = Some(label.into());
        self
    }

    /// Choose the error callback ordering
    #[must_use]
    pub fn callback_timing(mut self, timing: CallbackTiming) -> Self {
        self.config.callback_timing = timing;
        self
    }

    /// Route diagnostics to `sink`
    #[must_use]
    pub fn with_sink(mut self, sink: Arc<dyn FailureSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Current settings
    #[must_use]
    pub fn config(&self) -> &GuardConfig {
        &self.config
    }

    /// Run `work` against a fresh envelope and return it
    pub fn run<T, F>(&self, work: F) -> Envelope<T>
    where
        F: FnOnce(&mut Envelope<T>) -> anyhow::Result<()>,
    {
        self.guard_sync(work, None::<NoHandler<T>>)
    }

    /// Run `work`, calling `on_error` with the envelope if it fails
    pub fn run_with<T, F, E>(&self, work: F, on_error: E) -> Envelope<T>
    where
        F: FnOnce(&mut Envelope<T>) -> anyhow::Result<()>,
        E: FnOnce(&Envelope<T>),
    {
        self.guard_sync(work, Some(on_error))
    }

    /// Await `work` against a fresh envelope and return it
    pub async fn run_async<T, F>(&self, work: F) -> Envelope<T>
    where
        F: for<'a> FnOnce(&'a mut Envelope<T>) -> WorkFuture<'a>,
    {
        self.guard_async(work, None::<NoAsyncHandler<T>>, None).await
    }

    /// Await `work`, awaiting `on_error` with the envelope if it fails
    pub async fn run_async_with<T, F, E>(&self, work: F, on_error: E) -> Envelope<T>
    where
        F: for<'a> FnOnce(&'a mut Envelope<T>) -> WorkFuture<'a>,
        E: for<'a> FnOnce(&'a Envelope<T>) -> HandlerFuture<'a>,
    {
        self.guard_async(work, Some(on_error), None).await
    }

    /// Await `work` unless `cancel` fires first
    ///
    /// A received cancel signal abandons the work and is absorbed as an
    /// unstructured failure. Dropping the sender does not cancel.
    pub async fn run_async_cancellable<T, F>(
        &self,
        work: F,
        cancel: oneshot::Receiver<()>,
    ) -> Envelope<T>
    where
        F: for<'a> FnOnce(&'a mut Envelope<T>) -> WorkFuture<'a>,
    {
        self.guard_async(work, None::<NoAsyncHandler<T>>, Some(cancel))
            .await
    }

    /// [`run_async_cancellable`](Self::run_async_cancellable) with an error callback
    pub async fn run_async_cancellable_with<T, F, E>(
        &self,
        work: F,
        on_error: E,
        cancel: oneshot::Receiver<()>,
    ) -> Envelope<T>
    where
        F: for<'a> FnOnce(&'a mut Envelope<T>) -> WorkFuture<'a>,
        E: for<'a> FnOnce(&'a Envelope<T>) -> HandlerFuture<'a>,
    {
        self.guard_async(work, Some(on_error), Some(cancel)).await
    }

    fn guard_sync<T, F, E>(&self, work: F, on_error: Option<E>) -> Envelope<T>
    where
        F: FnOnce(&mut Envelope<T>) -> anyhow::Result<()>,
        E: FnOnce(&Envelope<T>),
    {
        let mut envelope = Envelope::new();
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| work(&mut envelope)));

        if let Some(fault) = settle(outcome) {
            self.record(&fault);
            if self.callback_first(fault.kind) {
                if let Some(on_error) = on_error {
                    on_error(&envelope);
                }
                envelope.apply(fault.failure);
            } else {
                envelope.apply(fault.failure);
                if let Some(on_error) = on_error {
                    on_error(&envelope);
                }
            }
        }

        envelope
    }

    async fn guard_async<T, F, E>(
        &self,
        work: F,
        on_error: Option<E>,
        cancel: Option<oneshot::Receiver<()>>,
    ) -> Envelope<T>
    where
        F: for<'a> FnOnce(&'a mut Envelope<T>) -> WorkFuture<'a>,
        E: for<'a> FnOnce(&'a Envelope<T>) -> HandlerFuture<'a>,
    {
        let mut envelope = Envelope::new();

        let fault = {
            let target = &mut envelope;
            // Calling `work` inside the block keeps a panic while building the future catchable.
            let guarded = AssertUnwindSafe(async move { work(target).await }).catch_unwind();
            match cancel {
                Some(mut cancel) => tokio::select! {
                    outcome = guarded => settle(outcome),
                    Ok(()) = &mut cancel => Some(Fault::from(Interruption::Cancelled)),
                },
                None => settle(guarded.await),
            }
        };

        if let Some(fault) = fault {
            self.record(&fault);
            if self.callback_first(fault.kind) {
                if let Some(on_error) = on_error {
                    on_error(&envelope).await;
                }
                envelope.apply(fault.failure);
            } else {
                envelope.apply(fault.failure);
                if let Some(on_error) = on_error {
                    on_error(&envelope).await;
                }
            }
        }

        envelope
    }

    fn record(&self, fault: &Fault) {
        self.sink
            .record(fault.kind, &fault.failure, self.config.label.as_deref());
    }

    fn callback_first(&self, kind: FailureKind) -> bool {
        kind == FailureKind::Structured && self.config.callback_timing == CallbackTiming::Mixed
    }
}

impl<T> Envelope<T> {
    /// Run `work` inside a default [`Guard`]
    ///
    /// Panics are absorbed too; see [`Guard`] for how they interact with the
    /// panic hook.
    pub fn run_guarded<F>(work: F) -> Self
    where
        F: FnOnce(&mut Self) -> anyhow::Result<()>,
    {
        Guard::default().run(work)
    }

    /// Run `work` inside a default [`Guard`] with an error callback
    pub fn run_guarded_with<F, E>(work: F, on_error: E) -> Self
    where
        F: FnOnce(&mut Self) -> anyhow::Result<()>,
        E: FnOnce(&Self),
    {
        Guard::default().run_with(work, on_error)
    }

    /// Await `work` inside a default [`Guard`]
    pub async fn run_guarded_async<F>(work: F) -> Self
    where
        F: for<'a> FnOnce(&'a mut Self) -> WorkFuture<'a>,
    {
        Guard::default().run_async(work).await
    }

    /// Await `work` inside a default [`Guard`] with an async error callback
    pub async fn run_guarded_async_with<F, E>(work: F, on_error: E) -> Self
    where
        F: for<'a> FnOnce(&'a mut Self) -> WorkFuture<'a>,
        E: for<'a> FnOnce(&'a Self) -> HandlerFuture<'a>,
    {
        Guard::default().run_async_with(work, on_error).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::signal_failure;
    use crate::sink::RecordingSink;

    #[test]
    fn test_success_leaves_envelope_clean() {
        let envelope = Envelope::run_guarded(|r| {
            r.set_data(42);
            Ok(())
        });
        assert_eq!(envelope, Envelope::success(42));
    }

    #[test]
    fn test_structured_failure_keeps_code() {
        let sink = Arc::new(RecordingSink::default());
        let guard = Guard::new().named("parse").with_sink(sink.clone());

        let envelope: Envelope<i32> = guard.run(|_| {
            signal_failure(7, "bad input")?;
            Ok(())
        });

        assert_eq!(envelope.code(), 7);
        assert_eq!(envelope.message(), Some("bad input"));
        assert_eq!(
            sink.records(),
            vec![(FailureKind::Structured, Failure::new(7, "bad input"))]
        );
    }

    #[test]
    fn test_context_wrapped_failure_stays_structured() {
        use anyhow::Context;

        let envelope: Envelope<()> = Envelope::run_guarded(|_| {
            signal_failure(12, "missing").context("while loading")?;
            Ok(())
        });

        assert_eq!(envelope.code(), 12);
        assert_eq!(envelope.message(), Some("missing"));
    }

    #[test]
    fn test_panic_is_unstructured() {
        let envelope: Envelope<()> = Envelope::run_guarded(|_| panic!("kaboom"));
        assert_eq!(envelope.code(), -1);
        assert_eq!(envelope.message(), Some("kaboom"));
    }

    #[test]
    fn test_after_write_timing_unifies_callback_view() {
        let mut seen = None;
        let guard = Guard::new().callback_timing(CallbackTiming::AfterWrite);

        let _: Envelope<()> = guard.run_with(
            |_| Err(Failure::new(4, "late").into()),
            |e| seen = Some(e.code()),
        );

        assert_eq!(seen, Some(4));
    }

    #[test]
    fn test_async_guard_under_block_on() {
        let envelope = tokio_test::block_on(Envelope::<&str>::run_guarded_async(|r| {
            Box::pin(async move {
                r.set_data("ok");
                Ok(())
            })
        }));
        assert_eq!(envelope.data(), Some(&"ok"));
    }

    #[test]
    fn test_builder_settings_are_readable() {
        let guard = Guard::new()
            .named("import")
            .callback_timing(CallbackTiming::AfterWrite);

        assert_eq!(guard.config().label.as_deref(), Some("import"));
        assert_eq!(guard.config().callback_timing, CallbackTiming::AfterWrite);
        assert_eq!(Guard::default().config().callback_timing, CallbackTiming::Mixed);
        assert!(Guard::default().config().label.is_none());
    }

    #[test]
    fn test_guard_debug_hides_sink() {
        let rendered = format!("{:?}", Guard::new().named("load"));
        assert!(rendered.contains("load"));
    }
}
