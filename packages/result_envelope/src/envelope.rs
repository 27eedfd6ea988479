//! The result envelope and its extraction operations

use crate::error::{Failure, SUCCESS};
use crate::Result;
use serde::{Deserialize, Serialize};

/// Status code, optional message and optional payload of a unit of work
///
/// `data` is only meaningful while `code == 0`. Nothing stops a unit of work
/// from setting both a payload and a failure, so the extraction methods check
/// `code` before handing `data` out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope<T> {
    /// `0` on success, `-1` for unstructured failures, anything else is caller-defined
    pub code: i32,
    /// Failure description, absent on success
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Payload, valid only when `code == 0`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T> Default for Envelope<T> {
    fn default() -> Self {
        Self {
            code: SUCCESS,
            message: None,
            data: None,
        }
    }
}

impl<T> Envelope<T> {
    /// Create an empty envelope: code `0`, no message, no payload
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a successful envelope holding `data`
    #[must_use]
    pub fn success(data: T) -> Self {
        Self {
            data: Some(data),
            ..Self::default()
        }
    }

    /// Create a failed envelope
    #[must_use]
    pub fn failure(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: Some(message.into()),
            data: None,
        }
    }

    /// Status code
    #[must_use]
    pub fn code(&self) -> i32 {
        self.code
    }

    /// Failure message, if any
    #[must_use]
    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    /// Payload reference; check [`is_success`](Self::is_success) first
    #[must_use]
    pub fn data(&self) -> Option<&T> {
        self.data.as_ref()
    }

    /// Whether `code == 0`
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.code == SUCCESS
    }

    /// Set the payload
    pub fn set_data(&mut self, data: T) {
        self.data = Some(data);
    }

    /// The stored failure, or `None` on success
    #[must_use]
    pub fn failure_info(&self) -> Option<Failure> {
        if self.is_success() {
            None
        } else {
            Some(Failure::new(self.code, self.message.clone().unwrap_or_default()))
        }
    }

    /// Write a failure's code and message onto this envelope
    pub(crate) fn apply(&mut self, failure: Failure) {
        self.code = failure.code;
        self.message = Some(failure.message);
    }

    /// Take the payload, re-raising the stored failure if `code != 0`
    ///
    /// # Errors
    ///
    /// Returns the envelope's own code and message as a [`Failure`].
    pub fn unwrap_or_fail(self) -> Result<Option<T>> {
        self.unwrap_or_fail_with("")
    }

    /// Take the payload, re-raising with `prefix` prepended to the message
    ///
    /// An empty prefix leaves the message untouched; otherwise the re-raised
    /// message is `"{prefix.trim()} {message}"`.
    ///
    /// # Errors
    ///
    /// Returns a [`Failure`] with the envelope's code and the decorated message.
    pub fn unwrap_or_fail_with(self, prefix: &str) -> Result<Option<T>> {
        self.unwrap_or_fail_inspect(prefix, |_| {})
    }

    /// Take the payload, running `on_error` on the envelope before re-raising
    ///
    /// `on_error` runs once, and only when `code != 0`.
    ///
    /// # Errors
    ///
    /// Returns a [`Failure`] decorated as in [`unwrap_or_fail_with`](Self::unwrap_or_fail_with).
    pub fn unwrap_or_fail_inspect<F>(
        self,
        prefix: &str,
        on_error: F,
    ) -> Result<Option<T>>
    where
        F: FnOnce(&Self),
    {
        if self.is_success() {
            return Ok(self.data);
        }

        on_error(&self);

        let message = self.message.unwrap_or_default();
        let message = if prefix.is_empty() {
            message
        } else {
            format!("{} {message}", prefix.trim())
        };
        Err(Failure::new(self.code, message))
    }

    /// Convert into a `Result`, dropping the payload of a failed envelope
    ///
    /// # Errors
    ///
    /// Returns the stored failure when `code != 0`.
    pub fn into_result(self) -> Result<Option<T>> {
        self.unwrap_or_fail()
    }
}

impl<T> From<Failure> for Envelope<T> {
    fn from(failure: Failure) -> Self {
        Self::failure(failure.code, failure.message)
    }
}
