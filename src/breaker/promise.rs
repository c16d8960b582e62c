use std::fmt;

use super::Breaker;

/// Outcome handle for one admitted call.
///
/// Exactly one of [`accept`](Promise::accept) or [`reject`](Promise::reject)
/// should be called; both consume the promise. If the promise is dropped while
/// its thread is unwinding from a panic, the call is recorded as a failure. A
/// promise dropped for any other reason (a cancelled future, say) records
/// nothing.
///
/// Promises held by futures do not treat unwinding as a failure: a future can
/// be dropped while an unrelated panic unwinds its owner. Those futures catch
/// panics from their own work instead.
#[must_use = "report the outcome with `accept` or `reject`"]
pub struct Promise {
    breaker: Breaker,
    reported: bool,
    fail_on_unwind: bool,
}

impl Promise {
    pub(crate) fn new(breaker: Breaker) -> Self {
        Self {
            breaker,
            reported: false,
            fail_on_unwind: true,
        }
    }

    /// Dropping the promise during a panic records nothing.
    pub(crate) fn ignore_unwinding(mut self) -> Self {
        self.fail_on_unwind = false;
        self
    }

    /// The call succeeded.
    pub fn accept(mut self) {
        self.reported = true;
        self.breaker.mark_success();
    }

    /// The call failed.
    pub fn reject(mut self) {
        self.reported = true;
        self.breaker.mark_failure();
    }

    /// The call failed; keep `reason` for the next "requests dropped" warning.
    pub fn reject_with_reason(mut self, reason: impl fmt::Display) {
        self.reported = true;
        self.breaker.record_failure(reason.to_string());
    }

    pub fn breaker(&self) -> &Breaker {
        &self.breaker
    }
}

impl fmt::Debug for Promise {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Promise")
            .field("breaker", &self.breaker.name())
            .field("reported", &self.reported)
            .field("fail_on_unwind", &self.fail_on_unwind)
            .finish()
    }
}

impl Drop for Promise {
    fn drop(&mut self) {
        if self.reported {
            return;
        }

        if self.fail_on_unwind && std::thread::panicking() {
            self.breaker.record_failure("panic".to_owned());
        } else {
            debug!(
                message = "Promise dropped without an outcome.",
                breaker = %self.breaker.name(),
            );
        }
    }
}
