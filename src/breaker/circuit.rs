use std::{
    fmt,
    future::Future,
    panic::{self, AssertUnwindSafe},
    sync::Arc,
};

use futures::FutureExt;

use super::{
    BreakerError, BreakerSettings, History, Promise,
    google::{Admission, GoogleBreaker},
    internal_event::{
        BreakerAdmission, BreakerAdmissionHandle, BreakerOutcome, BreakerOutcomeHandle,
        InternalEventHandle, Outcome, RegisterInternalEvent,
    },
    proba::{Proba, RandomProba},
    recent::RecentErrors,
};

struct Inner {
    name: String,
    throttle: GoogleBreaker,
    recent: RecentErrors,
    admission: BreakerAdmissionHandle,
    outcome: BreakerOutcomeHandle,
}

/// Adaptive breaker guarding one named resource.
///
/// Cloning is cheap and every clone shares the same statistics. Use
/// [`Registry::get_breaker`](super::Registry::get_breaker) to get the shared
/// instance for a name; constructing breakers directly is mostly useful in
/// tests and for resources outside any registry.
#[derive(Clone)]
pub struct Breaker {
    inner: Arc<Inner>,
}

impl Breaker {
    /// A breaker with default settings.
    pub fn new(name: impl Into<String>) -> Self {
        Self::build(name.into(), &BreakerSettings::default(), Arc::new(RandomProba))
    }

    pub fn with_settings(
        name: impl Into<String>,
        settings: BreakerSettings,
    ) -> Result<Self, BreakerError> {
        Self::with_proba(name, settings, RandomProba)
    }

    /// A breaker whose admission gate draws from `proba`.
    pub fn with_proba(
        name: impl Into<String>,
        settings: BreakerSettings,
        proba: impl Proba,
    ) -> Result<Self, BreakerError> {
        settings.validate()?;
        Ok(Self::build(name.into(), &settings, Arc::new(proba)))
    }

    /// Callers must have validated `settings`.
    pub(crate) fn build(name: String, settings: &BreakerSettings, proba: Arc<dyn Proba>) -> Self {
        let admission = BreakerAdmission {
            breaker: name.clone(),
        }
        .register();
        let outcome = BreakerOutcome {
            breaker: name.clone(),
        }
        .register();

        Self {
            inner: Arc::new(Inner {
                throttle: GoogleBreaker::new(settings, proba),
                recent: RecentErrors::new(settings.log_interval),
                admission,
                outcome,
                name,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Whether both handles point at the same breaker.
    pub fn same_as(&self, other: &Breaker) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Outcomes currently inside the window.
    pub fn history(&self) -> History {
        self.inner.throttle.history()
    }

    /// Probability that the next call is dropped.
    pub fn drop_ratio(&self) -> f64 {
        self.inner.throttle.drop_ratio()
    }

    /// Asks to start a call whose outcome will be reported later through the
    /// returned [`Promise`].
    pub fn allow(&self) -> Result<Promise, BreakerError> {
        self.accept()?;
        Ok(Promise::new(self.clone()))
    }

    fn accept(&self) -> Result<(), BreakerError> {
        let admission = self.inner.throttle.accept();
        self.inner.admission.emit(admission);

        match admission {
            Admission::Admitted { .. } => Ok(()),
            Admission::Dropped { drop_ratio } => {
                debug!(message = "Request dropped.", breaker = %self.name(), drop_ratio);
                if let Some(last_errors) = self.inner.recent.report() {
                    warn!(
                        message = "Breaker is shedding load; requests dropped.",
                        breaker = %self.name(),
                        drop_ratio,
                        %last_errors,
                    );
                }
                Err(BreakerError::ServiceUnavailable)
            }
        }
    }

    pub fn mark_success(&self) {
        self.inner.throttle.mark_success();
        self.inner.outcome.emit(Outcome::Success);
    }

    pub fn mark_failure(&self) {
        self.inner.throttle.mark_failure();
        self.inner.outcome.emit(Outcome::Failure);
    }

    pub(crate) fn record_failure(&self, reason: String) {
        self.inner.recent.add(reason);
        self.mark_failure();
    }

    /// Runs `req` if admitted and records its outcome.
    ///
    /// - Dropped: `req` is not run; the result of `fallback` is returned if one
    ///   is given, otherwise [`BreakerError::ServiceUnavailable`].
    /// - `Ok`: recorded as a success.
    /// - `Err`: recorded as a success when `acceptable` says so, otherwise as a
    ///   failure. The error is returned untouched either way.
    /// - Panic: recorded as a failure, then the panic keeps unwinding.
    pub fn do_req<T, E, F, FB, A>(&self, req: F, fallback: Option<FB>, acceptable: A) -> Result<T, E>
    where
        F: FnOnce() -> Result<T, E>,
        FB: FnOnce(BreakerError) -> Result<T, E>,
        A: Fn(&E) -> bool,
        E: From<BreakerError> + fmt::Display,
    {
        let promise = match self.allow() {
            Ok(promise) => promise,
            Err(error) => return reject(error, fallback),
        };

        let result = req();
        settle(promise, &result, acceptable);
        result
    }

    /// Future-based counterpart of [`do_req`](Self::do_req).
    ///
    /// If the returned future is dropped before `req` completes, nothing is
    /// recorded, even when the drop happens while a panic elsewhere unwinds
    /// the owner.
    pub async fn do_req_async<T, E, F, Fut, FB, A>(
        &self,
        req: F,
        fallback: Option<FB>,
        acceptable: A,
    ) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        FB: FnOnce(BreakerError) -> Result<T, E>,
        A: Fn(&E) -> bool,
        E: From<BreakerError> + fmt::Display,
    {
        let promise = match self.allow() {
            Ok(promise) => promise.ignore_unwinding(),
            Err(error) => return reject(error, fallback),
        };

        // A panicking poll unwinds past the promise without dropping it, so
        // catch it here, record it, and resume with the same payload.
        let result = match AssertUnwindSafe(req()).catch_unwind().await {
            Ok(result) => result,
            Err(payload) => {
                promise.reject_with_reason("panic");
                panic::resume_unwind(payload);
            }
        };
        settle(promise, &result, acceptable);
        result
    }

    /// Runs `req`, counting every `Err` as a failure.
    pub fn call<T, E, F>(&self, req: F) -> Result<T, E>
    where
        F: FnOnce() -> Result<T, E>,
        E: From<BreakerError> + fmt::Display,
    {
        self.call_with_acceptable(req, |_| false)
    }

    pub fn call_with_acceptable<T, E, F, A>(&self, req: F, acceptable: A) -> Result<T, E>
    where
        F: FnOnce() -> Result<T, E>,
        A: Fn(&E) -> bool,
        E: From<BreakerError> + fmt::Display,
    {
        self.do_req(req, None::<fn(BreakerError) -> Result<T, E>>, acceptable)
    }

    pub fn call_with_fallback<T, E, F, FB>(&self, req: F, fallback: FB) -> Result<T, E>
    where
        F: FnOnce() -> Result<T, E>,
        FB: FnOnce(BreakerError) -> Result<T, E>,
        E: From<BreakerError> + fmt::Display,
    {
        self.do_req(req, Some(fallback), |_| false)
    }
}

fn reject<T, E, FB>(error: BreakerError, fallback: Option<FB>) -> Result<T, E>
where
    FB: FnOnce(BreakerError) -> Result<T, E>,
    E: From<BreakerError>,
{
    match fallback {
        Some(fallback) => fallback(error),
        None => Err(error.into()),
    }
}

fn settle<T, E, A>(promise: Promise, result: &Result<T, E>, acceptable: A)
where
    A: Fn(&E) -> bool,
    E: fmt::Display,
{
    match result {
        Ok(_) => promise.accept(),
        Err(error) if acceptable(error) => promise.accept(),
        Err(error) => promise.reject_with_reason(error),
    }
}

impl fmt::Debug for Breaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Breaker")
            .field("name", &self.inner.name)
            .field("throttle", &self.inner.throttle)
            .finish_non_exhaustive()
    }
}
