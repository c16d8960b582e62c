use std::{
    collections::VecDeque,
    sync::{Mutex, PoisonError},
    time::{Duration, Instant},
};

use super::instant_now;

const MAX_REASONS: usize = 5;

#[derive(Debug, Default)]
struct Inner {
    reasons: VecDeque<String>,
    last_report: Option<Instant>,
}

/// The last few failure reasons of a breaker, plus the throttle for the
/// "requests dropped" warning that prints them.
#[derive(Debug)]
pub(crate) struct RecentErrors {
    log_interval: Duration,
    inner: Mutex<Inner>,
}

impl RecentErrors {
    pub(crate) fn new(log_interval: Duration) -> Self {
        Self {
            log_interval,
            inner: Mutex::new(Inner::default()),
        }
    }

    pub(crate) fn add(&self, reason: impl Into<String>) {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        if inner.reasons.len() == MAX_REASONS {
            inner.reasons.pop_front();
        }
        inner.reasons.push_back(reason.into());
    }

    /// Returns the formatted reasons if a report is due, and starts a new
    /// quiet period.
    pub(crate) fn report(&self) -> Option<String> {
        let now = instant_now();
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(last) = inner.last_report {
            if now.saturating_duration_since(last) < self.log_interval {
                return None;
            }
        }
        inner.last_report = Some(now);

        let reasons: Vec<&str> = inner.reasons.iter().map(String::as_str).collect();
        Some(reasons.join("; "))
    }
}
