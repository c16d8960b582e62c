//! Client-side throttling as described in the "Handling Overload" chapter of
//! the Google SRE book.

use std::{fmt, sync::Arc};

use super::{BreakerSettings, proba::Proba, window::RollingWindow};

/// Accepted and total outcomes currently inside a breaker's window.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct History {
    pub accepts: i64,
    pub total: i64,
}

/// Probability of rejecting the next request.
///
/// `max(0, (total - protection - k * accepts) / (total + 1))`
pub fn drop_ratio(k: f64, protection: u32, history: History) -> f64 {
    let weighted_accepts = k * history.accepts as f64;
    let excess = (history.total - i64::from(protection)) as f64 - weighted_accepts;
    (excess / (history.total + 1) as f64).max(0.0)
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Admission {
    Admitted { drop_ratio: f64 },
    Dropped { drop_ratio: f64 },
}

impl Admission {
    pub(crate) const fn drop_ratio(&self) -> f64 {
        match self {
            Admission::Admitted { drop_ratio } | Admission::Dropped { drop_ratio } => *drop_ratio,
        }
    }
}

/// The stateless-looking decision engine: a window, a gate and two constants.
pub(crate) struct GoogleBreaker {
    k: f64,
    protection: u32,
    stat: RollingWindow,
    proba: Arc<dyn Proba>,
}

impl GoogleBreaker {
    pub(crate) fn new(settings: &BreakerSettings, proba: Arc<dyn Proba>) -> Self {
        let stat = RollingWindow::new(settings.buckets, settings.bucket_duration())
            .ignore_current_bucket(settings.ignore_current);
        Self {
            k: settings.k,
            protection: settings.protection,
            stat,
            proba,
        }
    }

    pub(crate) fn accept(&self) -> Admission {
        let drop_ratio = self.drop_ratio();
        if drop_ratio <= 0.0 {
            return Admission::Admitted { drop_ratio };
        }

        if self.proba.true_on_proba(drop_ratio) {
            Admission::Dropped { drop_ratio }
        } else {
            Admission::Admitted { drop_ratio }
        }
    }

    pub(crate) fn drop_ratio(&self) -> f64 {
        drop_ratio(self.k, self.protection, self.history())
    }

    pub(crate) fn history(&self) -> History {
        let mut history = History::default();
        self.stat.reduce(|bucket| {
            history.accepts += bucket.sum as i64;
            history.total += bucket.count;
        });
        history
    }

    pub(crate) fn mark_success(&self) {
        self.stat.add(1.0);
    }

    pub(crate) fn mark_failure(&self) {
        self.stat.add(0.0);
    }
}

impl fmt::Debug for GoogleBreaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GoogleBreaker")
            .field("k", &self.k)
            .field("protection", &self.protection)
            .field("proba", &self.proba)
            .finish_non_exhaustive()
    }
}
