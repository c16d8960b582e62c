//! Shed load before a struggling dependency falls over.

mod circuit;
mod future;
mod google;
pub mod http;
pub mod internal_event;
pub mod layer;
mod promise;
pub mod proba;
mod recent;
pub mod registry;
pub mod service;
pub mod window;

use std::time::Duration;

use bon::Builder;
use serde::Deserialize;
use snafu::Snafu;

pub use circuit::Breaker;
pub use google::{History, drop_ratio};
pub use http::{Acceptable, HttpAcceptable, HttpError};
pub use layer::BreakerLayer;
pub use promise::Promise;
pub use registry::{
    Registry, allow, breaker_name, do_req, do_with_acceptable, do_with_fallback,
    do_with_fallback_acceptable, get_breaker, registry,
};
pub use service::BreakerService;

fn instant_now() -> std::time::Instant {
    tokio::time::Instant::now().into()
}

/// Errors surfaced by the breaker itself.
///
/// Errors returned by the protected call are never wrapped in this type; they
/// pass through unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum BreakerError {
    /// The call was shed before it started.
    #[snafu(display("circuit breaker is open"))]
    ServiceUnavailable,

    #[snafu(display("invalid breaker settings: {}", reason))]
    InvalidSettings { reason: String },
}

/// Tuning parameters shared by every breaker a [`Registry`] creates.
///
/// The defaults follow the client-side throttling guidance from the Google SRE
/// book and rarely need changing.
///
/// | Parameter | Default | Description |
/// |-----------|---------|-------------|
/// | `k` | 1.5 | Tolerance multiplier applied to accepted requests.<br>Higher = more failures tolerated before shedding |
/// | `protection` | 5 | Outcomes below which nothing is ever shed |
/// | `window` | 10s | Trailing span of history considered |
/// | `buckets` | 40 | Number of time slices the window is divided into |
/// | `ignore_current` | false | Leave the still-filling bucket out of the aggregate |
/// | `log_interval` | 5s | Minimum gap between "requests dropped" warnings per breaker |
///
/// # Example
///
/// ```rust
/// use adaptive_breaker::breaker::{BreakerSettings, Registry};
/// use std::time::Duration;
///
/// let settings = BreakerSettings::builder()
///     .k(2.0)
///     .window(Duration::from_secs(5))
///     .buckets(20)
///     .build();
/// let registry = Registry::new(settings).unwrap();
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Builder, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BreakerSettings {
    /// Multiplier applied to accepted requests before comparing them against
    /// total traffic. `k = 2` sheds only once more than half of the calls fail.
    #[builder(default = default_k())]
    #[serde(default = "default_k")]
    pub k: f64,

    /// Minimum-traffic floor. While `total <= protection` the drop ratio
    /// cannot become positive.
    #[builder(default = default_protection())]
    #[serde(default = "default_protection")]
    pub protection: u32,

    /// Span of history the decision is based on.
    #[builder(default = default_window())]
    #[serde(default = "default_window")]
    pub window: Duration,

    /// Number of buckets `window` is split into. Each bucket covers
    /// `window / buckets`.
    #[builder(default = default_buckets())]
    #[serde(default = "default_buckets")]
    pub buckets: usize,

    #[builder(default)]
    #[serde(default)]
    pub ignore_current: bool,

    #[builder(default = default_log_interval())]
    #[serde(default = "default_log_interval")]
    pub log_interval: Duration,
}

const fn default_k() -> f64 {
    1.5
}

const fn default_protection() -> u32 {
    5
}

const fn default_window() -> Duration {
    Duration::from_secs(10)
}

const fn default_buckets() -> usize {
    40
}

const fn default_log_interval() -> Duration {
    Duration::from_secs(5)
}

impl Default for BreakerSettings {
    fn default() -> Self {
        Self {
            k: default_k(),
            protection: default_protection(),
            window: default_window(),
            buckets: default_buckets(),
            ignore_current: false,
            log_interval: default_log_interval(),
        }
    }
}

impl BreakerSettings {
    pub fn validate(&self) -> Result<(), BreakerError> {
        if !self.k.is_finite() || self.k <= 0.0 {
            return InvalidSettingsSnafu {
                reason: format!("k must be a positive finite number, got {}", self.k),
            }
            .fail();
        }
        if self.buckets == 0 || u32::try_from(self.buckets).is_err() {
            return InvalidSettingsSnafu {
                reason: format!("buckets must be between 1 and {}, got {}", u32::MAX, self.buckets),
            }
            .fail();
        }
        if self.bucket_duration().is_zero() {
            return InvalidSettingsSnafu {
                reason: format!(
                    "window {:?} is too short for {} buckets",
                    self.window, self.buckets
                ),
            }
            .fail();
        }
        Ok(())
    }

    /// Time slice covered by a single bucket.
    pub fn bucket_duration(&self) -> Duration {
        match u32::try_from(self.buckets) {
            Ok(0) | Err(_) => Duration::ZERO,
            Ok(buckets) => self.window / buckets,
        }
    }
}
