//! Adaptive client-side throttling for self-protecting RPC clients.
//!
//! This crate sheds outgoing requests probabilistically as the recent failure
//! rate of a downstream resource rises. There is no open/half-open/closed state
//! machine: every call recomputes a drop probability from a rolling window of
//! outcomes, so recovery happens on its own as the window fills with successes.
//!
//! # Algorithm Overview
//!
//! For each named resource the breaker keeps `accepts` (successful outcomes) and
//! `total` (all outcomes) over a trailing window (10s by default) and computes
//!
//! ```text
//! drop_ratio = max(0, (total - protection - k * accepts) / (total + 1))
//! ```
//!
//! A call is rejected with probability `drop_ratio`. `k` (default 1.5) controls
//! how many failures are tolerated before shedding starts, and `protection`
//! (default 5) keeps tiny samples from ever triggering a rejection.
//!
//! # Basic Usage
//! ```
//! use adaptive_breaker::breaker::{self, BreakerError};
//!
//! let result: Result<u32, BreakerError> =
//!     breaker::do_with_acceptable("backend/pkg.Greeter/Hello", || Ok(42), |_err| false);
//! assert_eq!(result, Ok(42));
//! ```
//!
//! # Manual outcome reporting
//! ```
//! use adaptive_breaker::breaker;
//!
//! if let Ok(promise) = breaker::allow("backend/pkg.Greeter/Stream") {
//!     // start the streaming call, and later:
//!     promise.accept();
//! }
//! ```
//!
//! # Tower integration
//! See [`breaker::BreakerLayer`] for wrapping an HTTP client service.
pub mod breaker;
pub mod trace;
#[cfg(test)]
pub mod test_utils;

#[macro_use]
extern crate tracing;

pub type Error = Box<dyn std::error::Error + Send + Sync + 'static>;
