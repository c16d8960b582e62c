// src/breaker/http.rs
use std::marker::PhantomData;

use crate::Error as CrateError;
use http::StatusCode;
use snafu::Snafu;

/// A generic error enumeration for HTTP-related issues.
///
/// Client integrations convert their own errors into this type so that
/// [`HttpAcceptable`] can tell overload signals from caller mistakes.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum HttpError {
    /// An error occurred during the transport of the request (e.g., network issue, DNS).
    #[snafu(display("HTTP transport error: {}", source))]
    Transport { source: CrateError },

    /// The request itself was malformed or invalid before sending.
    #[snafu(display("Invalid HTTP request: {}", details))]
    InvalidRequest { details: String },

    /// The server responded with an error status code.
    #[snafu(display("HTTP server error response (status {}): {}", status, body))]
    ServerError { status: u16, body: String },

    /// A timeout occurred.
    #[snafu(display("HTTP request timed out"))]
    Timeout,

    /// Other, unspecified HTTP client errors.
    #[snafu(display("Generic HTTP client error: {}", source))]
    ClientError { source: CrateError },
}

/// Decides which outcomes of a protected service count toward the breaker's
/// success rate.
///
/// Only outcomes that say something about the health of the downstream should
/// count as failures. A request the server refused because it was malformed is
/// a healthy server doing its job.
///
/// # Example
/// ```rust
/// use adaptive_breaker::breaker::Acceptable;
///
/// #[derive(Clone)]
/// struct OnlyTimeouts;
///
/// impl Acceptable for OnlyTimeouts {
///     type Error = std::io::Error;
///     type Response = String;
///
///     fn is_acceptable_error(&self, error: &Self::Error) -> bool {
///         error.kind() != std::io::ErrorKind::TimedOut
///     }
/// }
/// ```
pub trait Acceptable: Clone + Send + Sync + 'static {
    /// The concrete error type produced by the service, recovered from the
    /// boxed crate error by downcasting. Errors of any other type are failures.
    type Error: std::error::Error + Send + Sync + 'static;

    /// The type of successful responses from the service.
    type Response;

    /// Returns `true` if `error` should be counted as a success.
    fn is_acceptable_error(&self, error: &Self::Error) -> bool;

    /// Returns `true` if a successful response really is one.
    ///
    /// Defaults to `true`. Override for transports that report overload as a
    /// regular response, such as an HTTP 503.
    fn is_acceptable_response(&self, _response: &Self::Response) -> bool {
        true
    }
}

/// Statuses that signal an overloaded or failing server.
pub fn is_unacceptable_status(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::INTERNAL_SERVER_ERROR
            | StatusCode::SERVICE_UNAVAILABLE
            | StatusCode::GATEWAY_TIMEOUT
    )
}

/// [`Acceptable`] for `http::Response<B>` services failing with [`HttpError`].
///
/// Failures are internal errors (500), unavailability (503), deadline overruns
/// (504 or a client-side timeout) and transport errors. Everything else,
/// including 4xx responses, counts as success.
pub struct HttpAcceptable<B = ()> {
    _body: PhantomData<fn() -> B>,
}

impl<B> HttpAcceptable<B> {
    pub fn new() -> Self {
        Self { _body: PhantomData }
    }
}

impl<B> Default for HttpAcceptable<B> {
    fn default() -> Self {
        Self::new()
    }
}

impl<B> Clone for HttpAcceptable<B> {
    fn clone(&self) -> Self {
        Self::new()
    }
}

impl<B> std::fmt::Debug for HttpAcceptable<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("HttpAcceptable")
    }
}

impl<B: 'static> Acceptable for HttpAcceptable<B> {
    type Error = HttpError;
    type Response = http::Response<B>;

    fn is_acceptable_error(&self, error: &Self::Error) -> bool {
        match error {
            HttpError::Transport { .. } => false,
            HttpError::Timeout => false,
            HttpError::ServerError { status, .. } => StatusCode::from_u16(*status)
                .map(|s| !is_unacceptable_status(s))
                .unwrap_or(true),
            HttpError::InvalidRequest { .. } => true,
            HttpError::ClientError { .. } => true,
        }
    }

    fn is_acceptable_response(&self, response: &Self::Response) -> bool {
        !is_unacceptable_status(response.status())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn logic() -> HttpAcceptable {
        HttpAcceptable::default()
    }

    fn response(status: u16) -> http::Response<()> {
        http::Response::builder().status(status).body(()).unwrap()
    }

    #[test]
    fn overload_statuses_are_failures() {
        for status in [500, 503, 504] {
            assert!(!logic().is_acceptable_response(&response(status)), "{status}");
            let error = HttpError::ServerError {
                status,
                body: String::new(),
            };
            assert!(!logic().is_acceptable_error(&error), "{status}");
        }
    }

    #[test]
    fn caller_mistakes_are_not_failures() {
        for status in [200, 204, 400, 404, 429, 501] {
            assert!(logic().is_acceptable_response(&response(status)), "{status}");
        }
        let invalid = HttpError::InvalidRequest {
            details: "bad uri".to_owned(),
        };
        assert!(logic().is_acceptable_error(&invalid));
        let client = HttpError::ClientError {
            source: "json decode".into(),
        };
        assert!(logic().is_acceptable_error(&client));
    }

    #[test]
    fn transport_problems_are_failures() {
        assert!(!logic().is_acceptable_error(&HttpError::Timeout));
        let transport = HttpError::Transport {
            source: "connection refused".into(),
        };
        assert!(!logic().is_acceptable_error(&transport));
    }
}
