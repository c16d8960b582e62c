//! Future types

use std::{
    future::Future,
    panic::{self, AssertUnwindSafe},
    pin::Pin,
    task::{Context, Poll, ready},
};

use pin_project::pin_project;

use super::{Acceptable, BreakerError, Promise};
use crate::Error;

/// Future for the [`BreakerService`](super::BreakerService).
#[pin_project(project = ResponseFutureProj)]
#[derive(Debug)]
pub enum ResponseFuture<F, L> {
    Admitted {
        #[pin]
        inner: F,
        // Taken once the outcome has been reported.
        promise: Option<Promise>,
        logic: L,
    },
    Dropped {
        error: Option<BreakerError>,
    },
}

impl<F, L> ResponseFuture<F, L> {
    pub(super) fn admitted(inner: F, promise: Promise, logic: L) -> Self {
        ResponseFuture::Admitted {
            inner,
            promise: Some(promise.ignore_unwinding()),
            logic,
        }
    }

    pub(super) fn dropped(error: BreakerError) -> Self {
        ResponseFuture::Dropped { error: Some(error) }
    }
}

impl<F, L, E> Future for ResponseFuture<F, L>
where
    F: Future<Output = Result<L::Response, E>>,
    E: Into<Error>,
    L: Acceptable,
{
    type Output = Result<L::Response, Error>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match self.project() {
            ResponseFutureProj::Dropped { error } => {
                let error = error.take().unwrap_or(BreakerError::ServiceUnavailable);
                Poll::Ready(Err(error.into()))
            }
            ResponseFutureProj::Admitted {
                inner,
                promise,
                logic,
            } => {
                let output = match panic::catch_unwind(AssertUnwindSafe(|| inner.poll(cx))) {
                    Ok(poll) => ready!(poll).map_err(Into::into),
                    Err(payload) => {
                        if let Some(promise) = promise.take() {
                            promise.reject_with_reason("panic");
                        }
                        panic::resume_unwind(payload);
                    }
                };

                if let Some(promise) = promise.take() {
                    report(promise, logic, &output);
                }
                Poll::Ready(output)
            }
        }
    }
}

fn report<L: Acceptable>(promise: Promise, logic: &L, output: &Result<L::Response, Error>) {
    let acceptable = match output {
        Ok(response) => logic.is_acceptable_response(response),
        Err(error) => match error.downcast_ref::<L::Error>() {
            Some(expected) => logic.is_acceptable_error(expected),
            None => false,
        },
    };

    if acceptable {
        promise.accept();
    } else {
        match output {
            Err(error) => promise.reject_with_reason(error),
            Ok(_) => promise.reject_with_reason("unacceptable response"),
        }
    }
}
