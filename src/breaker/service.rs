use std::{
    sync::Arc,
    task::{Context, Poll},
};

use tower::Service;

use super::{Acceptable, Registry, future::ResponseFuture, registry::breaker_name};
use crate::Error;

/// Service produced by [`BreakerLayer`](super::BreakerLayer).
#[derive(Clone, Debug)]
pub struct BreakerService<S, L> {
    inner: S,
    target: Arc<str>,
    registry: Arc<Registry>,
    logic: L,
}

impl<S, L> BreakerService<S, L> {
    pub(crate) fn new(inner: S, target: Arc<str>, registry: Arc<Registry>, logic: L) -> Self {
        Self {
            inner,
            target,
            registry,
            logic,
        }
    }

    pub fn get_ref(&self) -> &S {
        &self.inner
    }
}

impl<S, L, B> Service<http::Request<B>> for BreakerService<S, L>
where
    S: Service<http::Request<B>, Response = L::Response>,
    S::Error: Into<Error>,
    L: Acceptable,
{
    type Response = S::Response;
    type Error = Error;
    type Future = ResponseFuture<S::Future, L>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx).map_err(Into::into)
    }

    fn call(&mut self, request: http::Request<B>) -> Self::Future {
        let name = breaker_name(&self.target, request.uri().path());
        let breaker = self.registry.get_breaker(&name);

        match breaker.allow() {
            Ok(promise) => {
                ResponseFuture::admitted(self.inner.call(request), promise, self.logic.clone())
            }
            Err(error) => ResponseFuture::dropped(error),
        }
    }
}
