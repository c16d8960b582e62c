use std::sync::Arc;

use tower::Layer;

use super::{Acceptable, BreakerService, Registry, registry::registry};

/// Puts an adaptive breaker in front of an HTTP client service.
///
/// Every request is guarded by the breaker named
/// `"<target>/<request path>"`, taken from the process-wide registry unless
/// [`with_registry`](Self::with_registry) is used.
///
/// # Example
/// ```rust
/// use adaptive_breaker::breaker::{BreakerLayer, HttpAcceptable};
///
/// let layer = BreakerLayer::new("users:8080", HttpAcceptable::<String>::new());
/// # let _ = layer;
/// ```
#[derive(Clone, Debug)]
pub struct BreakerLayer<L> {
    target: Arc<str>,
    registry: Arc<Registry>,
    logic: L,
}

impl<L: Acceptable> BreakerLayer<L> {
    pub fn new(target: impl Into<Arc<str>>, logic: L) -> Self {
        Self {
            target: target.into(),
            registry: registry(),
            logic,
        }
    }

    pub fn with_registry(mut self, registry: Arc<Registry>) -> Self {
        self.registry = registry;
        self
    }
}

impl<S, L: Acceptable> Layer<S> for BreakerLayer<L> {
    type Service = BreakerService<S, L>;

    fn layer(&self, inner: S) -> Self::Service {
        BreakerService::new(
            inner,
            Arc::clone(&self.target),
            Arc::clone(&self.registry),
            self.logic.clone(),
        )
    }
}
