//! Trace identifiers that travel alongside a guarded call.
//!
//! The breaker never inspects these; they exist so that the same call path
//! can stamp outgoing metadata.

mod span_context;

pub use span_context::{SPAN_ID_KEY, SpanContext, TRACE_ID_KEY};
