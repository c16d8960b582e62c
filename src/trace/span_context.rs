use http::{HeaderMap, HeaderValue, header::InvalidHeaderValue};

pub const TRACE_ID_KEY: &str = "x-trace-id";
pub const SPAN_ID_KEY: &str = "x-span-id";

/// Identifies one span of a distributed trace.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct SpanContext {
    trace_id: String,
    span_id: String,
}

impl SpanContext {
    pub fn new(trace_id: impl Into<String>, span_id: impl Into<String>) -> Self {
        Self {
            trace_id: trace_id.into(),
            span_id: span_id.into(),
        }
    }

    /// Starts a new trace with random 128-bit trace and 64-bit span ids.
    pub fn new_root() -> Self {
        Self::new(format!("{:032x}", rand::random::<u128>()), new_span_id())
    }

    /// A span in the same trace as `self`.
    pub fn child(&self) -> Self {
        Self::new(self.trace_id.clone(), new_span_id())
    }

    pub fn trace_id(&self) -> &str {
        &self.trace_id
    }

    pub fn span_id(&self) -> &str {
        &self.span_id
    }

    /// Hands each propagated key/value pair to `visitor`, trace id first.
    pub fn visit<F>(&self, mut visitor: F)
    where
        F: FnMut(&str, &str),
    {
        visitor(TRACE_ID_KEY, &self.trace_id);
        visitor(SPAN_ID_KEY, &self.span_id);
    }

    /// Writes the identifiers into outgoing request headers, replacing any
    /// existing values. Nothing is written if either id is not a valid header
    /// value.
    pub fn inject(&self, headers: &mut HeaderMap) -> Result<(), InvalidHeaderValue> {
        let trace_id = HeaderValue::from_str(&self.trace_id)?;
        let span_id = HeaderValue::from_str(&self.span_id)?;
        headers.insert(TRACE_ID_KEY, trace_id);
        headers.insert(SPAN_ID_KEY, span_id);
        Ok(())
    }
}

fn new_span_id() -> String {
    format!("{:016x}", rand::random::<u64>())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_ids_are_hex_of_fixed_width() {
        let ctx = SpanContext::new_root();
        assert_eq!(ctx.trace_id().len(), 32);
        assert_eq!(ctx.span_id().len(), 16);
        assert!(ctx.trace_id().chars().all(|c| c.is_ascii_hexdigit()));
        assert!(ctx.span_id().chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn child_keeps_trace_and_changes_span() {
        let parent = SpanContext::new("4bf92f3577b34da6a3ce929d0e0e4736", "00f067aa0ba902b7");
        let child = parent.child();
        assert_eq!(child.trace_id(), parent.trace_id());
        assert_ne!(child.span_id(), parent.span_id());
    }

    #[test]
    fn visit_exports_trace_then_span() {
        let ctx = SpanContext::new("trace-1", "span-1");
        let mut seen = Vec::new();
        ctx.visit(|key, value| seen.push((key.to_owned(), value.to_owned())));
        assert_eq!(
            seen,
            vec![
                ("x-trace-id".to_owned(), "trace-1".to_owned()),
                ("x-span-id".to_owned(), "span-1".to_owned()),
            ]
        );
    }

    #[test]
    fn visit_always_exports_both_pairs() {
        let ctx = SpanContext::new("trace-1", "span-1");
        let mut calls = 0;
        ctx.visit(|_, _| calls += 1);
        assert_eq!(calls, 2);
    }

    #[test]
    fn inject_sets_headers() {
        let ctx = SpanContext::new("trace-1", "span-1");
        let mut headers = HeaderMap::new();
        headers.insert(TRACE_ID_KEY, HeaderValue::from_static("stale"));

        ctx.inject(&mut headers).unwrap();
        assert_eq!(headers.get(TRACE_ID_KEY).unwrap(), "trace-1");
        assert_eq!(headers.get(SPAN_ID_KEY).unwrap(), "span-1");
        assert_eq!(headers.len(), 2);
    }

    #[test]
    fn inject_rejects_unprintable_ids() {
        let ctx = SpanContext::new("trace\n1", "span-1");
        let mut headers = HeaderMap::new();
        assert!(ctx.inject(&mut headers).is_err());
        assert!(headers.is_empty());
    }
}
