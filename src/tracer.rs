use tracing::{Level, event};
use uuid::Uuid;

/// Span names opened by the request builders.
pub mod span_names {
    pub const GET: &str = "get";
    pub const GET_AND_LOCK: &str = "get_and_lock";
    pub const GET_AND_TOUCH: &str = "get_and_touch";
    pub const EXISTS: &str = "exists";
    pub const INSERT: &str = "insert";
    pub const UPSERT: &str = "upsert";
    pub const REPLACE: &str = "replace";
    pub const REMOVE: &str = "remove";
    pub const TOUCH: &str = "touch";
    pub const UNLOCK: &str = "unlock";
    pub const LOOKUP_IN: &str = "lookup_in";
    pub const MUTATE_IN: &str = "mutate_in";
    pub const GET_REPLICA: &str = "get_replica";
    pub const GET_ANY_REPLICA: &str = "get_any_replica";
    pub const GET_ALL_REPLICAS: &str = "get_all_replicas";
    pub const REQUEST_ENCODING: &str = "request_encoding";
}

/// Correlation handle attached to a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestSpan {
    id: Uuid,
    parent: Option<Uuid>,
    name: &'static str,
}

impl RequestSpan {
    pub fn new(name: &'static str, parent: Option<&RequestSpan>) -> Self {
        Self {
            id: Uuid::new_v4(),
            parent: parent.map(|p| p.id),
            name,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn parent_id(&self) -> Option<Uuid> {
        self.parent
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

pub trait RequestTracer: Send + Sync {
    fn request_span(&self, name: &'static str, parent: Option<&RequestSpan>) -> RequestSpan;

    fn end_span(&self, _span: &RequestSpan) {}
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoopRequestTracer;

impl RequestTracer for NoopRequestTracer {
    fn request_span(&self, name: &'static str, parent: Option<&RequestSpan>) -> RequestSpan {
        RequestSpan::new(name, parent)
    }
}

/// Reports span boundaries as `tracing` events.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingRequestTracer;

impl RequestTracer for LoggingRequestTracer {
    fn request_span(&self, name: &'static str, parent: Option<&RequestSpan>) -> RequestSpan {
        let span = RequestSpan::new(name, parent);
        event!(
            Level::TRACE,
            span = %span.id,
            parent = ?span.parent,
            span_name = span.name,
            "request span started"
        );
        span
    }

    fn end_span(&self, span: &RequestSpan) {
        event!(
            Level::TRACE,
            span = %span.id,
            span_name = span.name,
            "request span ended"
        );
    }
}
