pub mod config;

use std::sync::Arc;

use crate::codec::{DefaultJsonSerializer, JsonSerializer, JsonTranscoder, Transcoder};
use crate::core::{Clock, EventSink, LogEventSink, RetryStrategy, SystemClock};
use crate::tracer::{NoopRequestTracer, RequestTracer};
use config::TimeoutConfig;

/// Shared, immutable defaults and collaborators used by every request builder.
///
/// Built once with consuming setters, then shared behind an `Arc`.
#[derive(Clone)]
pub struct ClientEnvironment {
    pub timeout_config: TimeoutConfig,
    pub retry_strategy: RetryStrategy,
    pub transcoder: Arc<dyn Transcoder>,
    pub json_serializer: Arc<dyn JsonSerializer>,
    pub tracer: Arc<dyn RequestTracer>,
    pub clock: Arc<dyn Clock>,
    pub event_sink: Arc<dyn EventSink>,
}

impl ClientEnvironment {
    pub fn new() -> Self {
        Self {
            timeout_config: TimeoutConfig::default(),
            retry_strategy: RetryStrategy::default(),
            transcoder: Arc::new(JsonTranscoder),
            json_serializer: Arc::new(DefaultJsonSerializer),
            tracer: Arc::new(NoopRequestTracer),
            clock: Arc::new(SystemClock),
            event_sink: Arc::new(LogEventSink),
        }
    }

    pub fn timeout_config(mut self, config: TimeoutConfig) -> Self {
        self.timeout_config = config;
        self
    }

    pub fn retry_strategy(mut self, strategy: RetryStrategy) -> Self {
        self.retry_strategy = strategy;
        self
    }

    pub fn transcoder(mut self, transcoder: Arc<dyn Transcoder>) -> Self {
        self.transcoder = transcoder;
        self
    }

    pub fn json_serializer(mut self, serializer: Arc<dyn JsonSerializer>) -> Self {
        self.json_serializer = serializer;
        self
    }

    pub fn tracer(mut self, tracer: Arc<dyn RequestTracer>) -> Self {
        self.tracer = tracer;
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.event_sink = sink;
        self
    }
}

impl Default for ClientEnvironment {
    fn default() -> Self {
        Self::new()
    }
}
