//! Operations against one collection.
//!
//! Every operation comes in two halves: a synchronous builder that validates
//! its inputs and returns a finished [`KvRequest`], and an async wrapper that
//! dispatches it and decodes the response. Validation failures surface from
//! the builder, before anything is dispatched.

mod builders;
mod ops;

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{Level, event};

use crate::codec::{Content, EncodedValue, JsonSerializer, Transcoder};
use crate::core::{CollectionIdentifier, Identifier, KvError, Result};
use crate::dispatch::{Dispatcher, TopologySource};
use crate::env::ClientEnvironment;
use crate::options::CommonOptions;
use crate::request::{KvOp, KvRequest, RequestContext};
use crate::tracer::{RequestSpan, span_names};

pub use builders::PreparedMutateIn;

#[derive(Clone)]
pub struct Collection {
    identifier: CollectionIdentifier,
    env: Arc<ClientEnvironment>,
    dispatcher: Arc<dyn Dispatcher>,
    topology: Arc<dyn TopologySource>,
}

impl Collection {
    pub fn new(
        identifier: CollectionIdentifier,
        env: Arc<ClientEnvironment>,
        dispatcher: Arc<dyn Dispatcher>,
        topology: Arc<dyn TopologySource>,
    ) -> Self {
        Self {
            identifier,
            env,
            dispatcher,
            topology,
        }
    }

    pub fn identifier(&self) -> &CollectionIdentifier {
        &self.identifier
    }

    pub fn environment(&self) -> &ClientEnvironment {
        &self.env
    }

    pub(crate) fn dispatcher(&self) -> &Arc<dyn Dispatcher> {
        &self.dispatcher
    }

    pub(crate) fn topology(&self) -> &Arc<dyn TopologySource> {
        &self.topology
    }

    /// Address of `key`, rejecting the empty key.
    pub(crate) fn document_id(&self, key: &str) -> Result<Identifier> {
        let id = self.identifier.document(key);
        if key.is_empty() {
            return Err(KvError::invalid_argument("Id cannot be null or empty", &id));
        }
        Ok(id)
    }

    pub(crate) fn kv_timeout(&self, common: &CommonOptions) -> Duration {
        common.timeout.unwrap_or(self.env.timeout_config.kv_timeout)
    }

    pub(crate) fn open_span(&self, name: &'static str, common: &CommonOptions) -> RequestSpan {
        self.env.tracer.request_span(name, common.parent_span.as_ref())
    }

    pub(crate) fn transcoder<'a>(&'a self, custom: &'a Option<Arc<dyn Transcoder>>) -> &'a dyn Transcoder {
        custom.as_deref().unwrap_or(&*self.env.transcoder)
    }

    /// The per-operation serializer, falling back to the environment's.
    pub(crate) fn json_serializer(
        &self,
        custom: &Option<Arc<dyn JsonSerializer>>,
    ) -> Arc<dyn JsonSerializer> {
        custom
            .clone()
            .unwrap_or_else(|| Arc::clone(&self.env.json_serializer))
    }

    /// Encodes a document inside its own encoding span, timing the codec.
    fn encode_content(
        &self,
        id: &Identifier,
        parent: &RequestSpan,
        transcoder: &dyn Transcoder,
        content: &Content,
    ) -> Result<(EncodedValue, Duration)> {
        let encoding = self
            .env
            .tracer
            .request_span(span_names::REQUEST_ENCODING, Some(parent));
        let start = Instant::now();
        let encoded = transcoder.encode(content);
        let latency = start.elapsed();
        self.env.tracer.end_span(&encoding);

        encoded.map(|value| (value, latency)).map_err(|err| {
            self.env.tracer.end_span(parent);
            KvError::encoding(err, id)
        })
    }

    pub(crate) fn assemble(
        &self,
        identifier: Identifier,
        span: RequestSpan,
        timeout: Duration,
        common: &CommonOptions,
        encode_latency: Option<Duration>,
        op: KvOp,
    ) -> KvRequest {
        let request = KvRequest {
            identifier,
            timeout,
            retry_strategy: common.retry_strategy.unwrap_or(self.env.retry_strategy),
            span,
            context: RequestContext {
                client_context: common.client_context.clone(),
                encode_latency,
            },
            op,
        };
        event!(
            Level::TRACE,
            op = request.name(),
            id = %request.identifier,
            timeout_ms = request.timeout.as_millis() as u64,
            "request built"
        );
        request
    }
}
