//! Dispatcher responses and the typed results handed back to callers.

use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::codec::{Content, JSON_COMMON_FLAGS, JsonSerializer, Transcoder};
use crate::core::{Cas, KvError, Result};
use crate::request::ReplicaTarget;
use crate::subdoc::lookup_macros;
use crate::subdoc::paths::{self, Segment};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubdocStatus {
    Success,
    PathNotFound,
    PathExists,
    PathMismatch,
}

/// One per-path outcome of a subdocument request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubdocField {
    pub original_index: u32,
    pub path: String,
    pub status: SubdocStatus,
    pub value: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseBody {
    Empty,
    Document { content: Vec<u8>, flags: u32 },
    Meta { deleted: bool, expiry: u32, flags: u32 },
    Fields { fields: Vec<SubdocField>, deleted: bool },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KvResponse {
    pub cas: Cas,
    pub body: ResponseBody,
}

impl KvResponse {
    pub fn new(cas: Cas, body: ResponseBody) -> Self {
        Self { cas, body }
    }

    fn unexpected(&self, wanted: &str) -> KvError {
        KvError::Decoding(format!("expected {} response, got {:?}", wanted, self.body))
    }
}

fn expiry_from_seconds(seconds: u64) -> Option<DateTime<Utc>> {
    if seconds == 0 {
        return None;
    }
    i64::try_from(seconds)
        .ok()
        .and_then(|secs| Utc.timestamp_opt(secs, 0).single())
}

#[derive(Debug, Clone, PartialEq)]
pub struct GetResult {
    content: Content,
    cas: Cas,
    expiry_time: Option<DateTime<Utc>>,
}

impl GetResult {
    pub fn content(&self) -> &Content {
        &self.content
    }

    pub fn content_as<T: DeserializeOwned>(&self) -> Result<T> {
        match &self.content {
            Content::Json(value) => {
                serde_json::from_value(value.clone()).map_err(|err| KvError::Decoding(err.to_string()))
            }
            Content::Text(text) => serde_json::from_value(Value::String(text.clone()))
                .map_err(|err| KvError::Decoding(err.to_string())),
            Content::Binary(_) => Err(KvError::Decoding(
                "binary content cannot be deserialized as JSON".to_string(),
            )),
        }
    }

    pub fn cas(&self) -> Cas {
        self.cas
    }

    /// Absolute expiry, present only when the fetch asked for it and the
    /// document has one.
    pub fn expiry_time(&self) -> Option<DateTime<Utc>> {
        self.expiry_time
    }

    pub(crate) fn from_document(response: KvResponse, transcoder: &dyn Transcoder) -> Result<Self> {
        let ResponseBody::Document { content, flags } = &response.body else {
            return Err(response.unexpected("document"));
        };
        let content = transcoder
            .decode(content, *flags)
            .map_err(|err| KvError::Decoding(err.to_string()))?;
        Ok(Self {
            content,
            cas: response.cas,
            expiry_time: None,
        })
    }

    /// Rebuilds a document from a projection or expiry-inclusive lookup.
    pub(crate) fn from_projection(
        response: KvResponse,
        projections: &[String],
        transcoder: &dyn Transcoder,
        serializer: &dyn JsonSerializer,
    ) -> Result<Self> {
        let ResponseBody::Fields { fields, .. } = response.body else {
            return Err(KvError::Decoding(
                "expected subdocument fields for projected get".to_string(),
            ));
        };

        let mut expiry_time = None;
        let mut flags = JSON_COMMON_FLAGS;
        let mut body = None;
        let mut projected = Map::new();

        for field in fields {
            if field.status != SubdocStatus::Success {
                continue;
            }
            match field.path.as_str() {
                lookup_macros::EXPIRY_TIME => {
                    let seconds = serializer
                        .deserialize(&field.value)
                        .ok()
                        .and_then(|value| value.as_u64())
                        .unwrap_or(0);
                    expiry_time = expiry_from_seconds(seconds);
                }
                lookup_macros::FLAGS => {
                    if let Some(value) = serializer.deserialize(&field.value).ok().and_then(|v| v.as_u64()) {
                        flags = u32::try_from(value).unwrap_or(JSON_COMMON_FLAGS);
                    }
                }
                "" => body = Some(field.value),
                path => {
                    let value = serializer
                        .deserialize(&field.value)
                        .map_err(|err| KvError::Decoding(err.to_string()))?;
                    insert_projection(&mut projected, path, value);
                }
            }
        }

        let content = if !projections.is_empty() {
            Content::Json(Value::Object(projected))
        } else {
            let bytes = body.ok_or_else(|| {
                KvError::Decoding("document body missing from lookup response".to_string())
            })?;
            transcoder
                .decode(&bytes, flags)
                .map_err(|err| KvError::Decoding(err.to_string()))?
        };

        Ok(Self {
            content,
            cas: response.cas,
            expiry_time,
        })
    }
}

/// Places `value` at `path` inside `target`, creating containers on the way.
///
/// Array segments append rather than index, so `tags[1]` projected alone
/// yields `{"tags": [..]}` with a single element. Paths that do not parse, or
/// start with an index, are kept as literal keys.
fn insert_projection(target: &mut Map<String, Value>, path: &str, value: Value) {
    let segments = paths::parse(path).unwrap_or_default();
    match segments.split_first() {
        Some((Segment::Key(key), rest)) => {
            let slot = target.entry(key.clone()).or_insert(Value::Null);
            place_projection(slot, rest, value);
        }
        _ => {
            target.insert(path.to_string(), value);
        }
    }
}

fn place_projection(slot: &mut Value, segments: &[Segment], value: Value) {
    let Some((segment, rest)) = segments.split_first() else {
        *slot = value;
        return;
    };
    match segment {
        Segment::Key(key) => {
            if !slot.is_object() {
                *slot = Value::Object(Map::new());
            }
            if let Value::Object(map) = slot {
                let next = map.entry(key.clone()).or_insert(Value::Null);
                place_projection(next, rest, value);
            }
        }
        Segment::Index(_) => {
            if !slot.is_array() {
                *slot = Value::Array(Vec::new());
            }
            if let Value::Array(items) = slot {
                items.push(Value::Null);
                if let Some(last) = items.last_mut() {
                    place_projection(last, rest, value);
                }
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MutationResult {
    cas: Cas,
}

impl MutationResult {
    pub fn cas(&self) -> Cas {
        self.cas
    }

    pub(crate) fn from_response(response: KvResponse) -> Self {
        Self { cas: response.cas }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExistsResult {
    exists: bool,
    cas: Cas,
}

impl ExistsResult {
    pub fn exists(&self) -> bool {
        self.exists
    }

    pub fn cas(&self) -> Cas {
        self.cas
    }

    pub(crate) fn missing() -> Self {
        Self {
            exists: false,
            cas: Cas::NONE,
        }
    }

    pub(crate) fn from_response(response: KvResponse) -> Result<Self> {
        match response.body {
            ResponseBody::Meta { deleted, .. } => Ok(Self {
                exists: !deleted,
                cas: response.cas,
            }),
            _ => Err(response.unexpected("meta")),
        }
    }
}

/// Per-path results of a subdocument request, indexed by submission order.
#[derive(Clone)]
pub struct SubdocFields {
    cas: Cas,
    deleted: bool,
    fields: Vec<Option<SubdocField>>,
    serializer: Arc<dyn JsonSerializer>,
}

impl std::fmt::Debug for SubdocFields {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubdocFields")
            .field("cas", &self.cas)
            .field("deleted", &self.deleted)
            .field("fields", &self.fields)
            .finish_non_exhaustive()
    }
}

impl SubdocFields {
    fn from_response(
        response: KvResponse,
        expected: usize,
        serializer: Arc<dyn JsonSerializer>,
    ) -> Result<Self> {
        let ResponseBody::Fields { fields, deleted } = response.body else {
            return Err(KvError::Decoding(
                "expected subdocument fields".to_string(),
            ));
        };
        let mut slots = vec![None; expected];
        for field in fields {
            let index = field.original_index as usize;
            if index >= expected {
                return Err(KvError::Decoding(format!(
                    "field index {} outside of {} submitted specs",
                    index, expected
                )));
            }
            slots[index] = Some(field);
        }
        Ok(Self {
            cas: response.cas,
            deleted,
            fields: slots,
            serializer,
        })
    }

    fn field(&self, index: usize) -> Result<&SubdocField> {
        self.fields
            .get(index)
            .and_then(Option::as_ref)
            .ok_or_else(|| KvError::Decoding(format!("no field at index {}", index)))
    }

    fn content_as<T: DeserializeOwned>(&self, index: usize) -> Result<T> {
        let field = self.field(index)?;
        if field.status != SubdocStatus::Success {
            return Err(KvError::Decoding(format!(
                "path '{}' failed with {:?}",
                field.path, field.status
            )));
        }
        let value = self
            .serializer
            .deserialize(&field.value)
            .map_err(|err| KvError::Decoding(err.to_string()))?;
        serde_json::from_value(value).map_err(|err| KvError::Decoding(err.to_string()))
    }
}

#[derive(Debug, Clone)]
pub struct LookupInResult {
    inner: SubdocFields,
}

impl LookupInResult {
    pub fn cas(&self) -> Cas {
        self.inner.cas
    }

    /// True when the lookup read a tombstone.
    pub fn is_deleted(&self) -> bool {
        self.inner.deleted
    }

    pub fn content_as<T: DeserializeOwned>(&self, index: usize) -> Result<T> {
        self.inner.content_as(index)
    }

    pub fn exists(&self, index: usize) -> bool {
        self.inner
            .field(index)
            .is_ok_and(|field| field.status == SubdocStatus::Success)
    }

    pub fn status(&self, index: usize) -> Option<SubdocStatus> {
        self.inner.field(index).ok().map(|field| field.status)
    }

    pub(crate) fn from_response(
        response: KvResponse,
        expected: usize,
        serializer: Arc<dyn JsonSerializer>,
    ) -> Result<Self> {
        Ok(Self {
            inner: SubdocFields::from_response(response, expected, serializer)?,
        })
    }
}

#[derive(Debug, Clone)]
pub struct MutateInResult {
    inner: SubdocFields,
}

impl MutateInResult {
    pub fn cas(&self) -> Cas {
        self.inner.cas
    }

    /// Value returned by a path, only counters return one.
    pub fn content_as<T: DeserializeOwned>(&self, index: usize) -> Result<T> {
        self.inner.content_as(index)
    }

    pub(crate) fn from_response(
        response: KvResponse,
        expected: usize,
        serializer: Arc<dyn JsonSerializer>,
    ) -> Result<Self> {
        Ok(Self {
            inner: SubdocFields::from_response(response, expected, serializer)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GetReplicaResult {
    result: GetResult,
    target: ReplicaTarget,
}

impl GetReplicaResult {
    pub fn content(&self) -> &Content {
        self.result.content()
    }

    pub fn content_as<T: DeserializeOwned>(&self) -> Result<T> {
        self.result.content_as()
    }

    pub fn cas(&self) -> Cas {
        self.result.cas()
    }

    pub fn target(&self) -> ReplicaTarget {
        self.target
    }

    pub fn is_replica(&self) -> bool {
        self.target != ReplicaTarget::Active
    }

    pub(crate) fn from_response(
        response: KvResponse,
        target: ReplicaTarget,
        transcoder: &dyn Transcoder,
    ) -> Result<Self> {
        Ok(Self {
            result: GetResult::from_document(response, transcoder)?,
            target,
        })
    }
}
