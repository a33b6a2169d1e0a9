use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;
use log::debug;
use serde_json::{Map, Value, json};
use tokio::sync::Mutex;

use super::Dispatcher;
use crate::codec::JSON_COMMON_FLAGS;
use crate::core::expiry::RELATIVE_EXPIRY_CUTOFF_SECONDS;
use crate::core::{Cas, ErrorContext, Identifier, KvError, Result};
use crate::request::{KvOp, KvRequest, ReplicaTarget, WireFrame};
use crate::result::{KvResponse, ResponseBody, SubdocField, SubdocStatus};
use crate::subdoc::paths::{self, PathError};
use crate::subdoc::{
    MutateInMacro, SubdocCommandKind, SubdocGetCommand, doc_flags, lookup_macros,
};

const DEFAULT_LOCK_TIME: Duration = Duration::from_secs(15);

/// A request as the in-memory store received it.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub name: &'static str,
    pub frame: WireFrame,
}

#[derive(Debug, Clone)]
struct StoredDocument {
    body: Vec<u8>,
    flags: u32,
    cas: u64,
    /// Absolute epoch seconds, 0 when the document never expires.
    expiry: u32,
    xattrs: Value,
    deleted: bool,
    locked_until: Option<Instant>,
}

impl StoredDocument {
    fn new(body: Vec<u8>, flags: u32, cas: u64, expiry: u32) -> Self {
        Self {
            body,
            flags,
            cas,
            expiry,
            xattrs: Value::Object(Map::new()),
            deleted: false,
            locked_until: None,
        }
    }

    fn is_locked(&self, now: Instant) -> bool {
        self.locked_until.is_some_and(|until| until > now)
    }

    fn is_live(&self, now_secs: i64) -> bool {
        !self.deleted && (self.expiry == 0 || i64::from(self.expiry) > now_secs)
    }

    fn response(&self) -> KvResponse {
        KvResponse::new(
            Cas::new(self.cas),
            ResponseBody::Document {
                content: self.body.clone(),
                flags: self.flags,
            },
        )
    }
}

fn absolute_expiry(expiry: u32, now_secs: i64) -> u32 {
    if expiry == 0 || u64::from(expiry) >= RELATIVE_EXPIRY_CUTOFF_SECONDS {
        return expiry;
    }
    u32::try_from(now_secs + i64::from(expiry)).unwrap_or(u32::MAX)
}

fn check_write(doc: &StoredDocument, expected: Cas, now: Instant, id: &Identifier) -> Result<()> {
    if doc.is_locked(now) && expected.value() != doc.cas {
        return Err(KvError::DocumentLocked(id.into()));
    }
    if !expected.is_none() && expected.value() != doc.cas {
        return Err(KvError::CasMismatch(id.into()));
    }
    Ok(())
}

fn path_error(err: PathError, path: &str, id: &Identifier) -> KvError {
    let path = path.to_string();
    let context = ErrorContext::from(id);
    match err {
        PathError::NotFound => KvError::PathNotFound { path, context },
        PathError::Exists => KvError::PathExists { path, context },
        PathError::Mismatch => KvError::PathMismatch { path, context },
        PathError::Invalid => KvError::InvalidArgument {
            message: format!("invalid path or value at '{}'", path),
            context,
        },
    }
}

fn expand_macro(fragment: &[u8], cas: u64) -> Vec<u8> {
    match serde_json::from_slice::<Value>(fragment) {
        Ok(Value::String(name))
            if name == MutateInMacro::Cas.value() || name == MutateInMacro::SeqNo.value() =>
        {
            format!("\"0x{:016x}\"", cas).into_bytes()
        }
        _ => fragment.to_vec(),
    }
}

fn xattr_value(doc: &StoredDocument, path: &str) -> Option<Value> {
    match path {
        lookup_macros::EXPIRY_TIME => Some(Value::from(doc.expiry)),
        lookup_macros::FLAGS => Some(Value::from(doc.flags)),
        lookup_macros::CAS => Some(Value::from(format!("0x{:016x}", doc.cas))),
        lookup_macros::IS_DELETED => Some(Value::from(doc.deleted)),
        lookup_macros::VALUE_SIZE_BYTES => Some(Value::from(doc.body.len())),
        lookup_macros::DOCUMENT => Some(json!({
            "CAS": format!("0x{:016x}", doc.cas),
            "exptime": doc.expiry,
            "flags": doc.flags,
            "deleted": doc.deleted,
            "value_bytes": doc.body.len(),
        })),
        _ => paths::parse(path).and_then(|segments| paths::get(&doc.xattrs, &segments).cloned()),
    }
}

fn lookup_field(doc: &StoredDocument, body: Option<&Value>, command: &SubdocGetCommand) -> SubdocField {
    let field = |status, value| SubdocField {
        original_index: command.original_index,
        path: command.path.clone(),
        status,
        value,
    };

    if command.kind == SubdocCommandKind::GetDoc {
        return field(SubdocStatus::Success, doc.body.clone());
    }

    let value = if command.xattr {
        xattr_value(doc, &command.path)
    } else {
        body.and_then(|body| {
            paths::parse(&command.path).and_then(|segments| paths::get(body, &segments).cloned())
        })
    };

    match (command.kind, value) {
        (_, None) => field(SubdocStatus::PathNotFound, Vec::new()),
        (SubdocCommandKind::Exists, Some(_)) => field(SubdocStatus::Success, Vec::new()),
        (SubdocCommandKind::Count, Some(Value::Array(items))) => {
            field(SubdocStatus::Success, items.len().to_string().into_bytes())
        }
        (SubdocCommandKind::Count, Some(Value::Object(map))) => {
            field(SubdocStatus::Success, map.len().to_string().into_bytes())
        }
        (SubdocCommandKind::Count, Some(_)) => field(SubdocStatus::PathMismatch, Vec::new()),
        (_, Some(value)) => field(
            SubdocStatus::Success,
            serde_json::to_vec(&value).unwrap_or_default(),
        ),
    }
}

#[derive(Debug, Default)]
struct StoreState {
    documents: HashMap<Identifier, StoredDocument>,
    last_cas: u64,
}

impl StoreState {
    fn next_cas(&mut self) -> u64 {
        self.last_cas += 1;
        self.last_cas
    }

    fn live(&self, id: &Identifier, now_secs: i64) -> Option<&StoredDocument> {
        self.documents.get(id).filter(|doc| doc.is_live(now_secs))
    }

    fn live_mut(&mut self, id: &Identifier, now_secs: i64) -> Result<&mut StoredDocument> {
        self.documents
            .get_mut(id)
            .filter(|doc| doc.is_live(now_secs))
            .ok_or_else(|| KvError::DocumentNotFound(id.into()))
    }

    fn apply(&mut self, request: &KvRequest) -> Result<KvResponse> {
        let id = &request.identifier;
        let now = Instant::now();
        let now_secs = Utc::now().timestamp();

        match &request.op {
            KvOp::Get | KvOp::ReplicaGet { .. } => self
                .live(id, now_secs)
                .map(StoredDocument::response)
                .ok_or_else(|| KvError::DocumentNotFound(id.into())),
            KvOp::GetAndLock { lock_time_secs } => {
                let cas = self.next_cas();
                let doc = self.live_mut(id, now_secs)?;
                if doc.is_locked(now) {
                    return Err(KvError::DocumentLocked(id.into()));
                }
                let lock_time = match *lock_time_secs {
                    0 => DEFAULT_LOCK_TIME,
                    secs => Duration::from_secs(u64::from(secs)),
                };
                doc.locked_until = Some(now + lock_time);
                doc.cas = cas;
                Ok(doc.response())
            }
            KvOp::GetAndTouch { expiry } => {
                let cas = self.next_cas();
                let doc = self.live_mut(id, now_secs)?;
                doc.expiry = absolute_expiry(*expiry, now_secs);
                doc.cas = cas;
                Ok(doc.response())
            }
            KvOp::GetMeta => match self.documents.get(id) {
                Some(doc) if doc.deleted || doc.is_live(now_secs) => Ok(KvResponse::new(
                    Cas::new(doc.cas),
                    ResponseBody::Meta {
                        deleted: doc.deleted,
                        expiry: doc.expiry,
                        flags: doc.flags,
                    },
                )),
                _ => Err(KvError::DocumentNotFound(id.into())),
            },
            KvOp::Insert {
                content,
                flags,
                expiry,
                ..
            } => {
                if self.live(id, now_secs).is_some() {
                    return Err(KvError::DocumentExists(id.into()));
                }
                let cas = self.next_cas();
                let doc =
                    StoredDocument::new(content.clone(), *flags, cas, absolute_expiry(*expiry, now_secs));
                self.documents.insert(id.clone(), doc);
                Ok(KvResponse::new(Cas::new(cas), ResponseBody::Empty))
            }
            KvOp::Upsert {
                content,
                flags,
                expiry,
                preserve_expiry,
                ..
            } => {
                let previous_expiry = match self.live(id, now_secs) {
                    Some(doc) if doc.is_locked(now) => {
                        return Err(KvError::DocumentLocked(id.into()));
                    }
                    Some(doc) => Some(doc.expiry),
                    None => None,
                };
                let expiry = match previous_expiry {
                    Some(previous) if *preserve_expiry => previous,
                    _ => absolute_expiry(*expiry, now_secs),
                };
                let cas = self.next_cas();
                self.documents
                    .insert(id.clone(), StoredDocument::new(content.clone(), *flags, cas, expiry));
                Ok(KvResponse::new(Cas::new(cas), ResponseBody::Empty))
            }
            KvOp::Replace {
                content,
                flags,
                expiry,
                preserve_expiry,
                cas: expected,
                ..
            } => {
                let cas = self.next_cas();
                let doc = self.live_mut(id, now_secs)?;
                check_write(doc, *expected, now, id)?;
                doc.body = content.clone();
                doc.flags = *flags;
                if !*preserve_expiry {
                    doc.expiry = absolute_expiry(*expiry, now_secs);
                }
                doc.cas = cas;
                doc.locked_until = None;
                Ok(KvResponse::new(Cas::new(cas), ResponseBody::Empty))
            }
            KvOp::Remove { cas: expected, .. } => {
                let cas = self.next_cas();
                let doc = self.live_mut(id, now_secs)?;
                check_write(doc, *expected, now, id)?;
                doc.body.clear();
                doc.deleted = true;
                doc.expiry = 0;
                doc.cas = cas;
                doc.locked_until = None;
                Ok(KvResponse::new(Cas::new(cas), ResponseBody::Empty))
            }
            KvOp::Touch { expiry } => {
                let cas = self.next_cas();
                let doc = self.live_mut(id, now_secs)?;
                if doc.is_locked(now) {
                    return Err(KvError::DocumentLocked(id.into()));
                }
                doc.expiry = absolute_expiry(*expiry, now_secs);
                doc.cas = cas;
                Ok(KvResponse::new(Cas::new(cas), ResponseBody::Empty))
            }
            KvOp::Unlock { cas: expected } => {
                let doc = self.live_mut(id, now_secs)?;
                if expected.value() != doc.cas {
                    return Err(KvError::CasMismatch(id.into()));
                }
                doc.locked_until = None;
                Ok(KvResponse::new(Cas::new(doc.cas), ResponseBody::Empty))
            }
            KvOp::SubdocGet {
                doc_flags: flags,
                commands,
            } => {
                let access_deleted = flags & doc_flags::ACCESS_DELETED != 0;
                let doc = self
                    .documents
                    .get(id)
                    .filter(|doc| doc.is_live(now_secs) || (access_deleted && doc.deleted))
                    .ok_or_else(|| KvError::DocumentNotFound(id.into()))?;
                let body = serde_json::from_slice::<Value>(&doc.body).ok();
                let fields = commands
                    .iter()
                    .map(|command| lookup_field(doc, body.as_ref(), command))
                    .collect();
                Ok(KvResponse::new(
                    Cas::new(doc.cas),
                    ResponseBody::Fields {
                        fields,
                        deleted: doc.deleted,
                    },
                ))
            }
            KvOp::SubdocMutate { .. } => self.mutate(request, now, now_secs),
        }
    }

    /// Applies all commands to a copy of the document and stores it only if
    /// every command succeeded.
    fn mutate(&mut self, request: &KvRequest, now: Instant, now_secs: i64) -> Result<KvResponse> {
        let KvOp::SubdocMutate {
            doc_flags: flags,
            commands,
            expiry,
            preserve_expiry,
            cas: expected,
            ..
        } = &request.op
        else {
            return Err(KvError::Transport("not a subdocument mutation".to_string()));
        };
        let id = &request.identifier;
        let add = flags & doc_flags::ADD != 0;
        let mkdoc = flags & doc_flags::MKDOC != 0;
        let access_deleted = flags & doc_flags::ACCESS_DELETED != 0;
        let create_as_deleted = flags & doc_flags::CREATE_AS_DELETED != 0;

        let existing = self
            .documents
            .get(id)
            .filter(|doc| doc.is_live(now_secs) || (access_deleted && doc.deleted))
            .cloned();
        let created = existing.as_ref().is_none_or(|doc| doc.deleted && (add || mkdoc));
        let mut doc = match existing {
            Some(doc) if add && !doc.deleted => return Err(KvError::DocumentExists(id.into())),
            Some(doc) => {
                check_write(&doc, *expected, now, id)?;
                doc
            }
            None if add || mkdoc => StoredDocument::new(b"{}".to_vec(), JSON_COMMON_FLAGS, 0, 0),
            None => return Err(KvError::DocumentNotFound(id.into())),
        };

        let cas = self.next_cas();
        let mut body = if doc.body.is_empty() {
            Value::Object(Map::new())
        } else {
            serde_json::from_slice::<Value>(&doc.body)
                .map_err(|_| path_error(PathError::Mismatch, "", id))?
        };
        let mut delete_document = false;
        let mut fields = Vec::new();

        for command in commands {
            match command.kind {
                SubdocCommandKind::SetDoc => {
                    body = serde_json::from_slice(&command.fragment)
                        .map_err(|_| path_error(PathError::Invalid, "", id))?;
                    continue;
                }
                SubdocCommandKind::DeleteDoc => {
                    delete_document = true;
                    continue;
                }
                _ => {}
            }

            let segments = paths::parse(&command.path)
                .ok_or_else(|| path_error(PathError::Invalid, &command.path, id))?;
            let fragment = if command.expand_macro {
                expand_macro(&command.fragment, cas)
            } else {
                command.fragment.clone()
            };
            let target = if command.xattr {
                &mut doc.xattrs
            } else {
                &mut body
            };
            let returned = paths::apply(target, command.kind, &segments, command.create_path, &fragment)
                .map_err(|err| path_error(err, &command.path, id))?;
            if let Some(value) = returned {
                fields.push(SubdocField {
                    original_index: command.original_index,
                    path: command.path.clone(),
                    status: SubdocStatus::Success,
                    value: serde_json::to_vec(&value).unwrap_or_default(),
                });
            }
        }

        if delete_document {
            doc.body.clear();
            doc.deleted = true;
        } else {
            doc.body = serde_json::to_vec(&body).map_err(|err| KvError::encoding(err, id))?;
            if created {
                doc.deleted = create_as_deleted;
            }
        }
        if created || !*preserve_expiry {
            doc.expiry = absolute_expiry(*expiry, now_secs);
        }
        doc.cas = cas;
        doc.locked_until = None;

        let deleted = doc.deleted;
        self.documents.insert(id.clone(), doc);
        Ok(KvResponse::new(
            Cas::new(cas),
            ResponseBody::Fields { fields, deleted },
        ))
    }
}

/// In-process document store standing in for the cluster.
///
/// Every copy of a document (active and replicas) reads from the same store;
/// failures and delays can be injected per [`ReplicaTarget`]. Request
/// timeouts are enforced here, the way a real dispatcher would.
#[derive(Clone, Default)]
pub struct InMemoryDispatcher {
    state: Arc<Mutex<StoreState>>,
    faults: Arc<Mutex<HashMap<ReplicaTarget, KvError>>>,
    delays: Arc<Mutex<HashMap<ReplicaTarget, Duration>>>,
    recorded: Arc<Mutex<Vec<RecordedRequest>>>,
}

impl InMemoryDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every request addressed to `target` fail with `error`.
    pub async fn fail_target(&self, target: ReplicaTarget, error: KvError) {
        self.faults.lock().await.insert(target, error);
    }

    /// Holds every request addressed to `target` for `delay` before serving it.
    pub async fn delay_target(&self, target: ReplicaTarget, delay: Duration) {
        self.delays.lock().await.insert(target, delay);
    }

    pub async fn clear_faults(&self) {
        self.faults.lock().await.clear();
        self.delays.lock().await.clear();
    }

    pub async fn recorded(&self) -> Vec<RecordedRequest> {
        self.recorded.lock().await.clone()
    }

    pub async fn dispatch_count(&self) -> usize {
        self.recorded.lock().await.len()
    }

    async fn serve(&self, target: ReplicaTarget, request: &KvRequest) -> Result<KvResponse> {
        let delay = self.delays.lock().await.get(&target).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let fault = self.faults.lock().await.get(&target).cloned();
        if let Some(err) = fault {
            return Err(err);
        }
        self.state.lock().await.apply(request)
    }
}

#[async_trait]
impl Dispatcher for InMemoryDispatcher {
    async fn dispatch(&self, request: KvRequest) -> Result<KvResponse> {
        let target = match request.op {
            KvOp::ReplicaGet { target } => target,
            _ => ReplicaTarget::Active,
        };
        self.recorded.lock().await.push(RecordedRequest {
            name: request.name(),
            frame: request.frame(),
        });
        debug!(
            "dispatching {} for {} to {}",
            request.name(),
            request.identifier,
            target
        );

        match tokio::time::timeout(request.timeout, self.serve(target, &request)).await {
            Ok(result) => result,
            Err(_) => {
                debug!("{} for {} timed out after {:?}", request.name(), request.identifier, request.timeout);
                Err(KvError::Timeout((&request.identifier).into()))
            }
        }
    }
}
