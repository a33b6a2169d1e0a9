use std::time::{Duration, Instant};

use super::Collection;
use crate::codec::Content;
use crate::core::{
    Cas, DurabilityLevel, Expiry, Identifier, KvError, Result, RetryStrategy, StoreSemantics,
};
use crate::dispatch::{BucketCapability, TopologyMetadata};
use crate::durability::decide_kv_timeout;
use crate::options::{
    ClientContext, CommonOptions, ExistsOptions, GetAndLockOptions, GetAndTouchOptions, GetOptions,
    InsertOptions, LookupInOptions, MutateInOptions, RemoveOptions, ReplaceOptions, TouchOptions,
    UnlockOptions, UpsertOptions,
};
use crate::request::{KvOp, KvRequest};
use crate::subdoc::{
    self, LookupInSpec, MutateInSpec, SubdocMutateCommand, doc_flags, encode_mutate_specs,
    lookup_in_commands, projection_commands,
};
use crate::tracer::{RequestSpan, span_names};

/// A validated, encoded mutate-in waiting for optional bucket metadata.
///
/// Produced by [`Collection::prepare_mutate_in`]. When
/// [`PreparedMutateIn::needs_topology`] is true the caller must supply the
/// bucket configuration to [`Collection::finish_mutate_in`].
#[derive(Debug)]
pub struct PreparedMutateIn {
    identifier: Identifier,
    span: RequestSpan,
    timeout: Duration,
    common: PreparedCommon,
    commands: Vec<SubdocMutateCommand>,
    encode_latency: Duration,
    doc_flags: u8,
    expiry: u32,
    preserve_expiry: bool,
    cas: Cas,
    durability: Option<DurabilityLevel>,
}

#[derive(Debug)]
struct PreparedCommon {
    retry_strategy: Option<RetryStrategy>,
    client_context: Option<ClientContext>,
}

impl PreparedMutateIn {
    pub fn needs_topology(&self) -> bool {
        self.doc_flags & doc_flags::CREATE_AS_DELETED != 0
    }

    pub fn identifier(&self) -> &Identifier {
        &self.identifier
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl Collection {
    /// Plain get, or a subdocument lookup when projections or the expiry are requested.
    pub fn get_request(&self, key: &str, options: &GetOptions) -> Result<KvRequest> {
        let id = self.document_id(key)?;
        let common = &options.common;

        let (name, op) = if options.needs_subdoc() {
            let commands = projection_commands(&options.projections, options.with_expiry, &id)?;
            let op = KvOp::SubdocGet {
                doc_flags: 0,
                commands,
            };
            (span_names::LOOKUP_IN, op)
        } else {
            (span_names::GET, KvOp::Get)
        };

        let span = self.open_span(name, common);
        Ok(self.assemble(id, span, self.kv_timeout(common), common, None, op))
    }

    /// Lock time is passed through uncapped; the server enforces its own ceiling.
    pub fn get_and_lock_request(
        &self,
        key: &str,
        lock_time: Duration,
        options: &GetAndLockOptions,
    ) -> Result<KvRequest> {
        let id = self.document_id(key)?;
        let common = &options.common;
        let lock_time_secs = u32::try_from(lock_time.as_secs()).unwrap_or(u32::MAX);

        let span = self.open_span(span_names::GET_AND_LOCK, common);
        Ok(self.assemble(
            id,
            span,
            self.kv_timeout(common),
            common,
            None,
            KvOp::GetAndLock { lock_time_secs },
        ))
    }

    pub fn get_and_touch_request(
        &self,
        key: &str,
        expiry: Expiry,
        options: &GetAndTouchOptions,
    ) -> Result<KvRequest> {
        let id = self.document_id(key)?;
        let common = &options.common;
        let expiry = self.encode_expiry(expiry, &id)?;

        let span = self.open_span(span_names::GET_AND_TOUCH, common);
        Ok(self.assemble(
            id,
            span,
            self.kv_timeout(common),
            common,
            None,
            KvOp::GetAndTouch { expiry },
        ))
    }

    pub fn exists_request(&self, key: &str, options: &ExistsOptions) -> Result<KvRequest> {
        let id = self.document_id(key)?;
        let common = &options.common;
        let span = self.open_span(span_names::EXISTS, common);
        Ok(self.assemble(id, span, self.kv_timeout(common), common, None, KvOp::GetMeta))
    }

    pub fn insert_request(
        &self,
        key: &str,
        content: &Content,
        options: &InsertOptions,
    ) -> Result<KvRequest> {
        let id = self.document_id(key)?;
        let expiry = self.encode_expiry(options.expiry, &id)?;
        let timeout = decide_kv_timeout(options, &self.env.timeout_config);
        let common = &options.common;

        let span = self.open_span(span_names::INSERT, common);
        let transcoder = self.transcoder(&options.transcoder);
        let (encoded, latency) = self.encode_content(&id, &span, transcoder, content)?;

        let op = KvOp::Insert {
            content: encoded.bytes,
            flags: encoded.flags,
            expiry,
            durability: options.durability.level(),
        };
        Ok(self.assemble(id, span, timeout, common, Some(latency), op))
    }

    pub fn upsert_request(
        &self,
        key: &str,
        content: &Content,
        options: &UpsertOptions,
    ) -> Result<KvRequest> {
        let id = self.document_id(key)?;
        let expiry = self.encode_expiry(options.expiry, &id)?;
        let timeout = decide_kv_timeout(options, &self.env.timeout_config);
        let common = &options.common;

        let span = self.open_span(span_names::UPSERT, common);
        let transcoder = self.transcoder(&options.transcoder);
        let (encoded, latency) = self.encode_content(&id, &span, transcoder, content)?;

        let op = KvOp::Upsert {
            content: encoded.bytes,
            flags: encoded.flags,
            expiry,
            preserve_expiry: options.preserve_expiry,
            durability: options.durability.level(),
        };
        Ok(self.assemble(id, span, timeout, common, Some(latency), op))
    }

    pub fn replace_request(
        &self,
        key: &str,
        content: &Content,
        options: &ReplaceOptions,
    ) -> Result<KvRequest> {
        let id = self.document_id(key)?;
        let expiry = self.encode_expiry(options.expiry, &id)?;
        let timeout = decide_kv_timeout(options, &self.env.timeout_config);
        let common = &options.common;

        let span = self.open_span(span_names::REPLACE, common);
        let transcoder = self.transcoder(&options.transcoder);
        let (encoded, latency) = self.encode_content(&id, &span, transcoder, content)?;

        let op = KvOp::Replace {
            content: encoded.bytes,
            flags: encoded.flags,
            expiry,
            preserve_expiry: options.preserve_expiry,
            cas: options.cas,
            durability: options.durability.level(),
        };
        Ok(self.assemble(id, span, timeout, common, Some(latency), op))
    }

    pub fn remove_request(&self, key: &str, options: &RemoveOptions) -> Result<KvRequest> {
        let id = self.document_id(key)?;
        let timeout = decide_kv_timeout(options, &self.env.timeout_config);
        let common = &options.common;

        let span = self.open_span(span_names::REMOVE, common);
        let op = KvOp::Remove {
            cas: options.cas,
            durability: options.durability.level(),
        };
        Ok(self.assemble(id, span, timeout, common, None, op))
    }

    pub fn touch_request(&self, key: &str, expiry: Expiry, options: &TouchOptions) -> Result<KvRequest> {
        let id = self.document_id(key)?;
        let expiry = self.encode_expiry(expiry, &id)?;
        let common = &options.common;

        let span = self.open_span(span_names::TOUCH, common);
        Ok(self.assemble(
            id,
            span,
            self.kv_timeout(common),
            common,
            None,
            KvOp::Touch { expiry },
        ))
    }

    pub fn unlock_request(&self, key: &str, cas: Cas, options: &UnlockOptions) -> Result<KvRequest> {
        let id = self.document_id(key)?;
        if cas.is_none() {
            return Err(KvError::invalid_argument(
                "CAS must not be 0 when unlocking a document",
                &id,
            ));
        }
        let common = &options.common;

        let span = self.open_span(span_names::UNLOCK, common);
        Ok(self.assemble(
            id,
            span,
            self.kv_timeout(common),
            common,
            None,
            KvOp::Unlock { cas },
        ))
    }

    pub fn lookup_in_request(
        &self,
        key: &str,
        specs: &[LookupInSpec],
        options: &LookupInOptions,
    ) -> Result<KvRequest> {
        let id = self.document_id(key)?;
        let commands = lookup_in_commands(specs, &id)?;
        let common = &options.common;

        let flags = if options.access_deleted {
            doc_flags::ACCESS_DELETED
        } else {
            0
        };
        let span = self.open_span(span_names::LOOKUP_IN, common);
        Ok(self.assemble(
            id,
            span,
            self.kv_timeout(common),
            common,
            None,
            KvOp::SubdocGet {
                doc_flags: flags,
                commands,
            },
        ))
    }

    /// First stage of a mutate-in: validation, expiry and fragment encoding.
    pub fn prepare_mutate_in(
        &self,
        key: &str,
        specs: &[MutateInSpec],
        options: &MutateInOptions,
    ) -> Result<PreparedMutateIn> {
        let id = self.document_id(key)?;
        subdoc::check_command_count(specs.len(), &id)?;
        if options.create_as_deleted && options.store_semantics == StoreSemantics::Replace {
            return Err(KvError::invalid_argument(
                "create_as_deleted requires Insert or Upsert store semantics",
                &id,
            ));
        }
        if options.store_semantics == StoreSemantics::Insert && !options.cas.is_none() {
            return Err(KvError::invalid_argument(
                "CAS cannot be set together with Insert store semantics",
                &id,
            ));
        }
        let expiry = self.encode_expiry(options.expiry, &id)?;
        let timeout = decide_kv_timeout(options, &self.env.timeout_config);
        let common = &options.common;

        let span = self.open_span(span_names::MUTATE_IN, common);
        let serializer = options
            .serializer
            .as_deref()
            .unwrap_or(&*self.env.json_serializer);
        let encoding = self
            .env
            .tracer
            .request_span(span_names::REQUEST_ENCODING, Some(&span));
        let start = Instant::now();
        let encoded = encode_mutate_specs(specs, serializer, &id);
        let encode_latency = start.elapsed();
        self.env.tracer.end_span(&encoding);
        let commands = encoded.inspect_err(|_| self.env.tracer.end_span(&span))?;

        let mut flags = match options.store_semantics {
            StoreSemantics::Insert => doc_flags::ADD,
            StoreSemantics::Upsert => doc_flags::MKDOC,
            StoreSemantics::Replace => 0,
        };
        if options.access_deleted {
            flags |= doc_flags::ACCESS_DELETED;
        }
        if options.create_as_deleted {
            flags |= doc_flags::CREATE_AS_DELETED;
        }

        Ok(PreparedMutateIn {
            identifier: id,
            span,
            timeout,
            common: PreparedCommon {
                retry_strategy: common.retry_strategy,
                client_context: common.client_context.clone(),
            },
            commands,
            encode_latency,
            doc_flags: flags,
            expiry,
            preserve_expiry: options.preserve_expiry,
            cas: options.cas,
            durability: options.durability.level(),
        })
    }

    /// Second stage of a mutate-in: checks the bucket metadata the first
    /// stage asked for and produces the request.
    pub fn finish_mutate_in(
        &self,
        prepared: PreparedMutateIn,
        metadata: TopologyMetadata,
    ) -> Result<KvRequest> {
        if prepared.needs_topology() {
            let supported = match &metadata {
                TopologyMetadata::Loaded(config) => config.supports(BucketCapability::CreateAsDeleted),
                TopologyMetadata::NotRequired => false,
            };
            if !supported {
                self.env.tracer.end_span(&prepared.span);
                return Err(KvError::FeatureNotAvailable(format!(
                    "bucket '{}' does not support creating documents as deleted",
                    prepared.identifier.bucket()
                )));
            }
        }

        let common = CommonOptions {
            timeout: Some(prepared.timeout),
            retry_strategy: prepared.common.retry_strategy,
            parent_span: None,
            client_context: prepared.common.client_context,
        };
        let op = KvOp::SubdocMutate {
            doc_flags: prepared.doc_flags,
            commands: prepared.commands,
            expiry: prepared.expiry,
            preserve_expiry: prepared.preserve_expiry,
            cas: prepared.cas,
            durability: prepared.durability,
        };
        Ok(self.assemble(
            prepared.identifier,
            prepared.span,
            prepared.timeout,
            &common,
            Some(prepared.encode_latency),
            op,
        ))
    }

    /// Both mutate-in stages, awaiting bucket metadata only for tombstone creation.
    pub async fn mutate_in_request(
        &self,
        key: &str,
        specs: &[MutateInSpec],
        options: &MutateInOptions,
    ) -> Result<KvRequest> {
        let prepared = self.prepare_mutate_in(key, specs, options)?;
        let metadata = if prepared.needs_topology() {
            let config = self
                .topology()
                .bucket_config(prepared.identifier.bucket(), prepared.timeout)
                .await
                .inspect_err(|_| self.env.tracer.end_span(&prepared.span))?;
            TopologyMetadata::Loaded(config)
        } else {
            TopologyMetadata::NotRequired
        };
        self.finish_mutate_in(prepared, metadata)
    }

    fn encode_expiry(&self, expiry: Expiry, id: &Identifier) -> Result<u32> {
        expiry.encode(&*self.env.clock, &*self.env.event_sink, id)
    }
}
