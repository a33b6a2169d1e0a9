use std::time::Duration;

use tracing::{Instrument, Level, event, info_span};

use super::Collection;
use crate::codec::Content;
use crate::core::{Cas, Expiry, KvError, Result};
use crate::options::{
    ExistsOptions, GetAndLockOptions, GetAndTouchOptions, GetOptions, InsertOptions,
    LookupInOptions, MutateInOptions, RemoveOptions, ReplaceOptions, TouchOptions, UnlockOptions,
    UpsertOptions,
};
use crate::request::{KvOp, KvRequest};
use crate::result::{
    ExistsResult, GetResult, KvResponse, LookupInResult, MutateInResult, MutationResult,
};
use crate::subdoc::{LookupInSpec, MutateInSpec};

impl Collection {
    pub(crate) async fn dispatch(&self, request: KvRequest) -> Result<KvResponse> {
        let span = request.span.clone();
        let trace = info_span!("kv_dispatch", op = request.name(), id = %request.identifier);
        let result = self.dispatcher().dispatch(request).instrument(trace).await;
        self.env.tracer.end_span(&span);
        if let Err(err) = &result {
            event!(Level::DEBUG, op = span.name(), error = %err, "kv operation failed");
        }
        result
    }

    pub async fn get(&self, key: &str, options: GetOptions) -> Result<GetResult> {
        let request = self.get_request(key, &options)?;
        let projected = matches!(request.op, KvOp::SubdocGet { .. });
        let response = self.dispatch(request).await?;

        let transcoder = self.transcoder(&options.transcoder);
        if projected {
            GetResult::from_projection(
                response,
                &options.projections,
                transcoder,
                &*self.env.json_serializer,
            )
        } else {
            GetResult::from_document(response, transcoder)
        }
    }

    pub async fn get_and_lock(
        &self,
        key: &str,
        lock_time: Duration,
        options: GetAndLockOptions,
    ) -> Result<GetResult> {
        let request = self.get_and_lock_request(key, lock_time, &options)?;
        let response = self.dispatch(request).await?;
        GetResult::from_document(response, self.transcoder(&options.transcoder))
    }

    pub async fn get_and_touch(
        &self,
        key: &str,
        expiry: Expiry,
        options: GetAndTouchOptions,
    ) -> Result<GetResult> {
        let request = self.get_and_touch_request(key, expiry, &options)?;
        let response = self.dispatch(request).await?;
        GetResult::from_document(response, self.transcoder(&options.transcoder))
    }

    /// A missing document is a successful "does not exist", not an error.
    pub async fn exists(&self, key: &str, options: ExistsOptions) -> Result<ExistsResult> {
        let request = self.exists_request(key, &options)?;
        match self.dispatch(request).await {
            Ok(response) => ExistsResult::from_response(response),
            Err(KvError::DocumentNotFound(_)) => Ok(ExistsResult::missing()),
            Err(err) => Err(err),
        }
    }

    pub async fn insert(
        &self,
        key: &str,
        content: impl Into<Content>,
        options: InsertOptions,
    ) -> Result<MutationResult> {
        let request = self.insert_request(key, &content.into(), &options)?;
        let response = self.dispatch(request).await?;
        Ok(MutationResult::from_response(response))
    }

    pub async fn upsert(
        &self,
        key: &str,
        content: impl Into<Content>,
        options: UpsertOptions,
    ) -> Result<MutationResult> {
        let request = self.upsert_request(key, &content.into(), &options)?;
        let response = self.dispatch(request).await?;
        Ok(MutationResult::from_response(response))
    }

    pub async fn replace(
        &self,
        key: &str,
        content: impl Into<Content>,
        options: ReplaceOptions,
    ) -> Result<MutationResult> {
        let request = self.replace_request(key, &content.into(), &options)?;
        let response = self.dispatch(request).await?;
        Ok(MutationResult::from_response(response))
    }

    pub async fn remove(&self, key: &str, options: RemoveOptions) -> Result<MutationResult> {
        let request = self.remove_request(key, &options)?;
        let response = self.dispatch(request).await?;
        Ok(MutationResult::from_response(response))
    }

    pub async fn touch(&self, key: &str, expiry: Expiry, options: TouchOptions) -> Result<MutationResult> {
        let request = self.touch_request(key, expiry, &options)?;
        let response = self.dispatch(request).await?;
        Ok(MutationResult::from_response(response))
    }

    pub async fn unlock(&self, key: &str, cas: Cas, options: UnlockOptions) -> Result<()> {
        let request = self.unlock_request(key, cas, &options)?;
        self.dispatch(request).await.map(|_| ())
    }

    pub async fn lookup_in(
        &self,
        key: &str,
        specs: &[LookupInSpec],
        options: LookupInOptions,
    ) -> Result<LookupInResult> {
        let request = self.lookup_in_request(key, specs, &options)?;
        let response = self.dispatch(request).await?;
        let serializer = self.json_serializer(&options.serializer);
        LookupInResult::from_response(response, specs.len(), serializer)
    }

    pub async fn mutate_in(
        &self,
        key: &str,
        specs: &[MutateInSpec],
        options: MutateInOptions,
    ) -> Result<MutateInResult> {
        let request = self.mutate_in_request(key, specs, &options).await?;
        let response = self.dispatch(request).await?;
        let serializer = self.json_serializer(&options.serializer);
        MutateInResult::from_response(response, specs.len(), serializer)
    }
}
