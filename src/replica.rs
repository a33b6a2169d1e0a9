//! Replica reads.
//!
//! Every copy of a document is read by its own spawned task. "Any" returns
//! the first success and walks away from the rest without cancelling them;
//! "all" hands back one independent future per copy.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::StreamExt;
use futures::stream::FuturesUnordered;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{Level, event};

use crate::codec::Transcoder;
use crate::collection::Collection;
use crate::core::{ErrorKind, KvError, Result};
use crate::options::{CommonOptions, GetAllReplicasOptions, GetAnyReplicaOptions};
use crate::request::{KvOp, KvRequest, ReplicaTarget};
use crate::result::GetReplicaResult;
use crate::tracer::{RequestSpan, span_names};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptState {
    Pending,
    Succeeded,
    Failed(ErrorKind),
    TimedOut,
}

impl AttemptState {
    pub fn of(result: &Result<GetReplicaResult>) -> Self {
        match result {
            Ok(_) => AttemptState::Succeeded,
            Err(err) if err.kind() == ErrorKind::Timeout => AttemptState::TimedOut,
            Err(err) => AttemptState::Failed(err.kind()),
        }
    }
}

/// Finished read from one copy.
#[derive(Debug)]
pub struct ReplicaOutcome {
    pub target: ReplicaTarget,
    pub result: Result<GetReplicaResult>,
}

impl ReplicaOutcome {
    pub fn state(&self) -> AttemptState {
        AttemptState::of(&self.result)
    }
}

/// In-flight read from one copy. Dropping it leaves the read running.
#[derive(Debug)]
pub struct ReplicaAttempt {
    target: ReplicaTarget,
    state: watch::Receiver<AttemptState>,
    handle: JoinHandle<Result<GetReplicaResult>>,
}

impl ReplicaAttempt {
    pub fn target(&self) -> ReplicaTarget {
        self.target
    }

    /// Current state without consuming the attempt.
    pub fn state(&self) -> AttemptState {
        *self.state.borrow()
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Future for ReplicaAttempt {
    type Output = ReplicaOutcome;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let target = self.target;
        Pin::new(&mut self.handle).poll(cx).map(|joined| ReplicaOutcome {
            target,
            result: joined.unwrap_or_else(|err| Err(KvError::from(err))),
        })
    }
}

impl Collection {
    /// Request for one copy: a plain get for the active, a replica read otherwise.
    pub fn replica_request(
        &self,
        key: &str,
        target: ReplicaTarget,
        common: &CommonOptions,
        parent: &RequestSpan,
    ) -> Result<KvRequest> {
        let id = self.document_id(key)?;
        let (name, op) = match target {
            ReplicaTarget::Active => (span_names::GET, KvOp::Get),
            ReplicaTarget::Replica(_) => (span_names::GET_REPLICA, KvOp::ReplicaGet { target }),
        };
        let span = self.environment().tracer.request_span(name, Some(parent));
        Ok(self.assemble(id, span, self.kv_timeout(common), common, None, op))
    }

    async fn spawn_replica_attempts(
        &self,
        key: &str,
        common: &CommonOptions,
        transcoder: Arc<dyn Transcoder>,
        parent: &RequestSpan,
    ) -> Result<Vec<ReplicaAttempt>> {
        let id = self.document_id(key)?;
        let config = self
            .topology()
            .bucket_config(id.bucket(), self.kv_timeout(common))
            .await?;

        let targets = std::iter::once(ReplicaTarget::Active)
            .chain((1..=config.num_replicas).map(ReplicaTarget::Replica))
            .collect::<Vec<_>>();

        let mut attempts = Vec::with_capacity(targets.len());
        for target in targets {
            let request = self.replica_request(key, target, common, parent)?;
            let dispatcher = Arc::clone(self.dispatcher());
            let tracer = Arc::clone(&self.environment().tracer);
            let transcoder = Arc::clone(&transcoder);
            let (state_tx, state) = watch::channel(AttemptState::Pending);
            let handle = tokio::spawn(async move {
                let span = request.span.clone();
                let result = dispatcher.dispatch(request).await.and_then(|response| {
                    GetReplicaResult::from_response(response, target, &*transcoder)
                });
                tracer.end_span(&span);
                // nobody may be watching any more
                let _ = state_tx.send(AttemptState::of(&result));
                result
            });
            attempts.push(ReplicaAttempt {
                target,
                state,
                handle,
            });
        }
        event!(
            Level::DEBUG,
            id = %id,
            attempts = attempts.len(),
            "replica reads dispatched"
        );
        Ok(attempts)
    }

    /// First successful read among the active and every replica.
    pub async fn get_any_replica(
        &self,
        key: &str,
        options: GetAnyReplicaOptions,
    ) -> Result<GetReplicaResult> {
        let common = &options.common;
        self.document_id(key)?;
        let parent = self.open_span(span_names::GET_ANY_REPLICA, common);
        let transcoder = self.resolved_transcoder(&options.transcoder);

        let attempts = self
            .spawn_replica_attempts(key, common, transcoder, &parent)
            .await
            .inspect_err(|_| self.environment().tracer.end_span(&parent))?;
        let total = attempts.len();

        let mut pending = attempts.into_iter().collect::<FuturesUnordered<_>>();
        let mut last_error = None;
        while let Some(outcome) = pending.next().await {
            match outcome.result {
                Ok(result) => {
                    self.environment().tracer.end_span(&parent);
                    return Ok(result);
                }
                Err(err) => {
                    event!(
                        Level::DEBUG,
                        copy = %outcome.target,
                        error = %err,
                        "replica attempt failed"
                    );
                    last_error = Some(err);
                }
            }
        }

        self.environment().tracer.end_span(&parent);
        let last = last_error.unwrap_or_else(|| {
            KvError::TopologyUnavailable("no copies of the document to read".to_string())
        });
        Err(KvError::NoReplicaSucceeded {
            attempts: total,
            last: Box::new(last),
        })
    }

    /// One independent read per copy, returned as soon as all are in flight.
    pub async fn get_all_replicas(
        &self,
        key: &str,
        options: GetAllReplicasOptions,
    ) -> Result<Vec<ReplicaAttempt>> {
        let common = &options.common;
        self.document_id(key)?;
        let parent = self.open_span(span_names::GET_ALL_REPLICAS, common);
        let transcoder = self.resolved_transcoder(&options.transcoder);

        let attempts = self
            .spawn_replica_attempts(key, common, transcoder, &parent)
            .await;
        self.environment().tracer.end_span(&parent);
        attempts
    }

    fn resolved_transcoder(&self, custom: &Option<Arc<dyn Transcoder>>) -> Arc<dyn Transcoder> {
        custom
            .clone()
            .unwrap_or_else(|| Arc::clone(&self.environment().transcoder))
    }
}
