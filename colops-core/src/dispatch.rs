//! Row-batch dispatch: header → evaluator → streamed response.

use std::pin::Pin;
use std::sync::Arc;

use colops_proto::{
    sse, CACHE_HEADER, CACHE_NO_STORE, COMMON_REQUEST_HEADER, FUNCTION_REQUEST_HEADER,
    SCRIPT_REQUEST_HEADER, TABLE_DESCRIPTION_HEADER,
};
use colops_registry::{EvalError, Evaluator, Registry, RegistryError};
use colops_script::{ScriptError, ScriptRequest};
use colops_types::{bundle, unbundle, ResponseMeta};
use futures_core::Stream;
use futures_util::StreamExt;
use prost::Message;
use thiserror::Error;
use tokio::sync::{mpsc, Semaphore};
use tokio_stream::wrappers::ReceiverStream;
use tonic::metadata::{MetadataMap, MetadataValue};
use tonic::{Response, Status};
use tracing::Span;
use uuid::Uuid;

pub type RowStream = Pin<Box<dyn Stream<Item = Result<sse::BundledRows, Status>> + Send + 'static>>;

/// Response batches buffered per invocation before the worker blocks.
const OUTBOUND_BUFFER: usize = 16;

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("missing request header '{0}'")]
    MissingHeader(&'static str),
    #[error("malformed request header '{key}': {reason}")]
    MalformedHeader { key: &'static str, reason: String },
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error(transparent)]
    Script(#[from] ScriptError),
    #[error(transparent)]
    Eval(#[from] EvalError),
    #[error("inbound stream failed: {0}")]
    Inbound(Status),
    #[error("worker pool is shut down")]
    PoolClosed,
}

impl From<DispatchError> for Status {
    fn from(e: DispatchError) -> Self {
        let message = e.to_string();
        match e {
            DispatchError::MissingHeader(_) | DispatchError::MalformedHeader { .. } => {
                Status::invalid_argument(message)
            }
            DispatchError::Registry(RegistryError::UnknownFunction(_)) => Status::not_found(message),
            DispatchError::Registry(_) => Status::internal(message),
            DispatchError::Script(ScriptError::Unsupported(_)) => Status::unimplemented(message),
            DispatchError::Script(_) => Status::invalid_argument(message),
            DispatchError::Eval(EvalError::Backend(_)) => Status::internal(message),
            DispatchError::Eval(_) => Status::invalid_argument(message),
            DispatchError::Inbound(status) => status,
            DispatchError::PoolClosed => Status::unavailable(message),
        }
    }
}

//
// Invocation state machine
//

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    Ok,
    Failed,
    /// The client went away before the response was fully sent.
    Cancelled,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    AwaitingHeader,
    HeaderResolved,
    Streaming,
    Completed(Outcome),
}

impl Phase {
    fn may_advance_to(self, next: Phase) -> bool {
        matches!(
            (self, next),
            (Phase::AwaitingHeader, Phase::HeaderResolved)
                | (Phase::AwaitingHeader, Phase::Completed(Outcome::Failed))
                | (Phase::HeaderResolved, Phase::Streaming)
                | (Phase::Streaming, Phase::Completed(_))
        )
    }
}

/// Progress of one call. Owned by the call; never shared.
#[derive(Debug)]
pub struct Invocation {
    phase: Phase,
    trail: Vec<Phase>,
    pub rows_in: u64,
    pub rows_out: u64,
}

impl Default for Invocation {
    fn default() -> Self {
        Self {
            phase: Phase::AwaitingHeader,
            trail: vec![Phase::AwaitingHeader],
            rows_in: 0,
            rows_out: 0,
        }
    }
}

impl Invocation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Every phase visited so far, in order.
    pub fn trail(&self) -> &[Phase] {
        &self.trail
    }

    fn advance(&mut self, next: Phase) {
        debug_assert!(
            self.phase.may_advance_to(next),
            "illegal transition {:?} -> {next:?}",
            self.phase
        );
        tracing::trace!(from = ?self.phase, to = ?next, "invocation phase");
        self.phase = next;
        self.trail.push(next);
    }
}

//
// Header handling
//

/// Decode a protobuf message carried in a binary metadata entry.
pub fn decode_header<M: Message + Default>(
    metadata: &MetadataMap,
    key: &'static str,
) -> Result<M, DispatchError> {
    let value = metadata
        .get_bin(key)
        .ok_or(DispatchError::MissingHeader(key))?;
    let bytes = value
        .to_bytes()
        .map_err(|e| DispatchError::MalformedHeader {
            key,
            reason: e.to_string(),
        })?;
    M::decode(bytes).map_err(|e| DispatchError::MalformedHeader {
        key,
        reason: e.to_string(),
    })
}

fn invocation_span(metadata: &MetadataMap, method: &'static str) -> Span {
    let span = tracing::info_span!(
        "invocation",
        method,
        request_id = %Uuid::new_v4(),
        function_id = tracing::field::Empty,
        app_id = tracing::field::Empty,
        user_id = tracing::field::Empty,
    );
    match decode_header::<sse::CommonRequestHeader>(metadata, COMMON_REQUEST_HEADER) {
        Ok(common) => {
            span.record("app_id", common.app_id.as_str());
            span.record("user_id", common.user_id.as_str());
        }
        Err(DispatchError::MissingHeader(_)) => {}
        Err(err) => tracing::warn!(%err, "ignoring common request header"),
    }
    span
}

fn apply_meta(metadata: &mut MetadataMap, meta: &ResponseMeta) {
    if meta.no_store {
        metadata.insert(CACHE_HEADER, MetadataValue::from_static(CACHE_NO_STORE));
    }
    if let Some(table) = &meta.table {
        metadata.insert_bin(
            TABLE_DESCRIPTION_HEADER,
            MetadataValue::from_bytes(&table.encode()),
        );
    }
}

//
// Streaming
//

/// Feed every inbound batch through `evaluator`, handing response batches to
/// `emit`. `emit` returns false once the receiving side is gone.
///
/// Row-wise evaluators answer each inbound batch with one response batch;
/// whole-stream evaluators answer once, after the last batch.
pub fn drive<I, F>(
    evaluator: &Evaluator,
    inbound: I,
    mut emit: F,
    invocation: &mut Invocation,
) -> Result<(), DispatchError>
where
    I: IntoIterator<Item = Result<sse::BundledRows, Status>>,
    F: FnMut(sse::BundledRows) -> bool,
{
    invocation.advance(Phase::Streaming);
    let result = stream_rows(evaluator, inbound, &mut emit, invocation);
    let outcome = match &result {
        Ok(true) => Outcome::Ok,
        Ok(false) => Outcome::Cancelled,
        Err(_) => Outcome::Failed,
    };
    invocation.advance(Phase::Completed(outcome));
    result.map(|_| ())
}

fn stream_rows<I, F>(
    evaluator: &Evaluator,
    inbound: I,
    emit: &mut F,
    invocation: &mut Invocation,
) -> Result<bool, DispatchError>
where
    I: IntoIterator<Item = Result<sse::BundledRows, Status>>,
    F: FnMut(sse::BundledRows) -> bool,
{
    match evaluator {
        Evaluator::RowWise(eval) => {
            for batch in inbound {
                let rows = unbundle(batch.map_err(DispatchError::Inbound)?);
                invocation.rows_in += rows.len() as u64;
                let mut out = Vec::with_capacity(rows.len());
                for row in &rows {
                    out.extend(eval.eval_row(row)?);
                }
                invocation.rows_out += out.len() as u64;
                if !emit(bundle(out)) {
                    return Ok(false);
                }
            }
        }
        Evaluator::WholeStream(eval) => {
            let mut state = eval.start();
            for batch in inbound {
                for row in unbundle(batch.map_err(DispatchError::Inbound)?) {
                    invocation.rows_in += 1;
                    state.update(&row)?;
                }
            }
            let row = state.finish()?;
            invocation.rows_out += 1;
            if !emit(bundle(vec![row])) {
                return Ok(false);
            }
        }
    }
    Ok(true)
}

//
// Dispatcher
//

/// Routes invocations to evaluators on a bounded pool of blocking workers.
pub struct Dispatcher {
    registry: Arc<Registry>,
    workers: Arc<Semaphore>,
}

impl Dispatcher {
    pub fn new(registry: Arc<Registry>, workers: usize) -> Self {
        Self {
            registry,
            workers: Arc::new(Semaphore::new(workers.max(1))),
        }
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// `ExecuteFunction`: the function id comes from the function request
    /// header and is resolved before any row is read.
    pub async fn execute_function<S>(
        &self,
        metadata: &MetadataMap,
        inbound: S,
    ) -> Result<Response<RowStream>, DispatchError>
    where
        S: Stream<Item = Result<sse::BundledRows, Status>> + Send + Unpin + 'static,
    {
        let span = invocation_span(metadata, "ExecuteFunction");
        let mut invocation = Invocation::new();
        let resolved = decode_header::<sse::FunctionRequestHeader>(metadata, FUNCTION_REQUEST_HEADER)
            .and_then(|header| {
                span.record("function_id", header.function_id);
                Ok(self.registry.resolve(header.function_id)?)
            });
        let evaluator = match resolved {
            Ok(evaluator) => evaluator,
            Err(err) => {
                invocation.advance(Phase::Completed(Outcome::Failed));
                span.in_scope(|| tracing::warn!(%err, "invocation rejected"));
                return Err(err);
            }
        };
        invocation.advance(Phase::HeaderResolved);
        self.start(evaluator, inbound, invocation, span).await
    }

    /// `EvaluateScript`: the script and its signature come from the script
    /// request header.
    pub async fn evaluate_script<S>(
        &self,
        metadata: &MetadataMap,
        inbound: S,
    ) -> Result<Response<RowStream>, DispatchError>
    where
        S: Stream<Item = Result<sse::BundledRows, Status>> + Send + Unpin + 'static,
    {
        let span = invocation_span(metadata, "EvaluateScript");
        let mut invocation = Invocation::new();
        let compiled = decode_header::<sse::ScriptRequestHeader>(metadata, SCRIPT_REQUEST_HEADER)
            .and_then(|header| Ok(ScriptRequest::from_header(&header)?));
        let script = match compiled {
            Ok(script) => script,
            Err(err) => {
                invocation.advance(Phase::Completed(Outcome::Failed));
                span.in_scope(|| tracing::warn!(%err, "script rejected"));
                return Err(err);
            }
        };
        invocation.advance(Phase::HeaderResolved);
        self.start(script.into_evaluator(), inbound, invocation, span)
            .await
    }

    /// Wait for a free worker, then consume the inbound stream on it.
    /// Response metadata is attached before the first row is produced.
    async fn start<S>(
        &self,
        evaluator: Evaluator,
        mut inbound: S,
        mut invocation: Invocation,
        span: Span,
    ) -> Result<Response<RowStream>, DispatchError>
    where
        S: Stream<Item = Result<sse::BundledRows, Status>> + Send + Unpin + 'static,
    {
        let permit = Arc::clone(&self.workers)
            .acquire_owned()
            .await
            .map_err(|_| DispatchError::PoolClosed)?;
        let meta = evaluator.response_meta();
        let (tx, rx) = mpsc::channel(OUTBOUND_BUFFER);
        let failed = tx.clone();
        let handle = tokio::runtime::Handle::current();

        let worker = tokio::task::spawn_blocking(move || {
            let _permit = permit;
            let _entered = span.enter();
            let batches = std::iter::from_fn(|| handle.block_on(inbound.next()));
            let result = drive(
                &evaluator,
                batches,
                |out| tx.blocking_send(Ok(out)).is_ok(),
                &mut invocation,
            );
            match result {
                Ok(()) => tracing::info!(
                    rows_in = invocation.rows_in,
                    rows_out = invocation.rows_out,
                    outcome = ?invocation.phase(),
                    "invocation finished"
                ),
                Err(err) => {
                    tracing::warn!(%err, rows_in = invocation.rows_in, "invocation failed");
                    let _ = tx.blocking_send(Err(err.into()));
                }
            }
        });
        tokio::spawn(async move {
            if let Err(err) = worker.await {
                tracing::error!(%err, "invocation worker panicked");
                let _ = failed
                    .send(Err(Status::internal("function evaluation aborted")))
                    .await;
            }
        });

        let stream: RowStream = Box::pin(ReceiverStream::new(rx));
        let mut response = Response::new(stream);
        apply_meta(response.metadata_mut(), &meta);
        Ok(response)
    }
}
