mod abort;
mod backend;
mod simulator;

pub use abort::{AbortReason, AbortSignal};
pub use backend::{parse_run_result, AgentBackend, HttpBackend};
pub use simulator::SimulatorConfig;

use crate::error::{ClassifyContext, FailureCause};
use crate::model::{RunEvent, RunRequest, RunResult, RunStatus, RunStep};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::mpsc;

/// How runs are executed.
#[derive(Debug, Clone)]
pub enum Executor {
    /// Local state machine with configurable delays and fault injection.
    Simulated(SimulatorConfig),
    /// Single request/response call to the Backend Agent Service.
    Delegated(Arc<dyn AgentBackend>),
    /// Backend mode was requested but no endpoint is configured.
    Unconfigured,
}

impl Executor {
    pub fn classify_context(&self) -> ClassifyContext {
        match self {
            Executor::Delegated(backend) => ClassifyContext::with_backend(backend.base_reference()),
            Executor::Simulated(_) | Executor::Unconfigured => ClassifyContext::default(),
        }
    }

    pub fn describe(&self) -> &'static str {
        match self {
            Executor::Simulated(_) => "simulated",
            Executor::Delegated(_) => "backend",
            Executor::Unconfigured => "unconfigured",
        }
    }

    /// Drive one run to its outcome. Status events go to `sink`; the terminal
    /// outcome is left to the caller.
    pub(crate) async fn execute(
        &self,
        run_seq: u64,
        request: &RunRequest,
        signal: &AbortSignal,
        sink: &EventSink,
    ) -> Result<RunResult, FailureCause> {
        match self {
            Executor::Simulated(cfg) => simulator::run(cfg, run_seq, request, signal, sink).await,
            Executor::Delegated(backend) => {
                run_delegated(backend.as_ref(), run_seq, request, signal, sink).await
            }
            Executor::Unconfigured => Err(FailureCause::BackendNotConfigured),
        }
    }
}

async fn run_delegated(
    backend: &dyn AgentBackend,
    run_seq: u64,
    request: &RunRequest,
    signal: &AbortSignal,
    sink: &EventSink,
) -> Result<RunResult, FailureCause> {
    signal.checkpoint()?;
    sink.status(RunStatus::step(RunStep::Calling, 0));
    tracing::debug!(run_seq, backend = %backend.base_reference(), "dispatching run to backend");

    // Losing the race drops the in-flight request future, which tears down the transport.
    let outcome = tokio::select! {
        outcome = backend.run(request) => outcome,
        reason = signal.fired() => return Err(reason.into_cause()),
    };

    signal.checkpoint()?;
    let result = outcome?;
    sink.status(RunStatus::step(RunStep::Complete, 100));
    Ok(result)
}

struct SinkState {
    tx: Option<mpsc::UnboundedSender<RunEvent>>,
    last_progress: u8,
}

/// Ordered, closable delivery of one run's events to its consumer.
///
/// Once an outcome is delivered the sink is closed and every later emission is
/// dropped. Emission and closing are serialized, so at most one outcome is ever sent.
#[derive(Clone)]
pub(crate) struct EventSink {
    state: Arc<Mutex<SinkState>>,
}

impl EventSink {
    pub(crate) fn new(tx: mpsc::UnboundedSender<RunEvent>) -> Self {
        Self {
            state: Arc::new(Mutex::new(SinkState {
                tx: Some(tx),
                last_progress: 0,
            })),
        }
    }

    /// Emit a non-terminal status. Returns false when the sink is already closed.
    pub(crate) fn status(&self, status: RunStatus) -> bool {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(tx) = state.tx.as_ref() else {
            return false;
        };
        let progress = status.progress.max(state.last_progress);
        let delivered = tx
            .send(RunEvent::Status(RunStatus { progress, ..status }))
            .is_ok();
        state.last_progress = progress;
        delivered
    }

    pub(crate) fn complete(&self, result: RunResult) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(tx) = state.tx.take() {
            let _ = tx.send(RunEvent::Completed {
                result: Box::new(result),
            });
        }
    }

    /// Emit the terminal `error` status followed by the failure outcome, then close.
    pub(crate) fn fail(&self, error: crate::error::AgentError) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(tx) = state.tx.take() {
            let _ = tx.send(RunEvent::Status(RunStatus::failed(
                state.last_progress,
                error.clone(),
            )));
            let _ = tx.send(RunEvent::Failed { error });
        }
    }

    pub(crate) fn is_closed(&self) -> bool {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.tx.is_none()
    }
}
