//! Run lifecycle controller.
//!
//! Owns the single active run: pre-flight validation, supersession of the previous
//! run, spawning the executor, and classifying its outcome onto the run's event stream.

use crate::engine::{AbortSignal, EventSink, Executor};
use crate::error::{classify, AgentError, ClassifyContext, FailureCause};
use crate::model::{RunEvent, RunRequest, RunResult, RunStatus};
use futures::Stream;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Default ceiling for a single run.
pub const DEFAULT_RUN_TIMEOUT: Duration = Duration::from_secs(30);

/// Internal handle for the run currently owned by the controller.
struct ActiveRun {
    seq: u64,
    cancel: CancellationToken,
    supersede: CancellationToken,
    sink: EventSink,
    task: JoinHandle<()>,
}

/// Executes at most one run at a time; a new `start` supersedes the previous run.
pub struct RunController {
    executor: Arc<Executor>,
    timeout: Duration,
    ctx: ClassifyContext,
    next_seq: AtomicU64,
    active: Mutex<Option<ActiveRun>>,
}

impl RunController {
    pub fn new(executor: Executor, timeout: Duration) -> Self {
        let ctx = executor.classify_context();
        Self {
            executor: Arc::new(executor),
            timeout,
            ctx,
            next_seq: AtomicU64::new(1),
            active: Mutex::new(None),
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn executor(&self) -> &Executor {
        &self.executor
    }

    /// Submit a request. Must be called from within a Tokio runtime.
    ///
    /// Invalid requests settle immediately with `VALIDATION_ERROR` and emit no status
    /// events; they do not displace the active run.
    pub fn start(&self, request: RunRequest) -> RunHandle {
        let (tx, rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();

        if let Err(error) = request.validate() {
            tracing::debug!(kind = %error.kind, "rejected run request");
            let _ = tx.send(RunEvent::Failed { error });
            return RunHandle::new(0, rx, cancel);
        }
        let request = request.normalized();

        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        let supersede = CancellationToken::new();
        let sink = EventSink::new(tx);
        let signal = AbortSignal::new(cancel.clone(), supersede.clone(), self.timeout);

        let mut active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(prev) = active.take() {
            self.supersede(prev);
        }

        tracing::info!(
            run_seq = seq,
            executor = self.executor.describe(),
            output_format = %request.output_format,
            timeout_ms = self.timeout.as_millis() as u64,
            "starting run"
        );

        let executor = Arc::clone(&self.executor);
        let ctx = self.ctx.clone();
        let task_sink = sink.clone();
        let task = tokio::spawn(async move {
            let outcome = executor.execute(seq, &request, &signal, &task_sink).await;
            settle(seq, outcome, &ctx, &task_sink);
        });

        *active = Some(ActiveRun {
            seq,
            cancel: cancel.clone(),
            supersede,
            sink,
            task,
        });

        RunHandle::new(seq, rx, cancel)
    }

    /// Request cooperative termination of the active run, if any.
    pub fn cancel(&self) {
        let active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(run) = active.as_ref() {
            tracing::info!(run_seq = run.seq, "cancel requested");
            run.cancel.cancel();
        }
    }

    pub fn is_active(&self) -> bool {
        let active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
        active
            .as_ref()
            .is_some_and(|run| !run.task.is_finished() && !run.sink.is_closed())
    }

    fn supersede(&self, prev: ActiveRun) {
        if prev.sink.is_closed() {
            return;
        }
        tracing::info!(run_seq = prev.seq, "superseding active run");
        // Close the old stream first so nothing the old task emits later gets through.
        prev.sink.fail(classify(FailureCause::Superseded, &self.ctx));
        prev.supersede.cancel();
    }
}

impl Drop for RunController {
    fn drop(&mut self) {
        let active = self.active.get_mut().unwrap_or_else(PoisonError::into_inner);
        if let Some(run) = active.take() {
            // The consumer may outlive the controller; it still gets its one outcome.
            if !run.sink.is_closed() {
                tracing::info!(run_seq = run.seq, "controller dropped with a live run");
                run.sink.fail(classify(
                    FailureCause::Aborted {
                        cancel_requested: true,
                    },
                    &self.ctx,
                ));
            }
            run.supersede.cancel();
            // Dropping a JoinHandle does not stop the task; abort it explicitly.
            run.task.abort();
        }
    }
}

fn settle(seq: u64, outcome: Result<RunResult, FailureCause>, ctx: &ClassifyContext, sink: &EventSink) {
    match outcome {
        Ok(result) => {
            tracing::info!(run_seq = seq, run_id = %result.run_id, "run completed");
            sink.complete(result);
        }
        Err(cause) => {
            let error = classify(cause, ctx);
            tracing::info!(run_seq = seq, kind = %error.kind, "run failed: {}", error.message);
            sink.fail(error);
        }
    }
}

/// Consumer side of one run: an ordered event stream plus its cancellation token.
#[derive(Debug)]
pub struct RunHandle {
    seq: u64,
    events: UnboundedReceiver<RunEvent>,
    cancel: CancellationToken,
    finished: bool,
}

impl RunHandle {
    fn new(seq: u64, events: UnboundedReceiver<RunEvent>, cancel: CancellationToken) -> Self {
        Self {
            seq,
            events,
            cancel,
            finished: false,
        }
    }

    /// Controller-local sequence number; `0` for requests rejected before starting.
    pub fn seq(&self) -> u64 {
        self.seq
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Token that cancels this run, for signal handlers and other tasks.
    pub fn canceller(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Next event, or `None` once the outcome has been delivered.
    pub async fn next_event(&mut self) -> Option<RunEvent> {
        if self.finished {
            return None;
        }
        let event = self.events.recv().await;
        match &event {
            Some(ev) if ev.is_outcome() => self.finished = true,
            None => self.finished = true,
            _ => {}
        }
        event
    }

    pub fn into_stream(self) -> impl Stream<Item = RunEvent> {
        futures::stream::unfold(self, |mut handle| async move {
            handle.next_event().await.map(|ev| (ev, handle))
        })
    }

    /// Drive the stream to its outcome, handing each status to `on_status`.
    pub async fn finish<F>(mut self, mut on_status: F) -> Result<RunResult, AgentError>
    where
        F: FnMut(&RunStatus),
    {
        while let Some(event) = self.next_event().await {
            match event {
                RunEvent::Status(status) => on_status(&status),
                RunEvent::Completed { result } => return Ok(*result),
                RunEvent::Failed { error } => return Err(error),
            }
        }
        Err(classify(
            FailureCause::Other("run ended without an outcome".into()),
            &ClassifyContext::default(),
        ))
    }
}
