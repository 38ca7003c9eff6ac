// SPDX-License-Identifier: MIT OR Apache-2.0
//! Background evaluation.
//!
//! An [`Evaluator`] runs graph evaluation on a worker thread and reports
//! back over a channel. Starting a new run cancels the previous one: the old
//! worker stops at the next node and its events are suppressed, apart from
//! the final [`EvaluationEvent::Done`].

use crate::evaluation::{EvaluationContext, EvaluationError};
use crate::graph::Graph;
use crate::node::{NodeId, Outputs};
use parking_lot::{Mutex, RwLock};
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Event reported by an evaluation run
#[derive(Debug)]
pub enum EvaluationEvent {
    /// A node was computed
    Progress {
        /// The computed node
        node: NodeId,
        /// Nodes computed so far in this run
        completed: usize,
        /// Upper bound on the number of nodes the run computes
        total: usize,
    },
    /// The run succeeded with the values of the output node's inputs
    Evaluated(Outputs),
    /// The run failed
    Errored(EvaluationError),
    /// The run is over. Always sent, exactly once, as the last event.
    Done,
}

/// Runs evaluations of a shared graph on a worker thread
#[derive(Debug)]
pub struct Evaluator {
    graph: Arc<RwLock<Graph>>,
    active: Mutex<Option<Arc<AtomicBool>>>,
    run_lock: Arc<Mutex<()>>,
    next_run: AtomicU64,
}

impl Evaluator {
    /// Create an evaluator for a shared graph
    pub fn new(graph: Arc<RwLock<Graph>>) -> Self {
        Self {
            graph,
            active: Mutex::new(None),
            run_lock: Arc::new(Mutex::new(())),
            next_run: AtomicU64::new(1),
        }
    }

    /// The evaluated graph. Edits take the write lock and wait for a running evaluation.
    pub fn graph(&self) -> &Arc<RwLock<Graph>> {
        &self.graph
    }

    /// Start evaluating, cancelling any run still in flight
    pub fn evaluate(&self) -> RunHandle {
        let cancel = Arc::new(AtomicBool::new(false));
        if let Some(previous) = self.active.lock().replace(Arc::clone(&cancel)) {
            previous.store(true, Ordering::SeqCst);
        }
        let id = self.next_run.fetch_add(1, Ordering::SeqCst);

        // Nodes computed: everything the output node depends on, but not the output node itself
        let total = self
            .graph
            .read()
            .reachable_subgraph()
            .map(|nodes| nodes.len().saturating_sub(1))
            .unwrap_or(0);

        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let graph = Arc::clone(&self.graph);
        let run_lock = Arc::clone(&self.run_lock);
        let worker_cancel = Arc::clone(&cancel);

        // Spawn the evaluation worker
        std::thread::spawn(move || {
            evaluation_worker(id, total, graph, run_lock, worker_cancel, event_tx);
        });

        RunHandle {
            id,
            total,
            cancel,
            events: event_rx,
        }
    }

    /// Cancel the run in flight, if any
    pub fn cancel(&self) {
        if let Some(active) = self.active.lock().take() {
            active.store(true, Ordering::SeqCst);
        }
    }
}

/// Worker thread body for one run
fn evaluation_worker(
    id: u64,
    total: usize,
    graph: Arc<RwLock<Graph>>,
    run_lock: Arc<Mutex<()>>,
    cancel: Arc<AtomicBool>,
    events: mpsc::UnboundedSender<EvaluationEvent>,
) {
    let _serial = run_lock.lock();
    if cancel.load(Ordering::SeqCst) {
        tracing::debug!("Evaluation run {id} cancelled before it started");
        let _ = events.send(EvaluationEvent::Done);
        return;
    }

    tracing::debug!("Evaluation run {id} started");
    let result = {
        let graph = graph.read();
        let mut completed = 0;
        let progress = |node| {
            completed += 1;
            if !cancel.load(Ordering::SeqCst) {
                let _ = events.send(EvaluationEvent::Progress {
                    node,
                    completed,
                    total,
                });
            }
        };
        std::panic::catch_unwind(AssertUnwindSafe(|| {
            EvaluationContext::new(&graph)
                .with_cancel(&cancel)
                .with_progress(progress)
                .run()
        }))
        .unwrap_or_else(|payload| Err(EvaluationError::Panicked(panic_message(payload.as_ref()))))
    };

    if cancel.load(Ordering::SeqCst) {
        tracing::debug!("Evaluation run {id} superseded");
    } else {
        match result {
            Ok(outputs) => {
                tracing::debug!("Evaluation run {id} finished");
                let _ = events.send(EvaluationEvent::Evaluated(outputs));
            }
            Err(e) => {
                tracing::debug!("Evaluation run {id} failed: {e}");
                let _ = events.send(EvaluationEvent::Errored(e));
            }
        }
    }
    let _ = events.send(EvaluationEvent::Done);
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Handle to one evaluation run
#[derive(Debug)]
pub struct RunHandle {
    id: u64,
    total: usize,
    cancel: Arc<AtomicBool>,
    events: mpsc::UnboundedReceiver<EvaluationEvent>,
}

impl RunHandle {
    /// Run number, increasing per evaluator
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Upper bound on the number of nodes this run computes
    pub fn total(&self) -> usize {
        self.total
    }

    /// Whether the run was cancelled or superseded
    pub fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }

    /// Cancel this run
    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::SeqCst);
    }

    fn filter(&self, event: EvaluationEvent) -> Option<EvaluationEvent> {
        match event {
            EvaluationEvent::Done => Some(event),
            _ if self.is_cancelled() => None,
            _ => Some(event),
        }
    }

    /// Next event; `None` once `Done` has been received
    pub async fn next_event(&mut self) -> Option<EvaluationEvent> {
        loop {
            let event = self.events.recv().await?;
            if let Some(event) = self.filter(event) {
                return Some(event);
            }
        }
    }

    /// Next event, blocking the current thread.
    ///
    /// Must not be called from within an async runtime.
    pub fn blocking_next_event(&mut self) -> Option<EvaluationEvent> {
        loop {
            let event = self.events.blocking_recv()?;
            if let Some(event) = self.filter(event) {
                return Some(event);
            }
        }
    }

    /// Wait for the run to finish and return its result
    pub async fn outcome(mut self) -> Result<Outputs, EvaluationError> {
        let mut outcome = Err(EvaluationError::Cancelled);
        while let Some(event) = self.next_event().await {
            if let Some(done) = Self::record(event, &mut outcome) {
                return done;
            }
        }
        outcome
    }

    /// Wait for the run to finish, blocking the current thread
    pub fn blocking_outcome(mut self) -> Result<Outputs, EvaluationError> {
        let mut outcome = Err(EvaluationError::Cancelled);
        while let Some(event) = self.blocking_next_event() {
            if let Some(done) = Self::record(event, &mut outcome) {
                return done;
            }
        }
        outcome
    }

    fn record(
        event: EvaluationEvent,
        outcome: &mut Result<Outputs, EvaluationError>,
    ) -> Option<Result<Outputs, EvaluationError>> {
        match event {
            EvaluationEvent::Evaluated(outputs) => *outcome = Ok(outputs),
            EvaluationEvent::Errored(e) => *outcome = Err(e),
            EvaluationEvent::Progress { .. } => {}
            EvaluationEvent::Done => {
                return Some(std::mem::replace(outcome, Err(EvaluationError::Cancelled)));
            }
        }
        None
    }
}
