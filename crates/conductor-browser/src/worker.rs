//! The executor worker thread.
//!
//! Executions run browser actions that suspend on the plane, while the
//! orchestrator loop must keep pumping the worker's terminal. The worker
//! thread owns the plane and a current-thread runtime; jobs arrive over a
//! std mpsc channel and outcomes return over another, keyed by request id.

use std::sync::mpsc::{Receiver, Sender};

use tracing::{info, warn};
use uuid::Uuid;

use conductor_types::{AccessRequest, ActionResult, Authorization, BrowserConfig};

use crate::executor::{compose_actions, run_actions};
use crate::plane::BrowserPlane;

/// One approved request to execute.
pub struct ExecuteJob {
    pub request: AccessRequest,
    pub authorization: Authorization,
}

/// The per-step results of one finished job.
pub struct ExecutionOutcome {
    pub request_id: Uuid,
    pub results: Vec<ActionResult>,
}

/// Handle held by the orchestrator.
pub struct ExecutorHandle {
    tx: Option<Sender<ExecuteJob>>,
    thread: Option<std::thread::JoinHandle<()>>,
}

impl ExecutorHandle {
    /// Queue a job. Jobs run one at a time, in order.
    pub fn execute(&self, request: AccessRequest, authorization: Authorization) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(ExecuteJob {
                request,
                authorization,
            });
        }
    }

    /// Close the queue and wait for in-flight jobs to finish.
    pub fn stop(mut self) {
        self.tx.take();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

/// Spawn the executor worker.
///
/// `outcome_tx` receives one [`ExecutionOutcome`] per job, in completion
/// order (which equals submission order; execution is serialized).
pub fn spawn_executor(
    plane: Box<dyn BrowserPlane>,
    config: BrowserConfig,
    outcome_tx: Sender<ExecutionOutcome>,
) -> ExecutorHandle {
    let (tx, rx) = std::sync::mpsc::channel();
    let thread = std::thread::Builder::new()
        .name("conductor-executor".into())
        .spawn(move || run(plane, config, rx, outcome_tx))
        .expect("failed to spawn executor thread");

    ExecutorHandle {
        tx: Some(tx),
        thread: Some(thread),
    }
}

fn run(
    plane: Box<dyn BrowserPlane>,
    config: BrowserConfig,
    job_rx: Receiver<ExecuteJob>,
    outcome_tx: Sender<ExecutionOutcome>,
) {
    let rt = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            warn!("failed to create executor runtime: {e}");
            return;
        }
    };

    while let Ok(job) = job_rx.recv() {
        let actions = compose_actions(&job.request, &job.authorization, config.capture_screenshots);
        info!(
            id = %job.request.id,
            steps = actions.len(),
            "executing approved request"
        );
        let results = rt.block_on(run_actions(plane.as_ref(), &config, &actions));
        if outcome_tx
            .send(ExecutionOutcome {
                request_id: job.request.id,
                results,
            })
            .is_err()
        {
            break;
        }
    }
}
