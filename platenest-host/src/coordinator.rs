//! Job lifecycle coordinator
//!
//! Ties the descriptor model, the engine, and the update channel together.
//! The coordinator keeps a registry keyed by job id: each entry owns the
//! forwarder task that holds the channel's receive endpoint for exactly the
//! span [submit, terminal event observed], so the delivery path cannot be
//! torn down while the job is outstanding. Entries persist after the
//! terminal event for duplicate-id rejection across the process lifetime.
//!
//! Completion tracking here is the sole authority for process exit: a host
//! calls [`Coordinator::wait_all`] instead of keeping itself alive with a
//! timer.

use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use platenest_core::{JobDescriptor, JobId, UpdateEvent, ValidationError, wire};
use platenest_engine::{ChannelEvent, EngineError, SolvingEngine, update_channel};

use crate::observer::UpdateObserver;

/// Errors surfaced by coordinator operations
#[derive(Debug, Error)]
pub enum HostError {
    /// The descriptor failed validation before submission
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// The engine rejected the operation
    #[error(transparent)]
    Engine(#[from] EngineError),

    /// The update stream ended before a terminal event was observed
    #[error("update channel closed before the job reached a terminal state")]
    ChannelClosed,
}

/// Registry entry for one issued job
struct JobEntry {
    terminal: watch::Receiver<Option<UpdateEvent>>,
    /// Forwarder task; owns the channel's receive endpoint until terminal
    #[allow(dead_code)]
    forwarder: JoinHandle<()>,
}

/// Handle for one submitted job
///
/// Cheap to clone; observe completion by polling [`Self::is_complete`] or
/// awaiting [`Self::await_terminal`].
#[derive(Clone, Debug)]
pub struct JobHandle {
    job_id: JobId,
    terminal: watch::Receiver<Option<UpdateEvent>>,
}

impl JobHandle {
    /// The job this handle tracks
    pub fn job_id(&self) -> &JobId {
        &self.job_id
    }

    /// Whether the terminal event has been observed
    pub fn is_complete(&self) -> bool {
        self.terminal.borrow().is_some()
    }

    /// Waits for and returns the job's terminal event
    pub async fn await_terminal(&self) -> Result<UpdateEvent, HostError> {
        let mut rx = self.terminal.clone();
        let observed = rx
            .wait_for(|event| event.is_some())
            .await
            .map_err(|_| HostError::ChannelClosed)?;
        Ok(observed.clone().expect("guarded by wait_for"))
    }
}

/// Issues jobs to a solving engine and tracks their lifecycles
pub struct Coordinator {
    engine: Arc<dyn SolvingEngine>,
    jobs: Mutex<HashMap<JobId, JobEntry>>,
}

impl Coordinator {
    /// Creates a coordinator over an initialized engine
    pub fn new(engine: Arc<dyn SolvingEngine>) -> Self {
        Self {
            engine,
            jobs: Mutex::new(HashMap::new()),
        }
    }

    /// Validates and submits one job.
    ///
    /// Synchronous failures (validation, duplicate id, engine rejection)
    /// come back as errors with zero events emitted; once this returns a
    /// handle, every further outcome arrives through the observer and the
    /// handle's terminal event.
    pub async fn run_job(
        &self,
        descriptor: JobDescriptor,
        observer: Arc<dyn UpdateObserver>,
    ) -> Result<JobHandle, HostError> {
        descriptor.validate()?;
        let job_id = descriptor.job_id.clone();

        let mut jobs = self.jobs.lock().await;
        if jobs.contains_key(&job_id) {
            return Err(ValidationError::DuplicateJobId(job_id).into());
        }

        let (sink, mut stream) = update_channel();
        let payload = wire::encode_descriptor(&descriptor);
        self.engine.submit(&payload, sink).await?;

        let (tx, rx) = watch::channel(None);
        let forwarder = {
            let job_id = job_id.clone();
            tokio::spawn(async move {
                while let Some(event) = stream.recv().await {
                    match event {
                        ChannelEvent::Update(update) => {
                            observer.on_update(&update);
                            if update.is_terminal() {
                                debug!(%job_id, status = ?update.status, "Terminal event observed");
                                let _ = tx.send(Some(update));
                                return;
                            }
                        }
                        ChannelEvent::Malformed(error) => {
                            warn!(%job_id, %error, "Malformed update on channel");
                            observer.on_malformed(&error);
                        }
                    }
                }
                // Stream ended without a terminal event; dropping `tx`
                // resolves awaiting handles with ChannelClosed.
                warn!(%job_id, "Update stream ended without a terminal event");
            })
        };

        jobs.insert(
            job_id.clone(),
            JobEntry {
                terminal: rx.clone(),
                forwarder,
            },
        );

        Ok(JobHandle {
            job_id,
            terminal: rx,
        })
    }

    /// Requests best-effort cancellation of a running job
    pub async fn cancel(&self, job_id: &JobId) -> Result<(), HostError> {
        self.engine.cancel(job_id).await?;
        Ok(())
    }

    /// Whether a known job has reached its terminal event.
    ///
    /// Returns `None` for ids this coordinator never issued.
    pub async fn is_complete(&self, job_id: &JobId) -> Option<bool> {
        let jobs = self.jobs.lock().await;
        jobs.get(job_id).map(|entry| entry.terminal.borrow().is_some())
    }

    /// Resolves once every issued job has reached a terminal event.
    ///
    /// This is the exit authority for a hosting process: do not terminate
    /// while this is pending. Jobs submitted while waiting are awaited too.
    pub async fn wait_all(&self) -> Result<(), HostError> {
        loop {
            let pending: Vec<watch::Receiver<Option<UpdateEvent>>> = {
                let jobs = self.jobs.lock().await;
                jobs.values()
                    .filter(|entry| entry.terminal.borrow().is_none())
                    .map(|entry| entry.terminal.clone())
                    .collect()
            };
            if pending.is_empty() {
                return Ok(());
            }
            for mut rx in pending {
                rx.wait_for(|event| event.is_some())
                    .await
                    .map_err(|_| HostError::ChannelClosed)?;
            }
        }
    }
}
