//! Solving engine
//!
//! [`SolvingEngine`] is the submission contract: hand over a serialized,
//! validated descriptor together with the send half of an update channel,
//! get control back immediately, and observe everything else through the
//! channel. [`NestEngine`] is the in-process implementation: each accepted
//! job runs on its own tokio task under a parallelism bound, racing its
//! solver against the configured deadline and a cancellation token.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::{Mutex, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use platenest_core::{
    JobDescriptor, JobId, NestingSolution, UpdateEvent, ValidationError,
    wire::{self, WireError},
};

use crate::channel::UpdateSink;
use crate::config::EngineConfig;
use crate::solver::{PlacementSolver, ShelfSolver, SolveContext, SolveError};

/// Errors surfaced synchronously at the engine boundary
///
/// Everything that happens after a submission is accepted travels through
/// the update channel instead.
#[derive(Debug, Error)]
pub enum EngineError {
    /// `initialize` was called a second time
    #[error("engine is already initialized")]
    AlreadyInitialized,

    /// A job was submitted before `initialize`
    #[error("engine is not initialized")]
    NotInitialized,

    /// The submitted payload is not a valid descriptor encoding
    #[error("malformed submission payload: {0}")]
    Malformed(#[source] serde_json::Error),

    /// The payload decoded but violates a descriptor invariant
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// `cancel` addressed a job that is unknown or already terminal
    #[error("no running job with id {0}")]
    NotFound(JobId),
}

impl From<WireError> for EngineError {
    fn from(err: WireError) -> Self {
        match err {
            WireError::Malformed(source) => Self::Malformed(source),
            WireError::Validation(source) => Self::Validation(source),
        }
    }
}

/// Contract for submitting jobs to an opaque, independently-executing solver
///
/// `submit` never blocks on solving: it validates, registers, spawns, and
/// returns. Exactly one terminal event per accepted job arrives on the
/// sink, after which the engine sends nothing further for that id.
#[async_trait]
pub trait SolvingEngine: Send + Sync {
    /// Accepts a serialized job descriptor and the send half of its update
    /// channel. Fire and forget: all results arrive through the sink.
    async fn submit(&self, payload: &[u8], sink: UpdateSink) -> Result<(), EngineError>;

    /// Requests cancellation of a running job. Best-effort: the job
    /// terminates at the engine's discretion, observed as a terminal event.
    async fn cancel(&self, job_id: &JobId) -> Result<(), EngineError>;
}

/// In-process nesting engine
///
/// Must be initialized exactly once before any submission; a second
/// `initialize` fails with [`EngineError::AlreadyInitialized`] and a
/// submission before the first fails with [`EngineError::NotInitialized`].
pub struct NestEngine {
    config: EngineConfig,
    solver: Arc<dyn PlacementSolver>,
    initialized: AtomicBool,
    semaphore: Arc<Semaphore>,
    /// Cancellation handles for jobs that are queued or running
    active: Arc<Mutex<HashMap<JobId, CancellationToken>>>,
    /// Every id this engine ever accepted, for duplicate rejection
    accepted: Mutex<HashSet<JobId>>,
}

impl NestEngine {
    /// Creates an engine with the default shelf solver
    pub fn new(config: EngineConfig) -> Self {
        Self::with_solver(config, Arc::new(ShelfSolver::new()))
    }

    /// Creates an engine with a caller-provided solver
    pub fn with_solver(config: EngineConfig, solver: Arc<dyn PlacementSolver>) -> Self {
        let semaphore = Arc::new(Semaphore::new(config.max_parallel_jobs));
        Self {
            config,
            solver,
            initialized: AtomicBool::new(false),
            semaphore,
            active: Arc::new(Mutex::new(HashMap::new())),
            accepted: Mutex::new(HashSet::new()),
        }
    }

    /// Prepares the engine for submissions.
    ///
    /// Must be called exactly once; the second call is an error rather than
    /// a no-op so a double-init programming mistake is caught loudly.
    pub fn initialize(&self) -> Result<(), EngineError> {
        if self.initialized.swap(true, Ordering::AcqRel) {
            return Err(EngineError::AlreadyInitialized);
        }
        info!(
            max_parallel_jobs = self.config.max_parallel_jobs,
            "Nesting engine initialized"
        );
        Ok(())
    }

    /// Runs one job to its terminal event
    async fn run_job(
        descriptor: JobDescriptor,
        sink: UpdateSink,
        solver: Arc<dyn PlacementSolver>,
        semaphore: Arc<Semaphore>,
        active: Arc<Mutex<HashMap<JobId, CancellationToken>>>,
        token: CancellationToken,
        progress_interval: std::time::Duration,
    ) {
        let job_id = descriptor.job_id.clone();

        // Queued until a solve slot frees up.
        let _permit = match semaphore.acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => return, // engine dropped
        };

        if let Err(err) = sink.send(&UpdateEvent::running(job_id.clone())) {
            warn!(%job_id, %err, "Update channel closed before job start");
        }
        debug!(%job_id, copies = descriptor.total_copies(), "Job running");

        let timeout = descriptor.timeout();
        let deadline = tokio::time::Instant::now() + timeout;

        // Best-so-far survives the solver: a timed-out job still reports
        // the last solution it managed to emit.
        let best: Arc<std::sync::Mutex<Option<NestingSolution>>> =
            Arc::new(std::sync::Mutex::new(None));

        let ctx = {
            let sink = sink.clone();
            let best = Arc::clone(&best);
            let job_id = job_id.clone();
            // Throttling applies to the channel only: best-so-far is recorded
            // for every emission so a timed-out terminal never carries a
            // solution older than the solver's latest.
            let last_sent: std::sync::Mutex<Option<std::time::Instant>> =
                std::sync::Mutex::new(None);
            SolveContext::new(
                std::time::Instant::now() + timeout,
                token.clone(),
                Box::new(move |solution: NestingSolution| {
                    *best.lock().unwrap() = Some(solution.clone());
                    if !progress_interval.is_zero() {
                        let mut last = last_sent.lock().unwrap();
                        if let Some(at) = *last {
                            if at.elapsed() < progress_interval {
                                return;
                            }
                        }
                        *last = Some(std::time::Instant::now());
                    }
                    if sink
                        .send(&UpdateEvent::progress(job_id.clone(), solution))
                        .is_err()
                    {
                        debug!(%job_id, "Progress dropped, sink already terminal");
                    }
                }),
            )
        };

        let solve = {
            let solver = Arc::clone(&solver);
            let descriptor = descriptor.clone();
            tokio::task::spawn_blocking(move || solver.solve(&descriptor, &ctx))
        };

        let take_best = || best.lock().unwrap().take();
        let terminal = tokio::select! {
            result = solve => match result {
                Ok(Ok(solution)) => UpdateEvent::succeeded(job_id.clone(), solution),
                Ok(Err(SolveError::DeadlineExceeded)) => {
                    UpdateEvent::timed_out(job_id.clone(), take_best())
                }
                Ok(Err(err)) => UpdateEvent::failed(job_id.clone(), err.to_string()),
                Err(join_err) => {
                    warn!(%job_id, %join_err, "Solver task panicked");
                    UpdateEvent::failed(job_id.clone(), format!("solver panicked: {join_err}"))
                }
            },
            _ = tokio::time::sleep_until(deadline) => {
                // Non-cooperative solver: stop listening, report best-known.
                UpdateEvent::timed_out(job_id.clone(), take_best())
            }
            _ = token.cancelled() => {
                UpdateEvent::failed(job_id.clone(), SolveError::Cancelled.to_string())
            }
        };

        info!(%job_id, status = ?terminal.status, "Job terminal");
        if let Err(err) = sink.send(&terminal) {
            warn!(%job_id, %err, "Failed to deliver terminal event");
        }

        active.lock().await.remove(&job_id);
    }
}

#[async_trait]
impl SolvingEngine for NestEngine {
    async fn submit(&self, payload: &[u8], sink: UpdateSink) -> Result<(), EngineError> {
        if !self.initialized.load(Ordering::Acquire) {
            return Err(EngineError::NotInitialized);
        }

        let descriptor = wire::decode_descriptor(payload)?;
        let job_id = descriptor.job_id.clone();

        {
            let mut accepted = self.accepted.lock().await;
            if !accepted.insert(job_id.clone()) {
                return Err(ValidationError::DuplicateJobId(job_id).into());
            }
        }

        let token = CancellationToken::new();
        self.active.lock().await.insert(job_id.clone(), token.clone());

        if let Err(err) = sink.send(&UpdateEvent::queued(job_id.clone())) {
            warn!(%job_id, %err, "Update channel closed at submission");
        }
        info!(%job_id, parts = descriptor.parts.len(), sheets = descriptor.sheets.len(), "Job accepted");

        tokio::spawn(Self::run_job(
            descriptor,
            sink,
            Arc::clone(&self.solver),
            Arc::clone(&self.semaphore),
            Arc::clone(&self.active),
            token,
            self.config.progress_interval,
        ));

        Ok(())
    }

    async fn cancel(&self, job_id: &JobId) -> Result<(), EngineError> {
        let active = self.active.lock().await;
        match active.get(job_id) {
            Some(token) => {
                info!(%job_id, "Cancellation requested");
                token.cancel();
                Ok(())
            }
            None => Err(EngineError::NotFound(job_id.clone())),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::channel::{ChannelEvent, UpdateStream, update_channel};
    use platenest_core::{JobStatus, Part, Point, Sheet};

    fn engine() -> NestEngine {
        let engine = NestEngine::new(EngineConfig::default());
        engine.initialize().unwrap();
        engine
    }

    fn descriptor(job_id: &str, timeout: Duration) -> JobDescriptor {
        JobDescriptor::build(
            JobId::new(job_id),
            1.0,
            timeout,
            vec![Part {
                quantity: 5,
                contour: vec![
                    Point::new(0.0, 0.0),
                    Point::new(1.0, 0.0),
                    Point::new(1.0, 1.0),
                ],
                rotations: vec![0.0, 180.0],
            }],
            vec![Sheet {
                length: 10.0,
                width: 20.0,
                cost: 5.0,
            }],
        )
        .unwrap()
    }

    async fn collect_until_terminal(stream: &mut UpdateStream) -> Vec<UpdateEvent> {
        let mut events = Vec::new();
        loop {
            let next = tokio::time::timeout(Duration::from_secs(5), stream.recv())
                .await
                .expect("stream stalled without a terminal event");
            match next {
                Some(ChannelEvent::Update(event)) => {
                    let terminal = event.is_terminal();
                    events.push(event);
                    if terminal {
                        return events;
                    }
                }
                Some(ChannelEvent::Malformed(err)) => panic!("unexpected malformed event: {err}"),
                None => panic!("stream ended without a terminal event"),
            }
        }
    }

    /// Solver that sleeps in small slices without honoring checkpoints,
    /// emitting one early progress report
    struct SlowSolver {
        nap: Duration,
    }

    impl PlacementSolver for SlowSolver {
        fn solve(
            &self,
            job: &JobDescriptor,
            ctx: &SolveContext,
        ) -> Result<NestingSolution, SolveError> {
            ctx.emit_progress(NestingSolution {
                placements_and_location: vec![],
                sheet_count: 1,
                total_cost: job.sheets[0].cost,
            });
            std::thread::sleep(self.nap);
            Err(SolveError::DeadlineExceeded)
        }
    }

    #[tokio::test]
    async fn test_initialize_twice_fails() {
        let engine = NestEngine::new(EngineConfig::default());
        engine.initialize().unwrap();
        assert!(matches!(
            engine.initialize(),
            Err(EngineError::AlreadyInitialized)
        ));
    }

    #[tokio::test]
    async fn test_submit_before_initialize_fails() {
        let engine = NestEngine::new(EngineConfig::default());
        let (sink, _stream) = update_channel();
        let payload = wire::encode_descriptor(&descriptor("J1", Duration::from_secs(1)));
        assert!(matches!(
            engine.submit(&payload, sink).await,
            Err(EngineError::NotInitialized)
        ));
    }

    #[tokio::test]
    async fn test_invalid_descriptor_rejected_before_any_event() {
        let engine = engine();
        let (sink, mut stream) = update_channel();
        let payload = serde_json::json!({
            "nesting_job_ulid": "J1",
            "tool_diameter": 1.0,
            "timeout": 1000,
            "parts": [],
            "sheets": [{"length": 10.0, "width": 20.0, "cost": 5.0}],
        });
        let err = engine
            .submit(payload.to_string().as_bytes(), sink)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            EngineError::Validation(ValidationError::EmptyParts)
        ));
        // The sink was dropped with the rejection; zero events were sent.
        assert!(stream.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_job_runs_to_success_with_exactly_one_terminal() {
        let engine = engine();
        let (sink, mut stream) = update_channel();
        let payload = wire::encode_descriptor(&descriptor("J1", Duration::from_secs(1)));
        engine.submit(&payload, sink).await.unwrap();

        let events = collect_until_terminal(&mut stream).await;
        assert_eq!(events.first().unwrap().status, JobStatus::Queued);
        let terminal = events.last().unwrap();
        assert_eq!(terminal.status, JobStatus::Succeeded);
        assert_eq!(
            events.iter().filter(|e| e.is_terminal()).count(),
            1,
            "exactly one terminal event"
        );
        for event in &events {
            assert_eq!(event.job_id, JobId::new("J1"));
        }

        let solution = terminal.nesting_solution.as_ref().unwrap();
        assert_eq!(solution.placements_and_location.len(), 5);
        for record in &solution.placements_and_location {
            assert_eq!(record.sheet_index, 0);
        }
        assert!(stream.recv().await.is_none(), "no events after terminal");
    }

    #[tokio::test]
    async fn test_empty_rotations_payload_solves_at_rotation_zero() {
        let engine = engine();
        let (sink, mut stream) = update_channel();
        // Hand-built payload: empty rotations means "no rotation allowed".
        let payload = serde_json::json!({
            "nesting_job_ulid": "J1",
            "tool_diameter": 1.0,
            "timeout": 1000,
            "parts": [{
                "quantity": 2,
                "contour": [
                    {"x": 0.0, "y": 0.0},
                    {"x": 1.0, "y": 0.0},
                    {"x": 1.0, "y": 1.0},
                ],
                "rotations": [],
            }],
            "sheets": [{"length": 10.0, "width": 20.0, "cost": 5.0}],
        });
        engine
            .submit(payload.to_string().as_bytes(), sink)
            .await
            .unwrap();

        let events = collect_until_terminal(&mut stream).await;
        let terminal = events.last().unwrap();
        assert_eq!(terminal.status, JobStatus::Succeeded);
        let solution = terminal.nesting_solution.as_ref().unwrap();
        assert_eq!(solution.placements_and_location.len(), 2);
        for record in &solution.placements_and_location {
            assert_eq!(record.rotation, 0.0);
        }
    }

    /// Solver that reports a worse then a better solution in quick
    /// succession, then stalls until the deadline fires
    struct ImprovingSolver;

    impl PlacementSolver for ImprovingSolver {
        fn solve(
            &self,
            _job: &JobDescriptor,
            ctx: &SolveContext,
        ) -> Result<NestingSolution, SolveError> {
            for total_cost in [10.0, 5.0] {
                ctx.emit_progress(NestingSolution {
                    placements_and_location: vec![],
                    sheet_count: 1,
                    total_cost,
                });
            }
            std::thread::sleep(Duration::from_secs(2));
            Err(SolveError::DeadlineExceeded)
        }
    }

    #[tokio::test]
    async fn test_throttled_progress_still_updates_best_known_solution() {
        // A long progress interval suppresses the second channel event but
        // must not suppress the best-so-far bookkeeping behind it.
        let config = EngineConfig {
            progress_interval: Duration::from_secs(10),
            ..EngineConfig::default()
        };
        let engine = NestEngine::with_solver(config, Arc::new(ImprovingSolver));
        engine.initialize().unwrap();

        let (sink, mut stream) = update_channel();
        let payload = wire::encode_descriptor(&descriptor("J1", Duration::from_millis(400)));
        engine.submit(&payload, sink).await.unwrap();

        let events = collect_until_terminal(&mut stream).await;
        let terminal = events.last().unwrap();
        assert_eq!(terminal.status, JobStatus::TimedOut);
        assert_eq!(terminal.nesting_solution.as_ref().unwrap().total_cost, 5.0);

        let progress_events: Vec<_> = events
            .iter()
            .filter(|e| e.status == JobStatus::Running && e.nesting_solution.is_some())
            .collect();
        assert_eq!(progress_events.len(), 1, "second emission was throttled");
        assert_eq!(
            progress_events[0].nesting_solution.as_ref().unwrap().total_cost,
            10.0
        );
    }

    #[tokio::test]
    async fn test_duplicate_id_rejected_on_second_submission() {
        let engine = engine();
        let payload = wire::encode_descriptor(&descriptor("J1", Duration::from_secs(1)));

        let (sink, mut stream) = update_channel();
        engine.submit(&payload, sink).await.unwrap();
        collect_until_terminal(&mut stream).await;

        let (sink, _stream) = update_channel();
        let err = engine.submit(&payload, sink).await.unwrap_err();
        assert!(matches!(
            err,
            EngineError::Validation(ValidationError::DuplicateJobId(_))
        ));
    }

    #[tokio::test]
    async fn test_timeout_yields_timed_out_with_best_so_far() {
        let engine = NestEngine::with_solver(
            EngineConfig::default(),
            Arc::new(SlowSolver {
                nap: Duration::from_secs(10),
            }),
        );
        engine.initialize().unwrap();

        let (sink, mut stream) = update_channel();
        let payload = wire::encode_descriptor(&descriptor("J1", Duration::from_millis(250)));
        engine.submit(&payload, sink).await.unwrap();

        let events = collect_until_terminal(&mut stream).await;
        let terminal = events.last().unwrap();
        assert_eq!(terminal.status, JobStatus::TimedOut);
        // SlowSolver reported one early solution; the terminal carries it.
        assert!(terminal.nesting_solution.is_some());
    }

    #[tokio::test]
    async fn test_cancel_running_job_terminates_failed() {
        let engine = NestEngine::with_solver(
            EngineConfig::default(),
            Arc::new(SlowSolver {
                nap: Duration::from_secs(10),
            }),
        );
        engine.initialize().unwrap();

        let (sink, mut stream) = update_channel();
        let payload = wire::encode_descriptor(&descriptor("J1", Duration::from_secs(30)));
        engine.submit(&payload, sink).await.unwrap();

        // Wait for the job to start before cancelling.
        loop {
            match stream.recv().await {
                Some(ChannelEvent::Update(event)) if event.status == JobStatus::Running => break,
                Some(_) => continue,
                None => panic!("stream ended early"),
            }
        }
        engine.cancel(&JobId::new("J1")).await.unwrap();

        let events = collect_until_terminal(&mut stream).await;
        let terminal = events.last().unwrap();
        assert_eq!(terminal.status, JobStatus::Failed);
        assert!(terminal.error.as_deref().unwrap().contains("cancelled"));
    }

    #[tokio::test]
    async fn test_cancel_unknown_job_fails_not_found() {
        let engine = engine();
        assert!(matches!(
            engine.cancel(&JobId::new("missing")).await,
            Err(EngineError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_concurrent_jobs_keep_streams_independent() {
        let engine = engine();
        let payload_a = wire::encode_descriptor(&descriptor("JA", Duration::from_secs(1)));
        let payload_b = wire::encode_descriptor(&descriptor("JB", Duration::from_secs(1)));

        let (sink_a, mut stream_a) = update_channel();
        let (sink_b, mut stream_b) = update_channel();
        engine.submit(&payload_a, sink_a).await.unwrap();
        engine.submit(&payload_b, sink_b).await.unwrap();

        let events_a = collect_until_terminal(&mut stream_a).await;
        let events_b = collect_until_terminal(&mut stream_b).await;

        assert!(events_a.iter().all(|e| e.job_id == JobId::new("JA")));
        assert!(events_b.iter().all(|e| e.job_id == JobId::new("JB")));
        assert_eq!(events_a.last().unwrap().status, JobStatus::Succeeded);
        assert_eq!(events_b.last().unwrap().status, JobStatus::Succeeded);
    }

    #[tokio::test]
    async fn test_part_that_fits_no_sheet_fails_via_channel() {
        let engine = engine();
        let descriptor = JobDescriptor::build(
            JobId::new("J1"),
            1.0,
            Duration::from_secs(1),
            vec![Part {
                quantity: 1,
                contour: vec![
                    Point::new(0.0, 0.0),
                    Point::new(500.0, 0.0),
                    Point::new(500.0, 500.0),
                ],
                rotations: vec![0.0],
            }],
            vec![Sheet {
                length: 10.0,
                width: 10.0,
                cost: 1.0,
            }],
        )
        .unwrap();

        let (sink, mut stream) = update_channel();
        engine
            .submit(&wire::encode_descriptor(&descriptor), sink)
            .await
            .unwrap();

        let events = collect_until_terminal(&mut stream).await;
        let terminal = events.last().unwrap();
        assert_eq!(terminal.status, JobStatus::Failed);
        assert!(terminal.error.as_deref().unwrap().contains("does not fit"));
        assert!(terminal.nesting_solution.is_none());
    }
}
