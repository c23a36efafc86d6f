//! Orchestrator: a pool of worker lanes running one transformation.
//!
//! # Lifecycle
//!
//! ```text
//! builder().build()
//!       │
//!       ▼
//! initialize(RunSpec) ── validate args ──► spawn N lanes ──► Initialization ×N
//!       │                                                       │
//!       │ ◄──────────────────────── Ready ×N ◄──────────────────┘
//!       ▼
//! run(files, sink) ── jobs queue ──► idle lane ──► Commands / Error ──► RunReport
//!       │
//!       ▼
//! shutdown()  (Exit ×N, join)
//! ```
//!
//! Files are handed to whichever lane is idle. Every submitted file ends
//! with exactly one terminal outcome, including files never dispatched
//! because the run was cancelled.

use crate::config::RemodConfig;
use crate::error::OrchestratorError;
use crate::lane::{spawn_lane, workflow_root, LaneHandle, OutboundTx};
use parking_lot::Mutex;
use remod_adapter::{ConsoleSink, Formatter};
use remod_event::{ConsoleEvent, ExecutionRequest, Initialization, LaneInbound, LaneOutbound};
use remod_lua::SandboxOptions;
use remod_types::{
    ArgumentSchema, EngineKind, FileCommand, LaneId, RawValue, SafeArgumentRecord, TransformationId,
};
use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

/// Failure message for files that were never dispatched.
pub const CANCELLED: &str = "cancelled";

/// What to run.
#[derive(Debug, Clone)]
pub struct RunSpec {
    pub engine: EngineKind,
    pub transformation: TransformationId,
    pub source: String,
    /// Caller-supplied arguments, validated before any lane starts.
    pub args: RawValue,
    pub schema: Option<ArgumentSchema>,
    /// Flag proposed files for formatting.
    pub format: bool,
}

impl RunSpec {
    /// A run with no arguments, a random transformation id and formatting on.
    pub fn new(engine: EngineKind, source: impl Into<String>) -> Self {
        Self {
            engine,
            transformation: TransformationId::new(),
            source: source.into(),
            args: RawValue::Map(Vec::new()),
            schema: None,
            format: true,
        }
    }

    #[must_use]
    pub fn with_transformation(mut self, transformation: TransformationId) -> Self {
        self.transformation = transformation;
        self
    }

    #[must_use]
    pub fn with_args(mut self, args: RawValue) -> Self {
        self.args = args;
        self
    }

    #[must_use]
    pub fn with_schema(mut self, schema: ArgumentSchema) -> Self {
        self.schema = Some(schema);
        self
    }

    #[must_use]
    pub fn with_format(mut self, format: bool) -> Self {
        self.format = format;
        self
    }

    fn validated_args(&self) -> Result<SafeArgumentRecord, OrchestratorError> {
        let record = match &self.schema {
            Some(schema) => SafeArgumentRecord::validate_with(&self.args, schema)?,
            None => SafeArgumentRecord::validate(&self.args)?,
        };
        Ok(record)
    }
}

/// Commands one file produced, in emission order.
#[derive(Debug, Clone, PartialEq)]
pub struct FileCommands {
    pub path: PathBuf,
    pub commands: Vec<FileCommand>,
}

/// A file that ended in failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileFailure {
    pub path: PathBuf,
    pub message: String,
}

/// A console event and the file whose transformation emitted it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsoleRecord {
    pub path: PathBuf,
    pub event: ConsoleEvent,
}

/// Terminal outcomes so far.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Progress {
    pub processed: usize,
    pub total: usize,
}

impl Progress {
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.processed >= self.total
    }
}

/// Result of [`Orchestrator::run`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunReport {
    pub commands: Vec<FileCommands>,
    pub failures: Vec<FileFailure>,
    pub console: Vec<ConsoleRecord>,
    pub progress: Progress,
}

impl RunReport {
    fn new(total: usize) -> Self {
        Self {
            progress: Progress {
                processed: 0,
                total,
            },
            ..Self::default()
        }
    }

    /// Every proposed command, file by file.
    pub fn all_commands(&self) -> impl Iterator<Item = &FileCommand> {
        self.commands.iter().flat_map(|f| f.commands.iter())
    }

    /// Commands for one file, if it succeeded.
    #[must_use]
    pub fn commands_for(&self, path: impl AsRef<std::path::Path>) -> Option<&[FileCommand]> {
        let path = path.as_ref();
        self.commands
            .iter()
            .find(|f| f.path == path)
            .map(|f| f.commands.as_slice())
    }

    fn succeed(&mut self, path: PathBuf, commands: Vec<FileCommand>) {
        self.commands.push(FileCommands { path, commands });
        self.progress.processed += 1;
    }

    fn fail(&mut self, path: PathBuf, message: impl Into<String>) {
        self.failures.push(FileFailure {
            path,
            message: message.into(),
        });
        self.progress.processed += 1;
    }
}

/// One dispatchable unit: a file, or the whole set for a workflow.
#[derive(Debug)]
struct Job {
    path: PathBuf,
    message: LaneInbound,
}

/// Pending jobs, claimed one at a time by idle lanes.
#[derive(Debug, Clone, Default)]
struct WorkQueue(Arc<Mutex<VecDeque<Job>>>);

impl WorkQueue {
    fn new(jobs: impl IntoIterator<Item = Job>) -> Self {
        Self(Arc::new(Mutex::new(jobs.into_iter().collect())))
    }

    fn take(&self) -> Option<Job> {
        self.0.lock().pop_front()
    }

    fn drain(&self) -> Vec<Job> {
        self.0.lock().drain(..).collect()
    }
}

/// Stops dispatch of further files. Cloneable across tasks.
#[derive(Debug, Clone)]
pub struct CancelHandle(Arc<watch::Sender<bool>>);

impl CancelHandle {
    fn new() -> Self {
        Self(Arc::new(watch::Sender::new(false)))
    }

    pub fn cancel(&self) {
        self.0.send_replace(true);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        *self.0.borrow()
    }
}

/// Builder for [`Orchestrator`].
#[derive(Clone)]
pub struct OrchestratorBuilder {
    threads: usize,
    options: SandboxOptions,
    formatter: Option<Arc<dyn Formatter>>,
    format_enabled: bool,
}

impl OrchestratorBuilder {
    /// Number of lanes; clamped to at least one.
    #[must_use]
    pub fn threads(mut self, threads: usize) -> Self {
        self.threads = threads.max(1);
        self
    }

    #[must_use]
    pub fn sandbox(mut self, options: SandboxOptions) -> Self {
        self.options = options;
        self
    }

    /// Attaches the formatting collaborator used on flagged commands.
    #[must_use]
    pub fn formatter(mut self, formatter: Arc<dyn Formatter>) -> Self {
        self.formatter = Some(formatter);
        self
    }

    /// Global switch for the formatting flag. A run formats only when both
    /// this and [`RunSpec::format`] are set.
    #[must_use]
    pub fn format(mut self, enabled: bool) -> Self {
        self.format_enabled = enabled;
        self
    }

    #[must_use]
    pub fn build(self) -> Orchestrator {
        let cancel = CancelHandle::new();
        let cancelled = cancel.0.subscribe();
        Orchestrator {
            threads: self.threads,
            options: self.options,
            formatter: self.formatter,
            format_enabled: self.format_enabled,
            engine: None,
            lanes: Vec::new(),
            outbound: None,
            cancel,
            cancelled,
            exited: false,
        }
    }
}

impl Default for OrchestratorBuilder {
    fn default() -> Self {
        Self {
            threads: 1,
            options: SandboxOptions::default(),
            formatter: None,
            format_enabled: true,
        }
    }
}

impl std::fmt::Debug for OrchestratorBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrchestratorBuilder")
            .field("threads", &self.threads)
            .field("options", &self.options)
            .field("formatter", &self.formatter.is_some())
            .field("format_enabled", &self.format_enabled)
            .finish()
    }
}

/// Owns the worker lanes of one transformation run.
pub struct Orchestrator {
    threads: usize,
    options: SandboxOptions,
    formatter: Option<Arc<dyn Formatter>>,
    format_enabled: bool,
    engine: Option<EngineKind>,
    lanes: Vec<LaneHandle>,
    outbound: Option<mpsc::UnboundedReceiver<(LaneId, LaneOutbound)>>,
    cancel: CancelHandle,
    cancelled: watch::Receiver<bool>,
    exited: bool,
}

impl Orchestrator {
    #[must_use]
    pub fn builder() -> OrchestratorBuilder {
        OrchestratorBuilder::default()
    }

    /// Builds an orchestrator from loaded configuration.
    #[must_use]
    pub fn from_config(config: &RemodConfig) -> Self {
        Self::builder()
            .threads(config.pool.lanes())
            .sandbox(config.sandbox.options())
            .format(config.format.enabled)
            .build()
    }

    /// Number of running lanes.
    #[must_use]
    pub fn lane_count(&self) -> usize {
        self.lanes.len()
    }

    #[must_use]
    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    /// Validates the arguments, starts the lanes and waits until every
    /// lane has acknowledged the transformation.
    ///
    /// Per-run engines get a single lane.
    ///
    /// # Errors
    ///
    /// [`OrchestratorError::InvalidArguments`] if the argument record is
    /// rejected; no lane is started in that case.
    pub async fn initialize(&mut self, spec: RunSpec) -> Result<(), OrchestratorError> {
        if self.engine.is_some() {
            return Err(OrchestratorError::AlreadyInitialized);
        }
        let safe_argument_record = spec.validated_args()?;

        let init = Initialization {
            engine: spec.engine,
            transformation: spec.transformation,
            transformation_source: spec.source,
            safe_argument_record,
            format_with_prettier: spec.format && self.format_enabled,
        };
        let lanes = if spec.engine.is_per_run() { 1 } else { self.threads };

        let (tx, mut rx): (OutboundTx, _) = mpsc::unbounded_channel();
        for n in 0..lanes {
            let lane = spawn_lane(LaneId(n), self.options, self.formatter.clone(), tx.clone())
                .map_err(OrchestratorError::Spawn)?;
            lane.send(LaneInbound::Initialization(init.clone()));
            self.lanes.push(lane);
        }
        drop(tx);

        let mut ready = 0;
        while ready < lanes {
            match rx.recv().await {
                Some((_, LaneOutbound::Ready)) => ready += 1,
                Some((lane, other)) => warn!(%lane, reply = ?other, "unexpected message during initialization"),
                None => return Err(OrchestratorError::LaneStopped),
            }
        }

        info!(
            engine = %init.engine,
            transformation = %init.transformation,
            lanes,
            "worker pool ready"
        );
        self.engine = Some(init.engine);
        self.outbound = Some(rx);
        Ok(())
    }

    /// Runs the transformation over `files`.
    ///
    /// Console events are forwarded to `sink` as they arrive, each before
    /// its file's terminal outcome. Per-file failures land in
    /// [`RunReport::failures`]; a run never fails as a whole.
    ///
    /// # Errors
    ///
    /// [`OrchestratorError::NotInitialized`] if called before
    /// [`initialize`](Self::initialize).
    pub async fn run(
        &mut self,
        files: Vec<ExecutionRequest>,
        sink: &dyn ConsoleSink,
    ) -> Result<RunReport, OrchestratorError> {
        let engine = self.engine.ok_or(OrchestratorError::NotInitialized)?;

        let jobs: Vec<Job> = if engine.is_per_run() {
            let root = workflow_root(&files);
            vec![Job {
                path: root.clone(),
                message: LaneInbound::ExecuteWorkflow { root, files },
            }]
        } else {
            files
                .into_iter()
                .map(|file| Job {
                    path: file.path.clone(),
                    message: LaneInbound::ExecuteFile(file),
                })
                .collect()
        };

        let mut report = RunReport::new(jobs.len());
        let queue = WorkQueue::new(jobs);
        let Some(mut outbound) = self.outbound.take() else {
            return Err(OrchestratorError::NotInitialized);
        };
        self.dispatch(&queue, &mut outbound, sink, &mut report).await;
        self.outbound = Some(outbound);

        info!(
            processed = report.progress.processed,
            failures = report.failures.len(),
            "run finished"
        );
        Ok(report)
    }

    async fn dispatch(
        &mut self,
        queue: &WorkQueue,
        outbound: &mut mpsc::UnboundedReceiver<(LaneId, LaneOutbound)>,
        sink: &dyn ConsoleSink,
        report: &mut RunReport,
    ) {
        let mut idle: Vec<usize> = (0..self.lanes.len()).rev().collect();
        let mut in_flight: HashMap<LaneId, PathBuf> = HashMap::new();

        loop {
            if self.is_cancelled() {
                self.exit_lanes();
                for job in queue.drain() {
                    debug!(path = %job.path.display(), "not dispatched");
                    report.fail(job.path, CANCELLED);
                }
            }

            while let Some(&index) = idle.last() {
                if self.exited {
                    break;
                }
                let Some(job) = queue.take() else { break };
                idle.pop();
                let lane = &self.lanes[index];
                debug!(lane = %lane.id(), path = %job.path.display(), "dispatching file");
                if lane.send(job.message) {
                    in_flight.insert(lane.id(), job.path);
                } else {
                    report.fail(job.path, "worker lane stopped");
                }
            }

            if in_flight.is_empty() {
                break;
            }

            tokio::select! {
                message = outbound.recv() => {
                    let Some((lane, message)) = message else {
                        for (_, path) in in_flight.drain() {
                            report.fail(path, "worker lane stopped");
                        }
                        break;
                    };
                    let Some(path) = in_flight.get(&lane).cloned() else {
                        warn!(%lane, reply = ?message, "message from a lane with no file in flight");
                        continue;
                    };
                    match message {
                        LaneOutbound::ConsoleEvent(event) => {
                            sink.emit(event.kind, &event.message);
                            report.console.push(ConsoleRecord { path, event });
                        }
                        LaneOutbound::Commands { items } => {
                            in_flight.remove(&lane);
                            idle.push(lane.0);
                            report.succeed(path, items);
                            debug!(%lane, processed = report.progress.processed, total = report.progress.total, "file done");
                        }
                        LaneOutbound::Error { message, path: reported } => {
                            in_flight.remove(&lane);
                            idle.push(lane.0);
                            warn!(%lane, path = %path.display(), error = %message, "file failed");
                            report.fail(reported.unwrap_or(path), message);
                        }
                        LaneOutbound::Ready => {}
                    }
                }
                changed = self.cancelled.changed() => {
                    if changed.is_err() {
                        debug!("cancel handle dropped");
                    }
                }
            }
        }
    }

    fn is_cancelled(&self) -> bool {
        *self.cancelled.borrow()
    }

    fn exit_lanes(&mut self) {
        if self.exited {
            return;
        }
        info!(lanes = self.lanes.len(), "cancelling run");
        for lane in &self.lanes {
            lane.send(LaneInbound::Exit);
        }
        self.exited = true;
    }

    /// Stops every lane and waits for the threads to finish.
    pub async fn shutdown(mut self) {
        let lanes = std::mem::take(&mut self.lanes);
        if lanes.is_empty() {
            return;
        }
        let count = lanes.len();
        let joined = tokio::task::spawn_blocking(move || {
            for lane in lanes {
                lane.join();
            }
        })
        .await;
        if let Err(e) = joined {
            warn!(error = %e, "failed to join worker lanes");
        }
        info!(lanes = count, "worker pool stopped");
    }
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("threads", &self.threads)
            .field("engine", &self.engine)
            .field("lanes", &self.lanes.len())
            .field("exited", &self.exited)
            .finish_non_exhaustive()
    }
}
