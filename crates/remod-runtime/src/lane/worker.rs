//! Worker Unit state machine and lane threads.
//!
//! # State Machine
//!
//! ```text
//! ┌───────────────┐  Initialization   ┌──────┐  Execute*  ┌───────────┐
//! │ Uninitialized │ ────────────────► │ Idle │ ─────────► │ Executing │
//! └───────────────┘                   └──────┘ ◄───────── └───────────┘
//!         │                              │     Commands / Error
//!         │ Exit                         │ Exit
//!         ▼                              ▼
//!     ┌────────┐ ◄───────────────────────┘
//!     │ Exited │
//!     └────────┘
//! ```
//!
//! Per-file failures never leave `Idle`: the lane reports an `Error` and
//! waits for the next file.

use crate::lane::engines::adapter_for;
use remod_adapter::{format_commands, ConsoleSink, EngineAdapter, Formatter, Invocation};
use remod_event::{ConsoleEvent, ConsoleKind, ExecutionRequest, Initialization, LaneInbound, LaneOutbound};
use remod_lua::SandboxOptions;
use remod_types::{FileCommand, LaneId};
use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::JoinHandle;
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

/// Outbound port shared by every lane of a pool.
pub type OutboundTx = mpsc::UnboundedSender<(LaneId, LaneOutbound)>;

/// Lifecycle state of a [`WorkerUnit`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Uninitialized,
    Idle,
    Executing,
    Exited,
}

struct Session {
    init: Initialization,
    adapter: Box<dyn EngineAdapter>,
}

/// One transformation's execution lane.
///
/// Fed [`LaneInbound`] messages through [`handle`](Self::handle); every
/// reply goes to the outbound port tagged with the lane id.
pub struct WorkerUnit {
    id: LaneId,
    state: WorkerState,
    options: SandboxOptions,
    formatter: Option<Arc<dyn Formatter>>,
    outbound: OutboundTx,
    session: Option<Session>,
}

impl WorkerUnit {
    #[must_use]
    pub fn new(
        id: LaneId,
        options: SandboxOptions,
        formatter: Option<Arc<dyn Formatter>>,
        outbound: OutboundTx,
    ) -> Self {
        Self {
            id,
            state: WorkerState::Uninitialized,
            options,
            formatter,
            outbound,
            session: None,
        }
    }

    #[must_use]
    pub fn id(&self) -> LaneId {
        self.id
    }

    #[must_use]
    pub fn state(&self) -> WorkerState {
        self.state
    }

    /// Processes one message. Returns `false` once the unit has exited.
    pub fn handle(&mut self, message: LaneInbound) -> bool {
        if self.state == WorkerState::Exited {
            return false;
        }

        match message {
            LaneInbound::Initialization(init) => self.initialize(init),
            LaneInbound::ExecuteFile(request) => self.execute_file(&request),
            LaneInbound::ExecuteWorkflow { root, files } => self.execute_workflow(&root, &files),
            LaneInbound::Exit => {
                debug!(lane = %self.id, "lane exiting");
                self.state = WorkerState::Exited;
                self.session = None;
                return false;
            }
        }
        true
    }

    fn initialize(&mut self, init: Initialization) {
        if let Some(session) = &self.session {
            warn!(
                lane = %self.id,
                current = %session.init.transformation,
                ignored = %init.transformation,
                "lane already initialized, ignoring"
            );
            return;
        }

        debug!(
            lane = %self.id,
            engine = %init.engine,
            transformation = %init.transformation,
            "lane initialized"
        );
        let adapter = adapter_for(init.engine, self.options);
        self.session = Some(Session { init, adapter });
        self.state = WorkerState::Idle;
        self.send(LaneOutbound::Ready);
    }

    fn execute_file(&mut self, request: &ExecutionRequest) {
        let Some(session) = self.session.take() else {
            self.protocol_error("executeFile received before initialization");
            return;
        };

        let invocation = Invocation::new(
            session.init.transformation,
            &session.init.transformation_source,
            &request.path,
            &request.data,
            &session.init.safe_argument_record,
        )
        .with_format(session.init.format_with_prettier);
        self.run(&*session.adapter, &invocation);

        self.session = Some(session);
    }

    fn execute_workflow(&mut self, root: &Path, files: &[ExecutionRequest]) {
        let Some(session) = self.session.take() else {
            self.protocol_error("executeWorkflow received before initialization");
            return;
        };
        if !session.init.engine.is_per_run() {
            self.session = Some(session);
            self.protocol_error("executeWorkflow requires the orchestration-workflow engine");
            return;
        }

        let invocation = Invocation::new(
            session.init.transformation,
            &session.init.transformation_source,
            root,
            "",
            &session.init.safe_argument_record,
        )
        .with_format(session.init.format_with_prettier)
        .with_workspace(files);
        self.run(&*session.adapter, &invocation);

        self.session = Some(session);
    }

    fn run(&mut self, adapter: &dyn EngineAdapter, invocation: &Invocation<'_>) {
        self.state = WorkerState::Executing;
        debug!(lane = %self.id, path = %invocation.path.display(), "executing");

        let console = LaneConsole {
            id: self.id,
            outbound: &self.outbound,
        };
        // Formatting runs under the same guard, so a panicking formatter
        // still ends the file with an error reply.
        let result = catch_unwind(AssertUnwindSafe(|| {
            adapter
                .run(invocation, &console)
                .map(|commands| self.post_process(commands, invocation.format_with_prettier))
        }));

        let reply = match result {
            Ok(Ok(items)) => LaneOutbound::Commands { items },
            Ok(Err(e)) => {
                warn!(lane = %self.id, path = %invocation.path.display(), error = %e, "file failed");
                LaneOutbound::Error {
                    message: e.to_string(),
                    path: Some(invocation.path.to_path_buf()),
                }
            }
            Err(payload) => {
                let message = format!("transformation panicked: {}", panic_message(&*payload));
                warn!(lane = %self.id, path = %invocation.path.display(), reason = %message, "file failed");
                LaneOutbound::Error {
                    message,
                    path: Some(invocation.path.to_path_buf()),
                }
            }
        };

        self.send(reply);
        self.state = WorkerState::Idle;
    }

    fn post_process(&self, commands: Vec<FileCommand>, format: bool) -> Vec<FileCommand> {
        let commands = match &self.formatter {
            Some(formatter) if format => format_commands(commands, formatter.as_ref()),
            _ => commands,
        };
        commands
            .into_iter()
            .filter(|command| match command.validate() {
                Ok(()) => true,
                Err(e) => {
                    warn!(lane = %self.id, error = %e, "dropping invalid command");
                    false
                }
            })
            .collect()
    }

    fn protocol_error(&self, message: &str) {
        warn!(lane = %self.id, state = ?self.state, "{message}");
        self.send(LaneOutbound::Error {
            message: message.to_string(),
            path: None,
        });
    }

    fn send(&self, message: LaneOutbound) {
        if self.outbound.send((self.id, message)).is_err() {
            debug!(lane = %self.id, "outbound port closed");
        }
    }
}

impl std::fmt::Debug for WorkerUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerUnit")
            .field("id", &self.id)
            .field("state", &self.state)
            .field("options", &self.options)
            .field("formatter", &self.formatter.is_some())
            .finish_non_exhaustive()
    }
}

/// Forwards sandbox console calls as they happen, so they always precede
/// the file's terminal reply on the same port.
struct LaneConsole<'a> {
    id: LaneId,
    outbound: &'a OutboundTx,
}

impl ConsoleSink for LaneConsole<'_> {
    fn emit(&self, kind: ConsoleKind, message: &str) {
        trace!(lane = %self.id, kind = %kind, text = message, "console");
        let event = LaneOutbound::ConsoleEvent(ConsoleEvent::new(kind, message));
        let _ = self.outbound.send((self.id, event));
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

/// Sending side of a running lane.
#[derive(Debug)]
pub struct LaneHandle {
    id: LaneId,
    inbound: mpsc::UnboundedSender<LaneInbound>,
    thread: Option<JoinHandle<()>>,
}

impl LaneHandle {
    #[must_use]
    pub fn id(&self) -> LaneId {
        self.id
    }

    /// Queues a message. Returns `false` when the lane has already stopped.
    pub fn send(&self, message: LaneInbound) -> bool {
        self.inbound.send(message).is_ok()
    }

    /// Sends `Exit` and waits for the thread to finish its current file.
    pub fn join(mut self) {
        let _ = self.inbound.send(LaneInbound::Exit);
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                warn!(lane = %self.id, "lane thread panicked");
            }
        }
    }
}

impl Drop for LaneHandle {
    fn drop(&mut self) {
        let _ = self.inbound.send(LaneInbound::Exit);
    }
}

/// Starts a [`WorkerUnit`] on its own named thread.
///
/// # Errors
///
/// Returns the OS error if the thread cannot be spawned.
pub fn spawn_lane(
    id: LaneId,
    options: SandboxOptions,
    formatter: Option<Arc<dyn Formatter>>,
    outbound: OutboundTx,
) -> std::io::Result<LaneHandle> {
    let (inbound, mut rx) = mpsc::unbounded_channel();
    let thread = std::thread::Builder::new()
        .name(format!("remod-{id}"))
        .spawn(move || {
            let mut unit = WorkerUnit::new(id, options, formatter, outbound);
            while let Some(message) = rx.blocking_recv() {
                if !unit.handle(message) {
                    break;
                }
            }
            debug!(lane = %id, "lane stopped");
        })?;

    Ok(LaneHandle {
        id,
        inbound,
        thread: Some(thread),
    })
}

/// Root path used in failures of a workflow run.
#[must_use]
pub(crate) fn workflow_root(files: &[ExecutionRequest]) -> PathBuf {
    let mut paths = files.iter().map(|f| f.path.as_path());
    let Some(first) = paths.next() else {
        return PathBuf::new();
    };
    let mut root = first.parent().map(Path::to_path_buf).unwrap_or_default();
    for path in paths {
        while !path.starts_with(&root) {
            if !root.pop() {
                break;
            }
        }
    }
    root
}
