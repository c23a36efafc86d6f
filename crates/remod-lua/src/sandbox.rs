//! Sandboxed execution context.
//!
//! Every invocation gets a fresh [`SandboxContext`]: a new Lua VM with only
//! the pure standard libraries loaded and a whitelist-only environment table
//! in which the transformation source is evaluated.
//!
//! # Security Model
//!
//! ```text
//! ┌───────────────────────── SandboxContext ─────────────────────────┐
//! │  Lua VM (math, string, table, utf8 only; no os / io / debug)     │
//! │                                                                  │
//! │  env ─┬─ safe base functions (pairs, pcall, tostring, ...)       │
//! │       ├─ console.{log,info,warn,error,debug,trace}, print        │
//! │       │     └──► ConsoleBuffer ──drain_console()──► ConsoleSink  │
//! │       └─ require(name) ──► ModuleRegistry (closed whitelist)     │
//! │                                                                  │
//! │  instruction hook ──► wall-clock deadline ──► SandboxError::Timeout
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! `load`, `loadfile`, `dofile`, `collectgarbage`, `os`, `io`, `debug`
//! and `package` are absent. Capabilities reach the transformation only as
//! modules an engine registers, or as arguments the engine passes to the
//! entry point.
//!
//! # Timeout
//!
//! The deadline is fixed when the context is built and covers every call
//! made through it. An instruction-count hook (`Lua::set_hook`) checks the
//! clock every `check_interval` instructions. Once the deadline passes the
//! context is poisoned: the current call and every later call fail with
//! [`SandboxError::Timeout`], even if the transformation swallowed the
//! error with `pcall`.
//!
//! Code the hook cannot see is bounded separately:
//! `setmetatable` refuses `__gc`, and the string pattern functions and
//! `string.rep` reject arguments whose cost has no useful bound.

use crate::convert::{display_values, json_module};
use crate::error::{format_lua_error, SandboxError};
use crate::limits;
use mlua::{
    FromLuaMulti, Function, HookTriggers, IntoLuaMulti, Lua, LuaOptions, MultiValue, StdLib, Table,
    Value, VmState,
};
use parking_lot::Mutex;
use remod_adapter::ConsoleSink;
use remod_event::{ConsoleEvent, ConsoleKind};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::trace;

/// Default wall-clock budget per invocation.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default number of VM instructions between clock checks.
pub const DEFAULT_CHECK_INTERVAL: u32 = 1_000;

/// Console text kept per invocation before further output is dropped.
const MAX_CONSOLE_BYTES: usize = 1 << 20;

const SAFE_GLOBALS: &[&str] = &[
    "assert",
    "error",
    "getmetatable",
    "ipairs",
    "next",
    "pairs",
    "pcall",
    "rawequal",
    "rawget",
    "rawlen",
    "rawset",
    "select",
    "setmetatable",
    "tonumber",
    "tostring",
    "type",
    "xpcall",
];

const SAFE_LIBS: &[&str] = &["math", "string", "table", "utf8"];

/// Limits applied to one invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SandboxOptions {
    pub timeout: Duration,
    pub check_interval: u32,
}

impl Default for SandboxOptions {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            check_interval: DEFAULT_CHECK_INTERVAL,
        }
    }
}

impl SandboxOptions {
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_check_interval(mut self, check_interval: u32) -> Self {
        self.check_interval = check_interval;
        self
    }
}

/// Builds a module value inside the VM that requires it.
pub type ModuleBuilder = Arc<dyn Fn(&Lua) -> mlua::Result<Value> + Send + Sync>;

/// Closed set of modules reachable through `require`.
#[derive(Clone, Default)]
pub struct ModuleRegistry {
    modules: BTreeMap<String, ModuleBuilder>,
}

impl ModuleRegistry {
    /// A registry with nothing in it.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding the modules every engine offers (`json`).
    #[must_use]
    pub fn standard() -> Self {
        Self::new().register("json", json_module)
    }

    #[must_use]
    pub fn register<F>(mut self, name: impl Into<String>, builder: F) -> Self
    where
        F: Fn(&Lua) -> mlua::Result<Value> + Send + Sync + 'static,
    {
        self.modules.insert(name.into(), Arc::new(builder));
        self
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.modules.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.modules.keys().map(String::as_str)
    }
}

impl std::fmt::Debug for ModuleRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

#[derive(Default)]
struct BufferState {
    events: Vec<ConsoleEvent>,
    bytes: usize,
    truncated: bool,
}

/// Console events captured during one invocation, in call order.
#[derive(Clone, Default)]
struct ConsoleBuffer {
    inner: Arc<Mutex<BufferState>>,
}

impl ConsoleBuffer {
    fn push(&self, kind: ConsoleKind, message: String) {
        let mut state = self.inner.lock();
        if state.truncated {
            return;
        }
        state.bytes += message.len();
        if state.bytes > MAX_CONSOLE_BYTES {
            state.truncated = true;
            state.events.push(ConsoleEvent::new(
                ConsoleKind::Warn,
                "console output truncated",
            ));
            return;
        }
        state.events.push(ConsoleEvent::new(kind, message));
    }

    fn drain(&self) -> Vec<ConsoleEvent> {
        std::mem::take(&mut self.inner.lock().events)
    }
}

/// One isolated evaluation scope.
pub struct SandboxContext {
    lua: Lua,
    env: Table,
    console: ConsoleBuffer,
    deadline: Option<Instant>,
    timed_out: Arc<AtomicBool>,
}

impl SandboxContext {
    /// Builds a fresh VM and environment.
    ///
    /// # Errors
    ///
    /// Returns [`SandboxError::Setup`] if the VM cannot be created.
    pub fn new(modules: &ModuleRegistry, options: &SandboxOptions) -> Result<Self, SandboxError> {
        let deadline = Instant::now().checked_add(options.timeout);
        let lua = Lua::new_with(
            StdLib::MATH | StdLib::STRING | StdLib::TABLE | StdLib::UTF8,
            LuaOptions::default(),
        )
        .map_err(|e| SandboxError::Setup(format_lua_error(&e)))?;
        let console = ConsoleBuffer::default();
        let env = build_env(&lua, modules, &console)
            .map_err(|e| SandboxError::Setup(format_lua_error(&e)))?;
        let timed_out = Arc::new(AtomicBool::new(false));
        if let Some(deadline) = deadline {
            install_deadline(
                &lua,
                deadline,
                options.check_interval.max(1),
                Arc::clone(&timed_out),
            );
        }

        Ok(Self {
            lua,
            env,
            console,
            deadline,
            timed_out,
        })
    }

    /// The VM, for building values to pass into the transformation.
    #[must_use]
    pub fn lua(&self) -> &Lua {
        &self.lua
    }

    /// The transformation's global environment.
    #[must_use]
    pub fn env(&self) -> &Table {
        &self.env
    }

    /// Evaluates the transformation source and returns what it exports.
    ///
    /// # Errors
    ///
    /// Compile errors, runtime errors and timeouts.
    pub fn load(&self, source: &str) -> Result<Value, SandboxError> {
        let chunk = self
            .lua
            .load(source)
            .set_name("=transformation")
            .set_environment(self.env.clone());
        self.guarded(|| chunk.eval::<Value>())
    }

    /// Resolves the entry function from the exported value.
    ///
    /// A function is its own entry; a table provides it under `field`.
    ///
    /// # Errors
    ///
    /// [`SandboxError::MissingEntry`] if no function is found.
    pub fn entry(&self, exports: &Value, field: &str) -> Result<Function, SandboxError> {
        let missing = || SandboxError::MissingEntry(format!("a '{field}' function"));
        match exports {
            Value::Function(f) => Ok(f.clone()),
            Value::Table(t) => match t.raw_get::<Value>(field)? {
                Value::Function(f) => Ok(f),
                _ => Err(missing()),
            },
            _ => Err(missing()),
        }
    }

    /// Calls a transformation function under the deadline.
    ///
    /// # Errors
    ///
    /// Runtime errors and timeouts raised by the call.
    pub fn call<R: FromLuaMulti>(
        &self,
        function: &Function,
        args: impl IntoLuaMulti,
    ) -> Result<R, SandboxError> {
        self.guarded(|| function.call::<R>(args))
    }

    /// Records a console event on behalf of the host.
    pub fn note(&self, kind: ConsoleKind, message: impl Into<String>) {
        self.console.push(kind, message.into());
    }

    /// Forwards captured console events to `sink`, oldest first.
    pub fn drain_console(&self, sink: &dyn ConsoleSink) {
        for event in self.console.drain() {
            trace!(kind = %event.kind, text = %event.message, "sandbox console");
            sink.emit(event.kind, &event.message);
        }
    }

    /// Whether the deadline has passed.
    #[must_use]
    pub fn expired(&self) -> bool {
        self.timed_out.load(Ordering::Relaxed) || self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    fn guarded<T>(&self, run: impl FnOnce() -> mlua::Result<T>) -> Result<T, SandboxError> {
        if self.expired() {
            self.timed_out.store(true, Ordering::Relaxed);
            return Err(SandboxError::Timeout);
        }
        let result = run();
        if self.timed_out.load(Ordering::Relaxed) {
            return Err(SandboxError::Timeout);
        }
        result.map_err(SandboxError::from)
    }
}

/// Stays installed until the VM is dropped.
fn install_deadline(lua: &Lua, deadline: Instant, check_interval: u32, flag: Arc<AtomicBool>) {
    // The call trigger fires before `pcall` sets up its protection, so an
    // expired deadline cannot be caught in a loop of pcalls.
    lua.set_hook(
        HookTriggers::new()
            .on_calls()
            .every_nth_instruction(check_interval),
        move |_lua, _debug| {
            if flag.load(Ordering::Relaxed) || Instant::now() >= deadline {
                flag.store(true, Ordering::Relaxed);
                Err(mlua::Error::RuntimeError("timed out".into()))
            } else {
                Ok(VmState::Continue)
            }
        },
    );
}

fn build_env(lua: &Lua, modules: &ModuleRegistry, console: &ConsoleBuffer) -> mlua::Result<Table> {
    let env = lua.create_table()?;
    let globals = lua.globals();

    for name in SAFE_GLOBALS.iter().chain(SAFE_LIBS) {
        let value: Value = globals.get(*name)?;
        if !matches!(value, Value::Nil) {
            env.set(*name, value)?;
        }
    }
    env.set("_G", env.clone())?;

    limits::install(lua, &env)?;
    install_console(lua, &env, console)?;
    install_require(lua, &env, modules)?;
    Ok(env)
}

fn install_console(lua: &Lua, env: &Table, buffer: &ConsoleBuffer) -> mlua::Result<()> {
    let console = lua.create_table()?;
    for kind in ConsoleKind::ALL {
        let buffer = buffer.clone();
        let method = lua.create_function(move |lua, args: MultiValue| {
            buffer.push(kind, display_values(lua, &args, " ")?);
            Ok(())
        })?;
        console.set(kind.as_str(), method)?;
    }
    env.set("console", console)?;

    let buffer = buffer.clone();
    let print = lua.create_function(move |lua, args: MultiValue| {
        buffer.push(ConsoleKind::Log, display_values(lua, &args, "\t")?);
        Ok(())
    })?;
    env.set("print", print)
}

fn install_require(lua: &Lua, env: &Table, modules: &ModuleRegistry) -> mlua::Result<()> {
    let modules = modules.clone();
    let loaded = lua.create_table()?;
    let require = lua.create_function(move |lua, name: String| {
        let cached: Value = loaded.raw_get(name.as_str())?;
        if !matches!(cached, Value::Nil) {
            return Ok(cached);
        }
        let builder = modules
            .modules
            .get(&name)
            .ok_or_else(|| mlua::Error::RuntimeError(format!("module '{name}' not found")))?;
        let module = builder(lua)?;
        loaded.raw_set(name.as_str(), module.clone())?;
        Ok(module)
    })?;
    env.set("require", require)
}
