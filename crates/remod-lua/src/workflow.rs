//! Orchestration-workflow engine.
//!
//! A workflow sees the whole file set at once. It runs one or more passes
//! over a virtual overlay of the workspace:
//!
//! ```text
//! initialize_state(options, previous)
//!   for each matching path (include/exclude globs, relative to root):
//!     handle_file(api, path, options, state) -> [file command]
//!       upsertFile -> handle_data(api, path, data, options, state)
//!                       -> upsertData | noop
//!       deleteFile / moveFile / copyFile -> overlay
//!   handle_finish(options, state) -> noop | restart
//! ```
//!
//! Every overlay change is recorded as a [`FileCommand`] in the order it
//! happened. Failures inside `handle_file`/`handle_data` are reported as
//! console errors for that path; everything else fails the request.

use crate::convert::{args_value, to_lua};
use crate::error::{host, SandboxError};
use crate::sandbox::{ModuleRegistry, SandboxContext, SandboxOptions};
use globset::{Glob, GlobSet, GlobSetBuilder};
use mlua::{Function, Lua, LuaSerdeExt, Table, Value};
use parking_lot::Mutex;
use remod_adapter::{AdapterError, ConsoleSink, EngineAdapter, Invocation};
use remod_event::{ConsoleKind, ExecutionRequest};
use remod_types::{EngineKind, FileCommand, TransformationId};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

/// Upper bound on `restart` passes.
pub const MAX_PASSES: usize = 8;

#[derive(Debug, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase", rename_all_fields = "camelCase")]
enum WorkflowFileCommand {
    UpsertFile { path: String },
    DeleteFile { path: String },
    MoveFile { old_path: String, new_path: String },
    CopyFile { old_path: String, new_path: String },
}

#[derive(Debug, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
enum DataCommand {
    UpsertData { data: String },
    Noop,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
enum FinishCommand {
    Noop,
    Restart,
}

#[derive(Debug, Error)]
enum OverlayError {
    #[error("file does not exist: {}", .0.display())]
    Missing(PathBuf),

    #[error("file already exists: {}", .0.display())]
    Exists(PathBuf),
}

/// In-memory view of the workspace as the workflow has changed it.
#[derive(Debug)]
struct Overlay {
    root: PathBuf,
    files: BTreeMap<PathBuf, String>,
    transformation: TransformationId,
    format_with_prettier: bool,
    commands: Vec<FileCommand>,
}

impl Overlay {
    fn resolve(&self, path: &str) -> PathBuf {
        let path = Path::new(path);
        if path.is_absolute() || path.starts_with(&self.root) {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }

    fn relative<'p>(&self, path: &'p Path) -> &'p Path {
        path.strip_prefix(&self.root).unwrap_or(path)
    }

    fn upsert(&mut self, path: PathBuf, data: String) {
        match self.files.get(&path) {
            Some(old) => {
                if let Ok(update) = FileCommand::update(
                    self.transformation,
                    &path,
                    old,
                    &data,
                    self.format_with_prettier,
                ) {
                    self.commands.push(update);
                    self.files.insert(path, data);
                }
            }
            None => {
                self.commands.push(FileCommand::create(
                    self.transformation,
                    &path,
                    &data,
                    self.format_with_prettier,
                ));
                self.files.insert(path, data);
            }
        }
    }

    fn delete(&mut self, path: PathBuf) -> Result<(), OverlayError> {
        let old = self
            .files
            .remove(&path)
            .ok_or_else(|| OverlayError::Missing(path.clone()))?;
        self.commands
            .push(FileCommand::delete(self.transformation, path, old));
        Ok(())
    }

    fn relocate(&mut self, old_path: PathBuf, new_path: PathBuf, keep: bool) -> Result<(), OverlayError> {
        if self.files.contains_key(&new_path) {
            return Err(OverlayError::Exists(new_path));
        }
        let data = if keep {
            self.files.get(&old_path).cloned()
        } else {
            self.files.remove(&old_path)
        }
        .ok_or_else(|| OverlayError::Missing(old_path.clone()))?;
        self.files.insert(new_path.clone(), data);
        self.commands.push(if keep {
            FileCommand::copying(self.transformation, old_path, new_path)
        } else {
            FileCommand::moving(self.transformation, old_path, new_path)
        });
        Ok(())
    }
}

/// Path filter built from `include_patterns` / `exclude_patterns`.
struct PathFilter {
    include: Option<GlobSet>,
    exclude: GlobSet,
}

impl PathFilter {
    fn new(include: &[String], exclude: &[String]) -> Result<Self, AdapterError> {
        Ok(Self {
            include: if include.is_empty() {
                None
            } else {
                Some(build_glob_set(include)?)
            },
            exclude: build_glob_set(exclude)?,
        })
    }

    fn accepts(&self, relative: &Path) -> bool {
        !self.exclude.is_match(relative)
            && self.include.as_ref().map_or(true, |set| set.is_match(relative))
    }
}

fn build_glob_set(patterns: &[String]) -> Result<GlobSet, AdapterError> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = Glob::new(pattern)
            .map_err(|e| AdapterError::Runtime(format!("invalid glob '{pattern}': {e}")))?;
        builder.add(glob);
    }
    builder
        .build()
        .map_err(|e| AdapterError::Runtime(format!("glob set build error: {e}")))
}

/// Hooks the workflow table provides. Missing hooks use defaults.
struct Hooks {
    initialize_state: Option<Function>,
    handle_file: Option<Function>,
    handle_data: Option<Function>,
    handle_finish: Option<Function>,
    filter: PathFilter,
}

impl Hooks {
    fn from_exports(exports: &Value) -> Result<Self, AdapterError> {
        let Value::Table(table) = exports else {
            return Err(AdapterError::MissingEntry("a workflow table".into()));
        };
        let function = |name: &str| -> Result<Option<Function>, AdapterError> {
            match table.raw_get::<Value>(name).map_err(host)? {
                Value::Function(f) => Ok(Some(f)),
                Value::Nil => Ok(None),
                other => Err(AdapterError::Runtime(format!(
                    "workflow field '{name}' must be a function, got {}",
                    other.type_name()
                ))),
            }
        };
        let patterns = |name: &str| -> Result<Vec<String>, AdapterError> {
            Ok(table
                .raw_get::<Option<Vec<String>>>(name)
                .map_err(host)?
                .unwrap_or_default())
        };
        Ok(Self {
            initialize_state: function("initialize_state")?,
            handle_file: function("handle_file")?,
            handle_data: function("handle_data")?,
            handle_finish: function("handle_finish")?,
            filter: PathFilter::new(&patterns("include_patterns")?, &patterns("exclude_patterns")?)?,
        })
    }
}

/// Runs a workflow table over the whole file set.
#[derive(Debug, Clone, Default)]
pub struct WorkflowAdapter {
    options: SandboxOptions,
}

impl WorkflowAdapter {
    #[must_use]
    pub fn new(options: SandboxOptions) -> Self {
        Self { options }
    }

    fn modules() -> ModuleRegistry {
        ModuleRegistry::standard().register("workflow", workflow_module)
    }

    fn execute(
        sandbox: &SandboxContext,
        invocation: &Invocation<'_>,
        overlay: &Arc<Mutex<Overlay>>,
    ) -> Result<(), AdapterError> {
        let exports = sandbox.load(invocation.source)?;
        let hooks = Hooks::from_exports(&exports)?;

        let lua = sandbox.lua();
        let api = api_table(lua, overlay).map_err(host)?;
        let options = args_value(lua, invocation.args).map_err(host)?;
        let mut state = Value::Nil;

        for pass in 1..=MAX_PASSES {
            if let Some(init) = &hooks.initialize_state {
                state = sandbox.call(init, (options.clone(), state))?;
            }

            let targets: Vec<PathBuf> = {
                let overlay = overlay.lock();
                overlay
                    .files
                    .keys()
                    .filter(|p| hooks.filter.accepts(overlay.relative(p)))
                    .cloned()
                    .collect()
            };
            debug!(pass, files = targets.len(), "workflow pass");

            for path in &targets {
                let result = handle_file(sandbox, &hooks, &api, &options, &state, overlay, path);
                match result {
                    Ok(()) => {}
                    Err(SandboxError::Timeout) => return Err(AdapterError::Timeout),
                    Err(e) => {
                        warn!(path = %path.display(), error = %e, "workflow file handler failed");
                        sandbox.note(ConsoleKind::Error, format!("{}: {e}", path.display()));
                    }
                }
            }

            let finish = match &hooks.handle_finish {
                Some(f) => {
                    let value: Value = sandbox.call(f, (options.clone(), state.clone()))?;
                    decode::<FinishCommand>(lua, value, FinishCommand::Noop).map_err(host)?
                }
                None => FinishCommand::Noop,
            };
            match finish {
                FinishCommand::Noop => return Ok(()),
                FinishCommand::Restart if pass == MAX_PASSES => {
                    sandbox.note(
                        ConsoleKind::Warn,
                        format!("workflow restart limit of {MAX_PASSES} passes reached"),
                    );
                }
                FinishCommand::Restart => {}
            }
        }
        Ok(())
    }
}

impl EngineAdapter for WorkflowAdapter {
    fn kind(&self) -> EngineKind {
        EngineKind::OrchestrationWorkflow
    }

    fn run(
        &self,
        invocation: &Invocation<'_>,
        console: &dyn ConsoleSink,
    ) -> Result<Vec<FileCommand>, AdapterError> {
        let (root, files) = match invocation.workspace {
            Some(files) => (invocation.path.to_path_buf(), files.to_vec()),
            None => (
                invocation
                    .path
                    .parent()
                    .map(Path::to_path_buf)
                    .unwrap_or_default(),
                vec![ExecutionRequest::new(invocation.path, invocation.data)],
            ),
        };
        debug!(root = %root.display(), files = files.len(), "workflow run");

        let overlay = Arc::new(Mutex::new(Overlay {
            root,
            files: files.into_iter().map(|f| (f.path, f.data)).collect(),
            transformation: invocation.transformation,
            format_with_prettier: invocation.format_with_prettier,
            commands: Vec::new(),
        }));

        let sandbox = SandboxContext::new(&Self::modules(), &self.options)?;
        let result = Self::execute(&sandbox, invocation, &overlay);
        sandbox.drain_console(console);
        result?;

        let commands = std::mem::take(&mut overlay.lock().commands);
        Ok(commands)
    }
}

fn handle_file(
    sandbox: &SandboxContext,
    hooks: &Hooks,
    api: &Table,
    options: &Value,
    state: &Value,
    overlay: &Arc<Mutex<Overlay>>,
    path: &Path,
) -> Result<(), SandboxError> {
    let lua = sandbox.lua();
    let path_str = path.to_string_lossy().into_owned();

    let commands = match &hooks.handle_file {
        Some(f) => {
            let value: Value =
                sandbox.call(f, (api.clone(), path_str.as_str(), options.clone(), state.clone()))?;
            match value {
                Value::Nil => Vec::new(),
                other => lua.from_value::<Vec<WorkflowFileCommand>>(other)?,
            }
        }
        None => vec![WorkflowFileCommand::UpsertFile { path: path_str }],
    };

    for command in commands {
        match command {
            WorkflowFileCommand::UpsertFile { path } => {
                let target = overlay.lock().resolve(&path);
                let Some(f) = &hooks.handle_data else {
                    continue;
                };
                let data = overlay.lock().files.get(&target).cloned();
                let value: Value = sandbox.call(
                    f,
                    (api.clone(), path.as_str(), data, options.clone(), state.clone()),
                )?;
                if let DataCommand::UpsertData { data } = decode(lua, value, DataCommand::Noop)? {
                    overlay.lock().upsert(target, data);
                }
            }
            WorkflowFileCommand::DeleteFile { path } => {
                let mut overlay = overlay.lock();
                let target = overlay.resolve(&path);
                overlay.delete(target).map_err(overlay_error)?;
            }
            WorkflowFileCommand::MoveFile { old_path, new_path } => {
                let mut overlay = overlay.lock();
                let (from, to) = (overlay.resolve(&old_path), overlay.resolve(&new_path));
                overlay.relocate(from, to, false).map_err(overlay_error)?;
            }
            WorkflowFileCommand::CopyFile { old_path, new_path } => {
                let mut overlay = overlay.lock();
                let (from, to) = (overlay.resolve(&old_path), overlay.resolve(&new_path));
                overlay.relocate(from, to, true).map_err(overlay_error)?;
            }
        }
    }
    Ok(())
}

fn overlay_error(err: OverlayError) -> SandboxError {
    SandboxError::Runtime(err.to_string())
}

/// Decodes a hook's return value; `nil` means `default`.
fn decode<T: serde::de::DeserializeOwned>(lua: &Lua, value: Value, default: T) -> mlua::Result<T> {
    match value {
        Value::Nil => Ok(default),
        other => lua.from_value(other),
    }
}

/// Read-only view of the overlay handed to every hook.
fn api_table(lua: &Lua, overlay: &Arc<Mutex<Overlay>>) -> mlua::Result<Table> {
    let api = lua.create_table()?;

    let view = Arc::clone(overlay);
    api.set(
        "exists",
        lua.create_function(move |_, path: String| {
            let overlay = view.lock();
            Ok(overlay.files.contains_key(&overlay.resolve(&path)))
        })?,
    )?;

    let view = Arc::clone(overlay);
    api.set(
        "read",
        lua.create_function(move |_, path: String| {
            let overlay = view.lock();
            Ok(overlay.files.get(&overlay.resolve(&path)).cloned())
        })?,
    )?;

    let view = Arc::clone(overlay);
    api.set(
        "files",
        lua.create_function(move |lua, ()| {
            let paths: Vec<String> = view
                .lock()
                .files
                .keys()
                .map(|p| p.to_string_lossy().into_owned())
                .collect();
            to_lua(lua, &paths)
        })?,
    )?;

    Ok(api)
}

/// `require("workflow")`: glob matching for hand-written filters.
fn workflow_module(lua: &Lua) -> mlua::Result<Value> {
    let module = lua.create_table()?;
    module.set(
        "matches",
        lua.create_function(|_, (pattern, path): (String, String)| {
            let matcher = Glob::new(&pattern)
                .map_err(|e| mlua::Error::RuntimeError(format!("invalid glob '{pattern}': {e}")))?
                .compile_matcher();
            Ok(matcher.is_match(&path))
        })?,
    )?;
    Ok(Value::Table(module))
}

#[cfg(test)]
mod tests {
    use super::*;
    use remod_adapter::testing::RecordingConsole;
    use remod_types::SafeArgumentRecord;

    fn workspace() -> Vec<ExecutionRequest> {
        vec![
            ExecutionRequest::new("proj/src/a.ts", "let a = 1;"),
            ExecutionRequest::new("proj/src/b.ts", "let b = 2;"),
            ExecutionRequest::new("proj/README.md", "# readme"),
        ]
    }

    fn run(source: &str) -> (Result<Vec<FileCommand>, AdapterError>, RecordingConsole) {
        let files = workspace();
        let args = SafeArgumentRecord::empty();
        let invocation = Invocation::new(
            TransformationId::named("workflow-test"),
            source,
            Path::new("proj"),
            "",
            &args,
        )
        .with_workspace(&files);
        let console = RecordingConsole::new();
        let result = WorkflowAdapter::default().run(&invocation, &console);
        (result, console)
    }

    // ─── Overlay ───

    #[test]
    fn overlay_upsert_update_create_and_skip() {
        let mut overlay = Overlay {
            root: PathBuf::from("r"),
            files: BTreeMap::from([(PathBuf::from("r/a"), "1".to_string())]),
            transformation: TransformationId::named("o"),
            format_with_prettier: false,
            commands: Vec::new(),
        };
        overlay.upsert(PathBuf::from("r/a"), "1".into());
        assert!(overlay.commands.is_empty());
        overlay.upsert(PathBuf::from("r/a"), "2".into());
        overlay.upsert(PathBuf::from("r/b"), "3".into());
        let kinds: Vec<_> = overlay.commands.iter().map(FileCommand::kind_name).collect();
        assert_eq!(kinds, ["updateFile", "createFile"]);
        assert_eq!(overlay.resolve("b"), PathBuf::from("r/b"));
        assert_eq!(overlay.resolve("r/b"), PathBuf::from("r/b"));
    }

    #[test]
    fn overlay_relocate_rejects_conflicts() {
        let mut overlay = Overlay {
            root: PathBuf::new(),
            files: BTreeMap::from([
                (PathBuf::from("a"), "1".to_string()),
                (PathBuf::from("b"), "2".to_string()),
            ]),
            transformation: TransformationId::named("o"),
            format_with_prettier: false,
            commands: Vec::new(),
        };
        assert!(matches!(
            overlay.relocate("a".into(), "b".into(), false),
            Err(OverlayError::Exists(_))
        ));
        assert!(matches!(
            overlay.relocate("x".into(), "y".into(), true),
            Err(OverlayError::Missing(_))
        ));
        assert!(matches!(overlay.delete("x".into()), Err(OverlayError::Missing(_))));
        overlay.relocate("a".into(), "c".into(), true).expect("copy");
        assert_eq!(overlay.files.len(), 3);
    }

    // ─── Hooks ───

    #[test]
    fn defaults_produce_nothing() {
        let (result, _) = run("return {}");
        assert!(result.expect("run").is_empty());
    }

    #[test]
    fn handle_data_rewrites_matching_files() {
        let source = r#"
            return {
                include_patterns = { "src/**/*.ts" },
                handle_data = function(api, path, data, options, state)
                    return { kind = "upsertData", data = data:gsub("let", "const") }
                end,
            }
        "#;
        let commands = run(source).0.expect("run");
        assert_eq!(commands.len(), 2);
        assert_eq!(commands[0].primary_path(), Path::new("proj/src/a.ts"));
        assert_eq!(commands[0].new_data(), Some("const a = 1;"));
        assert_eq!(commands[1].new_data(), Some("const b = 2;"));
    }

    #[test]
    fn file_commands_in_emission_order() {
        let source = r#"
            return {
                exclude_patterns = { "**/*.md" },
                handle_file = function(api, path)
                    if path:match("a%.ts$") then
                        return {
                            { kind = "copyFile", oldPath = path, newPath = "src/a.copy.ts" },
                            { kind = "moveFile", oldPath = path, newPath = "src/a2.ts" },
                        }
                    end
                    return { { kind = "deleteFile", path = path } }
                end,
            }
        "#;
        let commands = run(source).0.expect("run");
        let kinds: Vec<_> = commands.iter().map(FileCommand::kind_name).collect();
        assert_eq!(kinds, ["copyFile", "moveFile", "deleteFile"]);
    }

    #[test]
    fn upsert_of_absent_path_creates() {
        let source = r##"
            return {
                include_patterns = { "README.md" },
                handle_file = function(api, path)
                    return { { kind = "upsertFile", path = "CHANGELOG.md" } }
                end,
                handle_data = function(api, path, data)
                    assert(data == nil and not api.exists(path))
                    return { kind = "upsertData", data = "# changes\n" .. api.read("README.md") }
                end,
            }
        "##;
        let commands = run(source).0.expect("run");
        assert_eq!(commands.len(), 1);
        assert_eq!(commands[0].kind_name(), "createFile");
        assert_eq!(commands[0].primary_path(), Path::new("proj/CHANGELOG.md"));
        assert_eq!(commands[0].new_data(), Some("# changes\n# readme"));
    }

    #[test]
    fn per_file_errors_become_console_errors() {
        let source = r#"
            return {
                include_patterns = { "**/*.ts" },
                handle_data = function(api, path, data)
                    if path:match("a%.ts$") then error("boom") end
                    return { kind = "upsertData", data = "changed" }
                end,
            }
        "#;
        let (result, console) = run(source);
        let commands = result.expect("run");
        assert_eq!(commands.len(), 1);
        assert_eq!(commands[0].primary_path(), Path::new("proj/src/b.ts"));
        let events = console.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, ConsoleKind::Error);
        assert!(events[0].message.starts_with("proj/src/a.ts: "), "{}", events[0].message);
        assert!(events[0].message.contains("boom"));
    }

    #[test]
    fn top_level_errors_fail_the_request() {
        let (result, _) = run(r#"return { handle_finish = function() error("finish failed") end }"#);
        let err = result.expect_err("fails");
        assert!(matches!(err, AdapterError::Runtime(ref m) if m.contains("finish failed")), "{err:?}");
    }

    #[test]
    fn restart_carries_state_and_is_bounded() {
        let source = r#"
            return {
                include_patterns = { "nothing" },
                initialize_state = function(options, previous)
                    return (previous or 0) + 1
                end,
                handle_finish = function(options, state)
                    console.log("pass " .. state)
                    return { kind = "restart" }
                end,
            }
        "#;
        let (result, console) = run(source);
        assert!(result.expect("run").is_empty());
        let messages = console.messages();
        assert_eq!(messages.len(), MAX_PASSES + 1);
        assert_eq!(messages[0], "pass 1");
        assert_eq!(messages[MAX_PASSES - 1], format!("pass {MAX_PASSES}"));
        assert!(messages[MAX_PASSES].contains("restart limit"));
    }

    #[test]
    fn workflow_module_matches_globs() {
        let source = r#"
            local workflow = require("workflow")
            return {
                handle_file = function(api, path)
                    assert(workflow.matches("**/*.ts", "src/x.ts"))
                    assert(not workflow.matches("*.md", "src/x.ts"))
                    return {}
                end,
            }
        "#;
        let (result, console) = run(source);
        assert!(result.expect("run").is_empty());
        assert!(console.events().is_empty());
    }

    #[test]
    fn non_table_exports_missing_entry() {
        let (result, _) = run("return 42");
        assert_eq!(
            result.expect_err("missing"),
            AdapterError::MissingEntry("a workflow table".into())
        );
    }

    #[test]
    fn single_file_without_workspace() {
        let args = SafeArgumentRecord::empty();
        let invocation = Invocation::new(
            TransformationId::named("workflow-test"),
            r#"return { handle_data = function(api, path, data) return { kind = "upsertData", data = data .. "!" } end }"#,
            Path::new("dir/one.txt"),
            "hi",
            &args,
        );
        let commands = WorkflowAdapter::default()
            .run(&invocation, &RecordingConsole::new())
            .expect("run");
        assert_eq!(commands.len(), 1);
        assert_eq!(commands[0].new_data(), Some("hi!"));
    }
}
