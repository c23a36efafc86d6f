use crate::error::AdapterError;
use remod_event::{ConsoleKind, ExecutionRequest};
use remod_types::{EngineKind, FileCommand, SafeArgumentRecord, TransformationId};
use std::path::{Path, PathBuf};

/// Receiver for console output captured inside a sandbox.
///
/// The sink is passed explicitly into every invocation; sandboxed code has
/// no other way to produce output.
pub trait ConsoleSink: Send + Sync {
    fn emit(&self, kind: ConsoleKind, message: &str);
}

impl<F> ConsoleSink for F
where
    F: Fn(ConsoleKind, &str) + Send + Sync,
{
    fn emit(&self, kind: ConsoleKind, message: &str) {
        self(kind, message);
    }
}

/// Sink that drops everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullConsole;

impl ConsoleSink for NullConsole {
    fn emit(&self, _kind: ConsoleKind, _message: &str) {}
}

/// Everything one adapter call needs.
///
/// For per-file engines `path`/`data` describe the target. Per-run engines
/// receive the whole file set in `workspace` and treat `path` as the root.
#[derive(Debug, Clone, Copy)]
pub struct Invocation<'a> {
    pub transformation: TransformationId,
    pub source: &'a str,
    pub path: &'a Path,
    pub data: &'a str,
    pub args: &'a SafeArgumentRecord,
    pub format_with_prettier: bool,
    pub workspace: Option<&'a [ExecutionRequest]>,
}

impl<'a> Invocation<'a> {
    pub fn new(
        transformation: TransformationId,
        source: &'a str,
        path: &'a Path,
        data: &'a str,
        args: &'a SafeArgumentRecord,
    ) -> Self {
        Self {
            transformation,
            source,
            path,
            data,
            args,
            format_with_prettier: true,
            workspace: None,
        }
    }

    #[must_use]
    pub fn with_format(mut self, format_with_prettier: bool) -> Self {
        self.format_with_prettier = format_with_prettier;
        self
    }

    #[must_use]
    pub fn with_workspace(mut self, files: &'a [ExecutionRequest]) -> Self {
        self.workspace = Some(files);
        self
    }

    /// Builds the command list of a per-file engine.
    ///
    /// Files the transformation created come first, in creation order,
    /// followed by one `updateFile` when `output` differs from the input.
    #[must_use]
    pub fn commands_for(&self, created: Vec<(PathBuf, String)>, output: &str) -> Vec<FileCommand> {
        let mut commands: Vec<FileCommand> = created
            .into_iter()
            .map(|(path, data)| {
                FileCommand::create(self.transformation, path, data, self.format_with_prettier)
            })
            .collect();
        if let Ok(update) = FileCommand::update(
            self.transformation,
            self.path,
            self.data,
            output,
            self.format_with_prettier,
        ) {
            commands.push(update);
        }
        commands
    }
}

/// One transformation strategy.
///
/// Implementations are chosen once per lane from the lane's [`EngineKind`]
/// and must turn every fault raised by the transformation into an
/// [`AdapterError`].
pub trait EngineAdapter: Send {
    fn kind(&self) -> EngineKind;

    /// Runs the transformation over one target.
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError`] for compile, runtime and timeout failures.
    fn run(
        &self,
        invocation: &Invocation<'_>,
        console: &dyn ConsoleSink,
    ) -> Result<Vec<FileCommand>, AdapterError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingConsole;

    #[test]
    fn unchanged_output_emits_nothing() {
        let args = SafeArgumentRecord::empty();
        let inv = Invocation::new(
            TransformationId::named("t"),
            "",
            Path::new("a.ts"),
            "function f(){}",
            &args,
        );
        assert!(inv.commands_for(Vec::new(), "function f(){}").is_empty());
    }

    #[test]
    fn created_files_precede_update() {
        let args = SafeArgumentRecord::empty();
        let inv = Invocation::new(TransformationId::named("t"), "", Path::new("a.ts"), "a", &args)
            .with_format(false);
        let cmds = inv.commands_for(vec![("b.ts".into(), "b".into())], "A");
        let kinds: Vec<_> = cmds.iter().map(FileCommand::kind_name).collect();
        assert_eq!(kinds, vec!["createFile", "updateFile"]);
        assert_eq!(cmds[1].new_data(), Some("A"));
    }

    #[test]
    fn closures_are_sinks() {
        let recorder = RecordingConsole::new();
        let forward = |kind: ConsoleKind, message: &str| recorder.emit(kind, message);
        forward.emit(ConsoleKind::Info, "hello");
        NullConsole.emit(ConsoleKind::Info, "dropped");
        assert_eq!(recorder.messages(), vec!["hello".to_string()]);
    }
}
