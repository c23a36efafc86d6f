//! Pattern-match engine: node queries and edits over a syntax tree.

use crate::convert::{args_value, CreatedFiles};
use crate::error::host;
use crate::sandbox::{ModuleRegistry, SandboxContext, SandboxOptions};
use crate::syntax::SyntaxDocument;
use mlua::{Lua, Value};
use remod_adapter::{apply_edits, AdapterError, ConsoleSink, Dialect, EngineAdapter, Invocation};
use remod_types::{EngineKind, FileCommand};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Runs `transform(root, api)` against the parsed target.
#[derive(Debug, Clone, Default)]
pub struct PatternMatchAdapter {
    options: SandboxOptions,
}

impl PatternMatchAdapter {
    #[must_use]
    pub fn new(options: SandboxOptions) -> Self {
        Self { options }
    }

    fn modules() -> ModuleRegistry {
        ModuleRegistry::standard().register("pattern", pattern_module)
    }

    fn transform(
        sandbox: &SandboxContext,
        doc: &std::sync::Arc<SyntaxDocument>,
        invocation: &Invocation<'_>,
    ) -> Result<(Vec<(PathBuf, String)>, String), AdapterError> {
        let exports = sandbox.load(invocation.source)?;
        let entry = sandbox.entry(&exports, "transform")?;

        let lua = sandbox.lua();
        let created = CreatedFiles::default();
        let api = lua.create_table().map_err(host)?;
        api.set("path", invocation.path.to_string_lossy().into_owned())
            .map_err(host)?;
        api.set("dialect", doc.dialect().name()).map_err(host)?;
        api.set("args", args_value(lua, invocation.args).map_err(host)?)
            .map_err(host)?;
        api.set("create_file", created.function(lua).map_err(host)?)
            .map_err(host)?;

        let returned: Value = sandbox.call(&entry, (doc.root(), api))?;
        let output = match returned {
            Value::Nil => apply_edits(invocation.data, doc.take_edits())?,
            Value::String(s) => s
                .to_str()
                .map_err(|_| AdapterError::InvalidOutput("returned text is not UTF-8".into()))?
                .to_string(),
            other => {
                return Err(AdapterError::InvalidOutput(format!(
                    "expected a string or nil, got {}",
                    other.type_name()
                )))
            }
        };
        Ok((created.take(), output))
    }
}

impl EngineAdapter for PatternMatchAdapter {
    fn kind(&self) -> EngineKind {
        EngineKind::PatternMatch
    }

    fn run(
        &self,
        invocation: &Invocation<'_>,
        console: &dyn ConsoleSink,
    ) -> Result<Vec<FileCommand>, AdapterError> {
        let dialect =
            Dialect::for_path(invocation.path).ok_or_else(|| AdapterError::UnsupportedFile {
                path: invocation.path.to_path_buf(),
            })?;
        let doc = SyntaxDocument::parse(invocation.path, invocation.data, dialect)?;
        let sandbox = SandboxContext::new(&Self::modules(), &self.options)?;
        debug!(path = %invocation.path.display(), dialect = %dialect, "pattern-match transform");

        let result = Self::transform(&sandbox, &doc, invocation);
        sandbox.drain_console(console);
        let (created, output) = result?;
        Ok(invocation.commands_for(created, &output))
    }
}

/// `require("pattern")`: parse snippets and list supported dialects.
fn pattern_module(lua: &Lua) -> mlua::Result<Value> {
    let module = lua.create_table()?;
    module.set(
        "parse",
        lua.create_function(|_, (text, dialect): (String, Option<String>)| {
            let name = dialect.unwrap_or_else(|| Dialect::TypeScript.name().to_string());
            let dialect = Dialect::from_name(&name)
                .ok_or_else(|| mlua::Error::RuntimeError(format!("unknown dialect '{name}'")))?;
            let doc = SyntaxDocument::parse(Path::new("<snippet>"), &text, dialect)
                .map_err(|e| mlua::Error::RuntimeError(e.to_string()))?;
            Ok(doc.root())
        })?,
    )?;
    module.set(
        "dialects",
        Dialect::ALL.iter().map(Dialect::name).collect::<Vec<_>>(),
    )?;
    Ok(Value::Table(module))
}
