//! Structural-morph engine: a mutable source-file handle.
//!
//! Unlike the pattern-match engine, edits land immediately and later
//! offsets refer to the edited text. `find_nodes` re-parses whatever the
//! handle currently holds.

use crate::convert::{args_value, CreatedFiles};
use crate::error::host;
use crate::sandbox::{ModuleRegistry, SandboxContext, SandboxOptions};
use crate::syntax::SyntaxDocument;
use mlua::{Lua, MetaMethod, UserData, UserDataMethods, Value};
use parking_lot::Mutex;
use remod_adapter::{apply_edits, AdapterError, ConsoleSink, Dialect, EngineAdapter, Invocation, TextEdit};
use remod_types::{EngineKind, FileCommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;

#[derive(Debug)]
struct SourceState {
    path: PathBuf,
    original: String,
    text: String,
}

/// Lua handle to one file's text.
#[derive(Debug, Clone)]
pub(crate) struct LuaSourceFile(Arc<Mutex<SourceState>>);

impl LuaSourceFile {
    pub(crate) fn new(path: impl Into<PathBuf>, text: impl Into<String>) -> Self {
        let text = text.into();
        Self(Arc::new(Mutex::new(SourceState {
            path: path.into(),
            original: text.clone(),
            text,
        })))
    }

    pub(crate) fn full_text(&self) -> String {
        self.0.lock().text.clone()
    }

    fn edit(&self, edit: TextEdit) -> mlua::Result<()> {
        let mut state = self.0.lock();
        let next = apply_edits(&state.text, [edit])
            .map_err(|e| mlua::Error::RuntimeError(e.to_string()))?;
        state.text = next;
        Ok(())
    }

    fn find_nodes(&self, lua: &Lua, kind: &str) -> mlua::Result<Vec<mlua::Table>> {
        let (path, text) = {
            let state = self.0.lock();
            (state.path.clone(), state.text.clone())
        };
        let dialect = Dialect::for_path(&path).ok_or_else(|| {
            mlua::Error::RuntimeError(format!("no grammar for {}", path.display()))
        })?;
        let doc = SyntaxDocument::parse(&path, &text, dialect)
            .map_err(|e| mlua::Error::RuntimeError(e.to_string()))?;

        let mut found = Vec::new();
        for (index, node) in doc.nodes().iter().enumerate() {
            if node.kind != kind {
                continue;
            }
            let entry = lua.create_table()?;
            entry.set("kind", node.kind)?;
            entry.set("text", doc.text_of(index))?;
            entry.set("start", node.start)?;
            entry.set("end", node.end)?;
            found.push(entry);
        }
        Ok(found)
    }
}

impl UserData for LuaSourceFile {
    fn add_methods<M: UserDataMethods<Self>>(methods: &mut M) {
        methods.add_method("path", |_, this, ()| {
            Ok(this.0.lock().path.to_string_lossy().into_owned())
        });

        methods.add_method("full_text", |_, this, ()| Ok(this.full_text()));

        methods.add_method(
            "replace_text",
            |_, this, (start, end, text): (usize, usize, String)| {
                this.edit(TextEdit::new(start, end, text))
            },
        );

        methods.add_method("insert_text", |_, this, (pos, text): (usize, String)| {
            this.edit(TextEdit::insert(pos, text))
        });

        methods.add_method("remove_text", |_, this, (start, end): (usize, usize)| {
            this.edit(TextEdit::delete(start, end))
        });

        methods.add_method("replace_with_text", |_, this, text: String| {
            this.0.lock().text = text;
            Ok(())
        });

        methods.add_method("find_nodes", |lua, this, kind: String| {
            this.find_nodes(lua, &kind)
        });

        methods.add_method("is_modified", |_, this, ()| {
            let state = this.0.lock();
            Ok(state.text != state.original)
        });

        methods.add_meta_method(MetaMethod::ToString, |_, this, ()| {
            Ok(format!("SourceFile({})", this.0.lock().path.display()))
        });
    }
}

/// Runs `transform(file, args, api)` against a mutable file handle.
#[derive(Debug, Clone, Default)]
pub struct StructuralMorphAdapter {
    options: SandboxOptions,
}

impl StructuralMorphAdapter {
    #[must_use]
    pub fn new(options: SandboxOptions) -> Self {
        Self { options }
    }

    fn modules() -> ModuleRegistry {
        ModuleRegistry::standard().register("morph", morph_module)
    }

    fn transform(
        sandbox: &SandboxContext,
        invocation: &Invocation<'_>,
    ) -> Result<(Vec<(PathBuf, String)>, String), AdapterError> {
        let exports = sandbox.load(invocation.source)?;
        let entry = sandbox.entry(&exports, "transform")?;

        let lua = sandbox.lua();
        let file = LuaSourceFile::new(invocation.path, invocation.data);
        let created = CreatedFiles::default();
        let api = lua.create_table().map_err(host)?;
        api.set("path", invocation.path.to_string_lossy().into_owned())
            .map_err(host)?;
        api.set("create_file", created.function(lua).map_err(host)?)
            .map_err(host)?;
        let args = args_value(lua, invocation.args).map_err(host)?;

        let returned: Value = sandbox.call(&entry, (file.clone(), args, api))?;
        let output = match returned {
            Value::Nil => file.full_text(),
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

impl EngineAdapter for StructuralMorphAdapter {
    fn kind(&self) -> EngineKind {
        EngineKind::StructuralMorph
    }

    fn run(
        &self,
        invocation: &Invocation<'_>,
        console: &dyn ConsoleSink,
    ) -> Result<Vec<FileCommand>, AdapterError> {
        let sandbox = SandboxContext::new(&Self::modules(), &self.options)?;
        debug!(path = %invocation.path.display(), "structural-morph transform");

        let result = Self::transform(&sandbox, invocation);
        sandbox.drain_console(console);
        let (created, output) = result?;
        Ok(invocation.commands_for(created, &output))
    }
}

/// `require("morph")`: detached source files and dialect lookup.
fn morph_module(lua: &Lua) -> mlua::Result<Value> {
    let module = lua.create_table()?;
    module.set(
        "source_file",
        lua.create_function(|_, (path, text): (String, String)| {
            Ok(LuaSourceFile::new(path, text))
        })?,
    )?;
    module.set(
        "dialect_of",
        lua.create_function(|_, path: String| {
            Ok(Dialect::for_path(std::path::Path::new(&path)).map(|d| d.name()))
        })?,
    )?;
    Ok(Value::Table(module))
}
