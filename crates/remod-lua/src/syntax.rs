//! Parsed syntax trees exposed to Lua as node handles.
//!
//! tree-sitter nodes borrow their tree, so they cannot cross into the VM.
//! The tree is flattened once into a preorder arena; Lua receives
//! [`LuaNode`] handles (document + index) that stay valid for the whole
//! invocation. Edits requested through a handle accumulate on the shared
//! document and are applied by the engine once the entry point returns.

use mlua::{AnyUserData, MetaMethod, UserData, UserDataMethods, Value};
use parking_lot::Mutex;
use remod_adapter::{AdapterError, Dialect, TextEdit};
use std::path::Path;
use std::sync::Arc;
use tree_sitter::Tree;

#[derive(Debug, Clone)]
pub(crate) struct NodeRecord {
    pub(crate) kind: &'static str,
    pub(crate) named: bool,
    pub(crate) start: usize,
    pub(crate) end: usize,
    pub(crate) parent: Option<usize>,
    pub(crate) children: Vec<usize>,
    pub(crate) field: Option<&'static str>,
    /// One past the last descendant's index.
    subtree_end: usize,
}

/// A parsed file plus the edits requested against it.
#[derive(Debug)]
pub(crate) struct SyntaxDocument {
    text: String,
    dialect: Dialect,
    nodes: Vec<NodeRecord>,
    edits: Mutex<Vec<TextEdit>>,
}

impl SyntaxDocument {
    pub(crate) fn parse(path: &Path, text: &str, dialect: Dialect) -> Result<Arc<Self>, AdapterError> {
        let tree = dialect.parse(path, text)?;
        Ok(Arc::new(Self {
            text: text.to_string(),
            dialect,
            nodes: flatten(&tree),
            edits: Mutex::new(Vec::new()),
        }))
    }

    pub(crate) fn root(self: &Arc<Self>) -> LuaNode {
        LuaNode {
            doc: Arc::clone(self),
            index: 0,
        }
    }

    pub(crate) fn dialect(&self) -> Dialect {
        self.dialect
    }

    pub(crate) fn nodes(&self) -> &[NodeRecord] {
        &self.nodes
    }

    pub(crate) fn text_of(&self, index: usize) -> &str {
        let node = &self.nodes[index];
        self.text.get(node.start..node.end).unwrap_or("")
    }

    pub(crate) fn take_edits(&self) -> Vec<TextEdit> {
        std::mem::take(&mut *self.edits.lock())
    }

    fn push_edit(&self, edit: TextEdit) {
        self.edits.lock().push(edit);
    }

    fn descendants(&self, index: usize) -> std::ops::Range<usize> {
        index + 1..self.nodes[index].subtree_end
    }
}

fn flatten(tree: &Tree) -> Vec<NodeRecord> {
    let mut nodes: Vec<NodeRecord> = Vec::new();
    let mut parents: Vec<usize> = Vec::new();
    let mut cursor = tree.walk();

    'walk: loop {
        let node = cursor.node();
        let index = nodes.len();
        let parent = parents.last().copied();
        nodes.push(NodeRecord {
            kind: node.kind(),
            named: node.is_named(),
            start: node.start_byte(),
            end: node.end_byte(),
            parent,
            children: Vec::new(),
            field: cursor.field_name(),
            subtree_end: index + 1,
        });
        if let Some(p) = parent {
            nodes[p].children.push(index);
        }

        if cursor.goto_first_child() {
            parents.push(index);
            continue;
        }
        loop {
            if cursor.goto_next_sibling() {
                continue 'walk;
            }
            if !cursor.goto_parent() {
                break 'walk;
            }
            parents.pop();
        }
    }

    for i in (0..nodes.len()).rev() {
        if let Some(&last) = nodes[i].children.last() {
            nodes[i].subtree_end = nodes[last].subtree_end;
        }
    }
    nodes
}

/// Criteria accepted by `find` / `find_all`.
#[derive(Debug, Default)]
struct NodeQuery {
    kind: Option<String>,
    text: Option<String>,
    field: Option<String>,
}

impl NodeQuery {
    fn from_lua(value: Value) -> mlua::Result<Self> {
        match value {
            Value::String(s) => Ok(Self {
                kind: Some(s.to_str()?.to_string()),
                ..Self::default()
            }),
            Value::Table(t) => Ok(Self {
                kind: t.get("kind")?,
                text: t.get("text")?,
                field: t.get("field")?,
            }),
            other => Err(mlua::Error::RuntimeError(format!(
                "query must be a node kind or a table, got {}",
                other.type_name()
            ))),
        }
    }

    fn matches(&self, doc: &SyntaxDocument, index: usize) -> bool {
        let node = &doc.nodes[index];
        self.kind.as_deref().map_or(true, |k| k == node.kind)
            && self.field.as_deref().map_or(true, |f| node.field == Some(f))
            && self.text.as_deref().map_or(true, |t| doc.text_of(index) == t)
    }
}

/// Lua handle to one syntax node.
#[derive(Debug, Clone)]
pub(crate) struct LuaNode {
    doc: Arc<SyntaxDocument>,
    index: usize,
}

impl LuaNode {
    fn at(&self, index: usize) -> Self {
        Self {
            doc: Arc::clone(&self.doc),
            index,
        }
    }

    fn record(&self) -> &NodeRecord {
        &self.doc.nodes[self.index]
    }
}

impl UserData for LuaNode {
    fn add_methods<M: UserDataMethods<Self>>(methods: &mut M) {
        methods.add_method("kind", |_, this, ()| Ok(this.record().kind));

        methods.add_method("text", |_, this, ()| {
            Ok(this.doc.text_of(this.index).to_string())
        });

        methods.add_method("range", |lua, this, ()| {
            let range = lua.create_table()?;
            range.set("start", this.record().start)?;
            range.set("end", this.record().end)?;
            Ok(range)
        });

        methods.add_method("is_named", |_, this, ()| Ok(this.record().named));

        methods.add_method("field_name", |_, this, ()| Ok(this.record().field));

        methods.add_method("children", |_, this, ()| {
            Ok(this
                .record()
                .children
                .iter()
                .map(|&c| this.at(c))
                .collect::<Vec<_>>())
        });

        methods.add_method("named_children", |_, this, ()| {
            Ok(this
                .record()
                .children
                .iter()
                .filter(|&&c| this.doc.nodes[c].named)
                .map(|&c| this.at(c))
                .collect::<Vec<_>>())
        });

        methods.add_method("parent", |_, this, ()| {
            Ok(this.record().parent.map(|p| this.at(p)))
        });

        methods.add_method("field", |_, this, name: String| {
            Ok(this
                .record()
                .children
                .iter()
                .find(|&&c| this.doc.nodes[c].field == Some(name.as_str()))
                .map(|&c| this.at(c)))
        });

        methods.add_method("find", |_, this, query: Value| {
            let query = NodeQuery::from_lua(query)?;
            Ok(this
                .doc
                .descendants(this.index)
                .find(|&i| query.matches(&this.doc, i))
                .map(|i| this.at(i)))
        });

        methods.add_method("find_all", |_, this, query: Value| {
            let query = NodeQuery::from_lua(query)?;
            Ok(this
                .doc
                .descendants(this.index)
                .filter(|&i| query.matches(&this.doc, i))
                .map(|i| this.at(i))
                .collect::<Vec<_>>())
        });

        methods.add_method("replace", |_, this, text: String| {
            let node = this.record();
            this.doc.push_edit(TextEdit::new(node.start, node.end, text));
            Ok(())
        });

        methods.add_method("insert_before", |_, this, text: String| {
            this.doc.push_edit(TextEdit::insert(this.record().start, text));
            Ok(())
        });

        methods.add_method("insert_after", |_, this, text: String| {
            this.doc.push_edit(TextEdit::insert(this.record().end, text));
            Ok(())
        });

        methods.add_meta_method(MetaMethod::ToString, |_, this, ()| {
            let node = this.record();
            Ok(format!("{} [{}..{}]", node.kind, node.start, node.end))
        });

        methods.add_meta_method(MetaMethod::Eq, |_, this, other: AnyUserData| {
            Ok(other.borrow::<LuaNode>().is_ok_and(|other| {
                Arc::ptr_eq(&this.doc, &other.doc) && this.index == other.index
            }))
        });
    }
}
