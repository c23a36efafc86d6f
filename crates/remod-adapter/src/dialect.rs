//! Extension → grammar dispatch.
//!
//! Engines that parse their target pick a grammar from the target path's
//! extension before calling the transformation's entry point.
//!
//! | Dialect | Names | Extensions |
//! |---------|-------|------------|
//! | `TypeScript` | `typescript`, `ts` | `ts`, `mts`, `cts` |
//! | `Tsx` | `tsx`, `javascript`, `js`, `jsx` | `tsx`, `js`, `jsx`, `mjs`, `cjs` |
//! | `Python` | `python`, `py` | `py`, `pyi` |
//! | `Rust` | `rust`, `rs` | `rs` |
//!
//! JavaScript sources are parsed with the TSX grammar, which accepts JSX and
//! plain JavaScript alike.

use crate::error::AdapterError;
use std::path::Path;
use tree_sitter::{Language, Parser, Tree};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dialect {
    TypeScript,
    Tsx,
    Python,
    Rust,
}

impl Dialect {
    pub const ALL: [Dialect; 4] = [Self::TypeScript, Self::Tsx, Self::Python, Self::Rust];

    /// Canonical name, as exposed to transformations.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::TypeScript => "typescript",
            Self::Tsx => "tsx",
            Self::Python => "python",
            Self::Rust => "rust",
        }
    }

    /// Resolves a language name as written in transformations and rules.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "typescript" | "ts" => Some(Self::TypeScript),
            "tsx" | "javascript" | "js" | "jsx" => Some(Self::Tsx),
            "python" | "py" => Some(Self::Python),
            "rust" | "rs" => Some(Self::Rust),
            _ => None,
        }
    }

    /// File extensions handled by this dialect.
    #[must_use]
    pub fn extensions(&self) -> &'static [&'static str] {
        match self {
            Self::TypeScript => &["ts", "mts", "cts"],
            Self::Tsx => &["tsx", "js", "jsx", "mjs", "cjs"],
            Self::Python => &["py", "pyi"],
            Self::Rust => &["rs"],
        }
    }

    /// Picks the dialect for a target path.
    #[must_use]
    pub fn for_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|d| d.extensions().contains(&ext.as_str()))
    }

    /// Whether `path` has one of this dialect's extensions.
    #[must_use]
    pub fn handles(&self, path: &Path) -> bool {
        Self::for_path(path) == Some(*self)
    }

    #[must_use]
    pub fn language(&self) -> Language {
        match self {
            Self::TypeScript => tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into(),
            Self::Tsx => tree_sitter_typescript::LANGUAGE_TSX.into(),
            Self::Python => tree_sitter_python::LANGUAGE.into(),
            Self::Rust => tree_sitter_rust::LANGUAGE.into(),
        }
    }

    /// Parses `text` with a fresh parser.
    ///
    /// Syntax errors do not fail the parse; tree-sitter keeps them as error
    /// nodes. Only a parser that refuses the grammar or produces no tree
    /// yields [`AdapterError::Parse`].
    pub fn parse(&self, path: &Path, text: &str) -> Result<Tree, AdapterError> {
        let mut parser = Parser::new();
        parser
            .set_language(&self.language())
            .map_err(|_| AdapterError::Parse {
                path: path.to_path_buf(),
            })?;
        parser.parse(text, None).ok_or_else(|| AdapterError::Parse {
            path: path.to_path_buf(),
        })
    }
}

impl std::fmt::Display for Dialect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
