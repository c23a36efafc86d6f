//! Rule languages backed by the dialect table.

use ast_grep_core::matcher::{Pattern, PatternBuilder, PatternError};
use ast_grep_core::tree_sitter::{LanguageExt, StrDoc, TSLanguage};
use ast_grep_core::Language;
use remod_adapter::Dialect;
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::borrow::Cow;

/// A [`Dialect`] as ast-grep sees it.
///
/// Deserializes from any name [`Dialect::from_name`] accepts, so rule
/// documents may say `ts`, `typescript`, `py` and so on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuleLanguage(pub Dialect);

impl RuleLanguage {
    /// Python and Rust do not allow `$` in identifiers, so metavariables
    /// are rewritten to this character before the pattern is parsed.
    const EXPANDO: char = 'µ';
}

impl Language for RuleLanguage {
    fn kind_to_id(&self, kind: &str) -> u16 {
        self.get_ts_language().id_for_node_kind(kind, true)
    }

    fn field_to_id(&self, field: &str) -> Option<u16> {
        self.get_ts_language()
            .field_id_for_name(field)
            .map(|id| id.get())
    }

    fn expando_char(&self) -> char {
        match self.0 {
            Dialect::TypeScript | Dialect::Tsx => '$',
            Dialect::Python | Dialect::Rust => Self::EXPANDO,
        }
    }

    fn pre_process_pattern<'q>(&self, query: &'q str) -> Cow<'q, str> {
        let expando = self.expando_char();
        if expando == '$' {
            Cow::Borrowed(query)
        } else {
            Cow::Owned(replace_sigils(query, expando))
        }
    }

    fn build_pattern(&self, builder: &PatternBuilder) -> Result<Pattern, PatternError> {
        builder.build(|src| StrDoc::try_new(src, *self))
    }
}

impl LanguageExt for RuleLanguage {
    fn get_ts_language(&self) -> TSLanguage {
        self.0.language()
    }
}

/// Rewrites `$NAME`, `$$NAME`, `$$$NAME` and a bare `$$$` to `expando`.
fn replace_sigils(query: &str, expando: char) -> String {
    let mut out = String::with_capacity(query.len());
    let mut dollars = 0;
    for c in query.chars() {
        if c == '$' {
            dollars += 1;
            continue;
        }
        let meta = c.is_ascii_uppercase() || c == '_' || dollars == 3;
        out.extend(std::iter::repeat(if meta { expando } else { '$' }).take(dollars));
        dollars = 0;
        out.push(c);
    }
    out.extend(std::iter::repeat(if dollars == 3 { expando } else { '$' }).take(dollars));
    out
}

impl<'de> Deserialize<'de> for RuleLanguage {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        Dialect::from_name(&name)
            .map(Self)
            .ok_or_else(|| de::Error::custom(format!("unknown language '{name}'")))
    }
}

impl Serialize for RuleLanguage {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.0.name())
    }
}
