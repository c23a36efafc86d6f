//! Engine identifiers.

use serde::{Deserialize, Serialize};

/// The four interchangeable transformation strategies.
///
/// A worker lane handles exactly one kind for its whole life.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EngineKind {
    /// Entry function over a parsed syntax tree with match/replace helpers.
    PatternMatch,
    /// Entry function over a mutable source-file handle.
    StructuralMorph,
    /// Rule declaration, not executable code.
    DeclarativeRule,
    /// Workflow over the whole file set, invoked once per run.
    OrchestrationWorkflow,
}

impl EngineKind {
    pub const ALL: [EngineKind; 4] = [
        Self::PatternMatch,
        Self::StructuralMorph,
        Self::DeclarativeRule,
        Self::OrchestrationWorkflow,
    ];

    /// Returns the kebab-case name.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PatternMatch => "pattern-match",
            Self::StructuralMorph => "structural-morph",
            Self::DeclarativeRule => "declarative-rule",
            Self::OrchestrationWorkflow => "orchestration-workflow",
        }
    }

    /// Whether the engine runs once per run instead of once per file.
    #[must_use]
    pub fn is_per_run(&self) -> bool {
        matches!(self, Self::OrchestrationWorkflow)
    }
}

impl std::fmt::Display for EngineKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EngineKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| format!("unknown engine kind: {s}"))
    }
}
