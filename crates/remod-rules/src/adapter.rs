//! The declarative-rule engine.

use crate::error::RuleError;
use crate::rule::{RuleSet, Severity};
use parking_lot::Mutex;
use remod_adapter::{AdapterError, ConsoleSink, EngineAdapter, Invocation};
use remod_event::ConsoleKind;
use remod_types::{EngineKind, FileCommand};
use std::sync::Arc;
use tracing::debug;

/// Applies YAML rule declarations. Rules are data, so no sandbox is
/// involved; the compiled set is cached per transformation source.
#[derive(Debug, Default)]
pub struct DeclarativeRuleAdapter {
    compiled: Mutex<Option<(String, Arc<RuleSet>)>>,
}

impl DeclarativeRuleAdapter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn rules_for(&self, source: &str) -> Result<Arc<RuleSet>, RuleError> {
        let mut compiled = self.compiled.lock();
        if let Some((cached, rules)) = compiled.as_ref() {
            if cached == source {
                return Ok(Arc::clone(rules));
            }
        }
        let rules = Arc::new(RuleSet::parse(source)?);
        debug!(rules = rules.len(), "compiled rule set");
        *compiled = Some((source.to_string(), Arc::clone(&rules)));
        Ok(rules)
    }
}

fn console_kind(severity: Severity) -> ConsoleKind {
    match severity {
        Severity::Error => ConsoleKind::Error,
        Severity::Warning => ConsoleKind::Warn,
        Severity::Info | Severity::Hint => ConsoleKind::Info,
    }
}

impl EngineAdapter for DeclarativeRuleAdapter {
    fn kind(&self) -> EngineKind {
        EngineKind::DeclarativeRule
    }

    fn run(
        &self,
        invocation: &Invocation<'_>,
        console: &dyn ConsoleSink,
    ) -> Result<Vec<FileCommand>, AdapterError> {
        let rules = self.rules_for(invocation.source)?;
        let outcome = rules.apply(invocation.path, invocation.data)?;
        for finding in &outcome.findings {
            console.emit(
                console_kind(finding.severity),
                &format!("{}:{finding}", invocation.path.display()),
            );
        }
        Ok(invocation.commands_for(Vec::new(), &outcome.output))
    }
}
