//! EngineKind → adapter construction.

use remod_adapter::EngineAdapter;
use remod_lua::{PatternMatchAdapter, SandboxOptions, StructuralMorphAdapter, WorkflowAdapter};
use remod_rules::DeclarativeRuleAdapter;
use remod_types::EngineKind;

/// Builds a fresh adapter for `kind`. Each lane owns its own instance.
#[must_use]
pub fn adapter_for(kind: EngineKind, options: SandboxOptions) -> Box<dyn EngineAdapter> {
    match kind {
        EngineKind::PatternMatch => Box::new(PatternMatchAdapter::new(options)),
        EngineKind::StructuralMorph => Box::new(StructuralMorphAdapter::new(options)),
        EngineKind::DeclarativeRule => Box::new(DeclarativeRuleAdapter::new()),
        EngineKind::OrchestrationWorkflow => Box::new(WorkflowAdapter::new(options)),
    }
}
