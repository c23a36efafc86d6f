//! Declarative rewrite rules.
//!
//! A transformation for this engine is a YAML document of one or more
//! ast-grep rules. Each rule names a language, a matcher and an optional
//! fix; matching is structural, so patterns never hit text inside string
//! literals or comments and a metavariable stands for a whole node:
//!
//! ```
//! use remod_rules::RuleSet;
//! use std::path::Path;
//!
//! let rules = RuleSet::parse(
//!     "id: log\nlanguage: ts\nrule:\n  pattern: console.log($$$ARGS)\nfix: logger.debug($$$ARGS)\n",
//! )?;
//! let outcome = rules.apply(Path::new("a.ts"), "console.log(user, 1 + 2);").expect("apply");
//! assert_eq!(outcome.output, "logger.debug(user, 1 + 2);");
//! # Ok::<(), remod_rules::RuleError>(())
//! ```

mod adapter;
mod error;
mod lang;
mod rule;

pub use adapter::DeclarativeRuleAdapter;
pub use error::RuleError;
pub use lang::RuleLanguage;
pub use rule::{Finding, RuleOutcome, RuleSet, Severity};
