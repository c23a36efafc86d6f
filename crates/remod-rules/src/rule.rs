//! Compiled rule sets and how they rewrite one file.

use crate::error::RuleError;
use crate::lang::RuleLanguage;
use ast_grep_config::{CombinedScan, RuleConfig, SerializableRuleConfig};
use ast_grep_core::tree_sitter::StrDoc;
use ast_grep_core::{AstGrep, NodeMatch};
use remod_adapter::{apply_edits, AdapterError, Dialect, TextEdit};
use serde::Deserialize;
use std::cmp::Reverse;
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;
use tracing::trace;

type Match<'r> = NodeMatch<'r, StrDoc<RuleLanguage>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Hint,
    Info,
    Warning,
    Error,
}

impl Severity {
    /// `None` for rules switched off.
    fn from_config(severity: &ast_grep_config::Severity) -> Option<Self> {
        match severity {
            ast_grep_config::Severity::Hint => Some(Self::Hint),
            ast_grep_config::Severity::Info => Some(Self::Info),
            ast_grep_config::Severity::Warning => Some(Self::Warning),
            ast_grep_config::Severity::Error => Some(Self::Error),
            _ => None,
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Hint => "hint",
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
        })
    }
}

/// A reported match of a rule that carries a `message`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Finding {
    pub rule: String,
    pub severity: Severity,
    pub message: String,
    pub line: usize,
    pub column: usize,
}

impl Finding {
    fn of(rule: &RuleConfig<RuleLanguage>, matched: &Match<'_>) -> Option<Self> {
        if rule.message.is_empty() {
            return None;
        }
        let severity = Severity::from_config(&rule.severity)?;
        let node = matched.get_node();
        let start = node.start_pos();
        Some(Self {
            rule: rule.id.clone(),
            severity,
            message: rule.message.clone(),
            line: start.line() + 1,
            column: start.column(node) + 1,
        })
    }
}

impl std::fmt::Display for Finding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}:{}: {} [{}] {}",
            self.line, self.column, self.severity, self.rule, self.message
        )
    }
}

/// Result of running a rule set over one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleOutcome {
    pub output: String,
    pub findings: Vec<Finding>,
}

/// Every rule of one declaration document.
pub struct RuleSet {
    rules: Vec<RuleConfig<RuleLanguage>>,
}

impl std::fmt::Debug for RuleSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.rules.iter().map(|r| &r.id))
            .finish()
    }
}

impl RuleSet {
    /// Parses and compiles a (possibly multi-document) YAML source.
    ///
    /// ```yaml
    /// id: no-var
    /// language: typescript
    /// severity: warning
    /// message: use let instead of var
    /// rule:
    ///   pattern: var $NAME = $VALUE;
    /// fix: let $NAME = $VALUE;
    /// ---
    /// id: next-rule
    /// ```
    ///
    /// # Errors
    ///
    /// [`RuleError::Parse`] for YAML the rule schema rejects and
    /// [`RuleError::Config`] for rules ast-grep cannot compile.
    pub fn parse(text: &str) -> Result<Self, RuleError> {
        let mut rules = Vec::new();
        for document in serde_yaml::Deserializer::from_str(text) {
            let config = Option::<SerializableRuleConfig<RuleLanguage>>::deserialize(document)
                .map_err(|e| RuleError::Parse(e.to_string()))?;
            let Some(config) = config else {
                continue;
            };
            let id = config.id.clone();
            let rule = RuleConfig::try_from(config, &Default::default())
                .map_err(|e| RuleError::config(&id, &e))?;
            rules.push(rule);
        }
        Ok(Self { rules })
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Rewrites `text` with every rule whose language owns `path`.
    ///
    /// Fixes are ordered by start offset (outermost first); a fix that
    /// overlaps an earlier one is dropped. Survivors are applied back to
    /// front against the original offsets.
    ///
    /// # Errors
    ///
    /// A matcher panic is reported as a runtime failure of this file.
    pub fn apply(&self, path: &Path, text: &str) -> Result<RuleOutcome, AdapterError> {
        let unchanged = || RuleOutcome {
            output: text.to_string(),
            findings: Vec::new(),
        };
        let Some(dialect) = Dialect::for_path(path) else {
            return Ok(unchanged());
        };
        let applicable: Vec<&RuleConfig<RuleLanguage>> = self
            .rules
            .iter()
            .filter(|r| r.language.0 == dialect)
            .collect();
        if applicable.is_empty() {
            return Ok(unchanged());
        }

        let scan = CombinedScan::new(applicable);
        let root = AstGrep::new(text, RuleLanguage(dialect));
        let result = panic::catch_unwind(AssertUnwindSafe(|| scan.scan(&root, true)))
            .map_err(|_| RuleError::Scan(format!("rule matcher panicked on {}", path.display())))?;

        let mut findings = Vec::new();
        let mut candidates: Vec<(usize, usize, String)> = Vec::new();
        for (rule, matched) in &result.diffs {
            trace!(rule = %rule.id, range = ?matched.range(), "rule fix matched");
            findings.extend(Finding::of(rule, matched));
            let Ok(fixers) = rule.get_fixer() else {
                continue;
            };
            if let Some(fixer) = fixers.first() {
                let edit = matched.make_edit(&rule.matcher, fixer);
                let replacement = String::from_utf8(edit.inserted_text)
                    .map_err(|e| AdapterError::InvalidOutput(e.to_string()))?;
                candidates.push((edit.position, edit.position + edit.deleted_length, replacement));
            }
        }
        for (rule, matches) in &result.matches {
            for matched in matches {
                trace!(rule = %rule.id, range = ?matched.range(), "rule matched");
                findings.extend(Finding::of(rule, matched));
            }
        }
        findings.sort_by_key(|f| (f.line, f.column));

        candidates.sort_by_key(|&(start, end, _)| (start, Reverse(end)));
        let mut kept: Vec<TextEdit> = Vec::with_capacity(candidates.len());
        for (start, end, replacement) in candidates {
            if kept.last().is_some_and(|k| start < k.end) {
                continue;
            }
            kept.push(TextEdit::new(start, end, replacement));
        }

        Ok(RuleOutcome {
            output: apply_edits(text, kept)?,
            findings,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn apply(rules: &str, path: &str, text: &str) -> RuleOutcome {
        RuleSet::parse(rules)
            .expect("rules compile")
            .apply(Path::new(path), text)
            .expect("apply")
    }

    // ─── Matching ───

    #[test]
    fn metavariable_binds_whole_expression() {
        let rules = "id: log\nlanguage: ts\nrule:\n  pattern: console.log($ARG)\nfix: logger.debug($ARG)\n";
        let out = apply(rules, "a.ts", "console.log(a + b);\nconsole.log(user.name);\n");
        assert_eq!(out.output, "logger.debug(a + b);\nlogger.debug(user.name);\n");
        assert!(out.findings.is_empty());
    }

    #[test]
    fn string_literals_are_not_code() {
        let rules = "id: log\nlanguage: ts\nrule:\n  pattern: console.log($ARG)\nfix: logger.debug($ARG)\n";
        let text = "const s = \"console.log(x)\";\n// console.log(y)\nconsole.log(z);\n";
        let out = apply(rules, "a.ts", text);
        assert_eq!(
            out.output,
            "const s = \"console.log(x)\";\n// console.log(y)\nlogger.debug(z);\n"
        );
    }

    #[test]
    fn kind_only_rule() {
        let rules = "id: drop-debugger\nlanguage: ts\nrule:\n  kind: debugger_statement\nfix: \"\"\n";
        let out = apply(rules, "a.ts", "debugger;\nlet a = 1;\n");
        assert_eq!(out.output, "\nlet a = 1;\n");
    }

    #[test]
    fn inside_limits_scope() {
        let rules = "\
id: p
language: python
rule:
  pattern: print($X)
  inside:
    kind: function_definition
    stopBy: end
fix: log($X)
";
        let out = apply(rules, "m.py", "print(a)\ndef f():\n    print(b)\n");
        assert_eq!(out.output, "print(a)\ndef f():\n    log(b)\n");
    }

    #[test]
    fn overlapping_fixes_keep_outermost() {
        let rules = "id: wrap\nlanguage: ts\nrule:\n  pattern: foo($A)\nfix: bar($A)\n";
        let out = apply(rules, "a.ts", "foo(foo(x));");
        assert_eq!(out.output, "bar(foo(x));");
    }

    #[test]
    fn other_language_is_untouched() {
        let rules = "id: log\nlanguage: python\nrule:\n  pattern: print($X)\nfix: log($X)\n";
        assert_eq!(apply(rules, "a.ts", "print(a)").output, "print(a)");
        assert_eq!(apply(rules, "README", "print(a)").output, "print(a)");
    }

    #[test]
    fn findings_report_position() {
        let rules = "\
id: no-debugger
language: ts
severity: warning
message: remove debugger
rule:
  kind: debugger_statement
---
id: silent
language: ts
rule:
  kind: if_statement
";
        let text = "let a = 1;\nif (a) {\n  debugger;\n}\n";
        let out = apply(rules, "a.ts", text);
        assert_eq!(out.output, text);
        assert_eq!(
            out.findings,
            vec![Finding {
                rule: "no-debugger".into(),
                severity: Severity::Warning,
                message: "remove debugger".into(),
                line: 3,
                column: 3,
            }]
        );
        assert_eq!(out.findings[0].to_string(), "3:3: warning [no-debugger] remove debugger");
    }

    // ─── Compilation ───

    #[test]
    fn multiple_documents_and_blank_ones() {
        let rules = RuleSet::parse(
            "---\nid: a\nlanguage: rust\nrule:\n  kind: macro_invocation\n---\nid: b\nlanguage: ts\nrule:\n  kind: debugger_statement\n---\n",
        )
        .expect("parse");
        assert_eq!(rules.len(), 2);
        assert!(RuleSet::parse("").expect("empty").is_empty());
    }

    #[test]
    fn schema_errors_are_parse_errors() {
        let err = RuleSet::parse("id: a\nlanguage: cobol\nrule:\n  pattern: x\n").expect_err("language");
        assert!(matches!(err, RuleError::Parse(ref m) if m.contains("cobol")), "{err:?}");
        let err = RuleSet::parse("id: a\nrule:\n  pattern: x\n").expect_err("no language");
        assert!(matches!(err, RuleError::Parse(ref m) if m.contains("language")), "{err:?}");
    }

    #[test]
    fn rule_without_matcher_is_config_error() {
        let err = RuleSet::parse("id: empty\nlanguage: ts\nrule: {}\n").expect_err("no matcher");
        assert!(matches!(err, RuleError::Config { ref id, .. } if id == "empty"), "{err:?}");
    }
}
