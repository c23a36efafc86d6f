//! Orchestrator runs over real worker lanes.

use remod_adapter::testing::RecordingConsole;
use remod_adapter::{FormatError, Formatter, NullConsole};
use remod_event::{ConsoleEvent, ConsoleKind, ExecutionRequest};
use remod_lua::SandboxOptions;
use remod_runtime::config::ConfigLoader;
use remod_runtime::{Orchestrator, OrchestratorError, RunSpec, CANCELLED};
use remod_types::{ArgumentDescriptor, ArgumentSchema, EngineKind, FileCommand, RawValue};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

const UPPER: &str = "return function(file) return string.upper(file:full_text()) end";

fn files(n: usize) -> Vec<ExecutionRequest> {
    (0..n)
        .map(|i| ExecutionRequest::new(format!("src/f{i}.ts"), format!("let v{i} = {i};")))
        .collect()
}

async fn started(threads: usize, spec: RunSpec) -> Orchestrator {
    let mut orchestrator = Orchestrator::builder().threads(threads).build();
    orchestrator.initialize(spec).await.expect("initialize");
    orchestrator
}

// ─── End to end ───

#[tokio::test]
async fn typed_parameter_across_the_pool() {
    let spec = RunSpec::new(
        EngineKind::PatternMatch,
        r#"
        return function(root, api)
            console.log(api.path)
            local fn = root:find({ kind = "function_declaration" })
            local param = fn:field("parameters"):find({ kind = "identifier", text = "state" })
            param:insert_after(": " .. api.args.type)
        end
        "#,
    )
    .with_args(RawValue::map([("type", RawValue::string("State"))]));
    let mut orchestrator = started(2, spec).await;
    assert_eq!(orchestrator.lane_count(), 2);

    let sink = RecordingConsole::new();
    let report = orchestrator
        .run(
            vec![ExecutionRequest::new("index.ts", "function mapStateToProps(state) {}")],
            &sink,
        )
        .await
        .expect("run");

    let commands = report.commands_for("index.ts").expect("index.ts succeeded");
    assert_eq!(commands.len(), 1);
    match &commands[0] {
        FileCommand::UpdateFile {
            old_data, new_data, ..
        } => {
            assert_eq!(old_data, "function mapStateToProps(state) {}");
            assert_eq!(new_data, "function mapStateToProps(state: State) {}");
        }
        other => panic!("expected updateFile, got {other:?}"),
    }
    assert!(report.failures.is_empty());
    assert_eq!(sink.events(), vec![ConsoleEvent::new(ConsoleKind::Log, "index.ts")]);
    assert_eq!(report.console[0].path, PathBuf::from("index.ts"));

    orchestrator.shutdown().await;
}

#[tokio::test]
async fn every_file_gets_one_outcome() {
    let mut orchestrator = started(3, RunSpec::new(EngineKind::StructuralMorph, UPPER)).await;

    let mut input = files(20);
    input.push(ExecutionRequest::new("src/SAME.ts", "ALREADY UPPER"));
    let report = orchestrator.run(input, &NullConsole).await.expect("run");

    assert_eq!(report.progress.total, 21);
    assert_eq!(report.progress.processed, 21);
    assert_eq!(report.commands.len(), 21);
    assert!(report.failures.is_empty());
    assert_eq!(report.all_commands().count(), 20);
    assert_eq!(report.commands_for("src/SAME.ts"), Some(&[][..]));
    assert_eq!(
        report.commands_for("src/f7.ts").and_then(|c| c[0].new_data()),
        Some("LET V7 = 7;")
    );

    orchestrator.shutdown().await;
}

#[tokio::test]
async fn empty_file_set_is_an_empty_report() {
    let mut orchestrator = started(2, RunSpec::new(EngineKind::StructuralMorph, UPPER)).await;
    let report = orchestrator.run(Vec::new(), &NullConsole).await.expect("run");
    assert!(report.commands.is_empty());
    assert!(report.progress.is_complete());
    orchestrator.shutdown().await;
}

// ─── Failures ───

#[tokio::test]
async fn one_failure_does_not_block_others() {
    let source = r#"
        return function(file)
            if file:path() == "src/f1.ts" then error("cannot handle f1") end
            return "// done"
        end
    "#;
    let mut orchestrator = started(2, RunSpec::new(EngineKind::StructuralMorph, source)).await;
    let report = orchestrator.run(files(4), &NullConsole).await.expect("run");

    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].path, PathBuf::from("src/f1.ts"));
    assert!(report.failures[0].message.contains("cannot handle f1"));
    assert_eq!(report.commands.len(), 3);
    assert!(report.commands_for("src/f1.ts").is_none());

    orchestrator.shutdown().await;
}

#[tokio::test]
async fn timed_out_file_leaves_lane_usable() {
    let source = r#"
        return function(file)
            if file:path() == "loop.ts" then while true do end end
            return "ok"
        end
    "#;
    let mut orchestrator = Orchestrator::builder()
        .threads(1)
        .sandbox(SandboxOptions::default().with_timeout(Duration::from_millis(200)))
        .build();
    orchestrator
        .initialize(RunSpec::new(EngineKind::StructuralMorph, source))
        .await
        .expect("initialize");

    let report = orchestrator
        .run(
            vec![
                ExecutionRequest::new("loop.ts", "x"),
                ExecutionRequest::new("next.ts", "x"),
            ],
            &NullConsole,
        )
        .await
        .expect("run");

    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].path, PathBuf::from("loop.ts"));
    assert_eq!(report.failures[0].message, "timed out");
    assert_eq!(
        report.commands_for("next.ts").and_then(|c| c[0].new_data()),
        Some("ok")
    );

    orchestrator.shutdown().await;
}

#[tokio::test]
async fn function_argument_rejected_before_lanes_start() {
    let mut orchestrator = Orchestrator::builder().threads(4).build();
    let spec = RunSpec::new(EngineKind::PatternMatch, "return function() end").with_args(
        RawValue::map([
            ("name", RawValue::string("x")),
            ("callback", RawValue::Function { name: "cb".into() }),
        ]),
    );

    let err = orchestrator.initialize(spec).await.expect_err("function argument");
    match err {
        OrchestratorError::InvalidArguments(e) => assert_eq!(e.path, "$.callback"),
        other => panic!("expected InvalidArguments, got {other:?}"),
    }
    assert_eq!(orchestrator.lane_count(), 0);
}

#[tokio::test]
async fn schema_defaults_reach_the_sandbox() {
    let schema = ArgumentSchema::new()
        .with(ArgumentDescriptor::string("suffix").with_default("!"))
        .with(ArgumentDescriptor::boolean("shout"));
    let spec = RunSpec::new(
        EngineKind::StructuralMorph,
        r#"return function(file, args)
            local text = file:full_text() .. args.suffix
            if args.shout then text = string.upper(text) end
            return text
        end"#,
    )
    .with_args(RawValue::map([("shout", RawValue::string("true"))]))
    .with_schema(schema);
    let mut orchestrator = started(1, spec).await;

    let report = orchestrator
        .run(vec![ExecutionRequest::new("a.ts", "hi")], &NullConsole)
        .await
        .expect("run");
    assert_eq!(report.all_commands().next().and_then(FileCommand::new_data), Some("HI!"));

    orchestrator.shutdown().await;
}

#[tokio::test]
async fn protocol_misuse_is_reported() {
    let mut orchestrator = Orchestrator::builder().build();
    assert!(matches!(
        orchestrator.run(files(1), &NullConsole).await,
        Err(OrchestratorError::NotInitialized)
    ));

    orchestrator
        .initialize(RunSpec::new(EngineKind::StructuralMorph, UPPER))
        .await
        .expect("initialize");
    assert!(matches!(
        orchestrator
            .initialize(RunSpec::new(EngineKind::StructuralMorph, UPPER))
            .await,
        Err(OrchestratorError::AlreadyInitialized)
    ));

    orchestrator.shutdown().await;
}

// ─── Cancellation ───

#[tokio::test]
async fn cancel_before_run_fails_every_file() {
    let mut orchestrator = started(2, RunSpec::new(EngineKind::StructuralMorph, UPPER)).await;
    orchestrator.cancel_handle().cancel();

    let report = orchestrator.run(files(3), &NullConsole).await.expect("run");
    assert!(report.commands.is_empty());
    assert_eq!(report.failures.len(), 3);
    assert!(report.failures.iter().all(|f| f.message == CANCELLED));
    assert!(report.progress.is_complete());

    orchestrator.shutdown().await;
}

#[tokio::test]
async fn cancel_mid_run_finishes_in_flight_file() {
    let source = r#"return function(file) console.log(file:path()); return "done" end"#;
    let mut orchestrator = started(1, RunSpec::new(EngineKind::StructuralMorph, source)).await;

    let handle = orchestrator.cancel_handle();
    let sink = move |_kind: ConsoleKind, _message: &str| handle.cancel();
    let report = orchestrator.run(files(5), &sink).await.expect("run");

    assert_eq!(report.commands.len(), 1);
    assert_eq!(report.commands[0].path, PathBuf::from("src/f0.ts"));
    assert_eq!(report.failures.len(), 4);
    assert!(report.failures.iter().all(|f| f.message == CANCELLED));
    assert_eq!(report.progress.processed, 5);

    orchestrator.shutdown().await;
}

// ─── Engines ───

#[tokio::test]
async fn workflow_runs_once_over_the_set() {
    let source = r#"
        return {
            include_patterns = { "**/*.ts" },
            handle_data = function(api, path, data)
                return { kind = "upsertData", data = string.upper(data) }
            end,
        }
    "#;
    let mut orchestrator = started(4, RunSpec::new(EngineKind::OrchestrationWorkflow, source)).await;
    assert_eq!(orchestrator.lane_count(), 1);

    let input = vec![
        ExecutionRequest::new("proj/src/a.ts", "a"),
        ExecutionRequest::new("proj/src/b.ts", "b"),
        ExecutionRequest::new("proj/README.md", "readme"),
    ];
    let report = orchestrator.run(input, &NullConsole).await.expect("run");

    assert_eq!(report.progress.total, 1);
    assert_eq!(report.commands.len(), 1);
    assert_eq!(report.commands[0].path, PathBuf::from("proj"));
    let paths: Vec<&Path> = report.all_commands().map(FileCommand::primary_path).collect();
    assert_eq!(paths, [Path::new("proj/src/a.ts"), Path::new("proj/src/b.ts")]);

    orchestrator.shutdown().await;
}

#[tokio::test]
async fn declarative_rules_through_the_pool() {
    let rules = "\
id: no-var
language: ts
severity: warning
message: prefer let
rule:
  pattern: var $X = $Y;
fix: let $X = $Y;
";
    let mut orchestrator = started(2, RunSpec::new(EngineKind::DeclarativeRule, rules)).await;
    let sink = RecordingConsole::new();
    let report = orchestrator
        .run(
            vec![
                ExecutionRequest::new("a.ts", "var a = 1;"),
                ExecutionRequest::new("b.py", "var = 1"),
            ],
            &sink,
        )
        .await
        .expect("run");

    assert_eq!(
        report.commands_for("a.ts").and_then(|c| c[0].new_data()),
        Some("let a = 1;")
    );
    assert_eq!(report.commands_for("b.py"), Some(&[][..]));
    assert_eq!(sink.messages(), vec!["a.ts:1:1: warning [no-var] prefer let".to_string()]);

    orchestrator.shutdown().await;
}

// ─── Collaborators and config ───

struct Semicolon;

impl Formatter for Semicolon {
    fn format(&self, _path: &Path, text: &str) -> Result<String, FormatError> {
        Ok(format!("{};", text.trim_end_matches(';')))
    }
}

#[tokio::test]
async fn formatter_runs_only_when_enabled() {
    for (format, expected) in [(true, "LET A = 1;"), (false, "LET A = 1")] {
        let mut orchestrator = Orchestrator::builder()
            .threads(1)
            .formatter(Arc::new(Semicolon))
            .build();
        orchestrator
            .initialize(RunSpec::new(EngineKind::StructuralMorph, UPPER).with_format(format))
            .await
            .expect("initialize");

        let report = orchestrator
            .run(vec![ExecutionRequest::new("a.ts", "let a = 1")], &NullConsole)
            .await
            .expect("run");
        assert_eq!(report.all_commands().next().and_then(FileCommand::new_data), Some(expected));
        orchestrator.shutdown().await;
    }
}

/// Panics on one path, mid-file, after the transformation has succeeded.
struct PanicsOnF1;

impl Formatter for PanicsOnF1 {
    fn format(&self, path: &Path, text: &str) -> Result<String, FormatError> {
        if path == Path::new("src/f1.ts") {
            panic!("formatter crashed on {}", path.display());
        }
        Ok(text.to_string())
    }
}

#[tokio::test]
async fn formatter_panic_still_ends_the_file() {
    let mut orchestrator = Orchestrator::builder()
        .threads(1)
        .formatter(Arc::new(PanicsOnF1))
        .build();
    orchestrator
        .initialize(RunSpec::new(EngineKind::StructuralMorph, UPPER).with_format(true))
        .await
        .expect("initialize");

    let report = tokio::time::timeout(
        Duration::from_secs(10),
        orchestrator.run(files(3), &NullConsole),
    )
    .await
    .expect("run finishes")
    .expect("run");

    assert!(report.progress.is_complete());
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].path, PathBuf::from("src/f1.ts"));
    assert!(report.failures[0].message.contains("formatter crashed"));
    assert_eq!(
        report.commands_for("src/f2.ts").and_then(|c| c[0].new_data()),
        Some("LET V2 = 2;")
    );

    orchestrator.shutdown().await;
}

#[tokio::test]
async fn orchestrator_from_project_config() {
    let project = TempDir::new().expect("tempdir");
    let config_dir = project.path().join(".remod");
    std::fs::create_dir_all(&config_dir).expect("mkdir");
    std::fs::write(
        config_dir.join("config.toml"),
        "[pool]\nthreads = 2\n\n[sandbox]\ntimeout_ms = 150\n\n[format]\nenabled = false\n",
    )
    .expect("write config");

    let config = ConfigLoader::new()
        .skip_env_vars()
        .with_project_root(project.path())
        .load()
        .expect("load");
    let mut orchestrator = Orchestrator::from_config(&config);
    orchestrator
        .initialize(RunSpec::new(
            EngineKind::StructuralMorph,
            "return function(file) if file:path() == 'slow.ts' then while true do end end return 'x' end",
        ))
        .await
        .expect("initialize");
    assert_eq!(orchestrator.lane_count(), 2);

    let report = orchestrator
        .run(
            vec![
                ExecutionRequest::new("slow.ts", "a"),
                ExecutionRequest::new("fast.ts", "a"),
            ],
            &NullConsole,
        )
        .await
        .expect("run");
    assert_eq!(report.failures[0].message, "timed out");
    assert!(matches!(
        report.commands_for("fast.ts").map(|c| &c[0]),
        Some(FileCommand::UpdateFile {
            format_with_prettier: false,
            ..
        })
    ));

    orchestrator.shutdown().await;
}
