mod common;
use crate::common::{init_tracing, runtime_with, with_timeout, FakeContextFactory, TestResult};

use std::fs;
use std::sync::Arc;

use dagrun_test_utils::builders::{ConfigFileBuilder, TaskConfigBuilder};
use tempfile::tempdir;

use dagrun::config::{load_and_validate, ConfigFile};
use dagrun::context::HostContextFactory;
use dagrun::errors::DagError;
use dagrun::{NodeStatus, OutputStatus, RunState, Runtime};

const PIPELINE: &str = r#"
[run]
entry = "summarize"
concurrency = 2
timeout = "30s"

[task.fetch]
cmd = "fetch-data"

[task.summarize]
after = ["fetch"]
prompt = "Summarise {{ fetch.stdout }}"
model = "fast"
output = "out/summary.md"

[task.summarize.capture]
verdict = '^VERDICT: (\w+)$'
"#;

fn pipeline() -> ConfigFile {
    ConfigFileBuilder::new()
        .entry("summarize")
        .concurrency(2)
        .with_task("fetch", TaskConfigBuilder::shell("fetch-data").build())
        .with_task(
            "summarize",
            TaskConfigBuilder::prompt("Summarise {{ fetch.stdout }}")
                .after("fetch")
                .model("fast")
                .output("out/summary.md")
                .capture("verdict", r"^VERDICT: (\w+)$")
                .build(),
        )
        .build()
}

#[test]
fn loads_a_task_file_from_disk() -> TestResult {
    init_tracing();
    let dir = tempdir()?;
    let path = dir.path().join("Dagrun.toml");
    fs::write(&path, PIPELINE)?;

    let cfg = load_and_validate(&path)?;

    assert_eq!(cfg.task.len(), 2);
    assert_eq!(cfg.task["summarize"].after, vec!["fetch".to_string()]);
    let run = cfg.run_config("summarize")?;
    assert_eq!(run.concurrency, 2);
    assert_eq!(run.timeout, Some(std::time::Duration::from_secs(30)));

    let ids: Vec<String> = cfg.task_definitions()?.iter().map(|d| d.id.clone()).collect();
    assert_eq!(ids, ["fetch", "summarize"]);
    Ok(())
}

#[test]
fn missing_task_file_is_a_config_error() -> TestResult {
    let dir = tempdir()?;
    let path = dir.path().join("nope.toml");

    let err = load_and_validate(&path).unwrap_err();

    assert!(matches!(err, DagError::ConfigError(ref msg) if msg.contains("nope.toml")), "{err}");
    Ok(())
}

#[test]
fn config_with_a_cycle_fails_at_graph_build() -> TestResult {
    let cfg = ConfigFileBuilder::new()
        .with_task("a", TaskConfigBuilder::shell("x").after("b").build())
        .with_task("b", TaskConfigBuilder::shell("y").after("a").build())
        .build();

    let err = Runtime::new(cfg.task_definitions()?, Arc::new(FakeContextFactory::new()))
        .err()
        .expect("cycle must be rejected");
    assert!(matches!(err, DagError::DagCycle(_)));
    Ok(())
}

#[tokio::test]
async fn shell_output_flows_into_the_prompt() -> TestResult {
    let factory = FakeContextFactory::new()
        .with_shell("fetch-data", "rows: 3\n", 0)
        .with_model_answer("Summarise", "Looks fine.\nVERDICT: pass\n");
    let cfg = pipeline();
    let mut rt = runtime_with(cfg.task_definitions()?, factory.clone());

    let status = with_timeout(rt.run(cfg.run_config("summarize")?)).await?;

    assert_eq!(status.state, RunState::Completed);
    assert_eq!(factory.commands(), [("fetch".to_string(), "fetch-data".to_string())]);

    let calls = factory.model_calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].task, "summarize");
    assert_eq!(calls[0].prompt, "Summarise rows: 3");
    assert_eq!(calls[0].model_hint.as_deref(), Some("fast"));

    let fetch = status.output("fetch").expect("fetch output");
    assert_eq!(fetch.artifact("stdout"), Some("rows: 3"));
    assert_eq!(fetch.artifact("exit_code"), Some("0"));

    let summary = status.output("summarize").expect("summarize output");
    assert_eq!(summary.artifact("verdict"), Some("pass"));
    assert_eq!(summary.artifact("output"), Some("out/summary.md"));
    assert_eq!(summary.artifact("prompt"), Some("Summarise rows: 3"));
    assert_eq!(
        factory.fs().contents("out/summary.md").as_deref(),
        Some("Looks fine.\nVERDICT: pass\n")
    );
    assert_eq!(factory.snapshot_for("summarize"), Some(vec!["fetch".to_string()]));
    Ok(())
}

#[tokio::test]
async fn prompt_file_is_rendered_before_the_inline_prompt() -> TestResult {
    let factory = FakeContextFactory::new()
        .with_file("prompts/review.md", "Review this:\n{{fetch.stdout}}\n\n")
        .with_shell("fetch-data", "diff --git a b\n", 0);
    let cfg = ConfigFileBuilder::new()
        .with_task("fetch", TaskConfigBuilder::shell("fetch-data").build())
        .with_task(
            "review",
            TaskConfigBuilder::prompt("Be brief.")
                .prompt_file("prompts/review.md")
                .after("fetch")
                .build(),
        )
        .build();
    let mut rt = runtime_with(cfg.task_definitions()?, factory.clone());

    let status = with_timeout(rt.run(cfg.run_config("review")?)).await?;

    assert_eq!(status.state, RunState::Completed);
    let prompt = "Review this:\ndiff --git a b\n\nBe brief.";
    assert_eq!(factory.model_calls()[0].prompt, prompt);
    let review = status.output("review").expect("review output");
    assert_eq!(review.artifact("response"), Some(format!("echo: {prompt}").as_str()));
    Ok(())
}

#[tokio::test]
async fn missing_prompt_file_fails_the_task() -> TestResult {
    let cfg = ConfigFileBuilder::new()
        .with_task(
            "review",
            TaskConfigBuilder::prompt("x").prompt_file("absent.md").build(),
        )
        .build();
    let factory = FakeContextFactory::new();
    let mut rt = runtime_with(cfg.task_definitions()?, factory.clone());

    let status = with_timeout(rt.run(cfg.run_config("review")?)).await?;

    let review = status.output("review").expect("review output");
    assert_eq!(review.status, OutputStatus::Error);
    assert!(review.error.as_deref().unwrap_or("").contains("absent.md"), "{review:?}");
    assert!(factory.model_calls().is_empty());
    Ok(())
}

#[tokio::test]
async fn non_zero_exit_fails_and_skips_dependents() -> TestResult {
    let factory = FakeContextFactory::new().with_shell("make", "", 2);
    let cfg = ConfigFileBuilder::new()
        .with_task("build", TaskConfigBuilder::shell("make").build())
        .with_task("ship", TaskConfigBuilder::shell("deploy").after("build").build())
        .build();
    let mut rt = runtime_with(cfg.task_definitions()?, factory.clone());

    let status = with_timeout(rt.run(cfg.run_config("ship")?)).await?;

    let build = status.output("build").expect("build output");
    assert_eq!(build.error.as_deref(), Some("command exited with code 2: make failed"));
    assert_eq!(rt.node_state("ship"), Some(NodeStatus::Skipped));
    assert_eq!(factory.commands().len(), 1);
    assert_eq!(status.state, RunState::Failed);
    Ok(())
}

#[tokio::test]
async fn model_failure_is_a_task_failure() -> TestResult {
    let cfg = ConfigFileBuilder::new()
        .with_task("ask", TaskConfigBuilder::prompt("FAIL_MODEL please").build())
        .build();
    let mut rt = runtime_with(cfg.task_definitions()?, FakeContextFactory::new());

    let status = with_timeout(rt.run(cfg.run_config("ask")?)).await?;

    let ask = status.output("ask").expect("ask output");
    assert_eq!(ask.status, OutputStatus::Error);
    assert!(ask.error.as_deref().unwrap_or("").contains("model refused"), "{ask:?}");
    Ok(())
}

#[tokio::test]
async fn configured_retries_rerun_the_command() -> TestResult {
    let factory = FakeContextFactory::new().with_shell("flaky", "", 1);
    let cfg = ConfigFileBuilder::new()
        .with_task("t", TaskConfigBuilder::shell("flaky").retries(2, "1ms").build())
        .build();
    let mut rt = runtime_with(cfg.task_definitions()?, factory.clone());

    let status = with_timeout(rt.run(cfg.run_config("t")?)).await?;

    assert_eq!(status.output("t").map(|o| o.attempts), Some(3));
    assert_eq!(factory.commands().len(), 3);
    Ok(())
}

#[cfg(unix)]
#[tokio::test]
async fn host_context_runs_real_commands_in_the_config_dir() -> TestResult {
    let dir = tempdir()?;
    let cfg = ConfigFileBuilder::new()
        .with_task("hello", TaskConfigBuilder::shell("printf hello").build())
        .with_task(
            "greet",
            TaskConfigBuilder::shell("echo {{hello.stdout}} world")
                .after("hello")
                .output("out/greeting.txt")
                .capture("who", r"hello (\w+)")
                .build(),
        )
        .build();
    let factory = HostContextFactory::new(dir.path());
    let mut rt = Runtime::new(cfg.task_definitions()?, Arc::new(factory))?;

    let status = with_timeout(rt.run(cfg.run_config("greet")?)).await?;

    assert_eq!(status.state, RunState::Completed, "{status:?}");
    let greet = status.output("greet").expect("greet output");
    assert_eq!(greet.artifact("stdout"), Some("hello world"));
    assert_eq!(greet.artifact("who"), Some("world"));
    assert_eq!(
        fs::read_to_string(dir.path().join("out/greeting.txt"))?,
        "hello world\n"
    );
    Ok(())
}
