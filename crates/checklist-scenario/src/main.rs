use std::collections::BTreeMap;
use std::fs;
use std::io::IsTerminal;
use std::path::{Path, PathBuf};

use anyhow::{Context, anyhow};
use checklist_core::config::Config;
use checklist_core::{Intent, Outcome, Store};
use clap::Parser;
use serde::Deserialize;
use tracing::{debug, info, warn};

#[derive(Parser, Debug)]
#[command(
    name = "checklist-scenario",
    about = "Replays JSON intent scenarios against the checklist store"
)]
struct Args {
    /// Scenario file, or a directory of `*.json` scenario files.
    #[arg(long, default_value = "crates/checklist-scenario/scenarios")]
    scenario: Vec<PathBuf>,

    #[arg(long, default_value = "warn")]
    log_level: String,
}

#[derive(Debug, Deserialize)]
struct Scenario {
    name: String,
    /// rc-style settings applied before the first step.
    #[serde(default)]
    config: BTreeMap<String, String>,
    steps: Vec<Step>,
}

#[derive(Debug, Deserialize)]
struct Step {
    intent: Intent,
    /// Visible texts, in order, after the step.
    #[serde(default)]
    expect: Option<Vec<String>>,
    /// Stored texts, in insertion order, after the step.
    #[serde(default)]
    expect_stored: Option<Vec<String>>,
}

#[derive(Debug, PartialEq, Eq)]
struct StepFailure {
    step: usize,
    what: &'static str,
    expected: Vec<String>,
    actual: Vec<String>,
}

#[derive(Debug)]
struct ScenarioReport {
    name: String,
    steps: usize,
    failures: Vec<StepFailure>,
}

impl ScenarioReport {
    fn passed(&self) -> bool {
        self.failures.is_empty()
    }
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(&args.log_level)?;

    let scenarios = load_scenarios(&args.scenario)?;
    if scenarios.is_empty() {
        return Err(anyhow!("no scenarios loaded"));
    }

    let mut failed = 0_usize;
    for scenario in &scenarios {
        info!(scenario = %scenario.name, steps = scenario.steps.len(), "running scenario");
        let report = run_scenario(scenario)
            .with_context(|| format!("scenario {} could not start", scenario.name))?;
        print_report(&report);
        if !report.passed() {
            failed += 1;
        }
    }

    println!(
        "\n{} of {} scenario(s) passed",
        scenarios.len() - failed,
        scenarios.len()
    );

    if failed > 0 {
        return Err(anyhow!("{failed} scenario(s) failed"));
    }
    Ok(())
}

fn init_tracing(level: &str) -> anyhow::Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_new(level)
        .or_else(|_| tracing_subscriber::EnvFilter::try_new("warn"))
        .map_err(|e| anyhow!("invalid log level: {e}"))?;

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_ansi(std::io::stderr().is_terminal())
        .try_init();

    Ok(())
}

fn load_scenarios(paths: &[PathBuf]) -> anyhow::Result<Vec<Scenario>> {
    let mut out = Vec::new();

    for path in paths {
        for file in scenario_files(path)? {
            let text = fs::read_to_string(&file)
                .with_context(|| format!("failed to read scenario {}", file.display()))?;
            let scenario: Scenario = serde_json::from_str(&text)
                .with_context(|| format!("failed to parse scenario {}", file.display()))?;
            debug!(file = %file.display(), name = %scenario.name, "loaded scenario");
            out.push(scenario);
        }
    }

    Ok(out)
}

fn scenario_files(path: &Path) -> anyhow::Result<Vec<PathBuf>> {
    if !path.is_dir() {
        return Ok(vec![path.to_path_buf()]);
    }

    let mut files = Vec::new();
    for entry in fs::read_dir(path)
        .with_context(|| format!("failed to list scenarios in {}", path.display()))?
    {
        let file = entry?.path();
        if file.extension().is_some_and(|ext| ext == "json") {
            files.push(file);
        }
    }
    files.sort();

    if files.is_empty() {
        warn!(dir = %path.display(), "scenario directory has no json files");
    }
    Ok(files)
}

fn run_scenario(scenario: &Scenario) -> anyhow::Result<ScenarioReport> {
    let mut cfg = Config::default();
    cfg.apply_overrides(scenario.config.clone());
    let mut store = Store::new(cfg.sort_mode()?, cfg.filter_mode()?);

    let mut failures = Vec::new();
    for (idx, step) in scenario.steps.iter().enumerate() {
        let outcome = store.dispatch(step.intent.clone());
        if outcome == Outcome::Ignored {
            debug!(step = idx + 1, intent = ?step.intent, "intent ignored");
        }

        if let Some(expected) = &step.expect {
            let actual = visible_texts(&store);
            if &actual != expected {
                failures.push(StepFailure {
                    step: idx + 1,
                    what: "visible",
                    expected: expected.clone(),
                    actual,
                });
            }
        }

        if let Some(expected) = &step.expect_stored {
            let actual = stored_texts(&store);
            if &actual != expected {
                failures.push(StepFailure {
                    step: idx + 1,
                    what: "stored",
                    expected: expected.clone(),
                    actual,
                });
            }
        }
    }

    Ok(ScenarioReport {
        name: scenario.name.clone(),
        steps: scenario.steps.len(),
        failures,
    })
}

fn visible_texts(store: &Store) -> Vec<String> {
    store
        .visible_tasks()
        .into_iter()
        .map(|task| task.text)
        .collect()
}

fn stored_texts(store: &Store) -> Vec<String> {
    store.tasks().iter().map(|task| task.text.clone()).collect()
}

fn print_report(report: &ScenarioReport) {
    let verdict = if report.passed() { "ok" } else { "FAILED" };
    println!("Scenario: {} ({} steps) ... {verdict}", report.name, report.steps);

    for failure in &report.failures {
        println!("  step {} {} mismatch:", failure.step, failure.what);
        println!("    expected: {:?}", failure.expected);
        println!("    actual:   {:?}", failure.actual);
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::{Scenario, load_scenarios, run_scenario};
    use tempfile::tempdir;

    fn parse(raw: &str) -> Scenario {
        serde_json::from_str(raw).expect("scenario json")
    }

    #[test]
    fn passing_scenario_has_no_failures() {
        let scenario = parse(
            r#"{
                "name": "latest then oldest",
                "steps": [
                    {"intent": {"command": "add", "arg": "Todo 1"}},
                    {"intent": {"command": "add", "arg": "Todo 2"}, "expect": ["Todo 2", "Todo 1"]},
                    {"intent": {"command": "set_sort", "arg": "oldest"}, "expect": ["Todo 1", "Todo 2"]}
                ]
            }"#,
        );

        let report = run_scenario(&scenario).expect("run");
        assert!(report.passed(), "{:?}", report.failures);
        assert_eq!(report.steps, 3);
    }

    #[test]
    fn mismatch_is_reported_with_step_number() {
        let scenario = parse(
            r#"{
                "name": "wrong expectation",
                "config": {"default.sort": "oldest"},
                "steps": [
                    {"intent": {"command": "add", "arg": "a"}},
                    {"intent": {"command": "add", "arg": "b"}, "expect": ["b", "a"], "expect_stored": ["a", "b"]}
                ]
            }"#,
        );

        let report = run_scenario(&scenario).expect("run");
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].step, 2);
        assert_eq!(report.failures[0].what, "visible");
        assert_eq!(report.failures[0].actual, vec!["a", "b"]);
    }

    #[test]
    fn bad_config_value_fails_the_scenario_start() {
        let scenario = parse(
            r#"{"name": "bad", "config": {"default.filter": "done"}, "steps": []}"#,
        );
        assert!(run_scenario(&scenario).is_err());
    }

    #[test]
    fn directory_loads_json_files_in_name_order() {
        let dir = tempdir().expect("tempdir");
        fs::write(dir.path().join("b.json"), r#"{"name": "second", "steps": []}"#)
            .expect("write b");
        fs::write(dir.path().join("a.json"), r#"{"name": "first", "steps": []}"#)
            .expect("write a");
        fs::write(dir.path().join("notes.txt"), "ignored").expect("write txt");

        let scenarios = load_scenarios(&[dir.path().to_path_buf()]).expect("load");
        let names: Vec<&str> = scenarios.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["first", "second"]);
    }
}
