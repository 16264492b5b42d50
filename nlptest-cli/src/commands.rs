//! Subcommand handlers. Each returns whether the run it reports on passed.

use crate::Commands;
use crate::http::HttpPredictor;
use anyhow::{Context, anyhow, bail};
use nlptest_core::config::{DEFAULT_MIN_PASS_RATE, HarnessSettings, TestConfig, TransformSpec, load_settings};
use nlptest_core::perturbation::{PerturbationRegistry, TransformKind, Variant};
use nlptest_core::types::{Prediction, Sample, Task, Threshold};
use nlptest_core::{Harness, Report, TransformEngine, load_dataset};
use std::path::Path;
use std::sync::Arc;

pub async fn handle_command(command: Commands, workspace: &Path) -> anyhow::Result<bool> {
    let settings = load_settings(Some(workspace), None)
        .map_err(|e| anyhow!("Configuration error: {}", e))?;

    match command {
        Commands::Init => handle_init(workspace),
        Commands::Generate {
            data,
            task,
            config,
            out,
            seed,
        } => handle_generate(settings, &data, task, config.as_deref(), &out, seed),
        Commands::Run { dir, endpoint } => handle_run(settings, &dir, endpoint.as_deref()).await,
        Commands::Report { dir, json } => handle_report(settings, &dir, json),
        Commands::Augment {
            dir,
            input,
            output,
            proportion,
        } => handle_augment(settings, &dir, &input, &output, proportion),
        Commands::Transforms { task } => handle_transforms(task),
        Commands::Perturb {
            transform,
            text,
            task,
            tags,
            seed,
        } => {
            let mut sample = Sample::new(text);
            if let Some(tags) = tags {
                sample = sample.with_expected(Prediction::tags(tags.split_whitespace()));
            }
            handle_perturb(&transform, &sample, task, seed.unwrap_or(settings.seed)).map(|_| true)
        }
    }
}

fn handle_init(workspace: &Path) -> anyhow::Result<bool> {
    let config_dir = workspace.join(".nlptest");
    std::fs::create_dir_all(&config_dir)?;

    let settings_path = config_dir.join("settings.toml");
    if settings_path.exists() {
        println!("Settings file already exists at: {}", settings_path.display());
    } else {
        let toml_str = toml::to_string_pretty(&HarnessSettings::default())?;
        std::fs::write(&settings_path, &toml_str)?;
        println!("Created default settings at: {}", settings_path.display());
    }

    let suite_path = config_dir.join("config.yml");
    if !suite_path.exists() {
        std::fs::write(&suite_path, TestConfig::default_suite().to_yaml()?)?;
        println!("Created default test configuration at: {}", suite_path.display());
    }
    Ok(true)
}

fn handle_generate(
    mut settings: HarnessSettings,
    data: &Path,
    task: Task,
    config: Option<&Path>,
    out: &Path,
    seed: Option<u64>,
) -> anyhow::Result<bool> {
    if let Some(seed) = seed {
        settings.seed = seed;
    }
    let samples = load_dataset(data, task)
        .with_context(|| format!("Failed to load dataset {}", data.display()))?;
    let config = match config {
        Some(path) => TestConfig::load(path)?,
        None => TestConfig::default_suite(),
    };

    let mut harness = Harness::new(task, samples, config, settings)?;
    let generated = harness.generate()?.len();
    harness.save(out)?;

    println!("Generated {} test cases into {}", generated, out.display());
    for (transform, skipped) in harness.skipped()?.iter().filter(|(_, n)| **n > 0) {
        println!("  {transform}: skipped {skipped} malformed record(s)");
    }
    Ok(true)
}

async fn handle_run(settings: HarnessSettings, dir: &Path, endpoint: Option<&str>) -> anyhow::Result<bool> {
    let predictor = HttpPredictor::from_settings(&settings.predictor, endpoint)
        .ok_or_else(|| anyhow!("No prediction endpoint: pass --endpoint or set predictor.endpoint"))?;

    let mut harness = Harness::load(dir, settings)?;
    let results = harness.run(Arc::new(predictor)).await?;
    let errors = results.iter().filter(|r| r.error.is_some()).count();
    if errors > 0 {
        eprintln!("{errors} test case(s) could not be evaluated; see the log for details");
    }
    let passed = print_report(harness.report()?, false)?;
    harness.save(dir)?;
    Ok(passed)
}

fn load_report(settings: HarnessSettings, dir: &Path) -> anyhow::Result<Harness> {
    let mut harness = Harness::load(dir, settings)?;
    if harness.last_report().is_none() {
        if harness.generated_results().is_err() {
            bail!("Run at {} has not been evaluated yet; use `nlptest run` first", dir.display());
        }
        harness.report()?;
    }
    Ok(harness)
}

fn handle_report(settings: HarnessSettings, dir: &Path, json: bool) -> anyhow::Result<bool> {
    let harness = load_report(settings, dir)?;
    let report = harness
        .last_report()
        .ok_or_else(|| anyhow!("No report available"))?;
    print_report(report, json)
}

fn print_report(report: &Report, json: bool) -> anyhow::Result<bool> {
    if json {
        println!("{}", report.to_json()?);
    } else {
        print!("{}", report.render_table());
        let failed = report.failed().count();
        if failed > 0 {
            println!("\n{failed} of {} test(s) failed", report.entries.len());
        } else {
            println!("\nAll {} test(s) passed", report.entries.len());
        }
    }
    Ok(report.passed())
}

fn handle_augment(
    settings: HarnessSettings,
    dir: &Path,
    input: &Path,
    output: &Path,
    proportion: f64,
) -> anyhow::Result<bool> {
    if !(0.0..=1.0).contains(&proportion) {
        bail!("--proportion must be within [0, 1], got {proportion}");
    }
    let harness = load_report(settings, dir)?;
    let added = harness.augment(input, output, proportion)?;
    println!("Wrote {} with {added} augmented record(s)", output.display());
    Ok(true)
}

fn handle_transforms(task: Option<Task>) -> anyhow::Result<bool> {
    let registry = PerturbationRegistry::with_builtins();
    println!("{:<14} {:<44} {:<16} Tasks", "Category", "Name", "Threshold");
    for transform in registry.list() {
        if task.is_some_and(|t| !transform.supports(t)) {
            continue;
        }
        let tasks: Vec<String> = [Task::Ner, Task::TextClassification]
            .into_iter()
            .filter(|t| transform.supports(*t))
            .map(|t| t.to_string())
            .collect();
        println!(
            "{:<14} {:<44} {:<16} {}",
            transform.category.to_string(),
            transform.name,
            transform.threshold_kind().field(),
            tasks.join(", ")
        );
    }
    Ok(true)
}

/// Print the variants `name` produces for `sample`; returns them for inspection.
fn handle_perturb(name: &str, sample: &Sample, task: Task, seed: u64) -> anyhow::Result<Vec<Variant>> {
    let registry = PerturbationRegistry::with_builtins();
    let registered = registry.get(name)?;
    if !matches!(registered.kind, TransformKind::Perturbation(_)) {
        bail!("'{name}' is a {} test and does not perturb text", registered.category);
    }
    if !registered.supports(task) {
        bail!("'{name}' does not support {task}");
    }

    let spec = TransformSpec {
        name: name.to_string(),
        category: registered.category,
        params: registered.default_params()?,
        threshold: Threshold::MinPassRate(DEFAULT_MIN_PASS_RATE),
    };
    let engine = TransformEngine::new(&registry, task, seed);
    let variants = engine.preview(&spec, sample)?;
    if variants.is_empty() {
        println!("(no change)");
    }
    for variant in &variants {
        println!("{}", variant.text);
        for edit in &variant.edits {
            println!("  {}..{}: {:?} -> {:?}", edit.start, edit.end, edit.original, edit.replacement);
        }
    }
    Ok(variants)
}

#[cfg(test)]
mod tests {
    use super::*;
    use nlptest_core::predictor::MockPredictor;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn write_dataset(dir: &Path) -> std::path::PathBuf {
        let path = dir.join("reviews.csv");
        std::fs::write(
            &path,
            "text,label\nHe loved the film,pos\nShe hated the plot,neg\nThe cast was great,pos\n",
        )
        .unwrap();
        path
    }

    fn generate_command(data: &Path, out: &Path) -> Commands {
        Commands::Generate {
            data: data.to_path_buf(),
            task: Task::TextClassification,
            config: None,
            out: out.to_path_buf(),
            seed: Some(7),
        }
    }

    #[tokio::test]
    async fn test_init_creates_files() {
        let dir = TempDir::new().unwrap();
        handle_command(Commands::Init, dir.path()).await.unwrap();

        let settings_path = dir.path().join(".nlptest").join("settings.toml");
        let content = std::fs::read_to_string(&settings_path).unwrap();
        let parsed: HarnessSettings = toml::from_str(&content).unwrap();
        assert_eq!(parsed, HarnessSettings::default());

        let suite = dir.path().join(".nlptest").join("config.yml");
        assert_eq!(TestConfig::load(&suite).unwrap(), TestConfig::default_suite());
    }

    #[tokio::test]
    async fn test_init_idempotent() {
        let dir = TempDir::new().unwrap();
        handle_command(Commands::Init, dir.path()).await.unwrap();
        let settings_path = dir.path().join(".nlptest").join("settings.toml");
        std::fs::write(&settings_path, "seed = 9\n").unwrap();

        handle_command(Commands::Init, dir.path()).await.unwrap();
        assert_eq!(std::fs::read_to_string(&settings_path).unwrap(), "seed = 9\n");
    }

    #[tokio::test]
    async fn test_report_requires_evaluation() {
        let dir = TempDir::new().unwrap();
        let data = write_dataset(dir.path());
        let out = dir.path().join("run");
        assert!(handle_command(generate_command(&data, &out), dir.path()).await.unwrap());

        let err = handle_command(Commands::Report { dir: out, json: false }, dir.path())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("has not been evaluated"));
    }

    #[tokio::test]
    async fn test_report_after_evaluation() {
        let dir = TempDir::new().unwrap();
        let data = write_dataset(dir.path());
        let out = dir.path().join("run");
        handle_command(generate_command(&data, &out), dir.path()).await.unwrap();

        let mut harness = Harness::load(&out, HarnessSettings::default()).unwrap();
        harness
            .run(Arc::new(MockPredictor::identity(Task::TextClassification)))
            .await
            .unwrap();
        harness.save(&out).unwrap();

        let json = Commands::Report {
            dir: out.clone(),
            json: true,
        };
        // The identity model cannot reach the accuracy threshold.
        assert!(!handle_command(json, dir.path()).await.unwrap());
    }

    #[tokio::test]
    async fn test_run_without_endpoint_fails() {
        let dir = TempDir::new().unwrap();
        let command = Commands::Run {
            dir: dir.path().join("run"),
            endpoint: None,
        };
        let err = handle_command(command, dir.path()).await.unwrap_err();
        assert!(err.to_string().contains("No prediction endpoint"));
    }

    #[tokio::test]
    async fn test_augment_rejects_bad_proportion() {
        let dir = TempDir::new().unwrap();
        let command = Commands::Augment {
            dir: dir.path().join("run"),
            input: dir.path().join("in.csv"),
            output: dir.path().join("out.csv"),
            proportion: 1.5,
        };
        assert!(handle_command(command, dir.path()).await.is_err());
    }

    #[tokio::test]
    async fn test_transforms_and_perturb() {
        let dir = TempDir::new().unwrap();
        assert!(
            handle_command(Commands::Transforms { task: Some(Task::Ner) }, dir.path())
                .await
                .unwrap()
        );
        let perturb = Commands::Perturb {
            transform: "replace_to_female_pronouns".into(),
            text: "He is brilliant.".into(),
            task: Task::TextClassification,
            tags: None,
            seed: None,
        };
        assert!(handle_command(perturb, dir.path()).await.unwrap());

        let not_a_perturbation = Commands::Perturb {
            transform: "min_f1_score".into(),
            text: "anything".into(),
            task: Task::TextClassification,
            tags: None,
            seed: None,
        };
        assert!(handle_command(not_a_perturbation, dir.path()).await.is_err());
    }

    #[test]
    fn test_perturb_uses_requested_task() {
        let sample = Sample::new("John lives in Paris")
            .with_expected(Prediction::tags(["B-PER", "O", "O", "B-LOC"]));
        let as_ner = handle_perturb("swap_entities", &sample, Task::Ner, 7).unwrap();
        assert_eq!(as_ner.len(), 1);
        assert_ne!(as_ner[0].text, sample.text);

        let err = handle_perturb("swap_entities", &sample, Task::TextClassification, 7).unwrap_err();
        assert!(err.to_string().contains("does not support"));
    }

    #[tokio::test]
    async fn test_perturb_command_parses_tags() {
        let dir = TempDir::new().unwrap();
        let command = Commands::Perturb {
            transform: "swap_entities".into(),
            text: "John lives in Paris".into(),
            task: Task::Ner,
            tags: Some("B-PER O O B-LOC".into()),
            seed: Some(3),
        };
        assert!(handle_command(command, dir.path()).await.unwrap());
    }
}
