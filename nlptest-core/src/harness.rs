//! The `Harness` façade: configure, generate, run, report, save, load.
//!
//! The configuration is validated against the registry when the harness is
//! built or reconfigured, so an unknown transform fails before any test
//! case is generated or any model is called.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::augment;
use crate::config::{HarnessSettings, TestConfig, TransformSpec};
use crate::dataset::{export_dataset, load_dataset};
use crate::engine::{Generation, TransformEngine};
use crate::error::{HarnessError, Result};
use crate::judge::Judge;
use crate::perturbation::PerturbationRegistry;
use crate::persistence::{SavedRun, load_run, save_run};
use crate::predictor::Predictor;
use crate::report::{Report, aggregate};
use crate::runner::EvaluationRunner;
use crate::types::{EvaluationResult, Sample, Task, TestCase};

/// Drives one test run over a dataset.
pub struct Harness {
    run_id: Uuid,
    task: Task,
    data: Vec<Sample>,
    config: TestConfig,
    specs: Vec<TransformSpec>,
    settings: HarnessSettings,
    registry: PerturbationRegistry,
    generation: Option<Generation>,
    results: Option<Vec<EvaluationResult>>,
    report: Option<Report>,
}

impl Harness {
    /// Build a harness with the built-in transforms.
    pub fn new(
        task: Task,
        data: Vec<Sample>,
        config: TestConfig,
        settings: HarnessSettings,
    ) -> Result<Self> {
        Self::with_registry(task, data, config, settings, PerturbationRegistry::with_builtins())
    }

    /// Build a harness over a custom registry.
    pub fn with_registry(
        task: Task,
        data: Vec<Sample>,
        config: TestConfig,
        settings: HarnessSettings,
        registry: PerturbationRegistry,
    ) -> Result<Self> {
        let specs = config.resolve(&registry, task)?;
        let run_id = Uuid::new_v4();
        info!(%run_id, %task, records = data.len(), transforms = specs.len(), "Harness configured");
        Ok(Self {
            run_id,
            task,
            data,
            config,
            specs,
            settings,
            registry,
            generation: None,
            results: None,
            report: None,
        })
    }

    /// Replace the test configuration. Generated cases, results and the
    /// report are discarded.
    pub fn configure(&mut self, config: TestConfig) -> Result<()> {
        self.specs = config.resolve(&self.registry, self.task)?;
        self.config = config;
        self.generation = None;
        self.results = None;
        self.report = None;
        Ok(())
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn task(&self) -> Task {
        self.task
    }

    pub fn data(&self) -> &[Sample] {
        &self.data
    }

    pub fn config(&self) -> &TestConfig {
        &self.config
    }

    pub fn specs(&self) -> &[TransformSpec] {
        &self.specs
    }

    pub fn settings(&self) -> &HarnessSettings {
        &self.settings
    }

    pub fn registry(&self) -> &PerturbationRegistry {
        &self.registry
    }

    /// Generate test cases. Any previous results are discarded.
    pub fn generate(&mut self) -> Result<&[TestCase]> {
        let engine = TransformEngine::new(&self.registry, self.task, self.settings.seed);
        let generation = engine.generate(&self.specs, &self.data)?;
        self.results = None;
        self.report = None;
        let generation = self.generation.insert(generation);
        Ok(&generation.test_cases)
    }

    /// Evaluate the generated cases against `predictor` and judge them.
    pub async fn run(&mut self, predictor: Arc<dyn Predictor>) -> Result<&[EvaluationResult]> {
        let generation = self.generation.as_ref().ok_or(HarnessError::NotGenerated)?;
        let runner = EvaluationRunner::new(predictor, &self.settings.runner);
        let mut results = runner.run(&generation.test_cases).await;
        Judge::new(&self.registry, self.task).judge(
            &self.specs,
            &generation.test_cases,
            &mut results,
        )?;
        self.report = None;
        Ok(self.results.insert(results))
    }

    /// Aggregate the judged results into a report.
    pub fn report(&mut self) -> Result<&Report> {
        let generation = self.generation.as_ref().ok_or(HarnessError::NotGenerated)?;
        let results = self.results.as_ref().ok_or(HarnessError::NotRun)?;
        let report = aggregate(
            &self.registry,
            self.task,
            &self.specs,
            &generation.test_cases,
            results,
        )?;
        Ok(self.report.insert(report))
    }

    pub fn testcases(&self) -> Result<&[TestCase]> {
        self.generation
            .as_ref()
            .map(|g| g.test_cases.as_slice())
            .ok_or_else(|| HarnessError::NotGenerated.into())
    }

    pub fn generated_results(&self) -> Result<&[EvaluationResult]> {
        self.results
            .as_deref()
            .ok_or_else(|| HarnessError::NotRun.into())
    }

    /// The last aggregated report, if any.
    pub fn last_report(&self) -> Option<&Report> {
        self.report.as_ref()
    }

    /// Skipped record count per transform.
    pub fn skipped(&self) -> Result<&BTreeMap<String, usize>> {
        self.generation
            .as_ref()
            .map(|g| &g.skipped)
            .ok_or_else(|| HarnessError::NotGenerated.into())
    }

    /// Persist the run. Requires generated test cases.
    pub fn save(&self, dir: &Path) -> Result<()> {
        let generation = self.generation.as_ref().ok_or(HarnessError::NotGenerated)?;
        save_run(
            dir,
            &SavedRun {
                run_id: self.run_id,
                task: self.task,
                seed: self.settings.seed,
                config: self.config.clone(),
                specs: self.specs.clone(),
                data: self.data.clone(),
                test_cases: generation.test_cases.clone(),
                skipped: generation.skipped.clone(),
                results: self.results.clone(),
                report: self.report.clone(),
            },
        )?;
        Ok(())
    }

    /// Restore a saved run with the built-in transforms.
    pub fn load(dir: &Path, settings: HarnessSettings) -> Result<Self> {
        Self::load_with_registry(dir, settings, PerturbationRegistry::with_builtins())
    }

    /// Restore a saved run without regenerating its test cases.
    ///
    /// The saved seed wins over the one in `settings`, and the saved
    /// transform specs are used as they were resolved at generation time;
    /// `registry` only has to provide a transform for each of them.
    pub fn load_with_registry(
        dir: &Path,
        mut settings: HarnessSettings,
        registry: PerturbationRegistry,
    ) -> Result<Self> {
        let saved = load_run(dir)?;
        if settings.seed != saved.seed {
            warn!(configured = settings.seed, saved = saved.seed, "Using the seed of the saved run");
            settings.seed = saved.seed;
        }
        for spec in &saved.specs {
            registry.get(&spec.name)?;
        }
        info!(
            run_id = %saved.run_id,
            task = %saved.task,
            records = saved.data.len(),
            transforms = saved.specs.len(),
            "Harness restored"
        );
        Ok(Self {
            run_id: saved.run_id,
            task: saved.task,
            data: saved.data,
            config: saved.config,
            specs: saved.specs,
            settings,
            registry,
            generation: Some(Generation {
                test_cases: saved.test_cases,
                skipped: saved.skipped,
            }),
            results: saved.results,
            report: saved.report,
        })
    }

    /// Write `input` plus perturbed copies for every failed robustness or
    /// bias transform to `output`. Returns the number of records added.
    pub fn augment(&self, input: &Path, output: &Path, cap: f64) -> Result<usize> {
        let report = self.report.as_ref().ok_or(HarnessError::NotReported)?;
        let samples = load_dataset(input, self.task)?;
        let augmented = augment::augment(
            &self.registry,
            self.task,
            self.settings.seed,
            &self.specs,
            report,
            &samples,
            cap,
        )?;
        export_dataset(output, self.task, &augmented)?;
        Ok(augmented.len() - samples.len())
    }
}
