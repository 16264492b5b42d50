//! Configuration for nlptest.
//!
//! Two layers live here:
//!
//! - [`HarnessSettings`]: how a run executes (seed, worker pool, predictor
//!   endpoint). Uses `figment` for layered configuration: defaults -> user
//!   config file -> workspace config file -> environment -> explicit overrides.
//! - [`TestConfig`]: which tests to generate and the thresholds they are
//!   judged against, in the YAML shape `defaults` / `tests.<category>.<name>`.

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use serde_yaml::Value;
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::ConfigError;
use crate::perturbation::{PerturbationRegistry, TransformParams};
use crate::types::{Category, Task, Threshold, ThresholdKind};

/// Pass rate used when a transform names no threshold of its own.
pub const DEFAULT_MIN_PASS_RATE: f64 = 0.65;

const DEFAULT_SUITE: &str = include_str!("../default_config.yml");

/// Top-level harness settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessSettings {
    /// Seed for every randomized transform.
    pub seed: u64,
    pub runner: RunnerSettings,
    pub predictor: PredictorSettings,
}

impl Default for HarnessSettings {
    fn default() -> Self {
        Self {
            seed: 42,
            runner: RunnerSettings::default(),
            predictor: PredictorSettings::default(),
        }
    }
}

/// Evaluation worker pool settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerSettings {
    /// Maximum number of batches in flight at once.
    pub max_concurrency: usize,
    /// Test cases per predictor call.
    pub batch_size: usize,
    /// Per-call timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for RunnerSettings {
    fn default() -> Self {
        Self {
            max_concurrency: 4,
            batch_size: 16,
            timeout_secs: 30,
        }
    }
}

impl RunnerSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Remote predictor settings used by the CLI.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PredictorSettings {
    pub endpoint: Option<String>,
    pub headers: BTreeMap<String, String>,
}

/// Load harness settings from the layered figment stack.
pub fn load_settings(
    workspace: Option<&Path>,
    overrides: Option<&HarnessSettings>,
) -> Result<HarnessSettings, Box<figment::Error>> {
    let mut figment = Figment::from(Serialized::defaults(HarnessSettings::default()));

    // User-level settings
    if let Some(dirs) = directories::ProjectDirs::from("dev", "nlptest", "nlptest") {
        let user_settings = dirs.config_dir().join("settings.toml");
        if user_settings.exists() {
            figment = figment.merge(Toml::file(&user_settings));
        }
    }

    // Workspace-level settings
    if let Some(ws) = workspace {
        let ws_settings = ws.join(".nlptest").join("settings.toml");
        if ws_settings.exists() {
            figment = figment.merge(Toml::file(&ws_settings));
        }
    }

    // Environment variables (NLPTEST_SEED, NLPTEST_RUNNER__BATCH_SIZE, etc.)
    figment = figment.merge(Env::prefixed("NLPTEST_").split("__"));

    if let Some(overrides) = overrides {
        figment = figment.merge(Serialized::defaults(overrides));
    }

    figment.extract().map_err(Box::new)
}

/// The `defaults` block of a test configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Defaults {
    #[serde(default = "default_min_pass_rate")]
    pub min_pass_rate: f64,
}

fn default_min_pass_rate() -> f64 {
    DEFAULT_MIN_PASS_RATE
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            min_pass_rate: DEFAULT_MIN_PASS_RATE,
        }
    }
}

/// A configured transform, resolved against the registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransformSpec {
    pub name: String,
    pub category: Category,
    #[serde(default)]
    pub params: TransformParams,
    pub threshold: Threshold,
}

/// Test configuration as written by the user.
///
/// Entries are kept as raw YAML so a saved run writes back exactly what was
/// configured; [`TestConfig::resolve`] types and validates them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TestConfig {
    #[serde(default)]
    pub defaults: Defaults,
    /// Category name -> transform name -> entry.
    #[serde(default)]
    pub tests: BTreeMap<String, Value>,
}

impl TestConfig {
    /// The suite used when no configuration is given.
    pub fn default_suite() -> Self {
        // The embedded suite is parsed by the tests below.
        Self::from_yaml(DEFAULT_SUITE).unwrap_or_default()
    }

    /// Parse a YAML configuration, warning about unknown keys.
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let raw: Value = serde_yaml::from_str(yaml).map_err(|e| ConfigError::ParseError {
            message: e.to_string(),
        })?;
        if raw.is_null() {
            return Ok(Self::default());
        }
        if let Some(map) = raw.as_mapping() {
            for key in map.keys() {
                let key = key.as_str().unwrap_or("<non-string key>");
                if key != "defaults" && key != "tests" {
                    warn!(key, "Ignoring unknown configuration key");
                }
            }
            if let Some(defaults) = map.get("defaults").and_then(Value::as_mapping) {
                for key in defaults.keys() {
                    let key = key.as_str().unwrap_or("<non-string key>");
                    if key != "min_pass_rate" {
                        warn!(key, "Ignoring unknown key in 'defaults'");
                    }
                }
            }
        }
        let config: TestConfig =
            serde_yaml::from_value(raw).map_err(|e| ConfigError::ParseError {
                message: e.to_string(),
            })?;
        Ok(config)
    }

    /// Load a YAML configuration file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::FileNotFound {
                path: path.to_path_buf(),
            });
        }
        let yaml = std::fs::read_to_string(path).map_err(|e| ConfigError::ParseError {
            message: format!("{}: {e}", path.display()),
        })?;
        Self::from_yaml(&yaml)
    }

    pub fn to_yaml(&self) -> Result<String, ConfigError> {
        serde_yaml::to_string(self).map_err(|e| ConfigError::ParseError {
            message: e.to_string(),
        })
    }

    /// Validate every entry against the registry and the task.
    ///
    /// Specs come out ordered by category, then name. Any unknown transform,
    /// misplaced transform or out-of-range threshold fails the whole
    /// configuration before anything is generated.
    pub fn resolve(
        &self,
        registry: &PerturbationRegistry,
        task: Task,
    ) -> Result<Vec<TransformSpec>, ConfigError> {
        check_fraction("defaults", "min_pass_rate", self.defaults.min_pass_rate)?;

        let mut specs = Vec::new();
        for (category_key, entries) in &self.tests {
            let Ok(category) = category_key.parse::<Category>() else {
                warn!(category = %category_key, "Ignoring unknown test category");
                continue;
            };
            let entries = match entries {
                Value::Null => continue,
                Value::Mapping(m) => m,
                _ => {
                    warn!(category = %category_key, "Ignoring test category that is not a mapping");
                    continue;
                }
            };
            for (name, entry) in entries {
                let Some(name) = name.as_str() else {
                    warn!(category = %category_key, "Ignoring non-string transform name");
                    continue;
                };
                specs.push(self.resolve_entry(registry, task, category, name, entry)?);
            }
        }
        specs.sort_by(|a, b| a.category.cmp(&b.category).then(a.name.cmp(&b.name)));
        debug!(count = specs.len(), %task, "Resolved test configuration");
        Ok(specs)
    }

    fn resolve_entry(
        &self,
        registry: &PerturbationRegistry,
        task: Task,
        category: Category,
        name: &str,
        entry: &Value,
    ) -> Result<TransformSpec, ConfigError> {
        let registered = registry
            .get(name)
            .map_err(|_| ConfigError::UnknownTransform {
                name: name.to_string(),
            })?;
        if registered.category != category {
            return Err(ConfigError::CategoryMismatch {
                name: name.to_string(),
                configured: category,
                registered: registered.category,
            });
        }
        if !registered.supports(task) {
            return Err(ConfigError::UnsupportedTask {
                name: name.to_string(),
                task,
            });
        }

        let empty = serde_yaml::Mapping::new();
        let fields = match entry {
            Value::Null => &empty,
            Value::Mapping(m) => m,
            _ => {
                return Err(ConfigError::InvalidParameters {
                    name: name.to_string(),
                    reason: "entry must be a mapping".into(),
                });
            }
        };

        let kind = registered.threshold_kind();
        for key in fields.keys() {
            let key = key.as_str().unwrap_or("<non-string key>");
            if key != kind.field() && key != "parameters" {
                warn!(transform = name, key, "Ignoring unknown key");
            }
        }

        let threshold = self.threshold(name, kind, fields.get(kind.field()))?;
        let params = registered.parse_params(fields.get("parameters").unwrap_or(&Value::Null))?;
        Ok(TransformSpec {
            name: name.to_string(),
            category,
            params,
            threshold,
        })
    }

    fn threshold(
        &self,
        name: &str,
        kind: ThresholdKind,
        raw: Option<&Value>,
    ) -> Result<Threshold, ConfigError> {
        let field = kind.field();
        if kind == ThresholdKind::MinCount {
            let raw = raw.ok_or_else(|| ConfigError::MissingThreshold {
                name: name.to_string(),
                field,
            })?;
            let count = raw.as_u64().ok_or_else(|| ConfigError::InvalidParameters {
                name: name.to_string(),
                reason: format!("'{field}' must be a non-negative integer"),
            })?;
            return Ok(Threshold::MinCount(count as usize));
        }

        let value = match raw {
            Some(v) => v.as_f64().ok_or_else(|| ConfigError::InvalidParameters {
                name: name.to_string(),
                reason: format!("'{field}' must be a number"),
            })?,
            // An upper bound has no sensible default.
            None if kind == ThresholdKind::MaxScore => {
                return Err(ConfigError::MissingThreshold {
                    name: name.to_string(),
                    field,
                });
            }
            None => self.defaults.min_pass_rate,
        };
        check_fraction(name, field, value)?;
        Ok(match kind {
            ThresholdKind::MinPassRate => Threshold::MinPassRate(value),
            ThresholdKind::MinScore => Threshold::MinScore(value),
            ThresholdKind::MaxScore => Threshold::MaxScore(value),
            ThresholdKind::MinProportion => Threshold::MinProportion(value),
            ThresholdKind::MinCount => unreachable!("handled above"),
        })
    }
}

fn check_fraction(name: &str, field: &'static str, value: f64) -> Result<(), ConfigError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::OutOfRange {
            name: name.to_string(),
            field,
            value,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::perturbation::PunctuationParams;

    fn registry() -> PerturbationRegistry {
        PerturbationRegistry::with_builtins()
    }

    #[test]
    fn test_default_settings() {
        let settings = HarnessSettings::default();
        assert_eq!(settings.seed, 42);
        assert_eq!(settings.runner.max_concurrency, 4);
        assert_eq!(settings.runner.batch_size, 16);
        assert_eq!(settings.runner.timeout(), Duration::from_secs(30));
        assert!(settings.predictor.endpoint.is_none());
    }

    #[test]
    fn test_load_settings_defaults() {
        let dir = tempfile::TempDir::new().unwrap();
        let settings = load_settings(Some(dir.path()), None).unwrap();
        assert_eq!(settings.runner.batch_size, 16);
    }

    #[test]
    fn test_load_settings_workspace_file() {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join(".nlptest")).unwrap();
        std::fs::write(
            dir.path().join(".nlptest").join("settings.toml"),
            "seed = 7\n[runner]\nbatch_size = 2\n",
        )
        .unwrap();
        let settings = load_settings(Some(dir.path()), None).unwrap();
        assert_eq!(settings.seed, 7);
        assert_eq!(settings.runner.batch_size, 2);
        assert_eq!(settings.runner.max_concurrency, 4);
    }

    #[test]
    fn test_load_settings_overrides_win() {
        let overrides = HarnessSettings {
            seed: 99,
            ..Default::default()
        };
        let settings = load_settings(None, Some(&overrides)).unwrap();
        assert_eq!(settings.seed, 99);
    }

    #[test]
    fn test_default_suite_resolves() {
        let suite = TestConfig::default_suite();
        assert_eq!(suite.defaults.min_pass_rate, 0.65);
        let specs = suite.resolve(&registry(), Task::TextClassification).unwrap();
        assert!(specs.len() >= 10);
        assert!(specs.windows(2).all(|w| w[0].category <= w[1].category));
    }

    #[test]
    fn test_resolve_thresholds_and_params() {
        let yaml = r#"
defaults:
  min_pass_rate: 0.5
tests:
  robustness:
    add_punctuation:
      min_pass_rate: 0.7
      parameters:
        whitelist: ["!", "?"]
    lowercase:
  representation:
    min_gender_representation_count:
      min_count: 5
  accuracy:
    min_f1_score:
      min_score: 0.8
"#;
        let specs = TestConfig::from_yaml(yaml)
            .unwrap()
            .resolve(&registry(), Task::Ner)
            .unwrap();
        let by_name = |n: &str| specs.iter().find(|s| s.name == n).unwrap();

        let punct = by_name("add_punctuation");
        assert_eq!(punct.threshold, Threshold::MinPassRate(0.7));
        assert_eq!(
            punct.params,
            TransformParams::Punctuation(PunctuationParams {
                whitelist: vec!["!".into(), "?".into()]
            })
        );
        assert_eq!(by_name("lowercase").threshold, Threshold::MinPassRate(0.5));
        assert_eq!(
            by_name("min_gender_representation_count").threshold,
            Threshold::MinCount(5)
        );
        assert_eq!(by_name("min_f1_score").threshold, Threshold::MinScore(0.8));
    }

    #[test]
    fn test_unknown_transform_is_fatal() {
        let config = TestConfig::from_yaml("tests:\n  robustness:\n    add_sarcasm: {}\n").unwrap();
        let err = config.resolve(&registry(), Task::Ner).unwrap_err();
        assert!(matches!(err, ConfigError::UnknownTransform { name } if name == "add_sarcasm"));
    }

    #[test]
    fn test_category_mismatch() {
        let config = TestConfig::from_yaml("tests:\n  bias:\n    uppercase: {}\n").unwrap();
        let err = config.resolve(&registry(), Task::Ner).unwrap_err();
        assert!(matches!(err, ConfigError::CategoryMismatch { .. }));
    }

    #[test]
    fn test_unsupported_task() {
        let config = TestConfig::from_yaml("tests:\n  robustness:\n    swap_entities: {}\n").unwrap();
        assert!(config.resolve(&registry(), Task::Ner).is_ok());
        let err = config
            .resolve(&registry(), Task::TextClassification)
            .unwrap_err();
        assert!(matches!(err, ConfigError::UnsupportedTask { .. }));
    }

    #[test]
    fn test_unknown_keys_are_ignored() {
        let yaml = "colour: red\ntests:\n  speed:\n    fast: {}\n  robustness:\n    uppercase:\n      min_pass_rate: 0.9\n      bogus: 1\n";
        let specs = TestConfig::from_yaml(yaml)
            .unwrap()
            .resolve(&registry(), Task::Ner)
            .unwrap();
        assert_eq!(specs.len(), 1);
        assert_eq!(specs[0].threshold, Threshold::MinPassRate(0.9));
    }

    #[test]
    fn test_scalar_categories_are_ignored() {
        let yaml = "tests:\n  speed: 3\n  bias: fast\n  accuracy:\n  robustness:\n    lowercase: {}\n";
        let specs = TestConfig::from_yaml(yaml)
            .unwrap()
            .resolve(&registry(), Task::TextClassification)
            .unwrap();
        let names: Vec<&str> = specs.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["lowercase"]);
    }

    #[test]
    fn test_threshold_validation() {
        let out_of_range = TestConfig::from_yaml("tests:\n  robustness:\n    uppercase:\n      min_pass_rate: 1.5\n").unwrap();
        assert!(matches!(
            out_of_range.resolve(&registry(), Task::Ner).unwrap_err(),
            ConfigError::OutOfRange { value, .. } if value == 1.5
        ));

        let missing_count = TestConfig::from_yaml("tests:\n  representation:\n    min_label_representation_count: {}\n").unwrap();
        assert!(matches!(
            missing_count.resolve(&registry(), Task::Ner).unwrap_err(),
            ConfigError::MissingThreshold { field: "min_count", .. }
        ));

        let missing_max = TestConfig::from_yaml("tests:\n  fairness:\n    max_gender_f1_score:\n").unwrap();
        assert!(matches!(
            missing_max.resolve(&registry(), Task::Ner).unwrap_err(),
            ConfigError::MissingThreshold { field: "max_score", .. }
        ));
    }

    #[test]
    fn test_config_yaml_roundtrip() {
        let config = TestConfig::default_suite();
        let yaml = config.to_yaml().unwrap();
        assert_eq!(TestConfig::from_yaml(&yaml).unwrap(), config);
    }

    #[test]
    fn test_load_missing_file() {
        let err = TestConfig::load(Path::new("/nonexistent/config.yml")).unwrap_err();
        assert!(matches!(err, ConfigError::FileNotFound { .. }));
    }
}
