//! Perturbation Registry: catalog of named transforms.
//!
//! Every test the harness can generate is registered here under a unique
//! name together with its category. Text perturbations implement the
//! [`Perturbation`] trait; dataset-level and metric-based tests
//! (representation, accuracy, fairness) are described by [`TransformKind`]
//! variants interpreted by the engine and the judge.
//!
//! Built-ins are closed enums selected by name when the configuration is
//! resolved; additional perturbations can be registered through the same
//! trait.

pub mod bias;
pub mod dictionaries;
pub mod robustness;
pub mod text;

use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::{ConfigError, RegistryError};
use crate::metrics::Metric;
use crate::subgroup::Dimension;
use crate::types::{Category, Edit, Sample, Task, ThresholdKind};

pub use bias::{Bias, BiasSwap, GroupTable, PronounSet};
pub use robustness::Robustness;

/// One perturbed rendering of a record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Variant {
    pub text: String,
    pub edits: Vec<Edit>,
}

/// Typed, load-time validated parameters of a transform.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransformParams {
    #[default]
    None,
    Punctuation(PunctuationParams),
    Context(ContextParams),
    Terminology(TerminologyParams),
    /// Parameters of a user-registered perturbation, passed through untyped.
    Custom(serde_json::Value),
}

/// Parameters for `add_punctuation` / `strip_punctuation`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PunctuationParams {
    pub whitelist: Vec<String>,
}

impl PunctuationParams {
    pub const FIELDS: &'static [&'static str] = &["whitelist"];
}

impl Default for PunctuationParams {
    fn default() -> Self {
        Self {
            whitelist: dictionaries::DEFAULT_PUNCTUATION
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

/// Where `add_context` inserts its phrases.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextStrategy {
    Start,
    End,
    #[default]
    Combined,
}

/// Parameters for `add_context`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextParams {
    pub starting_context: Vec<String>,
    pub ending_context: Vec<String>,
    pub strategy: ContextStrategy,
}

impl ContextParams {
    pub const FIELDS: &'static [&'static str] = &["starting_context", "ending_context", "strategy"];
}

impl Default for ContextParams {
    fn default() -> Self {
        Self {
            starting_context: to_strings(dictionaries::DEFAULT_STARTING_CONTEXT),
            ending_context: to_strings(dictionaries::DEFAULT_ENDING_CONTEXT),
            strategy: ContextStrategy::Combined,
        }
    }
}

/// Parameters for `swap_entities`: replacement terms by entity type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TerminologyParams {
    pub terminology: BTreeMap<String, Vec<String>>,
}

impl TerminologyParams {
    pub const FIELDS: &'static [&'static str] = &["terminology"];
}

impl Default for TerminologyParams {
    fn default() -> Self {
        Self {
            terminology: dictionaries::DEFAULT_TERMINOLOGY
                .iter()
                .map(|(ty, terms)| (ty.to_string(), to_strings(terms)))
                .collect(),
        }
    }
}

fn to_strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

/// Deserialize a parameter block, warning about keys outside `fields`.
pub fn parse_known<T>(
    transform: &str,
    raw: &serde_yaml::Value,
    fields: &[&str],
) -> Result<T, ConfigError>
where
    T: DeserializeOwned + Default,
{
    if raw.is_null() {
        return Ok(T::default());
    }
    let Some(map) = raw.as_mapping() else {
        return Err(ConfigError::InvalidParameters {
            name: transform.to_string(),
            reason: "parameters must be a mapping".into(),
        });
    };
    for key in map.keys() {
        let key = key.as_str().unwrap_or("<non-string key>");
        if !fields.contains(&key) {
            warn!(transform, parameter = key, "Ignoring unknown parameter");
        }
    }
    serde_yaml::from_value(raw.clone()).map_err(|e| ConfigError::InvalidParameters {
        name: transform.to_string(),
        reason: e.to_string(),
    })
}

/// Deterministic RNG for one (transform, record) pair.
///
/// Seeded from the run seed, an FNV-1a hash of the transform name and the
/// record index, so a suite regenerates identically regardless of which
/// other transforms are configured or how records are scheduled.
pub fn record_rng(seed: u64, transform: &str, record: usize) -> StdRng {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for byte in transform.bytes() {
        hash ^= u64::from(byte);
        hash = hash.wrapping_mul(0x0100_0000_01b3);
    }
    let mixed = hash ^ seed ^ (record as u64).wrapping_mul(0x9e37_79b9_7f4a_7c15);
    StdRng::seed_from_u64(mixed)
}

/// A text transform: one record in, zero or more variants out.
///
/// Implementations must be pure: the same sample, params and RNG state give
/// the same variants. A record the transform cannot change yields no
/// variants rather than an unchanged copy.
pub trait Perturbation: Send + Sync {
    /// The unique name of this transform.
    fn name(&self) -> &str;

    /// Robustness or bias.
    fn category(&self) -> Category;

    /// Whether this transform applies to the given task.
    fn supports(&self, _task: Task) -> bool {
        true
    }

    /// Validate and type the `parameters` block of the configuration.
    fn parse_params(&self, raw: &serde_yaml::Value) -> Result<TransformParams, ConfigError> {
        if raw.is_null() {
            return Ok(TransformParams::None);
        }
        serde_json::to_value(raw)
            .map(TransformParams::Custom)
            .map_err(|e| ConfigError::InvalidParameters {
                name: self.name().to_string(),
                reason: e.to_string(),
            })
    }

    /// Produce the perturbed variants of one sample.
    fn perturb(&self, sample: &Sample, params: &TransformParams, rng: &mut StdRng) -> Vec<Variant>;
}

/// Whether a representation test counts members or measures their share.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Measure {
    Count,
    Proportion,
}

/// Direction of a fairness bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Bound {
    Min,
    Max,
}

/// How a registered transform produces and judges its test cases.
#[derive(Clone)]
pub enum TransformKind {
    /// Per-record text perturbation judged on label invariance.
    Perturbation(Arc<dyn Perturbation>),
    /// Dataset composition per subgroup; no model involved.
    Representation { dimension: Dimension, measure: Measure },
    /// Ground-truth comparison aggregated into one score.
    Accuracy(Metric),
    /// Macro-F1 per subgroup compared against a bound.
    Fairness { dimension: Dimension, bound: Bound },
}

impl std::fmt::Debug for TransformKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransformKind::Perturbation(p) => write!(f, "Perturbation({})", p.name()),
            TransformKind::Representation { dimension, measure } => {
                write!(f, "Representation({dimension:?}, {measure:?})")
            }
            TransformKind::Accuracy(metric) => write!(f, "Accuracy({metric:?})"),
            TransformKind::Fairness { dimension, bound } => {
                write!(f, "Fairness({dimension:?}, {bound:?})")
            }
        }
    }
}

/// A registry entry.
#[derive(Debug, Clone)]
pub struct RegisteredTransform {
    pub name: String,
    pub category: Category,
    pub kind: TransformKind,
}

impl RegisteredTransform {
    /// The threshold this transform is judged against.
    pub fn threshold_kind(&self) -> ThresholdKind {
        match &self.kind {
            TransformKind::Perturbation(_) => ThresholdKind::MinPassRate,
            TransformKind::Representation {
                measure: Measure::Count,
                ..
            } => ThresholdKind::MinCount,
            TransformKind::Representation {
                measure: Measure::Proportion,
                ..
            } => ThresholdKind::MinProportion,
            TransformKind::Accuracy(_) => ThresholdKind::MinScore,
            TransformKind::Fairness {
                bound: Bound::Min, ..
            } => ThresholdKind::MinScore,
            TransformKind::Fairness {
                bound: Bound::Max, ..
            } => ThresholdKind::MaxScore,
        }
    }

    pub fn supports(&self, task: Task) -> bool {
        match &self.kind {
            TransformKind::Perturbation(p) => p.supports(task),
            _ => true,
        }
    }

    /// Parameters used when the configuration gives none.
    pub fn default_params(&self) -> Result<TransformParams, ConfigError> {
        self.parse_params(&serde_yaml::Value::Null)
    }

    pub fn parse_params(&self, raw: &serde_yaml::Value) -> Result<TransformParams, ConfigError> {
        match &self.kind {
            TransformKind::Perturbation(p) => p.parse_params(raw),
            _ => {
                if !raw.is_null() {
                    warn!(transform = %self.name, "Transform takes no parameters; ignoring them");
                }
                Ok(TransformParams::None)
            }
        }
    }
}

/// The transform registry holds every named transform available to a run.
#[derive(Debug, Default)]
pub struct PerturbationRegistry {
    transforms: HashMap<String, RegisteredTransform>,
}

impl PerturbationRegistry {
    pub fn new() -> Self {
        Self {
            transforms: HashMap::new(),
        }
    }

    /// A registry holding every built-in transform.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register_builtins();
        registry
    }

    fn register_builtins(&mut self) {
        let mut entries: Vec<(String, Category, TransformKind)> = Vec::new();

        for r in Robustness::ALL {
            entries.push((
                r.name().to_string(),
                Category::Robustness,
                TransformKind::Perturbation(Arc::new(r)),
            ));
        }
        for b in Bias::builtins() {
            entries.push((
                b.name().to_string(),
                Category::Bias,
                TransformKind::Perturbation(Arc::new(b)),
            ));
        }
        for dimension in Dimension::ALL {
            for measure in [Measure::Count, Measure::Proportion] {
                let suffix = match measure {
                    Measure::Count => "count",
                    Measure::Proportion => "proportion",
                };
                entries.push((
                    format!("min_{}_representation_{suffix}", dimension.key()),
                    Category::Representation,
                    TransformKind::Representation { dimension, measure },
                ));
            }
        }
        for (name, metric) in [
            ("min_f1_score", Metric::MacroF1),
            ("min_micro_f1_score", Metric::MicroF1),
            ("min_precision_score", Metric::MacroPrecision),
            ("min_recall_score", Metric::MacroRecall),
        ] {
            entries.push((
                name.to_string(),
                Category::Accuracy,
                TransformKind::Accuracy(metric),
            ));
        }
        for (name, bound) in [
            ("min_gender_f1_score", Bound::Min),
            ("max_gender_f1_score", Bound::Max),
        ] {
            entries.push((
                name.to_string(),
                Category::Fairness,
                TransformKind::Fairness {
                    dimension: Dimension::Gender,
                    bound,
                },
            ));
        }

        for (name, category, kind) in entries {
            self.register(name, category, kind)
                .expect("built-in transforms have unique names and matching categories");
        }
    }

    /// Register a transform. Fails if the name is taken or the category
    /// does not fit the kind of transform.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        category: Category,
        kind: TransformKind,
    ) -> Result<(), RegistryError> {
        let name = name.into();
        if self.transforms.contains_key(&name) {
            return Err(RegistryError::AlreadyRegistered { name });
        }
        let fits = match &kind {
            TransformKind::Perturbation(_) => {
                matches!(category, Category::Robustness | Category::Bias)
            }
            TransformKind::Representation { .. } => category == Category::Representation,
            TransformKind::Accuracy(_) => category == Category::Accuracy,
            TransformKind::Fairness { .. } => category == Category::Fairness,
        };
        if !fits {
            return Err(RegistryError::InvalidCategory { name, category });
        }
        debug!(transform = %name, %category, "Registering transform");
        self.transforms.insert(
            name.clone(),
            RegisteredTransform {
                name,
                category,
                kind,
            },
        );
        Ok(())
    }

    /// Register a perturbation under its own name and category.
    pub fn register_perturbation(
        &mut self,
        perturbation: Arc<dyn Perturbation>,
    ) -> Result<(), RegistryError> {
        let name = perturbation.name().to_string();
        let category = perturbation.category();
        self.register(name, category, TransformKind::Perturbation(perturbation))
    }

    /// Look up a transform by name.
    pub fn get(&self, name: &str) -> Result<&RegisteredTransform, RegistryError> {
        self.transforms
            .get(name)
            .ok_or_else(|| RegistryError::UnknownTransform {
                name: name.to_string(),
            })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.transforms.contains_key(name)
    }

    /// All transforms ordered by category, then name.
    pub fn list(&self) -> Vec<&RegisteredTransform> {
        let mut all: Vec<_> = self.transforms.values().collect();
        all.sort_by(|a, b| a.category.cmp(&b.category).then(a.name.cmp(&b.name)));
        all
    }

    pub fn len(&self) -> usize {
        self.transforms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transforms.is_empty()
    }
}
