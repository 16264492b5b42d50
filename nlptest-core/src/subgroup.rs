//! Subgroup classification of dataset records.
//!
//! Representation and fairness tests partition records along a
//! [`Dimension`]: gender cues, name ethnicity, ground-truth label or the
//! income group of mentioned countries.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::LazyLock;

use crate::perturbation::dictionaries::{
    COUNTRIES, FEMALE_PRONOUNS, FEMALE_WORDS, FIRST_NAMES, LAST_NAMES, MALE_PRONOUNS, MALE_WORDS,
    group_of,
};
use crate::perturbation::text::word_pattern;
use crate::types::{Sample, Task};

pub const MALE: &str = "male";
pub const FEMALE: &str = "female";
pub const UNKNOWN: &str = "unknown";

static COUNTRY_PATTERN: LazyLock<regex::Regex> = LazyLock::new(|| {
    word_pattern(
        COUNTRIES.iter().flat_map(|(_, names)| names.iter().copied()),
        false,
    )
});

/// Axis along which records are grouped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dimension {
    Gender,
    Ethnicity,
    Label,
    CountryEconomic,
}

impl Dimension {
    pub const ALL: [Dimension; 4] = [
        Dimension::Gender,
        Dimension::Ethnicity,
        Dimension::Label,
        Dimension::CountryEconomic,
    ];

    /// Name fragment used in transform names (`min_{key}_representation_count`).
    pub fn key(&self) -> &'static str {
        match self {
            Dimension::Gender => "gender",
            Dimension::Ethnicity => "ethnicity_name",
            Dimension::Label => "label",
            Dimension::CountryEconomic => "country_economic",
        }
    }

    /// Groups known ahead of time. Label groups come from the data.
    pub fn known_groups(&self) -> Vec<String> {
        let keys: Vec<&str> = match self {
            Dimension::Gender => vec![MALE, FEMALE, UNKNOWN],
            Dimension::Ethnicity => FIRST_NAMES.iter().map(|(g, _)| *g).collect(),
            Dimension::Label => Vec::new(),
            Dimension::CountryEconomic => COUNTRIES.iter().map(|(g, _)| *g).collect(),
        };
        keys.into_iter().map(String::from).collect()
    }

    /// Groups a record belongs to. A record may fall into several groups
    /// (two names of different ethnicities) or none.
    pub fn classify(&self, task: Task, sample: &Sample) -> BTreeSet<String> {
        match self {
            Dimension::Gender => BTreeSet::from([classify_gender(&sample.text).to_string()]),
            // Names are proper nouns; "park" or "cook" in lowercase is not a name.
            Dimension::Ethnicity => words(&sample.text)
                .filter(|w| w.chars().next().is_some_and(char::is_uppercase))
                .filter_map(|w| group_of(FIRST_NAMES, w).or_else(|| group_of(LAST_NAMES, w)))
                .map(String::from)
                .collect(),
            Dimension::Label => labels_of(task, sample),
            Dimension::CountryEconomic => COUNTRY_PATTERN
                .find_iter(&sample.text)
                .filter_map(|m| group_of(COUNTRIES, m.as_str()))
                .map(String::from)
                .collect(),
        }
    }
}

fn words(text: &str) -> impl Iterator<Item = &str> {
    text.split(|c: char| !c.is_alphanumeric() && c != '\'')
        .filter(|w| !w.is_empty())
}

/// `male`, `female` or `unknown` by majority of gendered words.
pub fn classify_gender(text: &str) -> &'static str {
    let (mut male, mut female) = (0usize, 0usize);
    for word in words(text) {
        let lower = word.to_lowercase();
        if MALE_PRONOUNS.contains(&lower.as_str()) || MALE_WORDS.contains(&lower.as_str()) {
            male += 1;
        } else if FEMALE_PRONOUNS.contains(&lower.as_str()) || FEMALE_WORDS.contains(&lower.as_str())
        {
            female += 1;
        }
    }
    match male.cmp(&female) {
        std::cmp::Ordering::Greater => MALE,
        std::cmp::Ordering::Less => FEMALE,
        std::cmp::Ordering::Equal => UNKNOWN,
    }
}

fn labels_of(task: Task, sample: &Sample) -> BTreeSet<String> {
    let Some(expected) = &sample.expected else {
        return BTreeSet::new();
    };
    match task {
        Task::TextClassification => expected.top_label().map(String::from).into_iter().collect(),
        Task::Ner => expected.entity_signature().into_iter().collect(),
    }
}

/// Records per group along `dimension`, including known groups with no
/// members.
pub fn observe(dimension: Dimension, task: Task, samples: &[Sample]) -> BTreeMap<String, usize> {
    let mut counts: BTreeMap<String, usize> = dimension
        .known_groups()
        .into_iter()
        .map(|g| (g, 0))
        .collect();
    for sample in samples {
        for group in dimension.classify(task, sample) {
            *counts.entry(group).or_default() += 1;
        }
    }
    counts
}
