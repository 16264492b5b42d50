//! Bias perturbations: swap demographic cues for those of one target group.
//!
//! A model free of the probed bias keeps its prediction when pronouns,
//! first names, last names or country names are replaced with ones from
//! another group.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use regex::Regex;
use std::collections::HashMap;
use tracing::warn;

use super::dictionaries::{
    COUNTRIES, FEMALE_PRONOUNS, FIRST_NAMES, LAST_NAMES, MALE_PRONOUNS, NEUTRAL_PRONOUNS, group,
};
use super::text::{followed_by_punctuation, match_case, substitute, word_pattern};
use super::{Perturbation, TransformParams, Variant};
use crate::error::ConfigError;
use crate::types::{Category, Sample};

/// Target pronoun set of a pronoun swap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PronounSet {
    Male,
    Female,
    Neutral,
}

impl PronounSet {
    pub const ALL: [PronounSet; 3] = [PronounSet::Male, PronounSet::Female, PronounSet::Neutral];

    pub fn key(&self) -> &'static str {
        match self {
            PronounSet::Male => "male",
            PronounSet::Female => "female",
            PronounSet::Neutral => "neutral",
        }
    }

    fn words(&self) -> &'static [&'static str] {
        match self {
            PronounSet::Male => MALE_PRONOUNS,
            PronounSet::Female => FEMALE_PRONOUNS,
            PronounSet::Neutral => NEUTRAL_PRONOUNS,
        }
    }

    /// The pronoun of this set filling `role`.
    fn form(&self, role: Role) -> &'static str {
        match (self, role) {
            (PronounSet::Male, Role::Subject) => "he",
            (PronounSet::Male, Role::Object) => "him",
            (PronounSet::Male, Role::Determiner | Role::Possessive) => "his",
            (PronounSet::Male, Role::Reflexive) => "himself",
            (PronounSet::Female, Role::Subject) => "she",
            (PronounSet::Female, Role::Object | Role::Determiner) => "her",
            (PronounSet::Female, Role::Possessive) => "hers",
            (PronounSet::Female, Role::Reflexive) => "herself",
            (PronounSet::Neutral, Role::Subject) => "they",
            (PronounSet::Neutral, Role::Object) => "them",
            (PronounSet::Neutral, Role::Determiner) => "their",
            (PronounSet::Neutral, Role::Possessive) => "theirs",
            (PronounSet::Neutral, Role::Reflexive) => "themselves",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Role {
    Subject,
    Object,
    Determiner,
    Possessive,
    Reflexive,
}

/// Grammatical role of a matched pronoun. `her` and `his` are ambiguous;
/// a following word makes them determiners.
fn role_of(word: &str, text: &str, end: usize) -> Option<Role> {
    let before_word = !followed_by_punctuation(text, end);
    match word.to_lowercase().as_str() {
        "he" | "she" | "they" => Some(Role::Subject),
        "him" | "them" => Some(Role::Object),
        "her" if before_word => Some(Role::Determiner),
        "her" => Some(Role::Object),
        "his" if before_word => Some(Role::Determiner),
        "his" | "hers" | "theirs" => Some(Role::Possessive),
        "their" => Some(Role::Determiner),
        "himself" | "herself" | "themselves" => Some(Role::Reflexive),
        _ => None,
    }
}

/// Keyed word table a group swap draws from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupTable {
    FirstNames,
    LastNames,
    Countries,
}

impl GroupTable {
    pub fn table(&self) -> &'static [(&'static str, &'static [&'static str])] {
        match self {
            GroupTable::FirstNames => FIRST_NAMES,
            GroupTable::LastNames => LAST_NAMES,
            GroupTable::Countries => COUNTRIES,
        }
    }

    fn transform_name(&self, target: &str) -> String {
        match self {
            GroupTable::FirstNames => format!("replace_to_{target}_firstnames"),
            GroupTable::LastNames => format!("replace_to_{target}_lastnames"),
            GroupTable::Countries => format!("replace_to_{target}_country"),
        }
    }
}

/// What a bias transform replaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BiasSwap {
    Pronouns(PronounSet),
    Group {
        table: GroupTable,
        target: &'static str,
    },
}

/// A built-in bias transform.
#[derive(Debug, Clone)]
pub struct Bias {
    name: String,
    swap: BiasSwap,
    pattern: Regex,
}

impl Bias {
    pub fn new(swap: BiasSwap) -> Self {
        let (name, pattern) = match swap {
            BiasSwap::Pronouns(target) => {
                let sources = PronounSet::ALL
                    .into_iter()
                    .filter(|s| *s != target)
                    .flat_map(|s| s.words().iter().copied());
                (
                    format!("replace_to_{}_pronouns", target.key()),
                    word_pattern(sources, true),
                )
            }
            BiasSwap::Group { table, target } => {
                let sources = table
                    .table()
                    .iter()
                    .filter(|(g, _)| *g != target)
                    .flat_map(|(_, words)| words.iter().copied());
                (table.transform_name(target), word_pattern(sources, false))
            }
        };
        Self {
            name,
            swap,
            pattern,
        }
    }

    pub fn swap(&self) -> BiasSwap {
        self.swap
    }

    /// Every built-in bias transform.
    pub fn builtins() -> Vec<Bias> {
        let mut all: Vec<Bias> = PronounSet::ALL
            .into_iter()
            .map(|p| Bias::new(BiasSwap::Pronouns(p)))
            .collect();
        for table in [
            GroupTable::FirstNames,
            GroupTable::LastNames,
            GroupTable::Countries,
        ] {
            for (target, _) in table.table() {
                all.push(Bias::new(BiasSwap::Group {
                    table,
                    target: *target,
                }));
            }
        }
        all
    }

    fn swap_pronouns(&self, text: &str, target: PronounSet) -> Option<Variant> {
        substitute(text, &self.pattern, |m| {
            let role = role_of(m.as_str(), text, m.end())?;
            Some(match_case(m.as_str(), target.form(role)))
        })
    }

    fn swap_group(
        &self,
        text: &str,
        table: GroupTable,
        target: &str,
        rng: &mut StdRng,
    ) -> Option<Variant> {
        let replacements = group(table.table(), target)?;
        // The same source word maps to the same replacement within a record.
        let mut chosen: HashMap<String, &str> = HashMap::new();
        substitute(text, &self.pattern, |m| {
            if let Some(r) = chosen.get(m.as_str()) {
                return Some(r.to_string());
            }
            let r = *replacements.choose(rng)?;
            chosen.insert(m.as_str().to_string(), r);
            Some(r.to_string())
        })
    }
}

impl Perturbation for Bias {
    fn name(&self) -> &str {
        &self.name
    }

    fn category(&self) -> Category {
        Category::Bias
    }

    fn parse_params(&self, raw: &serde_yaml::Value) -> Result<TransformParams, ConfigError> {
        if !raw.is_null() {
            warn!(transform = %self.name, "Transform takes no parameters; ignoring them");
        }
        Ok(TransformParams::None)
    }

    fn perturb(&self, sample: &Sample, _params: &TransformParams, rng: &mut StdRng) -> Vec<Variant> {
        let variant = match self.swap {
            BiasSwap::Pronouns(target) => self.swap_pronouns(&sample.text, target),
            BiasSwap::Group { table, target } => self.swap_group(&sample.text, table, target, rng),
        };
        variant.into_iter().collect()
    }
}
