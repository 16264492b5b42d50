//! Label-preserving robustness perturbations.
//!
//! Each transform rewrites the surface of a text (case, punctuation, typos,
//! spelling variety, surrounding context, contractions, entity names) in a
//! way that should not change what a robust model predicts.

use rand::Rng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use std::borrow::Cow;
use std::collections::HashMap;
use std::sync::LazyLock;
use tracing::warn;

use super::dictionaries::{AMERICAN_TO_BRITISH, CONTRACTIONS};
use super::text::{match_case, substitute, title_case, word_pattern};
use super::{
    ContextParams, ContextStrategy, Perturbation, PunctuationParams, TerminologyParams,
    TransformParams, Variant, parse_known,
};
use crate::error::ConfigError;
use crate::types::{Category, Edit, OUTSIDE_TAG, Sample, Task, split_bio};

struct SpellingMap {
    pattern: regex::Regex,
    map: HashMap<&'static str, &'static str>,
}

impl SpellingMap {
    fn new(pairs: impl Iterator<Item = (&'static str, &'static str)>) -> Self {
        let map: HashMap<_, _> = pairs.collect();
        Self {
            pattern: word_pattern(map.keys().copied(), true),
            map,
        }
    }

    fn apply(&self, text: &str) -> Option<Variant> {
        substitute(text, &self.pattern, |m| {
            self.map
                .get(m.as_str().to_lowercase().as_str())
                .map(|target| match_case(m.as_str(), target))
        })
    }
}

static TO_BRITISH: LazyLock<SpellingMap> =
    LazyLock::new(|| SpellingMap::new(AMERICAN_TO_BRITISH.iter().copied()));

static TO_AMERICAN: LazyLock<SpellingMap> =
    LazyLock::new(|| SpellingMap::new(AMERICAN_TO_BRITISH.iter().map(|&(a, b)| (b, a))));

static CONTRACT: LazyLock<SpellingMap> =
    LazyLock::new(|| SpellingMap::new(CONTRACTIONS.iter().copied()));

/// The built-in robustness transforms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Robustness {
    Uppercase,
    Lowercase,
    Titlecase,
    AddPunctuation,
    StripPunctuation,
    AddTypo,
    AmericanToBritish,
    BritishToAmerican,
    AddContext,
    AddContraction,
    SwapEntities,
}

impl Robustness {
    pub const ALL: [Robustness; 11] = [
        Robustness::Uppercase,
        Robustness::Lowercase,
        Robustness::Titlecase,
        Robustness::AddPunctuation,
        Robustness::StripPunctuation,
        Robustness::AddTypo,
        Robustness::AmericanToBritish,
        Robustness::BritishToAmerican,
        Robustness::AddContext,
        Robustness::AddContraction,
        Robustness::SwapEntities,
    ];
}

impl Perturbation for Robustness {
    fn name(&self) -> &str {
        match self {
            Robustness::Uppercase => "uppercase",
            Robustness::Lowercase => "lowercase",
            Robustness::Titlecase => "titlecase",
            Robustness::AddPunctuation => "add_punctuation",
            Robustness::StripPunctuation => "strip_punctuation",
            Robustness::AddTypo => "add_typo",
            Robustness::AmericanToBritish => "american_to_british",
            Robustness::BritishToAmerican => "british_to_american",
            Robustness::AddContext => "add_context",
            Robustness::AddContraction => "add_contraction",
            Robustness::SwapEntities => "swap_entities",
        }
    }

    fn category(&self) -> Category {
        Category::Robustness
    }

    fn supports(&self, task: Task) -> bool {
        match self {
            Robustness::SwapEntities => task == Task::Ner,
            _ => true,
        }
    }

    fn parse_params(&self, raw: &serde_yaml::Value) -> Result<TransformParams, ConfigError> {
        let name = self.name();
        match self {
            Robustness::AddPunctuation | Robustness::StripPunctuation => {
                let params: PunctuationParams = parse_known(name, raw, PunctuationParams::FIELDS)?;
                if params.whitelist.iter().all(|m| m.is_empty()) {
                    return Err(ConfigError::InvalidParameters {
                        name: name.to_string(),
                        reason: "whitelist must contain at least one mark".into(),
                    });
                }
                Ok(TransformParams::Punctuation(params))
            }
            Robustness::AddContext => {
                let params: ContextParams = parse_known(name, raw, ContextParams::FIELDS)?;
                let needs_start = params.strategy != ContextStrategy::End;
                let needs_end = params.strategy != ContextStrategy::Start;
                if (needs_start && params.starting_context.is_empty())
                    || (needs_end && params.ending_context.is_empty())
                {
                    return Err(ConfigError::InvalidParameters {
                        name: name.to_string(),
                        reason: format!(
                            "strategy '{:?}' needs non-empty context lists",
                            params.strategy
                        ),
                    });
                }
                Ok(TransformParams::Context(params))
            }
            Robustness::SwapEntities => {
                let params: TerminologyParams = parse_known(name, raw, TerminologyParams::FIELDS)?;
                Ok(TransformParams::Terminology(params))
            }
            _ => {
                if !raw.is_null() {
                    warn!(transform = name, "Transform takes no parameters; ignoring them");
                }
                Ok(TransformParams::None)
            }
        }
    }

    fn perturb(&self, sample: &Sample, params: &TransformParams, rng: &mut StdRng) -> Vec<Variant> {
        let text = sample.text.as_str();
        let variant = match self {
            Robustness::Uppercase => whole(text, text.to_uppercase()),
            Robustness::Lowercase => whole(text, text.to_lowercase()),
            Robustness::Titlecase => whole(text, title_case(text)),
            Robustness::AddPunctuation => add_punctuation(text, &punctuation(params), rng),
            Robustness::StripPunctuation => strip_punctuation(text, &punctuation(params)),
            Robustness::AddTypo => add_typo(text, rng),
            Robustness::AmericanToBritish => TO_BRITISH.apply(text),
            Robustness::BritishToAmerican => TO_AMERICAN.apply(text),
            Robustness::AddContext => add_context(text, &context(params), rng),
            Robustness::AddContraction => CONTRACT.apply(text),
            Robustness::SwapEntities => swap_entities(sample, &terminology(params), rng),
        };
        variant.into_iter().collect()
    }
}

fn punctuation(params: &TransformParams) -> Cow<'_, PunctuationParams> {
    match params {
        TransformParams::Punctuation(p) => Cow::Borrowed(p),
        _ => Cow::Owned(PunctuationParams::default()),
    }
}

fn context(params: &TransformParams) -> Cow<'_, ContextParams> {
    match params {
        TransformParams::Context(p) => Cow::Borrowed(p),
        _ => Cow::Owned(ContextParams::default()),
    }
}

fn terminology(params: &TransformParams) -> Cow<'_, TerminologyParams> {
    match params {
        TransformParams::Terminology(p) => Cow::Borrowed(p),
        _ => Cow::Owned(TerminologyParams::default()),
    }
}

/// A variant replacing the whole text, or `None` if nothing changed.
fn whole(original: &str, perturbed: String) -> Option<Variant> {
    if perturbed == original {
        return None;
    }
    Some(Variant {
        edits: vec![Edit {
            start: 0,
            end: original.len(),
            original: original.to_string(),
            replacement: perturbed.clone(),
        }],
        text: perturbed,
    })
}

fn ends_with_mark<'a>(text: &str, whitelist: &'a [String]) -> Option<&'a str> {
    whitelist
        .iter()
        .filter(|m| !m.is_empty())
        .find(|m| text.ends_with(m.as_str()))
        .map(String::as_str)
}

fn add_punctuation(text: &str, params: &PunctuationParams, rng: &mut StdRng) -> Option<Variant> {
    let trimmed = text.trim_end();
    if ends_with_mark(trimmed, &params.whitelist).is_some() {
        return None;
    }
    let marks: Vec<&String> = params.whitelist.iter().filter(|m| !m.is_empty()).collect();
    let mark = marks.choose(rng)?;
    let perturbed = format!("{trimmed}{mark}");
    Some(Variant {
        edits: vec![Edit {
            start: trimmed.len(),
            end: text.len(),
            original: text[trimmed.len()..].to_string(),
            replacement: mark.to_string(),
        }],
        text: perturbed,
    })
}

fn strip_punctuation(text: &str, params: &PunctuationParams) -> Option<Variant> {
    let trimmed = text.trim_end();
    let mut stripped = trimmed;
    while let Some(mark) = ends_with_mark(stripped, &params.whitelist) {
        stripped = stripped[..stripped.len() - mark.len()].trim_end();
    }
    if stripped.len() == trimmed.len() || stripped.is_empty() {
        return None;
    }
    Some(Variant {
        text: stripped.to_string(),
        edits: vec![Edit {
            start: stripped.len(),
            end: text.len(),
            original: text[stripped.len()..].to_string(),
            replacement: String::new(),
        }],
    })
}

/// Byte spans of whitespace-separated tokens.
pub(crate) fn token_spans(text: &str) -> Vec<(usize, usize)> {
    let mut spans = Vec::new();
    let mut start = None;
    for (i, c) in text.char_indices() {
        match (c.is_whitespace(), start) {
            (true, Some(s)) => {
                spans.push((s, i));
                start = None;
            }
            (false, None) => start = Some(i),
            _ => {}
        }
    }
    if let Some(s) = start {
        spans.push((s, text.len()));
    }
    spans
}

/// Swap two adjacent, distinct letters inside one word of four or more letters.
fn add_typo(text: &str, rng: &mut StdRng) -> Option<Variant> {
    let candidates: Vec<((usize, usize), Vec<usize>)> = token_spans(text)
        .into_iter()
        .filter_map(|(start, end)| {
            let chars: Vec<char> = text[start..end].chars().collect();
            if chars.iter().filter(|c| c.is_alphabetic()).count() < 4 {
                return None;
            }
            // Keep the first letter in place; swapping it reads as a new word.
            let positions: Vec<usize> = (1..chars.len().saturating_sub(1))
                .filter(|&i| {
                    chars[i].is_alphabetic()
                        && chars[i + 1].is_alphabetic()
                        && chars[i] != chars[i + 1]
                })
                .collect();
            (!positions.is_empty()).then_some(((start, end), positions))
        })
        .collect();

    let ((start, end), positions) = candidates.choose(rng)?;
    let i = positions[rng.gen_range(0..positions.len())];
    let mut chars: Vec<char> = text[*start..*end].chars().collect();
    chars.swap(i, i + 1);
    let word: String = chars.into_iter().collect();

    let mut perturbed = String::with_capacity(text.len());
    perturbed.push_str(&text[..*start]);
    perturbed.push_str(&word);
    perturbed.push_str(&text[*end..]);
    Some(Variant {
        text: perturbed,
        edits: vec![Edit {
            start: *start,
            end: *end,
            original: text[*start..*end].to_string(),
            replacement: word,
        }],
    })
}

fn add_context(text: &str, params: &ContextParams, rng: &mut StdRng) -> Option<Variant> {
    let mut perturbed = text.to_string();
    let mut edits = Vec::new();
    if params.strategy != ContextStrategy::End {
        let prefix = params.starting_context.choose(rng)?;
        perturbed = format!("{prefix} {perturbed}");
        edits.push(Edit {
            start: 0,
            end: 0,
            original: String::new(),
            replacement: format!("{prefix} "),
        });
    }
    if params.strategy != ContextStrategy::Start {
        let suffix = params.ending_context.choose(rng)?;
        perturbed = format!("{perturbed} {suffix}");
        edits.push(Edit {
            start: text.len(),
            end: text.len(),
            original: String::new(),
            replacement: format!(" {suffix}"),
        });
    }
    Some(Variant {
        text: perturbed,
        edits,
    })
}

/// Entity chunks of a BIO tag sequence as (first token, last token, type).
pub(crate) fn entity_chunks(tags: &[String]) -> Vec<(usize, usize, String)> {
    let mut chunks: Vec<(usize, usize, String)> = Vec::new();
    for (i, tag) in tags.iter().enumerate() {
        if tag == OUTSIDE_TAG {
            continue;
        }
        let (prefix, ty) = split_bio(tag);
        match chunks.last_mut() {
            Some((_, end, last_ty)) if prefix == Some('I') && *end + 1 == i && last_ty.as_str() == ty => {
                *end = i;
            }
            _ => chunks.push((i, i, ty.to_string())),
        }
    }
    chunks
}

/// Replace one entity chunk with a term of the same type.
fn swap_entities(sample: &Sample, params: &TerminologyParams, rng: &mut StdRng) -> Option<Variant> {
    let text = sample.text.as_str();
    let tags = &sample.expected.as_ref()?.labels;
    let spans = token_spans(text);
    if spans.len() != tags.len() {
        return None;
    }

    let swappable: Vec<(usize, usize, Vec<&String>)> = entity_chunks(tags)
        .into_iter()
        .filter_map(|(first, last, ty)| {
            let current = &text[spans[first].0..spans[last].1];
            let terms: Vec<&String> = params
                .terminology
                .get(&ty)?
                .iter()
                .filter(|t| !t.is_empty() && t.as_str() != current)
                .collect();
            (!terms.is_empty()).then_some((first, last, terms))
        })
        .collect();

    let (first, last, terms) = swappable.choose(rng)?;
    let term = terms.choose(rng)?;
    let (start, end) = (spans[*first].0, spans[*last].1);
    Some(Variant {
        text: format!("{}{}{}", &text[..start], term, &text[end..]),
        edits: vec![Edit {
            start,
            end,
            original: text[start..end].to_string(),
            replacement: term.to_string(),
        }],
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::perturbation::record_rng;
    use crate::types::Prediction;
    use pretty_assertions::assert_eq;

    fn run(t: Robustness, text: &str) -> Vec<Variant> {
        t.perturb(&Sample::new(text), &TransformParams::None, &mut record_rng(7, t.name(), 0))
    }

    fn one(t: Robustness, text: &str) -> String {
        let variants = run(t, text);
        assert_eq!(variants.len(), 1, "expected one variant for {text:?}");
        variants[0].text.clone()
    }

    #[test]
    fn test_case_transforms() {
        assert_eq!(one(Robustness::Uppercase, "I live in London"), "I LIVE IN LONDON");
        assert_eq!(one(Robustness::Lowercase, "I live in London"), "i live in london");
        assert_eq!(one(Robustness::Titlecase, "i live in london"), "I Live In London");
        assert!(run(Robustness::Uppercase, "ALREADY LOUD").is_empty());
    }

    #[test]
    fn test_add_punctuation_appends_whitelisted_mark() {
        let out = one(Robustness::AddPunctuation, "The quick brown fox jumps over the lazy dog");
        assert!(out.starts_with("The quick brown fox jumps over the lazy dog"));
        let last = out.chars().last().unwrap().to_string();
        assert!(crate::perturbation::dictionaries::DEFAULT_PUNCTUATION.contains(&last.as_str()));
        assert_ne!(one(Robustness::AddPunctuation, "Good morning"), "Good morning");
    }

    #[test]
    fn test_add_punctuation_leaves_punctuated_text() {
        assert!(run(Robustness::AddPunctuation, "Good morning!").is_empty());
        assert!(run(Robustness::AddPunctuation, "Is it?  ").is_empty());
    }

    #[test]
    fn test_add_punctuation_respects_custom_whitelist() {
        let params = TransformParams::Punctuation(PunctuationParams {
            whitelist: vec!["!".into()],
        });
        let sample = Sample::new("Good morning");
        let v = Robustness::AddPunctuation.perturb(&sample, &params, &mut record_rng(1, "x", 0));
        assert_eq!(v[0].text, "Good morning!");
        // A period is not in this whitelist, so the text is still perturbed.
        let v = Robustness::AddPunctuation.perturb(&Sample::new("Done."), &params, &mut record_rng(1, "x", 0));
        assert_eq!(v[0].text, "Done.!");
    }

    #[test]
    fn test_strip_punctuation() {
        assert_eq!(
            one(Robustness::StripPunctuation, "I cannot live in USA due to torandos caramelized!"),
            "I cannot live in USA due to torandos caramelized"
        );
        assert!(run(Robustness::StripPunctuation, "No marks here").is_empty());
        assert!(run(Robustness::StripPunctuation, "?!").is_empty());
    }

    #[test]
    fn test_add_typo_changes_one_word() {
        let text = "Robust models tolerate noise";
        let out = one(Robustness::AddTypo, text);
        assert_ne!(out, text);
        let changed: Vec<_> = text
            .split(' ')
            .zip(out.split(' '))
            .filter(|(a, b)| a != b)
            .collect();
        assert_eq!(changed.len(), 1);
        let (a, b) = changed[0];
        let mut sa: Vec<char> = a.chars().collect();
        let mut sb: Vec<char> = b.chars().collect();
        sa.sort_unstable();
        sb.sort_unstable();
        assert_eq!(sa, sb);
        assert!(run(Robustness::AddTypo, "a an the").is_empty());
    }

    #[test]
    fn test_american_to_british() {
        assert_eq!(
            one(Robustness::AmericanToBritish, "I cannot live in USA due to torandos caramelized"),
            "I cannot live in USA due to torandos caramelised"
        );
        assert!(run(Robustness::AmericanToBritish, "I live in London, United Kingdom since 2019").is_empty());
        assert_eq!(one(Robustness::BritishToAmerican, "My Favourite colour"), "My Favorite color");
    }

    #[test]
    fn test_add_context_combined() {
        let params = TransformParams::Context(ContextParams {
            starting_context: vec!["Hello".into()],
            ending_context: vec!["Bye".into()],
            strategy: ContextStrategy::Combined,
        });
        let v = Robustness::AddContext.perturb(
            &Sample::new("I live in London"),
            &params,
            &mut record_rng(0, "add_context", 0),
        );
        assert_eq!(v[0].text, "Hello I live in London Bye");
        assert_eq!(v[0].edits.len(), 2);
    }

    #[test]
    fn test_add_contraction() {
        assert_eq!(
            one(Robustness::AddContraction, "I cannot live in USA due to torandos caramelized"),
            "I can't live in USA due to torandos caramelized"
        );
        assert_eq!(one(Robustness::AddContraction, "Do not go"), "Don't go");
        assert!(run(Robustness::AddContraction, "I live in London, United Kingdom since 2019").is_empty());
    }

    fn ner_sample() -> Sample {
        Sample::new("John Smith lives in Paris").with_expected(Prediction::tags([
            "B-PER", "I-PER", "O", "O", "B-LOC",
        ]))
    }

    #[test]
    fn test_entity_chunks() {
        let tags: Vec<String> = ["B-PER", "I-PER", "O", "B-LOC", "B-LOC", "I-ORG"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(
            entity_chunks(&tags),
            vec![
                (0, 1, "PER".to_string()),
                (3, 3, "LOC".to_string()),
                (4, 4, "LOC".to_string()),
                (5, 5, "ORG".to_string()),
            ]
        );
    }

    #[test]
    fn test_swap_entities_replaces_one_chunk() {
        let params = TransformParams::Terminology(TerminologyParams {
            terminology: [("LOC".to_string(), vec!["Chelsea".to_string()])].into(),
        });
        let v = Robustness::SwapEntities.perturb(&ner_sample(), &params, &mut record_rng(3, "swap_entities", 0));
        assert_eq!(v[0].text, "John Smith lives in Chelsea");
        assert_eq!(v[0].edits[0].original, "Paris");
    }

    #[test]
    fn test_swap_entities_is_seed_deterministic() {
        let params = TransformParams::None;
        let a = Robustness::SwapEntities.perturb(&ner_sample(), &params, &mut record_rng(11, "swap_entities", 0));
        let b = Robustness::SwapEntities.perturb(&ner_sample(), &params, &mut record_rng(11, "swap_entities", 0));
        assert_eq!(a, b);
        assert_eq!(a.len(), 1);
    }

    #[test]
    fn test_swap_entities_needs_labels() {
        assert!(run(Robustness::SwapEntities, "John lives in Paris").is_empty());
        assert!(!Robustness::SwapEntities.supports(Task::TextClassification));
    }

    #[test]
    fn test_token_spans() {
        assert_eq!(token_spans(" ab  c "), vec![(1, 3), (5, 6)]);
    }

    #[test]
    fn test_add_context_rejects_empty_lists() {
        let raw: serde_yaml::Value = serde_yaml::from_str("starting_context: []\nstrategy: start").unwrap();
        assert!(Robustness::AddContext.parse_params(&raw).is_err());
    }
}
