//! Text helpers shared by the built-in transforms: whole-word phrase
//! matching, case-preserving substitution and edit tracking.

use regex::{Match, Regex, RegexBuilder};

use super::Variant;
use crate::types::Edit;

/// Compile a whole-word alternation over `phrases`, longest first.
///
/// Phrases are regex-escaped, so compilation only fails on an empty list,
/// which callers never pass.
pub fn word_pattern<'a, I>(phrases: I, case_insensitive: bool) -> Regex
where
    I: IntoIterator<Item = &'a str>,
{
    let mut phrases: Vec<&str> = phrases.into_iter().collect();
    phrases.sort_by(|a, b| b.len().cmp(&a.len()).then(a.cmp(b)));
    phrases.dedup();
    let alternation = phrases
        .iter()
        .map(|p| regex::escape(p))
        .collect::<Vec<_>>()
        .join("|");
    RegexBuilder::new(&format!(r"\b(?:{alternation})\b"))
        .case_insensitive(case_insensitive)
        .build()
        .expect("escaped word list is a valid pattern")
}

/// Replace every match of `pattern` for which `replace` returns a new string.
///
/// Returns `None` when nothing changed, so callers can report "no variant".
pub fn substitute<F>(text: &str, pattern: &Regex, mut replace: F) -> Option<Variant>
where
    F: FnMut(&Match<'_>) -> Option<String>,
{
    let mut out = String::with_capacity(text.len());
    let mut edits = Vec::new();
    let mut last = 0;
    for m in pattern.find_iter(text) {
        let Some(replacement) = replace(&m) else {
            continue;
        };
        if replacement == m.as_str() {
            continue;
        }
        out.push_str(&text[last..m.start()]);
        out.push_str(&replacement);
        edits.push(Edit {
            start: m.start(),
            end: m.end(),
            original: m.as_str().to_string(),
            replacement,
        });
        last = m.end();
    }
    if edits.is_empty() {
        return None;
    }
    out.push_str(&text[last..]);
    Some(Variant { text: out, edits })
}

/// Re-case `target` after the shape of `source`: ALL CAPS, Capitalized or as-is.
pub fn match_case(source: &str, target: &str) -> String {
    let letters: Vec<char> = source.chars().filter(|c| c.is_alphabetic()).collect();
    if letters.len() > 1 && letters.iter().all(|c| c.is_uppercase()) {
        return target.to_uppercase();
    }
    match source.chars().next() {
        Some(first) if first.is_uppercase() => capitalize(target),
        _ => target.to_string(),
    }
}

/// Uppercase the first character, leaving the rest untouched.
pub fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Title-case every whitespace-separated word, preserving the separators.
pub fn title_case(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut at_word_start = true;
    for c in text.chars() {
        if c.is_whitespace() {
            at_word_start = true;
            out.push(c);
        } else if at_word_start {
            out.extend(c.to_uppercase());
            at_word_start = false;
        } else {
            out.extend(c.to_lowercase());
        }
    }
    out
}

/// Whether anything but whitespace separates `pos` from the next word.
pub fn followed_by_punctuation(text: &str, pos: usize) -> bool {
    text[pos..]
        .chars()
        .find(|c| !c.is_whitespace())
        .is_none_or(|c| !c.is_alphanumeric())
}
