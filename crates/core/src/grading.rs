//! Answer normalization and comparison per exercise kind.

use std::collections::BTreeSet;

use crate::model::ExerciseKind;

/// Returns true when `submitted` matches `expected` under the rules for `kind`.
///
/// - quiz: case-insensitive, only alphanumeric characters count (`"b)"` == `"B"`)
/// - open response: case-insensitive, whitespace collapsed, trailing `.!?` dropped
/// - matching: comma separated `left=right` pairs, compared as an unordered set
#[must_use]
pub fn answers_match(kind: ExerciseKind, expected: &str, submitted: &str) -> bool {
    match kind {
        ExerciseKind::Quiz => {
            let submitted = normalize_choice(submitted);
            !submitted.is_empty() && submitted == normalize_choice(expected)
        }
        ExerciseKind::OpenResponse => {
            let submitted = normalize_text(submitted);
            !submitted.is_empty() && submitted == normalize_text(expected)
        }
        ExerciseKind::Matching => match (parse_pairs(expected), parse_pairs(submitted)) {
            (Some(expected), Some(submitted)) => expected == submitted,
            _ => false,
        },
    }
}

pub(crate) fn normalize_choice(s: &str) -> String {
    s.chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_lowercase)
        .collect()
}

pub(crate) fn normalize_text(s: &str) -> String {
    let collapsed = s.split_whitespace().collect::<Vec<_>>().join(" ");
    collapsed
        .trim_end_matches(['.', '!', '?'])
        .trim_end()
        .to_lowercase()
}

/// Parses `a=1, b=2` into a set of normalized pairs.
///
/// Returns `None` for an empty list or any malformed pair.
pub(crate) fn parse_pairs(s: &str) -> Option<BTreeSet<(String, String)>> {
    let mut pairs = BTreeSet::new();
    for chunk in s.split(',') {
        let chunk = chunk.trim();
        if chunk.is_empty() {
            continue;
        }
        let (left, right) = chunk.split_once('=')?;
        let (left, right) = (normalize_text(left), normalize_text(right));
        if left.is_empty() || right.is_empty() {
            return None;
        }
        pairs.insert((left, right));
    }
    if pairs.is_empty() { None } else { Some(pairs) }
}
