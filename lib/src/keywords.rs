//! Keyword extraction and matching.
//!
//! Titles and subscriber filters go through the same normalization, so a
//! filter matches when the two token sets share at least one element.

use std::collections::BTreeSet;

use crate::{ErrorKind, Result};

/// Splits text into lowercase tokens on every character that is neither a
/// letter nor a digit. Empty tokens are dropped.
pub fn extract(text: &str) -> BTreeSet<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|token| !token.is_empty())
        .map(str::to_string)
        .collect()
}

/// An empty filter matches everything. Otherwise any shared token qualifies.
pub fn matches(filter: &BTreeSet<String>, title_keywords: &BTreeSet<String>) -> bool {
    filter.is_empty() || !filter.is_disjoint(title_keywords)
}

/// Parses the keyword field of a subscription form.
///
/// Accepts letters, digits, whitespace and commas as separators. Anything
/// else is rejected instead of silently split, so `c++` does not turn into a
/// filter on `c`.
pub fn parse_input(input: &str, max_keywords: usize) -> Result<BTreeSet<String>> {
    if let Some(bad) = input
        .chars()
        .find(|c| !(c.is_alphanumeric() || c.is_whitespace() || *c == ','))
    {
        return Err(ErrorKind::BadInput(format!(
            "Keywords can only contain letters and numbers, separated by spaces or commas (found '{bad}')."
        ))
        .into());
    }

    let keywords = extract(input);
    if keywords.len() > max_keywords {
        return Err(ErrorKind::BadInput(format!(
            "You can filter on at most {max_keywords} keywords."
        ))
        .into());
    }
    Ok(keywords)
}

/// Joins keywords back into the form used in links and forms.
pub fn join(keywords: &BTreeSet<String>) -> String {
    keywords.iter().cloned().collect::<Vec<_>>().join(",")
}
