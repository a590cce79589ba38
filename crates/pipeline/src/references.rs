//! Reference consolidation and citation renumbering.
//!
//! Generated prose cites sources with inline `[^n^]` markers that index into a
//! reference list returned alongside it. Models repeat references, skip
//! numbers, and occasionally cite numbers that do not exist. Before an answer
//! is stored, [`consolidate_citations`] rewrites it so that:
//!
//! - the reference list contains each source once;
//! - references are numbered in order of first citation in the text, with
//!   uncited references appended afterwards;
//! - every marker in the text points at an existing entry (markers that
//!   point nowhere are removed).

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::{Captures, Regex};

use crate::FinalAnswer;

/// Matches `[^3^]` and the bare markdown footnote form `[^3]`.
static CITATION_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[\^(\d+)\^?\]").expect("citation marker pattern is valid"));

// ---------------------------------------------------------------------------
// ReferenceList
// ---------------------------------------------------------------------------

/// An ordered, deduplicated, 1-based numbered list of references.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReferenceList {
    entries: Vec<String>,
    numbers: HashMap<String, usize>,
}

impl ReferenceList {
    /// Creates an empty list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a reference if it is not already present and returns its 1-based
    /// number. Blank references are ignored and return `None`.
    pub fn insert(&mut self, reference: &str) -> Option<usize> {
        let reference = reference.trim();
        if reference.is_empty() {
            return None;
        }
        if let Some(&n) = self.numbers.get(reference) {
            return Some(n);
        }
        self.entries.push(reference.to_string());
        let n = self.entries.len();
        self.numbers.insert(reference.to_string(), n);
        Some(n)
    }

    /// Adds every reference in order.
    pub fn extend<'a>(&mut self, references: impl IntoIterator<Item = &'a String>) {
        for r in references {
            self.insert(r);
        }
    }

    /// Returns the 1-based number of a reference, if present.
    pub fn number_of(&self, reference: &str) -> Option<usize> {
        self.numbers.get(reference.trim()).copied()
    }

    /// Number of distinct references.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if the list is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The references in numbering order.
    pub fn as_slice(&self) -> &[String] {
        &self.entries
    }

    /// Consumes the list, returning the references in numbering order.
    pub fn into_vec(self) -> Vec<String> {
        self.entries
    }

    /// Renders the list as `"1. first\n2. second"`, suitable for prompts.
    pub fn render_numbered(&self) -> String {
        self.entries
            .iter()
            .enumerate()
            .map(|(i, r)| format!("{}. {}", i + 1, r))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

// ---------------------------------------------------------------------------
// Citation renumbering
// ---------------------------------------------------------------------------

/// Deduplicates `references` and rewrites the citation markers in `answer` to
/// match. See the module documentation for the exact rules.
pub fn consolidate_citations(answer: &str, references: &[String]) -> FinalAnswer {
    let mut consolidated = ReferenceList::new();
    let mut dropped = 0usize;

    let rewritten = CITATION_MARKER.replace_all(answer, |caps: &Captures<'_>| {
        let target = caps[1]
            .parse::<usize>()
            .ok()
            .and_then(|n| n.checked_sub(1))
            .and_then(|i| references.get(i))
            .and_then(|r| consolidated.insert(r));
        match target {
            Some(n) => format!("[^{n}^]"),
            None => {
                dropped += 1;
                String::new()
            }
        }
    });
    let rewritten = rewritten.into_owned();

    consolidated.extend(references);

    if dropped > 0 {
        tracing::debug!(dropped, "removed citation markers with no matching reference");
    }

    FinalAnswer {
        answer: rewritten,
        references: consolidated.into_vec(),
    }
}

/// Returns the marker numbers cited in `text`, in order of appearance.
pub fn cited_numbers(text: &str) -> Vec<usize> {
    CITATION_MARKER
        .captures_iter(text)
        .filter_map(|caps| caps[1].parse().ok())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn refs(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn reference_list_numbers_first_occurrence() {
        let mut list = ReferenceList::new();
        assert_eq!(list.insert("https://a"), Some(1));
        assert_eq!(list.insert("https://b"), Some(2));
        assert_eq!(list.insert(" https://a "), Some(1));
        assert_eq!(list.insert("  "), None);
        assert_eq!(list.render_numbered(), "1. https://a\n2. https://b");
    }

    #[test]
    fn duplicate_references_collapse_and_markers_follow() {
        let out = consolidate_citations(
            "Sales rose [^1^]. Prices fell [^3^]. Policy helped [^2^].",
            &refs(&["https://a", "https://b", "https://a"]),
        );
        assert_eq!(out.references, refs(&["https://a", "https://b"]));
        assert_eq!(out.answer, "Sales rose [^1^]. Prices fell [^1^]. Policy helped [^2^].");
    }

    #[test]
    fn references_are_renumbered_by_first_citation() {
        let out = consolidate_citations(
            "First [^2^], then [^1^].",
            &refs(&["https://a", "https://b", "https://uncited"]),
        );
        assert_eq!(out.references, refs(&["https://b", "https://a", "https://uncited"]));
        assert_eq!(out.answer, "First [^1^], then [^2^].");
        assert_eq!(cited_numbers(&out.answer), vec![1, 2]);
    }

    #[test]
    fn uncited_references_are_kept_once_after_cited_ones() {
        let out = consolidate_citations(
            "Only one source is cited [^3^].",
            &refs(&["https://u", "https://v", "https://a", "https://u"]),
        );
        assert_eq!(out.references, refs(&["https://a", "https://u", "https://v"]));
        assert_eq!(out.answer, "Only one source is cited [^1^].");
    }

    #[test]
    fn dangling_markers_are_removed_and_footnote_form_is_normalised() {
        let out = consolidate_citations("A [^1]. B [^9^].", &refs(&["https://a"]));
        assert_eq!(out.answer, "A [^1^]. B .");
        assert_eq!(out.references, refs(&["https://a"]));
    }
}
