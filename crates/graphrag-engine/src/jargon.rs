//! Detection of implementation terms leaking into answers.

use graphrag_core::GraphRagError;
use regex::Regex;

/// Whole-word, case-insensitive matcher over a configurable denylist.
///
/// Word boundaries are only required at term edges that are word characters,
/// so terms like `c++` still match.
#[derive(Debug, Clone)]
pub struct JargonValidator {
    pattern: Option<Regex>,
}

impl JargonValidator {
    /// Build a validator. An empty list accepts every answer.
    pub fn new(terms: &[String]) -> Result<Self, GraphRagError> {
        let alternatives: Vec<String> = terms
            .iter()
            .map(|t| t.trim())
            .filter(|t| !t.is_empty())
            .map(bounded_term)
            .collect();
        if alternatives.is_empty() {
            return Ok(Self { pattern: None });
        }

        let pattern = Regex::new(&format!("(?i){}", alternatives.join("|")))
            .map_err(|e| GraphRagError::Config(format!("invalid answer denylist: {e}")))?;
        Ok(Self {
            pattern: Some(pattern),
        })
    }

    /// Distinct denylisted terms found in `text`, lowercased, in order of appearance.
    pub fn violations(&self, text: &str) -> Vec<String> {
        let Some(pattern) = &self.pattern else {
            return Vec::new();
        };
        let mut found: Vec<String> = Vec::new();
        for m in pattern.find_iter(text) {
            let term = m.as_str().to_lowercase();
            if !found.contains(&term) {
                found.push(term);
            }
        }
        found
    }
}

fn bounded_term(term: &str) -> String {
    let is_word = |c: Option<char>| c.is_some_and(|c| c.is_alphanumeric() || c == '_');
    let start = if is_word(term.chars().next()) { r"\b" } else { "" };
    let end = if is_word(term.chars().next_back()) { r"\b" } else { "" };
    format!("(?:{start}{}{end})", regex::escape(term))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::default_denylist;

    fn validator() -> JargonValidator {
        JargonValidator::new(&default_denylist()).unwrap()
    }

    #[test]
    fn flags_technical_terms_in_any_case() {
        let v = validator();
        let text = "Based on the Cypher QUERY, the graph has 3 nodes.";
        assert_eq!(v.violations(text), vec!["cypher", "query", "graph", "nodes"]);
    }

    #[test]
    fn matches_whole_words_only() {
        let v = validator();
        assert!(v.violations("Ana Lopez has diabetes and hypertension.").is_empty());
        assert!(v.violations("The paragraph mentions a nodule.").is_empty());
        assert!(v.violations("Graphite pencils were prescribed.").is_empty());
    }

    #[test]
    fn repeated_terms_reported_once() {
        let v = validator();
        assert_eq!(v.violations("query after query"), vec!["query"]);
    }

    #[test]
    fn empty_denylist_accepts_everything() {
        let v = JargonValidator::new(&[]).unwrap();
        assert!(v.violations("the cypher query ran on the graph").is_empty());
        assert!(v.violations("graph").is_empty());
    }

    #[test]
    fn terms_are_escaped() {
        let v = JargonValidator::new(&["c++".to_string(), "node.js".to_string()]).unwrap();
        assert_eq!(v.violations("written in node.js"), vec!["node.js"]);
        assert!(v.violations("written in nodexjs").is_empty());
    }

    #[test]
    fn terms_ending_in_symbols_still_match() {
        let v = JargonValidator::new(&["c++".to_string(), "graph".to_string()]).unwrap();
        assert_eq!(v.violations("Ported from C++ to a graph store."), vec!["c++", "graph"]);
        assert_eq!(v.violations("c++, then graph"), vec!["c++", "graph"]);
        assert!(v.violations("abc++ and graphite").is_empty());
    }
}
