// Lexical Term Detector
// Dictionary-based domain membership with exclusion precedence and
// contextual tie-breaks. Works on raw lower-cased text (substring search).

use std::sync::Arc;
use tracing::debug;

use super::error::DetectionError;
use super::vocabulary::VocabularyStore;
use crate::models::{Confidence, DetectionResult, TermCounts};

pub const RATIONALE_EXCLUSION: &str = "procedural/non-domain term match";
pub const RATIONALE_NO_MATCH: &str = "no recognizable domain term";
pub const RATIONALE_ANATOMY: &str = "contains dental anatomy terms";
pub const RATIONALE_POSSIBLE: &str = "contains dental terms (possible anatomy)";

/// Markers of a descriptive / anatomical question.
const CONTEXT_MARKERS: &[&str] = &[
    "características",
    "morfología",
    "anatomía",
    "estructura",
    "forma",
    "cúspide",
    "raíz",
    "corona",
    "diferencias",
    "diferencia",
    "comparación",
    "cuántas",
    "cuántos",
    "cómo es",
    "qué es",
    "describe",
];

#[derive(Debug, Clone)]
pub struct LexicalDetector {
    vocabulary: Arc<VocabularyStore>,
}

fn sorted_matches<'a>(text: &str, terms: impl Iterator<Item = &'a String>) -> Vec<String> {
    let mut found: Vec<String> = terms
        .filter(|term| text.contains(term.as_str()))
        .cloned()
        .collect();
    found.sort();
    found
}

fn has_context_marker(text: &str) -> bool {
    CONTEXT_MARKERS.iter().any(|marker| text.contains(marker))
}

impl LexicalDetector {
    pub fn new(vocabulary: Arc<VocabularyStore>) -> Self {
        Self { vocabulary }
    }

    pub fn vocabulary(&self) -> &Arc<VocabularyStore> {
        &self.vocabulary
    }

    pub fn detect(&self, raw_text: &str) -> DetectionResult {
        let text = raw_text.to_lowercase();
        let snapshot = self.vocabulary.snapshot();

        // Exclusion terms win unconditionally.
        let exclusions = sorted_matches(&text, snapshot.exclusion_terms.iter());
        if !exclusions.is_empty() {
            debug!("[term_detector] Exclusion match: {:?}", exclusions);
            return DetectionResult {
                is_domain: false,
                matched_terms: exclusions,
                confidence: Confidence::High,
                rationale: RATIONALE_EXCLUSION.to_string(),
            };
        }

        let matches = sorted_matches(&text, snapshot.domain_terms.iter());
        if matches.is_empty() {
            return DetectionResult {
                is_domain: false,
                matched_terms: Vec::new(),
                confidence: Confidence::High,
                rationale: RATIONALE_NO_MATCH.to_string(),
            };
        }

        // Terms come from a set, so the match list is already distinct.
        if has_context_marker(&text) || matches.len() >= 2 {
            DetectionResult {
                is_domain: true,
                matched_terms: matches,
                confidence: Confidence::High,
                rationale: RATIONALE_ANATOMY.to_string(),
            }
        } else {
            DetectionResult {
                is_domain: true,
                matched_terms: matches,
                confidence: Confidence::Medium,
                rationale: RATIONALE_POSSIBLE.to_string(),
            }
        }
    }

    pub fn add_term(&self, term: &str) -> Result<bool, DetectionError> {
        self.vocabulary.add_domain_term(term)
    }

    pub fn term_counts(&self) -> TermCounts {
        self.vocabulary.term_counts()
    }

    pub fn list_terms(&self) -> Vec<String> {
        self.vocabulary.list_domain_terms()
    }
}
