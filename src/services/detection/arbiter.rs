// Hybrid Arbiter
// Merges the lexical detector and the statistical scorer into one verdict.
// Order is fixed: readiness, input guard, lexical short-circuit,
// normalization guard, statistical scoring, arbitration.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

use super::error::DetectionError;
use super::term_detector::LexicalDetector;
use crate::models::{
    ClassificationResult, Confidence, DecisionMethod, DetectionResult, SupportingEvidence, Verdict,
};
use crate::services::text_processor::Normalizer;

const MIN_INPUT_CHARS: usize = 3;
const MIN_NORMALIZED_CHARS: usize = 2;
const MAX_EVIDENCE_TERMS: usize = 5;

const LEXICAL_DOMAIN_PROBABILITY: f64 = 0.95;
const LEXICAL_NON_DOMAIN_PROBABILITY: f64 = 0.05;
const AGREEMENT_PROBABILITY_FLOOR: f64 = 0.85;
const LEXICAL_VETO_CEILING: f64 = 0.7;
const LEXICAL_OVERRIDE_PROBABILITY: f64 = 0.75;

/// Statistical stage seam. `score` receives normalized text.
pub trait StatisticalScorer: Send + Sync {
    fn is_trained(&self) -> bool;
    fn score(&self, normalized: &str) -> Result<ClassificationResult, DetectionError>;
}

impl<T: StatisticalScorer + ?Sized> StatisticalScorer for Arc<T> {
    fn is_trained(&self) -> bool {
        (**self).is_trained()
    }

    fn score(&self, normalized: &str) -> Result<ClassificationResult, DetectionError> {
        (**self).score(normalized)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArbiterThresholds {
    #[serde(default = "default_floor")]
    pub domain_probability_floor: f64,
    #[serde(default = "default_high")]
    pub high_confidence_threshold: f64,
    #[serde(default = "default_medium")]
    pub medium_confidence_threshold: f64,
}

fn default_floor() -> f64 { 0.55 }
fn default_high() -> f64 { 0.8 }
fn default_medium() -> f64 { 0.6 }

impl Default for ArbiterThresholds {
    fn default() -> Self {
        Self {
            domain_probability_floor: default_floor(),
            high_confidence_threshold: default_high(),
            medium_confidence_threshold: default_medium(),
        }
    }
}

impl ArbiterThresholds {
    pub fn tier(&self, probability: f64) -> Confidence {
        if probability > self.high_confidence_threshold {
            Confidence::High
        } else if probability > self.medium_confidence_threshold {
            Confidence::Medium
        } else {
            Confidence::Low
        }
    }
}

/// Outcome of the arbitration table, before evidence is attached.
#[derive(Debug, Clone, PartialEq)]
pub struct Arbitration {
    pub is_domain: bool,
    pub probability: f64,
    pub confidence: Confidence,
    pub method: DecisionMethod,
    pub rationale: String,
}

/// Arbitration table, evaluated top to bottom.
pub fn arbitrate(
    lexical: &DetectionResult,
    statistical: &ClassificationResult,
    thresholds: &ArbiterThresholds,
) -> Arbitration {
    let p = statistical.probability;

    if lexical.is_domain && statistical.is_domain {
        return Arbitration {
            is_domain: true,
            probability: p.max(AGREEMENT_PROBABILITY_FLOOR),
            confidence: Confidence::High,
            method: DecisionMethod::HybridAgree,
            rationale: "lexical and statistical stages agree on domain".to_string(),
        };
    }

    if !lexical.is_domain && statistical.is_domain && p < LEXICAL_VETO_CEILING {
        return Arbitration {
            is_domain: false,
            probability: p,
            confidence: Confidence::High,
            method: DecisionMethod::LexicalOverride,
            rationale: format!("no domain terms and weak statistical signal ({:.2})", p),
        };
    }

    if lexical.is_domain && !statistical.is_domain {
        let distinct = lexical
            .matched_terms
            .iter()
            .collect::<std::collections::HashSet<_>>()
            .len();
        if distinct >= 2 {
            return Arbitration {
                is_domain: true,
                probability: LEXICAL_OVERRIDE_PROBABILITY,
                confidence: Confidence::MediumHigh,
                method: DecisionMethod::LexicalOverride,
                rationale: format!("{} distinct domain terms outweigh the statistical stage", distinct),
            };
        }
        return Arbitration {
            is_domain: false,
            probability: p,
            confidence: Confidence::Medium,
            method: DecisionMethod::StatisticalOverride,
            rationale: "single domain term, statistical stage disagrees".to_string(),
        };
    }

    let is_domain = statistical.is_domain && p >= thresholds.domain_probability_floor;
    let rationale = if statistical.is_domain && !is_domain {
        format!("statistical probability {:.2} below floor {:.2}", p, thresholds.domain_probability_floor)
    } else {
        format!("statistical decision (probability {:.2})", p)
    };
    Arbitration {
        is_domain,
        probability: p,
        confidence: thresholds.tier(p),
        method: DecisionMethod::StatisticalOnly,
        rationale,
    }
}

fn evidence_terms(lexical: Option<&DetectionResult>) -> Vec<String> {
    lexical
        .map(|l| l.matched_terms.iter().take(MAX_EVIDENCE_TERMS).cloned().collect())
        .unwrap_or_default()
}

pub struct HybridArbiter<S: StatisticalScorer> {
    detector: LexicalDetector,
    normalizer: Arc<Normalizer>,
    scorer: S,
    thresholds: ArbiterThresholds,
}

impl<S: StatisticalScorer> HybridArbiter<S> {
    pub fn new(
        detector: LexicalDetector,
        normalizer: Arc<Normalizer>,
        scorer: S,
        thresholds: ArbiterThresholds,
    ) -> Self {
        Self {
            detector,
            normalizer,
            scorer,
            thresholds,
        }
    }

    pub fn scorer(&self) -> &S {
        &self.scorer
    }

    pub fn detector(&self) -> &LexicalDetector {
        &self.detector
    }

    pub fn thresholds(&self) -> &ArbiterThresholds {
        &self.thresholds
    }

    pub fn classify(&self, raw_text: &str) -> Result<Verdict, DetectionError> {
        if !self.scorer.is_trained() {
            return Err(DetectionError::UntrainedModel);
        }

        if raw_text.trim().chars().count() < MIN_INPUT_CHARS {
            debug!("[arbiter] Input rejected by length guard");
            return Ok(Verdict {
                is_domain: false,
                probability: 0.0,
                confidence: Confidence::Low,
                method: DecisionMethod::Validation,
                evidence: SupportingEvidence {
                    rationale: format!("input shorter than {} characters", MIN_INPUT_CHARS),
                    ..Default::default()
                },
            });
        }

        let lexical = self.detector.detect(raw_text);
        if lexical.confidence == Confidence::High && !lexical.matched_terms.is_empty() {
            let probability = if lexical.is_domain {
                LEXICAL_DOMAIN_PROBABILITY
            } else {
                LEXICAL_NON_DOMAIN_PROBABILITY
            };
            return Ok(Verdict {
                is_domain: lexical.is_domain,
                probability,
                confidence: lexical.confidence,
                method: DecisionMethod::LexicalOnly,
                evidence: SupportingEvidence {
                    matched_terms: evidence_terms(Some(&lexical)),
                    rationale: lexical.rationale.clone(),
                    lexical: Some(lexical),
                    statistical: None,
                },
            });
        }

        let normalized = self.normalizer.normalize(raw_text);
        if normalized.trim().chars().count() < MIN_NORMALIZED_CHARS {
            return Ok(Verdict {
                is_domain: false,
                probability: 0.0,
                confidence: Confidence::Low,
                method: DecisionMethod::Normalization,
                evidence: SupportingEvidence {
                    matched_terms: evidence_terms(Some(&lexical)),
                    lexical: Some(lexical),
                    statistical: None,
                    rationale: "nothing left after normalization".to_string(),
                },
            });
        }

        let statistical = self.scorer.score(&normalized)?;
        let outcome = arbitrate(&lexical, &statistical, &self.thresholds);
        debug!(
            "[arbiter] method={} domain={} p={:.3}",
            outcome.method.as_str(),
            outcome.is_domain,
            outcome.probability
        );

        Ok(Verdict {
            is_domain: outcome.is_domain,
            probability: outcome.probability,
            confidence: outcome.confidence,
            method: outcome.method,
            evidence: SupportingEvidence {
                matched_terms: evidence_terms(Some(&lexical)),
                lexical: Some(lexical),
                statistical: Some(statistical),
                rationale: outcome.rationale,
            },
        })
    }
}
