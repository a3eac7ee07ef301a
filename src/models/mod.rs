// DentalBot Data Models
// Result types shared by the detector, classifier, arbiter and host layers.

use serde::{Deserialize, Serialize};

// ============ Confidence & Method Tags ============

/// Coarse verdict-quality label, distinct from the continuous probability.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Confidence {
    Low,
    Medium,
    MediumHigh,
    High,
}

impl Confidence {
    pub fn as_str(self) -> &'static str {
        match self {
            Confidence::Low => "low",
            Confidence::Medium => "medium",
            Confidence::MediumHigh => "medium_high",
            Confidence::High => "high",
        }
    }

    /// Spanish label used by the console front end.
    pub fn label_es(self) -> &'static str {
        match self {
            Confidence::Low => "Baja",
            Confidence::Medium => "Media",
            Confidence::MediumHigh => "Media-Alta",
            Confidence::High => "Alta",
        }
    }
}

/// Which stage (or pair of stages) produced a verdict.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionMethod {
    Validation,
    Normalization,
    LexicalOnly,
    HybridAgree,
    LexicalOverride,
    StatisticalOverride,
    StatisticalOnly,
}

impl DecisionMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            DecisionMethod::Validation => "validation",
            DecisionMethod::Normalization => "normalization",
            DecisionMethod::LexicalOnly => "lexical_only",
            DecisionMethod::HybridAgree => "hybrid_agree",
            DecisionMethod::LexicalOverride => "lexical_override",
            DecisionMethod::StatisticalOverride => "statistical_override",
            DecisionMethod::StatisticalOnly => "statistical_only",
        }
    }
}

// ============ Component Results ============

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectionResult {
    pub is_domain: bool,
    pub matched_terms: Vec<String>,
    pub confidence: Confidence,
    pub rationale: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassificationResult {
    pub is_domain: bool,
    pub probability: f64,
}

// ============ Verdict ============

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct SupportingEvidence {
    /// First matched lexical terms (at most five).
    #[serde(default)]
    pub matched_terms: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lexical: Option<DetectionResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub statistical: Option<ClassificationResult>,
    pub rationale: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Verdict {
    pub is_domain: bool,
    pub probability: f64,
    pub confidence: Confidence,
    pub method: DecisionMethod,
    pub evidence: SupportingEvidence,
}

impl Verdict {
    /// Raw statistical probability, when the statistical stage ran.
    pub fn statistical_probability(&self) -> Option<f64> {
        self.evidence.statistical.map(|s| s.probability)
    }
}

// ============ Training Data & Evaluation ============

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LabeledExample {
    pub text: String,
    pub is_domain: bool,
}

impl LabeledExample {
    pub fn new(text: impl Into<String>, is_domain: bool) -> Self {
        Self {
            text: text.into(),
            is_domain,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ClassMetrics {
    pub precision: f64,
    pub recall: f64,
    pub f1_score: f64,
    pub support: usize,
}

/// Binary confusion matrix laid out as `[[tn, fp], [fn, tp]]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ConfusionMatrix {
    pub true_negative: usize,
    pub false_positive: usize,
    pub false_negative: usize,
    pub true_positive: usize,
}

impl ConfusionMatrix {
    pub fn as_rows(&self) -> [[usize; 2]; 2] {
        [
            [self.true_negative, self.false_positive],
            [self.false_negative, self.true_positive],
        ]
    }

    pub fn total(&self) -> usize {
        self.true_negative + self.false_positive + self.false_negative + self.true_positive
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ClassDistribution {
    pub non_domain: usize,
    pub domain: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureWeight {
    pub term: String,
    pub weight: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluationReport {
    pub accuracy: f64,
    pub error_rate: f64,
    pub non_domain: ClassMetrics,
    pub domain: ClassMetrics,
    pub macro_avg: ClassMetrics,
    pub weighted_avg: ClassMetrics,
    pub confusion: ConfusionMatrix,
    pub predicted: ClassDistribution,
    pub actual: ClassDistribution,
    pub train_size: usize,
    pub test_size: usize,
    pub top_features: Vec<FeatureWeight>,
}

// ============ Vocabulary & Bot ============

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TermCounts {
    pub domain_terms: usize,
    pub exclusion_terms: usize,
    pub total: usize,
}

/// Hand-off payload for the external answer generator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerRequest {
    pub original_question: String,
    pub is_domain: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BotResponse {
    pub question: String,
    pub verdict: Verdict,
    pub answer: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BotStatistics {
    pub trained: bool,
    pub configuration: String,
    pub term_counts: TermCounts,
    #[serde(default)]
    pub top_features: Vec<FeatureWeight>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verdict_serializes_camel_case() {
        let verdict = Verdict {
            is_domain: true,
            probability: 0.95,
            confidence: Confidence::High,
            method: DecisionMethod::LexicalOnly,
            evidence: SupportingEvidence {
                matched_terms: vec!["diente".to_string()],
                lexical: None,
                statistical: None,
                rationale: "contains dental anatomy terms".to_string(),
            },
        };
        let json = serde_json::to_string(&verdict).unwrap();
        assert!(json.contains("\"isDomain\":true"));
        assert!(json.contains("\"method\":\"lexical_only\""));
        assert!(json.contains("\"matchedTerms\":[\"diente\"]"));
        assert!(!json.contains("statistical\":"));
    }

    #[test]
    fn test_confusion_rows() {
        let cm = ConfusionMatrix {
            true_negative: 3,
            false_positive: 1,
            false_negative: 0,
            true_positive: 4,
        };
        assert_eq!(cm.as_rows(), [[3, 1], [0, 4]]);
        assert_eq!(cm.total(), 8);
    }
}
