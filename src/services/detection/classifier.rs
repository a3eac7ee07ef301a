// Statistical Classifier
// TF-IDF + random forest domain scorer. The serving model is immutable and
// swapped in atomically after each training run.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

use super::arbiter::StatisticalScorer;
use super::error::DetectionError;
use super::evaluation;
use super::forest::{ForestParams, RandomForest};
use super::vectorizer::{TfidfVectorizer, VectorizerParams};
use crate::models::{ClassificationResult, EvaluationReport, FeatureWeight, LabeledExample};

pub const MODEL_FORMAT: &str = "dentalbot-model";
pub const MODEL_FORMAT_VERSION: u32 = 1;

// ============ Configuration ============

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassifierConfig {
    #[serde(default = "default_tree_count")]
    pub tree_count: usize,
    #[serde(default = "default_max_tree_depth")]
    pub max_tree_depth: usize,
    #[serde(default = "default_min_samples_per_split")]
    pub min_samples_per_split: usize,
    #[serde(default = "default_min_samples_per_leaf")]
    pub min_samples_per_leaf: usize,
    #[serde(default = "default_random_seed")]
    pub random_seed: u64,
    #[serde(default = "default_max_vocabulary_size")]
    pub max_vocabulary_size: usize,
    #[serde(default = "default_min_doc_frequency")]
    pub min_doc_frequency: usize,
    #[serde(default = "default_max_doc_frequency")]
    pub max_doc_frequency: f64,
    #[serde(default = "default_ngram_range")]
    pub ngram_range: (usize, usize),
    #[serde(default = "default_test_fraction")]
    pub test_fraction: f64,
}

fn default_tree_count() -> usize { 300 }
fn default_max_tree_depth() -> usize { 20 }
fn default_min_samples_per_split() -> usize { 3 }
fn default_min_samples_per_leaf() -> usize { 1 }
fn default_random_seed() -> u64 { 42 }
fn default_max_vocabulary_size() -> usize { 8000 }
fn default_min_doc_frequency() -> usize { 1 }
fn default_max_doc_frequency() -> f64 { 0.85 }
fn default_ngram_range() -> (usize, usize) { (1, 2) }
fn default_test_fraction() -> f64 { 0.2 }

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            tree_count: default_tree_count(),
            max_tree_depth: default_max_tree_depth(),
            min_samples_per_split: default_min_samples_per_split(),
            min_samples_per_leaf: default_min_samples_per_leaf(),
            random_seed: default_random_seed(),
            max_vocabulary_size: default_max_vocabulary_size(),
            min_doc_frequency: default_min_doc_frequency(),
            max_doc_frequency: default_max_doc_frequency(),
            ngram_range: default_ngram_range(),
            test_fraction: default_test_fraction(),
        }
    }
}

impl ClassifierConfig {
    pub fn validate(&self) -> Result<(), DetectionError> {
        let fail = |msg: String| -> Result<(), DetectionError> { Err(DetectionError::InvalidConfig(msg)) };
        if self.tree_count == 0 {
            return fail("treeCount must be at least 1".to_string());
        }
        if !(self.test_fraction > 0.0 && self.test_fraction < 1.0) {
            return fail(format!("testFraction {} is outside (0, 1)", self.test_fraction));
        }
        let (min_n, max_n) = self.ngram_range;
        if min_n == 0 || min_n > max_n {
            return fail(format!("ngramRange ({}, {}) is invalid", min_n, max_n));
        }
        if !(self.max_doc_frequency > 0.0 && self.max_doc_frequency <= 1.0) {
            return fail(format!("maxDocFrequency {} is outside (0, 1]", self.max_doc_frequency));
        }
        if self.max_vocabulary_size == 0 {
            return fail("maxVocabularySize must be at least 1".to_string());
        }
        if self.min_samples_per_leaf == 0 {
            return fail("minSamplesPerLeaf must be at least 1".to_string());
        }
        Ok(())
    }

    pub fn vectorizer_params(&self) -> VectorizerParams {
        VectorizerParams {
            max_vocabulary_size: self.max_vocabulary_size,
            min_doc_frequency: self.min_doc_frequency,
            max_doc_frequency: self.max_doc_frequency,
            ngram_range: self.ngram_range,
        }
    }

    pub fn forest_params(&self) -> ForestParams {
        ForestParams {
            tree_count: self.tree_count,
            max_depth: self.max_tree_depth,
            min_samples_split: self.min_samples_per_split,
            min_samples_leaf: self.min_samples_per_leaf,
            seed: self.random_seed,
        }
    }

    /// One-line description for statistics output.
    pub fn summary(&self) -> String {
        format!(
            "TF-IDF ({}-{} grams, max {} features) + Random Forest ({} trees, depth {})",
            self.ngram_range.0,
            self.ngram_range.1,
            self.max_vocabulary_size,
            self.tree_count,
            self.max_tree_depth
        )
    }
}

// ============ Training Control ============

/// Cooperative cancellation for long training runs. Clones share the abort flag.
#[derive(Debug, Clone, Default)]
pub struct TrainingControl {
    aborted: Arc<AtomicBool>,
    deadline: Option<Instant>,
}

impl TrainingControl {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            aborted: Arc::new(AtomicBool::new(false)),
            deadline: Some(Instant::now() + timeout),
        }
    }

    pub fn abort(&self) {
        self.aborted.store(true, Ordering::SeqCst);
    }

    pub fn is_aborted(&self) -> bool {
        self.aborted.load(Ordering::SeqCst)
    }

    pub fn check(&self) -> Result<(), DetectionError> {
        if self.is_aborted() {
            return Err(DetectionError::TrainingAborted("abort requested".to_string()));
        }
        if let Some(deadline) = self.deadline {
            if Instant::now() >= deadline {
                return Err(DetectionError::TrainingAborted("deadline exceeded".to_string()));
            }
        }
        Ok(())
    }
}

// ============ Stratified Split ============

/// Split into (train, test) keeping both classes in both parts.
pub fn stratified_split(
    examples: &[LabeledExample],
    test_fraction: f64,
    seed: u64,
) -> Result<(Vec<LabeledExample>, Vec<LabeledExample>), DetectionError> {
    if examples.is_empty() {
        return Err(DetectionError::InsufficientData("no training examples".to_string()));
    }

    let mut rng = StdRng::seed_from_u64(seed);
    let mut train = Vec::new();
    let mut test = Vec::new();

    for label in [false, true] {
        let mut class: Vec<&LabeledExample> = examples.iter().filter(|e| e.is_domain == label).collect();
        if class.is_empty() {
            return Err(DetectionError::InsufficientData(
                "examples of both classes are required".to_string(),
            ));
        }
        if class.len() < 2 {
            return Err(DetectionError::InsufficientData(format!(
                "class {} has a single example",
                if label { "domain" } else { "non-domain" }
            )));
        }

        class.shuffle(&mut rng);
        let count = class.len();
        let n_test = ((test_fraction * count as f64).round() as usize).clamp(1, count - 1);
        test.extend(class[..n_test].iter().map(|e| (*e).clone()));
        train.extend(class[n_test..].iter().map(|e| (*e).clone()));
    }

    train.shuffle(&mut rng);
    test.shuffle(&mut rng);
    Ok((train, test))
}

// ============ Trained Model ============

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrainedModel {
    config: ClassifierConfig,
    vectorizer: TfidfVectorizer,
    forest: RandomForest,
    training_size: usize,
    trained_at: DateTime<Utc>,
}

#[derive(Serialize)]
struct EnvelopeOut<'a> {
    format: &'a str,
    version: u32,
    model: &'a TrainedModel,
}

#[derive(Deserialize)]
struct EnvelopeIn {
    format: String,
    version: u32,
    model: serde_json::Value,
}

impl TrainedModel {
    /// Fit vectorizer and forest on already-normalized examples.
    pub fn fit(
        examples: &[LabeledExample],
        config: &ClassifierConfig,
        control: &TrainingControl,
    ) -> Result<Self, DetectionError> {
        control.check()?;
        let texts: Vec<String> = examples.iter().map(|e| e.text.clone()).collect();
        let labels: Vec<bool> = examples.iter().map(|e| e.is_domain).collect();

        let vectorizer = TfidfVectorizer::fit(&texts, &config.vectorizer_params())?;
        let rows = vectorizer.transform_batch(&texts);
        let forest = RandomForest::fit(
            &rows,
            &labels,
            vectorizer.vocabulary_size(),
            &config.forest_params(),
            control,
        )?;

        Ok(Self {
            config: config.clone(),
            vectorizer,
            forest,
            training_size: examples.len(),
            trained_at: Utc::now(),
        })
    }

    pub fn config(&self) -> &ClassifierConfig {
        &self.config
    }

    pub fn training_size(&self) -> usize {
        self.training_size
    }

    pub fn trained_at(&self) -> DateTime<Utc> {
        self.trained_at
    }

    pub fn vocabulary_size(&self) -> usize {
        self.vectorizer.vocabulary_size()
    }

    pub fn probability(&self, normalized: &str) -> f64 {
        let row = self.vectorizer.transform(normalized);
        self.forest.predict_probability(&row)
    }

    pub fn classify(&self, normalized: &str) -> ClassificationResult {
        let probability = self.probability(normalized);
        ClassificationResult {
            is_domain: probability > 0.5,
            probability,
        }
    }

    /// Features ranked by importance, descending; ties alphabetical.
    pub fn top_features(&self, top_n: usize) -> Vec<FeatureWeight> {
        let mut ranked: Vec<FeatureWeight> = self
            .forest
            .feature_importances()
            .iter()
            .enumerate()
            .filter_map(|(idx, weight)| {
                self.vectorizer.feature_name(idx).map(|term| FeatureWeight {
                    term: term.to_string(),
                    weight: *weight,
                })
            })
            .collect();
        ranked.sort_by(|a, b| b.weight.total_cmp(&a.weight).then_with(|| a.term.cmp(&b.term)));
        ranked.truncate(top_n);
        ranked
    }

    pub fn serialize(&self) -> Result<Vec<u8>, DetectionError> {
        let envelope = EnvelopeOut {
            format: MODEL_FORMAT,
            version: MODEL_FORMAT_VERSION,
            model: self,
        };
        serde_json::to_vec(&envelope).map_err(|e| DetectionError::ModelFormat(e.to_string()))
    }

    pub fn deserialize(bytes: &[u8]) -> Result<Self, DetectionError> {
        let envelope: EnvelopeIn =
            serde_json::from_slice(bytes).map_err(|e| DetectionError::ModelFormat(e.to_string()))?;
        if envelope.format != MODEL_FORMAT {
            return Err(DetectionError::ModelFormat(format!(
                "unknown format '{}'",
                envelope.format
            )));
        }
        if envelope.version != MODEL_FORMAT_VERSION {
            return Err(DetectionError::ModelFormat(format!(
                "unsupported version {} (expected {})",
                envelope.version, MODEL_FORMAT_VERSION
            )));
        }
        let model: TrainedModel = serde_json::from_value(envelope.model)
            .map_err(|e| DetectionError::ModelFormat(e.to_string()))?;
        model.vectorizer.validate()?;
        model.forest.validate(model.vectorizer.vocabulary_size())?;
        Ok(model)
    }
}

impl StatisticalScorer for TrainedModel {
    fn is_trained(&self) -> bool {
        true
    }

    fn score(&self, normalized: &str) -> Result<ClassificationResult, DetectionError> {
        Ok(self.classify(normalized))
    }
}

// ============ Classifier ============

#[derive(Debug, Clone)]
pub struct TrainingOutcome {
    pub model: Arc<TrainedModel>,
    pub report: EvaluationReport,
}

/// Holds the serving model generation. Readers clone the `Arc` once per call.
#[derive(Debug, Default)]
pub struct StatisticalClassifier {
    model: RwLock<Option<Arc<TrainedModel>>>,
}

impl StatisticalClassifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> Option<Arc<TrainedModel>> {
        self.model.read().clone()
    }

    fn require_model(&self) -> Result<Arc<TrainedModel>, DetectionError> {
        self.snapshot().ok_or(DetectionError::UntrainedModel)
    }

    /// Replace the serving model generation.
    pub fn install(&self, model: Arc<TrainedModel>) {
        *self.model.write() = Some(model);
    }

    /// Train on normalized examples, evaluate on a held-out part and swap the
    /// new model in. The previous generation keeps serving on failure.
    pub fn train(
        &self,
        examples: &[LabeledExample],
        config: &ClassifierConfig,
        control: &TrainingControl,
    ) -> Result<TrainingOutcome, DetectionError> {
        config.validate()?;
        let (train, test) = stratified_split(examples, config.test_fraction, config.random_seed)?;
        info!(
            "[classifier] Training on {} examples, holding out {}",
            train.len(),
            test.len()
        );

        let model = match TrainedModel::fit(&train, config, control) {
            Ok(model) => Arc::new(model),
            Err(e) => {
                warn!("[classifier] Training failed: {}", e);
                return Err(e);
            }
        };
        let report = evaluation::evaluate(&model, &test, train.len());
        info!(
            "[classifier] Trained {} trees over {} features, held-out accuracy {:.4}",
            config.tree_count,
            model.vocabulary_size(),
            report.accuracy
        );

        self.install(Arc::clone(&model));
        Ok(TrainingOutcome { model, report })
    }

    pub fn predict(&self, normalized: &str) -> Result<bool, DetectionError> {
        Ok(self.require_model()?.classify(normalized).is_domain)
    }

    pub fn predict_probability(&self, normalized: &str) -> Result<f64, DetectionError> {
        Ok(self.require_model()?.probability(normalized))
    }

    pub fn feature_importances(&self, top_n: usize) -> Result<Vec<FeatureWeight>, DetectionError> {
        Ok(self.require_model()?.top_features(top_n))
    }

    /// Evaluate the serving model on normalized examples.
    pub fn evaluate(&self, examples: &[LabeledExample]) -> Result<EvaluationReport, DetectionError> {
        let model = self.require_model()?;
        Ok(evaluation::evaluate(&model, examples, model.training_size()))
    }
}

impl StatisticalScorer for StatisticalClassifier {
    fn is_trained(&self) -> bool {
        self.model.read().is_some()
    }

    fn score(&self, normalized: &str) -> Result<ClassificationResult, DetectionError> {
        Ok(self.require_model()?.classify(normalized))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_config() -> ClassifierConfig {
        ClassifierConfig {
            tree_count: 30,
            max_doc_frequency: 1.0,
            ..ClassifierConfig::default()
        }
    }

    fn examples() -> Vec<LabeledExample> {
        let domain = [
            "morfología incisivo central superior",
            "cúspides primer molar inferior",
            "características canino permanente",
            "anatomía raíz premolar",
            "esmalte dentina corona diente",
            "brackets ortodoncia arco",
            "surcos cara oclusal molar",
            "cámara pulpar incisivo lateral",
            "erupción dientes temporales",
            "diferencias molar superior inferior",
        ];
        let other = [
            "capital francia",
            "receta paella valenciana",
            "resultado partido fútbol",
            "precio petróleo mercado",
            "clima madrid mañana",
            "historia imperio romano",
            "capital alemania",
            "cocinar arroz blanco",
            "programar python principiantes",
            "ganador mundial fútbol",
        ];
        domain
            .iter()
            .map(|t| LabeledExample::new(*t, true))
            .chain(other.iter().map(|t| LabeledExample::new(*t, false)))
            .collect()
    }

    #[test]
    fn test_default_config_values() {
        let c = ClassifierConfig::default();
        assert_eq!(c.tree_count, 300);
        assert_eq!(c.max_tree_depth, 20);
        assert_eq!(c.min_samples_per_split, 3);
        assert_eq!(c.min_samples_per_leaf, 1);
        assert_eq!(c.random_seed, 42);
        assert_eq!(c.max_vocabulary_size, 8000);
        assert_eq!(c.min_doc_frequency, 1);
        assert_eq!(c.max_doc_frequency, 0.85);
        assert_eq!(c.ngram_range, (1, 2));
        assert_eq!(c.test_fraction, 0.2);
        assert!(c.validate().is_ok());
    }

    #[test]
    fn test_config_deserializes_with_defaults() {
        let c: ClassifierConfig = serde_json::from_str(r#"{"treeCount": 10}"#).unwrap();
        assert_eq!(c.tree_count, 10);
        assert_eq!(c.max_tree_depth, 20);
    }

    #[test]
    fn test_invalid_configs() {
        let bad = [
            ClassifierConfig { tree_count: 0, ..Default::default() },
            ClassifierConfig { test_fraction: 1.0, ..Default::default() },
            ClassifierConfig { test_fraction: 0.0, ..Default::default() },
            ClassifierConfig { ngram_range: (2, 1), ..Default::default() },
            ClassifierConfig { max_doc_frequency: 0.0, ..Default::default() },
            ClassifierConfig { max_doc_frequency: 1.5, ..Default::default() },
        ];
        for config in bad {
            assert!(matches!(config.validate(), Err(DetectionError::InvalidConfig(_))));
        }
    }

    #[test]
    fn test_stratified_split_keeps_both_classes() {
        let data = examples();
        let (train, test) = stratified_split(&data, 0.2, 42).unwrap();
        assert_eq!(train.len() + test.len(), data.len());
        assert_eq!(test.iter().filter(|e| e.is_domain).count(), 2);
        assert_eq!(test.iter().filter(|e| !e.is_domain).count(), 2);
        assert!(train.iter().any(|e| e.is_domain));
        assert!(train.iter().any(|e| !e.is_domain));
    }

    #[test]
    fn test_split_tiny_classes() {
        let data = vec![
            LabeledExample::new("molar", true),
            LabeledExample::new("canino", true),
            LabeledExample::new("francia", false),
            LabeledExample::new("alemania", false),
        ];
        let (train, test) = stratified_split(&data, 0.2, 1).unwrap();
        assert_eq!(train.len(), 2);
        assert_eq!(test.len(), 2);
    }

    #[test]
    fn test_single_label_is_insufficient() {
        let data: Vec<_> = examples().into_iter().filter(|e| e.is_domain).collect();
        let classifier = StatisticalClassifier::new();
        let err = classifier
            .train(&data, &small_config(), &TrainingControl::new())
            .unwrap_err();
        assert!(matches!(err, DetectionError::InsufficientData(_)));
        assert!(matches!(
            classifier.train(&[], &small_config(), &TrainingControl::new()),
            Err(DetectionError::InsufficientData(_))
        ));
    }

    #[test]
    fn test_untrained_errors() {
        let classifier = StatisticalClassifier::new();
        assert!(!classifier.is_trained());
        assert!(matches!(classifier.predict("molar"), Err(DetectionError::UntrainedModel)));
        assert!(matches!(
            classifier.predict_probability("molar"),
            Err(DetectionError::UntrainedModel)
        ));
        assert!(matches!(
            classifier.feature_importances(5),
            Err(DetectionError::UntrainedModel)
        ));
        assert!(matches!(classifier.evaluate(&examples()), Err(DetectionError::UntrainedModel)));
    }

    #[test]
    fn test_train_and_predict() {
        let classifier = StatisticalClassifier::new();
        let outcome = classifier
            .train(&examples(), &small_config(), &TrainingControl::new())
            .unwrap();
        assert!(classifier.is_trained());
        assert_eq!(outcome.report.train_size, 16);
        assert_eq!(outcome.report.test_size, 4);

        let p_domain = classifier.predict_probability("morfología molar superior").unwrap();
        let p_other = classifier.predict_probability("capital francia").unwrap();
        assert!(p_domain > p_other);
        assert!((0.0..=1.0).contains(&p_domain));

        let top = classifier.feature_importances(5).unwrap();
        assert!(top.len() <= 5);
        assert!(top.windows(2).all(|w| w[0].weight >= w[1].weight));
    }

    #[test]
    fn test_training_is_deterministic() {
        let a = StatisticalClassifier::new();
        let b = StatisticalClassifier::new();
        a.train(&examples(), &small_config(), &TrainingControl::new()).unwrap();
        b.train(&examples(), &small_config(), &TrainingControl::new()).unwrap();
        for text in ["molar canino", "capital francia", "corona clínica"] {
            assert_eq!(
                a.predict_probability(text).unwrap(),
                b.predict_probability(text).unwrap()
            );
        }
    }

    #[test]
    fn test_serialize_roundtrip_preserves_predictions() {
        let classifier = StatisticalClassifier::new();
        let outcome = classifier
            .train(&examples(), &small_config(), &TrainingControl::new())
            .unwrap();
        let bytes = outcome.model.serialize().unwrap();
        let restored = TrainedModel::deserialize(&bytes).unwrap();
        for text in ["molar canino", "capital francia", "esmalte"] {
            assert!((restored.probability(text) - outcome.model.probability(text)).abs() < 1e-9);
        }
    }

    #[test]
    fn test_deserialize_rejects_wrong_envelope() {
        let wrong_format = br#"{"format":"pickle","version":1,"model":{}}"#;
        assert!(matches!(
            TrainedModel::deserialize(wrong_format),
            Err(DetectionError::ModelFormat(_))
        ));
        let wrong_version = br#"{"format":"dentalbot-model","version":9,"model":{}}"#;
        assert!(matches!(
            TrainedModel::deserialize(wrong_version),
            Err(DetectionError::ModelFormat(_))
        ));
        assert!(matches!(
            TrainedModel::deserialize(b"not json"),
            Err(DetectionError::ModelFormat(_))
        ));
    }

    #[test]
    fn test_abort_keeps_previous_model() {
        let classifier = StatisticalClassifier::new();
        classifier
            .train(&examples(), &small_config(), &TrainingControl::new())
            .unwrap();
        let before = classifier.snapshot().unwrap();

        let control = TrainingControl::new();
        control.abort();
        let err = classifier.train(&examples(), &small_config(), &control).unwrap_err();
        assert!(matches!(err, DetectionError::TrainingAborted(_)));
        assert!(Arc::ptr_eq(&before, &classifier.snapshot().unwrap()));
    }

    #[test]
    fn test_expired_deadline_aborts() {
        let control = TrainingControl::with_timeout(Duration::ZERO);
        assert!(matches!(control.check(), Err(DetectionError::TrainingAborted(_))));
    }
}
