// DentalBot Service
// Wires normalizer, detector, classifier and arbiter; owns the serving model

use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

use crate::models::{
    AnswerRequest, BotResponse, BotStatistics, DecisionMethod, LabeledExample, TermCounts, Verdict,
};
use crate::services::config_store::{AppConfig, ConfigStore};
use crate::services::dataset::{self, DatasetSource};
use crate::services::detection::{
    DetectionError, HybridArbiter, LexicalDetector, StatisticalClassifier, TrainingControl,
    TrainingOutcome, VocabularyStore,
};
use crate::services::model_store::ModelStore;
use crate::services::providers::AnswerGenerator;
use crate::services::text_processor::{LinguisticResources, Normalizer, ResourceStatus};

pub const INVALID_QUESTION_ANSWER: &str =
    "Por favor, ingresa una pregunta válida sobre anatomía dental.";
pub const UNRECOGNIZED_QUESTION_ANSWER: &str =
    "Lo siento, no pude identificar términos relacionados con anatomía dental en tu pregunta. ¿Podrías reformularla?";

/// Probe questions run by the `pruebas` console command.
const SELF_TEST_QUESTIONS: &[&str] = &[
    "¿Qué es un diente?",
    "¿Características de los brackets?",
    "¿Cómo es la ortodoncia?",
    "¿Morfología del incisivo central?",
    "¿Cómo hacer una obturación?",
    "¿Capital de Francia?",
];

pub struct DentalBot {
    config: AppConfig,
    normalizer: Arc<Normalizer>,
    classifier: Arc<StatisticalClassifier>,
    arbiter: HybridArbiter<Arc<StatisticalClassifier>>,
    resource_status: ResourceStatus,
}

impl DentalBot {
    pub fn new(config: AppConfig) -> Self {
        let resources_dir = config.resources_dir();
        let (resources, resource_status) = LinguisticResources::load(resources_dir.as_deref());
        if resource_status.is_degraded() {
            warn!("[dental_bot] Running with fallback linguistic resources");
        }

        let vocabulary = Arc::new(VocabularyStore::dental());
        let normalizer = Arc::new(Normalizer::new(Arc::new(resources), Arc::clone(&vocabulary)));
        let classifier = Arc::new(StatisticalClassifier::new());
        let arbiter = HybridArbiter::new(
            LexicalDetector::new(vocabulary),
            Arc::clone(&normalizer),
            Arc::clone(&classifier),
            config.arbiter,
        );

        let counts = arbiter.detector().term_counts();
        info!(
            "[dental_bot] Initialized with {} domain terms and {} exclusion terms",
            counts.domain_terms, counts.exclusion_terms
        );

        Self {
            config,
            normalizer,
            classifier,
            arbiter,
            resource_status,
        }
    }

    /// Bot built from the persisted config, or defaults when it cannot be read.
    pub fn from_config_store() -> Self {
        let config = match ConfigStore::default_config_dir() {
            Some(dir) => ConfigStore::new(dir).load().unwrap_or_else(|e| {
                warn!("[dental_bot] {}; using default configuration", e);
                AppConfig::default()
            }),
            None => AppConfig::default(),
        };
        Self::new(config)
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn resource_status(&self) -> &ResourceStatus {
        &self.resource_status
    }

    pub fn is_trained(&self) -> bool {
        self.classifier.snapshot().is_some()
    }

    /// Normalize the raw examples, then train and swap in the new model.
    pub fn train(
        &self,
        examples: &[LabeledExample],
        control: &TrainingControl,
    ) -> Result<TrainingOutcome, DetectionError> {
        let dist = dataset::class_distribution(examples);
        info!(
            "[dental_bot] Training on {} questions ({} domain, {} non-domain)",
            examples.len(),
            dist.domain,
            dist.non_domain
        );

        let texts: Vec<&str> = examples.iter().map(|e| e.text.as_str()).collect();
        let normalized: Vec<LabeledExample> = self
            .normalizer
            .normalize_batch(&texts)
            .into_iter()
            .zip(examples)
            .map(|(text, e)| LabeledExample::new(text, e.is_domain))
            .collect();

        self.classifier.train(&normalized, &self.config.classifier, control)
    }

    pub fn train_reference(&self, control: &TrainingControl) -> Result<TrainingOutcome, DetectionError> {
        self.train(&dataset::reference_examples(), control)
    }

    /// Train from the configured CSV, falling back to the reference set.
    pub fn train_default(
        &self,
        csv: Option<&Path>,
        control: &TrainingControl,
    ) -> Result<(TrainingOutcome, DatasetSource), DetectionError> {
        let path = csv
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.config.dataset_csv());
        let (examples, source) = dataset::load_or_reference(Some(&path));
        match self.train(&examples, control) {
            Ok(outcome) => Ok((outcome, source)),
            Err(e @ DetectionError::TrainingAborted(_)) => Err(e),
            Err(e) if source != DatasetSource::Reference => {
                warn!("[dental_bot] Training on {} failed ({}); retrying with reference examples", source.describe(), e);
                Ok((self.train_reference(control)?, DatasetSource::Reference))
            }
            Err(e) => Err(e),
        }
    }

    pub fn classify(&self, question: &str) -> Result<Verdict, DetectionError> {
        self.arbiter.classify(question)
    }

    /// Classify, then hand the verdict to the generator. Guard verdicts get
    /// fixed answers without a generator call.
    pub async fn ask<G: AnswerGenerator>(
        &self,
        question: &str,
        generator: &G,
    ) -> Result<BotResponse, DetectionError> {
        let verdict = self.classify(question)?;

        let answer = match verdict.method {
            DecisionMethod::Validation => INVALID_QUESTION_ANSWER.to_string(),
            DecisionMethod::Normalization => UNRECOGNIZED_QUESTION_ANSWER.to_string(),
            _ if !self.config.generator.enabled => String::new(),
            _ => {
                let request = AnswerRequest {
                    original_question: question.to_string(),
                    is_domain: verdict.is_domain,
                };
                generator.generate(&request).await
            }
        };

        Ok(BotResponse {
            question: question.to_string(),
            verdict,
            answer,
        })
    }

    pub fn default_model_store(&self) -> ModelStore {
        ModelStore::in_dir(self.config.model_dir())
    }

    pub fn default_model_path(&self) -> PathBuf {
        self.default_model_store().path().to_path_buf()
    }

    pub fn load_model(&self, path: &Path) -> Result<(), DetectionError> {
        let model = ModelStore::at_path(path).load()?;
        self.classifier.install(Arc::new(model));
        Ok(())
    }

    pub fn save_model(&self, path: &Path) -> Result<(), DetectionError> {
        let model = self.classifier.snapshot().ok_or(DetectionError::UntrainedModel)?;
        ModelStore::at_path(path).save(&model)
    }

    pub fn statistics(&self, top_n: usize) -> BotStatistics {
        let top_features = self
            .classifier
            .snapshot()
            .map(|m| m.top_features(top_n))
            .unwrap_or_default();
        BotStatistics {
            trained: self.is_trained(),
            configuration: self.config.classifier.summary(),
            term_counts: self.term_counts(),
            top_features,
        }
    }

    /// Add a domain term at runtime. Returns false when it was already known.
    pub fn add_domain_term(&self, term: &str) -> Result<bool, DetectionError> {
        let added = self.arbiter.detector().add_term(term)?;
        if added {
            info!("[dental_bot] Added domain term '{}'", term.trim());
        }
        Ok(added)
    }

    /// Sorted domain dictionary.
    pub fn list_domain_terms(&self) -> Vec<String> {
        self.arbiter.detector().list_terms()
    }

    pub fn term_counts(&self) -> TermCounts {
        self.arbiter.detector().term_counts()
    }

    pub fn self_test_questions() -> &'static [&'static str] {
        SELF_TEST_QUESTIONS
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Confidence;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::OnceLock;

    struct EchoGenerator {
        calls: AtomicUsize,
    }

    impl EchoGenerator {
        fn new() -> Self {
            Self {
                calls: AtomicUsize::new(0),
            }
        }
    }

    impl AnswerGenerator for EchoGenerator {
        async fn generate(&self, request: &AnswerRequest) -> String {
            self.calls.fetch_add(1, Ordering::SeqCst);
            format!("{}:{}", request.is_domain, request.original_question)
        }
    }

    fn test_config() -> AppConfig {
        let mut config = AppConfig::default();
        config.classifier.tree_count = 60;
        config.resources.nltk_data_dir = None;
        config
    }

    fn untrained_bot() -> DentalBot {
        DentalBot::new(test_config())
    }

    fn reference_bot() -> &'static DentalBot {
        static BOT: OnceLock<DentalBot> = OnceLock::new();
        BOT.get_or_init(|| {
            let bot = untrained_bot();
            bot.train_reference(&TrainingControl::new()).unwrap();
            bot
        })
    }

    #[test]
    fn test_classify_before_training_fails() {
        let bot = untrained_bot();
        assert!(!bot.is_trained());
        assert!(matches!(bot.classify("¿Qué es un diente?"), Err(DetectionError::UntrainedModel)));
        let stats = bot.statistics(5);
        assert!(!stats.trained);
        assert!(stats.top_features.is_empty());
    }

    #[test]
    fn test_reference_model_scenarios() {
        let bot = reference_bot();

        let v = bot.classify("¿Qué es un diente?").unwrap();
        assert!(v.is_domain);
        assert_eq!(v.confidence, Confidence::High);

        let v = bot.classify("¿Cómo hacer una obturación?").unwrap();
        assert!(!v.is_domain);
        assert_eq!(v.method, DecisionMethod::LexicalOnly);

        let v = bot.classify("¿Capital de Francia?").unwrap();
        assert!(!v.is_domain);
        assert!(v.evidence.statistical.is_some());
    }

    #[test]
    fn test_self_test_questions_classify() {
        let bot = reference_bot();
        assert_eq!(DentalBot::self_test_questions().len(), 6);
        for q in DentalBot::self_test_questions() {
            assert!(bot.classify(q).is_ok());
        }
    }

    #[tokio::test]
    async fn test_ask_hands_off_to_generator() {
        let bot = reference_bot();
        let generator = EchoGenerator::new();
        let response = bot.ask("¿Qué es un diente?", &generator).await.unwrap();
        assert_eq!(response.answer, "true:¿Qué es un diente?");
        assert_eq!(generator.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_ask_guard_verdicts_use_fixed_answers() {
        let bot = reference_bot();
        let generator = EchoGenerator::new();

        let response = bot.ask("ab", &generator).await.unwrap();
        assert_eq!(response.answer, INVALID_QUESTION_ANSWER);

        let response = bot.ask("¿¿ 42 ??", &generator).await.unwrap();
        assert_eq!(response.verdict.method, DecisionMethod::Normalization);
        assert_eq!(response.answer, UNRECOGNIZED_QUESTION_ANSWER);

        assert_eq!(generator.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_disabled_generator_is_skipped() {
        let mut config = test_config();
        config.generator.enabled = false;
        let bot = DentalBot::new(config);
        bot.train_reference(&TrainingControl::new()).unwrap();
        let generator = EchoGenerator::new();
        let response = bot.ask("¿Qué es un diente?", &generator).await.unwrap();
        assert!(response.answer.is_empty());
        assert!(response.verdict.is_domain);
        assert_eq!(generator.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_save_and_load_model() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("modelo.json");

        let fresh = untrained_bot();
        assert!(matches!(fresh.save_model(&path), Err(DetectionError::UntrainedModel)));

        reference_bot().save_model(&path).unwrap();
        fresh.load_model(&path).unwrap();
        assert!(fresh.is_trained());

        for question in ["¿Cómo se forma la raíz?", "¿Capital de Francia?"] {
            let restored = fresh.classify(question).unwrap();
            let original = reference_bot().classify(question).unwrap();
            assert_eq!(restored.is_domain, original.is_domain);
            assert_eq!(restored.method, original.method);
            assert!((restored.probability - original.probability).abs() < 1e-9);
        }
    }

    #[test]
    fn test_add_domain_term_updates_counts() {
        let bot = untrained_bot();
        let before = bot.term_counts();
        assert!(bot.add_domain_term("gubernáculo").unwrap());
        assert!(!bot.add_domain_term("gubernáculo").unwrap());
        assert_eq!(bot.term_counts().domain_terms, before.domain_terms + 1);
        assert!(matches!(bot.add_domain_term("   "), Err(DetectionError::Validation(_))));
    }

    #[test]
    fn test_statistics_after_training() {
        let stats = reference_bot().statistics(5);
        assert!(stats.trained);
        assert!(stats.top_features.len() <= 5);
        assert!(!stats.top_features.is_empty());
        assert!(stats.configuration.contains("60"));
    }

    #[test]
    fn test_train_default_falls_back_to_reference() {
        let dir = tempfile::tempdir().unwrap();
        let bot = untrained_bot();
        let (outcome, source) = bot
            .train_default(Some(&dir.path().join("missing.csv")), &TrainingControl::new())
            .unwrap();
        assert_eq!(source, DatasetSource::Reference);
        assert!(outcome.report.test_size > 0);
    }

    #[test]
    fn test_train_default_reads_configured_csv() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("preguntas_dentales.csv");
        let mut content = String::from("pregunta,es_anatomia_dental\n");
        for example in dataset::reference_examples() {
            content.push_str(&format!(
                "\"{}\",{}\n",
                example.text.replace('"', "\"\""),
                u8::from(example.is_domain)
            ));
        }
        std::fs::write(&path, content).unwrap();

        let mut config = test_config();
        config.paths.dataset_csv = Some(path.clone());
        let bot = DentalBot::new(config);
        let (_, source) = bot.train_default(None, &TrainingControl::new()).unwrap();
        assert_eq!(source, DatasetSource::Csv(path.display().to_string()));
        assert!(bot.is_trained());
    }

    #[test]
    fn test_list_domain_terms_tracks_additions() {
        let bot = untrained_bot();
        let before = bot.list_domain_terms();
        assert_eq!(before.len(), bot.term_counts().domain_terms);
        assert!(before.windows(2).all(|w| w[0] <= w[1]));
        assert!(!before.contains(&"odontoblasto".to_string()));
        bot.add_domain_term("Odontoblasto").unwrap();
        assert!(bot.list_domain_terms().contains(&"odontoblasto".to_string()));
    }

    #[test]
    fn test_aborted_training_keeps_bot_untrained() {
        let bot = untrained_bot();
        let control = TrainingControl::new();
        control.abort();
        assert!(matches!(
            bot.train_reference(&control),
            Err(DetectionError::TrainingAborted(_))
        ));
        assert!(!bot.is_trained());
    }
}
