// Detection Module
// Domain-membership core organized into specialized submodules:
// - vocabulary: process-wide domain / exclusion / protected term sets
// - term_detector: dictionary-based lexical detector
// - vectorizer, forest, classifier: TF-IDF + random forest statistical stage
// - evaluation: held-out metrics
// - arbiter: hybrid verdict from both stages

pub mod error;
pub mod vocabulary;
pub mod term_detector;
pub mod vectorizer;
pub mod forest;
pub mod classifier;
pub mod evaluation;
pub mod arbiter;

pub use error::DetectionError;
pub use vocabulary::{VocabularySnapshot, VocabularyStore};
pub use term_detector::LexicalDetector;
pub use vectorizer::{SparseRow, TfidfVectorizer, VectorizerParams};
pub use forest::{ForestParams, RandomForest};
pub use classifier::{
    stratified_split,
    ClassifierConfig,
    StatisticalClassifier,
    TrainedModel,
    TrainingControl,
    TrainingOutcome,
};
pub use evaluation::{compute_metrics, evaluate};
pub use arbiter::{arbitrate, ArbiterThresholds, HybridArbiter, StatisticalScorer};
