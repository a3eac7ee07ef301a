// DentalBot Core Services

pub mod text_processor;
pub mod config_store;
pub mod providers;
pub mod detection;
pub mod dataset;
pub mod model_store;
pub mod dental_bot;

pub use text_processor::{
    clean_text,
    LinguisticResources,
    Normalizer,
    ResourceStatus,
    StopwordSource,
    UnicodeWordSegmenter,
    WordSegmenter,
};
pub use config_store::*;
pub use providers::{AnswerGenerator, GroqAnswerGenerator, ProviderClient, ProviderError};
pub use dataset::{load_or_reference, reference_examples, DatasetError, DatasetSource};
pub use model_store::ModelStore;
pub use dental_bot::DentalBot;

pub use detection::{
    arbitrate,
    ArbiterThresholds,
    ClassifierConfig,
    DetectionError,
    HybridArbiter,
    LexicalDetector,
    StatisticalClassifier,
    StatisticalScorer,
    TrainedModel,
    TrainingControl,
    TrainingOutcome,
    VocabularyStore,
};
