// Text Normalization Service
// Raw question -> filtered token stream, keeping the protected dental vocabulary

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};
use tracing::{debug, info, warn};

use crate::services::detection::error::DetectionError;
use crate::services::detection::vocabulary::VocabularyStore;

/// Spanish stopword list shipped with the NLTK corpus.
const EMBEDDED_SPANISH_STOPWORDS: &[&str] = &[
    "de", "la", "que", "el", "en", "y", "a", "los", "del", "se", "las", "por", "un", "para",
    "con", "no", "una", "su", "al", "lo", "como", "más", "pero", "sus", "le", "ya", "o",
    "este", "sí", "porque", "esta", "entre", "cuando", "muy", "sin", "sobre", "también",
    "me", "hasta", "hay", "donde", "quien", "desde", "todo", "nos", "durante", "todos",
    "uno", "les", "ni", "contra", "otros", "ese", "eso", "ante", "ellos", "e", "esto",
    "mí", "antes", "algunos", "qué", "unos", "yo", "otro", "otras", "otra", "él", "tanto",
    "esa", "estos", "mucho", "quienes", "nada", "muchos", "cual", "poco", "ella", "estar",
    "estas", "algunas", "algo", "nosotros", "mi", "mis", "tú", "te", "ti", "tu", "tus",
    "ellas", "nosotras", "vosotros", "vosotras", "os", "mío", "mía", "míos", "mías",
    "tuyo", "tuya", "tuyos", "tuyas", "suyo", "suya", "suyos", "suyas", "nuestro",
    "nuestra", "nuestros", "nuestras", "vuestro", "vuestra", "vuestros", "vuestras",
    "esos", "esas", "estoy", "estás", "está", "estamos", "estáis", "están", "esté",
    "estés", "estemos", "estéis", "estén", "estaré", "estarás", "estará", "estaremos",
    "estaréis", "estarán", "estaría", "estarías", "estaríamos", "estaríais", "estarían",
    "estaba", "estabas", "estábamos", "estabais", "estaban", "estuve", "estuviste",
    "estuvo", "estuvimos", "estuvisteis", "estuvieron", "estuviera", "estuvieras",
    "estuviéramos", "estuvierais", "estuvieran", "estuviese", "estuvieses",
    "estuviésemos", "estuvieseis", "estuviesen", "estando", "estado", "estada",
    "estados", "estadas", "estad", "he", "has", "ha", "hemos", "habéis", "han", "haya",
    "hayas", "hayamos", "hayáis", "hayan", "habré", "habrás", "habrá", "habremos",
    "habréis", "habrán", "habría", "habrías", "habríamos", "habríais", "habrían",
    "había", "habías", "habíamos", "habíais", "habían", "hube", "hubiste", "hubo",
    "hubimos", "hubisteis", "hubieron", "hubiera", "hubieras", "hubiéramos",
    "hubierais", "hubieran", "hubiese", "hubieses", "hubiésemos", "hubieseis",
    "hubiesen", "habiendo", "habido", "habida", "habidos", "habidas", "soy", "eres",
    "es", "somos", "sois", "son", "sea", "seas", "seamos", "seáis", "sean", "seré",
    "serás", "será", "seremos", "seréis", "serán", "sería", "serías", "seríamos",
    "seríais", "serían", "era", "eras", "éramos", "erais", "eran", "fui", "fuiste",
    "fue", "fuimos", "fuisteis", "fueron", "fuera", "fueras", "fuéramos", "fuerais",
    "fueran", "fuese", "fueses", "fuésemos", "fueseis", "fuesen", "sintiendo",
    "sentido", "sentida", "sentidos", "sentidas", "siente", "sentid", "tengo", "tienes",
    "tiene", "tenemos", "tenéis", "tienen", "tenga", "tengas", "tengamos", "tengáis",
    "tengan", "tendré", "tendrás", "tendrá", "tendremos", "tendréis", "tendrán",
    "tendría", "tendrías", "tendríamos", "tendríais", "tendrían", "tenía", "tenías",
    "teníamos", "teníais", "tenían", "tuve", "tuviste", "tuvo", "tuvimos", "tuvisteis",
    "tuvieron", "tuviera", "tuvieras", "tuviéramos", "tuvierais", "tuvieran",
    "tuviese", "tuvieses", "tuviésemos", "tuvieseis", "tuviesen", "teniendo", "tenido",
    "tenida", "tenidos", "tenidas", "tened",
];

/// Interrogatives and prepositions that carry no domain signal.
const EXTRA_STOPWORDS: &[&str] = &["qué", "cómo", "cuál", "cuáles", "dónde", "cuándo", "por", "para"];

/// NLTK corpus layout, relative to the resources directory.
const STOPWORDS_RELATIVE_PATH: &str = "corpora/stopwords/spanish";

fn punctuation_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // `\w` is Unicode-aware, so accented letters and ñ survive; `_` counts as punctuation.
    RE.get_or_init(|| Regex::new(r"[^\w\s]|_").expect("valid punctuation regex"))
}

fn digits_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\d+").expect("valid digit regex"))
}

fn word_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\w+").expect("valid word regex"))
}

// ============ Linguistic Resources ============

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "kind", content = "path")]
pub enum StopwordSource {
    File(PathBuf),
    Embedded,
}

/// Outcome of resource initialization. `issue` is set when a fallback was used.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceStatus {
    pub stopwords: StopwordSource,
    pub stopword_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issue: Option<String>,
}

impl ResourceStatus {
    pub fn is_degraded(&self) -> bool {
        self.issue.is_some()
    }
}

#[derive(Debug, Clone)]
pub struct LinguisticResources {
    stopwords: HashSet<String>,
}

fn read_stopword_file(path: &Path) -> Result<HashSet<String>, DetectionError> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        DetectionError::ResourceUnavailable(format!("{}: {}", path.display(), e))
    })?;
    let words: HashSet<String> = content
        .lines()
        .map(|l| l.trim().to_lowercase())
        .filter(|l| !l.is_empty())
        .collect();
    if words.is_empty() {
        return Err(DetectionError::ResourceUnavailable(format!(
            "{}: empty stopword list",
            path.display()
        )));
    }
    Ok(words)
}

impl LinguisticResources {
    /// Embedded stopwords plus the extra interrogatives.
    pub fn embedded() -> Self {
        Self::with_stopwords(EMBEDDED_SPANISH_STOPWORDS.iter().map(|s| s.to_string()))
    }

    fn with_stopwords(words: impl IntoIterator<Item = String>) -> Self {
        let mut stopwords: HashSet<String> = words.into_iter().collect();
        stopwords.extend(EXTRA_STOPWORDS.iter().map(|s| s.to_string()));
        Self { stopwords }
    }

    /// Load the stopword corpus from an NLTK-style data directory.
    /// Never fails: a missing or unreadable corpus falls back to the embedded list.
    pub fn load(dir: Option<&Path>) -> (Self, ResourceStatus) {
        let Some(dir) = dir else {
            let resources = Self::embedded();
            let status = ResourceStatus {
                stopwords: StopwordSource::Embedded,
                stopword_count: resources.stopwords.len(),
                issue: None,
            };
            return (resources, status);
        };

        let path = dir.join(STOPWORDS_RELATIVE_PATH);
        match read_stopword_file(&path) {
            Ok(words) => {
                let resources = Self::with_stopwords(words);
                info!(
                    "[text_processor] Loaded {} stopwords from {}",
                    resources.stopwords.len(),
                    path.display()
                );
                let status = ResourceStatus {
                    stopwords: StopwordSource::File(path),
                    stopword_count: resources.stopwords.len(),
                    issue: None,
                };
                (resources, status)
            }
            Err(e) => {
                warn!("[text_processor] {}; using embedded stopword list", e);
                let resources = Self::embedded();
                let status = ResourceStatus {
                    stopwords: StopwordSource::Embedded,
                    stopword_count: resources.stopwords.len(),
                    issue: Some(e.to_string()),
                };
                (resources, status)
            }
        }
    }

    pub fn is_stopword(&self, token: &str) -> bool {
        self.stopwords.contains(token)
    }

    pub fn stopword_count(&self) -> usize {
        self.stopwords.len()
    }
}

// ============ Word Segmentation ============

/// Language-aware tokenizer seam. Implementations may fail; the normalizer
/// then degrades to whitespace splitting.
pub trait WordSegmenter: Send + Sync {
    fn segment(&self, text: &str) -> Result<Vec<String>, DetectionError>;
}

/// Unicode word-boundary segmenter.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnicodeWordSegmenter;

impl WordSegmenter for UnicodeWordSegmenter {
    fn segment(&self, text: &str) -> Result<Vec<String>, DetectionError> {
        Ok(word_re()
            .find_iter(text)
            .map(|m| m.as_str().to_string())
            .collect())
    }
}

// ============ Normalizer ============

/// Lowercase, strip punctuation and digits, collapse whitespace.
pub fn clean_text(text: &str) -> String {
    if text.trim().is_empty() {
        return String::new();
    }
    let lowered = text.to_lowercase();
    let no_punct = punctuation_re().replace_all(&lowered, "");
    let no_digits = digits_re().replace_all(&no_punct, "");
    no_digits.split_whitespace().collect::<Vec<_>>().join(" ")
}

pub struct Normalizer {
    resources: Arc<LinguisticResources>,
    vocabulary: Arc<VocabularyStore>,
    segmenter: Box<dyn WordSegmenter>,
}

impl Normalizer {
    pub fn new(resources: Arc<LinguisticResources>, vocabulary: Arc<VocabularyStore>) -> Self {
        Self::with_segmenter(resources, vocabulary, Box::new(UnicodeWordSegmenter))
    }

    pub fn with_segmenter(
        resources: Arc<LinguisticResources>,
        vocabulary: Arc<VocabularyStore>,
        segmenter: Box<dyn WordSegmenter>,
    ) -> Self {
        Self {
            resources,
            vocabulary,
            segmenter,
        }
    }

    pub fn resources(&self) -> &LinguisticResources {
        &self.resources
    }

    fn tokenize(&self, cleaned: &str) -> Vec<String> {
        match self.segmenter.segment(cleaned) {
            Ok(tokens) => tokens,
            Err(e) => {
                warn!("[text_processor] Segmenter failed ({}), falling back to whitespace split", e);
                cleaned.split_whitespace().map(str::to_string).collect()
            }
        }
    }

    /// Filtered tokens. Empty only when the cleaned text is empty; if every
    /// token was a stopword, the cleaned tokens are returned unfiltered.
    pub fn normalize_tokens(&self, text: &str) -> Vec<String> {
        let cleaned = clean_text(text);
        if cleaned.is_empty() {
            return Vec::new();
        }

        let tokens = self.tokenize(&cleaned);
        let protected = self.vocabulary.protected_terms();
        let filtered: Vec<String> = tokens
            .iter()
            .filter(|t| protected.contains(t.as_str()) || !self.resources.is_stopword(t))
            .cloned()
            .collect();

        if filtered.is_empty() {
            debug!("[text_processor] All tokens were stopwords, keeping cleaned text");
            return cleaned.split_whitespace().map(str::to_string).collect();
        }
        filtered
    }

    pub fn normalize(&self, text: &str) -> String {
        self.normalize_tokens(text).join(" ")
    }

    pub fn normalize_batch<S: AsRef<str>>(&self, texts: &[S]) -> Vec<String> {
        texts.iter().map(|t| self.normalize(t.as_ref())).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn normalizer() -> Normalizer {
        Normalizer::new(
            Arc::new(LinguisticResources::embedded()),
            Arc::new(VocabularyStore::dental()),
        )
    }

    struct BrokenSegmenter;

    impl WordSegmenter for BrokenSegmenter {
        fn segment(&self, _text: &str) -> Result<Vec<String>, DetectionError> {
            Err(DetectionError::ResourceUnavailable("punkt model missing".to_string()))
        }
    }

    #[test]
    fn test_clean_text() {
        assert_eq!(clean_text("¿Qué es un   DIENTE?"), "qué es un diente");
        assert_eq!(clean_text("pieza 36, molar_inferior!"), "pieza molarinferior");
        assert_eq!(clean_text("   "), "");
    }

    #[test]
    fn test_normalize_removes_stopwords() {
        let n = normalizer();
        assert_eq!(n.normalize("¿Qué es un diente?"), "diente");
        assert_eq!(n.normalize("¿Cuál es la morfología del incisivo central?"), "morfología incisivo central");
    }

    #[test]
    fn test_empty_input() {
        let n = normalizer();
        assert_eq!(n.normalize(""), "");
        assert_eq!(n.normalize("  \t "), "");
        assert!(n.normalize_tokens("").is_empty());
    }

    #[test]
    fn test_all_stopwords_returns_cleaned_text() {
        let n = normalizer();
        assert_eq!(n.normalize("¿Qué es eso?"), "qué es eso");
    }

    #[test]
    fn test_protected_stopword_survives() {
        // "entre" is an NLTK stopword; a domain phrase makes it protected.
        let vocabulary = Arc::new(VocabularyStore::from_terms(
            ["entre dientes"],
            Vec::<&str>::new(),
            Vec::<&str>::new(),
        ));
        let n = Normalizer::new(Arc::new(LinguisticResources::embedded()), vocabulary);
        assert_eq!(n.normalize("el espacio entre los dientes"), "espacio entre dientes");
        assert_eq!(normalizer().normalize("el espacio entre los dientes"), "espacio dientes");
    }

    #[test]
    fn test_runtime_added_term_becomes_protected() {
        let vocabulary = Arc::new(VocabularyStore::dental());
        let n = Normalizer::new(Arc::new(LinguisticResources::embedded()), Arc::clone(&vocabulary));
        assert_eq!(n.normalize("cara de contra molar"), "cara molar");
        vocabulary.add_domain_term("contra").unwrap();
        assert_eq!(n.normalize("cara de contra molar"), "cara contra molar");
    }

    #[test]
    fn test_domain_phrase_glue_words_are_dropped() {
        let n = normalizer();
        assert_eq!(n.normalize("El punto de contacto del molar"), "punto contacto molar");
    }

    #[test]
    fn test_segmenter_failure_falls_back_to_whitespace() {
        let n = Normalizer::with_segmenter(
            Arc::new(LinguisticResources::embedded()),
            Arc::new(VocabularyStore::dental()),
            Box::new(BrokenSegmenter),
        );
        assert_eq!(n.normalize("¿Qué es un diente?"), "diente");
    }

    #[test]
    fn test_batch_keeps_length() {
        let n = normalizer();
        let out = n.normalize_batch(&["¿Qué es un molar?", "", "capital de Francia"]);
        assert_eq!(out.len(), 3);
        assert_eq!(out[0], "molar");
        assert_eq!(out[1], "");
        assert_eq!(out[2], "capital francia");
    }

    #[test]
    fn test_load_missing_dir_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let (resources, status) = LinguisticResources::load(Some(dir.path()));
        assert_eq!(status.stopwords, StopwordSource::Embedded);
        assert!(status.is_degraded());
        assert!(resources.is_stopword("de"));
        assert!(resources.is_stopword("cómo"));
    }

    #[test]
    fn test_load_from_corpus_file() {
        let dir = tempfile::tempdir().unwrap();
        let corpus = dir.path().join("corpora").join("stopwords");
        std::fs::create_dir_all(&corpus).unwrap();
        std::fs::write(corpus.join("spanish"), "el\nla\nbanana\n").unwrap();

        let (resources, status) = LinguisticResources::load(Some(dir.path()));
        assert!(matches!(status.stopwords, StopwordSource::File(_)));
        assert!(!status.is_degraded());
        assert!(resources.is_stopword("banana"));
        assert!(resources.is_stopword("dónde"));
        assert!(!resources.is_stopword("de"));

        let (again, status_again) = LinguisticResources::load(Some(dir.path()));
        assert_eq!(again.stopword_count(), resources.stopword_count());
        assert_eq!(status_again, status);
    }

    proptest! {
        #[test]
        fn prop_normalize_never_panics(text in "\\PC{0,80}") {
            let n = normalizer();
            let out = n.normalize(&text);
            if text.trim().is_empty() {
                prop_assert!(out.is_empty());
            }
            prop_assert!(!out.contains("  "));
        }

        #[test]
        fn prop_protected_terms_survive(
            word in prop::sample::select(vec!["molar", "incisivo", "corona", "raíz", "cúspide", "esmalte"]),
            filler in prop::sample::select(vec!["de", "la", "el", "que", "entre", "sobre"]),
        ) {
            let n = normalizer();
            let out = n.normalize(&format!("{} {} {}", filler, word, filler));
            prop_assert!(out.split(' ').any(|t| t == word));
        }
    }
}
