// Vocabulary Store
// Process-wide domain / exclusion / protected term sets.
// Readers take Arc snapshots; writers swap in a rebuilt set (copy-on-write),
// so a scan never observes a half-updated set.

use parking_lot::RwLock;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::info;

use super::error::DetectionError;
use crate::models::TermCounts;

const DOMAIN_TERMS: &[&str] = &[
    // anatomía básica
    "diente", "dientes", "dental", "dentales", "dentición", "dentadura",
    "incisivo", "incisivos", "canino", "caninos", "premolar", "premolares",
    "molar", "molares", "corona", "raiz", "raíz", "raices", "raíces",
    // tipos de dientes
    "temporal", "temporales", "permanente", "permanentes", "deciduo", "decidua",
    "leche", "primario", "primarios", "secundario", "secundarios",
    // estructuras
    "esmalte", "dentina", "cemento", "pulpa", "nervio", "cámara pulpar",
    "conducto", "conductos", "apex", "ápice", "foramen", "apical",
    // superficies y caras
    "oclusal", "incisal", "vestibular", "lingual", "palatino", "palatina",
    "mesial", "distal", "proximal", "interproximal", "cervical",
    // accidentes anatómicos
    "cúspide", "cúspides", "fosa", "foseta", "surco", "surcos",
    "cíngulo", "tubérculo", "cresta", "reborde", "lóbulo",
    "carabelli", "vertiente", "vertientes",
    // periodonto
    "encía", "encías", "gingival", "periodonto", "periodontal",
    "ligamento", "hueso alveolar", "alveolar", "alvéolo", "alveolo",
    // ortodoncia
    "ortodoncia", "ortodóncia", "ortodoncico", "ortodóncico",
    "brackets", "bracket", "brakets", "breket", "frenillos",
    "aparato", "aparatos", "retenedor", "retenedores",
    "alineador", "alineadores", "invisalign",
    "arco", "alambre", "ligadura", "elástico", "elásticos",
    "maloclusión", "maloclusiones", "oclusión", "mordida",
    "apiñamiento", "diastema", "sobremordida", "submordida",
    "clase skeletal", "clase molar", "clase canina",
    // clasificación
    "fdi", "nomenclatura", "numeración", "sistema universal",
    "cuadrante", "cuadrantes", "hemiarcada",
    // morfología
    "morfología", "morfológico", "morfológica", "anatomía", "anatómico",
    "estructura", "característica", "características", "forma",
    // dimensiones
    "corona clínica", "corona anatómica", "longitud", "ancho",
    "dimensión", "dimensiones", "tamaño", "milímetros",
    // desarrollo
    "erupción", "erupcionar", "brote", "calcificación",
    "formación", "desarrollo", "crecimiento",
    // radiología
    "radiografía", "radiográfico", "rx", "periapical",
    "panorámica", "bite-wing",
    // maxilares y arcadas
    "maxilar", "mandíbula", "mandibular", "superior", "inferior",
    "anterior", "posterior", "arcada", "arcadas",
    "contacto", "punto de contacto", "tronera", "embrasure",
    // nombres coloquiales
    "muela", "muelas", "colmillo", "colmillos", "paleta", "paletas",
];

const EXCLUSION_TERMS: &[&str] = &[
    // procedimientos clínicos
    "obturación", "obturacion", "amalgama", "resina", "composite",
    "extracción", "extraccion", "exodoncia", "sacar",
    "limpieza", "profilaxis", "tartrectomía", "tartrectomia",
    "blanqueamiento", "blanquear", "aclarar",
    "implante", "implantes", "implantar", "colocar",
    "endodoncia", "tratamiento de conducto", "matar nervio",
    "pulpotomía", "pulpotomia", "pulpectomía", "pulpectomia",
    "corona protésica", "puente", "prótesis", "protesis",
    "cirugía", "cirugia", "quirúrgico", "quirurgico",
    // patología
    "caries", "cavidad", "lesión", "lesion",
    "gingivitis", "periodontitis", "piorrea",
    "absceso", "infección", "infeccion", "inflamación", "inflamacion",
    "pulpitis", "necrosis", "granuloma", "quiste",
    "bruxismo", "rechinar", "apretar",
    "halitosis", "mal aliento",
    "sensibilidad", "hipersensibilidad",
    // medicamentos
    "analgésico", "analgesico", "antibiótico", "antibiotico",
    "ibuprofeno", "paracetamol", "amoxicilina",
    "anestesia", "lidocaína", "lidocaina",
    // diagnóstico
    "diagnosticar", "síntoma", "sintoma", "signo",
    "dolor", "molestia", "hinchazón", "hinchazon",
];

/// Curated allow-list of tokens the normalizer must keep. Content-word tokens of
/// every domain term are merged in on top of this list.
const PROTECTED_TERMS: &[&str] = &[
    "incisivo", "canino", "premolar", "molar", "temporal", "permanente",
    "superior", "inferior", "corona", "raiz", "raíz", "cuspide", "cúspide",
    "anatomia", "anatomía", "morfologia", "morfología", "dental", "diente",
    "dientes", "dentición", "dentadura",
    "incisivos", "caninos", "premolares", "molares", "raices", "raíces",
    "cuspides", "cúspides", "temporales", "permanentes", "superiores", "inferiores",
    "ortodoncia", "ortodóncia", "ortodoncico", "ortodóncico", "ortodontico",
    "brackets", "bracket", "brakets", "breket", "frenillos", "frenillo",
    "aparato", "aparatos", "retenedor", "retenedores", "contenedor",
    "alineador", "alineadores", "invisalign",
    "arco", "alambre", "ligadura", "ligaduras", "elástico", "elásticos",
    "maloclusión", "maloclusiones", "oclusión", "oclusal",
    "mordida", "sobremordida", "submordida", "cruzada",
    "apiñamiento", "diastema", "espacios",
    "clase", "skeletal", "esquelética", "esquelético",
    "fdi", "vestibular", "lingual", "mesial", "distal",
    "cervical", "incisal", "nomenclatura", "numeración", "clasificación",
    "cuadrante", "cuadrantes", "hemiarcada",
    "esmalte", "dentina", "cemento", "pulpa", "nervio",
    "conducto", "conductos", "camara", "cámara", "pulpar",
    "apex", "ápice", "apical", "foramen",
    "encía", "encías", "gingival", "periodonto", "periodontal",
    "ligamento", "hueso", "alveolar", "alvéolo", "alveolo",
    "palatino", "palatina", "proximal", "interproximal",
    "borde", "cara", "caras", "superficie", "superficies",
    "fosa", "foseta", "fosetas", "surco", "surcos",
    "cíngulo", "tubérculo", "tuberculo", "cresta", "crestas",
    "reborde", "rebordes", "lóbulo", "lóbulos", "lobulo", "lobulos",
    "carabelli", "vertiente", "vertientes",
    "convexidad", "concavidad", "contorno", "ecuador",
    "deciduo", "decidua", "leche", "primario", "primarios",
    "secundario", "secundarios", "mixta",
    "muela", "muelas", "colmillo", "colmillos", "paleta", "paletas",
    "longitud", "ancho", "dimensión", "dimensiones", "tamaño",
    "milímetros", "milimetros", "mm", "medida", "medidas",
    "clínica", "clinica", "anatómica", "anatomica",
    "erupción", "erupcionar", "brote", "calcificación", "calcificacion",
    "formación", "formacion", "desarrollo", "crecimiento",
    "maxilar", "mandíbula", "mandibula", "mandibular",
    "anterior", "posterior", "arcada", "arcadas",
    "contacto", "punto", "tronera", "embrasure",
    "características", "característica", "diferencias", "diferencia",
    "comparación", "comparar", "identificar", "estructura",
    "forma", "formas", "tipo", "tipos", "aspecto",
    "radiografía", "radiografia", "radiográfico", "radiografico",
    "rx", "periapical", "panorámica", "panoramica",
    "tabla", "plano", "línea", "linea", "zona", "área", "region", "región",
];

/// Immutable view of the term sets taken at one instant.
#[derive(Debug, Clone)]
pub struct VocabularySnapshot {
    pub domain_terms: Arc<HashSet<String>>,
    pub exclusion_terms: Arc<HashSet<String>>,
    pub protected: Arc<HashSet<String>>,
}

#[derive(Debug)]
struct VocabularySets {
    domain_terms: Arc<HashSet<String>>,
    exclusion_terms: Arc<HashSet<String>>,
    protected: Arc<HashSet<String>>,
}

#[derive(Debug)]
pub struct VocabularyStore {
    sets: RwLock<VocabularySets>,
}

impl Default for VocabularyStore {
    fn default() -> Self {
        Self::dental()
    }
}

fn normalize_term(term: &str) -> String {
    term.trim().to_lowercase()
}

/// Articles, conjunctions and short prepositions that glue multi-word terms
/// together ("punto de contacto"). They never become protected on their own.
const FUNCTION_WORDS: &[&str] = &[
    "de", "del", "el", "la", "los", "las", "lo", "un", "una", "unos", "unas",
    "y", "e", "o", "u", "a", "al", "en", "con", "por", "para", "que", "se", "su", "sus",
];

/// Word tokens of a (possibly multi-word) term.
fn term_tokens(term: &str) -> impl Iterator<Item = &str> {
    term.split(|c: char| c.is_whitespace() || c == '-')
        .filter(|t| !t.is_empty())
}

/// Tokens of a domain term that join the protected set.
fn protected_tokens(term: &str) -> impl Iterator<Item = String> + '_ {
    term_tokens(term)
        .filter(|t| !FUNCTION_WORDS.contains(t))
        .map(str::to_string)
}

impl VocabularyStore {
    /// Built-in dental anatomy vocabulary.
    pub fn dental() -> Self {
        Self::from_terms(
            DOMAIN_TERMS.iter().copied(),
            EXCLUSION_TERMS.iter().copied(),
            PROTECTED_TERMS.iter().copied(),
        )
    }

    /// Build a store from arbitrary term lists. Terms listed as exclusions are
    /// dropped from the domain set so both sets stay disjoint.
    pub fn from_terms<'a>(
        domain: impl IntoIterator<Item = &'a str>,
        exclusion: impl IntoIterator<Item = &'a str>,
        protected: impl IntoIterator<Item = &'a str>,
    ) -> Self {
        let exclusion_terms: HashSet<String> = exclusion
            .into_iter()
            .map(normalize_term)
            .filter(|t| !t.is_empty())
            .collect();
        let domain_terms: HashSet<String> = domain
            .into_iter()
            .map(normalize_term)
            .filter(|t| !t.is_empty() && !exclusion_terms.contains(t))
            .collect();

        let mut protected_set: HashSet<String> = protected
            .into_iter()
            .map(normalize_term)
            .filter(|t| !t.is_empty())
            .collect();
        for term in &domain_terms {
            protected_set.extend(protected_tokens(term));
        }

        Self {
            sets: RwLock::new(VocabularySets {
                domain_terms: Arc::new(domain_terms),
                exclusion_terms: Arc::new(exclusion_terms),
                protected: Arc::new(protected_set),
            }),
        }
    }

    pub fn snapshot(&self) -> VocabularySnapshot {
        let sets = self.sets.read();
        VocabularySnapshot {
            domain_terms: Arc::clone(&sets.domain_terms),
            exclusion_terms: Arc::clone(&sets.exclusion_terms),
            protected: Arc::clone(&sets.protected),
        }
    }

    pub fn protected_terms(&self) -> Arc<HashSet<String>> {
        Arc::clone(&self.sets.read().protected)
    }

    /// Add a domain term at runtime. Returns `Ok(false)` if it was already known.
    pub fn add_domain_term(&self, term: &str) -> Result<bool, DetectionError> {
        let term = normalize_term(term);
        if term.is_empty() {
            return Err(DetectionError::Validation("term must not be empty".to_string()));
        }

        let mut sets = self.sets.write();
        if sets.exclusion_terms.contains(&term) {
            return Err(DetectionError::Validation(format!(
                "'{}' is an exclusion term",
                term
            )));
        }
        if sets.domain_terms.contains(&term) {
            return Ok(false);
        }

        let mut domain = (*sets.domain_terms).clone();
        domain.insert(term.clone());
        let mut protected = (*sets.protected).clone();
        protected.extend(protected_tokens(&term));

        sets.domain_terms = Arc::new(domain);
        sets.protected = Arc::new(protected);
        drop(sets);

        info!("[vocabulary] Added domain term: {}", term);
        Ok(true)
    }

    pub fn term_counts(&self) -> TermCounts {
        let sets = self.sets.read();
        let domain_terms = sets.domain_terms.len();
        let exclusion_terms = sets.exclusion_terms.len();
        TermCounts {
            domain_terms,
            exclusion_terms,
            total: domain_terms + exclusion_terms,
        }
    }

    /// Sorted list of the known domain terms.
    pub fn list_domain_terms(&self) -> Vec<String> {
        let mut terms: Vec<String> = self.snapshot().domain_terms.iter().cloned().collect();
        terms.sort();
        terms
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sets_are_disjoint() {
        let store = VocabularyStore::dental();
        let snap = store.snapshot();
        assert!(snap.domain_terms.is_disjoint(&snap.exclusion_terms));
        assert!(!snap.domain_terms.is_empty());
        assert!(!snap.exclusion_terms.is_empty());
    }

    #[test]
    fn test_protected_covers_every_domain_token() {
        let store = VocabularyStore::dental();
        let snap = store.snapshot();
        for term in snap.domain_terms.iter() {
            for token in term_tokens(term).filter(|t| !FUNCTION_WORDS.contains(t)) {
                assert!(snap.protected.contains(token), "missing protected token {}", token);
            }
        }
    }

    #[test]
    fn test_function_words_of_phrases_stay_unprotected() {
        let store = VocabularyStore::dental();
        assert!(store.snapshot().domain_terms.contains("punto de contacto"));
        let protected = store.protected_terms();
        for word in ["de", "del", "la", "el", "y", "en"] {
            assert!(!protected.contains(word), "'{}' should not be protected", word);
        }
        assert!(protected.contains("contacto"));
    }

    #[test]
    fn test_runtime_phrase_protects_content_words_only() {
        let store = VocabularyStore::from_terms(["molar"], Vec::<&str>::new(), Vec::<&str>::new());
        assert!(store.add_domain_term("surco de desarrollo").unwrap());
        let protected = store.protected_terms();
        assert!(protected.contains("surco"));
        assert!(protected.contains("desarrollo"));
        assert!(!protected.contains("de"));
    }

    #[test]
    fn test_add_domain_term() {
        let store = VocabularyStore::dental();
        let before = store.term_counts();
        assert!(store.add_domain_term("  Odontoblasto ").unwrap());
        assert!(!store.add_domain_term("odontoblasto").unwrap());
        let after = store.term_counts();
        assert_eq!(after.domain_terms, before.domain_terms + 1);
        assert_eq!(after.total, before.total + 1);
        assert!(store.protected_terms().contains("odontoblasto"));
    }

    #[test]
    fn test_add_rejects_exclusion_and_empty() {
        let store = VocabularyStore::dental();
        assert!(matches!(
            store.add_domain_term("caries"),
            Err(DetectionError::Validation(_))
        ));
        assert!(matches!(
            store.add_domain_term("   "),
            Err(DetectionError::Validation(_))
        ));
    }

    #[test]
    fn test_snapshot_is_stable_across_writes() {
        let store = VocabularyStore::dental();
        let snap = store.snapshot();
        let len = snap.domain_terms.len();
        store.add_domain_term("odontoblasto").unwrap();
        assert_eq!(snap.domain_terms.len(), len);
        assert_eq!(store.snapshot().domain_terms.len(), len + 1);
    }

    #[test]
    fn test_list_is_sorted() {
        let store = VocabularyStore::from_terms(["molar", "canino", "diente"], ["caries"], Vec::<&str>::new());
        assert_eq!(store.list_domain_terms(), vec!["canino", "diente", "molar"]);
    }

    #[test]
    fn test_concurrent_readers_and_writer() {
        let store = Arc::new(VocabularyStore::dental());
        let handles: Vec<_> = (0..4)
            .map(|i| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    for j in 0..50 {
                        if i == 0 {
                            store.add_domain_term(&format!("término{}", j)).unwrap();
                        } else {
                            let snap = store.snapshot();
                            assert!(snap.domain_terms.contains("diente"));
                        }
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert!(store.snapshot().domain_terms.contains("término49"));
    }
}
