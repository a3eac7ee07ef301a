// Example Data Service
// Built-in reference questions and the CSV training-data loader

use std::fs;
use std::path::Path;
use thiserror::Error;
use tracing::{info, warn};

use crate::models::{ClassDistribution, LabeledExample};

pub const QUESTION_COLUMN: &str = "pregunta";
pub const LABEL_COLUMN: &str = "es_anatomia_dental";

const REFERENCE_DOMAIN: &[&str] = &[
    "¿Características del incisivo central superior?",
    "¿Morfología de la corona del incisivo lateral?",
    "¿Diferencias entre incisivo central y lateral?",
    "¿Cúspides del primer premolar superior?",
    "¿Anatomía del canino superior?",
    "¿Cuántas raíces tiene el primer molar superior?",
    "¿Qué es la cúspide de Carabelli?",
    "¿Características del segundo premolar inferior?",
    "¿Qué es un diente?",
    "¿Cuáles son las partes de un diente?",
    "¿Qué capas forman la estructura del diente?",
    "¿Cómo es la cámara pulpar del primer molar inferior?",
    "¿Qué superficies tiene un molar?",
    "¿Cuántos conductos tiene el primer premolar superior?",
    "¿Cuándo ocurre la erupción de los dientes temporales?",
    "¿Qué es el ligamento periodontal?",
    "¿Cómo se numeran los dientes según la nomenclatura FDI?",
    "¿Qué función tienen los brackets en la ortodoncia?",
    "¿Qué es la maloclusión clase II?",
    "¿Forma de la corona del canino inferior?",
];

const REFERENCE_NON_DOMAIN: &[&str] = &[
    "¿Cómo hacer una obturación?",
    "¿Qué es la diabetes?",
    "¿Capital de Francia?",
    "¿Cómo tratar caries?",
    "¿Síntomas de hipertensión?",
    "¿Qué es un tratamiento de conducto?",
    "¿Cómo blanquear los dientes?",
    "¿Pasos para una extracción dental?",
    "¿Capital de Italia?",
    "¿Cuál es la capital de Alemania?",
    "¿Capital de España?",
    "¿Quién ganó el mundial de fútbol?",
    "¿Cómo preparar una paella valenciana?",
    "¿Qué tiempo hará mañana en Madrid?",
    "¿Cuántos habitantes tiene Francia?",
    "¿Cómo aprender a programar en Python?",
    "¿Qué es la fotosíntesis?",
    "¿Quién escribió Don Quijote?",
    "¿Cuál es el río más largo del mundo?",
    "¿Qué antibiótico tomar para el dolor de muelas?",
];

#[derive(Error, Debug)]
pub enum DatasetError {
    #[error("Failed to read dataset: {0}")]
    Io(#[from] std::io::Error),
    #[error("Missing column '{0}' in CSV header")]
    MissingColumn(String),
    #[error("Invalid label '{value}' on record {record}")]
    InvalidLabel { record: usize, value: String },
    #[error("Malformed CSV: {0}")]
    Malformed(String),
    #[error("Dataset contains no examples")]
    Empty,
}

/// Where a training set came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatasetSource {
    Csv(String),
    Reference,
}

impl DatasetSource {
    pub fn describe(&self) -> String {
        match self {
            DatasetSource::Csv(path) => format!("CSV {}", path),
            DatasetSource::Reference => "built-in reference set".to_string(),
        }
    }
}

/// Small labelled reference set used when no CSV is available.
pub fn reference_examples() -> Vec<LabeledExample> {
    REFERENCE_DOMAIN
        .iter()
        .map(|q| LabeledExample::new(*q, true))
        .chain(REFERENCE_NON_DOMAIN.iter().map(|q| LabeledExample::new(*q, false)))
        .collect()
}

pub fn class_distribution(examples: &[LabeledExample]) -> ClassDistribution {
    let domain = examples.iter().filter(|e| e.is_domain).count();
    ClassDistribution {
        non_domain: examples.len() - domain,
        domain,
    }
}

/// Split CSV content into records (RFC 4180 quoting, CRLF or LF line ends).
fn parse_records(content: &str) -> Result<Vec<Vec<String>>, DatasetError> {
    let mut records = Vec::new();
    let mut record: Vec<String> = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut field_started = false;
    let mut chars = content.trim_start_matches('\u{feff}').chars().peekable();

    while let Some(c) = chars.next() {
        if in_quotes {
            match c {
                '"' if chars.peek() == Some(&'"') => {
                    field.push('"');
                    chars.next();
                }
                '"' => in_quotes = false,
                _ => field.push(c),
            }
            continue;
        }

        match c {
            '"' if !field_started => {
                in_quotes = true;
                field_started = true;
            }
            ',' => {
                record.push(std::mem::take(&mut field));
                field_started = false;
            }
            '\r' if chars.peek() == Some(&'\n') => {}
            '\n' | '\r' => {
                record.push(std::mem::take(&mut field));
                field_started = false;
                if !(record.len() == 1 && record[0].trim().is_empty()) {
                    records.push(std::mem::take(&mut record));
                } else {
                    record.clear();
                }
            }
            _ => {
                field.push(c);
                field_started = true;
            }
        }
    }

    if in_quotes {
        return Err(DatasetError::Malformed("unterminated quoted field".to_string()));
    }
    if field_started || !record.is_empty() {
        record.push(field);
        records.push(record);
    }
    Ok(records)
}

fn parse_label(value: &str, record: usize) -> Result<bool, DatasetError> {
    match value.trim().to_lowercase().as_str() {
        "1" | "1.0" | "true" => Ok(true),
        "0" | "0.0" | "false" => Ok(false),
        _ => Err(DatasetError::InvalidLabel {
            record,
            value: value.to_string(),
        }),
    }
}

/// Parse CSV text with `pregunta` and `es_anatomia_dental` columns.
pub fn parse_csv(content: &str) -> Result<Vec<LabeledExample>, DatasetError> {
    let mut records = parse_records(content)?.into_iter();
    let header = records.next().ok_or(DatasetError::Empty)?;
    let column = |name: &str| {
        header
            .iter()
            .position(|h| h.trim().eq_ignore_ascii_case(name))
            .ok_or_else(|| DatasetError::MissingColumn(name.to_string()))
    };
    let question_idx = column(QUESTION_COLUMN)?;
    let label_idx = column(LABEL_COLUMN)?;

    let mut examples = Vec::new();
    for (i, record) in records.enumerate() {
        let number = i + 1;
        let question = record.get(question_idx).map(|q| q.trim()).unwrap_or("");
        if question.is_empty() {
            warn!("[dataset] Skipping record {} without question text", number);
            continue;
        }
        let label = record
            .get(label_idx)
            .ok_or_else(|| DatasetError::Malformed(format!("record {} has no label column", number)))?;
        examples.push(LabeledExample::new(question, parse_label(label, number)?));
    }

    if examples.is_empty() {
        return Err(DatasetError::Empty);
    }
    Ok(examples)
}

pub fn load_csv(path: &Path) -> Result<Vec<LabeledExample>, DatasetError> {
    let content = fs::read_to_string(path)?;
    let examples = parse_csv(&content)?;
    let dist = class_distribution(&examples);
    info!(
        "[dataset] Loaded {} questions from {} ({} domain, {} non-domain)",
        examples.len(),
        path.display(),
        dist.domain,
        dist.non_domain
    );
    Ok(examples)
}

/// CSV when it exists and parses; the reference set otherwise.
pub fn load_or_reference(path: Option<&Path>) -> (Vec<LabeledExample>, DatasetSource) {
    if let Some(path) = path {
        if !path.exists() {
            warn!("[dataset] CSV not found: {}; using reference examples", path.display());
        } else {
            match load_csv(path) {
                Ok(examples) => return (examples, DatasetSource::Csv(path.display().to_string())),
                Err(e) => warn!("[dataset] {}; using reference examples", e),
            }
        }
    }
    (reference_examples(), DatasetSource::Reference)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reference_set_is_balanced() {
        let examples = reference_examples();
        let dist = class_distribution(&examples);
        assert_eq!(dist.domain, REFERENCE_DOMAIN.len());
        assert_eq!(dist.non_domain, REFERENCE_NON_DOMAIN.len());
        assert!(examples.iter().any(|e| e.text == "¿Capital de Francia?" && !e.is_domain));
    }

    #[test]
    fn test_parse_simple_csv() {
        let csv = "pregunta,es_anatomia_dental\n¿Qué es un molar?,1\n¿Capital de Francia?,0\n";
        let examples = parse_csv(csv).unwrap();
        assert_eq!(examples.len(), 2);
        assert!(examples[0].is_domain);
        assert_eq!(examples[1].text, "¿Capital de Francia?");
    }

    #[test]
    fn test_parse_quoted_fields() {
        let csv = "id,pregunta,es_anatomia_dental\r\n\
                   1,\"¿Diferencias entre incisivo central, lateral?\",True\r\n\
                   2,\"Ella dijo \"\"hola\"\"\",false\r\n\
                   3,\"línea uno\nlínea dos\",1\r\n";
        let examples = parse_csv(csv).unwrap();
        assert_eq!(examples.len(), 3);
        assert_eq!(examples[0].text, "¿Diferencias entre incisivo central, lateral?");
        assert!(examples[0].is_domain);
        assert_eq!(examples[1].text, "Ella dijo \"hola\"");
        assert!(!examples[1].is_domain);
        assert_eq!(examples[2].text, "línea uno\nlínea dos");
    }

    #[test]
    fn test_header_with_bom_and_blank_lines() {
        let csv = "\u{feff}pregunta,es_anatomia_dental\n\n¿Qué es un diente?,1\n\n";
        let examples = parse_csv(csv).unwrap();
        assert_eq!(examples.len(), 1);
    }

    #[test]
    fn test_missing_column_and_bad_label() {
        assert!(matches!(
            parse_csv("texto,etiqueta\nhola,1\n"),
            Err(DatasetError::MissingColumn(_))
        ));
        assert!(matches!(
            parse_csv("pregunta,es_anatomia_dental\nhola,quizás\n"),
            Err(DatasetError::InvalidLabel { record: 1, .. })
        ));
        assert!(matches!(
            parse_csv("pregunta,es_anatomia_dental\n\"sin cerrar,1\n"),
            Err(DatasetError::Malformed(_))
        ));
        assert!(matches!(parse_csv(""), Err(DatasetError::Empty)));
    }

    #[test]
    fn test_missing_file_falls_back_to_reference() {
        let dir = tempfile::tempdir().unwrap();
        let (examples, source) = load_or_reference(Some(&dir.path().join("nope.csv")));
        assert_eq!(source, DatasetSource::Reference);
        assert_eq!(examples.len(), reference_examples().len());
    }

    #[test]
    fn test_load_csv_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("preguntas.csv");
        fs::write(&path, "pregunta,es_anatomia_dental\n¿Qué es un canino?,1\n¿Qué es la diabetes?,0\n").unwrap();
        let (examples, source) = load_or_reference(Some(&path));
        assert!(matches!(source, DatasetSource::Csv(_)));
        assert_eq!(examples.len(), 2);
    }
}
