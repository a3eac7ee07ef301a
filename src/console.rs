// Console Front End
// Text rendering of reports and verdicts, and the interactive command parser

use std::fmt::Write as _;
use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::Context;

use crate::models::{BotStatistics, ClassMetrics, EvaluationReport, TermCounts, Verdict};

const RULE_WIDTH: usize = 70;
const NON_DOMAIN_LABEL: &str = "No Dental";
const DOMAIN_LABEL: &str = "Anatomía Dental";

fn heavy_rule() -> String {
    "=".repeat(RULE_WIDTH)
}

fn light_rule() -> String {
    "-".repeat(RULE_WIDTH)
}

fn percent(value: f64) -> String {
    format!("{:.2}%", value * 100.0)
}

fn share(count: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        count as f64 / total as f64 * 100.0
    }
}

// ============ Commands ============

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Quit,
    Statistics,
    SelfTest,
    ListTerms,
    AddTerm(String),
    Empty,
    Question(String),
}

pub fn parse_command(line: &str) -> Command {
    let trimmed = line.trim();
    let lower = trimmed.to_lowercase();
    match lower.as_str() {
        "" => Command::Empty,
        "salir" | "exit" | "quit" => Command::Quit,
        "estadisticas" | "estadísticas" => Command::Statistics,
        "pruebas" => Command::SelfTest,
        "terminos" | "términos" => Command::ListTerms,
        _ => match lower.strip_prefix("agregar ") {
            // Byte offsets match: the keyword is ASCII
            Some(_) => Command::AddTerm(trimmed["agregar ".len()..].trim().to_string()),
            None => Command::Question(trimmed.to_string()),
        },
    }
}

pub fn help_text() -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Comandos disponibles:");
    let _ = writeln!(out, "   - Escribe tu pregunta sobre anatomía dental");
    let _ = writeln!(out, "   - 'estadisticas' para ver info del modelo");
    let _ = writeln!(out, "   - 'pruebas' para ejecutar casos de prueba");
    let _ = writeln!(out, "   - 'terminos' para listar los términos dentales");
    let _ = writeln!(out, "   - 'agregar <término>' para añadir un término dental");
    let _ = write!(out, "   - 'salir' para terminar");
    out
}

/// `--timeout <secs>` value; absent means no deadline.
pub fn parse_timeout(value: Option<&str>) -> anyhow::Result<Option<Duration>> {
    value
        .map(|s| {
            s.trim()
                .parse::<u64>()
                .map(Duration::from_secs)
                .with_context(|| format!("invalid --timeout value '{}': expected whole seconds", s))
        })
        .transpose()
}

// ============ Evaluation Report ============

fn class_block(out: &mut String, label: &str, metrics: &ClassMetrics) {
    let _ = writeln!(out, "\n   CLASE: {}", label);
    let _ = writeln!(out, "   Precision: {:.4} ({})", metrics.precision, percent(metrics.precision));
    let _ = writeln!(out, "   Recall:    {:.4} ({})", metrics.recall, percent(metrics.recall));
    let _ = writeln!(out, "   F1-Score:  {:.4} ({})", metrics.f1_score, percent(metrics.f1_score));
    let _ = writeln!(out, "   Soporte:   {} muestras", metrics.support);
}

/// Plain-text evaluation report, as written to the metrics file.
pub fn render_report(report: &EvaluationReport) -> String {
    let mut out = String::new();
    let cm = report.confusion.as_rows();

    let _ = writeln!(out, "{}", heavy_rule());
    let _ = writeln!(out, "{:^width$}", "REPORTE DE EVALUACIÓN DEL MODELO", width = RULE_WIDTH);
    let _ = writeln!(out, "{}", heavy_rule());
    let _ = writeln!(
        out,
        "\n   Entrenamiento: {} muestras | Evaluación: {} muestras",
        report.train_size, report.test_size
    );

    let _ = writeln!(out, "\nPRECISIÓN GENERAL (ACCURACY)");
    let _ = writeln!(out, "{}", light_rule());
    let _ = writeln!(out, "   Accuracy: {:.4} ({})", report.accuracy, percent(report.accuracy));

    let _ = writeln!(out, "\nMATRIZ DE CONFUSIÓN");
    let _ = writeln!(out, "{}", light_rule());
    let _ = writeln!(out, "\n                    Predicho");
    let _ = writeln!(out, "                 {}  |  {}", NON_DOMAIN_LABEL, DOMAIN_LABEL);
    let _ = writeln!(out, "              {}", "-".repeat(35));
    let _ = writeln!(out, "   Real       |");
    let _ = writeln!(out, "   No Dental      {:^6}    |    {:^6}", cm[0][0], cm[0][1]);
    let _ = writeln!(out, "   Anatomía Dental {:^6}    |    {:^6}", cm[1][0], cm[1][1]);
    let _ = writeln!(out, "\n   Interpretación:");
    let _ = writeln!(out, "   - Verdaderos Negativos (VN): {}", cm[0][0]);
    let _ = writeln!(out, "   - Falsos Positivos (FP):     {}", cm[0][1]);
    let _ = writeln!(out, "   - Falsos Negativos (FN):     {}", cm[1][0]);
    let _ = writeln!(out, "   - Verdaderos Positivos (VP): {}", cm[1][1]);

    let _ = writeln!(out, "\nMÉTRICAS DETALLADAS POR CLASE");
    let _ = writeln!(out, "{}", light_rule());
    class_block(&mut out, NON_DOMAIN_LABEL, &report.non_domain);
    class_block(&mut out, DOMAIN_LABEL, &report.domain);

    let _ = writeln!(out, "\nPROMEDIOS");
    let _ = writeln!(out, "{}", light_rule());
    let _ = writeln!(out, "   Macro avg Precision:    {:.4}", report.macro_avg.precision);
    let _ = writeln!(out, "   Macro avg Recall:       {:.4}", report.macro_avg.recall);
    let _ = writeln!(out, "   Macro avg F1-Score:     {:.4}", report.macro_avg.f1_score);
    let _ = writeln!(out, "   Weighted avg Precision: {:.4}", report.weighted_avg.precision);
    let _ = writeln!(out, "   Weighted avg Recall:    {:.4}", report.weighted_avg.recall);
    let _ = writeln!(out, "   Weighted avg F1-Score:  {:.4}", report.weighted_avg.f1_score);

    if !report.top_features.is_empty() {
        let _ = writeln!(out, "\nTOP {} CARACTERÍSTICAS MÁS IMPORTANTES", report.top_features.len());
        let _ = writeln!(out, "{}", light_rule());
        for (i, feature) in report.top_features.iter().enumerate() {
            let _ = writeln!(out, "   {:2}. {:<20} {:.6}", i + 1, feature.term, feature.weight);
        }
    }

    let total = report.test_size;
    let _ = writeln!(out, "\nESTADÍSTICAS ADICIONALES");
    let _ = writeln!(out, "{}", light_rule());
    let _ = writeln!(out, "   Tasa de Error: {:.4} ({})", report.error_rate, percent(report.error_rate));
    let _ = writeln!(out, "\n   Distribución de Predicciones:");
    let _ = writeln!(
        out,
        "   - No Dental:        {:3} ({:.1}%)",
        report.predicted.non_domain,
        share(report.predicted.non_domain, total)
    );
    let _ = writeln!(
        out,
        "   - Anatomía Dental:  {:3} ({:.1}%)",
        report.predicted.domain,
        share(report.predicted.domain, total)
    );
    let _ = writeln!(out, "\n   Distribución Real:");
    let _ = writeln!(
        out,
        "   - No Dental:        {:3} ({:.1}%)",
        report.actual.non_domain,
        share(report.actual.non_domain, total)
    );
    let _ = writeln!(
        out,
        "   - Anatomía Dental:  {:3} ({:.1}%)",
        report.actual.domain,
        share(report.actual.domain, total)
    );

    let _ = write!(out, "\n{}\n", heavy_rule());
    out
}

pub fn write_report(report: &EvaluationReport, path: &Path) -> std::io::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, render_report(report))
}

// ============ Verdicts & Statistics ============

fn yes_no(is_domain: bool) -> &'static str {
    if is_domain {
        "✓ DENTAL"
    } else {
        "✗ NO DENTAL"
    }
}

pub fn render_verdict(verdict: &Verdict) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{}", heavy_rule());
    let _ = writeln!(out, "RESULTADO DE CLASIFICACIÓN");
    let _ = writeln!(out, "{}", heavy_rule());
    let _ = writeln!(
        out,
        "Es anatomía dental: {}",
        if verdict.is_domain { "✓ SÍ" } else { "✗ NO" }
    );
    let _ = writeln!(out, "Probabilidad: {:.1}%", verdict.probability * 100.0);
    let _ = writeln!(out, "Confianza: {}", verdict.confidence.label_es());
    let _ = writeln!(out, "Método usado: {}", verdict.method.as_str());

    if let (Some(lexical), Some(statistical)) = (&verdict.evidence.lexical, &verdict.evidence.statistical) {
        let _ = writeln!(out, "\nANÁLISIS DETALLADO:");
        let _ = writeln!(out, "   Detector de Términos: {}", yes_no(lexical.is_domain));
        let _ = writeln!(out, "   Modelo ML:            {}", yes_no(statistical.is_domain));
        let _ = writeln!(out, "   Probabilidad ML:      {:.1}%", statistical.probability * 100.0);
    }

    if !verdict.evidence.matched_terms.is_empty() {
        let _ = writeln!(out, "\nTérminos detectados:");
        for term in &verdict.evidence.matched_terms {
            let _ = writeln!(out, "   • {}", term);
        }
    }

    if !verdict.evidence.rationale.is_empty() {
        let _ = writeln!(out, "\nRazón: {}", verdict.evidence.rationale);
    }
    out
}

/// One `pruebas` line block: `[i/n] Probando: '...'` plus the outcome.
pub fn render_self_test_case(index: usize, total: usize, question: &str, verdict: &Verdict) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "[{}/{}] Probando: '{}'", index, total, question);
    let _ = writeln!(out, "   ➜ Resultado: {}", yes_no(verdict.is_domain));
    let _ = writeln!(out, "   ➜ Método: {}", verdict.method.as_str());
    let _ = write!(out, "   ➜ Probabilidad: {:.1}%", verdict.probability * 100.0);
    if !verdict.evidence.matched_terms.is_empty() {
        let terms: Vec<&str> = verdict
            .evidence
            .matched_terms
            .iter()
            .take(3)
            .map(String::as_str)
            .collect();
        let _ = write!(out, "\n   ➜ Términos: {}", terms.join(", "));
    }
    out
}

const TERMS_PER_LINE: usize = 6;

/// Sorted domain dictionary, a few terms per line.
pub fn render_terms(terms: &[String]) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{}", heavy_rule());
    let _ = writeln!(out, "TÉRMINOS DENTALES ({})", terms.len());
    let _ = writeln!(out, "{}", light_rule());
    for chunk in terms.chunks(TERMS_PER_LINE) {
        let _ = writeln!(out, "   {}", chunk.join(", "));
    }
    let _ = write!(out, "{}", heavy_rule());
    out
}

pub fn render_term_counts(counts: &TermCounts) -> String {
    format!(
        "{} términos dentales en diccionario\n{} términos clínicos detectados",
        counts.domain_terms, counts.exclusion_terms
    )
}

pub fn render_statistics(stats: &BotStatistics) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{}", heavy_rule());
    let _ = writeln!(out, "ESTADÍSTICAS DEL SISTEMA");
    let _ = writeln!(out, "{}", heavy_rule());
    let _ = writeln!(out, "Configuración: {}", stats.configuration);
    let _ = writeln!(out, "Modelo entrenado: {}", if stats.trained { "Sí" } else { "No" });
    let _ = writeln!(out, "Términos dentales: {}", stats.term_counts.domain_terms);
    let _ = writeln!(out, "Términos no dentales (clínicos): {}", stats.term_counts.exclusion_terms);
    if !stats.top_features.is_empty() {
        let _ = writeln!(out, "\nTop {} características importantes (ML):", stats.top_features.len());
        for (i, feature) in stats.top_features.iter().enumerate() {
            let _ = writeln!(out, "  {}. {}: {:.4}", i + 1, feature.term, feature.weight);
        }
    }
    let _ = write!(out, "{}", heavy_rule());
    out
}
