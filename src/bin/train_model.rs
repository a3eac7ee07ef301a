use anyhow::Context;
use dental_bot_lib::console;
use dental_bot_lib::services::{DentalBot, GroqAnswerGenerator, TrainingControl};
use std::path::PathBuf;

const SAMPLE_QUESTION: &str = "¿Cuáles son las características del incisivo central superior?";

fn parse_arg_value(args: &[String], key: &str) -> Option<String> {
    args.iter()
        .position(|a| a == key)
        .and_then(|i| args.get(i + 1))
        .cloned()
}

fn has_flag(args: &[String], key: &str) -> bool {
    args.iter().any(|a| a == key)
}

fn banner(title: &str) {
    println!("\n{}\n{}\n{}", "=".repeat(70), title, "=".repeat(70));
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args: Vec<String> = std::env::args().collect();
    if has_flag(&args, "--help") || has_flag(&args, "-h") {
        eprintln!(
            "Usage:\n  cargo run --bin train_model -- [--csv <path>] [--model <path>] [--report <path>] [--timeout <secs>] [--no-answer]\n\nNotes:\n  - Without a readable CSV the built-in reference questions are used.\n  - `--no-answer` classifies the sample question without calling the answer generator."
        );
        return Ok(());
    }

    dental_bot_lib::init_logging();

    let bot = DentalBot::from_config_store();
    let csv = parse_arg_value(&args, "--csv")
        .map(PathBuf::from)
        .unwrap_or_else(|| bot.config().dataset_csv());
    let model_path = parse_arg_value(&args, "--model")
        .map(PathBuf::from)
        .unwrap_or_else(|| bot.default_model_path());
    let report_path = parse_arg_value(&args, "--report")
        .map(PathBuf::from)
        .unwrap_or_else(|| bot.config().report_file());
    let control = match console::parse_timeout(parse_arg_value(&args, "--timeout").as_deref())? {
        Some(timeout) => TrainingControl::with_timeout(timeout),
        None => TrainingControl::new(),
    };
    let no_answer = has_flag(&args, "--no-answer");

    banner("DENTALBOT - ENTRENAMIENTO DEL MODELO");
    println!("Datos: {}", csv.display());
    println!("Configuración: {}", bot.config().classifier.summary());

    let (outcome, source) = tokio::task::block_in_place(|| bot.train_default(Some(&csv), &control))
        .context("training failed")?;
    println!("Fuente de datos: {}", source.describe());

    let report = &outcome.report;
    println!("\n{}", console::render_report(report));
    console::write_report(report, &report_path)
        .with_context(|| format!("failed to write report to {}", report_path.display()))?;
    println!("Métricas guardadas en: {}", report_path.display());

    bot.save_model(&model_path)
        .with_context(|| format!("failed to save model to {}", model_path.display()))?;
    println!("Modelo guardado en: {}", model_path.display());

    banner("TOP 5 CARACTERISTICAS MAS IMPORTANTES");
    for (i, feature) in outcome.model.top_features(5).iter().enumerate() {
        println!("   {}. {:<20} -> {:.4}", i + 1, feature.term, feature.weight);
    }

    banner("PROBANDO EL MODELO");
    println!("Pregunta de prueba: '{}'", SAMPLE_QUESTION);
    if no_answer {
        let verdict = bot.classify(SAMPLE_QUESTION)?;
        print!("\n{}", console::render_verdict(&verdict));
    } else {
        let generator = GroqAnswerGenerator::from_config(bot.config());
        let response = bot.ask(SAMPLE_QUESTION, &generator).await?;
        print!("\n{}", console::render_verdict(&response.verdict));
        println!("{}", "-".repeat(70));
        println!("Respuesta generada:\n{}", response.answer);
    }

    banner("ENTRENAMIENTO COMPLETADO");
    Ok(())
}
