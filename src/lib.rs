pub mod models;
pub mod services;
pub mod console;

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Instant;
use anyhow::Context;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::{
    fmt,
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling;

use console::Command;
use services::{DentalBot, GroqAnswerGenerator, TrainingControl};

static PROCESS_START: OnceLock<Instant> = OnceLock::new();
static LOG_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

const LOG_FILE_PREFIX: &str = "dentalBot_";
const LOGS_TO_KEEP: usize = 30;
const STATISTICS_TOP_FEATURES: usize = 5;

fn startup_elapsed_ms() -> u128 {
    PROCESS_START
        .get()
        .map(|t| t.elapsed().as_millis())
        .unwrap_or(0)
}

fn env_flag(name: &str) -> bool {
    matches!(
        std::env::var(name).as_deref(),
        Ok("1") | Ok("true") | Ok("TRUE")
    )
}

/// Initialize logging system with timestamped log files
pub fn init_logging() {
    let disable_file_log = env_flag("DENTALBOT_DISABLE_FILE_LOG");
    let disable_cleanup = env_flag("DENTALBOT_DISABLE_LOG_CLEANUP");

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    if disable_file_log {
        init_console_only_logging(env_filter);
        info!("File logging disabled via DENTALBOT_DISABLE_FILE_LOG");
        return;
    }

    let logs_dir = match std::env::var("DENTALBOT_LOG_DIR") {
        Ok(p) if !p.trim().is_empty() => PathBuf::from(p),
        _ => get_logs_dir(),
    };

    if let Err(e) = fs::create_dir_all(&logs_dir) {
        eprintln!("Failed to create logs directory: {}", e);
        init_console_only_logging(env_filter);
        info!("Falling back to console-only logging (log dir not writable)");
        return;
    }

    let timestamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
    let log_filename = format!("{}{}.log", LOG_FILE_PREFIX, timestamp);

    // One file per session; writes stay off the interactive thread
    let file_appender = rolling::never(&logs_dir, &log_filename);
    let (file_writer, file_guard) = tracing_appender::non_blocking(file_appender);
    let _ = LOG_GUARD.set(file_guard);

    let file_layer = fmt::layer()
        .with_writer(file_writer)
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true);

    #[cfg(debug_assertions)]
    {
        // stderr keeps the interactive prompt on stdout readable
        let console_layer = fmt::layer()
            .with_writer(std::io::stderr)
            .with_ansi(true)
            .with_target(true);

        let _ = tracing_subscriber::registry()
            .with(env_filter)
            .with(file_layer)
            .with(console_layer)
            .try_init();
    }

    #[cfg(not(debug_assertions))]
    {
        let _ = tracing_subscriber::registry()
            .with(env_filter)
            .with(file_layer)
            .try_init();
    }

    info!("=== DentalBot Started ===");
    info!("Log file: {}/{}", logs_dir.display(), log_filename);
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    if !disable_cleanup {
        std::thread::spawn(move || {
            cleanup_old_logs(&logs_dir, LOGS_TO_KEEP);
        });
    }
}

fn get_logs_dir() -> PathBuf {
    #[cfg(debug_assertions)]
    {
        PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("logs")
    }

    #[cfg(not(debug_assertions))]
    {
        if let Some(data_dir) = dirs::data_local_dir() {
            return data_dir.join("dentalBot").join("logs");
        }
        PathBuf::from("logs")
    }
}

fn cleanup_old_logs(logs_dir: &Path, keep: usize) {
    let mut entries: Vec<_> = match fs::read_dir(logs_dir) {
        Ok(rd) => rd.filter_map(|e| e.ok()).collect(),
        Err(_) => return,
    };

    entries.retain(|e| {
        let name = e.file_name().to_string_lossy().to_string();
        name.starts_with(LOG_FILE_PREFIX) && name.ends_with(".log")
    });

    if entries.len() <= keep {
        return;
    }

    entries.sort_by_key(|e| {
        e.metadata()
            .and_then(|m| m.modified())
            .unwrap_or(std::time::SystemTime::UNIX_EPOCH)
    });

    let remove_count = entries.len().saturating_sub(keep);
    for entry in entries.into_iter().take(remove_count) {
        let _ = fs::remove_file(entry.path());
    }
}

fn init_console_only_logging(env_filter: EnvFilter) {
    let console_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(cfg!(debug_assertions))
        .with_target(true);

    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .try_init();
}

/// Load the persisted model, or train one and persist it.
pub fn load_or_train(bot: &DentalBot) -> anyhow::Result<()> {
    let model_path = bot.default_model_path();
    if model_path.exists() {
        println!("\nCargando modelo existente...");
        match bot.load_model(&model_path) {
            Ok(()) => {
                println!("Modelo cargado desde archivo");
                return Ok(());
            }
            Err(e) => {
                warn!("[startup] Failed to load {}: {}", model_path.display(), e);
                println!("Error cargando modelo\n\nEntrenando nuevo modelo...");
            }
        }
    } else {
        println!("\nEntrenando modelo por primera vez...");
    }

    let (outcome, source) = bot
        .train_default(None, &TrainingControl::new())
        .context("training failed")?;
    println!(
        "Modelo entrenado con {} ({} muestras de evaluación, accuracy {:.3})",
        source.describe(),
        outcome.report.test_size,
        outcome.report.accuracy
    );
    if let Err(e) = bot.save_model(&model_path) {
        warn!("[startup] Could not save model: {}", e);
    }
    Ok(())
}

fn run_self_test(bot: &DentalBot) {
    let questions = DentalBot::self_test_questions();
    println!("\n{}\nEJECUTANDO CASOS DE PRUEBA\n{}", "=".repeat(70), "=".repeat(70));
    for (i, question) in questions.iter().enumerate() {
        match bot.classify(question) {
            Ok(verdict) => println!("\n{}", console::render_self_test_case(i + 1, questions.len(), question, &verdict)),
            Err(e) => println!("\n[{}/{}] '{}': Error: {}", i + 1, questions.len(), question, e),
        }
    }
    println!("\n{}", "=".repeat(70));
}

async fn interactive_loop(bot: &DentalBot, generator: &GroqAnswerGenerator) -> anyhow::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    loop {
        stdout.write_all("\n➤ Tu pregunta: ".as_bytes()).await?;
        stdout.flush().await?;

        let Some(line) = lines.next_line().await? else {
            println!("\n¡Hasta luego!");
            return Ok(());
        };

        match console::parse_command(&line) {
            Command::Quit => {
                println!("\n¡Hasta luego!");
                return Ok(());
            }
            Command::Empty => continue,
            Command::Statistics => {
                println!("\n{}", console::render_statistics(&bot.statistics(STATISTICS_TOP_FEATURES)));
            }
            Command::SelfTest => run_self_test(bot),
            Command::ListTerms => println!("\n{}", console::render_terms(&bot.list_domain_terms())),
            Command::AddTerm(term) => match bot.add_domain_term(&term) {
                Ok(true) => println!("Término '{}' agregado", term),
                Ok(false) => println!("El término '{}' ya existe", term),
                Err(e) => println!("✗ Error: {}", e),
            },
            Command::Question(question) => {
                println!("\nAnalizando por favor esperar...");
                match bot.ask(&question, generator).await {
                    Ok(response) => {
                        print!("\n{}", console::render_verdict(&response.verdict));
                        println!("{}", "-".repeat(70));
                        println!("RESPUESTA GENERADA POR IA:");
                        println!("{}", "-".repeat(70));
                        println!("{}", response.answer);
                        println!("{}", "=".repeat(70));
                    }
                    Err(e) => println!("\nError: {}", e),
                }
            }
        }
    }
}

/// Interactive console entry point.
pub fn run() -> anyhow::Result<()> {
    PROCESS_START.get_or_init(Instant::now);

    let logging_t0 = Instant::now();
    init_logging();
    info!(startup_ms = startup_elapsed_ms(), logging_ms = logging_t0.elapsed().as_millis(), "logging.initialized");

    println!("{}", "=".repeat(70));
    println!("{:^70}", "DENTALBOT - SISTEMA CON IA");
    println!("{}", "=".repeat(70));
    println!("\nInicializando sistema...");

    let bot = DentalBot::from_config_store();
    let generator = GroqAnswerGenerator::from_config(bot.config());
    if generator.has_api_key() {
        println!("API key configurada");
    } else {
        println!("API key no configurada: las respuestas indicarán el error");
    }
    if let Some(issue) = &bot.resource_status().issue {
        println!("Recursos lingüísticos por defecto ({})", issue);
    }
    println!("{}", console::render_term_counts(&bot.term_counts()));

    load_or_train(&bot)?;
    info!(startup_ms = startup_elapsed_ms(), "bot.ready");

    println!("\n{}\n{:^70}\n{}", "=".repeat(70), "SISTEMA LISTO", "=".repeat(70));
    println!("{}", console::help_text());
    println!("{}", "=".repeat(70));

    let runtime = tokio::runtime::Runtime::new().context("failed to start async runtime")?;
    runtime.block_on(interactive_loop(&bot, &generator))?;

    info!("=== DentalBot Exited ===");
    Ok(())
}
