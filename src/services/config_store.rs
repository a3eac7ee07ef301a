// Configuration Storage Service
// Handles config file read/write and version backup

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::services::detection::{ArbiterThresholds, ClassifierConfig};

pub const CONFIG_DIR_ENV: &str = "DENTALBOT_CONFIG_DIR";
pub const RESOURCES_DIR_ENV: &str = "DENTALBOT_RESOURCES_DIR";

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct AppConfig {
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default)]
    pub classifier: ClassifierConfig,
    #[serde(default)]
    pub arbiter: ArbiterThresholds,
    #[serde(default)]
    pub resources: ResourcesConfig,
    #[serde(default)]
    pub generator: GeneratorConfig,
    #[serde(default)]
    pub paths: PathsConfig,
    pub proxy: Option<ProxyConfig>,
    #[serde(default)]
    pub api_keys: HashMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ProxyConfig {
    pub enabled: bool,
    pub http: Option<String>,
    pub https: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ResourcesConfig {
    /// NLTK-style data directory holding `corpora/stopwords/spanish`.
    pub nltk_data_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratorConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_model")]
    pub model: String,
    pub base_url: Option<String>,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: i32,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            provider: default_provider(),
            model: default_model(),
            base_url: None,
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct PathsConfig {
    pub model_dir: Option<PathBuf>,
    pub dataset_csv: Option<PathBuf>,
    pub report_file: Option<PathBuf>,
}

fn default_version() -> String { "1.0.0".to_string() }
fn default_true() -> bool { true }
fn default_provider() -> String { "groq".to_string() }
fn default_model() -> String { "llama-3.3-70b-versatile".to_string() }
fn default_temperature() -> f64 { 0.7 }
fn default_max_tokens() -> i32 { 300 }

impl AppConfig {
    /// Stopword resources directory: env override, then config, then `~/nltk_data`.
    pub fn resources_dir(&self) -> Option<PathBuf> {
        match std::env::var(RESOURCES_DIR_ENV) {
            Ok(p) if !p.trim().is_empty() => Some(PathBuf::from(p)),
            _ => self
                .resources
                .nltk_data_dir
                .clone()
                .or_else(|| dirs::home_dir().map(|h| h.join("nltk_data"))),
        }
    }

    pub fn model_dir(&self) -> PathBuf {
        self.paths
            .model_dir
            .clone()
            .or_else(|| ConfigStore::default_config_dir().map(|d| d.join("models")))
            .unwrap_or_else(|| PathBuf::from("modelos"))
    }

    pub fn dataset_csv(&self) -> PathBuf {
        self.paths
            .dataset_csv
            .clone()
            .unwrap_or_else(|| PathBuf::from("datos").join("preguntas_dentales.csv"))
    }

    pub fn report_file(&self) -> PathBuf {
        self.paths
            .report_file
            .clone()
            .unwrap_or_else(|| PathBuf::from("resultados").join("metricas_evaluacion.txt"))
    }
}

pub struct ConfigStore {
    config_dir: PathBuf,
    config_file: PathBuf,
}

impl ConfigStore {
    pub fn new(config_dir: PathBuf) -> Self {
        let config_file = config_dir.join("config.json");
        Self { config_dir, config_file }
    }

    /// Get default config directory
    pub fn default_config_dir() -> Option<PathBuf> {
        match std::env::var(CONFIG_DIR_ENV) {
            Ok(p) if !p.trim().is_empty() => Some(PathBuf::from(p)),
            _ => dirs::config_dir().map(|p| p.join("dentalBot")),
        }
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    /// Ensure config directory exists
    pub fn ensure_dir(&self) -> Result<(), String> {
        fs::create_dir_all(&self.config_dir)
            .map_err(|e| format!("Failed to create config dir: {}", e))
    }

    /// Load configuration from file
    pub fn load(&self) -> Result<AppConfig, String> {
        if !self.config_file.exists() {
            return Ok(AppConfig {
                version: default_version(),
                ..AppConfig::default()
            });
        }

        let content = fs::read_to_string(&self.config_file)
            .map_err(|e| format!("Failed to read config: {}", e))?;

        serde_json::from_str(&content)
            .map_err(|e| format!("Failed to parse config: {}", e))
    }

    /// Save configuration to file
    pub fn save(&self, config: &AppConfig) -> Result<(), String> {
        self.ensure_dir()?;

        // Create backup if file exists
        if self.config_file.exists() {
            self.create_backup()?;
        }

        let content = serde_json::to_string_pretty(config)
            .map_err(|e| format!("Failed to serialize config: {}", e))?;

        fs::write(&self.config_file, content)
            .map_err(|e| format!("Failed to write config: {}", e))
    }

    /// Create a backup of current config
    fn create_backup(&self) -> Result<(), String> {
        let backup_dir = self.config_dir.join("backups");
        fs::create_dir_all(&backup_dir)
            .map_err(|e| format!("Failed to create backup dir: {}", e))?;

        let timestamp = chrono::Utc::now().format("%Y%m%d_%H%M%S%.3f");
        let backup_file = backup_dir.join(format!("config_{}.json", timestamp));

        fs::copy(&self.config_file, &backup_file)
            .map_err(|e| format!("Failed to create backup: {}", e))?;

        cleanup_old_backups(&backup_dir, "json", 10)
    }

    /// Get provider API key from config file
    pub fn get_api_key(&self, provider: &str) -> Result<Option<String>, String> {
        let config = self.load()?;
        Ok(config.api_keys.get(provider).cloned())
    }

    /// Store provider API key in config file
    pub fn set_api_key(&self, provider: &str, key: &str) -> Result<(), String> {
        let mut config = self.load()?;
        config.api_keys.insert(provider.to_string(), key.to_string());
        self.save(&config)
    }
}

/// Remove old backups with the given extension, keeping only the most recent N
pub fn cleanup_old_backups(backup_dir: &Path, extension: &str, keep: usize) -> Result<(), String> {
    let mut entries: Vec<_> = fs::read_dir(backup_dir)
        .map_err(|e| format!("Failed to read backup dir: {}", e))?
        .filter_map(|e| e.ok())
        .filter(|e| e.path().extension().map_or(false, |ext| ext == extension))
        .collect();

    if entries.len() <= keep {
        return Ok(());
    }

    // Oldest first; names carry the timestamp, so they break mtime ties
    entries.sort_by_key(|e| {
        (
            e.metadata()
                .and_then(|m| m.modified())
                .unwrap_or(std::time::SystemTime::UNIX_EPOCH),
            e.file_name(),
        )
    });

    for entry in entries.iter().take(entries.len() - keep) {
        let _ = fs::remove_file(entry.path());
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.classifier.tree_count, 300);
        assert_eq!(config.arbiter.domain_probability_floor, 0.55);
        assert_eq!(config.arbiter.high_confidence_threshold, 0.8);
        assert_eq!(config.arbiter.medium_confidence_threshold, 0.6);
        assert_eq!(config.generator.model, "llama-3.3-70b-versatile");
        assert_eq!(config.generator.max_tokens, 300);
    }

    #[test]
    fn test_default_paths() {
        let mut config = AppConfig::default();
        assert_eq!(config.dataset_csv(), PathBuf::from("datos").join("preguntas_dentales.csv"));
        assert_eq!(config.report_file(), PathBuf::from("resultados").join("metricas_evaluacion.txt"));
        config.paths.dataset_csv = Some(PathBuf::from("/tmp/otro.csv"));
        assert_eq!(config.dataset_csv(), PathBuf::from("/tmp/otro.csv"));
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let parsed: AppConfig =
            serde_json::from_str(r#"{"classifier": {"treeCount": 50}, "generator": {"enabled": false}}"#).unwrap();
        assert_eq!(parsed.version, "1.0.0");
        assert_eq!(parsed.classifier.tree_count, 50);
        assert_eq!(parsed.classifier.ngram_range, (1, 2));
        assert!(!parsed.generator.enabled);
        assert_eq!(parsed.generator.provider, "groq");
        assert_eq!(parsed.arbiter.domain_probability_floor, 0.55);
    }

    #[test]
    fn test_config_serialization() {
        let config = AppConfig {
            version: "1.0.0".to_string(),
            ..AppConfig::default()
        };

        let json = serde_json::to_string(&config).unwrap();
        assert!(json.contains("\"domainProbabilityFloor\""));
        let parsed: AppConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.version, "1.0.0");
        assert_eq!(parsed.classifier, config.classifier);
    }

    #[test]
    fn test_save_load_and_backup() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::new(dir.path().to_path_buf());
        assert_eq!(store.load().unwrap().classifier.tree_count, 300);

        store.set_api_key("groq", "gsk_test").unwrap();
        store.set_api_key("groq", "gsk_other").unwrap();
        assert_eq!(store.get_api_key("groq").unwrap().as_deref(), Some("gsk_other"));

        let backups = fs::read_dir(dir.path().join("backups")).unwrap().count();
        assert_eq!(backups, 1);
    }

    #[test]
    fn test_cleanup_keeps_newest() {
        let dir = tempfile::tempdir().unwrap();
        for i in 0..4 {
            fs::write(dir.path().join(format!("model_{}.json", i)), "{}").unwrap();
        }
        fs::write(dir.path().join("notes.txt"), "x").unwrap();
        cleanup_old_backups(dir.path(), "json", 2).unwrap();
        let remaining = fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(remaining, 3);
    }
}
