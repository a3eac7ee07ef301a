// Model Storage Service
// Persists trained model generations as versioned JSON with rotating backups

use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::services::config_store::cleanup_old_backups;
use crate::services::detection::{DetectionError, TrainedModel};

pub const MODEL_FILE_NAME: &str = "dentalbot_model.json";
const BACKUPS_TO_KEEP: usize = 5;

pub struct ModelStore {
    model_file: PathBuf,
}

impl ModelStore {
    /// Store writing `<dir>/dentalbot_model.json`.
    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        Self {
            model_file: dir.as_ref().join(MODEL_FILE_NAME),
        }
    }

    pub fn at_path(path: impl Into<PathBuf>) -> Self {
        Self {
            model_file: path.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.model_file
    }

    pub fn exists(&self) -> bool {
        self.model_file.is_file()
    }

    fn parent_dir(&self) -> PathBuf {
        self.model_file
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."))
    }

    pub fn load(&self) -> Result<TrainedModel, DetectionError> {
        let bytes = fs::read(&self.model_file)?;
        let model = TrainedModel::deserialize(&bytes)?;
        info!(
            "[model_store] Loaded model from {} ({} features)",
            self.model_file.display(),
            model.vocabulary_size()
        );
        Ok(model)
    }

    /// Write the model, copying the previous file into `backups/` first.
    pub fn save(&self, model: &TrainedModel) -> Result<(), DetectionError> {
        let dir = self.parent_dir();
        fs::create_dir_all(&dir)?;

        if self.exists() {
            if let Err(e) = self.create_backup(&dir) {
                warn!("[model_store] Backup failed: {}", e);
            }
        }

        let bytes = model.serialize()?;
        // Write-then-rename so a crash never leaves a truncated model behind
        let tmp = self.model_file.with_extension("json.tmp");
        fs::write(&tmp, bytes)?;
        fs::rename(&tmp, &self.model_file)?;

        info!("[model_store] Saved model to {}", self.model_file.display());
        Ok(())
    }

    fn create_backup(&self, dir: &Path) -> Result<(), String> {
        let backup_dir = dir.join("backups");
        fs::create_dir_all(&backup_dir)
            .map_err(|e| format!("Failed to create backup dir: {}", e))?;

        let stem = self
            .model_file
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("model");
        let timestamp = chrono::Utc::now().format("%Y%m%d_%H%M%S%.3f");
        let backup_file = backup_dir.join(format!("{}_{}.json", stem, timestamp));

        fs::copy(&self.model_file, &backup_file)
            .map_err(|e| format!("Failed to create backup: {}", e))?;

        cleanup_old_backups(&backup_dir, "json", BACKUPS_TO_KEEP)
    }
}
