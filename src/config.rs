use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::detection::AnalyzerSettings;
use crate::detection::contours::RegionParams;
use crate::detection::ocr::default_model_dir;

/// Service configuration: TOML file first, then environment overrides
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub ela: ElaConfig,
    pub ocr: OcrConfig,
    pub copilot: CopilotConfig,
    pub auth: AuthConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub max_upload_bytes: usize,
    pub max_batch_files: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            max_upload_bytes: 20 * 1024 * 1024,
            max_batch_files: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub database_url: String,
    pub upload_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite:///./fraud_detection.db".to_string(),
            upload_dir: PathBuf::from("uploads"),
        }
    }
}

impl StorageConfig {
    /// Filesystem path of the SQLite database named by `database_url`
    pub fn database_path(&self) -> Result<PathBuf> {
        sqlite_path(&self.database_url)
    }
}

/// Accepts `sqlite:///rel/or/abs`, `sqlite://path`, `sqlite:path` or a bare path
pub fn sqlite_path(url: &str) -> Result<PathBuf> {
    if let Some(rest) = url.strip_prefix("sqlite:") {
        let path = rest.strip_prefix("///").or_else(|| rest.strip_prefix("//")).unwrap_or(rest);
        if path.is_empty() {
            anyhow::bail!("Database URL has no path: {}", url);
        }
        return Ok(PathBuf::from(path));
    }

    if url.contains("://") {
        anyhow::bail!("Only SQLite databases are supported, got: {}", url);
    }
    Ok(PathBuf::from(url))
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ElaConfig {
    pub quality: u8,
    pub fraud_threshold: f64,
    pub region_threshold: u8,
    pub region_blur_sigma: f32,
    pub region_min_area: u32,
}

impl Default for ElaConfig {
    fn default() -> Self {
        let defaults = AnalyzerSettings::default();
        Self {
            quality: defaults.jpeg_quality,
            fraud_threshold: defaults.fraud_threshold,
            region_threshold: defaults.regions.threshold,
            region_blur_sigma: defaults.regions.blur_sigma,
            region_min_area: defaults.regions.min_area,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OcrConfig {
    pub enabled: bool,
    pub model_dir: PathBuf,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            model_dir: default_model_dir(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CopilotConfig {
    pub policy_doc: PathBuf,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub top_k: usize,
}

impl Default for CopilotConfig {
    fn default() -> Self {
        Self {
            policy_doc: PathBuf::from("data/KYC_Policy_Rulebook_Dummy.txt"),
            chunk_size: 1000,
            chunk_overlap: 100,
            top_k: 3,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub require_api_key: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

impl Config {
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).context("Invalid configuration file")
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_toml_str(&content)
    }

    /// File (explicit path, else `DOCFRAUD_CONFIG`, else defaults), then
    /// environment overrides, then validation
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let env_path = std::env::var_os("DOCFRAUD_CONFIG").map(PathBuf::from);
        let mut config = match path.map(Path::to_path_buf).or(env_path) {
            Some(path) => Self::from_file(&path)?,
            None => Self::default(),
        };

        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from a variable lookup (the process environment in production)
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup("DOCFRAUD_HOST") {
            self.server.host = host;
        }
        if let Some(port) = lookup("DOCFRAUD_PORT") {
            self.server.port = port
                .parse()
                .with_context(|| format!("DOCFRAUD_PORT is not a valid port: {}", port))?;
        }
        if let Some(url) = lookup("DATABASE_URL") {
            self.storage.database_url = url;
        }
        if let Some(dir) = lookup("DOCFRAUD_UPLOAD_DIR") {
            self.storage.upload_dir = PathBuf::from(dir);
        }
        if let Some(dir) = lookup("DOCFRAUD_OCR_MODEL_DIR") {
            self.ocr.model_dir = PathBuf::from(dir);
        }
        if let Some(doc) = lookup("DOCFRAUD_POLICY_DOC") {
            self.copilot.policy_doc = PathBuf::from(doc);
        }
        if let Some(flag) = lookup("DOCFRAUD_REQUIRE_API_KEY") {
            self.auth.require_api_key = matches!(flag.to_lowercase().as_str(), "1" | "true" | "yes" | "on");
        }
        if let Some(level) = lookup("RUST_LOG") {
            self.logging.level = level;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if !(1..=100).contains(&self.ela.quality) {
            anyhow::bail!("ela.quality must be between 1 and 100, got {}", self.ela.quality);
        }
        if self.server.port == 0 {
            anyhow::bail!("server.port must not be 0");
        }
        if self.server.max_batch_files < 2 {
            anyhow::bail!("server.max_batch_files must allow at least 2 documents");
        }
        if self.copilot.chunk_size == 0 || self.copilot.chunk_overlap >= self.copilot.chunk_size {
            anyhow::bail!(
                "copilot.chunk_overlap ({}) must be smaller than copilot.chunk_size ({})",
                self.copilot.chunk_overlap,
                self.copilot.chunk_size
            );
        }
        if self.copilot.top_k == 0 {
            anyhow::bail!("copilot.top_k must be at least 1");
        }
        self.storage.database_path()?;
        Ok(())
    }

    pub fn analyzer_settings(&self) -> AnalyzerSettings {
        AnalyzerSettings {
            jpeg_quality: self.ela.quality,
            fraud_threshold: self.ela.fraud_threshold,
            regions: RegionParams {
                threshold: self.ela.region_threshold,
                blur_sigma: self.ela.region_blur_sigma,
                min_area: self.ela.region_min_area,
            },
        }
    }
}
