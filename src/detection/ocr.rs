use anyhow::{Context, Result};
use image::DynamicImage;
pub use ocrs::{ImageSource, OcrEngine};
use ocrs::{OcrEngineParams, TextItem};
use rten::Model;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

use crate::config::OcrConfig;

use crate::models::TextRegion;

pub const DETECTION_MODEL_FILE: &str = "text-detection.rten";
pub const RECOGNITION_MODEL_FILE: &str = "text-recognition.rten";

/// ocrs does not report a recognition probability, so every line gets this one
pub const RECOGNITION_CONFIDENCE: f32 = 0.9;

/// Something that can read text lines with their positions out of an image
pub trait TextExtractor: Send + Sync {
    fn extract(&self, image: &DynamicImage) -> Result<Vec<TextRegion>>;

    fn name(&self) -> &str;
}

/// Default model location used by `ocrs-cli`
pub fn default_model_dir() -> PathBuf {
    let home = std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .unwrap_or_else(|_| ".".to_string());
    Path::new(&home).join(".cache/ocrs")
}

/// Load the detection and recognition models from `model_dir`
pub fn init_ocr_engine(model_dir: &Path) -> Result<OcrEngine> {
    let detection_model_path = model_dir.join(DETECTION_MODEL_FILE);
    let recognition_model_path = model_dir.join(RECOGNITION_MODEL_FILE);

    if !detection_model_path.exists() || !recognition_model_path.exists() {
        anyhow::bail!(
            "OCR models not found. Please run: ocrs-cli --help (or download models manually)\n\
             Expected locations:\n  - {}\n  - {}",
            detection_model_path.display(),
            recognition_model_path.display()
        );
    }

    let detection_model = Model::load_file(&detection_model_path)
        .with_context(|| format!("Failed to load {}", detection_model_path.display()))?;
    let recognition_model = Model::load_file(&recognition_model_path)
        .with_context(|| format!("Failed to load {}", recognition_model_path.display()))?;

    let engine = OcrEngine::new(OcrEngineParams {
        detection_model: Some(detection_model),
        recognition_model: Some(recognition_model),
        ..Default::default()
    })?;

    Ok(engine)
}

/// Line-level OCR backed by the `ocrs` engine
pub struct OcrsExtractor {
    model_dir: PathBuf,
    // Loaded on first use; Arc so the lock is released before recognition runs
    engine: Mutex<Option<Arc<OcrEngine>>>,
}

impl OcrsExtractor {
    pub fn new(model_dir: impl Into<PathBuf>) -> Self {
        Self {
            model_dir: model_dir.into(),
            engine: Mutex::new(None),
        }
    }

    fn engine(&self) -> Result<Arc<OcrEngine>> {
        let mut guard = self
            .engine
            .lock()
            .map_err(|_| anyhow::anyhow!("OCR engine lock poisoned"))?;

        if let Some(engine) = guard.as_ref() {
            return Ok(engine.clone());
        }

        info!(model_dir = %self.model_dir.display(), "initializing OCR engine");
        let engine = Arc::new(init_ocr_engine(&self.model_dir)?);
        *guard = Some(engine.clone());
        Ok(engine)
    }
}

impl TextExtractor for OcrsExtractor {
    fn extract(&self, image: &DynamicImage) -> Result<Vec<TextRegion>> {
        let engine = self.engine()?;

        let img = image.to_rgb8();
        let img_source = ImageSource::from_bytes(img.as_raw(), img.dimensions())
            .map_err(|e| anyhow::anyhow!("Invalid OCR input image: {:?}", e))?;
        let ocr_input = engine.prepare_input(img_source)?;

        let word_rects = engine.detect_words(&ocr_input)?;
        let line_rects = engine.find_text_lines(&ocr_input, &word_rects);
        let lines = engine.recognize_text(&ocr_input, &line_rects)?;

        let regions: Vec<TextRegion> = lines
            .iter()
            .flatten()
            .filter_map(|line| {
                let text = line.to_string().trim().to_string();
                if text.is_empty() {
                    return None;
                }
                let rect = line.bounding_rect();
                Some(TextRegion::from_rect(
                    text,
                    RECOGNITION_CONFIDENCE,
                    rect.left() as f32,
                    rect.top() as f32,
                    rect.right() as f32,
                    rect.bottom() as f32,
                ))
            })
            .collect();

        debug!(lines = regions.len(), "OCR finished");
        Ok(regions)
    }

    fn name(&self) -> &str {
        "ocrs"
    }
}

/// Used when OCR is switched off in the configuration
pub struct DisabledExtractor;

impl TextExtractor for DisabledExtractor {
    fn extract(&self, _image: &DynamicImage) -> Result<Vec<TextRegion>> {
        Ok(Vec::new())
    }

    fn name(&self) -> &str {
        "disabled"
    }
}

/// Extractor for the configured OCR settings. Missing models switch OCR
/// off with a warning so the forensic checks still run.
pub fn extractor_for(config: &OcrConfig) -> Arc<dyn TextExtractor> {
    if !config.enabled {
        info!("OCR disabled by configuration");
        return Arc::new(DisabledExtractor);
    }

    let models_present = [DETECTION_MODEL_FILE, RECOGNITION_MODEL_FILE]
        .iter()
        .all(|file| config.model_dir.join(file).is_file());
    if !models_present {
        warn!(model_dir = %config.model_dir.display(), "OCR models not found, text extraction disabled");
        return Arc::new(DisabledExtractor);
    }

    Arc::new(OcrsExtractor::new(config.model_dir.clone()))
}
