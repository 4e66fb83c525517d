pub mod contours;
pub mod ela;
pub mod entities;
pub mod kyc;
pub mod layout;
pub mod ocr;
pub mod preprocessing;
pub mod scoring;
pub mod steps;

use anyhow::{Context, Result};
use base64::{Engine, engine::general_purpose::STANDARD};
use image::DynamicImage;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

use crate::detection::contours::RegionParams;
use crate::detection::ocr::TextExtractor;
use crate::detection::steps::{AmplifyStep, ELA_SCORE_KEY, ErrorLevelStep, ErrorScoreStep, RecompressStep};
use crate::models::{DocumentReport, FraudResult, round_to};
use crate::pipeline::Pipeline;

pub const SUPPORTED_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];

/// Lowercased extension of `filename` when it is an accepted image type
pub fn supported_extension(filename: &str) -> Option<String> {
    let ext = Path::new(filename).extension()?.to_str()?.to_lowercase();
    SUPPORTED_EXTENSIONS.contains(&ext.as_str()).then_some(ext)
}

pub fn decode_image(bytes: &[u8]) -> Result<DynamicImage> {
    image::load_from_memory(bytes).context("Failed to decode image")
}

/// Tunables of the forensic checks
#[derive(Debug, Clone)]
pub struct AnalyzerSettings {
    pub jpeg_quality: u8,
    /// ELA score above which the baseline check calls a document forged
    pub fraud_threshold: f64,
    pub regions: RegionParams,
}

impl Default for AnalyzerSettings {
    fn default() -> Self {
        Self {
            jpeg_quality: 90,
            fraud_threshold: 0.5,
            regions: RegionParams {
                threshold: 200,
                blur_sigma: 1.5,
                min_area: 25,
            },
        }
    }
}

/// ELA heatmap with its score, already PNG encoded
pub struct ErrorLevelMap {
    pub heatmap: DynamicImage,
    pub heatmap_png: Vec<u8>,
    pub score: f64,
}

impl ErrorLevelMap {
    pub fn heatmap_base64(&self) -> String {
        STANDARD.encode(&self.heatmap_png)
    }
}

/// Result of a full analysis, with the artifacts worth keeping as evidence
pub struct Analysis {
    pub report: DocumentReport,
    pub heatmap_png: Vec<u8>,
}

/// Runs ELA, OCR, layout checks and scoring on document images
pub struct DocumentAnalyzer {
    settings: AnalyzerSettings,
    extractor: Arc<dyn TextExtractor>,
    debug_dir: Option<PathBuf>,
}

impl DocumentAnalyzer {
    pub fn new(settings: AnalyzerSettings, extractor: Arc<dyn TextExtractor>) -> Self {
        Self {
            settings,
            extractor,
            debug_dir: None,
        }
    }

    /// Write intermediate ELA images to `dir` (must be empty or absent)
    pub fn with_debug(mut self, dir: PathBuf) -> Self {
        self.debug_dir = Some(dir);
        self
    }

    pub fn ela_pipeline(&self) -> Result<Pipeline> {
        let pipeline = Pipeline::new()
            .add_step(Arc::new(RecompressStep {
                quality: self.settings.jpeg_quality,
            }))
            .add_step(Arc::new(ErrorLevelStep))
            .add_step(Arc::new(AmplifyStep))
            .add_step(Arc::new(ErrorScoreStep));

        match &self.debug_dir {
            Some(dir) => pipeline.with_debug(dir.clone()),
            None => Ok(pipeline),
        }
    }

    pub fn error_levels(&self, image: &DynamicImage) -> Result<ErrorLevelMap> {
        let mut output = self.ela_pipeline()?.run(image.clone())?;
        let item = output
            .pop()
            .context("Error level pipeline produced no output")?;
        let score = item
            .get_float(ELA_SCORE_KEY)
            .context("Error level pipeline did not attach a score")?;

        let heatmap_png = ela::encode_png(&item.image)?;
        Ok(ErrorLevelMap {
            heatmap: item.image,
            heatmap_png,
            score,
        })
    }

    /// ELA-only verdict: fraud when the raw score exceeds the threshold
    pub fn baseline(&self, image: &DynamicImage, filename: &str) -> Result<FraudResult> {
        let ocr_data = self.extractor.extract(image)?;
        let levels = self.error_levels(image)?;

        Ok(FraudResult {
            filename: filename.to_string(),
            anomaly_score: round_to(levels.score, 4),
            is_fraud: levels.score > self.settings.fraud_threshold,
            ocr_data,
            heatmap_base64: levels.heatmap_base64(),
        })
    }

    /// Every check, combined into a classified report
    pub fn analyze(&self, image: &DynamicImage, filename: &str, document_id: &str) -> Result<Analysis> {
        info!(document_id, filename, width = image.width(), height = image.height(), "analyzing document");

        let levels = self.error_levels(image)?;
        let suspicious_regions =
            contours::find_suspicious_regions(&preprocessing::to_grayscale(&levels.heatmap), self.settings.regions);

        let ocr_data = self.extractor.extract(image)?;
        let layout_score = layout::analyze_spatial_consistency(&ocr_data);
        let (final_score, classification) = scoring::calculate_final_score(levels.score, layout_score);
        let extracted_entities = entities::extract_entities(&ocr_data);

        debug!(
            document_id,
            ela = levels.score,
            layout = layout_score,
            regions = suspicious_regions.len(),
            lines = ocr_data.len(),
            "checks finished"
        );

        let report = DocumentReport {
            document_id: document_id.to_string(),
            filename: filename.to_string(),
            anomaly_score: round_to(levels.score, 4),
            layout_score: round_to(layout_score, 4),
            final_score,
            classification,
            is_fraud: classification != crate::models::Classification::Authentic,
            ocr_data,
            extracted_entities,
            suspicious_regions,
            heatmap_base64: levels.heatmap_base64(),
        };

        info!(document_id, %classification, final_score, "analysis complete");
        Ok(Analysis {
            report,
            heatmap_png: levels.heatmap_png,
        })
    }
}
