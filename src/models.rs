use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Labelled connected component of a thresholded error-level map
#[derive(Debug, Clone)]
pub struct Contour {
    pub label: u32,
    pub min_x: u32,
    pub min_y: u32,
    pub max_x: u32,
    pub max_y: u32,
    pub pixel_count: u32,
}

impl Contour {
    pub fn width(&self) -> u32 {
        self.max_x - self.min_x + 1
    }

    pub fn height(&self) -> u32 {
        self.max_y - self.min_y + 1
    }

    pub fn area(&self) -> u32 {
        self.pixel_count
    }

    pub fn to_region(&self, mean_level: f32) -> SuspiciousRegion {
        SuspiciousRegion {
            x: self.min_x,
            y: self.min_y,
            width: self.width(),
            height: self.height(),
            pixel_count: self.pixel_count,
            mean_level,
        }
    }
}

/// Area of the document whose compression error stands out from the rest
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuspiciousRegion {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
    pub pixel_count: u32,
    /// Mean heatmap level (0-255) inside the bounding box
    pub mean_level: f32,
}

/// Four corners, clockwise from top-left
pub type Quad = [[f32; 2]; 4];

/// One recognized line of text
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextRegion {
    pub text: String,
    pub confidence: f32,
    pub bounding_box: Quad,
}

impl TextRegion {
    /// Axis-aligned box given as left/top/right/bottom
    pub fn from_rect(text: impl Into<String>, confidence: f32, left: f32, top: f32, right: f32, bottom: f32) -> Self {
        Self {
            text: text.into(),
            confidence,
            bounding_box: [[left, top], [right, top], [right, bottom], [left, bottom]],
        }
    }

    pub fn left(&self) -> f32 {
        self.bounding_box[0][0]
    }

    pub fn vertical_center(&self) -> f32 {
        self.bounding_box.iter().map(|p| p[1]).sum::<f32>() / 4.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Classification {
    Authentic,
    Suspicious,
    #[serde(rename = "Highly Forged")]
    HighlyForged,
}

impl Classification {
    pub fn as_str(&self) -> &'static str {
        match self {
            Classification::Authentic => "Authentic",
            Classification::Suspicious => "Suspicious",
            Classification::HighlyForged => "Highly Forged",
        }
    }
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Classification {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Authentic" => Ok(Classification::Authentic),
            "Suspicious" => Ok(Classification::Suspicious),
            "Highly Forged" => Ok(Classification::HighlyForged),
            other => anyhow::bail!("Unknown classification label: {}", other),
        }
    }
}

/// KYC fields read from a document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractedEntities {
    pub person_name: Option<String>,
    pub address: Option<String>,
    pub date: Option<String>,
}

/// Response of the baseline ELA-only check
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FraudResult {
    pub filename: String,
    pub anomaly_score: f64,
    pub is_fraud: bool,
    pub ocr_data: Vec<TextRegion>,
    pub heatmap_base64: String,
}

/// Full forensic report for one document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentReport {
    pub document_id: String,
    pub filename: String,
    /// Raw ELA score (variance / 100), 4 dp
    pub anomaly_score: f64,
    pub layout_score: f64,
    /// Weighted verdict in percent, 2 dp
    pub final_score: f64,
    pub classification: Classification,
    pub is_fraud: bool,
    pub ocr_data: Vec<TextRegion>,
    pub extracted_entities: ExtractedEntities,
    pub suspicious_regions: Vec<SuspiciousRegion>,
    pub heatmap_base64: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KycValidation {
    pub consistency_score: f64,
    pub is_valid: bool,
    pub mismatches: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchReport {
    pub results: Vec<DocumentReport>,
    pub kyc_validation: KycValidation,
}

/// Round half away from zero to `places` decimals
pub fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}
