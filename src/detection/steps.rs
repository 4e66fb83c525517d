use crate::detection::ela;
use crate::pipeline::{MetadataValue, PipelineContext, PipelineData, PipelineStep};
use anyhow::Result;
use image::DynamicImage;

pub const ELA_SCORE_KEY: &str = "ela_score";

/// Resave each item as JPEG at a fixed quality
pub struct RecompressStep {
    pub quality: u8,
}

impl PipelineStep for RecompressStep {
    fn process(&self, data: Vec<PipelineData>, _context: &PipelineContext) -> Result<Vec<PipelineData>> {
        let mut result = Vec::with_capacity(data.len());
        for item in data {
            let resaved = ela::recompress_jpeg(&item.image.to_rgb8(), self.quality)?;
            result.push(
                item.with_image(DynamicImage::ImageRgb8(resaved))
                    .with_metadata("jpeg_quality", MetadataValue::Int(self.quality as i64)),
            );
        }
        Ok(result)
    }

    fn name(&self) -> &str {
        "JPEG Recompression"
    }
}

/// Replace the resaved image by its difference to the original
pub struct ErrorLevelStep;

impl PipelineStep for ErrorLevelStep {
    fn process(&self, data: Vec<PipelineData>, _context: &PipelineContext) -> Result<Vec<PipelineData>> {
        let mut result = Vec::with_capacity(data.len());
        for item in data {
            let diff = ela::error_levels(&item.original.to_rgb8(), &item.image.to_rgb8())?;
            let max_diff = ela::max_difference(&diff);
            result.push(
                item.with_image(DynamicImage::ImageRgb8(diff))
                    .with_metadata("max_difference", MetadataValue::Int(max_diff as i64)),
            );
        }
        Ok(result)
    }

    fn name(&self) -> &str {
        "Error Levels"
    }
}

/// Stretch error levels so the strongest one becomes white
pub struct AmplifyStep;

impl PipelineStep for AmplifyStep {
    fn process(&self, data: Vec<PipelineData>, _context: &PipelineContext) -> Result<Vec<PipelineData>> {
        Ok(data
            .into_iter()
            .map(|item| {
                let amplified = ela::amplify(&item.image.to_rgb8());
                item.with_image(DynamicImage::ImageRgb8(amplified))
            })
            .collect())
    }

    fn name(&self) -> &str {
        "Amplify"
    }
}

/// Attach the variance based anomaly score
pub struct ErrorScoreStep;

impl PipelineStep for ErrorScoreStep {
    fn process(&self, data: Vec<PipelineData>, _context: &PipelineContext) -> Result<Vec<PipelineData>> {
        Ok(data
            .into_iter()
            .map(|item| {
                let score = ela::anomaly_score(&item.image.to_rgb8());
                item.with_metadata(ELA_SCORE_KEY, MetadataValue::Float(score))
            })
            .collect())
    }

    fn name(&self) -> &str {
        "Error Score"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::Pipeline;
    use image::{Rgb, RgbImage};
    use std::sync::Arc;

    #[test]
    fn ela_steps_match_direct_analysis() {
        let img = DynamicImage::ImageRgb8(RgbImage::from_fn(48, 48, |x, y| {
            if x > 20 && y > 20 { Rgb([250, 10, 10]) } else { Rgb([120, 120, 120]) }
        }));

        let pipeline = Pipeline::new()
            .add_step(Arc::new(RecompressStep { quality: 90 }))
            .add_step(Arc::new(ErrorLevelStep))
            .add_step(Arc::new(AmplifyStep))
            .add_step(Arc::new(ErrorScoreStep));
        let out = pipeline.run(img.clone()).unwrap();
        let direct = ela::analyze_error_levels(&img, 90).unwrap();

        assert_eq!(out.len(), 1);
        assert_eq!(out[0].get_int("jpeg_quality"), Some(90));
        assert!(out[0].get_int("max_difference").unwrap() >= 1);
        assert_eq!(out[0].image.to_rgb8(), direct.heatmap);
        assert!((out[0].get_float(ELA_SCORE_KEY).unwrap() - direct.score).abs() < 1e-9);
    }
}
