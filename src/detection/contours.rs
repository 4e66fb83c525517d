use image::{GrayImage, Luma};
use imageproc::region_labelling::{Connectivity, connected_components};
use std::collections::HashMap;

use crate::detection::preprocessing;
use crate::models::{Contour, SuspiciousRegion};

/// Parameters for turning a heatmap into regions
#[derive(Debug, Clone, Copy)]
pub struct RegionParams {
    pub threshold: u8,
    pub blur_sigma: f32,
    pub min_area: u32,
}

/// Connected components of white pixels in a binary mask
pub fn find_contours(mask: &GrayImage, min_area: u32) -> Vec<Contour> {
    let labeled = connected_components(mask, Connectivity::Eight, Luma([0u8]));

    let mut regions: HashMap<u32, (u32, u32, u32, u32, u32)> = HashMap::new();
    for (x, y, label) in labeled.enumerate_pixels() {
        let label_val = label[0];
        if label_val == 0 {
            continue;
        }

        regions
            .entry(label_val)
            .and_modify(|(min_x, min_y, max_x, max_y, count)| {
                *min_x = (*min_x).min(x);
                *min_y = (*min_y).min(y);
                *max_x = (*max_x).max(x);
                *max_y = (*max_y).max(y);
                *count += 1;
            })
            .or_insert((x, y, x, y, 1));
    }

    let mut contours: Vec<Contour> = regions
        .into_iter()
        .map(|(label, (min_x, min_y, max_x, max_y, count))| Contour {
            label,
            min_x,
            min_y,
            max_x,
            max_y,
            pixel_count: count,
        })
        .filter(|c| c.area() >= min_area)
        .collect();

    // largest first, label as tie breaker for a stable order
    contours.sort_by(|a, b| b.pixel_count.cmp(&a.pixel_count).then(a.label.cmp(&b.label)));
    contours
}

/// Mean level of `img` inside the contour's bounding box
fn mean_level(img: &GrayImage, contour: &Contour) -> f32 {
    let mut sum: u64 = 0;
    let mut count: u64 = 0;
    for y in contour.min_y..=contour.max_y {
        for x in contour.min_x..=contour.max_x {
            if x < img.width() && y < img.height() {
                sum += img.get_pixel(x, y)[0] as u64;
                count += 1;
            }
        }
    }

    if count > 0 { sum as f32 / count as f32 } else { 0.0 }
}

/// Locate areas of the heatmap with elevated error levels
pub fn find_suspicious_regions(heatmap: &GrayImage, params: RegionParams) -> Vec<SuspiciousRegion> {
    let blurred = preprocessing::apply_blur(heatmap, params.blur_sigma);
    let mask = preprocessing::binarize(&blurred, params.threshold);

    find_contours(&mask, params.min_area)
        .iter()
        .map(|contour| contour.to_region(mean_level(&blurred, contour)))
        .collect()
}
