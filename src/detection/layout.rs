use crate::models::TextRegion;

/// Horizontal gaps below this many pixels count as alignment jitter
const JITTER_MAX_GAP: f64 = 15.0;
const JITTER_SCALE: f64 = 10.0;
const SPACING_VARIANCE_SCALE: f64 = 5000.0;
/// Each heuristic contributes at most this much
const COMPONENT_CAP: f64 = 0.5;

fn consecutive_differences(mut values: Vec<f64>) -> Vec<f64> {
    values.sort_by(|a, b| a.total_cmp(b));
    values.windows(2).map(|w| w[1] - w[0]).collect()
}

fn population_variance(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    values.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / n
}

/// Mean of the small, non-zero gaps between sorted left edges.
///
/// Text that should share a margin but sits a few pixels off produces many
/// such gaps; properly aligned text produces zeros or large gaps.
pub fn alignment_jitter(regions: &[TextRegion]) -> f64 {
    let diffs = consecutive_differences(regions.iter().map(|r| r.left() as f64).collect());
    let small: Vec<f64> = diffs
        .into_iter()
        .filter(|&d| d > 0.0 && d < JITTER_MAX_GAP)
        .collect();

    if small.is_empty() {
        0.0
    } else {
        small.iter().sum::<f64>() / small.len() as f64
    }
}

/// Variance of the vertical distance between neighbouring lines, when there
/// are at least two distances to compare
pub fn spacing_variance(regions: &[TextRegion]) -> Option<f64> {
    let diffs = consecutive_differences(regions.iter().map(|r| r.vertical_center() as f64).collect());
    if diffs.len() > 1 {
        Some(population_variance(&diffs))
    } else {
        None
    }
}

/// Layout anomaly score in [0, 1] from misaligned margins and irregular line spacing
pub fn analyze_spatial_consistency(regions: &[TextRegion]) -> f64 {
    if regions.len() < 2 {
        return 0.0;
    }

    let mut score = (alignment_jitter(regions) / JITTER_SCALE).min(COMPONENT_CAP);

    if let Some(variance) = spacing_variance(regions) {
        score += (variance / SPACING_VARIANCE_SCALE).min(COMPONENT_CAP);
    }

    score.clamp(0.0, 1.0)
}
