use crate::models::{Classification, round_to};

/// Pixel level evidence is the more definitive signal
pub const ELA_WEIGHT: f64 = 0.6;
pub const LAYOUT_WEIGHT: f64 = 0.4;

pub const SUSPICIOUS_ABOVE: f64 = 30.0;
pub const FORGED_ABOVE: f64 = 70.0;

pub fn classify(score_pct: f64) -> Classification {
    if score_pct > FORGED_ABOVE {
        Classification::HighlyForged
    } else if score_pct > SUSPICIOUS_ABOVE {
        Classification::Suspicious
    } else {
        Classification::Authentic
    }
}

/// Weighted fraud confidence in percent (2 dp) and its label
pub fn calculate_final_score(ela_score: f64, layout_score: f64) -> (f64, Classification) {
    let ela = ela_score.clamp(0.0, 1.0);
    let layout = layout_score.clamp(0.0, 1.0);

    let final_pct = (ela * ELA_WEIGHT + layout * LAYOUT_WEIGHT) * 100.0;
    (round_to(final_pct, 2), classify(final_pct))
}
