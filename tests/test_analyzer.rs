//! End-to-end tests of the document analyzer with a scripted OCR backend.

mod common;

use std::sync::Arc;

use docfraud::AnalyzerSettings;
use docfraud::detection::{self, DocumentAnalyzer, kyc};

use common::*;

#[test]
fn test_flat_page_with_aligned_text_is_authentic() -> anyhow::Result<()> {
    let analyzer = analyzer_with_lines(aligned_lines(&["Salary Slip", "Name: Jane Doe", "Net pay: 4,200.00"]));

    let analysis = analyzer.analyze(&flat_page(64, 64), "slip.png", "doc-flat")?;
    let report = analysis.report;

    assert_eq!(report.document_id, "doc-flat");
    assert_eq!(report.filename, "slip.png");
    assert!(report.anomaly_score < 1e-6, "anomaly score {}", report.anomaly_score);
    assert_eq!(report.layout_score, 0.0);
    assert_eq!(report.final_score, 0.0);
    assert_eq!(report.classification, Classification::Authentic);
    assert!(!report.is_fraud);
    assert!(report.suspicious_regions.is_empty());
    assert_eq!(report.ocr_data.len(), 3);
    assert_eq!(report.extracted_entities.person_name.as_deref(), Some("Jane Doe"));

    let heatmap = image::load_from_memory(&analysis.heatmap_png)?;
    assert_eq!((heatmap.width(), heatmap.height()), (64, 64));
    assert!(!report.heatmap_base64.is_empty());

    Ok(())
}

#[test]
fn test_irregular_layout_is_flagged() -> anyhow::Result<()> {
    let analyzer = analyzer_with_lines(jittered_lines());

    let report = analyzer.analyze(&flat_page(64, 64), "bill.png", "doc-jitter")?.report;

    assert_eq!(report.layout_score, 1.0);
    assert!(report.final_score >= 40.0);
    assert_ne!(report.classification, Classification::Authentic);
    assert!(report.is_fraud);

    Ok(())
}

#[test]
fn test_final_score_matches_weighting() -> anyhow::Result<()> {
    let analyzer = analyzer_with_lines(jittered_lines());

    let report = analyzer.analyze(&noisy_page(96, 96), "noise.png", "doc-noise")?.report;

    let expected = (report.anomaly_score.clamp(0.0, 1.0) * 0.6 + report.layout_score * 0.4) * 100.0;
    assert!((report.final_score - expected).abs() < 0.01);
    assert!(report.final_score <= 100.0);
    assert_eq!(report.is_fraud, report.classification != Classification::Authentic);

    Ok(())
}

#[test]
fn test_baseline_uses_threshold() -> anyhow::Result<()> {
    let analyzer = analyzer_with_lines(aligned_lines(&["INVOICE"]));

    let result = analyzer.baseline(&flat_page(32, 32), "invoice.png")?;
    assert_eq!(result.filename, "invoice.png");
    assert!(!result.is_fraud);
    assert_eq!(result.ocr_data.len(), 1);
    assert!(!result.heatmap_base64.is_empty());

    Ok(())
}

#[test]
fn test_baseline_flags_score_above_threshold() -> anyhow::Result<()> {
    let analyzer = analyzer_with_lines(Vec::new());
    let page = noisy_page(96, 96);

    let result = analyzer.baseline(&page, "edited.png")?;
    assert!(result.anomaly_score > 0.5, "anomaly score {}", result.anomaly_score);
    assert!(result.is_fraud);

    // Same page, threshold raised above its score
    let lenient = DocumentAnalyzer::new(
        AnalyzerSettings {
            fraud_threshold: result.anomaly_score + 1.0,
            ..AnalyzerSettings::default()
        },
        Arc::new(MockExtractor { lines: Vec::new() }),
    );
    assert!(!lenient.baseline(&page, "edited.png")?.is_fraud);

    Ok(())
}

#[test]
fn test_kyc_over_three_documents() -> anyhow::Result<()> {
    let pages = [
        ["Name: Jane Doe", "Address: 1 Main Road"],
        ["Customer Name: Jane Doe", "Service Address: 1 Main Road"],
        ["Name: Jane Dow", "Address: 99 Harbour View"],
    ];
    let mut entities = Vec::new();
    for (i, lines) in pages.iter().enumerate() {
        let analyzer = analyzer_with_lines(aligned_lines(lines));
        let report = analyzer.analyze(&flat_page(16, 16), "doc.png", &format!("doc-{}", i))?.report;
        entities.push(report.extracted_entities);
    }

    let validation = kyc::cross_validate(&entities);
    assert!(!validation.is_valid);
    // Only the third address disagrees; "Jane Dow" is within the name tolerance
    assert_eq!(validation.mismatches.len(), 2, "{:?}", validation.mismatches);
    assert!(validation.mismatches[0].starts_with("Address mismatch between Doc A and Doc C"));
    assert!(validation.mismatches[1].starts_with("Address mismatch between Doc B and Doc C"));

    // Six comparisons: three name pairs and three address pairs
    let name = kyc::similarity("Jane Doe", "Jane Dow");
    let address = kyc::similarity("1 Main Road", "99 Harbour View");
    let expected = (1.0 + 2.0 * name + 1.0 + 2.0 * address) / 6.0 * 100.0;
    assert!((validation.consistency_score - expected).abs() < 0.01);

    Ok(())
}

#[test]
fn test_debug_output_writes_every_step() -> anyhow::Result<()> {
    let dir = tempfile::TempDir::new()?;
    let debug_dir = dir.path().join("debug");
    let analyzer = analyzer_with_lines(Vec::new()).with_debug(debug_dir.clone());

    analyzer.error_levels(&noisy_page(32, 32))?;

    for step in [
        "00_input",
        "01_jpeg_recompression",
        "02_error_levels",
        "03_amplify",
        "04_error_score",
    ] {
        assert!(debug_dir.join(step).join("01.png").is_file(), "missing {}", step);
    }

    Ok(())
}

#[test]
fn test_decode_rejects_garbage() {
    assert!(detection::decode_image(b"definitely not an image").is_err());
    assert!(detection::decode_image(&png_bytes(&flat_page(4, 4))).is_ok());
}

#[test]
fn test_batch_entities_feed_kyc() -> anyhow::Result<()> {
    let id_card = analyzer_with_lines(aligned_lines(&[
        "NATIONAL ID",
        "Name: Jonathan Smith",
        "Address: 12 Baker Street, London",
    ]));
    let utility_bill = analyzer_with_lines(aligned_lines(&[
        "City Power",
        "Customer Name: Jonathon Smith",
        "Service Address: 12 Baker Street London",
        "Issued 03/02/2024",
    ]));

    let a = id_card.analyze(&flat_page(16, 16), "id.png", "a")?.report;
    let b = utility_bill.analyze(&flat_page(16, 16), "bill.png", "b")?.report;
    assert_eq!(b.extracted_entities.date.as_deref(), Some("03/02/2024"));

    let validation = kyc::cross_validate(&[a.extracted_entities, b.extracted_entities]);
    assert!(validation.is_valid, "{:?}", validation.mismatches);
    assert!(validation.consistency_score > 90.0);

    Ok(())
}
