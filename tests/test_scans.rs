//! Integration tests for the scan audit trail.

mod common;

use common::*;

fn scan(document_id: &str, score: f64, classification: Classification, company_id: Option<i64>) -> NewScan {
    NewScan {
        document_id: document_id.to_string(),
        filename: format!("{}.png", document_id),
        confidence_score: score,
        classification,
        company_id,
    }
}

#[tokio::test]
async fn test_record_and_get_scan() -> anyhow::Result<()> {
    let (db, _temp_dir) = create_test_db().await;

    let before = time::OffsetDateTime::now_utc() - time::Duration::seconds(1);
    let record = db
        .record_scan(&scan("doc-1", 42.5, Classification::Suspicious, None))
        .await?;
    assert_eq!(record.document_id, "doc-1");
    assert_eq!(record.classification, Classification::Suspicious);
    assert!(record.timestamp >= before);

    let fetched = db.get_scan("doc-1").await?.expect("scan stored");
    assert_eq!(fetched.id, record.id);
    assert_eq!(fetched.filename, "doc-1.png");
    assert_eq!(fetched.confidence_score, 42.5);
    assert_eq!(fetched.company_id, None);

    assert!(db.get_scan("doc-404").await?.is_none());

    Ok(())
}

#[tokio::test]
async fn test_classification_labels_round_trip() -> anyhow::Result<()> {
    let (db, _temp_dir) = create_test_db().await;

    db.record_scan(&scan("forged", 88.0, Classification::HighlyForged, None))
        .await?;
    let fetched = db.get_scan("forged").await?.expect("scan stored");
    assert_eq!(fetched.classification, Classification::HighlyForged);

    Ok(())
}

#[tokio::test]
async fn test_scans_are_listed_newest_first_and_filtered() -> anyhow::Result<()> {
    let (db, _temp_dir) = create_test_db().await;
    let acme = db.add_company(&new_company("Acme", 10)).await?;
    let other = db.add_company(&new_company("Other", 10)).await?;

    db.record_scan(&scan("a1", 10.0, Classification::Authentic, Some(acme.id)))
        .await?;
    db.record_scan(&scan("o1", 35.0, Classification::Suspicious, Some(other.id)))
        .await?;
    db.record_scan(&scan("a2", 75.0, Classification::HighlyForged, Some(acme.id)))
        .await?;
    db.record_scan(&scan("anon", 5.0, Classification::Authentic, None))
        .await?;

    let all: Vec<_> = db
        .get_scans(None)
        .await?
        .into_iter()
        .map(|s| s.document_id)
        .collect();
    assert_eq!(all, vec!["anon", "a2", "o1", "a1"]);

    let acme_scans: Vec<_> = db
        .get_scans(Some(acme.id))
        .await?
        .into_iter()
        .map(|s| s.document_id)
        .collect();
    assert_eq!(acme_scans, vec!["a2", "a1"]);

    Ok(())
}

#[tokio::test]
async fn test_document_ids_are_unique() -> anyhow::Result<()> {
    let (db, _temp_dir) = create_test_db().await;

    db.record_scan(&scan("dup", 1.0, Classification::Authentic, None))
        .await?;
    let result = db
        .record_scan(&scan("dup", 2.0, Classification::Authentic, None))
        .await;
    assert!(result.is_err(), "second scan with the same document id must fail");

    Ok(())
}

#[tokio::test]
async fn test_scan_with_unknown_company_is_rejected() -> anyhow::Result<()> {
    let (db, _temp_dir) = create_test_db().await;

    let result = db
        .record_scan(&scan("orphan", 1.0, Classification::Authentic, Some(999)))
        .await;
    let error_msg = format!("{:#}", result.expect_err("foreign key must be enforced"));
    assert!(
        error_msg.contains("FOREIGN KEY") || error_msg.contains("foreign key"),
        "Error should mention foreign key constraint, got: {}",
        error_msg
    );

    Ok(())
}
