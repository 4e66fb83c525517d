//! Integration tests for client companies and credit accounting.

mod common;

use common::*;

#[tokio::test]
async fn test_add_and_get_company() -> anyhow::Result<()> {
    let (db, _temp_dir) = create_test_db().await;

    let company = db.add_company(&new_company("Acme Lending", 100)).await?;
    assert_eq!(company.name, "Acme Lending");
    assert_eq!(company.credits_remaining, 100);
    assert!(company.api_key.starts_with("dfk_"));

    let by_name = db.get_company_by_name("Acme Lending").await?.expect("company exists");
    assert_eq!(by_name.id, company.id);
    assert_eq!(by_name.api_key, company.api_key);

    let by_key = db
        .get_company_by_api_key(&company.api_key)
        .await?
        .expect("key resolves");
    assert_eq!(by_key.name, "Acme Lending");

    assert!(db.get_company_by_name("Nobody").await?.is_none());
    assert!(db.get_company_by_api_key("dfk_unknown").await?.is_none());

    db.close().await?;
    Ok(())
}

#[tokio::test]
async fn test_api_keys_are_unique() -> anyhow::Result<()> {
    let (db, _temp_dir) = create_test_db().await;

    let a = db.add_company(&new_company("Bank A", 10)).await?;
    let b = db.add_company(&new_company("Bank B", 10)).await?;
    assert_ne!(a.api_key, b.api_key);

    let companies = db.get_companies().await?;
    let names: Vec<_> = companies.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, vec!["Bank A", "Bank B"]);

    Ok(())
}

#[tokio::test]
async fn test_duplicate_company_name_is_rejected() -> anyhow::Result<()> {
    let (db, _temp_dir) = create_test_db().await;

    db.add_company(&new_company("Acme", 5)).await?;
    let result = db.add_company(&new_company("Acme", 5)).await;

    let error_msg = result.expect_err("duplicate name must fail").to_string();
    assert!(error_msg.contains("already exists"), "got: {}", error_msg);
    assert_eq!(db.get_companies().await?.len(), 1);

    Ok(())
}

#[tokio::test]
async fn test_invalid_new_companies() -> anyhow::Result<()> {
    let (db, _temp_dir) = create_test_db().await;

    assert!(db.add_company(&new_company("  ", 5)).await.is_err());
    assert!(db.add_company(&new_company("Broke Co", -1)).await.is_err());
    assert!(db.get_companies().await?.is_empty());

    Ok(())
}

#[tokio::test]
async fn test_top_up_credits() -> anyhow::Result<()> {
    let (db, _temp_dir) = create_test_db().await;
    db.add_company(&new_company("Acme", 1)).await?;

    let company = db.top_up_credits("Acme", 49).await?.expect("company exists");
    assert_eq!(company.credits_remaining, 50);

    assert!(db.top_up_credits("Nobody", 10).await?.is_none());
    assert!(db.top_up_credits("Acme", 0).await.is_err());

    Ok(())
}

#[tokio::test]
async fn test_charge_credit_until_exhausted() -> anyhow::Result<()> {
    let (db, _temp_dir) = create_test_db().await;
    let api_key = add_company(&db, "Acme", 2).await?;

    match db.charge_credit(&api_key).await? {
        ChargeOutcome::Charged(company) => assert_eq!(company.credits_remaining, 1),
        other => panic!("expected a charge, got {:?}", other),
    }
    match db.charge_credit(&api_key).await? {
        ChargeOutcome::Charged(company) => assert_eq!(company.credits_remaining, 0),
        other => panic!("expected a charge, got {:?}", other),
    }
    match db.charge_credit(&api_key).await? {
        ChargeOutcome::Exhausted(company) => assert_eq!(company.credits_remaining, 0),
        other => panic!("expected exhausted, got {:?}", other),
    }

    assert!(matches!(
        db.charge_credit("dfk_not_a_key").await?,
        ChargeOutcome::UnknownKey
    ));

    let company = db.get_company_by_name("Acme").await?.expect("company exists");
    assert_eq!(company.credits_remaining, 0);

    Ok(())
}

#[tokio::test]
async fn test_concurrent_charges_never_overdraw() -> anyhow::Result<()> {
    let (db, _temp_dir) = create_test_db().await;
    let api_key = add_company(&db, "Busy Bank", 5).await?;

    let mut tasks = Vec::new();
    for _ in 0..12 {
        let db = db.clone();
        let api_key = api_key.clone();
        tasks.push(tokio::spawn(async move { db.charge_credit(&api_key).await }));
    }

    let mut charged = 0;
    for task in tasks {
        if let ChargeOutcome::Charged(_) = task.await?? {
            charged += 1;
        }
    }
    assert_eq!(charged, 5);

    let company = db.get_company_by_name("Busy Bank").await?.expect("company exists");
    assert_eq!(company.credits_remaining, 0);

    Ok(())
}

#[tokio::test]
async fn test_companies_survive_reopen() -> anyhow::Result<()> {
    let (db, temp_dir) = create_test_db().await;
    let api_key = add_company(&db, "Persistent", 7).await?;
    db.close().await?;

    let reopened = FraudDb::new(temp_dir.path().join("fraud.db")).await?;
    let company = reopened
        .get_company_by_api_key(&api_key)
        .await?
        .expect("company persisted");
    assert_eq!(company.credits_remaining, 7);

    Ok(())
}
