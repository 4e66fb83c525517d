mod company;
mod policy;
mod scan;
mod state;

use std::{path::Path, sync::Arc};

use anyhow::Context;
use sqlx::Connection;
use state::DbState;
use time::{OffsetDateTime, format_description::well_known::Rfc3339};
use tracing::{debug, info};
use uuid::Uuid;

pub use company::{ChargeOutcome, Company, CompanyRepository, NewCompany};
pub use policy::{PolicyChunk, PolicyRepository};
pub use scan::{NewScan, ScanRecord, ScanRepository};

use crate::models::Classification;

/// Handle to the service database; cheap to clone and share between requests
#[derive(Debug, Clone)]
pub struct FraudDb {
    state: Arc<DbState>,
}

impl FraudDb {
    pub async fn new<P: AsRef<Path>>(db_file: P) -> anyhow::Result<Self> {
        Ok(Self {
            state: Arc::new(DbState::new(db_file).await?),
        })
    }

    pub fn db_file(&self) -> &Path {
        self.state.db_file()
    }

    /// Checkpoint and close the pool.
    /// Call before dropping in tests so the file is complete on disk.
    pub async fn close(&self) -> anyhow::Result<()> {
        self.state.close().await
    }
}

fn new_api_key() -> String {
    format!("dfk_{}", Uuid::new_v4().simple())
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}

#[derive(sqlx::FromRow)]
struct CompanyRow {
    id: i64,
    name: String,
    api_key: String,
    credits_remaining: i64,
}

impl From<CompanyRow> for Company {
    fn from(row: CompanyRow) -> Self {
        Company {
            id: row.id,
            name: row.name,
            api_key: row.api_key,
            credits_remaining: row.credits_remaining,
            _guard: (),
        }
    }
}

#[derive(sqlx::FromRow)]
struct ScanRow {
    id: i64,
    document_id: String,
    timestamp: String,
    filename: String,
    confidence_score: f64,
    classification_label: String,
    company_id: Option<i64>,
}

impl TryFrom<ScanRow> for ScanRecord {
    type Error = anyhow::Error;

    fn try_from(row: ScanRow) -> anyhow::Result<Self> {
        let timestamp = OffsetDateTime::parse(&row.timestamp, &Rfc3339)
            .with_context(|| format!("Bad timestamp on scan {}: {}", row.document_id, row.timestamp))?;
        let classification: Classification = row.classification_label.parse()?;
        Ok(ScanRecord {
            id: row.id,
            document_id: row.document_id,
            timestamp,
            filename: row.filename,
            confidence_score: row.confidence_score,
            classification,
            company_id: row.company_id,
            _guard: (),
        })
    }
}

#[derive(sqlx::FromRow)]
struct PolicyChunkRow {
    page: Option<i64>,
    content: String,
}

impl CompanyRepository for FraudDb {
    async fn add_company(&self, company: &NewCompany) -> anyhow::Result<Company> {
        if company.name.trim().is_empty() {
            anyhow::bail!("Company name must not be empty");
        }
        if company.credits < 0 {
            anyhow::bail!("Initial credits must not be negative, got {}", company.credits);
        }

        let mut conn = self.state.conn().await?;
        let result = sqlx::query_as::<_, CompanyRow>(
            r#"INSERT INTO client_companies (name, api_key, credits_remaining) VALUES ($1, $2, $3)
            RETURNING id, name, api_key, credits_remaining"#,
        )
        .bind(company.name.trim())
        .bind(new_api_key())
        .bind(company.credits)
        .fetch_one(&mut *conn)
        .await;

        match result {
            Ok(row) => {
                info!(company = %row.name, credits = row.credits_remaining, "company registered");
                Ok(row.into())
            }
            Err(err) if is_unique_violation(&err) => {
                anyhow::bail!("Company '{}' already exists", company.name.trim())
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn get_company_by_name(&self, name: &str) -> anyhow::Result<Option<Company>> {
        let mut conn = self.state.conn().await?;
        Ok(sqlx::query_as::<_, CompanyRow>(
            r#"SELECT id, name, api_key, credits_remaining FROM client_companies WHERE name = $1"#,
        )
        .bind(name)
        .fetch_optional(&mut *conn)
        .await?
        .map(Company::from))
    }

    async fn get_company_by_api_key(&self, api_key: &str) -> anyhow::Result<Option<Company>> {
        let mut conn = self.state.conn().await?;
        Ok(sqlx::query_as::<_, CompanyRow>(
            r#"SELECT id, name, api_key, credits_remaining FROM client_companies WHERE api_key = $1"#,
        )
        .bind(api_key)
        .fetch_optional(&mut *conn)
        .await?
        .map(Company::from))
    }

    async fn get_companies(&self) -> anyhow::Result<Vec<Company>> {
        let mut conn = self.state.conn().await?;
        Ok(sqlx::query_as::<_, CompanyRow>(
            r#"SELECT id, name, api_key, credits_remaining FROM client_companies ORDER BY id ASC"#,
        )
        .fetch_all(&mut *conn)
        .await?
        .into_iter()
        .map(Company::from)
        .collect())
    }

    async fn top_up_credits(&self, name: &str, credits: i64) -> anyhow::Result<Option<Company>> {
        if credits <= 0 {
            anyhow::bail!("Top-up must add at least one credit, got {}", credits);
        }

        let mut conn = self.state.conn().await?;
        let company = sqlx::query_as::<_, CompanyRow>(
            r#"UPDATE client_companies SET credits_remaining = credits_remaining + $1
            WHERE name = $2
            RETURNING id, name, api_key, credits_remaining"#,
        )
        .bind(credits)
        .bind(name)
        .fetch_optional(&mut *conn)
        .await?
        .map(Company::from);

        if let Some(company) = &company {
            info!(company = %company.name, added = credits, balance = company.credits_remaining, "credits topped up");
        }
        Ok(company)
    }

    async fn charge_credit(&self, api_key: &str) -> anyhow::Result<ChargeOutcome> {
        let mut conn = self.state.conn().await?;
        let mut tx = conn.begin().await?;

        // Conditional decrement keeps concurrent requests from overdrawing
        let charged = sqlx::query_as::<_, CompanyRow>(
            r#"UPDATE client_companies SET credits_remaining = credits_remaining - 1
            WHERE api_key = $1 AND credits_remaining > 0
            RETURNING id, name, api_key, credits_remaining"#,
        )
        .bind(api_key)
        .fetch_optional(&mut *tx)
        .await?;

        let outcome = match charged {
            Some(row) => ChargeOutcome::Charged(row.into()),
            None => {
                let existing = sqlx::query_as::<_, CompanyRow>(
                    r#"SELECT id, name, api_key, credits_remaining FROM client_companies WHERE api_key = $1"#,
                )
                .bind(api_key)
                .fetch_optional(&mut *tx)
                .await?;
                match existing {
                    Some(row) => ChargeOutcome::Exhausted(row.into()),
                    None => ChargeOutcome::UnknownKey,
                }
            }
        };
        tx.commit().await?;

        if let ChargeOutcome::Charged(company) = &outcome {
            debug!(company = %company.name, balance = company.credits_remaining, "credit charged");
        }
        Ok(outcome)
    }
}

impl ScanRepository for FraudDb {
    async fn record_scan(&self, scan: &NewScan) -> anyhow::Result<ScanRecord> {
        let timestamp = OffsetDateTime::now_utc().format(&Rfc3339)?;
        let mut conn = self.state.conn().await?;
        let row = sqlx::query_as::<_, ScanRow>(
            r#"INSERT INTO scan_records
                (document_id, timestamp, filename, confidence_score, classification_label, company_id)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id, document_id, timestamp, filename, confidence_score, classification_label, company_id"#,
        )
        .bind(&scan.document_id)
        .bind(timestamp)
        .bind(&scan.filename)
        .bind(scan.confidence_score)
        .bind(scan.classification.as_str())
        .bind(scan.company_id)
        .fetch_one(&mut *conn)
        .await
        .with_context(|| format!("Failed to record scan {}", scan.document_id))?;
        row.try_into()
    }

    async fn get_scan(&self, document_id: &str) -> anyhow::Result<Option<ScanRecord>> {
        let mut conn = self.state.conn().await?;
        sqlx::query_as::<_, ScanRow>(
            r#"SELECT id, document_id, timestamp, filename, confidence_score, classification_label, company_id
            FROM scan_records WHERE document_id = $1"#,
        )
        .bind(document_id)
        .fetch_optional(&mut *conn)
        .await?
        .map(ScanRecord::try_from)
        .transpose()
    }

    async fn get_scans(&self, company_id: Option<i64>) -> anyhow::Result<Vec<ScanRecord>> {
        let mut conn = self.state.conn().await?;
        sqlx::query_as::<_, ScanRow>(
            r#"SELECT id, document_id, timestamp, filename, confidence_score, classification_label, company_id
            FROM scan_records
            WHERE $1 IS NULL OR company_id = $1
            ORDER BY id DESC"#,
        )
        .bind(company_id)
        .fetch_all(&mut *conn)
        .await?
        .into_iter()
        .map(ScanRecord::try_from)
        .collect()
    }
}

impl PolicyRepository for FraudDb {
    async fn replace_policy_chunks(&self, chunks: &[PolicyChunk]) -> anyhow::Result<()> {
        let mut conn = self.state.conn().await?;
        let mut tx = conn.begin().await?;
        sqlx::query(r#"DELETE FROM policy_chunks"#)
            .execute(&mut *tx)
            .await?;
        for (position, chunk) in chunks.iter().enumerate() {
            sqlx::query(r#"INSERT INTO policy_chunks (position, page, content) VALUES ($1, $2, $3)"#)
                .bind(position as i64)
                .bind(chunk.page)
                .bind(&chunk.content)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        debug!(chunks = chunks.len(), "policy chunks stored");
        Ok(())
    }

    async fn get_policy_chunks(&self) -> anyhow::Result<Vec<PolicyChunk>> {
        let mut conn = self.state.conn().await?;
        Ok(sqlx::query_as::<_, PolicyChunkRow>(
            r#"SELECT page, content FROM policy_chunks ORDER BY position ASC"#,
        )
        .fetch_all(&mut *conn)
        .await?
        .into_iter()
        .map(|row| PolicyChunk {
            page: row.page,
            content: row.content,
        })
        .collect())
    }
}
