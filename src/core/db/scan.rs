use time::OffsetDateTime;

use crate::models::Classification;

#[derive(Debug, Clone)]
pub struct ScanRecord {
    pub id: i64,
    pub document_id: String,
    pub timestamp: OffsetDateTime,
    pub filename: String,
    pub confidence_score: f64,
    pub classification: Classification,
    pub company_id: Option<i64>,
    pub(super) _guard: (),
}

#[derive(Debug, Clone)]
pub struct NewScan {
    pub document_id: String,
    pub filename: String,
    pub confidence_score: f64,
    pub classification: Classification,
    pub company_id: Option<i64>,
}

pub trait ScanRepository {
    fn record_scan(&self, scan: &NewScan) -> impl Future<Output = anyhow::Result<ScanRecord>> + Send;
    fn get_scan(&self, document_id: &str) -> impl Future<Output = anyhow::Result<Option<ScanRecord>>> + Send;
    /// All scans, newest first; only those of one company when `company_id` is given
    fn get_scans(&self, company_id: Option<i64>) -> impl Future<Output = anyhow::Result<Vec<ScanRecord>>> + Send;
}
