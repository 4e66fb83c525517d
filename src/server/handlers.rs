use axum::{
    Json,
    body::Bytes,
    extract::{Multipart, State, rejection::JsonRejection},
};
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use super::AppState;
use super::auth::Caller;
use super::error::{ApiError, ApiResult};
use crate::copilot::{ChatRequest, ChatResponse};
use crate::core::db::{NewScan, ScanRepository};
use crate::detection::{self, Analysis, DocumentAnalyzer, kyc};
use crate::models::{BatchReport, DocumentReport, FraudResult};

pub const RUNNING_MESSAGE: &str = "AI Document Fraud Detection API is running";
pub const UNSUPPORTED_TYPE_MESSAGE: &str = "Only JPG and PNG images are supported.";

/// One uploaded image with an accepted extension
struct Upload {
    filename: String,
    extension: String,
    bytes: Bytes,
}

/// Collect the file parts named `field`, rejecting unsupported types
async fn read_uploads(multipart: &mut Multipart, field: &str) -> ApiResult<Vec<Upload>> {
    let mut uploads = Vec::new();
    while let Some(part) = multipart.next_field().await? {
        if part.name() != Some(field) {
            continue;
        }

        let filename = part.file_name().unwrap_or_default().to_string();
        let Some(extension) = detection::supported_extension(&filename) else {
            warn!(%filename, "rejected upload with unsupported type");
            return Err(ApiError::BadRequest(UNSUPPORTED_TYPE_MESSAGE.to_string()));
        };
        let bytes = part.bytes().await?;
        uploads.push(Upload {
            filename,
            extension,
            bytes,
        });
    }
    Ok(uploads)
}

async fn read_single_upload(multipart: &mut Multipart) -> ApiResult<Upload> {
    read_uploads(multipart, "file")
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| ApiError::Unprocessable("Field required: file".to_string()))
}

/// Run a CPU bound job on the blocking pool
async fn blocking<T, F>(job: F) -> ApiResult<T>
where
    T: Send + 'static,
    F: FnOnce() -> ApiResult<T> + Send + 'static,
{
    tokio::task::spawn_blocking(job)
        .await
        .map_err(|e| ApiError::Internal(anyhow::anyhow!("Analysis task failed: {}", e)))?
}

fn decode(bytes: &[u8]) -> ApiResult<image::DynamicImage> {
    detection::decode_image(bytes).map_err(|e| ApiError::BadRequest(format!("{:#}", e)))
}

/// Upload with its finished analysis, not yet persisted
struct Analyzed {
    document_id: String,
    upload: Upload,
    analysis: Analysis,
}

/// Full analysis of one upload on the blocking pool
async fn run_analysis(state: &AppState, upload: Upload) -> ApiResult<Analyzed> {
    let document_id = Uuid::new_v4().to_string();

    let analyzer: Arc<DocumentAnalyzer> = state.analyzer.clone();
    let bytes = upload.bytes.clone();
    let filename = upload.filename.clone();
    let id = document_id.clone();
    let analysis = blocking(move || {
        let image = decode(&bytes)?;
        Ok(analyzer.analyze(&image, &filename, &id)?)
    })
    .await?;

    Ok(Analyzed {
        document_id,
        upload,
        analysis,
    })
}

/// Keep the evidence of an analyzed upload and record its scan
async fn persist(state: &AppState, analyzed: Analyzed, caller: &Caller) -> ApiResult<DocumentReport> {
    let Analyzed {
        document_id,
        upload,
        analysis: Analysis { report, heatmap_png },
    } = analyzed;

    state
        .evidence
        .store_upload(&document_id, &upload.extension, &upload.bytes)
        .await?;
    state.evidence.store_heatmap(&document_id, &heatmap_png).await?;
    state.evidence.store_report(&document_id, &report).await?;

    state
        .db
        .record_scan(&NewScan {
            document_id,
            filename: upload.filename,
            confidence_score: report.final_score,
            classification: report.classification,
            company_id: caller.company_id(),
        })
        .await?;

    Ok(report)
}

pub async fn root() -> Json<Value> {
    Json(json!({ "message": RUNNING_MESSAGE }))
}

/// ELA-only check with the fixed fraud threshold
pub async fn upload_document(
    State(state): State<AppState>,
    _caller: Caller,
    mut multipart: Multipart,
) -> ApiResult<Json<FraudResult>> {
    let upload = read_single_upload(&mut multipart).await?;
    let file_id = Uuid::new_v4().to_string();
    state
        .evidence
        .store_upload(&file_id, &upload.extension, &upload.bytes)
        .await?;

    let analyzer = state.analyzer.clone();
    let filename = upload.filename.clone();
    let result = blocking(move || {
        let image = decode(&upload.bytes)?;
        Ok(analyzer.baseline(&image, &filename)?)
    })
    .await?;

    info!(%file_id, filename = %result.filename, score = result.anomaly_score, "baseline check done");
    Ok(Json(result))
}

pub async fn analyze_document(
    State(state): State<AppState>,
    caller: Caller,
    mut multipart: Multipart,
) -> ApiResult<Json<DocumentReport>> {
    let upload = read_single_upload(&mut multipart).await?;
    let analyzed = run_analysis(&state, upload).await?;
    Ok(Json(persist(&state, analyzed, &caller).await?))
}

/// Analyze several documents of one applicant and cross-check their KYC fields
pub async fn analyze_batch(
    State(state): State<AppState>,
    caller: Caller,
    mut multipart: Multipart,
) -> ApiResult<Json<BatchReport>> {
    let uploads = read_uploads(&mut multipart, "files").await?;
    let max = state.config.server.max_batch_files;
    if uploads.len() < 2 {
        return Err(ApiError::BadRequest(
            "At least 2 documents are required for KYC validation.".to_string(),
        ));
    }
    if uploads.len() > max {
        return Err(ApiError::BadRequest(format!(
            "At most {} documents can be analyzed in one batch.",
            max
        )));
    }

    // Nothing is stored unless every document decodes and analyzes
    let mut analyzed = Vec::with_capacity(uploads.len());
    for upload in uploads {
        analyzed.push(run_analysis(&state, upload).await?);
    }

    let mut results = Vec::with_capacity(analyzed.len());
    for item in analyzed {
        results.push(persist(&state, item, &caller).await?);
    }

    let entities: Vec<_> = results.iter().map(|r| r.extracted_entities.clone()).collect();
    let kyc_validation = kyc::cross_validate(&entities);
    info!(
        documents = results.len(),
        consistency = kyc_validation.consistency_score,
        valid = kyc_validation.is_valid,
        "batch analyzed"
    );

    Ok(Json(BatchReport {
        results,
        kyc_validation,
    }))
}

pub async fn copilot_chat(
    State(state): State<AppState>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> ApiResult<Json<ChatResponse>> {
    let Json(request) = payload?;
    if request.question.trim().is_empty() {
        return Err(ApiError::Unprocessable("Question must not be empty".to_string()));
    }
    Ok(Json(state.copilot.query(&request.question)))
}
