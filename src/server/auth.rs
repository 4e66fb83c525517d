use axum::{extract::FromRequestParts, http::request::Parts};
use tracing::{debug, warn};

use super::AppState;
use super::error::ApiError;
use crate::core::db::{ChargeOutcome, Company, CompanyRepository};

pub const API_KEY_HEADER: &str = "X-API-Key";

/// Who pays for the request. Extracting it spends one credit.
#[derive(Debug, Clone)]
pub enum Caller {
    Anonymous,
    Company(Company),
}

impl Caller {
    pub fn company_id(&self) -> Option<i64> {
        match self {
            Caller::Anonymous => None,
            Caller::Company(company) => Some(company.id),
        }
    }
}

impl FromRequestParts<AppState> for Caller {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let api_key = parts
            .headers
            .get(API_KEY_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty());

        let Some(api_key) = api_key else {
            if state.config.auth.require_api_key {
                warn!("request without API key");
                return Err(ApiError::Unauthorized("API Key missing".to_string()));
            }
            return Ok(Caller::Anonymous);
        };

        match state.db.charge_credit(api_key).await? {
            ChargeOutcome::Charged(company) => {
                debug!(company = %company.name, balance = company.credits_remaining, "request charged");
                Ok(Caller::Company(company))
            }
            ChargeOutcome::UnknownKey => {
                warn!("request with unknown API key");
                Err(ApiError::Unauthorized("Invalid API Key".to_string()))
            }
            ChargeOutcome::Exhausted(company) => {
                warn!(company = %company.name, "request rejected, no credits left");
                Err(ApiError::PaymentRequired(
                    "Insufficient credits. Please top up your account.".to_string(),
                ))
            }
        }
    }
}
