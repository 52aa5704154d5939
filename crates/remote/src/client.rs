//! Budget service HTTP client.
//!
//! Blocking reqwest client (no async runtime required). Covers the three
//! calls the engine needs: option lookup, benefit calculation, batch save.

use std::time::Duration;

use chrono::Utc;

use planbook_core::{FieldKey, OptionItem};
use planbook_engine::sources::{
    CalculationService, FetchError, OptionFilters, OptionSource, PersistenceLayer, RowSnapshot,
    SaveReport,
};

use crate::dto::{
    CalculateResponse, OptionsRequest, OptionsResponse, RowDto, SaveRequest, SaveResponse,
};

/// Error type for budget service calls.
#[derive(Debug)]
pub enum ServiceError {
    /// Network error
    Network(String),
    /// HTTP error with status code
    Http(u16, String),
    /// JSON parsing error
    Parse(String),
}

impl std::fmt::Display for ServiceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ServiceError::Network(msg) => write!(f, "Network error: {}", msg),
            ServiceError::Http(code, msg) => write!(f, "HTTP {}: {}", code, msg),
            ServiceError::Parse(msg) => write!(f, "Parse error: {}", msg),
        }
    }
}

impl std::error::Error for ServiceError {}

impl From<ServiceError> for FetchError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::Network(msg) => FetchError::Network(msg),
            ServiceError::Http(code, msg) => FetchError::Service(format!("HTTP {}: {}", code, msg)),
            ServiceError::Parse(msg) => FetchError::Decode(msg),
        }
    }
}

/// Budget service API client (blocking).
#[derive(Clone)]
pub struct BudgetServiceClient {
    http: reqwest::blocking::Client,
    api_base: String,
}

impl BudgetServiceClient {
    /// Create a new client against a service base URL.
    pub fn new(api_base: impl Into<String>) -> Self {
        let http = reqwest::blocking::Client::builder()
            .user_agent(format!("planbook/{}", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(30))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            http,
            api_base: api_base.into(),
        }
    }

    /// The configured base URL.
    pub fn api_base(&self) -> &str {
        &self.api_base
    }

    /// Look up the option list for a field under the given filters.
    pub fn options(
        &self,
        field: &FieldKey,
        filters: &OptionFilters,
    ) -> Result<Vec<OptionItem>, ServiceError> {
        let url = format!("{}/api/budget/options", self.api_base);
        let body = OptionsRequest::new(field, filters);
        let resp = self.post_json(&url, &body)?;
        let parsed: OptionsResponse = resp
            .json()
            .map_err(|e| ServiceError::Parse(e.to_string()))?;
        Ok(parsed.options.into_iter().map(OptionItem::from).collect())
    }

    /// Run the benefit calculation for one row.
    pub fn calculate(&self, snapshot: &RowSnapshot) -> Result<Vec<(FieldKey, f64)>, ServiceError> {
        let url = format!("{}/api/budget/calculate", self.api_base);
        let body = RowDto::from(snapshot);
        let resp = self.post_json(&url, &body)?;
        let parsed: CalculateResponse = resp
            .json()
            .map_err(|e| ServiceError::Parse(e.to_string()))?;
        Ok(parsed
            .amounts
            .into_iter()
            .map(|a| (FieldKey::from(a.field), a.amount))
            .collect())
    }

    /// Persist a batch of rows.
    pub fn save_batch(&self, rows: &[RowSnapshot]) -> Result<SaveReport, ServiceError> {
        let url = format!("{}/api/budget/batches", self.api_base);
        let body = SaveRequest {
            saved_at: Utc::now(),
            rows: rows.iter().map(RowDto::from).collect(),
        };
        let resp = self.post_json(&url, &body)?;
        let parsed: SaveResponse = resp
            .json()
            .map_err(|e| ServiceError::Parse(e.to_string()))?;
        Ok(SaveReport::from(parsed))
    }

    fn post_json<T: serde::Serialize>(
        &self,
        url: &str,
        body: &T,
    ) -> Result<reqwest::blocking::Response, ServiceError> {
        let resp = self
            .http
            .post(url)
            .json(body)
            .send()
            .map_err(|e| ServiceError::Network(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().unwrap_or_default();
            return Err(ServiceError::Http(status.as_u16(), message));
        }
        Ok(resp)
    }
}

impl OptionSource for BudgetServiceClient {
    fn fetch(
        &self,
        field: &FieldKey,
        filters: &OptionFilters,
    ) -> Result<Vec<OptionItem>, FetchError> {
        self.options(field, filters).map_err(FetchError::from)
    }
}

impl CalculationService for BudgetServiceClient {
    fn compute(&self, snapshot: &RowSnapshot) -> Result<Vec<(FieldKey, f64)>, FetchError> {
        self.calculate(snapshot).map_err(FetchError::from)
    }
}

impl PersistenceLayer for BudgetServiceClient {
    fn save(&self, rows: &[RowSnapshot]) -> Result<SaveReport, FetchError> {
        self.save_batch(rows).map_err(FetchError::from)
    }
}
