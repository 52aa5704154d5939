//! Wire types for the budget service API.
//!
//! Conversions between engine data and DTOs live here so the client code
//! is only transport plumbing.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use planbook_core::{FieldKey, FieldValue, OptionItem};
use planbook_engine::row::RowId;
use planbook_engine::sources::{OptionFilters, RowSnapshot, SaveReport};

/// One option list entry as the service sends it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptionDto {
    pub value: String,
    pub label: String,
}

impl From<OptionDto> for OptionItem {
    fn from(dto: OptionDto) -> Self {
        OptionItem::new(dto.value, dto.label)
    }
}

/// One upstream filter parameter of an option lookup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterDto {
    pub field: String,
    pub value: String,
}

/// Body of an option lookup.
#[derive(Debug, Clone, Serialize)]
pub struct OptionsRequest {
    pub field: String,
    pub filters: Vec<FilterDto>,
}

impl OptionsRequest {
    pub fn new(field: &FieldKey, filters: &OptionFilters) -> Self {
        Self {
            field: field.to_string(),
            filters: filters
                .iter()
                .map(|(key, value)| FilterDto {
                    field: key.to_string(),
                    value: value.display(),
                })
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct OptionsResponse {
    pub options: Vec<OptionDto>,
}

/// One field of a row on the wire. Exactly one of `text`/`amount` is set;
/// empty fields are omitted from the row entirely.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDto {
    pub field: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount: Option<f64>,
}

/// A full row on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowDto {
    pub row: u64,
    pub company: String,
    pub fields: Vec<FieldDto>,
}

impl From<&RowSnapshot> for RowDto {
    fn from(snapshot: &RowSnapshot) -> Self {
        let fields = snapshot
            .values
            .iter()
            .filter_map(|(key, value)| match value {
                FieldValue::Empty => None,
                FieldValue::Text(s) => Some(FieldDto {
                    field: key.to_string(),
                    text: Some(s.clone()),
                    amount: None,
                }),
                FieldValue::Number(n) => Some(FieldDto {
                    field: key.to_string(),
                    text: None,
                    amount: Some(*n),
                }),
            })
            .collect();

        Self {
            row: snapshot.row.raw(),
            company: snapshot.company.clone(),
            fields,
        }
    }
}

/// One computed benefit amount.
#[derive(Debug, Clone, Deserialize)]
pub struct AmountDto {
    pub field: String,
    pub amount: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CalculateResponse {
    pub amounts: Vec<AmountDto>,
}

/// Body of a batch save.
#[derive(Debug, Clone, Serialize)]
pub struct SaveRequest {
    pub saved_at: DateTime<Utc>,
    pub rows: Vec<RowDto>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FailedRowDto {
    pub row: u64,
    pub reason: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SaveResponse {
    #[serde(default)]
    pub succeeded: Vec<u64>,
    #[serde(default)]
    pub failed: Vec<FailedRowDto>,
}

impl From<SaveResponse> for SaveReport {
    fn from(resp: SaveResponse) -> Self {
        SaveReport {
            succeeded: resp.succeeded.into_iter().map(RowId::from_raw).collect(),
            failed: resp
                .failed
                .into_iter()
                .map(|f| (RowId::from_raw(f.row), f.reason))
                .collect(),
        }
    }
}
