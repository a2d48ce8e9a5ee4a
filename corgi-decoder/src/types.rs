//! Core types for the VIN decoder library
//!
//! This module defines the result aggregate returned by every decode call, the
//! per-VIN error records embedded in it, and the infrastructure error type that
//! fails a call outright.

use crate::acquire::AcquireError;
use crate::vin::model_year::YearSource;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Timestamp type used in result metadata
pub type Timestamp = DateTime<Utc>;

/// Result type for decoder operations
pub type Result<T> = std::result::Result<T, Error>;

/// Enumerated error codes, shared by embedded errors and infrastructure failures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    InvalidLength,
    InvalidCharacters,
    InvalidCheckDigit,
    WmiNotFound,
    PatternNotFound,
    DatasetUnavailable,
    DownloadFailed,
    BackendUnavailable,
}

impl ErrorCode {
    /// Category this code belongs to
    pub fn category(&self) -> ErrorCategory {
        match self {
            ErrorCode::InvalidLength | ErrorCode::InvalidCharacters => ErrorCategory::Structural,
            ErrorCode::InvalidCheckDigit | ErrorCode::WmiNotFound | ErrorCode::PatternNotFound => {
                ErrorCategory::Semantic
            }
            ErrorCode::DatasetUnavailable
            | ErrorCode::DownloadFailed
            | ErrorCode::BackendUnavailable => ErrorCategory::Infrastructure,
        }
    }

    /// Wire name, e.g. `INVALID_CHECK_DIGIT`
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::InvalidLength => "INVALID_LENGTH",
            ErrorCode::InvalidCharacters => "INVALID_CHARACTERS",
            ErrorCode::InvalidCheckDigit => "INVALID_CHECK_DIGIT",
            ErrorCode::WmiNotFound => "WMI_NOT_FOUND",
            ErrorCode::PatternNotFound => "PATTERN_NOT_FOUND",
            ErrorCode::DatasetUnavailable => "DATASET_UNAVAILABLE",
            ErrorCode::DownloadFailed => "DOWNLOAD_FAILED",
            ErrorCode::BackendUnavailable => "BACKEND_UNAVAILABLE",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error taxonomy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorCategory {
    /// Malformed input - decoding stops for this VIN
    Structural,
    /// Well-formed VIN the dataset disagrees with - decoding continues
    Semantic,
    /// Environment failure - the call itself fails
    Infrastructure,
}

/// Whether an embedded error invalidates the result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
}

/// A structural or semantic problem recorded in `DecodeResult::errors`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecodeError {
    pub code: ErrorCode,
    pub category: ErrorCategory,
    pub severity: Severity,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actual: Option<String>,
}

impl DecodeError {
    /// Create an error-severity record; the category follows from the code
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            category: code.category(),
            severity: Severity::Error,
            message: message.into(),
            expected: None,
            actual: None,
        }
    }

    /// Builder method: attach expected/actual values
    pub fn with_values(mut self, expected: impl Into<String>, actual: impl Into<String>) -> Self {
        self.expected = Some(expected.into());
        self.actual = Some(actual.into());
        self
    }

    /// Builder method: downgrade to a warning
    pub fn as_warning(mut self) -> Self {
        self.severity = Severity::Warning;
        self
    }

    pub fn is_structural(&self) -> bool {
        self.category == ErrorCategory::Structural
    }
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

/// Infrastructure failures - these fail the call instead of being embedded
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Acquire(#[from] AcquireError),

    #[error("Failed to open dataset {path}: {reason}")]
    StoreOpen { path: String, reason: String },

    #[error("Dataset query failed: {0}")]
    Query(String),

    #[error("Backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Decoder has been closed")]
    Closed,

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl Error {
    /// Infrastructure errors never carry another category
    pub fn category(&self) -> ErrorCategory {
        ErrorCategory::Infrastructure
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            Error::Acquire(AcquireError::Download { .. })
            | Error::Acquire(AcquireError::HttpStatus { .. })
            | Error::Acquire(AcquireError::RedirectLimit { .. }) => ErrorCode::DownloadFailed,
            Error::Acquire(_) | Error::StoreOpen { .. } | Error::IoError(_) => {
                ErrorCode::DatasetUnavailable
            }
            Error::Query(_)
            | Error::BackendUnavailable(_)
            | Error::Sqlite(_)
            | Error::Closed
            | Error::InvalidConfig(_) => ErrorCode::BackendUnavailable,
        }
    }
}

/// The immutable output of one decode call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecodeResult {
    pub vin: String,
    pub valid: bool,
    pub components: Components,
    pub errors: Vec<DecodeError>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patterns: Option<Vec<PatternMatch>>,
}

impl DecodeResult {
    /// Shortcut for `components.vehicle.make`
    pub fn make(&self) -> Option<&str> {
        self.components.vehicle.as_ref()?.make.as_deref()
    }

    /// Shortcut for `components.vehicle.model`
    pub fn model(&self) -> Option<&str> {
        self.components.vehicle.as_ref()?.model.as_deref()
    }

    /// Shortcut for `components.vehicle.year`
    pub fn year(&self) -> Option<u16> {
        self.components.vehicle.as_ref()?.year
    }

    /// True if an error with the given code was recorded
    pub fn has_error(&self, code: ErrorCode) -> bool {
        self.errors.iter().any(|e| e.code == code)
    }
}

/// Decoded sections of the VIN; each is present only when something was decoded
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Components {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vehicle: Option<VehicleInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wmi: Option<WmiInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plant: Option<PlantInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub engine: Option<EngineInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_year: Option<ModelYearInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub check_digit: Option<CheckDigitInfo>,
}

impl Components {
    pub fn is_empty(&self) -> bool {
        self == &Components::default()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VehicleInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub make: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub series: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trim: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body_style: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub drive_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doors: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fuel_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vehicle_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gvwr: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cab: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bed_length: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wheelbase: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WmiInfo {
    pub code: String,
    pub manufacturer: String,
    pub make: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vehicle_type: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlantInfo {
    /// VIN position 11
    pub code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cylinders: Option<u8>,
    /// Displacement in liters
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub displacement: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fuel: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub horsepower: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub configuration: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelYearInfo {
    pub year: u16,
    pub source: YearSource,
    pub confidence: f64,
    /// Both era readings of position 10, older first
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub candidates: Vec<u16>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckDigitInfo {
    pub position: u8,
    pub actual: String,
    pub expected: String,
    pub is_valid: bool,
}

/// Result metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Metadata {
    /// Overall confidence, 0-1
    pub confidence: f64,
    pub processing_time_ms: f64,
    pub timestamp: Timestamp,
    pub decoder_version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dataset_vintage: Option<String>,
    /// Fields decoded but withheld by the confidence threshold
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub withheld_fields: Vec<String>,
    /// Pre-normalization values keyed by element (`include_raw_data`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_data: Option<BTreeMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diagnostics: Option<Diagnostics>,
}

/// Extra detail attached with `include_diagnostics`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Diagnostics {
    pub backend: String,
    pub candidate_count: usize,
    pub field_confidence: BTreeMap<String, f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wmi_match: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub year_candidates: Vec<u16>,
}

/// One matched rule, exposed with `include_pattern_details`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatternMatch {
    pub element: String,
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value_id: Option<String>,
    pub pattern: String,
    pub specificity: usize,
    pub priority: i32,
    pub confidence: f64,
    pub winner: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year_from: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year_to: Option<u16>,
}
