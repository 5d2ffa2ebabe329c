use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FlashReportError {
    #[error("Dataset '{dataset}' is missing required columns {missing:?} (suggestions: {suggestions:?})")]
    SchemaResolution {
        dataset: String,
        missing: Vec<String>,
        suggestions: BTreeMap<String, Vec<String>>,
    },

    #[error("No reporting calendar entry for {region} on {date}; the run must happen on a valid reporting date")]
    CalendarLookup { region: String, date: NaiveDate },

    #[error("Sheet '{sheet}' not found in workbook '{workbook}'")]
    MissingSheet { workbook: String, sheet: String },

    #[error("Workbook '{0}' not found")]
    MissingWorkbook(String),

    #[error("Invalid fiscal month {0}: expected YYYYMM")]
    InvalidFiscalMonth(String),

    #[error("Date calculation error: {0}")]
    DateError(String),

    #[error("Report verification failed for {context}: {details}")]
    Verification { context: String, details: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, FlashReportError>;

/// Recoverable conditions. Logged when raised and carried on the run result,
/// never fatal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Diagnostic {
    /// Duplicate aggregation keys, missing optional columns, empty subsets.
    DataShape { context: String, detail: String },
    /// A non-numeric value in a monetary or id column, coerced to missing.
    NumericCoercion {
        dataset: String,
        column: String,
        row: usize,
        value: String,
    },
}

impl Diagnostic {
    pub fn data_shape(context: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::DataShape {
            context: context.into(),
            detail: detail.into(),
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DataShape { context, detail } => write!(f, "{context}: {detail}"),
            Self::NumericCoercion {
                dataset,
                column,
                row,
                value,
            } => write!(
                f,
                "{dataset}: row {row} column '{column}' has non-numeric value '{value}', treated as missing"
            ),
        }
    }
}
