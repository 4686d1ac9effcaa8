use thiserror::Error;

#[derive(Error, Debug)]
pub enum RiskError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("{kind} '{id}' not found")]
    NotFound { kind: &'static str, id: String },

    #[error("Classifier unavailable: {0}")]
    ClassifierUnavailable(String),

    #[error("Report filing against '{target}' failed: {reason}")]
    ReportFiling { target: String, reason: String },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl RiskError {
    pub fn validation(field: impl Into<String>, reason: impl Into<String>) -> Self {
        RiskError::Validation { field: field.into(), reason: reason.into() }
    }

    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        RiskError::NotFound { kind, id: id.into() }
    }
}

pub type RiskResult<T> = Result<T, RiskError>;
