use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Store '{store_id}' assigned to both '{first}' and '{second}'")]
    ConflictingAssignment {
        store_id: String,
        first: String,
        second: String,
    },

    #[error("No {reference} resolvable for store '{store_id}', feature '{feature_id}'")]
    MissingReferenceData {
        store_id: String,
        feature_id: String,
        reference: &'static str,
    },

    #[error("Sell-through predictor unavailable: {reason}")]
    PredictorUnavailable { reason: String },

    #[error("Sell-through predictor degraded: fallback rate {fallback_rate:.3} exceeds limit {limit:.3}")]
    PredictorDegraded { fallback_rate: f64, limit: f64 },

    #[error("Validation failed: {}", problems.join("; "))]
    ValidationFailure { problems: Vec<String> },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type PipelineResult<T> = Result<T, PipelineError>;
