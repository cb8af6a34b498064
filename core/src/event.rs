//! The audit trail of a pipeline run.
//!
//! RULE: Events are for audit only. No stage reads another stage's
//! events to make a decision.

use crate::types::{FeatureId, StoreId};
use serde::{Deserialize, Serialize};

/// Pipeline stages in their fixed execution order.
/// NEVER reorder. Persisted audit rows reference these names.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    PeerAdoption,
    OpportunityDetection,
    SellThrough,
    Profitability,
    StoreAggregation,
}

impl Stage {
    pub fn name(&self) -> &'static str {
        match self {
            Self::PeerAdoption => "peer_adoption",
            Self::OpportunityDetection => "opportunity_detection",
            Self::SellThrough => "sell_through",
            Self::Profitability => "profitability",
            Self::StoreAggregation => "store_aggregation",
        }
    }
}

/// Every event emitted during a run, in emission order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PipelineEvent {
    RunStarted {
        granularity: String,
        stores: usize,
        sales_records: usize,
    },
    StageCompleted {
        stage: Stage,
        rows_in: usize,
        rows_out: usize,
    },
    CandidateSkipped {
        stage: Stage,
        store_id: StoreId,
        feature_id: FeatureId,
        reason: String,
    },
    FallbackPredictionUsed {
        store_id: StoreId,
        feature_id: FeatureId,
        predictor: String,
        fallback_value: f64,
    },
    RunCompleted {
        retained: usize,
        rejected: usize,
    },
}

impl PipelineEvent {
    /// Stable name for the event_type column in event_log.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::RunStarted { .. } => "run_started",
            Self::StageCompleted { .. } => "stage_completed",
            Self::CandidateSkipped { .. } => "candidate_skipped",
            Self::FallbackPredictionUsed { .. } => "fallback_prediction_used",
            Self::RunCompleted { .. } => "run_completed",
        }
    }

    /// The stage an event belongs to, or "engine" for run-level events.
    pub fn stage_name(&self) -> &'static str {
        match self {
            Self::StageCompleted { stage, .. } | Self::CandidateSkipped { stage, .. } => {
                stage.name()
            }
            Self::FallbackPredictionUsed { .. } => Stage::SellThrough.name(),
            Self::RunStarted { .. } | Self::RunCompleted { .. } => "engine",
        }
    }
}

/// The event log entry as persisted to SQLite.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventLogEntry {
    pub id: Option<i64>,
    pub run_id: String,
    pub seq: u64,
    pub stage: String,
    pub event_type: String,
    pub payload: String, // JSON-serialized PipelineEvent
}
