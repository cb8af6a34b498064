//! Structured records of candidates that did not survive the pipeline.
//!
//! Keeping rejections separates "no gap existed" from "a gap existed
//! but was filtered out". Reasons are audit data; no stage branches on
//! them.

use crate::{
    event::Stage,
    types::{FeatureId, PeerGroupId, StoreId},
};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum RejectionReason {
    MissingPrice,
    MissingCost,
    MissingAdoptionStats,
    LowPredictedSellThrough,
    LowAdoptionRate,
    TooFewStoresSelling,
    LowRoi,
    LowMarginUplift,
    TooFewComparables,
}

impl RejectionReason {
    pub fn code(&self) -> &'static str {
        match self {
            Self::MissingPrice => "missing_price",
            Self::MissingCost => "missing_cost",
            Self::MissingAdoptionStats => "missing_adoption_stats",
            Self::LowPredictedSellThrough => "low_predicted_sell_through",
            Self::LowAdoptionRate => "low_adoption_rate",
            Self::TooFewStoresSelling => "too_few_stores_selling",
            Self::LowRoi => "low_roi",
            Self::LowMarginUplift => "low_margin_uplift",
            Self::TooFewComparables => "too_few_comparables",
        }
    }
}

impl fmt::Display for RejectionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Rejection {
    pub store_id: StoreId,
    pub peer_group_id: PeerGroupId,
    pub feature_id: FeatureId,
    pub stage: Stage,
    pub reasons: Vec<RejectionReason>,
    /// Human-readable values behind the failed gates.
    pub detail: String,
}

impl Rejection {
    pub fn reason_codes(&self) -> String {
        self.reasons
            .iter()
            .map(RejectionReason::code)
            .collect::<Vec<_>>()
            .join(",")
    }
}
