//! Opportunity detection: where peers sell and the store does not.
//!
//! For each well-selling (group, feature) pair this stage:
//!   1. Finds group members with no positive sales of the feature
//!   2. Estimates expected sales from the selling peers
//!      (trim to a percentile band, median, cap at a percentile)
//!   3. Resolves a unit price: own history, then peer median, else skip
//!   4. Derives the one recommended quantity every later stage reuses
//!
//! The recommended quantity computed here is the ONLY quantity in the
//! pipeline. Profitability scoring must never derive its own.

use crate::{
    adoption::{AdoptionRecord, AdoptionTable},
    config::ExpectedSalesConfig,
    dataset::{PeerGroups, ReferenceIndex, SalesIndex},
    error::{PipelineError, PipelineResult},
    event::{PipelineEvent, Stage},
    rejection::{Rejection, RejectionReason},
    stats,
    types::{FeatureId, PeerGroupId, StoreId},
};
use serde::{Deserialize, Serialize};

// ── Public types ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PriceSource {
    StoreHistory,
    PeerGroupMedian,
}

impl PriceSource {
    pub fn name(&self) -> &'static str {
        match self {
            Self::StoreHistory => "store_history",
            Self::PeerGroupMedian => "peer_group_median",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "store_history" => Some(Self::StoreHistory),
            "peer_group_median" => Some(Self::PeerGroupMedian),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CostSource {
    StoreMargin,
    PeerGroupMargin,
}

impl CostSource {
    pub fn name(&self) -> &'static str {
        match self {
            Self::StoreMargin => "store_margin",
            Self::PeerGroupMargin => "peer_group_margin",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "store_margin" => Some(Self::StoreMargin),
            "peer_group_margin" => Some(Self::PeerGroupMargin),
            _ => None,
        }
    }
}

/// A candidate recommendation. Created by detection, enriched in place
/// by the sell-through and profitability stages.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Opportunity {
    pub store_id: StoreId,
    pub peer_group_id: PeerGroupId,
    pub feature_id: FeatureId,
    // Detection
    pub expected_sales: f64,
    pub unit_price: f64,
    pub price_source: PriceSource,
    pub recommended_quantity: u64,
    pub n_comparables: usize,
    // Sell-through
    pub predicted_sell_through: Option<f64>,
    pub used_fallback: bool,
    pub approved: bool,
    // Profitability
    pub unit_cost: Option<f64>,
    pub cost_source: Option<CostSource>,
    pub margin_per_unit: Option<f64>,
    pub margin_uplift: Option<f64>,
    pub investment_required: Option<f64>,
    pub roi: Option<f64>,
}

impl Opportunity {
    pub fn rejection(&self, stage: Stage, reasons: Vec<RejectionReason>, detail: String) -> Rejection {
        Rejection {
            store_id: self.store_id.clone(),
            peer_group_id: self.peer_group_id.clone(),
            feature_id: self.feature_id.clone(),
            stage,
            reasons,
            detail,
        }
    }
}

/// max(1, ceil(expected_sales / unit_price)).
pub fn recommended_quantity(expected_sales: f64, unit_price: f64) -> u64 {
    let raw = (expected_sales / unit_price).ceil();
    if raw.is_finite() && raw >= 1.0 {
        raw as u64
    } else {
        1
    }
}

#[derive(Debug, Default)]
pub struct DetectionOutcome {
    pub opportunities: Vec<Opportunity>,
    pub rejections: Vec<Rejection>,
    pub events: Vec<PipelineEvent>,
}

// ── Detector ─────────────────────────────────────────────────────────────────

pub struct OpportunityDetector<'a> {
    expected_sales: &'a ExpectedSalesConfig,
    strict: bool,
}

impl<'a> OpportunityDetector<'a> {
    pub fn new(expected_sales: &'a ExpectedSalesConfig, strict: bool) -> Self {
        Self {
            expected_sales,
            strict,
        }
    }

    pub fn detect(
        &self,
        adoption: &AdoptionTable,
        groups: &PeerGroups,
        sales: &SalesIndex,
        reference: &ReferenceIndex,
    ) -> PipelineResult<DetectionOutcome> {
        let mut outcome = DetectionOutcome::default();

        for record in adoption.well_selling() {
            self.detect_for_pair(record, groups, sales, reference, &mut outcome)?;
        }

        Ok(outcome)
    }

    fn detect_for_pair(
        &self,
        record: &AdoptionRecord,
        groups: &PeerGroups,
        sales: &SalesIndex,
        reference: &ReferenceIndex,
        outcome: &mut DetectionOutcome,
    ) -> PipelineResult<()> {
        let Some(members) = groups.members(&record.peer_group_id) else {
            return Ok(());
        };
        let feature = record.feature_id.as_str();

        let (selling, missing): (Vec<&StoreId>, Vec<&StoreId>) = members
            .iter()
            .partition(|store_id| sales.is_selling(store_id, feature));

        if missing.is_empty() {
            return Ok(());
        }

        let peer_amounts: Vec<f64> = selling
            .iter()
            .filter_map(|store_id| sales.get(store_id, feature))
            .map(|s| s.amount)
            .collect();

        let cfg = self.expected_sales;
        let Some(expected_sales) = stats::trimmed_capped_median(
            &peer_amounts,
            cfg.trim_lower_percentile,
            cfg.trim_upper_percentile,
            cfg.cap_percentile,
        ) else {
            return Ok(());
        };

        let peer_median_price = {
            let peer_prices: Vec<f64> = members
                .iter()
                .filter_map(|store_id| reference.store_price(store_id, feature))
                .collect();
            stats::median_sorted(&stats::sorted_finite(&peer_prices))
        };

        for store_id in missing {
            let resolved = reference
                .store_price(store_id, feature)
                .map(|p| (p, PriceSource::StoreHistory))
                .or_else(|| peer_median_price.map(|p| (p, PriceSource::PeerGroupMedian)));

            let Some((unit_price, price_source)) = resolved else {
                if self.strict {
                    return Err(PipelineError::MissingReferenceData {
                        store_id: store_id.clone(),
                        feature_id: record.feature_id.clone(),
                        reference: "unit price",
                    });
                }
                log::warn!(
                    "opportunity_detection: no price for {store_id}/{feature}, candidate skipped"
                );
                outcome.events.push(PipelineEvent::CandidateSkipped {
                    stage: Stage::OpportunityDetection,
                    store_id: store_id.clone(),
                    feature_id: record.feature_id.clone(),
                    reason: RejectionReason::MissingPrice.code().into(),
                });
                outcome.rejections.push(Rejection {
                    store_id: store_id.clone(),
                    peer_group_id: record.peer_group_id.clone(),
                    feature_id: record.feature_id.clone(),
                    stage: Stage::OpportunityDetection,
                    reasons: vec![RejectionReason::MissingPrice],
                    detail: "no store history and no peer-group price".into(),
                });
                continue;
            };

            outcome.opportunities.push(Opportunity {
                store_id: store_id.clone(),
                peer_group_id: record.peer_group_id.clone(),
                feature_id: record.feature_id.clone(),
                expected_sales,
                unit_price,
                price_source,
                recommended_quantity: recommended_quantity(expected_sales, unit_price),
                n_comparables: peer_amounts.len(),
                predicted_sell_through: None,
                used_fallback: false,
                approved: false,
                unit_cost: None,
                cost_source: None,
                margin_per_unit: None,
                margin_uplift: None,
                investment_required: None,
                roi: None,
            });
        }

        Ok(())
    }
}
