//! Per-store rollup of retained opportunities.
//!
//! Exactly one row per store in the evaluated universe, in store-id
//! order. Stores with nothing retained still get an all-zero row.

use crate::{
    dataset::PeerGroups,
    opportunity::Opportunity,
    types::{FeatureId, PeerGroupId, StoreId},
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoreSummary {
    pub store_id: StoreId,
    pub peer_group_id: PeerGroupId,
    pub opportunity_count: usize,
    pub total_recommended_quantity: u64,
    pub total_investment_required: f64,
    pub average_predicted_sell_through: f64,
    pub distinct_feature_count: usize,
    pub total_expected_sales: f64,
    pub total_margin_uplift: f64,
}

impl StoreSummary {
    pub fn zero(store_id: &str, peer_group_id: &str) -> Self {
        Self {
            store_id: store_id.to_string(),
            peer_group_id: peer_group_id.to_string(),
            opportunity_count: 0,
            total_recommended_quantity: 0,
            total_investment_required: 0.0,
            average_predicted_sell_through: 0.0,
            distinct_feature_count: 0,
            total_expected_sales: 0.0,
            total_margin_uplift: 0.0,
        }
    }
}

pub struct StoreAggregator;

impl StoreAggregator {
    pub fn aggregate(groups: &PeerGroups, retained: &[Opportunity]) -> Vec<StoreSummary> {
        let mut by_store: BTreeMap<&str, Vec<&Opportunity>> = BTreeMap::new();
        for opp in retained {
            by_store.entry(opp.store_id.as_str()).or_default().push(opp);
        }

        groups
            .stores()
            .map(|(store_id, group_id)| {
                let mut summary = StoreSummary::zero(store_id, group_id);
                let Some(opps) = by_store.get(store_id.as_str()) else {
                    return summary;
                };

                let features: BTreeSet<&FeatureId> = opps.iter().map(|o| &o.feature_id).collect();
                let sell_through_sum: f64 = opps
                    .iter()
                    .map(|o| o.predicted_sell_through.unwrap_or(0.0))
                    .sum();

                summary.opportunity_count = opps.len();
                summary.total_recommended_quantity = opps
                    .iter()
                    .try_fold(0u64, |acc, o| acc.checked_add(o.recommended_quantity))
                    .unwrap_or(u64::MAX);
                summary.total_investment_required = opps
                    .iter()
                    .map(|o| o.investment_required.unwrap_or(0.0))
                    .sum();
                summary.average_predicted_sell_through = sell_through_sum / opps.len() as f64;
                summary.distinct_feature_count = features.len();
                summary.total_expected_sales = opps.iter().map(|o| o.expected_sales).sum();
                summary.total_margin_uplift = opps
                    .iter()
                    .map(|o| o.margin_uplift.unwrap_or(0.0))
                    .sum();
                summary
            })
            .collect()
    }
}
