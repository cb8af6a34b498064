//! Peer adoption analysis.
//!
//! For every (peer group, feature) pair seen in the sales index this
//! stage measures how many group members sell the feature and how much
//! the group sells in total, then flags well-selling pairs.
//!
//! Groups with fewer than two members are skipped silently: a single
//! store has no peers to learn from.

use crate::{
    config::AdoptionThresholds,
    dataset::{PeerGroups, SalesIndex},
    types::{FeatureId, PeerGroupId},
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

pub const MIN_PEER_GROUP_SIZE: usize = 2;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AdoptionRecord {
    pub peer_group_id: PeerGroupId,
    pub feature_id: FeatureId,
    pub stores_selling: usize,
    pub peer_group_size: usize,
    pub adoption_rate: f64,
    pub total_sales: f64,
    pub well_selling: bool,
}

/// Adoption statistics for every evaluated pair, keyed for lookup.
#[derive(Debug, Clone, Default, Serialize)]
pub struct AdoptionTable {
    records: Vec<AdoptionRecord>,
    #[serde(skip)]
    by_key: BTreeMap<(PeerGroupId, FeatureId), usize>,
}

impl AdoptionTable {
    fn from_records(records: Vec<AdoptionRecord>) -> Self {
        let by_key = records
            .iter()
            .enumerate()
            .map(|(i, r)| ((r.peer_group_id.clone(), r.feature_id.clone()), i))
            .collect();
        Self { records, by_key }
    }

    pub fn records(&self) -> &[AdoptionRecord] {
        &self.records
    }

    pub fn well_selling(&self) -> impl Iterator<Item = &AdoptionRecord> {
        self.records.iter().filter(|r| r.well_selling)
    }

    pub fn get(&self, peer_group_id: &str, feature_id: &str) -> Option<&AdoptionRecord> {
        self.by_key
            .get(&(peer_group_id.to_string(), feature_id.to_string()))
            .map(|&i| &self.records[i])
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

pub struct PeerAdoptionAnalyzer<'a> {
    thresholds: &'a AdoptionThresholds,
}

impl<'a> PeerAdoptionAnalyzer<'a> {
    pub fn new(thresholds: &'a AdoptionThresholds) -> Self {
        Self { thresholds }
    }

    pub fn analyze(&self, groups: &PeerGroups, sales: &SalesIndex) -> AdoptionTable {
        #[derive(Default)]
        struct PairAccumulator {
            sellers: BTreeSet<String>,
            total_sales: f64,
        }

        let mut pairs: BTreeMap<(PeerGroupId, FeatureId), PairAccumulator> = BTreeMap::new();
        let mut degenerate: BTreeSet<&PeerGroupId> = BTreeSet::new();

        for ((store_id, feature_id), totals) in sales.iter() {
            let Some(group_id) = groups.group_of(store_id) else {
                continue;
            };
            if groups.group_size(group_id) < MIN_PEER_GROUP_SIZE {
                degenerate.insert(group_id);
                continue;
            }
            let acc = pairs
                .entry((group_id.clone(), feature_id.clone()))
                .or_default();
            acc.total_sales += totals.amount;
            if totals.amount > 0.0 {
                acc.sellers.insert(store_id.clone());
            }
        }

        for group_id in degenerate {
            log::debug!("peer_adoption: group {group_id} has fewer than {MIN_PEER_GROUP_SIZE} stores, skipped");
        }

        let records = pairs
            .into_iter()
            .map(|((peer_group_id, feature_id), acc)| {
                let peer_group_size = groups.group_size(&peer_group_id);
                let stores_selling = acc.sellers.len();
                let adoption_rate = stores_selling as f64 / peer_group_size as f64;
                let well_selling = adoption_rate >= self.thresholds.adoption_rate
                    && acc.total_sales >= self.thresholds.sales_volume;
                AdoptionRecord {
                    peer_group_id,
                    feature_id,
                    stores_selling,
                    peer_group_size,
                    adoption_rate,
                    total_sales: acc.total_sales,
                    well_selling,
                }
            })
            .collect();

        AdoptionTable::from_records(records)
    }
}
