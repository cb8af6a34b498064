//! Input tables and the read-only indexes built over them.
//!
//! RULE: Indexes are built once per run and never mutated afterwards.
//! Every map that can influence output order is a BTreeMap, so the
//! same inputs always produce the same row order.

use crate::{
    config::{Granularity, ObservationWindow},
    error::{PipelineError, PipelineResult},
    types::{FeatureId, PeerGroupId, StoreId},
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

// ── Input rows ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SalesRecord {
    pub store_id: StoreId,
    pub category: String,
    #[serde(default)]
    pub subcategory: Option<String>,
    #[serde(default)]
    pub sku: Option<String>,
    pub amount: f64,
    pub quantity: f64,
    pub period: NaiveDate,
}

impl SalesRecord {
    /// The feature key at `granularity`, if the record carries one.
    pub fn feature_key(&self, granularity: Granularity) -> Option<&str> {
        match granularity {
            Granularity::Category => Some(self.category.as_str()),
            Granularity::Subcategory => self.subcategory.as_deref(),
            Granularity::Sku => self.sku.as_deref(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreAssignment {
    pub store_id: StoreId,
    pub peer_group_id: PeerGroupId,
}

/// Historical price observation for a (store, feature) pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceRecord {
    pub store_id: StoreId,
    pub feature_id: FeatureId,
    pub total_amount: f64,
    pub total_quantity: f64,
}

impl PriceRecord {
    pub fn average_price(&self) -> Option<f64> {
        if self.total_quantity <= 0.0 {
            return None;
        }
        let price = self.total_amount / self.total_quantity;
        (price.is_finite() && price > 0.0).then_some(price)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "level", content = "id", rename_all = "snake_case")]
pub enum MarginScope {
    Store(StoreId),
    PeerGroup(PeerGroupId),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarginRecord {
    pub scope: MarginScope,
    pub feature_id: FeatureId,
    /// Gross margin as a fraction of unit price.
    pub margin_rate: f64,
}

impl MarginRecord {
    /// A rate in [0, 1) yields a positive unit cost.
    pub fn usable_rate(&self) -> bool {
        (0.0..1.0).contains(&self.margin_rate)
    }
}

/// Everything the pipeline reads. Owned by the ingestion layer.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Dataset {
    pub sales: Vec<SalesRecord>,
    pub assignments: Vec<StoreAssignment>,
    pub prices: Vec<PriceRecord>,
    pub margins: Vec<MarginRecord>,
}

impl Dataset {
    /// Load the four input tables from JSON files in `data_dir`.
    pub fn load(data_dir: &str) -> anyhow::Result<Self> {
        Ok(Self {
            sales: read_table(data_dir, "sales.json")?,
            assignments: read_table(data_dir, "assignments.json")?,
            prices: read_table(data_dir, "prices.json")?,
            margins: read_table(data_dir, "margins.json")?,
        })
    }
}

fn read_table<T: serde::de::DeserializeOwned>(data_dir: &str, file: &str) -> anyhow::Result<Vec<T>> {
    let path = format!("{data_dir}/{file}");
    let content =
        std::fs::read_to_string(&path).map_err(|e| anyhow::anyhow!("Cannot read {path}: {e}"))?;
    let rows = serde_json::from_str(&content)
        .map_err(|e| anyhow::anyhow!("Cannot parse {path}: {e}"))?;
    Ok(rows)
}

// ── Peer groups ────────────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
pub struct PeerGroups {
    store_group: BTreeMap<StoreId, PeerGroupId>,
    members: BTreeMap<PeerGroupId, BTreeSet<StoreId>>,
}

impl PeerGroups {
    pub fn build(assignments: &[StoreAssignment]) -> PipelineResult<Self> {
        let mut groups = Self::default();
        for a in assignments {
            if let Some(existing) = groups.store_group.get(&a.store_id) {
                if existing != &a.peer_group_id {
                    return Err(PipelineError::ConflictingAssignment {
                        store_id: a.store_id.clone(),
                        first: existing.clone(),
                        second: a.peer_group_id.clone(),
                    });
                }
                continue;
            }
            groups
                .store_group
                .insert(a.store_id.clone(), a.peer_group_id.clone());
            groups
                .members
                .entry(a.peer_group_id.clone())
                .or_default()
                .insert(a.store_id.clone());
        }
        Ok(groups)
    }

    pub fn group_of(&self, store_id: &str) -> Option<&PeerGroupId> {
        self.store_group.get(store_id)
    }

    pub fn members(&self, group_id: &str) -> Option<&BTreeSet<StoreId>> {
        self.members.get(group_id)
    }

    pub fn group_size(&self, group_id: &str) -> usize {
        self.members.get(group_id).map_or(0, BTreeSet::len)
    }

    /// All stores in the evaluated universe, in id order.
    pub fn stores(&self) -> impl Iterator<Item = (&StoreId, &PeerGroupId)> {
        self.store_group.iter()
    }

    pub fn store_count(&self) -> usize {
        self.store_group.len()
    }
}

// ── Sales index ────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FeatureSales {
    pub amount: f64,
    pub quantity: f64,
}

/// Per (store, feature) sales totals inside the observation window.
#[derive(Debug, Clone, Default)]
pub struct SalesIndex {
    totals: BTreeMap<(StoreId, FeatureId), FeatureSales>,
    /// Records dropped because their store has no peer-group assignment.
    pub unassigned_records: usize,
    /// Records dropped because they lack a key at the active granularity.
    pub unkeyed_records: usize,
    /// Records dropped because they fall outside the observation window.
    pub out_of_window_records: usize,
}

impl SalesIndex {
    pub fn build(
        sales: &[SalesRecord],
        groups: &PeerGroups,
        granularity: Granularity,
        window: Option<&ObservationWindow>,
    ) -> Self {
        let mut index = Self::default();
        for record in sales {
            if window.is_some_and(|w| !w.contains(record.period)) {
                index.out_of_window_records += 1;
                continue;
            }
            let Some(feature) = record.feature_key(granularity) else {
                index.unkeyed_records += 1;
                continue;
            };
            if groups.group_of(&record.store_id).is_none() {
                index.unassigned_records += 1;
                continue;
            }
            let entry = index
                .totals
                .entry((record.store_id.clone(), feature.to_string()))
                .or_default();
            entry.amount += record.amount;
            entry.quantity += record.quantity;
        }
        index
    }

    pub fn get(&self, store_id: &str, feature_id: &str) -> Option<FeatureSales> {
        self.totals
            .get(&(store_id.to_string(), feature_id.to_string()))
            .copied()
    }

    /// True when the store has positive sales of the feature.
    pub fn is_selling(&self, store_id: &str, feature_id: &str) -> bool {
        self.get(store_id, feature_id)
            .is_some_and(|s| s.amount > 0.0)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&(StoreId, FeatureId), &FeatureSales)> {
        self.totals.iter()
    }
}

// ── Reference data ─────────────────────────────────────────────────

/// Price and margin lookups used by the resolution cascades.
#[derive(Debug, Clone, Default)]
pub struct ReferenceIndex {
    prices: BTreeMap<(StoreId, FeatureId), f64>,
    store_margins: BTreeMap<(StoreId, FeatureId), f64>,
    group_margins: BTreeMap<(PeerGroupId, FeatureId), f64>,
}

impl ReferenceIndex {
    pub fn build(prices: &[PriceRecord], margins: &[MarginRecord]) -> Self {
        let mut index = Self::default();
        for p in prices {
            if let Some(price) = p.average_price() {
                index
                    .prices
                    .insert((p.store_id.clone(), p.feature_id.clone()), price);
            }
        }
        for m in margins {
            if !m.usable_rate() {
                log::warn!(
                    "reference: margin rate {} for {:?}/{} outside [0, 1), ignored",
                    m.margin_rate,
                    m.scope,
                    m.feature_id
                );
                continue;
            }
            match &m.scope {
                MarginScope::Store(store_id) => {
                    index
                        .store_margins
                        .insert((store_id.clone(), m.feature_id.clone()), m.margin_rate);
                }
                MarginScope::PeerGroup(group_id) => {
                    index
                        .group_margins
                        .insert((group_id.clone(), m.feature_id.clone()), m.margin_rate);
                }
            }
        }
        index
    }

    pub fn store_price(&self, store_id: &str, feature_id: &str) -> Option<f64> {
        self.prices
            .get(&(store_id.to_string(), feature_id.to_string()))
            .copied()
    }

    pub fn store_margin_rate(&self, store_id: &str, feature_id: &str) -> Option<f64> {
        self.store_margins
            .get(&(store_id.to_string(), feature_id.to_string()))
            .copied()
    }

    pub fn group_margin_rate(&self, group_id: &str, feature_id: &str) -> Option<f64> {
        self.group_margins
            .get(&(group_id.to_string(), feature_id.to_string()))
            .copied()
    }
}
