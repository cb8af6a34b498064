//! Deterministic synthetic datasets for demos and reproducibility tests.
//!
//! RULE: Nothing here may call a platform RNG or read the clock.
//! Every table is derived from one master seed, so the same seed
//! always yields the same dataset.
//!
//! Each table gets its own stream, seeded from
//! (master_seed XOR stream_index * golden ratio), so adding a stream
//! never shifts the values of existing ones.

use crate::dataset::{
    Dataset, MarginRecord, MarginScope, PriceRecord, SalesRecord, StoreAssignment,
};
use chrono::NaiveDate;
use rand::SeedableRng;
use rand_pcg::Pcg64Mcg;

/// A named, deterministic RNG for one synthetic table.
pub struct SyntheticRng {
    pub name: &'static str,
    inner: Pcg64Mcg,
}

impl SyntheticRng {
    pub fn new(master_seed: u64, stream: Stream) -> Self {
        let derived_seed = master_seed ^ ((stream as u64).wrapping_mul(0x9e37_79b9_7f4a_7c15));
        Self {
            name: stream.name(),
            inner: Pcg64Mcg::seed_from_u64(derived_seed),
        }
    }

    /// Roll a float in [0.0, 1.0).
    pub fn next_f64(&mut self) -> f64 {
        use rand::RngCore;
        let bits = self.inner.next_u64();
        (bits >> 11) as f64 * (1.0 / (1u64 << 53) as f64)
    }

    /// Bernoulli trial: returns true with probability p.
    pub fn chance(&mut self, p: f64) -> bool {
        self.next_f64() < p
    }

    /// Uniform float in [lo, hi).
    pub fn range(&mut self, lo: f64, hi: f64) -> f64 {
        lo + (hi - lo) * self.next_f64()
    }

    /// Simplified Pareto draw; gives the occasional flagship store.
    pub fn pareto(&mut self, x_min: f64, alpha: f64) -> f64 {
        let u = self.next_f64().max(1e-10);
        x_min * u.powf(-1.0 / alpha)
    }
}

/// Stable stream assignments.
/// NEVER reorder or remove entries. Append only.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u64)]
pub enum Stream {
    Assignment = 0,
    Sales = 1,
    Prices = 2,
    Margins = 3,
}

impl Stream {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Assignment => "assignment",
            Self::Sales => "sales",
            Self::Prices => "prices",
            Self::Margins => "margins",
        }
    }
}

#[derive(Debug, Clone)]
pub struct SyntheticParams {
    pub peer_groups: usize,
    pub stores_per_group: usize,
    pub categories: Vec<String>,
    /// Per-category probability that a store carries it.
    pub carry_probability: f64,
    /// Probability a store has a historical price for a feature it does
    /// not currently sell.
    pub stale_price_probability: f64,
    pub months: u32,
    pub start: NaiveDate,
}

impl Default for SyntheticParams {
    fn default() -> Self {
        Self {
            peer_groups: 4,
            stores_per_group: 8,
            categories: [
                "Jackets", "Boots", "Knitwear", "Swimwear", "Umbrellas", "Sunglasses",
                "Scarves", "Sandals",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            carry_probability: 0.8,
            stale_price_probability: 0.3,
            months: 3,
            start: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap_or_default(),
        }
    }
}

pub fn generate(seed: u64, params: &SyntheticParams) -> Dataset {
    let mut assign_rng = SyntheticRng::new(seed, Stream::Assignment);
    let mut sales_rng = SyntheticRng::new(seed, Stream::Sales);
    let mut price_rng = SyntheticRng::new(seed, Stream::Prices);
    let mut margin_rng = SyntheticRng::new(seed, Stream::Margins);

    let mut dataset = Dataset::default();

    // Base price per category, shared by every store with small jitter.
    let base_prices: Vec<f64> = params
        .categories
        .iter()
        .map(|_| price_rng.range(15.0, 120.0))
        .collect();

    for g in 0..params.peer_groups {
        let group_id = format!("PG{:02}", g + 1);

        // Group-level appetite per category: some categories are simply
        // not popular in a given climate.
        let appetite: Vec<f64> = params
            .categories
            .iter()
            .map(|_| {
                if assign_rng.chance(0.25) {
                    0.2
                } else {
                    params.carry_probability
                }
            })
            .collect();

        for category in &params.categories {
            dataset.margins.push(MarginRecord {
                scope: MarginScope::PeerGroup(group_id.clone()),
                feature_id: category.clone(),
                margin_rate: margin_rng.range(0.25, 0.55),
            });
        }

        for s in 0..params.stores_per_group {
            let store_id = format!("{group_id}-S{:02}", s + 1);
            dataset.assignments.push(StoreAssignment {
                store_id: store_id.clone(),
                peer_group_id: group_id.clone(),
            });

            // Flagship stores sell several times the typical volume.
            let store_scale = sales_rng.pareto(1.0, 3.0).min(6.0);

            for (c, category) in params.categories.iter().enumerate() {
                let price = base_prices[c] * price_rng.range(0.9, 1.1);
                let carries = sales_rng.chance(appetite[c]);

                if carries {
                    let mut total_amount = 0.0;
                    let mut total_quantity = 0.0;
                    for m in 0..params.months {
                        let units = (sales_rng.range(2.0, 12.0) * store_scale).round();
                        let amount = units * price;
                        total_amount += amount;
                        total_quantity += units;
                        dataset.sales.push(SalesRecord {
                            store_id: store_id.clone(),
                            category: category.clone(),
                            subcategory: None,
                            sku: None,
                            amount,
                            quantity: units,
                            period: params
                                .start
                                .checked_add_months(chrono::Months::new(m))
                                .unwrap_or(params.start),
                        });
                    }
                    dataset.prices.push(PriceRecord {
                        store_id: store_id.clone(),
                        feature_id: category.clone(),
                        total_amount,
                        total_quantity,
                    });
                } else if price_rng.chance(params.stale_price_probability) {
                    // Carried in an earlier season: price history but no
                    // current sales.
                    let units = price_rng.range(5.0, 20.0).round();
                    dataset.prices.push(PriceRecord {
                        store_id: store_id.clone(),
                        feature_id: category.clone(),
                        total_amount: units * price,
                        total_quantity: units,
                    });
                }

                if margin_rng.chance(0.2) {
                    dataset.margins.push(MarginRecord {
                        scope: MarginScope::Store(store_id.clone()),
                        feature_id: category.clone(),
                        margin_rate: margin_rng.range(0.2, 0.6),
                    });
                }
            }
        }
    }

    log::debug!(
        "synthetic: seed={seed} stores={} sales={} prices={} margins={}",
        dataset.assignments.len(),
        dataset.sales.len(),
        dataset.prices.len(),
        dataset.margins.len()
    );
    dataset
}
