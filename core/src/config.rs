use crate::error::{PipelineError, PipelineResult};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Which level of the merchandise hierarchy is treated as a feature.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Granularity {
    Category,
    Subcategory,
    Sku,
}

impl Granularity {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Category => "category",
            Self::Subcategory => "subcategory",
            Self::Sku => "sku",
        }
    }
}

// ── Peer adoption ──────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdoptionThresholds {
    /// Minimum fraction of group stores selling the feature.
    pub adoption_rate: f64,
    /// Minimum summed sales amount across the group.
    pub sales_volume: f64,
}

/// Inclusive date range restricting which sales records are considered.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservationWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl ObservationWindow {
    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start && date <= self.end
    }
}

// ── Opportunity detection ──────────────────────────────────────────

/// Percentile band used for the trim-then-cap expected-sales estimate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExpectedSalesConfig {
    pub trim_lower_percentile: f64,
    pub trim_upper_percentile: f64,
    pub cap_percentile: f64,
}

// ── Sell-through ───────────────────────────────────────────────────

/// Logistic curve mapping peer adoption rate to predicted sell-through.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SellThroughCurve {
    pub floor: f64,
    pub ceiling: f64,
    pub steepness: f64,
    pub midpoint: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalGates {
    pub min_predicted_sell_through: f64,
    pub min_adoption_rate: f64,
    /// Absolute floor, independent of rate.
    pub min_stores_selling: usize,
}

// ── Profitability ──────────────────────────────────────────────────

/// Profitability thresholds. The shipped defaults have no documented
/// business justification and must be confirmed before production use.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfitabilityThresholds {
    pub min_roi: f64,
    pub min_margin_uplift: f64,
    pub min_comparables: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub granularity: Granularity,
    #[serde(default)]
    pub observation_window: Option<ObservationWindow>,
    pub adoption_thresholds: HashMap<Granularity, AdoptionThresholds>,
    pub expected_sales: ExpectedSalesConfig,
    pub sell_through_curve: SellThroughCurve,
    pub approval: ApprovalGates,
    /// Substituted when the predictor cannot score an opportunity.
    pub fallback_sell_through: f64,
    /// Fraction of predictions allowed to use the fallback before the
    /// run is aborted.
    pub max_fallback_rate: f64,
    pub profitability: ProfitabilityThresholds,
    #[serde(default = "default_currency_decimals")]
    pub currency_decimals: u32,
    /// Abort the run instead of skipping when a price or cost cannot be
    /// resolved.
    #[serde(default)]
    pub strict_reference_data: bool,
}

/// Upper bound on `currency_decimals`; 10^decimals must stay exact.
pub const MAX_CURRENCY_DECIMALS: u32 = 6;

fn default_currency_decimals() -> u32 {
    2
}

impl PipelineConfig {
    /// Load from a JSON file.
    /// In tests, use PipelineConfig::default_test().
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Cannot read {path}: {e}"))?;
        let config: PipelineConfig = serde_json::from_str(&content)
            .map_err(|e| anyhow::anyhow!("Cannot parse {path}: {e}"))?;
        config.validate()?;
        Ok(config)
    }

    /// Config with hardcoded defaults for use in unit tests.
    pub fn default_test() -> Self {
        let adoption_thresholds = [
            (
                Granularity::Category,
                AdoptionThresholds {
                    adoption_rate: 0.70,
                    sales_volume: 100.0,
                },
            ),
            (
                Granularity::Subcategory,
                AdoptionThresholds {
                    adoption_rate: 0.60,
                    sales_volume: 50.0,
                },
            ),
            (
                Granularity::Sku,
                AdoptionThresholds {
                    adoption_rate: 0.40,
                    sales_volume: 20.0,
                },
            ),
        ]
        .into();

        Self {
            granularity: Granularity::Category,
            observation_window: None,
            adoption_thresholds,
            expected_sales: ExpectedSalesConfig {
                trim_lower_percentile: 10.0,
                trim_upper_percentile: 90.0,
                cap_percentile: 80.0,
            },
            sell_through_curve: SellThroughCurve {
                floor: 0.05,
                ceiling: 0.95,
                steepness: 8.0,
                midpoint: 0.5,
            },
            approval: ApprovalGates {
                min_predicted_sell_through: 0.5,
                min_adoption_rate: 0.5,
                min_stores_selling: 3,
            },
            fallback_sell_through: 0.5,
            max_fallback_rate: 0.0,
            profitability: ProfitabilityThresholds {
                min_roi: 0.2,
                min_margin_uplift: 10.0,
                min_comparables: 3,
            },
            currency_decimals: 2,
            strict_reference_data: false,
        }
    }

    /// Adoption thresholds for the configured granularity.
    pub fn active_adoption_thresholds(&self) -> PipelineResult<&AdoptionThresholds> {
        self.adoption_thresholds.get(&self.granularity).ok_or_else(|| {
            PipelineError::InvalidConfig(format!(
                "no adoption thresholds for granularity '{}'",
                self.granularity.name()
            ))
        })
    }

    /// Check ranges and cross-field consistency.
    pub fn validate(&self) -> PipelineResult<()> {
        let invalid = |msg: String| Err(PipelineError::InvalidConfig(msg));

        let thresholds = self.active_adoption_thresholds()?;
        if !(0.0..=1.0).contains(&thresholds.adoption_rate) {
            return invalid(format!(
                "adoption_rate threshold {} outside [0, 1]",
                thresholds.adoption_rate
            ));
        }
        if !(thresholds.sales_volume.is_finite() && thresholds.sales_volume >= 0.0) {
            return invalid(format!(
                "sales_volume threshold {} must be finite and non-negative",
                thresholds.sales_volume
            ));
        }

        let es = &self.expected_sales;
        let in_pct = |p: f64| (0.0..=100.0).contains(&p);
        if !(in_pct(es.trim_lower_percentile)
            && in_pct(es.trim_upper_percentile)
            && in_pct(es.cap_percentile))
        {
            return invalid("expected_sales percentiles must lie in [0, 100]".into());
        }
        if es.trim_lower_percentile > es.trim_upper_percentile {
            return invalid("trim_lower_percentile exceeds trim_upper_percentile".into());
        }

        for (name, value) in [
            ("min_predicted_sell_through", self.approval.min_predicted_sell_through),
            ("min_adoption_rate", self.approval.min_adoption_rate),
            ("fallback_sell_through", self.fallback_sell_through),
            ("max_fallback_rate", self.max_fallback_rate),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return invalid(format!("{name} {value} outside [0, 1]"));
            }
        }

        let p = &self.profitability;
        for (name, value) in [("min_roi", p.min_roi), ("min_margin_uplift", p.min_margin_uplift)] {
            if !value.is_finite() {
                return invalid(format!("{name} {value} must be finite"));
            }
        }
        if self.currency_decimals > MAX_CURRENCY_DECIMALS {
            return invalid(format!(
                "currency_decimals {} exceeds {MAX_CURRENCY_DECIMALS}",
                self.currency_decimals
            ));
        }

        if let Some(window) = &self.observation_window {
            if window.start > window.end {
                return invalid("observation_window start is after end".into());
            }
        }

        Ok(())
    }
}
