//! Profitability filtering.
//!
//! Resolves a unit cost (store margin rate, then peer-group margin
//! rate, else skip), derives margin and ROI from the opportunity's own
//! `recommended_quantity`, and keeps only rows clearing every threshold.
//!
//! margin_uplift is rounded to `currency_decimals` before comparison so
//! that sub-cent float noise cannot flip a decision at the boundary.
//! The stored value stays unrounded.

use crate::{
    config::ProfitabilityThresholds,
    dataset::ReferenceIndex,
    error::{PipelineError, PipelineResult},
    event::{PipelineEvent, Stage},
    opportunity::{CostSource, Opportunity},
    rejection::{Rejection, RejectionReason},
    stats,
};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UnitEconomics {
    pub unit_cost: f64,
    pub margin_per_unit: f64,
    pub margin_uplift: f64,
    pub investment_required: f64,
    pub roi: f64,
}

impl UnitEconomics {
    pub fn compute(unit_price: f64, unit_cost: f64, quantity: u64) -> Self {
        let qty = quantity as f64;
        let margin_per_unit = unit_price - unit_cost;
        let margin_uplift = margin_per_unit * qty;
        let investment_required = unit_cost * qty;
        let roi = if investment_required == 0.0 {
            0.0
        } else {
            margin_uplift / investment_required
        };
        Self {
            unit_cost,
            margin_per_unit,
            margin_uplift,
            investment_required,
            roi,
        }
    }
}

#[derive(Debug, Default)]
pub struct ProfitabilityOutcome {
    pub retained: Vec<Opportunity>,
    pub rejections: Vec<Rejection>,
    pub events: Vec<PipelineEvent>,
}

pub struct ProfitabilityFilter<'a> {
    thresholds: &'a ProfitabilityThresholds,
    currency_decimals: u32,
    strict: bool,
}

impl<'a> ProfitabilityFilter<'a> {
    pub fn new(thresholds: &'a ProfitabilityThresholds, currency_decimals: u32, strict: bool) -> Self {
        Self {
            thresholds,
            currency_decimals,
            strict,
        }
    }

    fn resolve_margin_rate(
        &self,
        opp: &Opportunity,
        reference: &ReferenceIndex,
    ) -> Option<(f64, CostSource)> {
        reference
            .store_margin_rate(&opp.store_id, &opp.feature_id)
            .map(|r| (r, CostSource::StoreMargin))
            .or_else(|| {
                reference
                    .group_margin_rate(&opp.peer_group_id, &opp.feature_id)
                    .map(|r| (r, CostSource::PeerGroupMargin))
            })
    }

    pub fn filter(
        &self,
        approved: Vec<Opportunity>,
        reference: &ReferenceIndex,
    ) -> PipelineResult<ProfitabilityOutcome> {
        let mut outcome = ProfitabilityOutcome::default();

        for mut opp in approved {
            let Some((margin_rate, cost_source)) = self.resolve_margin_rate(&opp, reference) else {
                if self.strict {
                    return Err(PipelineError::MissingReferenceData {
                        store_id: opp.store_id,
                        feature_id: opp.feature_id,
                        reference: "unit cost",
                    });
                }
                log::warn!(
                    "profitability: no margin rate for {}/{}, candidate skipped",
                    opp.store_id,
                    opp.feature_id
                );
                outcome.events.push(PipelineEvent::CandidateSkipped {
                    stage: Stage::Profitability,
                    store_id: opp.store_id.clone(),
                    feature_id: opp.feature_id.clone(),
                    reason: RejectionReason::MissingCost.code().into(),
                });
                outcome.rejections.push(opp.rejection(
                    Stage::Profitability,
                    vec![RejectionReason::MissingCost],
                    "no store or peer-group margin rate".into(),
                ));
                continue;
            };

            let unit_cost = opp.unit_price * (1.0 - margin_rate);
            let econ = UnitEconomics::compute(opp.unit_price, unit_cost, opp.recommended_quantity);

            opp.unit_cost = Some(econ.unit_cost);
            opp.cost_source = Some(cost_source);
            opp.margin_per_unit = Some(econ.margin_per_unit);
            opp.margin_uplift = Some(econ.margin_uplift);
            opp.investment_required = Some(econ.investment_required);
            opp.roi = Some(econ.roi);

            let rounded_uplift = stats::round_to(econ.margin_uplift, self.currency_decimals);

            let mut reasons = Vec::new();
            if econ.roi < self.thresholds.min_roi {
                reasons.push(RejectionReason::LowRoi);
            }
            if rounded_uplift < self.thresholds.min_margin_uplift {
                reasons.push(RejectionReason::LowMarginUplift);
            }
            if opp.n_comparables < self.thresholds.min_comparables {
                reasons.push(RejectionReason::TooFewComparables);
            }

            if reasons.is_empty() {
                outcome.retained.push(opp);
            } else {
                let detail = format!(
                    "roi={:.3} margin_uplift={rounded_uplift:.2} n_comparables={}",
                    econ.roi, opp.n_comparables
                );
                outcome
                    .rejections
                    .push(opp.rejection(Stage::Profitability, reasons, detail));
            }
        }

        Ok(outcome)
    }
}
