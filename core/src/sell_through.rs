//! Sell-through prediction and approval.
//!
//! RULE: The predictor is a required capability. If it cannot be
//! built the pipeline refuses to start. If it cannot score an
//! opportunity the stage substitutes the configured fallback, but every
//! substitution is logged, counted, and bounded by `max_fallback_rate`.
//! A predictor that silently falls back on every row would approve or
//! reject everything uniformly, which disables the filter entirely.

use crate::{
    adoption::AdoptionTable,
    config::{ApprovalGates, SellThroughCurve},
    error::{PipelineError, PipelineResult},
    event::{PipelineEvent, Stage},
    opportunity::Opportunity,
    rejection::{Rejection, RejectionReason},
};

/// Peer signals available to a predictor for one opportunity.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PredictionInput {
    pub adoption_rate: f64,
    pub stores_selling: usize,
    pub peer_group_size: usize,
    pub total_sales: f64,
    pub n_comparables: usize,
}

/// The contract every sell-through model must fulfill.
pub trait SellThroughPredictor: Send + Sync {
    /// Stable name, recorded on fallback events.
    fn name(&self) -> &'static str;

    /// Probability in [0, 1] that stocked units sell through, or None
    /// when the model cannot score this input.
    fn predict(&self, input: &PredictionInput) -> Option<f64>;
}

/// Logistic curve over peer adoption rate.
#[derive(Debug, Clone)]
pub struct AdoptionCurvePredictor {
    curve: SellThroughCurve,
}

impl AdoptionCurvePredictor {
    pub fn new(curve: &SellThroughCurve) -> PipelineResult<Self> {
        let unavailable = |reason: String| Err(PipelineError::PredictorUnavailable { reason });

        let all_finite = [curve.floor, curve.ceiling, curve.steepness, curve.midpoint]
            .iter()
            .all(|v| v.is_finite());
        if !all_finite {
            return unavailable("curve parameters must be finite".into());
        }
        if !(0.0..=1.0).contains(&curve.floor) || !(0.0..=1.0).contains(&curve.ceiling) {
            return unavailable(format!(
                "curve bounds [{}, {}] must lie within [0, 1]",
                curve.floor, curve.ceiling
            ));
        }
        if curve.floor > curve.ceiling {
            return unavailable(format!(
                "curve floor {} exceeds ceiling {}",
                curve.floor, curve.ceiling
            ));
        }
        if curve.steepness <= 0.0 {
            return unavailable(format!(
                "curve steepness {} must be positive",
                curve.steepness
            ));
        }
        Ok(Self {
            curve: curve.clone(),
        })
    }
}

impl SellThroughPredictor for AdoptionCurvePredictor {
    fn name(&self) -> &'static str {
        "adoption_curve"
    }

    fn predict(&self, input: &PredictionInput) -> Option<f64> {
        if input.peer_group_size == 0 || !input.adoption_rate.is_finite() {
            return None;
        }
        let c = &self.curve;
        let logistic = 1.0 / (1.0 + (-c.steepness * (input.adoption_rate - c.midpoint)).exp());
        Some(c.floor + (c.ceiling - c.floor) * logistic)
    }
}

#[derive(Debug, Default)]
pub struct ApprovalOutcome {
    pub approved: Vec<Opportunity>,
    pub rejections: Vec<Rejection>,
    pub events: Vec<PipelineEvent>,
    pub predictions: usize,
    pub fallback_predictions: usize,
}

impl ApprovalOutcome {
    pub fn fallback_rate(&self) -> f64 {
        if self.predictions == 0 {
            0.0
        } else {
            self.fallback_predictions as f64 / self.predictions as f64
        }
    }
}

pub struct SellThroughStage<'a> {
    predictor: &'a dyn SellThroughPredictor,
    gates: &'a ApprovalGates,
    fallback_sell_through: f64,
    max_fallback_rate: f64,
}

impl<'a> SellThroughStage<'a> {
    pub fn new(
        predictor: &'a dyn SellThroughPredictor,
        gates: &'a ApprovalGates,
        fallback_sell_through: f64,
        max_fallback_rate: f64,
    ) -> Self {
        Self {
            predictor,
            gates,
            fallback_sell_through,
            max_fallback_rate,
        }
    }

    pub fn evaluate(
        &self,
        candidates: Vec<Opportunity>,
        adoption: &AdoptionTable,
    ) -> PipelineResult<ApprovalOutcome> {
        let mut outcome = ApprovalOutcome::default();

        for mut opp in candidates {
            let Some(stats) = adoption.get(&opp.peer_group_id, &opp.feature_id) else {
                outcome.rejections.push(opp.rejection(
                    Stage::SellThrough,
                    vec![RejectionReason::MissingAdoptionStats],
                    "no adoption record for peer group".into(),
                ));
                continue;
            };

            let input = PredictionInput {
                adoption_rate: stats.adoption_rate,
                stores_selling: stats.stores_selling,
                peer_group_size: stats.peer_group_size,
                total_sales: stats.total_sales,
                n_comparables: opp.n_comparables,
            };

            outcome.predictions += 1;
            let predicted = match self.predictor.predict(&input) {
                Some(p) if p.is_finite() => p.clamp(0.0, 1.0),
                _ => {
                    outcome.fallback_predictions += 1;
                    opp.used_fallback = true;
                    log::warn!(
                        "sell_through: predictor '{}' could not score {}/{}, using fallback {:.2}",
                        self.predictor.name(),
                        opp.store_id,
                        opp.feature_id,
                        self.fallback_sell_through
                    );
                    outcome.events.push(PipelineEvent::FallbackPredictionUsed {
                        store_id: opp.store_id.clone(),
                        feature_id: opp.feature_id.clone(),
                        predictor: self.predictor.name().into(),
                        fallback_value: self.fallback_sell_through,
                    });
                    self.fallback_sell_through
                }
            };
            opp.predicted_sell_through = Some(predicted);

            let mut reasons = Vec::new();
            if predicted < self.gates.min_predicted_sell_through {
                reasons.push(RejectionReason::LowPredictedSellThrough);
            }
            if stats.adoption_rate < self.gates.min_adoption_rate {
                reasons.push(RejectionReason::LowAdoptionRate);
            }
            if stats.stores_selling < self.gates.min_stores_selling {
                reasons.push(RejectionReason::TooFewStoresSelling);
            }

            if reasons.is_empty() {
                opp.approved = true;
                outcome.approved.push(opp);
            } else {
                let detail = format!(
                    "predicted={predicted:.3} adoption_rate={:.3} stores_selling={}",
                    stats.adoption_rate, stats.stores_selling
                );
                log::debug!(
                    "sell_through: rejected {}/{}: {detail}",
                    opp.store_id,
                    opp.feature_id
                );
                outcome
                    .rejections
                    .push(opp.rejection(Stage::SellThrough, reasons, detail));
            }
        }

        let rate = outcome.fallback_rate();
        if outcome.fallback_predictions > 0 {
            log::warn!(
                "sell_through: {} of {} predictions used the fallback ({:.1}%)",
                outcome.fallback_predictions,
                outcome.predictions,
                rate * 100.0
            );
        }
        if rate > self.max_fallback_rate {
            return Err(PipelineError::PredictorDegraded {
                fallback_rate: rate,
                limit: self.max_fallback_rate,
            });
        }

        Ok(outcome)
    }
}
