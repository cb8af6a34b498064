//! The gap pipeline: wires the stages together for one batch run.
//!
//! EXECUTION ORDER (fixed, documented, never reordered):
//!   1. Peer adoption        (adoption.rs)
//!   2. Opportunity detection (opportunity.rs)
//!   3. Sell-through approval (sell_through.rs)
//!   4. Profitability filter  (profitability.rs)
//!   5. Store aggregation     (aggregator.rs)
//!
//! RULES:
//!   - Each stage consumes only the previous stage's output and the
//!     read-only indexes built at the start of the run.
//!   - The pipeline holds no mutable state; `run` takes `&self`.
//!   - Identical inputs and config produce identical output tables.

use crate::{
    adoption::{AdoptionTable, PeerAdoptionAnalyzer},
    aggregator::{StoreAggregator, StoreSummary},
    config::PipelineConfig,
    dataset::{Dataset, PeerGroups, ReferenceIndex, SalesIndex},
    error::PipelineResult,
    event::{PipelineEvent, Stage},
    opportunity::{Opportunity, OpportunityDetector},
    profitability::ProfitabilityFilter,
    rejection::Rejection,
    sell_through::{AdoptionCurvePredictor, SellThroughPredictor, SellThroughStage},
};
use serde::Serialize;
use std::collections::BTreeMap;

/// Skip counts and reasons for one run.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct RunReport {
    pub stores_evaluated: usize,
    pub sales_records: usize,
    pub unassigned_sales_records: usize,
    pub unkeyed_sales_records: usize,
    pub out_of_window_sales_records: usize,
    pub pairs_analyzed: usize,
    pub well_selling_pairs: usize,
    pub candidates: usize,
    pub approved: usize,
    pub retained: usize,
    pub predictions: usize,
    pub fallback_predictions: usize,
    pub fallback_rate: f64,
    pub rejections_by_reason: BTreeMap<String, usize>,
}

/// Everything one run produces.
#[derive(Debug, Clone, Serialize)]
pub struct RunOutput {
    pub adoption: AdoptionTable,
    pub opportunities: Vec<Opportunity>,
    pub rejections: Vec<Rejection>,
    pub summaries: Vec<StoreSummary>,
    pub events: Vec<PipelineEvent>,
    pub report: RunReport,
}

pub struct GapPipeline {
    config: PipelineConfig,
    predictor: Box<dyn SellThroughPredictor>,
}

impl std::fmt::Debug for GapPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GapPipeline")
            .field("granularity", &self.config.granularity)
            .field("predictor", &self.predictor.name())
            .finish()
    }
}

impl GapPipeline {
    /// Build a pipeline with the default adoption-curve predictor.
    /// Fails with PredictorUnavailable if the curve is unusable.
    pub fn build(config: PipelineConfig) -> PipelineResult<Self> {
        Self::build_with(config, |cfg| {
            AdoptionCurvePredictor::new(&cfg.sell_through_curve)
                .map(|p| Box::new(p) as Box<dyn SellThroughPredictor>)
        })
    }

    /// Build with a caller-supplied predictor factory. Construction
    /// errors propagate before any data is touched.
    pub fn build_with<F>(config: PipelineConfig, make_predictor: F) -> PipelineResult<Self>
    where
        F: FnOnce(&PipelineConfig) -> PipelineResult<Box<dyn SellThroughPredictor>>,
    {
        config.validate()?;
        let predictor = make_predictor(&config)?;
        log::info!(
            "pipeline ready: granularity={} predictor={}",
            config.granularity.name(),
            predictor.name()
        );
        Ok(Self { config, predictor })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn run(&self, dataset: &Dataset) -> PipelineResult<RunOutput> {
        let cfg = &self.config;
        let mut events = Vec::new();
        let mut rejections = Vec::new();

        // Read-only indexes, built once.
        let groups = PeerGroups::build(&dataset.assignments)?;
        let sales = SalesIndex::build(
            &dataset.sales,
            &groups,
            cfg.granularity,
            cfg.observation_window.as_ref(),
        );
        let reference = ReferenceIndex::build(&dataset.prices, &dataset.margins);

        events.push(PipelineEvent::RunStarted {
            granularity: cfg.granularity.name().into(),
            stores: groups.store_count(),
            sales_records: dataset.sales.len(),
        });
        if sales.unassigned_records > 0 {
            log::warn!(
                "{} sales records reference stores without a peer group; ignored",
                sales.unassigned_records
            );
        }

        // 1. Peer adoption
        let thresholds = cfg.active_adoption_thresholds()?;
        let adoption = PeerAdoptionAnalyzer::new(thresholds).analyze(&groups, &sales);
        let well_selling = adoption.well_selling().count();
        log::info!(
            "peer_adoption: {} pairs analysed, {} well-selling",
            adoption.len(),
            well_selling
        );
        events.push(PipelineEvent::StageCompleted {
            stage: Stage::PeerAdoption,
            rows_in: dataset.sales.len(),
            rows_out: well_selling,
        });

        // 2. Opportunity detection
        let detection = OpportunityDetector::new(&cfg.expected_sales, cfg.strict_reference_data)
            .detect(&adoption, &groups, &sales, &reference)?;
        let candidates = detection.opportunities.len();
        log::info!(
            "opportunity_detection: {} candidates, {} skipped for missing price",
            candidates,
            detection.rejections.len()
        );
        events.extend(detection.events);
        events.push(PipelineEvent::StageCompleted {
            stage: Stage::OpportunityDetection,
            rows_in: well_selling,
            rows_out: candidates,
        });
        rejections.extend(detection.rejections);

        // 3. Sell-through approval
        let approval = SellThroughStage::new(
            self.predictor.as_ref(),
            &cfg.approval,
            cfg.fallback_sell_through,
            cfg.max_fallback_rate,
        )
        .evaluate(detection.opportunities, &adoption)?;
        let approved = approval.approved.len();
        let fallback_rate = approval.fallback_rate();
        log::info!("sell_through: {approved} of {candidates} approved");
        events.extend(approval.events);
        events.push(PipelineEvent::StageCompleted {
            stage: Stage::SellThrough,
            rows_in: candidates,
            rows_out: approved,
        });
        rejections.extend(approval.rejections);

        // 4. Profitability
        let profit = ProfitabilityFilter::new(
            &cfg.profitability,
            cfg.currency_decimals,
            cfg.strict_reference_data,
        )
        .filter(approval.approved, &reference)?;
        let retained = profit.retained.len();
        log::info!("profitability: {retained} of {approved} retained");
        events.extend(profit.events);
        events.push(PipelineEvent::StageCompleted {
            stage: Stage::Profitability,
            rows_in: approved,
            rows_out: retained,
        });
        rejections.extend(profit.rejections);

        // 5. Store aggregation
        let summaries = StoreAggregator::aggregate(&groups, &profit.retained);
        events.push(PipelineEvent::StageCompleted {
            stage: Stage::StoreAggregation,
            rows_in: retained,
            rows_out: summaries.len(),
        });
        events.push(PipelineEvent::RunCompleted {
            retained,
            rejected: rejections.len(),
        });

        let mut rejections_by_reason = BTreeMap::new();
        for rejection in &rejections {
            for reason in &rejection.reasons {
                *rejections_by_reason
                    .entry(reason.code().to_string())
                    .or_insert(0) += 1;
            }
        }

        let report = RunReport {
            stores_evaluated: groups.store_count(),
            sales_records: dataset.sales.len(),
            unassigned_sales_records: sales.unassigned_records,
            unkeyed_sales_records: sales.unkeyed_records,
            out_of_window_sales_records: sales.out_of_window_records,
            pairs_analyzed: adoption.len(),
            well_selling_pairs: well_selling,
            candidates,
            approved,
            retained,
            predictions: approval.predictions,
            fallback_predictions: approval.fallback_predictions,
            fallback_rate,
            rejections_by_reason,
        };

        Ok(RunOutput {
            adoption,
            opportunities: profit.retained,
            rejections,
            summaries,
            events,
            report,
        })
    }
}
