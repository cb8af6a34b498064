//! Profitability filter tests: cost cascade and thresholds.

use assortment_core::{
    config::ProfitabilityThresholds,
    dataset::{MarginRecord, MarginScope, ReferenceIndex},
    event::{PipelineEvent, Stage},
    opportunity::{CostSource, Opportunity, PriceSource},
    profitability::{ProfitabilityFilter, UnitEconomics},
    rejection::RejectionReason,
    PipelineError,
};

// ── Helpers ──────────────────────────────────────────────────────────────────

fn approved(store: &str, unit_price: f64, quantity: u64, n_comparables: usize) -> Opportunity {
    Opportunity {
        store_id: store.into(),
        peer_group_id: "G1".into(),
        feature_id: "Jackets".into(),
        expected_sales: unit_price * quantity as f64,
        unit_price,
        price_source: PriceSource::PeerGroupMedian,
        recommended_quantity: quantity,
        n_comparables,
        predicted_sell_through: Some(0.8),
        used_fallback: false,
        approved: true,
        unit_cost: None,
        cost_source: None,
        margin_per_unit: None,
        margin_uplift: None,
        investment_required: None,
        roi: None,
    }
}

fn group_margin(rate: f64) -> MarginRecord {
    MarginRecord {
        scope: MarginScope::PeerGroup("G1".into()),
        feature_id: "Jackets".into(),
        margin_rate: rate,
    }
}

fn store_margin(store: &str, rate: f64) -> MarginRecord {
    MarginRecord {
        scope: MarginScope::Store(store.into()),
        feature_id: "Jackets".into(),
        margin_rate: rate,
    }
}

fn thresholds(min_roi: f64, min_margin_uplift: f64, min_comparables: usize) -> ProfitabilityThresholds {
    ProfitabilityThresholds {
        min_roi,
        min_margin_uplift,
        min_comparables,
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[test]
fn unit_economics_follow_recommended_quantity() {
    let econ = UnitEconomics::compute(10.0, 6.0, 5);
    assert_eq!(econ.margin_per_unit, 4.0);
    assert_eq!(econ.margin_uplift, 20.0);
    assert_eq!(econ.investment_required, 30.0);
    assert!((econ.roi - 20.0 / 30.0).abs() < 1e-12);
}

#[test]
fn zero_investment_yields_zero_roi() {
    let econ = UnitEconomics::compute(10.0, 0.0, 4);
    assert_eq!(econ.investment_required, 0.0);
    assert_eq!(econ.roi, 0.0);
}

#[test]
fn retained_row_is_priced_on_its_own_quantity() {
    let reference = ReferenceIndex::build(&[], &[group_margin(0.4)]);
    let t = thresholds(0.2, 10.0, 3);
    let outcome = ProfitabilityFilter::new(&t, 2, false)
        .filter(vec![approved("S10", 25.0, 3, 9)], &reference)
        .unwrap();

    assert_eq!(outcome.retained.len(), 1);
    let opp = &outcome.retained[0];
    let unit_cost = opp.unit_cost.unwrap();
    let margin_per_unit = opp.margin_per_unit.unwrap();
    assert!((unit_cost - 15.0).abs() < 1e-9);
    assert!((margin_per_unit - 10.0).abs() < 1e-9);
    assert!(
        (opp.margin_uplift.unwrap() - margin_per_unit * opp.recommended_quantity as f64).abs()
            < 1e-9,
        "uplift must equal margin_per_unit × recommended_quantity"
    );
    assert!((opp.investment_required.unwrap() - 45.0).abs() < 1e-9);
    assert!((opp.roi.unwrap() - 30.0 / 45.0).abs() < 1e-9);
    assert_eq!(opp.cost_source, Some(CostSource::PeerGroupMargin));
}

#[test]
fn store_margin_wins_over_peer_group_margin() {
    let reference = ReferenceIndex::build(&[], &[group_margin(0.4), store_margin("S10", 0.5)]);
    let t = thresholds(0.0, 0.0, 0);
    let outcome = ProfitabilityFilter::new(&t, 2, false)
        .filter(vec![approved("S10", 20.0, 2, 5)], &reference)
        .unwrap();

    let opp = &outcome.retained[0];
    assert_eq!(opp.cost_source, Some(CostSource::StoreMargin));
    assert!((opp.unit_cost.unwrap() - 10.0).abs() < 1e-9);
}

/// Sub-cent noise must not flip a decision: 99.996 rounds to 100.00.
#[test]
fn margin_uplift_is_compared_at_currency_precision() {
    let reference = ReferenceIndex::build(&[], &[group_margin(0.5)]);
    let t = thresholds(0.0, 100.0, 0);
    let filter = ProfitabilityFilter::new(&t, 2, false);

    let outcome = filter
        .filter(vec![approved("S10", 199.992, 1, 5)], &reference)
        .unwrap();
    assert_eq!(outcome.retained.len(), 1, "99.996 should round up to 100.00");
    let raw = outcome.retained[0].margin_uplift.unwrap();
    assert!(raw < 100.0 && raw > 99.99, "stored uplift stays unrounded: {raw}");

    let outcome = filter
        .filter(vec![approved("S10", 198.8, 1, 5)], &reference)
        .unwrap();
    assert!(outcome.retained.is_empty(), "99.40 is below 100.00");
    assert_eq!(
        outcome.rejections[0].reasons,
        vec![RejectionReason::LowMarginUplift]
    );
}

#[test]
fn each_failed_threshold_is_a_reason() {
    // Cost 22.50: uplift 5.00 on 45.00 invested, ROI about 0.11.
    let reference = ReferenceIndex::build(&[], &[group_margin(0.1)]);
    let t = thresholds(0.2, 1_000.0, 3);
    let outcome = ProfitabilityFilter::new(&t, 2, false)
        .filter(vec![approved("S10", 25.0, 2, 2)], &reference)
        .unwrap();

    assert!(outcome.retained.is_empty());
    let rejection = &outcome.rejections[0];
    assert_eq!(rejection.stage, Stage::Profitability);
    assert_eq!(
        rejection.reasons,
        vec![
            RejectionReason::LowRoi,
            RejectionReason::LowMarginUplift,
            RejectionReason::TooFewComparables,
        ]
    );
}

#[test]
fn missing_cost_skips_candidate() {
    let reference = ReferenceIndex::build(&[], &[]);
    let t = thresholds(0.0, 0.0, 0);
    let outcome = ProfitabilityFilter::new(&t, 2, false)
        .filter(vec![approved("S10", 25.0, 2, 5)], &reference)
        .unwrap();

    assert!(outcome.retained.is_empty());
    assert_eq!(outcome.rejections[0].reasons, vec![RejectionReason::MissingCost]);
    assert!(matches!(
        &outcome.events[0],
        PipelineEvent::CandidateSkipped { stage: Stage::Profitability, reason, .. }
            if reason == "missing_cost"
    ));
}

#[test]
fn strict_mode_aborts_on_missing_cost() {
    let reference = ReferenceIndex::build(&[], &[]);
    let t = thresholds(0.0, 0.0, 0);
    let err = ProfitabilityFilter::new(&t, 2, true)
        .filter(vec![approved("S10", 25.0, 2, 5)], &reference)
        .unwrap_err();

    assert!(matches!(
        err,
        PipelineError::MissingReferenceData { reference: "unit cost", .. }
    ));
}

#[test]
fn out_of_range_store_margin_falls_back_to_peer_group() {
    let reference = ReferenceIndex::build(&[], &[group_margin(0.4), store_margin("S10", 1.5)]);
    let t = thresholds(0.0, 0.0, 0);
    let outcome = ProfitabilityFilter::new(&t, 2, false)
        .filter(vec![approved("S10", 20.0, 2, 5)], &reference)
        .unwrap();

    let opp = &outcome.retained[0];
    assert_eq!(opp.cost_source, Some(CostSource::PeerGroupMargin));
    assert!((opp.unit_cost.unwrap() - 12.0).abs() < 1e-9);
    assert!(opp.unit_cost.unwrap() > 0.0);
}

/// Rates of 1.0 or more, or below zero, cannot yield a positive cost.
#[test]
fn unusable_margin_rates_leave_cost_missing() {
    for rate in [1.0, 1.5, -0.2, f64::NAN] {
        let reference = ReferenceIndex::build(&[], &[group_margin(rate)]);
        let t = thresholds(0.0, 0.0, 0);
        let outcome = ProfitabilityFilter::new(&t, 2, false)
            .filter(vec![approved("S10", 25.0, 2, 5)], &reference)
            .unwrap();

        assert!(outcome.retained.is_empty(), "rate {rate} produced a cost");
        assert_eq!(
            outcome.rejections[0].reasons,
            vec![RejectionReason::MissingCost],
            "rate {rate}"
        );
    }
}

#[test]
fn oversized_currency_precision_still_enforces_uplift_floor() {
    // Uplift 5.00 against a 100.00 floor.
    let reference = ReferenceIndex::build(&[], &[group_margin(0.5)]);
    let t = thresholds(0.0, 100.0, 0);
    let outcome = ProfitabilityFilter::new(&t, 400, false)
        .filter(vec![approved("S10", 10.0, 1, 5)], &reference)
        .unwrap();

    assert!(outcome.retained.is_empty());
    assert_eq!(
        outcome.rejections[0].reasons,
        vec![RejectionReason::LowMarginUplift]
    );
}
