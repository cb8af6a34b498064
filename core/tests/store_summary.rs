//! Store aggregation tests.

use assortment_core::{
    aggregator::StoreAggregator,
    dataset::{MarginRecord, MarginScope, PeerGroups, PriceRecord, SalesRecord, StoreAssignment},
    opportunity::{CostSource, Opportunity, PriceSource},
    synthetic::{self, SyntheticParams},
    Dataset, GapPipeline, PipelineConfig,
};
use chrono::NaiveDate;
use std::collections::BTreeSet;

fn sale(store: &str, category: &str, amount: f64) -> SalesRecord {
    SalesRecord {
        store_id: store.into(),
        category: category.into(),
        subcategory: None,
        sku: None,
        amount,
        quantity: (amount / 10.0).max(0.0),
        period: NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
    }
}

fn price(store: &str, feature: &str, unit_price: f64) -> PriceRecord {
    PriceRecord {
        store_id: store.into(),
        feature_id: feature.into(),
        total_amount: unit_price * 10.0,
        total_quantity: 10.0,
    }
}

fn group_margin(feature: &str, rate: f64) -> MarginRecord {
    MarginRecord {
        scope: MarginScope::PeerGroup("G1".into()),
        feature_id: feature.into(),
        margin_rate: rate,
    }
}

/// S01–S09 sell Jackets ($25/unit) and Boots ($20/unit); S10 sells neither.
fn two_gap_dataset() -> Dataset {
    let mut ds = Dataset::default();
    for i in 1..=10 {
        let store = format!("S{i:02}");
        ds.assignments.push(StoreAssignment {
            store_id: store.clone(),
            peer_group_id: "G1".into(),
        });
        if i < 10 {
            ds.sales.push(sale(&store, "Jackets", 500.0 / 9.0));
            ds.sales.push(sale(&store, "Boots", 100.0));
            ds.prices.push(price(&store, "Jackets", 25.0));
            ds.prices.push(price(&store, "Boots", 20.0));
        }
    }
    ds.margins.push(group_margin("Jackets", 0.4));
    ds.margins.push(group_margin("Boots", 0.5));
    ds
}

#[test]
fn one_row_per_store_in_store_order() {
    let output = GapPipeline::build(PipelineConfig::default_test())
        .unwrap()
        .run(&two_gap_dataset())
        .unwrap();

    let ids: Vec<&str> = output.summaries.iter().map(|s| s.store_id.as_str()).collect();
    let expected: Vec<String> = (1..=10).map(|i| format!("S{i:02}")).collect();
    assert_eq!(ids, expected.iter().map(String::as_str).collect::<Vec<_>>());
}

#[test]
fn summary_totals_match_retained_rows() {
    let output = GapPipeline::build(PipelineConfig::default_test())
        .unwrap()
        .run(&two_gap_dataset())
        .unwrap();
    assert_eq!(output.opportunities.len(), 2);

    let s10 = output.summaries.iter().find(|s| s.store_id == "S10").unwrap();
    assert_eq!(s10.peer_group_id, "G1");
    assert_eq!(s10.opportunity_count, 2);
    assert_eq!(s10.distinct_feature_count, 2);
    // Jackets: ceil(55.56 / 25) = 3; Boots: ceil(100 / 20) = 5.
    assert_eq!(s10.total_recommended_quantity, 8);
    assert!((s10.total_investment_required - (45.0 + 50.0)).abs() < 1e-9);
    assert!((s10.total_margin_uplift - (30.0 + 50.0)).abs() < 1e-9);
    assert!((s10.total_expected_sales - (500.0 / 9.0 + 100.0)).abs() < 1e-9);

    let mean: f64 = output
        .opportunities
        .iter()
        .map(|o| o.predicted_sell_through.unwrap())
        .sum::<f64>()
        / 2.0;
    assert!((s10.average_predicted_sell_through - mean).abs() < 1e-12);

    for s in output.summaries.iter().filter(|s| s.store_id != "S10") {
        assert_eq!(s.opportunity_count, 0, "{} sells everything", s.store_id);
    }
}

#[test]
fn fully_rejected_store_still_gets_a_zero_row() {
    let mut config = PipelineConfig::default_test();
    config.profitability.min_margin_uplift = 1_000_000.0;

    let output = GapPipeline::build(config)
        .unwrap()
        .run(&two_gap_dataset())
        .unwrap();

    assert!(output.opportunities.is_empty());
    assert_eq!(output.rejections.len(), 2);
    let s10 = output.summaries.iter().find(|s| s.store_id == "S10").unwrap();
    assert_eq!(s10.opportunity_count, 0);
    assert_eq!(s10.total_recommended_quantity, 0);
    assert_eq!(s10.total_investment_required, 0.0);
    assert_eq!(s10.average_predicted_sell_through, 0.0);
    assert_eq!(s10.distinct_feature_count, 0);
}

#[test]
fn every_assigned_store_appears_exactly_once() {
    let ds = synthetic::generate(99, &SyntheticParams::default());
    let output = GapPipeline::build(PipelineConfig::default_test())
        .unwrap()
        .run(&ds)
        .unwrap();

    let assigned: BTreeSet<&str> = ds.assignments.iter().map(|a| a.store_id.as_str()).collect();
    let summarised: Vec<&str> = output.summaries.iter().map(|s| s.store_id.as_str()).collect();
    let unique: BTreeSet<&str> = summarised.iter().copied().collect();

    assert_eq!(summarised.len(), unique.len(), "duplicate summary rows");
    assert_eq!(unique, assigned);
    assert_eq!(output.report.stores_evaluated, assigned.len());

    let total: usize = output.summaries.iter().map(|s| s.opportunity_count).sum();
    assert_eq!(total, output.opportunities.len());
}

fn retained(store: &str, feature: &str, quantity: u64) -> Opportunity {
    Opportunity {
        store_id: store.into(),
        peer_group_id: "G1".into(),
        feature_id: feature.into(),
        expected_sales: 100.0,
        unit_price: 10.0,
        price_source: PriceSource::StoreHistory,
        recommended_quantity: quantity,
        n_comparables: 5,
        predicted_sell_through: Some(0.8),
        used_fallback: false,
        approved: true,
        unit_cost: Some(6.0),
        cost_source: Some(CostSource::PeerGroupMargin),
        margin_per_unit: Some(4.0),
        margin_uplift: Some(40.0),
        investment_required: Some(60.0),
        roi: Some(40.0 / 60.0),
    }
}

#[test]
fn quantity_total_saturates_instead_of_overflowing() {
    let assignments: Vec<StoreAssignment> = ["S01", "S02"]
        .iter()
        .map(|s| StoreAssignment {
            store_id: (*s).into(),
            peer_group_id: "G1".into(),
        })
        .collect();
    let groups = PeerGroups::build(&assignments).unwrap();
    let half = u64::MAX / 2 + 1;
    let opps = vec![
        retained("S01", "Boots", half),
        retained("S01", "Jackets", half),
        retained("S02", "Boots", 3),
        retained("S02", "Jackets", 4),
    ];

    let summaries = StoreAggregator::aggregate(&groups, &opps);

    let s01 = summaries.iter().find(|s| s.store_id == "S01").unwrap();
    assert_eq!(s01.total_recommended_quantity, u64::MAX);
    assert_eq!(s01.opportunity_count, 2);
    let s02 = summaries.iter().find(|s| s.store_id == "S02").unwrap();
    assert_eq!(s02.total_recommended_quantity, 7);
}
