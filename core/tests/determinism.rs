//! Determinism tests.
//!
//! Identical inputs and config must produce byte-identical output
//! tables, run after run and pipeline after pipeline.

use assortment_core::{
    synthetic::{self, SyntheticParams},
    GapPipeline, PipelineConfig,
};

fn config() -> PipelineConfig {
    let mut config = PipelineConfig::default_test();
    config.profitability.min_margin_uplift = 0.0;
    config
}

#[test]
fn repeated_runs_are_byte_identical() {
    let ds = synthetic::generate(12345, &SyntheticParams::default());
    let pipeline = GapPipeline::build(config()).unwrap();

    let first = pipeline.run(&ds).unwrap();
    let second = pipeline.run(&ds).unwrap();

    assert_eq!(
        serde_json::to_string(&first.opportunities).unwrap(),
        serde_json::to_string(&second.opportunities).unwrap()
    );
    assert_eq!(
        serde_json::to_string(&first.summaries).unwrap(),
        serde_json::to_string(&second.summaries).unwrap()
    );
    assert_eq!(
        serde_json::to_string(&first).unwrap(),
        serde_json::to_string(&second).unwrap(),
        "full run output diverged"
    );
}

#[test]
fn independent_pipelines_agree() {
    let ds = synthetic::generate(777, &SyntheticParams::default());

    let a = GapPipeline::build(config()).unwrap().run(&ds).unwrap();
    let b = GapPipeline::build(config()).unwrap().run(&ds).unwrap();

    assert_eq!(a.opportunities, b.opportunities);
    assert_eq!(a.summaries, b.summaries);
    assert_eq!(a.report, b.report);
}

/// Input row order must not leak into the output.
#[test]
fn shuffled_input_rows_give_same_output() {
    let ds = synthetic::generate(4242, &SyntheticParams::default());
    let mut reversed = ds.clone();
    reversed.sales.reverse();
    reversed.assignments.reverse();
    reversed.prices.reverse();
    reversed.margins.reverse();

    let pipeline = GapPipeline::build(config()).unwrap();
    let a = pipeline.run(&ds).unwrap();
    let b = pipeline.run(&reversed).unwrap();

    let keys = |o: &assortment_core::RunOutput| -> Vec<(String, String)> {
        o.opportunities
            .iter()
            .map(|x| (x.store_id.clone(), x.feature_id.clone()))
            .collect()
    };
    assert_eq!(keys(&a), keys(&b));
    assert_eq!(
        a.summaries.iter().map(|s| &s.store_id).collect::<Vec<_>>(),
        b.summaries.iter().map(|s| &s.store_id).collect::<Vec<_>>()
    );
}
