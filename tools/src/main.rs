//! gap-runner: headless batch runner for the assortment-gap pipeline.
//!
//! Usage:
//!   gap-runner --config config/pipeline.json --data-dir ./data --db gaps.db
//!   gap-runner --synthetic --seed 12345
//!   gap-runner --synthetic --seed 7 --strict --top 5 --json out.json

use anyhow::{Context, Result};
use assortment_core::{
    aggregator::StoreSummary,
    store::GapStore,
    synthetic::{self, SyntheticParams},
    Dataset, GapPipeline, PipelineConfig, RunOutput,
};
use std::env;

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let seed = parse_arg(&args, "--seed", 42u64);
    let top = parse_arg(&args, "--top", 10usize);
    let use_synthetic = args.iter().any(|a| a == "--synthetic");
    let strict = args.iter().any(|a| a == "--strict");
    let db = string_arg(&args, "--db").unwrap_or(":memory:");
    let data_dir = string_arg(&args, "--data-dir").unwrap_or("./data");
    let config_path = string_arg(&args, "--config");
    let json_out = string_arg(&args, "--json");

    let mut config = match config_path {
        Some(path) => PipelineConfig::load(path)?,
        None => PipelineConfig::default_test(),
    };
    if strict {
        config.strict_reference_data = true;
    }

    println!("Assortment Gap: gap-runner");
    println!("  config:      {}", config_path.unwrap_or("(built-in defaults)"));
    if use_synthetic {
        println!("  data:        synthetic (seed {seed})");
    } else {
        println!("  data:        {data_dir}");
    }
    println!("  granularity: {}", config.granularity.name());
    println!("  strict:      {}", config.strict_reference_data);
    println!("  db:          {db}");
    println!();

    let dataset = if use_synthetic {
        synthetic::generate(seed, &SyntheticParams::default())
    } else {
        Dataset::load(data_dir)?
    };

    let pipeline = GapPipeline::build(config)?;
    let output = pipeline.run(&dataset)?;

    let store = GapStore::open(db)?;
    store.migrate()?;
    let run_id = GapStore::new_run_id();
    store.insert_run(&run_id, pipeline.config())?;
    store
        .persist_run(&run_id, &output)
        .with_context(|| format!("run {run_id} not persisted"))?;

    if let Some(path) = json_out {
        let json = serde_json::to_string_pretty(&output)?;
        std::fs::write(path, json).with_context(|| format!("Cannot write {path}"))?;
        log::info!("run output written to {path}");
    }

    print_summary(&run_id, &output, top);
    Ok(())
}

fn print_summary(run_id: &str, output: &RunOutput, top: usize) {
    let r = &output.report;

    println!("=== RUN SUMMARY ===");
    println!("  run_id:             {run_id}");
    println!("  stores evaluated:   {}", r.stores_evaluated);
    println!("  sales records:      {}", r.sales_records);
    println!("  pairs analysed:     {}", r.pairs_analyzed);
    println!("  well-selling pairs: {}", r.well_selling_pairs);
    println!("  candidates:         {}", r.candidates);
    println!("  approved:           {}", r.approved);
    println!("  retained:           {}", r.retained);
    println!(
        "  fallback preds:     {} ({:.1}%)",
        r.fallback_predictions,
        r.fallback_rate * 100.0
    );

    println!();
    println!("=== REJECTIONS BY REASON ===");
    if r.rejections_by_reason.is_empty() {
        println!("  (none)");
    } else {
        for (reason, count) in &r.rejections_by_reason {
            println!("  {reason:<28} {count}");
        }
    }

    println!();
    println!("=== TOP STORES BY RECOMMENDED UNITS ===");
    let mut ranked: Vec<&StoreSummary> = output
        .summaries
        .iter()
        .filter(|s| s.opportunity_count > 0)
        .collect();
    ranked.sort_by(|a, b| {
        b.total_recommended_quantity
            .cmp(&a.total_recommended_quantity)
            .then_with(|| a.store_id.cmp(&b.store_id))
    });
    if ranked.is_empty() {
        println!("  (no retained opportunities)");
    }
    for s in ranked.into_iter().take(top) {
        println!(
            "  {} | {} opps | {} units | invest ${:.0} | uplift ${:.0} | sell-through {:.2}",
            s.store_id,
            s.opportunity_count,
            s.total_recommended_quantity,
            s.total_investment_required,
            s.total_margin_uplift,
            s.average_predicted_sell_through
        );
    }
}

fn string_arg<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.windows(2)
        .find(|w| w[0] == flag)
        .map(|w| w[1].as_str())
}

fn parse_arg<T: std::str::FromStr + Copy>(args: &[String], flag: &str, default: T) -> T {
    args.windows(2)
        .find(|w| w[0] == flag)
        .and_then(|w| w[1].parse().ok())
        .unwrap_or(default)
}
