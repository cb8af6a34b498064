//! Post-hoc output checks.
//!
//! RULE: Validation only inspects. It never recomputes, filters, or
//! repairs a row. A failure blocks persistence of the whole run.

use crate::{
    engine::RunOutput,
    error::{PipelineError, PipelineResult},
};
use std::collections::BTreeSet;

pub fn validate_output(output: &RunOutput) -> PipelineResult<()> {
    let mut problems = Vec::new();

    for opp in &output.opportunities {
        let key = format!("{}/{}", opp.store_id, opp.feature_id);
        if opp.recommended_quantity < 1 {
            problems.push(format!("{key}: recommended_quantity < 1"));
        }
        if i64::try_from(opp.recommended_quantity).is_err() {
            problems.push(format!("{key}: recommended_quantity exceeds storable range"));
        }
        if !opp.approved {
            problems.push(format!("{key}: retained without approval"));
        }
        let required = [
            ("predicted_sell_through", opp.predicted_sell_through),
            ("unit_cost", opp.unit_cost),
            ("margin_per_unit", opp.margin_per_unit),
            ("margin_uplift", opp.margin_uplift),
            ("investment_required", opp.investment_required),
            ("roi", opp.roi),
        ];
        for (column, value) in required {
            match value {
                None => problems.push(format!("{key}: missing column {column}")),
                Some(v) if !v.is_finite() => {
                    problems.push(format!("{key}: non-finite {column}"))
                }
                _ => {}
            }
        }
        if opp.cost_source.is_none() {
            problems.push(format!("{key}: missing column cost_source"));
        }
        if opp.investment_required.is_some_and(|v| v < 0.0) {
            problems.push(format!("{key}: negative investment_required"));
        }
        if !(opp.unit_price.is_finite() && opp.unit_price > 0.0) {
            problems.push(format!("{key}: invalid unit_price"));
        }
    }

    let mut seen = BTreeSet::new();
    for summary in &output.summaries {
        if !seen.insert(summary.store_id.as_str()) {
            problems.push(format!("{}: duplicate store summary", summary.store_id));
        }
        if i64::try_from(summary.total_recommended_quantity).is_err() {
            problems.push(format!(
                "{}: total_recommended_quantity exceeds storable range",
                summary.store_id
            ));
        }
        if summary.total_investment_required < 0.0 {
            problems.push(format!(
                "{}: negative total_investment_required",
                summary.store_id
            ));
        }
    }
    for opp in &output.opportunities {
        if !seen.contains(opp.store_id.as_str()) {
            problems.push(format!("{}: opportunity without store summary", opp.store_id));
        }
    }

    if problems.is_empty() {
        Ok(())
    } else {
        Err(PipelineError::ValidationFailure { problems })
    }
}
