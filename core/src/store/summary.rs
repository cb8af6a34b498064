use super::{output::storable, GapStore};
use crate::{aggregator::StoreSummary, error::PipelineResult};
use rusqlite::{params, Connection};

pub(super) fn insert_summaries(
    conn: &Connection,
    run_id: &str,
    summaries: &[StoreSummary],
) -> PipelineResult<()> {
    let mut stmt = conn.prepare(
        "INSERT INTO store_summary (
            run_id, store_id, peer_group_id, opportunity_count,
            total_recommended_quantity, total_investment_required,
            average_predicted_sell_through, distinct_feature_count,
            total_expected_sales, total_margin_uplift
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
    )?;
    for s in summaries {
        stmt.execute(params![
            run_id,
            s.store_id,
            s.peer_group_id,
            s.opportunity_count as i64,
            storable(s.total_recommended_quantity)?,
            s.total_investment_required,
            s.average_predicted_sell_through,
            s.distinct_feature_count as i64,
            s.total_expected_sales,
            s.total_margin_uplift,
        ])?;
    }
    Ok(())
}

impl GapStore {
    pub fn store_summaries_for_run(&self, run_id: &str) -> PipelineResult<Vec<StoreSummary>> {
        let mut stmt = self.conn.prepare(
            "SELECT store_id, peer_group_id, opportunity_count,
                    total_recommended_quantity, total_investment_required,
                    average_predicted_sell_through, distinct_feature_count,
                    total_expected_sales, total_margin_uplift
             FROM store_summary
             WHERE run_id = ?1
             ORDER BY store_id ASC",
        )?;
        let rows = stmt
            .query_map(params![run_id], |row| {
                Ok(StoreSummary {
                    store_id: row.get(0)?,
                    peer_group_id: row.get(1)?,
                    opportunity_count: row.get::<_, i64>(2)? as usize,
                    total_recommended_quantity: row.get::<_, i64>(3)? as u64,
                    total_investment_required: row.get(4)?,
                    average_predicted_sell_through: row.get(5)?,
                    distinct_feature_count: row.get::<_, i64>(6)? as usize,
                    total_expected_sales: row.get(7)?,
                    total_margin_uplift: row.get(8)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn store_summary_count(&self, run_id: &str) -> PipelineResult<i64> {
        let count = self.conn.query_row(
            "SELECT COUNT(*) FROM store_summary WHERE run_id = ?1",
            params![run_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }
}
