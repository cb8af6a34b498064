use super::GapStore;
use crate::{
    adoption::AdoptionRecord,
    error::PipelineResult,
    opportunity::{CostSource, Opportunity, PriceSource},
    rejection::Rejection,
};
use rusqlite::{params, Connection};
use std::collections::BTreeMap;

pub(super) fn insert_adoption(
    conn: &Connection,
    run_id: &str,
    records: &[AdoptionRecord],
) -> PipelineResult<()> {
    let mut stmt = conn.prepare(
        "INSERT INTO adoption (
            run_id, peer_group_id, feature_id, stores_selling, peer_group_size,
            adoption_rate, total_sales, well_selling
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
    )?;
    for r in records {
        stmt.execute(params![
            run_id,
            r.peer_group_id,
            r.feature_id,
            r.stores_selling as i64,
            r.peer_group_size as i64,
            r.adoption_rate,
            r.total_sales,
            if r.well_selling { 1i64 } else { 0i64 },
        ])?;
    }
    Ok(())
}

pub(super) fn insert_opportunities(
    conn: &Connection,
    run_id: &str,
    opportunities: &[Opportunity],
) -> PipelineResult<()> {
    let mut stmt = conn.prepare(
        "INSERT INTO opportunity (
            run_id, store_id, peer_group_id, feature_id,
            expected_sales, unit_price, price_source, recommended_quantity, n_comparables,
            predicted_sell_through, used_fallback,
            unit_cost, cost_source, margin_per_unit, margin_uplift, investment_required, roi
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)",
    )?;
    for o in opportunities {
        stmt.execute(params![
            run_id,
            o.store_id,
            o.peer_group_id,
            o.feature_id,
            o.expected_sales,
            o.unit_price,
            o.price_source.name(),
            storable(o.recommended_quantity)?,
            o.n_comparables as i64,
            o.predicted_sell_through,
            if o.used_fallback { 1i64 } else { 0i64 },
            o.unit_cost,
            o.cost_source.map(|c| c.name()),
            o.margin_per_unit,
            o.margin_uplift,
            o.investment_required,
            o.roi,
        ])?;
    }
    Ok(())
}

/// SQLite integers are signed; quantities above i64::MAX cannot be bound.
pub(super) fn storable(quantity: u64) -> rusqlite::Result<i64> {
    i64::try_from(quantity).map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))
}

pub(super) fn insert_rejections(
    conn: &Connection,
    run_id: &str,
    rejections: &[Rejection],
) -> PipelineResult<()> {
    let mut stmt = conn.prepare(
        "INSERT INTO rejection (
            run_id, store_id, peer_group_id, feature_id, stage, reasons, detail
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
    )?;
    for r in rejections {
        stmt.execute(params![
            run_id,
            r.store_id,
            r.peer_group_id,
            r.feature_id,
            r.stage.name(),
            r.reason_codes(),
            r.detail,
        ])?;
    }
    Ok(())
}

impl GapStore {
    pub fn opportunities_for_run(&self, run_id: &str) -> PipelineResult<Vec<Opportunity>> {
        let mut stmt = self.conn.prepare(
            "SELECT store_id, peer_group_id, feature_id,
                    expected_sales, unit_price, price_source, recommended_quantity, n_comparables,
                    predicted_sell_through, used_fallback,
                    unit_cost, cost_source, margin_per_unit, margin_uplift,
                    investment_required, roi
             FROM opportunity
             WHERE run_id = ?1
             ORDER BY store_id ASC, feature_id ASC",
        )?;

        let rows = stmt
            .query_map(params![run_id], |row| {
                let price_source: String = row.get(5)?;
                let cost_source: Option<String> = row.get(11)?;
                Ok(Opportunity {
                    store_id: row.get(0)?,
                    peer_group_id: row.get(1)?,
                    feature_id: row.get(2)?,
                    expected_sales: row.get(3)?,
                    unit_price: row.get(4)?,
                    price_source: PriceSource::from_name(&price_source).ok_or_else(|| {
                        rusqlite::Error::InvalidColumnType(
                            5,
                            "price_source".into(),
                            rusqlite::types::Type::Text,
                        )
                    })?,
                    recommended_quantity: row.get::<_, i64>(6)? as u64,
                    n_comparables: row.get::<_, i64>(7)? as usize,
                    predicted_sell_through: row.get(8)?,
                    used_fallback: row.get::<_, i64>(9)? != 0,
                    approved: true,
                    unit_cost: row.get(10)?,
                    cost_source: cost_source.as_deref().and_then(CostSource::from_name),
                    margin_per_unit: row.get(12)?,
                    margin_uplift: row.get(13)?,
                    investment_required: row.get(14)?,
                    roi: row.get(15)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn rejection_count(&self, run_id: &str) -> PipelineResult<i64> {
        let count = self.conn.query_row(
            "SELECT COUNT(*) FROM rejection WHERE run_id = ?1",
            params![run_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// Rejection counts grouped by stage name.
    pub fn rejections_by_stage(&self, run_id: &str) -> PipelineResult<BTreeMap<String, i64>> {
        let mut stmt = self.conn.prepare(
            "SELECT stage, COUNT(*) FROM rejection
             WHERE run_id = ?1
             GROUP BY stage",
        )?;
        let counts = stmt
            .query_map(params![run_id], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
            })?
            .collect::<Result<BTreeMap<_, _>, _>>()?;
        Ok(counts)
    }

    pub fn well_selling_pair_count(&self, run_id: &str) -> PipelineResult<i64> {
        let count = self.conn.query_row(
            "SELECT COUNT(*) FROM adoption WHERE run_id = ?1 AND well_selling = 1",
            params![run_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }
}
