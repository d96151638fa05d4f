//! Profitability, liquidity, leverage and efficiency ratios, one record per
//! fundamentals record.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::json;
use tracing::{info, warn};

use super::{MergeLoader, RunFilter};
use crate::calc::{ensure_finite, percent, ratio2};
use crate::error::{CalculationError, EtlError};
use crate::etl::monitor::JobMonitor;
use crate::etl::{EtlSettings, Extraction, Extractor, Pipeline, Transformation, Transformer};
use crate::models::{BalanceSnapshot, FlowMetrics, Fundamentals, RatioRecord};
use crate::warehouse::mapping::map_rows;
use crate::warehouse::{SqlValue, Warehouse};

pub const JOB_NAME: &str = "ratio_calculation";
pub const LAYER: &str = "ratios";

/// An unreported numerator counts as zero once its denominator qualifies.
fn reported(value: Option<f64>) -> Option<f64> {
    Some(value.unwrap_or(0.0))
}

/// Derive every ratio for one fundamentals record. Ratios whose denominator
/// is missing or not strictly positive are `None`.
pub fn compute_ratios(record: &Fundamentals, created_at: DateTime<Utc>) -> Result<RatioRecord, CalculationError> {
    let financial_key = record.financial_key.ok_or(CalculationError::MissingKey)?;
    for (field, value) in FlowMetrics::COLUMNS.iter().zip(record.flows.values()) {
        ensure_finite(field, value)?;
    }
    for (field, value) in BalanceSnapshot::COLUMNS.iter().zip(record.balance.values()) {
        ensure_finite(field, value)?;
    }

    let flows = &record.flows;
    let balance = &record.balance;
    // Inventory is not captured, so quick ratio equals current ratio.
    let current_assets = reported(balance.current_assets);
    let quick_assets = current_assets.map(|assets| assets - 0.0);
    let net_income = reported(flows.net_income);
    let total_debt = reported(balance.total_debt);

    Ok(RatioRecord {
        financial_key,
        symbol: record.symbol.clone(),
        fiscal_date: record.fiscal_date,
        period_type: record.period_type,
        gross_margin: percent(reported(flows.gross_profit), flows.revenue),
        operating_margin: percent(reported(flows.operating_income), flows.revenue),
        profit_margin: percent(net_income, flows.revenue),
        roe: percent(net_income, balance.total_equity),
        roa: percent(net_income, balance.total_assets),
        current_ratio: ratio2(current_assets, balance.current_liabilities),
        quick_ratio: ratio2(quick_assets, balance.current_liabilities),
        debt_to_equity: ratio2(total_debt, balance.total_equity),
        debt_to_assets: ratio2(total_debt, balance.total_assets),
        asset_turnover: ratio2(flows.revenue.filter(|r| *r > 0.0), balance.total_assets),
        book_value_per_share: ratio2(balance.total_equity.filter(|e| *e > 0.0), balance.shares_outstanding),
        created_at,
    })
}

/// Reads fundamentals that have no ratio record yet.
pub struct RatioExtractor {
    warehouse: Arc<dyn Warehouse>,
    filter: RunFilter,
}

impl RatioExtractor {
    pub fn new(warehouse: Arc<dyn Warehouse>, filter: RunFilter) -> Self {
        Self { warehouse, filter }
    }
}

#[async_trait]
impl Extractor for RatioExtractor {
    type Record = Fundamentals;

    async fn extract(&self) -> Result<Extraction<Fundamentals>, EtlError> {
        let mut params: Vec<SqlValue> = Vec::new();
        let mut sql = String::from(
            "SELECT f.* FROM fundamentals f \
             LEFT JOIN financial_ratios r ON r.financial_key = f.financial_key \
             WHERE r.financial_key IS NULL",
        );
        sql.push_str(&self.filter.symbol_clause("f.symbol", &mut params));
        sql.push_str(&self.filter.date_clause("f.fiscal_date", &mut params));
        sql.push_str(" ORDER BY f.symbol, f.fiscal_date");

        let rows = self.warehouse.fetch(&sql, &params).await?;
        let (records, errors) = map_rows::<Fundamentals>(&rows);
        info!("📊 Found {} fundamentals records without ratios", records.len());
        Ok(Extraction { records, errors })
    }
}

pub struct RatioTransformer;

impl Transformer for RatioTransformer {
    type Input = Fundamentals;
    type Output = RatioRecord;

    fn transform(&self, records: Vec<Fundamentals>) -> Transformation<RatioRecord> {
        let created_at = Utc::now();
        let mut ratios = Vec::with_capacity(records.len());
        let mut errors = Vec::new();
        let mut calculation_errors = 0;

        for record in &records {
            match compute_ratios(record, created_at) {
                Ok(r) => ratios.push(r),
                Err(e) => {
                    calculation_errors += 1;
                    warn!("Failed to calculate ratios for {} {}: {}", record.symbol, record.fiscal_date, e);
                    errors.push(format!("{} {} {}: {}", record.symbol, record.fiscal_date, record.period_type, e));
                }
            }
        }
        info!("🧮 Calculated ratios for {} of {} records", ratios.len(), records.len());

        let mut transformation = Transformation::single(LAYER, ratios);
        transformation.errors = errors;
        transformation.calculation_errors = calculation_errors;
        transformation.metadata.insert("input_records".into(), json!(records.len()));
        transformation
    }
}

pub type RatioPipeline = Pipeline<RatioExtractor, RatioTransformer, MergeLoader<RatioRecord>>;

pub fn pipeline(warehouse: Arc<dyn Warehouse>, settings: EtlSettings, filter: RunFilter) -> RatioPipeline {
    Pipeline::new(
        JOB_NAME,
        RatioExtractor::new(Arc::clone(&warehouse), filter),
        RatioTransformer,
        MergeLoader::insert_if_absent(Arc::clone(&warehouse), &["financial_key"]),
        settings,
    )
    .with_monitor(JobMonitor::new(warehouse))
}
