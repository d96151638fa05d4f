//! Trailing-twelve-month aggregation as knowable at each acceptance date.
//!
//! Every calendar day on which a company's quarterly filing was accepted is a
//! candidate calculation date. A TTM record is produced for that day only if
//! four distinct quarters were already accepted and fall inside the lookback
//! window, so the history never uses a figure before it was public.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Months, NaiveDate, NaiveDateTime};
use serde_json::json;
use tracing::{info, warn};

use super::{MergeLoader, RunFilter};
use crate::calc::ensure_finite;
use crate::error::{CalculationError, EtlError};
use crate::etl::monitor::JobMonitor;
use crate::etl::{EtlSettings, Extraction, Extractor, Pipeline, Transformation, Transformer};
use crate::models::{BalanceSnapshot, FlowMetrics, Fundamentals, TtmRecord};
use crate::warehouse::mapping::map_rows;
use crate::warehouse::{SqlValue, Warehouse};

pub const JOB_NAME: &str = "ttm_calculation";
pub const LAYER: &str = "ttm_records";
pub const QUARTERS_PER_TTM: usize = 4;
pub const LOOKBACK_MONTHS: u32 = 15;

/// A (company, calculation date) pair with enough quarters to aggregate.
#[derive(Debug, Clone)]
pub struct TtmOpportunity {
    pub symbol: String,
    pub calculation_date: NaiveDate,
    /// Latest acceptance timestamp on `calculation_date`.
    pub accepted_date: NaiveDateTime,
    /// All quarterly records of the company, shared across its opportunities.
    pub history: Arc<Vec<Fundamentals>>,
}

/// Quarters with `fiscal_date` after this date are inside the window for `date`.
pub fn window_start(date: NaiveDate) -> NaiveDate {
    date.checked_sub_months(Months::new(LOOKBACK_MONTHS)).unwrap_or(NaiveDate::MIN)
}

/// Quarterly records knowable on `date` inside the lookback window, newest
/// fiscal period first, one record per fiscal date.
pub fn knowable_quarters(history: &[Fundamentals], date: NaiveDate) -> Vec<&Fundamentals> {
    let start = window_start(date);
    let mut quarters: Vec<&Fundamentals> = history
        .iter()
        .filter(|q| q.period_type.is_quarterly() && q.is_known_on(date) && q.fiscal_date > start)
        .collect();
    quarters.sort_by(|a, b| b.fiscal_date.cmp(&a.fiscal_date).then(b.accepted_date.cmp(&a.accepted_date)));
    quarters.dedup_by_key(|q| q.fiscal_date);
    quarters
}

/// Find every acceptance day of `symbol` that yields a TTM not yet stored.
pub fn discover_opportunities(
    symbol: &str,
    history: Arc<Vec<Fundamentals>>,
    existing: &HashSet<NaiveDate>,
) -> Vec<TtmOpportunity> {
    // multiple acceptances on one day collapse to the latest timestamp
    let mut acceptance_days: BTreeMap<NaiveDate, NaiveDateTime> = BTreeMap::new();
    for accepted in history
        .iter()
        .filter(|q| q.period_type.is_quarterly())
        .filter_map(|q| q.accepted_date)
    {
        acceptance_days
            .entry(accepted.date())
            .and_modify(|latest| *latest = (*latest).max(accepted))
            .or_insert(accepted);
    }

    acceptance_days
        .into_iter()
        .filter(|(day, _)| !existing.contains(day))
        .filter(|(day, _)| knowable_quarters(&history, *day).len() >= QUARTERS_PER_TTM)
        .map(|(day, accepted)| TtmOpportunity {
            symbol: symbol.to_string(),
            calculation_date: day,
            accepted_date: accepted,
            history: Arc::clone(&history),
        })
        .collect()
}

/// Sum flows over the 4 latest knowable quarters and snapshot the newest
/// quarter's balance sheet. `None` when fewer than 4 quarters qualify.
pub fn aggregate(opportunity: &TtmOpportunity) -> Result<Option<TtmRecord>, CalculationError> {
    let quarters: Vec<&Fundamentals> = knowable_quarters(&opportunity.history, opportunity.calculation_date)
        .into_iter()
        .take(QUARTERS_PER_TTM)
        .collect();
    if quarters.len() < QUARTERS_PER_TTM {
        return Ok(None);
    }

    for quarter in &quarters {
        for (field, value) in FlowMetrics::COLUMNS.iter().zip(quarter.flows.values()) {
            ensure_finite(field, value)?;
        }
        for (field, value) in BalanceSnapshot::COLUMNS.iter().zip(quarter.balance.values()) {
            ensure_finite(field, value)?;
        }
    }

    let newest = quarters[0];
    let oldest = quarters[QUARTERS_PER_TTM - 1];
    Ok(Some(TtmRecord {
        ttm_key: None,
        symbol: opportunity.symbol.clone(),
        calculation_date: opportunity.calculation_date,
        accepted_date: opportunity.accepted_date,
        quarters_included: QUARTERS_PER_TTM as u32,
        oldest_quarter_date: oldest.fiscal_date,
        newest_quarter_date: newest.fiscal_date,
        flows: FlowMetrics::sum(quarters.iter().map(|q| &q.flows)),
        latest: newest.balance.clone(),
    }))
}

pub struct TtmExtractor {
    warehouse: Arc<dyn Warehouse>,
    filter: RunFilter,
}

impl TtmExtractor {
    pub fn new(warehouse: Arc<dyn Warehouse>, filter: RunFilter) -> Self {
        Self { warehouse, filter }
    }

    async fn existing_dates(&self) -> Result<(HashMap<String, HashSet<NaiveDate>>, Vec<String>), EtlError> {
        let mut params: Vec<SqlValue> = Vec::new();
        let sql = format!(
            "SELECT symbol, calculation_date FROM fundamentals_ttm WHERE 1=1{}",
            self.filter.symbol_clause("symbol", &mut params)
        );
        let mut existing: HashMap<String, HashSet<NaiveDate>> = HashMap::new();
        let mut errors = Vec::new();
        for row in self.warehouse.fetch(&sql, &params).await? {
            match (row.required_text("symbol"), row.required_date("calculation_date")) {
                (Ok(symbol), Ok(date)) => {
                    existing.entry(symbol).or_default().insert(date);
                }
                (Err(e), _) | (_, Err(e)) => errors.push(format!("fundamentals_ttm: {}", e)),
            }
        }
        Ok((existing, errors))
    }
}

#[async_trait]
impl Extractor for TtmExtractor {
    type Record = TtmOpportunity;

    async fn extract(&self) -> Result<Extraction<TtmOpportunity>, EtlError> {
        let mut params: Vec<SqlValue> = Vec::new();
        let sql = format!(
            "SELECT * FROM fundamentals \
             WHERE period_type IN ('Q1', 'Q2', 'Q3', 'Q4') AND accepted_date IS NOT NULL{} \
             ORDER BY symbol, fiscal_date",
            self.filter.symbol_clause("symbol", &mut params)
        );
        let rows = self.warehouse.fetch(&sql, &params).await?;
        let (quarters, mut errors) = map_rows::<Fundamentals>(&rows);

        let (existing, existing_errors) = self.existing_dates().await?;
        errors.extend(existing_errors);

        let mut by_symbol: BTreeMap<String, Vec<Fundamentals>> = BTreeMap::new();
        for quarter in quarters {
            by_symbol.entry(quarter.symbol.clone()).or_default().push(quarter);
        }

        let no_dates = HashSet::new();
        let mut opportunities = Vec::new();
        for (symbol, history) in by_symbol {
            let done = existing.get(&symbol).unwrap_or(&no_dates);
            opportunities.extend(discover_opportunities(&symbol, Arc::new(history), done));
        }

        info!("🔎 Found {} TTM calculation opportunities", opportunities.len());
        Ok(Extraction {
            records: opportunities,
            errors,
        })
    }
}

pub struct TtmTransformer;

impl Transformer for TtmTransformer {
    type Input = TtmOpportunity;
    type Output = TtmRecord;

    fn transform(&self, opportunities: Vec<TtmOpportunity>) -> Transformation<TtmRecord> {
        info!("🧮 Calculating TTM metrics for {} opportunities", opportunities.len());
        let total = opportunities.len();
        let mut records = Vec::with_capacity(total);
        let mut errors = Vec::new();
        let mut calculation_errors = 0;
        let mut incomplete = 0;

        for opportunity in &opportunities {
            match aggregate(opportunity) {
                Ok(Some(record)) => records.push(record),
                Ok(None) => {
                    incomplete += 1;
                    warn!(
                        "Insufficient quarters for {} on {}",
                        opportunity.symbol, opportunity.calculation_date
                    );
                }
                Err(e) => {
                    calculation_errors += 1;
                    warn!(
                        "Failed to calculate TTM for {} on {}: {}",
                        opportunity.symbol, opportunity.calculation_date, e
                    );
                    errors.push(format!("{} {}: {}", opportunity.symbol, opportunity.calculation_date, e));
                }
            }
        }

        let mut transformation = Transformation::single(LAYER, records);
        transformation.errors = errors;
        transformation.calculation_errors = calculation_errors;
        transformation.metadata.insert("opportunities".into(), json!(total));
        transformation.metadata.insert("skipped_incomplete".into(), json!(incomplete));
        transformation
    }
}

pub type TtmPipeline = Pipeline<TtmExtractor, TtmTransformer, MergeLoader<TtmRecord>>;

pub fn pipeline(warehouse: Arc<dyn Warehouse>, settings: EtlSettings, filter: RunFilter) -> TtmPipeline {
    Pipeline::new(
        JOB_NAME,
        TtmExtractor::new(Arc::clone(&warehouse), filter),
        TtmTransformer,
        MergeLoader::insert_if_absent(Arc::clone(&warehouse), &["symbol", "calculation_date"]),
        settings,
    )
    .with_monitor(JobMonitor::new(warehouse))
}
