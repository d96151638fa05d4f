//! Point-in-time valuation multiples for each daily close.
//!
//! A close on day `d` is valued against the latest quarterly fundamentals and
//! the latest TTM aggregate accepted no later than midnight starting `d`. A
//! filing accepted during day `d` first applies to the close of `d + 1`.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde_json::json;
use tracing::{debug, info, warn};

use super::{MergeLoader, RunFilter};
use crate::calc::{ensure_finite, percent, positive, ratio, ratio2, round2};
use crate::error::{CalculationError, EtlError};
use crate::etl::monitor::JobMonitor;
use crate::etl::{EtlSettings, Extraction, Extractor, Pipeline, Transformation, Transformer};
use crate::models::{DailyPrice, Fundamentals, MarketMetricRecord, TtmRecord};
use crate::warehouse::mapping::map_rows;
use crate::warehouse::{SqlValue, TableRecord, Warehouse};

pub const JOB_NAME: &str = "market_metrics";
pub const LAYER: &str = "metrics";
pub const TTM_PERIOD: &str = "TTM";

/// A quarterly fundamentals record with the ratio engine's book value.
#[derive(Debug, Clone, PartialEq)]
pub struct QuarterSnapshot {
    pub fundamentals: Fundamentals,
    pub book_value_per_share: Option<f64>,
}

impl QuarterSnapshot {
    fn accepted_date(&self) -> Option<NaiveDateTime> {
        self.fundamentals.accepted_date
    }
}

/// One close price joined with what was knowable on its date.
#[derive(Debug, Clone)]
pub struct PricePoint {
    pub price: DailyPrice,
    pub quarter: Option<Arc<QuarterSnapshot>>,
    pub ttm: Option<Arc<TtmRecord>>,
}

/// Latest item accepted by the start of `date`; `items` must be sorted by acceptance.
fn latest_known<T>(items: &[Arc<T>], date: NaiveDate, accepted: impl Fn(&T) -> NaiveDateTime) -> Option<Arc<T>> {
    let cutoff = date.and_time(NaiveTime::MIN);
    let known = items.partition_point(|item| accepted(item.as_ref()) <= cutoff);
    known.checked_sub(1).map(|i| Arc::clone(&items[i]))
}

/// Per-company acceptance-ordered history used for the point-in-time join.
#[derive(Debug, Default)]
pub struct KnowledgeTimeline {
    quarters: HashMap<String, Vec<Arc<QuarterSnapshot>>>,
    ttm: HashMap<String, Vec<Arc<TtmRecord>>>,
}

impl KnowledgeTimeline {
    pub fn new(quarters: Vec<QuarterSnapshot>, ttm: Vec<TtmRecord>) -> Self {
        let mut timeline = Self::default();
        for quarter in quarters.into_iter().filter(|q| q.accepted_date().is_some()) {
            timeline
                .quarters
                .entry(quarter.fundamentals.symbol.clone())
                .or_default()
                .push(Arc::new(quarter));
        }
        for record in ttm {
            timeline.ttm.entry(record.symbol.clone()).or_default().push(Arc::new(record));
        }

        // ties on acceptance go to the later fiscal period
        for history in timeline.quarters.values_mut() {
            history.sort_by_key(|q| (q.accepted_date(), q.fundamentals.fiscal_date));
        }
        for history in timeline.ttm.values_mut() {
            history.sort_by_key(|t| (t.accepted_date, t.calculation_date));
        }
        timeline
    }

    /// `None` when nothing was knowable for the price's company on its date.
    pub fn join(&self, price: DailyPrice) -> Option<PricePoint> {
        let quarter = self.quarters.get(&price.symbol).and_then(|history| {
            latest_known(history, price.price_date, |q| q.accepted_date().unwrap_or(NaiveDateTime::MAX))
        });
        let ttm = self
            .ttm
            .get(&price.symbol)
            .and_then(|history| latest_known(history, price.price_date, |t| t.accepted_date));

        if quarter.is_none() && ttm.is_none() {
            return None;
        }
        Some(PricePoint { price, quarter, ttm })
    }
}

/// Compute every multiple for one price point. Undefined multiples are `None`.
pub fn compute_metrics(point: &PricePoint, created_at: DateTime<Utc>) -> Result<MarketMetricRecord, CalculationError> {
    let close = point.price.close_price;
    ensure_finite("close_price", Some(close))?;

    let quarter = point.quarter.as_deref();
    let fundamentals = quarter.map(|q| &q.fundamentals);
    let ttm = point.ttm.as_deref();

    let q_flows = fundamentals.map(|f| &f.flows);
    let q_balance = fundamentals.map(|f| &f.balance);
    let ttm_flows = ttm.map(|t| &t.flows);
    let ttm_balance = ttm.map(|t| &t.latest);

    let price = positive(Some(close));
    let shares = positive(
        ttm_balance
            .and_then(|b| b.shares_outstanding)
            .or_else(|| q_balance.and_then(|b| b.shares_outstanding)),
    );

    let market_cap = price.zip(shares).map(|(p, s)| round2(p * s));
    let total_debt = ttm_balance
        .and_then(|b| b.total_debt)
        .or_else(|| q_balance.and_then(|b| b.total_debt))
        .unwrap_or(0.0);
    let cash = ttm_balance
        .and_then(|b| b.cash_and_equivalents)
        .or_else(|| q_balance.and_then(|b| b.cash_and_equivalents))
        .unwrap_or(0.0);
    let enterprise_value = market_cap.map(|mc| round2(mc + total_debt - cash));
    let positive_ev = positive(enterprise_value);

    let q_revenue = q_flows.and_then(|f| f.revenue);
    let ttm_revenue = ttm_flows.and_then(|f| f.revenue);
    let ev_to_ebitda = ratio2(positive_ev, q_flows.and_then(|f| f.operating_income));

    // dividends paid are cash outflows, so only negative figures count
    let dividends = ttm_flows.and_then(|f| f.dividends_paid).filter(|d| *d < 0.0).map(f64::abs);
    let ttm_net_income = ttm_flows.and_then(|f| f.net_income);

    let record = MarketMetricRecord {
        symbol: point.price.symbol.clone(),
        price_date: point.price.price_date,
        financial_key: fundamentals.and_then(|f| f.financial_key),
        fiscal_period: fundamentals
            .map(|f| f.period_type.as_str())
            .unwrap_or(TTM_PERIOD)
            .to_string(),
        fiscal_date: fundamentals.map(|f| f.fiscal_date),
        close_price: close,
        market_cap,
        enterprise_value,
        pe_ratio: ratio2(price, q_flows.and_then(|f| f.eps_diluted)),
        pe_ratio_ttm: ratio2(price, ttm_flows.and_then(|f| f.eps_diluted)),
        pb_ratio: ratio2(price, quarter.and_then(|q| q.book_value_per_share)),
        ps_ratio: ratio2(price, ratio(q_revenue, shares)),
        ps_ratio_ttm: ratio2(price, ratio(ttm_revenue, shares)),
        ev_to_revenue: ratio2(positive_ev, q_revenue),
        ev_to_revenue_ttm: ratio2(positive_ev, ttm_revenue),
        ev_to_ebitda,
        ev_to_ebit: ev_to_ebitda,
        dividend_yield: percent(ratio(dividends, shares), price),
        payout_ratio: percent(dividends, ttm_net_income),
        peg_ratio: None,
        is_ttm: ttm_revenue.map(|r| r != 0.0).unwrap_or(false),
        quarterly_accepted_date: fundamentals.and_then(|f| f.accepted_date),
        ttm_accepted_date: ttm.map(|t| t.accepted_date),
        created_at,
    };

    for (field, value) in [
        ("market_cap", record.market_cap),
        ("enterprise_value", record.enterprise_value),
    ] {
        ensure_finite(field, value)?;
    }
    Ok(record)
}

pub struct MarketMetricsExtractor {
    warehouse: Arc<dyn Warehouse>,
    filter: RunFilter,
}

impl MarketMetricsExtractor {
    pub fn new(warehouse: Arc<dyn Warehouse>, filter: RunFilter) -> Self {
        Self { warehouse, filter }
    }

    async fn unvalued_prices(&self) -> Result<(Vec<DailyPrice>, Vec<String>), EtlError> {
        let mut params: Vec<SqlValue> = Vec::new();
        let mut sql = String::from(
            "SELECT p.* FROM daily_prices p \
             WHERE NOT EXISTS (\
                 SELECT 1 FROM market_metrics m \
                 WHERE m.symbol = p.symbol AND m.price_date = p.price_date)",
        );
        sql.push_str(&self.filter.symbol_clause("p.symbol", &mut params));
        sql.push_str(&self.filter.date_clause("p.price_date", &mut params));
        sql.push_str(" ORDER BY p.symbol, p.price_date");

        let rows = self.warehouse.fetch(&sql, &params).await?;
        Ok(map_rows::<DailyPrice>(&rows))
    }

    async fn quarters(&self) -> Result<(Vec<QuarterSnapshot>, Vec<String>), EtlError> {
        let mut params: Vec<SqlValue> = Vec::new();
        let sql = format!(
            "SELECT f.*, r.book_value_per_share AS ratio_book_value_per_share \
             FROM fundamentals f \
             LEFT JOIN financial_ratios r ON r.financial_key = f.financial_key \
             WHERE f.period_type IN ('Q1', 'Q2', 'Q3', 'Q4') AND f.accepted_date IS NOT NULL{}",
            self.filter.symbol_clause("f.symbol", &mut params)
        );

        let mut snapshots = Vec::new();
        let mut errors = Vec::new();
        for row in self.warehouse.fetch(&sql, &params).await? {
            let snapshot = Fundamentals::from_row(&row).and_then(|fundamentals| {
                Ok(QuarterSnapshot {
                    fundamentals,
                    book_value_per_share: row.f64("ratio_book_value_per_share")?,
                })
            });
            match snapshot {
                Ok(s) => snapshots.push(s),
                Err(e) => errors.push(format!("{}: {}", Fundamentals::TABLE, e)),
            }
        }
        Ok((snapshots, errors))
    }

    async fn ttm_records(&self) -> Result<(Vec<TtmRecord>, Vec<String>), EtlError> {
        let mut params: Vec<SqlValue> = Vec::new();
        let sql = format!(
            "SELECT * FROM fundamentals_ttm WHERE 1=1{}",
            self.filter.symbol_clause("symbol", &mut params)
        );
        let rows = self.warehouse.fetch(&sql, &params).await?;
        Ok(map_rows::<TtmRecord>(&rows))
    }
}

#[async_trait]
impl Extractor for MarketMetricsExtractor {
    type Record = PricePoint;

    async fn extract(&self) -> Result<Extraction<PricePoint>, EtlError> {
        let (prices, mut errors) = self.unvalued_prices().await?;
        if prices.is_empty() {
            info!("No unvalued prices found");
            return Ok(Extraction { records: Vec::new(), errors });
        }

        let (quarters, quarter_errors) = self.quarters().await?;
        let (ttm, ttm_errors) = self.ttm_records().await?;
        errors.extend(quarter_errors);
        errors.extend(ttm_errors);

        let timeline = KnowledgeTimeline::new(quarters, ttm);
        let total = prices.len();
        let mut points = Vec::with_capacity(total);
        for price in prices {
            let (symbol, date) = (price.symbol.clone(), price.price_date);
            match timeline.join(price) {
                Some(point) => points.push(point),
                None => debug!("No fundamentals knowable for {} on {}", symbol, date),
            }
        }

        info!(
            "💹 Joined {} of {} prices with point-in-time fundamentals ({} without data)",
            points.len(),
            total,
            total - points.len()
        );
        Ok(Extraction { records: points, errors })
    }
}

pub struct MarketMetricsTransformer;

impl Transformer for MarketMetricsTransformer {
    type Input = PricePoint;
    type Output = MarketMetricRecord;

    fn transform(&self, points: Vec<PricePoint>) -> Transformation<MarketMetricRecord> {
        let created_at = Utc::now();
        let mut metrics = Vec::with_capacity(points.len());
        let mut errors = Vec::new();
        let mut calculation_errors = 0;

        for point in &points {
            match compute_metrics(point, created_at) {
                Ok(record) => metrics.push(record),
                Err(e) => {
                    calculation_errors += 1;
                    warn!(
                        "Failed to calculate metrics for {} on {}: {}",
                        point.price.symbol, point.price.price_date, e
                    );
                    errors.push(format!("{} {}: {}", point.price.symbol, point.price.price_date, e));
                }
            }
        }
        let ttm_backed = metrics.iter().filter(|m| m.ttm_accepted_date.is_some()).count();
        info!("🧮 Calculated metrics for {} of {} prices", metrics.len(), points.len());

        let mut transformation = Transformation::single(LAYER, metrics);
        transformation.errors = errors;
        transformation.calculation_errors = calculation_errors;
        transformation.metadata.insert("price_points".into(), json!(points.len()));
        transformation.metadata.insert("ttm_backed".into(), json!(ttm_backed));
        transformation
    }
}

pub type MarketMetricsPipeline = Pipeline<MarketMetricsExtractor, MarketMetricsTransformer, MergeLoader<MarketMetricRecord>>;

pub fn pipeline(warehouse: Arc<dyn Warehouse>, settings: EtlSettings, filter: RunFilter) -> MarketMetricsPipeline {
    Pipeline::new(
        JOB_NAME,
        MarketMetricsExtractor::new(Arc::clone(&warehouse), filter),
        MarketMetricsTransformer,
        MergeLoader::insert_if_absent(Arc::clone(&warehouse), &["symbol", "price_date"]),
        settings,
    )
    .with_monitor(JobMonitor::new(warehouse))
}
