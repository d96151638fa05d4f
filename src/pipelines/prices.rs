//! End-of-day prices: API → staging → `daily_prices`.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, NaiveDate, Utc};
use futures::stream::{self, StreamExt};
use serde_json::json;
use tracing::{info, warn};

use super::{MergeLoader, FETCH_CONCURRENCY};
use crate::api::{ApiGateway, PriceBarDto};
use crate::error::EtlError;
use crate::etl::monitor::JobMonitor;
use crate::etl::{EtlSettings, Extraction, Extractor, Pipeline, Transformation, Transformer, STAGING_LAYER};
use crate::models::DailyPrice;
use crate::warehouse::{parse_date, Warehouse};

pub const JOB_NAME: &str = "historical_prices";
pub const DEFAULT_LOOKBACK_DAYS: i64 = 30;

/// Date range for fetching data
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

impl DateRange {
    /// Missing bounds default to the last 30 days.
    pub fn resolve(start_date: Option<NaiveDate>, end_date: Option<NaiveDate>) -> Self {
        let end_date = end_date.unwrap_or_else(|| Utc::now().date_naive());
        let start_date = start_date.unwrap_or(end_date - Duration::days(DEFAULT_LOOKBACK_DAYS));
        Self { start_date, end_date }
    }
}

/// A price bar tagged with the symbol it was requested for.
#[derive(Debug, Clone, PartialEq)]
pub struct SymbolBar {
    pub symbol: String,
    pub bar: PriceBarDto,
}

pub struct PriceExtractor {
    api: Arc<dyn ApiGateway>,
    symbols: Vec<String>,
    range: DateRange,
}

impl PriceExtractor {
    pub fn new(api: Arc<dyn ApiGateway>, symbols: Vec<String>, range: DateRange) -> Self {
        Self { api, symbols, range }
    }
}

#[async_trait]
impl Extractor for PriceExtractor {
    type Record = SymbolBar;

    async fn extract(&self) -> Result<Extraction<SymbolBar>, EtlError> {
        info!(
            "📅 Fetching prices for {} symbols from {} to {}",
            self.symbols.len(),
            self.range.start_date,
            self.range.end_date
        );
        let mut extraction = Extraction::default();
        let (from, to) = (Some(self.range.start_date), Some(self.range.end_date));

        let mut fetches = stream::iter(self.symbols.iter().cloned())
            .map(|symbol| async move {
                let fetched = self.api.fetch_prices(&symbol, from, to).await;
                (symbol, fetched)
            })
            .buffered(FETCH_CONCURRENCY);
        while let Some((symbol, fetched)) = fetches.next().await {
            match fetched {
                Ok(bars) => {
                    info!("✅ {} price bars for {}", bars.len(), symbol);
                    extraction.records.extend(bars.into_iter().map(|bar| SymbolBar {
                        symbol: symbol.clone(),
                        bar,
                    }));
                }
                Err(e) => {
                    warn!("❌ Failed to fetch prices for {}: {}", symbol, e);
                    extraction.errors.push(format!("{}: {}", symbol, e));
                }
            }
        }
        Ok(extraction)
    }
}

pub fn to_daily_price(item: SymbolBar) -> Result<DailyPrice, String> {
    let SymbolBar { symbol, bar } = item;
    let price_date = parse_date(&bar.date).ok_or_else(|| format!("{}: invalid price date {:?}", symbol, bar.date))?;
    let close_price = bar
        .close
        .ok_or_else(|| format!("{}@{}: missing close price", symbol, price_date))?;

    Ok(DailyPrice {
        symbol: bar.symbol.unwrap_or(symbol).to_uppercase(),
        price_date,
        open_price: bar.open,
        high_price: bar.high,
        low_price: bar.low,
        close_price,
        adj_close: bar.adj_close,
        volume: bar.volume.map(|v| v.round() as i64),
    })
}

pub struct PriceTransformer;

impl Transformer for PriceTransformer {
    type Input = SymbolBar;
    type Output = DailyPrice;

    fn transform(&self, bars: Vec<SymbolBar>) -> Transformation<DailyPrice> {
        let mut prices = Vec::with_capacity(bars.len());
        let mut errors = Vec::new();
        for bar in bars {
            match to_daily_price(bar) {
                Ok(price) => prices.push(price),
                Err(e) => errors.push(e),
            }
        }

        let skipped = errors.len();
        let mut transformation = Transformation::single(STAGING_LAYER, prices);
        transformation.errors = errors;
        transformation.metadata.insert("skipped_bars".into(), json!(skipped));
        transformation
    }
}

pub type PricePipeline = Pipeline<PriceExtractor, PriceTransformer, MergeLoader<DailyPrice>>;

pub fn pipeline(
    api: Arc<dyn ApiGateway>,
    warehouse: Arc<dyn Warehouse>,
    settings: EtlSettings,
    symbols: Vec<String>,
    range: DateRange,
) -> PricePipeline {
    Pipeline::new(
        JOB_NAME,
        PriceExtractor::new(api, symbols, range),
        PriceTransformer,
        MergeLoader::upsert(Arc::clone(&warehouse), &["symbol", "price_date"]),
        settings,
    )
    .with_monitor(JobMonitor::new(warehouse))
}
