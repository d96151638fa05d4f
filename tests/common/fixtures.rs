//! Record builders and an in-memory API gateway

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};

use fundamentals_etl::api::{ApiGateway, PriceBarDto, ProfileDto, ReportingPeriod, StatementKind, StatementLine};
use fundamentals_etl::models::{DailyPrice, Fundamentals, PeriodType};
use fundamentals_etl::{ApiError, EtlSettings};

/// Small batches and no retry delay.
pub fn settings() -> EtlSettings {
    EtlSettings {
        batch_size: 2,
        max_retries: 2,
        retry_delay: Duration::ZERO,
        enable_monitoring: true,
    }
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
}

pub fn at(y: i32, m: u32, d: u32, hour: u32) -> NaiveDateTime {
    date(y, m, d).and_hms_opt(hour, 0, 0).expect("valid time")
}

/// A quarterly record with revenue and total assets, accepted at `accepted`.
pub fn quarter(symbol: &str, fiscal_date: NaiveDate, period: PeriodType, accepted: NaiveDateTime, revenue: f64) -> Fundamentals {
    let mut record = Fundamentals::new(symbol, fiscal_date, period);
    record.filing_date = Some(accepted.date());
    record.accepted_date = Some(accepted);
    record.flows.revenue = Some(revenue);
    record.balance.total_assets = Some(revenue * 10.0);
    record
}

/// Four consecutive 2023 quarters with revenue 100, 110, 120, 130, the last
/// accepted on 2024-02-01.
pub fn fiscal_year_2023(symbol: &str) -> Vec<Fundamentals> {
    vec![
        quarter(symbol, date(2023, 3, 31), PeriodType::Q1, at(2023, 5, 1, 16), 100.0),
        quarter(symbol, date(2023, 6, 30), PeriodType::Q2, at(2023, 8, 1, 16), 110.0),
        quarter(symbol, date(2023, 9, 30), PeriodType::Q3, at(2023, 11, 1, 16), 120.0),
        quarter(symbol, date(2023, 12, 31), PeriodType::Q4, at(2024, 2, 1, 16), 130.0),
    ]
}

pub fn price(symbol: &str, price_date: NaiveDate, close: f64) -> DailyPrice {
    DailyPrice {
        symbol: symbol.to_string(),
        price_date,
        open_price: Some(close),
        high_price: Some(close),
        low_price: Some(close),
        close_price: close,
        adj_close: Some(close),
        volume: Some(1_000_000),
    }
}

pub fn profile(symbol: &str, name: &str) -> ProfileDto {
    ProfileDto {
        symbol: symbol.to_string(),
        company_name: Some(name.to_string()),
        sector: Some("Technology".to_string()),
        industry: Some("Consumer Electronics".to_string()),
        exchange: Some("NASDAQ".to_string()),
        market_cap: Some(3.0e12),
    }
}

pub fn bar(day: &str, close: f64) -> PriceBarDto {
    PriceBarDto {
        symbol: None,
        date: day.to_string(),
        open: Some(close - 1.0),
        high: Some(close + 1.0),
        low: Some(close - 2.0),
        close: Some(close),
        adj_close: Some(close),
        volume: Some(52_000_000.0),
    }
}

/// The identifying part of a statement line; callers fill in figures.
pub fn statement(symbol: &str, fiscal_date: &str, period: &str, accepted: &str) -> StatementLine {
    StatementLine {
        symbol: Some(symbol.to_string()),
        date: Some(fiscal_date.to_string()),
        period: Some(period.to_string()),
        filling_date: Some(accepted[..10].to_string()),
        accepted_date: Some(accepted.to_string()),
        ..Default::default()
    }
}

/// Canned API responses keyed by symbol. Symbols in `failing` answer every
/// call with a 500; `delay` stalls every call.
#[derive(Default)]
pub struct StaticApi {
    pub profiles: HashMap<String, ProfileDto>,
    pub prices: HashMap<String, Vec<PriceBarDto>>,
    pub statements: HashMap<(String, StatementKind), Vec<StatementLine>>,
    pub failing: HashSet<String>,
    pub delay: Option<Duration>,
    calls: AtomicU32,
}

impl StaticApi {
    pub fn with_profile(mut self, profile: ProfileDto) -> Self {
        self.profiles.insert(profile.symbol.clone(), profile);
        self
    }

    pub fn with_prices(mut self, symbol: &str, bars: Vec<PriceBarDto>) -> Self {
        self.prices.insert(symbol.to_string(), bars);
        self
    }

    pub fn with_statements(mut self, symbol: &str, kind: StatementKind, lines: Vec<StatementLine>) -> Self {
        self.statements.insert((symbol.to_string(), kind), lines);
        self
    }

    pub fn failing(mut self, symbol: &str) -> Self {
        self.failing.insert(symbol.to_string());
        self
    }

    pub fn stalled(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    async fn check(&self, symbol: &str) -> Result<(), ApiError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing.contains(symbol) {
            return Err(ApiError::Status {
                status: 500,
                body: "upstream unavailable".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl ApiGateway for StaticApi {
    async fn fetch_profile(&self, symbol: &str) -> Result<Option<ProfileDto>, ApiError> {
        self.check(symbol).await?;
        Ok(self.profiles.get(symbol).cloned())
    }

    async fn fetch_prices(
        &self,
        symbol: &str,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    ) -> Result<Vec<PriceBarDto>, ApiError> {
        self.check(symbol).await?;
        let bars = self.prices.get(symbol).cloned().unwrap_or_default();
        Ok(bars
            .into_iter()
            .filter(|b| {
                let day = NaiveDate::parse_from_str(&b.date, "%Y-%m-%d").ok();
                day.map_or(true, |d| from.map_or(true, |f| d >= f) && to.map_or(true, |t| d <= t))
            })
            .collect())
    }

    async fn fetch_statements(
        &self,
        symbol: &str,
        kind: StatementKind,
        _period: ReportingPeriod,
        limit: u32,
    ) -> Result<Vec<StatementLine>, ApiError> {
        self.check(symbol).await?;
        let mut lines = self.statements.get(&(symbol.to_string(), kind)).cloned().unwrap_or_default();
        lines.truncate(limit as usize);
        Ok(lines)
    }
}
