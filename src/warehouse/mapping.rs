//! Typed record ⇄ warehouse row adapters.

use chrono::{DateTime, NaiveDateTime, Utc};

use super::WarehouseRow;
use crate::error::WarehouseError;
use crate::models::{
    BalanceSnapshot, CompanyProfile, DailyPrice, FlowMetrics, Fundamentals, MarketMetricRecord, PeriodType,
    RatioRecord, TtmRecord,
};

/// A struct with a home table in the warehouse.
pub trait TableRecord: Sized {
    const TABLE: &'static str;

    fn to_row(&self) -> WarehouseRow;

    fn from_row(row: &WarehouseRow) -> Result<Self, WarehouseError>;
}

fn period_type(row: &WarehouseRow, column: &str) -> Result<PeriodType, WarehouseError> {
    row.required_text(column)?
        .parse()
        .map_err(|e: String| WarehouseError::mapping(column, e))
}

fn utc(ts: NaiveDateTime) -> DateTime<Utc> {
    DateTime::from_naive_utc_and_offset(ts, Utc)
}

fn created_at(row: &WarehouseRow) -> Result<DateTime<Utc>, WarehouseError> {
    Ok(row.timestamp("created_at")?.map(utc).unwrap_or_else(Utc::now))
}

/// Read flow columns, each name prefixed with `prefix`.
pub fn flows_from_row(row: &WarehouseRow, prefix: &str) -> Result<FlowMetrics, WarehouseError> {
    let mut values = [None; 14];
    for (slot, column) in values.iter_mut().zip(FlowMetrics::COLUMNS) {
        *slot = row.f64(&format!("{prefix}{column}"))?;
    }
    Ok(FlowMetrics::from_values(values))
}

pub fn balance_from_row(row: &WarehouseRow, prefix: &str) -> Result<BalanceSnapshot, WarehouseError> {
    let mut values = [None; 9];
    for (slot, column) in values.iter_mut().zip(BalanceSnapshot::COLUMNS) {
        *slot = row.f64(&format!("{prefix}{column}"))?;
    }
    Ok(BalanceSnapshot::from_values(values))
}

fn push_flows(row: &mut WarehouseRow, flows: &FlowMetrics, prefix: &str) {
    for (column, value) in FlowMetrics::COLUMNS.iter().zip(flows.values()) {
        row.set(&format!("{prefix}{column}"), value);
    }
}

fn push_balance(row: &mut WarehouseRow, balance: &BalanceSnapshot, prefix: &str) {
    for (column, value) in BalanceSnapshot::COLUMNS.iter().zip(balance.values()) {
        row.set(&format!("{prefix}{column}"), value);
    }
}

impl TableRecord for Fundamentals {
    const TABLE: &'static str = "fundamentals";

    /// Leaves out `financial_key`, which the warehouse assigns.
    fn to_row(&self) -> WarehouseRow {
        let mut row = WarehouseRow::new()
            .with("symbol", self.symbol.as_str())
            .with("fiscal_date", self.fiscal_date)
            .with("period_type", self.period_type.as_str())
            .with("filing_date", self.filing_date)
            .with("accepted_date", self.accepted_date);
        push_flows(&mut row, &self.flows, "");
        push_balance(&mut row, &self.balance, "");
        row
    }

    fn from_row(row: &WarehouseRow) -> Result<Self, WarehouseError> {
        Ok(Self {
            financial_key: row.i64("financial_key")?,
            symbol: row.required_text("symbol")?,
            fiscal_date: row.required_date("fiscal_date")?,
            period_type: period_type(row, "period_type")?,
            filing_date: row.date("filing_date")?,
            accepted_date: row.timestamp("accepted_date")?,
            flows: flows_from_row(row, "")?,
            balance: balance_from_row(row, "")?,
        })
    }
}

impl TableRecord for DailyPrice {
    const TABLE: &'static str = "daily_prices";

    fn to_row(&self) -> WarehouseRow {
        WarehouseRow::new()
            .with("symbol", self.symbol.as_str())
            .with("price_date", self.price_date)
            .with("open_price", self.open_price)
            .with("high_price", self.high_price)
            .with("low_price", self.low_price)
            .with("close_price", self.close_price)
            .with("adj_close", self.adj_close)
            .with("volume", self.volume)
    }

    fn from_row(row: &WarehouseRow) -> Result<Self, WarehouseError> {
        Ok(Self {
            symbol: row.required_text("symbol")?,
            price_date: row.required_date("price_date")?,
            open_price: row.f64("open_price")?,
            high_price: row.f64("high_price")?,
            low_price: row.f64("low_price")?,
            close_price: row.required_f64("close_price")?,
            adj_close: row.f64("adj_close")?,
            volume: row.i64("volume")?,
        })
    }
}

impl TableRecord for CompanyProfile {
    const TABLE: &'static str = "companies";

    fn to_row(&self) -> WarehouseRow {
        WarehouseRow::new()
            .with("symbol", self.symbol.as_str())
            .with("company_name", self.company_name.as_str())
            .with("sector", self.sector.clone())
            .with("industry", self.industry.clone())
            .with("exchange", self.exchange.clone())
            .with("market_cap", self.market_cap)
            .with("updated_at", self.updated_at)
    }

    fn from_row(row: &WarehouseRow) -> Result<Self, WarehouseError> {
        Ok(Self {
            symbol: row.required_text("symbol")?,
            company_name: row.required_text("company_name")?,
            sector: row.text("sector")?,
            industry: row.text("industry")?,
            exchange: row.text("exchange")?,
            market_cap: row.f64("market_cap")?,
            updated_at: row.timestamp("updated_at")?.map(utc).unwrap_or_else(Utc::now),
        })
    }
}

impl TableRecord for TtmRecord {
    const TABLE: &'static str = "fundamentals_ttm";

    fn to_row(&self) -> WarehouseRow {
        let mut row = WarehouseRow::new()
            .with("symbol", self.symbol.as_str())
            .with("calculation_date", self.calculation_date)
            .with("accepted_date", self.accepted_date)
            .with("quarters_included", self.quarters_included)
            .with("oldest_quarter_date", self.oldest_quarter_date)
            .with("newest_quarter_date", self.newest_quarter_date);
        push_flows(&mut row, &self.flows, "ttm_");
        push_balance(&mut row, &self.latest, "latest_");
        row
    }

    fn from_row(row: &WarehouseRow) -> Result<Self, WarehouseError> {
        let quarters = row.required_i64("quarters_included")?;
        Ok(Self {
            ttm_key: row.i64("ttm_key")?,
            symbol: row.required_text("symbol")?,
            calculation_date: row.required_date("calculation_date")?,
            accepted_date: row.required_timestamp("accepted_date")?,
            quarters_included: u32::try_from(quarters)
                .map_err(|e| WarehouseError::mapping("quarters_included", e.to_string()))?,
            oldest_quarter_date: row.required_date("oldest_quarter_date")?,
            newest_quarter_date: row.required_date("newest_quarter_date")?,
            flows: flows_from_row(row, "ttm_")?,
            latest: balance_from_row(row, "latest_")?,
        })
    }
}

impl TableRecord for RatioRecord {
    const TABLE: &'static str = "financial_ratios";

    fn to_row(&self) -> WarehouseRow {
        WarehouseRow::new()
            .with("financial_key", self.financial_key)
            .with("symbol", self.symbol.as_str())
            .with("fiscal_date", self.fiscal_date)
            .with("period_type", self.period_type.as_str())
            .with("gross_margin", self.gross_margin)
            .with("operating_margin", self.operating_margin)
            .with("profit_margin", self.profit_margin)
            .with("roe", self.roe)
            .with("roa", self.roa)
            .with("current_ratio", self.current_ratio)
            .with("quick_ratio", self.quick_ratio)
            .with("debt_to_equity", self.debt_to_equity)
            .with("debt_to_assets", self.debt_to_assets)
            .with("asset_turnover", self.asset_turnover)
            .with("book_value_per_share", self.book_value_per_share)
            .with("created_at", self.created_at)
    }

    fn from_row(row: &WarehouseRow) -> Result<Self, WarehouseError> {
        Ok(Self {
            financial_key: row.required_i64("financial_key")?,
            symbol: row.required_text("symbol")?,
            fiscal_date: row.required_date("fiscal_date")?,
            period_type: period_type(row, "period_type")?,
            gross_margin: row.f64("gross_margin")?,
            operating_margin: row.f64("operating_margin")?,
            profit_margin: row.f64("profit_margin")?,
            roe: row.f64("roe")?,
            roa: row.f64("roa")?,
            current_ratio: row.f64("current_ratio")?,
            quick_ratio: row.f64("quick_ratio")?,
            debt_to_equity: row.f64("debt_to_equity")?,
            debt_to_assets: row.f64("debt_to_assets")?,
            asset_turnover: row.f64("asset_turnover")?,
            book_value_per_share: row.f64("book_value_per_share")?,
            created_at: created_at(row)?,
        })
    }
}

impl TableRecord for MarketMetricRecord {
    const TABLE: &'static str = "market_metrics";

    fn to_row(&self) -> WarehouseRow {
        WarehouseRow::new()
            .with("symbol", self.symbol.as_str())
            .with("price_date", self.price_date)
            .with("financial_key", self.financial_key)
            .with("fiscal_period", self.fiscal_period.as_str())
            .with("fiscal_date", self.fiscal_date)
            .with("close_price", self.close_price)
            .with("market_cap", self.market_cap)
            .with("enterprise_value", self.enterprise_value)
            .with("pe_ratio", self.pe_ratio)
            .with("pe_ratio_ttm", self.pe_ratio_ttm)
            .with("pb_ratio", self.pb_ratio)
            .with("ps_ratio", self.ps_ratio)
            .with("ps_ratio_ttm", self.ps_ratio_ttm)
            .with("ev_to_revenue", self.ev_to_revenue)
            .with("ev_to_revenue_ttm", self.ev_to_revenue_ttm)
            .with("ev_to_ebitda", self.ev_to_ebitda)
            .with("ev_to_ebit", self.ev_to_ebit)
            .with("dividend_yield", self.dividend_yield)
            .with("payout_ratio", self.payout_ratio)
            .with("peg_ratio", self.peg_ratio)
            .with("is_ttm", self.is_ttm)
            .with("quarterly_accepted_date", self.quarterly_accepted_date)
            .with("ttm_accepted_date", self.ttm_accepted_date)
            .with("created_at", self.created_at)
    }

    fn from_row(row: &WarehouseRow) -> Result<Self, WarehouseError> {
        Ok(Self {
            symbol: row.required_text("symbol")?,
            price_date: row.required_date("price_date")?,
            financial_key: row.i64("financial_key")?,
            fiscal_period: row.required_text("fiscal_period")?,
            fiscal_date: row.date("fiscal_date")?,
            close_price: row.required_f64("close_price")?,
            market_cap: row.f64("market_cap")?,
            enterprise_value: row.f64("enterprise_value")?,
            pe_ratio: row.f64("pe_ratio")?,
            pe_ratio_ttm: row.f64("pe_ratio_ttm")?,
            pb_ratio: row.f64("pb_ratio")?,
            ps_ratio: row.f64("ps_ratio")?,
            ps_ratio_ttm: row.f64("ps_ratio_ttm")?,
            ev_to_revenue: row.f64("ev_to_revenue")?,
            ev_to_revenue_ttm: row.f64("ev_to_revenue_ttm")?,
            ev_to_ebitda: row.f64("ev_to_ebitda")?,
            ev_to_ebit: row.f64("ev_to_ebit")?,
            dividend_yield: row.f64("dividend_yield")?,
            payout_ratio: row.f64("payout_ratio")?,
            peg_ratio: row.f64("peg_ratio")?,
            is_ttm: row.bool("is_ttm")?.unwrap_or(false),
            quarterly_accepted_date: row.timestamp("quarterly_accepted_date")?,
            ttm_accepted_date: row.timestamp("ttm_accepted_date")?,
            created_at: created_at(row)?,
        })
    }
}

/// Map every row, collecting per-row failures instead of stopping at the first.
pub fn map_rows<R: TableRecord>(rows: &[WarehouseRow]) -> (Vec<R>, Vec<String>) {
    let mut records = Vec::with_capacity(rows.len());
    let mut errors = Vec::new();
    for row in rows {
        match R::from_row(row) {
            Ok(record) => records.push(record),
            Err(e) => errors.push(format!("{}: {}", R::TABLE, e)),
        }
    }
    (records, errors)
}
