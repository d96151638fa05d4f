use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

/// Reporting period of a fundamentals record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PeriodType {
    Q1,
    Q2,
    Q3,
    Q4,
    FY,
}

impl PeriodType {
    pub const QUARTERS: [PeriodType; 4] = [PeriodType::Q1, PeriodType::Q2, PeriodType::Q3, PeriodType::Q4];

    pub fn as_str(&self) -> &'static str {
        match self {
            PeriodType::Q1 => "Q1",
            PeriodType::Q2 => "Q2",
            PeriodType::Q3 => "Q3",
            PeriodType::Q4 => "Q4",
            PeriodType::FY => "FY",
        }
    }

    pub fn is_quarterly(&self) -> bool {
        !matches!(self, PeriodType::FY)
    }
}

impl fmt::Display for PeriodType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PeriodType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "Q1" => Ok(PeriodType::Q1),
            "Q2" => Ok(PeriodType::Q2),
            "Q3" => Ok(PeriodType::Q3),
            "Q4" => Ok(PeriodType::Q4),
            "FY" | "ANNUAL" => Ok(PeriodType::FY),
            other => Err(format!("unknown period type: {}", other)),
        }
    }
}

/// Flow metrics: accumulate over a period, so TTM sums them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FlowMetrics {
    pub revenue: Option<f64>,
    pub cost_of_revenue: Option<f64>,
    pub gross_profit: Option<f64>,
    pub operating_expenses: Option<f64>,
    pub operating_income: Option<f64>,
    pub net_income: Option<f64>,
    pub eps: Option<f64>,
    pub eps_diluted: Option<f64>,
    pub operating_cash_flow: Option<f64>,
    pub investing_cash_flow: Option<f64>,
    pub financing_cash_flow: Option<f64>,
    pub free_cash_flow: Option<f64>,
    pub capital_expenditures: Option<f64>,
    /// Cash outflow convention: dividends paid are recorded as negative figures.
    pub dividends_paid: Option<f64>,
}

impl FlowMetrics {
    pub const COLUMNS: [&'static str; 14] = [
        "revenue",
        "cost_of_revenue",
        "gross_profit",
        "operating_expenses",
        "operating_income",
        "net_income",
        "eps",
        "eps_diluted",
        "operating_cash_flow",
        "investing_cash_flow",
        "financing_cash_flow",
        "free_cash_flow",
        "capital_expenditures",
        "dividends_paid",
    ];

    pub fn values(&self) -> [Option<f64>; 14] {
        [
            self.revenue,
            self.cost_of_revenue,
            self.gross_profit,
            self.operating_expenses,
            self.operating_income,
            self.net_income,
            self.eps,
            self.eps_diluted,
            self.operating_cash_flow,
            self.investing_cash_flow,
            self.financing_cash_flow,
            self.free_cash_flow,
            self.capital_expenditures,
            self.dividends_paid,
        ]
    }

    pub fn from_values(v: [Option<f64>; 14]) -> Self {
        Self {
            revenue: v[0],
            cost_of_revenue: v[1],
            gross_profit: v[2],
            operating_expenses: v[3],
            operating_income: v[4],
            net_income: v[5],
            eps: v[6],
            eps_diluted: v[7],
            operating_cash_flow: v[8],
            investing_cash_flow: v[9],
            financing_cash_flow: v[10],
            free_cash_flow: v[11],
            capital_expenditures: v[12],
            dividends_paid: v[13],
        }
    }

    /// Field-wise sum with SQL `SUM` semantics: missing values are skipped and
    /// a field missing from every input stays `None`.
    pub fn sum<'a>(items: impl IntoIterator<Item = &'a FlowMetrics>) -> FlowMetrics {
        let mut totals: [Option<f64>; 14] = [None; 14];
        for item in items {
            for (total, value) in totals.iter_mut().zip(item.values()) {
                if let Some(v) = value {
                    *total = Some(total.unwrap_or(0.0) + v);
                }
            }
        }
        FlowMetrics::from_values(totals)
    }

    /// Overwrite fields that are present in `other`.
    pub fn fill_from(&mut self, other: &FlowMetrics) {
        let mut merged = self.values();
        for (slot, value) in merged.iter_mut().zip(other.values()) {
            if value.is_some() {
                *slot = value;
            }
        }
        *self = FlowMetrics::from_values(merged);
    }
}

/// Stock (balance-sheet) metrics: point-in-time values, never summed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BalanceSnapshot {
    pub shares_outstanding: Option<f64>,
    pub total_assets: Option<f64>,
    pub current_assets: Option<f64>,
    pub total_liabilities: Option<f64>,
    pub current_liabilities: Option<f64>,
    pub total_equity: Option<f64>,
    pub cash_and_equivalents: Option<f64>,
    pub total_debt: Option<f64>,
    pub net_debt: Option<f64>,
}

impl BalanceSnapshot {
    pub const COLUMNS: [&'static str; 9] = [
        "shares_outstanding",
        "total_assets",
        "current_assets",
        "total_liabilities",
        "current_liabilities",
        "total_equity",
        "cash_and_equivalents",
        "total_debt",
        "net_debt",
    ];

    pub fn values(&self) -> [Option<f64>; 9] {
        [
            self.shares_outstanding,
            self.total_assets,
            self.current_assets,
            self.total_liabilities,
            self.current_liabilities,
            self.total_equity,
            self.cash_and_equivalents,
            self.total_debt,
            self.net_debt,
        ]
    }

    pub fn from_values(v: [Option<f64>; 9]) -> Self {
        Self {
            shares_outstanding: v[0],
            total_assets: v[1],
            current_assets: v[2],
            total_liabilities: v[3],
            current_liabilities: v[4],
            total_equity: v[5],
            cash_and_equivalents: v[6],
            total_debt: v[7],
            net_debt: v[8],
        }
    }

    pub fn fill_from(&mut self, other: &BalanceSnapshot) {
        let mut merged = self.values();
        for (slot, value) in merged.iter_mut().zip(other.values()) {
            if value.is_some() {
                *slot = value;
            }
        }
        *self = BalanceSnapshot::from_values(merged);
    }
}

/// One company × fiscal period × period type, as filed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fundamentals {
    /// Warehouse-assigned key; `None` until the record has been loaded.
    pub financial_key: Option<i64>,
    pub symbol: String,
    pub fiscal_date: NaiveDate,
    pub period_type: PeriodType,
    pub filing_date: Option<NaiveDate>,
    /// When the figures became publicly knowable.
    pub accepted_date: Option<NaiveDateTime>,
    pub flows: FlowMetrics,
    pub balance: BalanceSnapshot,
}

impl Fundamentals {
    pub fn new(symbol: &str, fiscal_date: NaiveDate, period_type: PeriodType) -> Self {
        Self {
            financial_key: None,
            symbol: symbol.to_string(),
            fiscal_date,
            period_type,
            filing_date: None,
            accepted_date: None,
            flows: FlowMetrics::default(),
            balance: BalanceSnapshot::default(),
        }
    }

    /// Knowable on `date` when accepted on or before that calendar day.
    pub fn is_known_on(&self, date: NaiveDate) -> bool {
        self.accepted_date.map(|accepted| accepted.date() <= date).unwrap_or(false)
    }
}

/// Daily OHLCV bar
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyPrice {
    pub symbol: String,
    pub price_date: NaiveDate,
    pub open_price: Option<f64>,
    pub high_price: Option<f64>,
    pub low_price: Option<f64>,
    pub close_price: f64,
    pub adj_close: Option<f64>,
    pub volume: Option<i64>,
}

/// Company dimension record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompanyProfile {
    pub symbol: String,
    pub company_name: String,
    pub sector: Option<String>,
    pub industry: Option<String>,
    pub exchange: Option<String>,
    pub market_cap: Option<f64>,
    pub updated_at: DateTime<Utc>,
}

/// Trailing-twelve-month aggregate as knowable on `calculation_date`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TtmRecord {
    pub ttm_key: Option<i64>,
    pub symbol: String,
    pub calculation_date: NaiveDate,
    /// Acceptance timestamp of the filing that made this TTM computable.
    pub accepted_date: NaiveDateTime,
    pub quarters_included: u32,
    pub oldest_quarter_date: NaiveDate,
    pub newest_quarter_date: NaiveDate,
    /// Summed over the 4 quarters.
    pub flows: FlowMetrics,
    /// Snapshot of the most recent quarter.
    pub latest: BalanceSnapshot,
}

/// Ratios derived 1:1 from a fundamentals record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RatioRecord {
    pub financial_key: i64,
    pub symbol: String,
    pub fiscal_date: NaiveDate,
    pub period_type: PeriodType,
    pub gross_margin: Option<f64>,
    pub operating_margin: Option<f64>,
    pub profit_margin: Option<f64>,
    pub roe: Option<f64>,
    pub roa: Option<f64>,
    pub current_ratio: Option<f64>,
    pub quick_ratio: Option<f64>,
    pub debt_to_equity: Option<f64>,
    pub debt_to_assets: Option<f64>,
    pub asset_turnover: Option<f64>,
    pub book_value_per_share: Option<f64>,
    pub created_at: DateTime<Utc>,
}

/// Point-in-time valuation multiples for one close price.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketMetricRecord {
    pub symbol: String,
    pub price_date: NaiveDate,
    /// Quarterly fundamentals used; `None` when only TTM data was knowable.
    pub financial_key: Option<i64>,
    /// `Q1`..`Q4` for the quarter used, `TTM` when only TTM data was knowable.
    pub fiscal_period: String,
    pub fiscal_date: Option<NaiveDate>,
    pub close_price: f64,
    pub market_cap: Option<f64>,
    pub enterprise_value: Option<f64>,
    pub pe_ratio: Option<f64>,
    pub pe_ratio_ttm: Option<f64>,
    pub pb_ratio: Option<f64>,
    pub ps_ratio: Option<f64>,
    pub ps_ratio_ttm: Option<f64>,
    pub ev_to_revenue: Option<f64>,
    pub ev_to_revenue_ttm: Option<f64>,
    pub ev_to_ebitda: Option<f64>,
    pub ev_to_ebit: Option<f64>,
    pub dividend_yield: Option<f64>,
    pub payout_ratio: Option<f64>,
    pub peg_ratio: Option<f64>,
    pub is_ttm: bool,
    pub quarterly_accepted_date: Option<NaiveDateTime>,
    pub ttm_accepted_date: Option<NaiveDateTime>,
    pub created_at: DateTime<Utc>,
}
