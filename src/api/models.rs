//! Wire types for the FMP REST API. Only fields the pipelines use are kept.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileDto {
    pub symbol: String,
    #[serde(default)]
    pub company_name: Option<String>,
    #[serde(default)]
    pub sector: Option<String>,
    #[serde(default)]
    pub industry: Option<String>,
    #[serde(default)]
    pub exchange: Option<String>,
    #[serde(default, alias = "mktCap")]
    pub market_cap: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceBarDto {
    #[serde(default)]
    pub symbol: Option<String>,
    pub date: String,
    #[serde(default)]
    pub open: Option<f64>,
    #[serde(default)]
    pub high: Option<f64>,
    #[serde(default)]
    pub low: Option<f64>,
    #[serde(default)]
    pub close: Option<f64>,
    #[serde(default)]
    pub adj_close: Option<f64>,
    #[serde(default)]
    pub volume: Option<f64>,
}

/// The stable API returns a bare array; the legacy v3 API wraps it.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub(crate) enum PriceHistoryResponse {
    Flat(Vec<PriceBarDto>),
    Wrapped {
        #[serde(default)]
        historical: Vec<PriceBarDto>,
    },
}

impl PriceHistoryResponse {
    pub(crate) fn into_bars(self) -> Vec<PriceBarDto> {
        match self {
            PriceHistoryResponse::Flat(bars) => bars,
            PriceHistoryResponse::Wrapped { historical } => historical,
        }
    }
}

/// One line of an income, balance-sheet or cash-flow statement.
///
/// The three statement kinds share identifying fields, so a single DTO with
/// optional figures covers all of them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatementLine {
    #[serde(default)]
    pub symbol: Option<String>,
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub period: Option<String>,
    #[serde(default)]
    pub filling_date: Option<String>,
    #[serde(default)]
    pub filing_date: Option<String>,
    #[serde(default)]
    pub accepted_date: Option<String>,

    // income statement
    #[serde(default)]
    pub revenue: Option<f64>,
    #[serde(default)]
    pub cost_of_revenue: Option<f64>,
    #[serde(default)]
    pub gross_profit: Option<f64>,
    #[serde(default)]
    pub operating_expenses: Option<f64>,
    #[serde(default)]
    pub operating_income: Option<f64>,
    #[serde(default)]
    pub net_income: Option<f64>,
    #[serde(default)]
    pub eps: Option<f64>,
    #[serde(default, alias = "epsdiluted")]
    pub eps_diluted: Option<f64>,
    #[serde(default)]
    pub weighted_average_shs_out: Option<f64>,

    // balance sheet
    #[serde(default)]
    pub total_assets: Option<f64>,
    #[serde(default)]
    pub total_current_assets: Option<f64>,
    #[serde(default)]
    pub total_liabilities: Option<f64>,
    #[serde(default)]
    pub total_current_liabilities: Option<f64>,
    #[serde(default)]
    pub total_equity: Option<f64>,
    #[serde(default)]
    pub total_stockholders_equity: Option<f64>,
    #[serde(default)]
    pub cash_and_cash_equivalents: Option<f64>,
    #[serde(default)]
    pub total_debt: Option<f64>,
    #[serde(default)]
    pub net_debt: Option<f64>,

    // cash flow
    #[serde(default)]
    pub operating_cash_flow: Option<f64>,
    #[serde(default)]
    pub net_cash_provided_by_investing_activities: Option<f64>,
    #[serde(default)]
    pub net_cash_provided_by_financing_activities: Option<f64>,
    #[serde(default)]
    pub free_cash_flow: Option<f64>,
    #[serde(default)]
    pub capital_expenditure: Option<f64>,
    #[serde(default)]
    pub dividends_paid: Option<f64>,
    #[serde(default)]
    pub net_dividends_paid: Option<f64>,
}

impl StatementLine {
    /// The API has spelled this field both ways over time.
    pub fn filed_on(&self) -> Option<&str> {
        self.filing_date.as_deref().or(self.filling_date.as_deref())
    }

    pub fn equity(&self) -> Option<f64> {
        self.total_equity.or(self.total_stockholders_equity)
    }

    pub fn dividends(&self) -> Option<f64> {
        self.net_dividends_paid.or(self.dividends_paid)
    }
}
