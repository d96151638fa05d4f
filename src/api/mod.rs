use async_trait::async_trait;
use chrono::NaiveDate;

use crate::error::ApiError;

pub mod fmp_client;
pub mod models;

pub use fmp_client::FmpClient;
pub use models::{PriceBarDto, ProfileDto, StatementLine};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatementKind {
    Income,
    BalanceSheet,
    CashFlow,
}

impl StatementKind {
    pub const ALL: [StatementKind; 3] = [StatementKind::Income, StatementKind::BalanceSheet, StatementKind::CashFlow];

    pub fn endpoint(&self) -> &'static str {
        match self {
            StatementKind::Income => "income-statement",
            StatementKind::BalanceSheet => "balance-sheet-statement",
            StatementKind::CashFlow => "cash-flow-statement",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReportingPeriod {
    Quarter,
    Annual,
}

impl ReportingPeriod {
    pub fn as_param(&self) -> &'static str {
        match self {
            ReportingPeriod::Quarter => "quarter",
            ReportingPeriod::Annual => "FY",
        }
    }
}

/// Financial data source used by the upstream extraction pipelines.
#[async_trait]
pub trait ApiGateway: Send + Sync {
    /// `None` when the API knows nothing about the symbol.
    async fn fetch_profile(&self, symbol: &str) -> Result<Option<ProfileDto>, ApiError>;

    async fn fetch_prices(
        &self,
        symbol: &str,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    ) -> Result<Vec<PriceBarDto>, ApiError>;

    async fn fetch_statements(
        &self,
        symbol: &str,
        kind: StatementKind,
        period: ReportingPeriod,
        limit: u32,
    ) -> Result<Vec<StatementLine>, ApiError>;
}
