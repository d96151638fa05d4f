//! Income, balance-sheet and cash-flow statements: API → staging → `fundamentals`.
//!
//! The three statement kinds are fetched separately and merged by
//! (symbol, fiscal date, period) into one `Fundamentals` record. Loads never
//! overwrite a record that is already in the warehouse.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde_json::json;
use tracing::{info, warn};

use super::MergeLoader;
use crate::api::{ApiGateway, ReportingPeriod, StatementKind, StatementLine};
use crate::error::EtlError;
use crate::etl::monitor::JobMonitor;
use crate::etl::{EtlSettings, Extraction, Extractor, Pipeline, Transformation, Transformer, STAGING_LAYER};
use crate::models::{Fundamentals, PeriodType};
use crate::warehouse::{parse_date, parse_timestamp, Warehouse};

pub const JOB_NAME: &str = "financial_statements";
pub const DEFAULT_LIMIT: u32 = 20;

/// One statement line tagged with its kind and requested symbol.
#[derive(Debug, Clone, PartialEq)]
pub struct RawStatement {
    pub symbol: String,
    pub kind: StatementKind,
    pub line: StatementLine,
}

pub struct StatementExtractor {
    api: Arc<dyn ApiGateway>,
    symbols: Vec<String>,
    period: ReportingPeriod,
    limit: u32,
}

impl StatementExtractor {
    pub fn new(api: Arc<dyn ApiGateway>, symbols: Vec<String>, period: ReportingPeriod, limit: u32) -> Self {
        Self {
            api,
            symbols,
            period,
            limit,
        }
    }
}

#[async_trait]
impl Extractor for StatementExtractor {
    type Record = RawStatement;

    async fn extract(&self) -> Result<Extraction<RawStatement>, EtlError> {
        info!(
            "📑 Fetching {} statements for {} symbols (limit {})",
            self.period.as_param(),
            self.symbols.len(),
            self.limit
        );
        let mut extraction = Extraction::default();

        for symbol in &self.symbols {
            for kind in StatementKind::ALL {
                match self.api.fetch_statements(symbol, kind, self.period, self.limit).await {
                    Ok(lines) => extraction.records.extend(lines.into_iter().map(|line| RawStatement {
                        symbol: symbol.clone(),
                        kind,
                        line,
                    })),
                    Err(e) => {
                        warn!("❌ Failed to fetch {} for {}: {}", kind.endpoint(), symbol, e);
                        extraction.errors.push(format!("{} {}: {}", symbol, kind.endpoint(), e));
                    }
                }
            }
        }
        Ok(extraction)
    }
}

fn statement_key(raw: &RawStatement) -> Result<(String, NaiveDate, PeriodType), String> {
    let symbol = raw.line.symbol.clone().unwrap_or_else(|| raw.symbol.clone()).to_uppercase();
    let date = raw.line.date.as_deref().unwrap_or_default();
    let fiscal_date = parse_date(date).ok_or_else(|| format!("{} {}: invalid fiscal date {:?}", symbol, raw.kind.endpoint(), date))?;
    let period_type = raw
        .line
        .period
        .as_deref()
        .ok_or_else(|| format!("{} {}: missing period", symbol, fiscal_date))?
        .parse::<PeriodType>()
        .map_err(|e| format!("{} {}: {}", symbol, fiscal_date, e))?;
    Ok((symbol, fiscal_date, period_type))
}

/// Copy the figures one statement kind carries onto the record.
pub fn apply_statement(record: &mut Fundamentals, kind: StatementKind, line: &StatementLine) {
    let flows = &mut record.flows;
    let balance = &mut record.balance;
    match kind {
        StatementKind::Income => {
            flows.revenue = line.revenue.or(flows.revenue);
            flows.cost_of_revenue = line.cost_of_revenue.or(flows.cost_of_revenue);
            flows.gross_profit = line.gross_profit.or(flows.gross_profit);
            flows.operating_expenses = line.operating_expenses.or(flows.operating_expenses);
            flows.operating_income = line.operating_income.or(flows.operating_income);
            flows.net_income = line.net_income.or(flows.net_income);
            flows.eps = line.eps.or(flows.eps);
            flows.eps_diluted = line.eps_diluted.or(flows.eps_diluted);
            balance.shares_outstanding = line.weighted_average_shs_out.or(balance.shares_outstanding);
        }
        StatementKind::BalanceSheet => {
            balance.total_assets = line.total_assets.or(balance.total_assets);
            balance.current_assets = line.total_current_assets.or(balance.current_assets);
            balance.total_liabilities = line.total_liabilities.or(balance.total_liabilities);
            balance.current_liabilities = line.total_current_liabilities.or(balance.current_liabilities);
            balance.total_equity = line.equity().or(balance.total_equity);
            balance.cash_and_equivalents = line.cash_and_cash_equivalents.or(balance.cash_and_equivalents);
            balance.total_debt = line.total_debt.or(balance.total_debt);
            balance.net_debt = line.net_debt.or(balance.net_debt);
        }
        StatementKind::CashFlow => {
            flows.operating_cash_flow = line.operating_cash_flow.or(flows.operating_cash_flow);
            flows.investing_cash_flow = line
                .net_cash_provided_by_investing_activities
                .or(flows.investing_cash_flow);
            flows.financing_cash_flow = line
                .net_cash_provided_by_financing_activities
                .or(flows.financing_cash_flow);
            flows.free_cash_flow = line.free_cash_flow.or(flows.free_cash_flow);
            flows.capital_expenditures = line.capital_expenditure.or(flows.capital_expenditures);
            flows.dividends_paid = line.dividends().or(flows.dividends_paid);
        }
    }

    if record.filing_date.is_none() {
        record.filing_date = line.filed_on().and_then(parse_date);
    }
    // the record becomes knowable once its last statement is accepted
    if let Some(accepted) = line.accepted_date.as_deref().and_then(parse_timestamp) {
        record.accepted_date = Some(record.accepted_date.map_or(accepted, |current| current.max(accepted)));
    }
}

pub struct StatementTransformer;

impl Transformer for StatementTransformer {
    type Input = RawStatement;
    type Output = Fundamentals;

    fn transform(&self, statements: Vec<RawStatement>) -> Transformation<Fundamentals> {
        let lines = statements.len();
        let mut merged: BTreeMap<(String, NaiveDate, PeriodType), Fundamentals> = BTreeMap::new();
        let mut errors = Vec::new();

        for raw in &statements {
            match statement_key(raw) {
                Ok((symbol, fiscal_date, period_type)) => {
                    let record = merged
                        .entry((symbol.clone(), fiscal_date, period_type))
                        .or_insert_with(|| Fundamentals::new(&symbol, fiscal_date, period_type));
                    apply_statement(record, raw.kind, &raw.line);
                }
                Err(e) => errors.push(e),
            }
        }

        let records: Vec<Fundamentals> = merged.into_values().collect();
        info!("🧾 Merged {} statement lines into {} fundamentals records", lines, records.len());

        let mut transformation = Transformation::single(STAGING_LAYER, records);
        transformation.errors = errors;
        transformation.metadata.insert("statement_lines".into(), json!(lines));
        transformation
    }
}

pub type StatementPipeline = Pipeline<StatementExtractor, StatementTransformer, MergeLoader<Fundamentals>>;

pub fn pipeline(
    api: Arc<dyn ApiGateway>,
    warehouse: Arc<dyn Warehouse>,
    settings: EtlSettings,
    symbols: Vec<String>,
    period: ReportingPeriod,
    limit: u32,
) -> StatementPipeline {
    Pipeline::new(
        JOB_NAME,
        StatementExtractor::new(api, symbols, period, limit),
        StatementTransformer,
        MergeLoader::insert_if_absent(Arc::clone(&warehouse), &["symbol", "fiscal_date", "period_type"]),
        settings,
    )
    .with_monitor(JobMonitor::new(warehouse))
}
