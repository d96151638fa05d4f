//! Field-level data-quality rules for staging records.
//!
//! Issues are warnings: they are counted and persisted, never used to drop a
//! record or block a load.

use chrono::NaiveDate;
use serde::Serialize;

use crate::models::{CompanyProfile, DailyPrice, Fundamentals, MarketMetricRecord, RatioRecord, TtmRecord};

const TOLERANCE: f64 = 0.01;

/// Records that know which quality rules apply to them.
pub trait Validate {
    /// `None` when no rule set applies to this record shape.
    fn quality_issues(&self, _today: NaiveDate) -> Option<Vec<String>> {
        None
    }

    fn record_identifier(&self) -> String;
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QualityIssue {
    pub table_name: String,
    pub record_identifier: String,
    pub description: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValidationReport {
    pub total_records: u64,
    pub valid_records: u64,
    pub invalid_records: u64,
    pub issues: Vec<QualityIssue>,
}

/// Validate a layer; `None` if its records have no recognised shape.
pub fn validate_batch<T: Validate>(layer: &str, records: &[T], today: NaiveDate) -> Option<ValidationReport> {
    let first = records.first()?;
    first.quality_issues(today)?;

    let mut report = ValidationReport {
        total_records: records.len() as u64,
        ..Default::default()
    };
    for record in records {
        let issues = record.quality_issues(today).unwrap_or_default();
        if issues.is_empty() {
            report.valid_records += 1;
            continue;
        }
        report.invalid_records += 1;
        let identifier = record.record_identifier();
        report.issues.extend(issues.into_iter().map(|description| QualityIssue {
            table_name: layer.to_uppercase(),
            record_identifier: identifier.clone(),
            description,
        }));
    }
    Some(report)
}

impl Validate for CompanyProfile {
    fn quality_issues(&self, _today: NaiveDate) -> Option<Vec<String>> {
        let mut issues = Vec::new();
        if self.symbol.trim().is_empty() {
            issues.push("Missing required field: symbol".to_string());
        }
        if self.company_name.trim().is_empty() {
            issues.push("Missing required field: company_name".to_string());
        }
        if !self.symbol.is_empty() && (self.symbol.len() > 10 || !self.symbol.chars().all(|c| c.is_ascii_alphanumeric())) {
            issues.push(format!("Invalid symbol format: {}", self.symbol));
        }
        if let Some(market_cap) = self.market_cap.filter(|m| *m < 0.0) {
            issues.push(format!("Invalid market cap: {}", market_cap));
        }
        Some(issues)
    }

    fn record_identifier(&self) -> String {
        self.symbol.clone()
    }
}

impl Validate for DailyPrice {
    fn quality_issues(&self, today: NaiveDate) -> Option<Vec<String>> {
        let mut issues = Vec::new();
        if self.symbol.trim().is_empty() {
            issues.push("Missing required field: symbol".to_string());
        }
        if self.close_price <= 0.0 {
            issues.push(format!("Missing required field: close_price ({})", self.close_price));
        }
        let prices = [
            ("open_price", self.open_price),
            ("high_price", self.high_price),
            ("low_price", self.low_price),
            ("close_price", Some(self.close_price)),
            ("adj_close", self.adj_close),
        ];
        for (field, value) in prices {
            if let Some(v) = value.filter(|v| *v < 0.0) {
                issues.push(format!("Negative price for {}: {}", field, v));
            }
        }
        if let (Some(high), Some(low)) = (self.high_price, self.low_price) {
            if high > 0.0 && low > 0.0 && low > high {
                issues.push(format!("Low price ({}) greater than high price ({})", low, high));
            }
        }
        if let Some(volume) = self.volume.filter(|v| *v < 0) {
            issues.push(format!("Negative volume: {}", volume));
        }
        if self.price_date > today {
            issues.push(format!("Future date not allowed: {}", self.price_date));
        }
        Some(issues)
    }

    fn record_identifier(&self) -> String {
        format!("{}@{}", self.symbol, self.price_date)
    }
}

impl Validate for Fundamentals {
    fn quality_issues(&self, today: NaiveDate) -> Option<Vec<String>> {
        let mut issues = Vec::new();
        let flows = &self.flows;
        let balance = &self.balance;

        if self.symbol.trim().is_empty() {
            issues.push("Missing required field: symbol".to_string());
        }
        if self.fiscal_date > today {
            issues.push(format!("Future fiscal date not allowed: {}", self.fiscal_date));
        }

        if let Some(revenue) = flows.revenue.filter(|r| *r < 0.0) {
            issues.push(format!("Negative revenue unusual: {}", revenue));
        }
        if let (Some(revenue), Some(gross_profit)) = (flows.revenue, flows.gross_profit) {
            let cost = flows.cost_of_revenue.unwrap_or(0.0);
            if revenue > 0.0 && cost >= 0.0 && (gross_profit - (revenue - cost)).abs() > TOLERANCE {
                issues.push(format!("Gross profit mismatch: {} != {} - {}", gross_profit, revenue, cost));
            }
        }

        let assets = balance.total_assets.unwrap_or(0.0);
        let liabilities = balance.total_liabilities.unwrap_or(0.0);
        let equity = balance.total_equity.unwrap_or(0.0);
        if assets > 0.0 && liabilities >= 0.0 && equity != 0.0 && (assets - (liabilities + equity)).abs() > TOLERANCE {
            issues.push(format!(
                "Balance sheet equation violation: {} != {} + {}",
                assets, liabilities, equity
            ));
        }

        if let Some(free_cash_flow) = flows.free_cash_flow {
            let operating = flows.operating_cash_flow.unwrap_or(0.0);
            let capex = flows.capital_expenditures.unwrap_or(0.0);
            if operating != 0.0 && capex != 0.0 && (free_cash_flow - (operating - capex.abs())).abs() > TOLERANCE {
                issues.push(format!(
                    "Free cash flow mismatch: {} != {} - {}",
                    free_cash_flow,
                    operating,
                    capex.abs()
                ));
            }
        }
        Some(issues)
    }

    fn record_identifier(&self) -> String {
        format!("{} {} {}", self.symbol, self.fiscal_date, self.period_type)
    }
}

impl Validate for TtmRecord {
    fn record_identifier(&self) -> String {
        format!("{}@{}", self.symbol, self.calculation_date)
    }
}

impl Validate for RatioRecord {
    fn record_identifier(&self) -> String {
        self.financial_key.to_string()
    }
}

impl Validate for MarketMetricRecord {
    fn record_identifier(&self) -> String {
        format!("{}@{}", self.symbol, self.price_date)
    }
}
