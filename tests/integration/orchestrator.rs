//! Daily orchestration: parallel upstream phase, sequential derived phase

use std::sync::Arc;
use std::time::Duration;

use pretty_assertions::assert_eq;

use fundamentals_etl::api::{ApiGateway, StatementKind, StatementLine};
use fundamentals_etl::orchestrator::{DailyPlan, Orchestrator, Stages};
use fundamentals_etl::pipelines::prices::DateRange;
use fundamentals_etl::pipelines::{company, market_metrics, prices, ratios, statements, ttm};
use fundamentals_etl::JobStatus;

use crate::common::fixtures::{bar, date, profile, settings, statement, StaticApi};
use crate::common::{fresh_warehouse, logging};

fn income(fiscal_date: &str, period: &str, accepted: &str, revenue: f64) -> StatementLine {
    let mut line = statement("AAPL", fiscal_date, period, accepted);
    line.revenue = Some(revenue);
    line.eps_diluted = Some(1.5);
    line.weighted_average_shs_out = Some(1_000.0);
    line
}

fn apple_api() -> StaticApi {
    StaticApi::default()
        .with_profile(profile("AAPL", "Apple Inc."))
        .with_prices("AAPL", vec![bar("2024-03-01", 180.0), bar("2024-03-04", 175.0)])
        .with_statements(
            "AAPL",
            StatementKind::Income,
            vec![
                income("2023-12-30", "Q1", "2024-02-01 18:03:17", 119.0),
                income("2023-09-30", "Q4", "2023-11-02 18:08:27", 89.0),
                income("2023-07-01", "Q3", "2023-08-03 18:04:43", 81.0),
                income("2023-04-01", "Q2", "2023-05-04 18:03:52", 94.0),
            ],
        )
}

fn march_plan(symbols: &[&str]) -> DailyPlan {
    let mut plan = DailyPlan::new(symbols.iter().map(|s| s.to_string()).collect());
    plan.price_range = DateRange::resolve(Some(date(2024, 3, 1)), Some(date(2024, 3, 31)));
    plan
}

#[test_log::test(tokio::test)]
async fn test_daily_run_populates_every_table() {
    logging::log_test_step("daily run with a healthy API");
    let db = fresh_warehouse().await;
    let api: Arc<dyn ApiGateway> = Arc::new(apple_api());

    let report = Orchestrator::new(Some(api), db.handle(), settings())
        .run(&march_plan(&["AAPL"]))
        .await;
    report.log();

    let mut jobs: Vec<&str> = report.pipelines.iter().map(|p| p.job_name.as_str()).collect();
    jobs.sort_unstable();
    let mut expected = vec![
        company::JOB_NAME,
        prices::JOB_NAME,
        statements::JOB_NAME,
        ttm::JOB_NAME,
        ratios::JOB_NAME,
        market_metrics::JOB_NAME,
    ];
    expected.sort_unstable();
    assert_eq!(jobs, expected);
    assert!(report.pipelines.iter().all(|p| p.status == JobStatus::Success));
    assert_eq!(report.exit_code(), 0);
    assert!(!report.timed_out);

    // the derived phase saw the upstream phase's output
    assert_eq!(db.count("companies").await, 1);
    assert_eq!(db.count("daily_prices").await, 2);
    assert_eq!(db.count("fundamentals").await, 4);
    assert_eq!(db.count("fundamentals_ttm").await, 1);
    assert_eq!(db.count("financial_ratios").await, 4);
    assert_eq!(db.count("market_metrics").await, 2);
    assert_eq!(
        db.scalar_f64(
            "SELECT ttm_revenue FROM fundamentals_ttm WHERE symbol = ?",
            &["AAPL".into()]
        )
        .await,
        Some(383.0)
    );
    assert_eq!(db.count("etl_job_history").await, 6);
}

#[tokio::test]
async fn test_missing_api_fails_upstream_but_derived_engines_run() {
    let db = fresh_warehouse().await;

    let report = Orchestrator::new(None, db.handle(), settings())
        .run(&march_plan(&["AAPL"]))
        .await;

    let failed: Vec<&str> = report
        .pipelines
        .iter()
        .filter(|p| !p.succeeded())
        .map(|p| p.job_name.as_str())
        .collect();
    assert_eq!(failed, vec![company::JOB_NAME, prices::JOB_NAME, statements::JOB_NAME]);
    assert_eq!(report.pipelines.len(), 6);
    assert_eq!(report.exit_code(), 1);
}

#[tokio::test]
async fn test_skipped_stages_are_not_run() {
    let db = fresh_warehouse().await;
    let mut plan = march_plan(&["AAPL"]);
    plan.stages = Stages {
        companies: false,
        prices: false,
        statements: false,
        ..Default::default()
    };

    let report = Orchestrator::new(None, db.handle(), settings()).run(&plan).await;

    // TTM only runs alongside fresh statements
    let jobs: Vec<&str> = report.pipelines.iter().map(|p| p.job_name.as_str()).collect();
    assert_eq!(jobs, vec![ratios::JOB_NAME, market_metrics::JOB_NAME]);
    assert_eq!(report.exit_code(), 0);
}

#[tokio::test]
async fn test_no_symbols_is_a_failed_run() {
    let db = fresh_warehouse().await;

    let report = Orchestrator::new(None, db.handle(), settings())
        .run(&DailyPlan::new(Vec::new()))
        .await;

    assert!(report.pipelines.is_empty());
    assert_eq!(report.exit_code(), 2);
}

#[tokio::test]
async fn test_time_budget_cancels_the_run() {
    let db = fresh_warehouse().await;
    let api: Arc<dyn ApiGateway> = Arc::new(apple_api().stalled(Duration::from_secs(30)));

    let report = Orchestrator::new(Some(api), db.handle(), settings())
        .with_timeout(Some(Duration::from_millis(200)))
        .run(&march_plan(&["AAPL"]))
        .await;

    assert!(report.timed_out);
    assert!(report.duration < Duration::from_secs(30));
    assert_eq!(report.exit_code(), 2);
}
