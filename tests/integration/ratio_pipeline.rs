//! Ratio engine against stored fundamentals

use pretty_assertions::assert_eq;

use fundamentals_etl::models::{Fundamentals, PeriodType, RatioRecord};
use fundamentals_etl::pipelines::{ratios, RunFilter};
use fundamentals_etl::JobStatus;

use crate::common::fixtures::{at, date, settings};
use crate::common::fresh_warehouse;

fn statement(symbol: &str, fiscal_date: chrono::NaiveDate, equity: f64) -> Fundamentals {
    let mut record = Fundamentals::new(symbol, fiscal_date, PeriodType::Q4);
    record.accepted_date = Some(at(2024, 2, 1, 16));
    record.flows.revenue = Some(1_000_000.0);
    record.flows.gross_profit = Some(400_000.0);
    record.flows.net_income = Some(100_000.0);
    record.balance.total_assets = Some(2_000_000.0);
    record.balance.total_equity = Some(equity);
    record.balance.current_assets = Some(600_000.0);
    record.balance.current_liabilities = Some(300_000.0);
    record.balance.total_debt = Some(250_000.0);
    record.balance.shares_outstanding = Some(10_000.0);
    record
}

#[tokio::test]
async fn test_ratios_for_every_unrated_record() {
    let db = fresh_warehouse().await;
    db.insert(&[
        statement("AAPL", date(2023, 12, 31), 500_000.0),
        statement("MSFT", date(2023, 12, 31), 0.0),
    ])
    .await;

    let result = ratios::pipeline(db.handle(), settings(), RunFilter::default())
        .run()
        .await
        .unwrap();

    assert_eq!(result.status, JobStatus::Success);
    assert_eq!(result.records_loaded, 2);

    let rows: Vec<RatioRecord> = db.all("symbol").await;
    let aapl = &rows[0];
    assert_eq!(aapl.symbol, "AAPL");
    assert_eq!(aapl.profit_margin, Some(10.0));
    assert_eq!(aapl.roe, Some(20.0));
    assert_eq!(aapl.gross_margin, Some(40.0));
    assert_eq!(aapl.roa, Some(5.0));
    assert_eq!(aapl.current_ratio, Some(2.0));
    assert_eq!(aapl.quick_ratio, aapl.current_ratio);
    assert_eq!(aapl.debt_to_equity, Some(0.5));
    assert_eq!(aapl.asset_turnover, Some(0.5));
    assert_eq!(aapl.book_value_per_share, Some(50.0));
    // operating income was never reported, so it counts as zero
    assert_eq!(aapl.operating_margin, Some(0.0));

    let msft = &rows[1];
    assert_eq!(msft.symbol, "MSFT");
    assert_eq!(msft.roe, None);
    assert_eq!(msft.debt_to_equity, None);
    assert_eq!(msft.book_value_per_share, None);
    assert_eq!(msft.profit_margin, Some(10.0));
}

#[tokio::test]
async fn test_rated_records_are_skipped() {
    let db = fresh_warehouse().await;
    db.insert(&[statement("AAPL", date(2023, 9, 30), 500_000.0)]).await;
    ratios::pipeline(db.handle(), settings(), RunFilter::default()).run().await.unwrap();

    db.insert(&[statement("AAPL", date(2023, 12, 31), 500_000.0)]).await;
    let result = ratios::pipeline(db.handle(), settings(), RunFilter::default())
        .run()
        .await
        .unwrap();

    assert_eq!(result.records_extracted, 1);
    assert_eq!(result.records_loaded, 1);
    assert_eq!(db.count("financial_ratios").await, 2);
}

#[tokio::test]
async fn test_date_filter_bounds_fiscal_date() {
    let db = fresh_warehouse().await;
    db.insert(&[
        statement("AAPL", date(2023, 9, 30), 500_000.0),
        statement("AAPL", date(2023, 12, 31), 500_000.0),
    ])
    .await;

    let filter = RunFilter {
        from: Some(date(2023, 10, 1)),
        ..Default::default()
    };
    let result = ratios::pipeline(db.handle(), settings(), filter).run().await.unwrap();

    assert_eq!(result.records_loaded, 1);
    let rows: Vec<RatioRecord> = db.all("fiscal_date").await;
    assert_eq!(rows[0].fiscal_date, date(2023, 12, 31));
}
