//! TTM engine end to end

use pretty_assertions::assert_eq;

use fundamentals_etl::models::{PeriodType, TtmRecord};
use fundamentals_etl::pipelines::{ttm, RunFilter};
use fundamentals_etl::JobStatus;

use crate::common::fixtures::{at, date, fiscal_year_2023, quarter, settings};
use crate::common::{fresh_warehouse, logging};

#[test_log::test(tokio::test)]
async fn test_four_knowable_quarters_produce_one_ttm_record() {
    logging::log_test_step("TTM over fiscal 2023");
    let db = fresh_warehouse().await;
    db.insert(&fiscal_year_2023("AAPL")).await;

    let result = ttm::pipeline(db.handle(), settings(), RunFilter::default())
        .run()
        .await
        .unwrap();

    assert_eq!(result.status, JobStatus::Success);
    assert_eq!(result.records_loaded, 1);

    let records: Vec<TtmRecord> = db.all("calculation_date").await;
    assert_eq!(records.len(), 1);
    let record = &records[0];
    logging::log_test_data("ttm", record);
    assert_eq!(record.calculation_date, date(2024, 2, 1));
    assert_eq!(record.accepted_date, at(2024, 2, 1, 16));
    assert_eq!(record.quarters_included, 4);
    assert_eq!(record.oldest_quarter_date, date(2023, 3, 31));
    assert_eq!(record.newest_quarter_date, date(2023, 12, 31));
    assert_eq!(record.flows.revenue, Some(460.0));
    // balance items are a snapshot of the newest quarter, not a sum
    assert_eq!(record.latest.total_assets, Some(1300.0));
}

#[tokio::test]
async fn test_rerun_inserts_nothing() {
    let db = fresh_warehouse().await;
    db.insert(&fiscal_year_2023("AAPL")).await;

    let first = ttm::pipeline(db.handle(), settings(), RunFilter::default()).run().await.unwrap();
    let second = ttm::pipeline(db.handle(), settings(), RunFilter::default()).run().await.unwrap();

    assert_eq!(first.records_loaded, 1);
    assert_eq!(second.status, JobStatus::Success);
    assert_eq!(second.records_extracted, 0);
    assert_eq!(second.records_loaded, 0);
    assert_eq!(db.count("fundamentals_ttm").await, 1);
}

#[tokio::test]
async fn test_late_filing_is_not_used_before_acceptance() {
    let db = fresh_warehouse().await;
    let mut quarters = fiscal_year_2023("AAPL");
    // accepted in May, so the February window must not see it
    quarters.push(quarter("AAPL", date(2024, 3, 31), PeriodType::Q1, at(2024, 5, 2, 18), 140.0));
    db.insert(&quarters).await;

    ttm::pipeline(db.handle(), settings(), RunFilter::default()).run().await.unwrap();

    let records: Vec<TtmRecord> = db.all("calculation_date").await;
    let summary: Vec<_> = records
        .iter()
        .map(|r| (r.calculation_date, r.flows.revenue, r.oldest_quarter_date))
        .collect();
    assert_eq!(
        summary,
        vec![
            (date(2024, 2, 1), Some(460.0), date(2023, 3, 31)),
            (date(2024, 5, 2), Some(500.0), date(2023, 6, 30)),
        ]
    );
}

#[tokio::test]
async fn test_filter_restricts_symbols() {
    let db = fresh_warehouse().await;
    db.insert(&fiscal_year_2023("AAPL")).await;
    db.insert(&fiscal_year_2023("MSFT")).await;

    let result = ttm::pipeline(db.handle(), settings(), RunFilter::symbols(&["MSFT"]))
        .run()
        .await
        .unwrap();

    assert_eq!(result.records_loaded, 1);
    let records: Vec<TtmRecord> = db.all("symbol").await;
    assert_eq!(records.iter().map(|r| r.symbol.as_str()).collect::<Vec<_>>(), vec!["MSFT"]);
}

#[tokio::test]
async fn test_three_quarters_yield_nothing() {
    let db = fresh_warehouse().await;
    db.insert(&fiscal_year_2023("AAPL")[..3]).await;

    let result = ttm::pipeline(db.handle(), settings(), RunFilter::default()).run().await.unwrap();

    assert_eq!(result.status, JobStatus::Success);
    assert_eq!(result.records_loaded, 0);
    assert_eq!(db.count("fundamentals_ttm").await, 0);
}
