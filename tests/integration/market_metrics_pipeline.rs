//! Market metrics over the full derived chain: fundamentals → TTM → ratios → metrics

use pretty_assertions::assert_eq;

use fundamentals_etl::models::{Fundamentals, MarketMetricRecord};
use fundamentals_etl::pipelines::{market_metrics, ratios, ttm, RunFilter};
use fundamentals_etl::JobStatus;

use crate::common::fixtures::{date, fiscal_year_2023, price, settings};
use crate::common::{fresh_warehouse, TestWarehouse};

fn reported(symbol: &str, eps_diluted: f64) -> Vec<Fundamentals> {
    fiscal_year_2023(symbol)
        .into_iter()
        .map(|mut q| {
            q.flows.eps_diluted = Some(eps_diluted);
            q.balance.shares_outstanding = Some(1_000.0);
            q.balance.total_equity = Some(50_000.0);
            q.balance.total_debt = Some(5_000.0);
            q.balance.cash_and_equivalents = Some(2_000.0);
            q
        })
        .collect()
}

async fn derive(db: &TestWarehouse) {
    ttm::pipeline(db.handle(), settings(), RunFilter::default()).run().await.unwrap();
    ratios::pipeline(db.handle(), settings(), RunFilter::default()).run().await.unwrap();
}

#[tokio::test]
async fn test_empty_price_table_is_a_successful_no_op() {
    let db = fresh_warehouse().await;

    let result = market_metrics::pipeline(db.handle(), settings(), RunFilter::default())
        .run()
        .await
        .unwrap();

    assert_eq!(result.status, JobStatus::Success);
    assert_eq!(result.records_extracted, 0);
    assert_eq!(result.records_loaded, 0);
}

#[test_log::test(tokio::test)]
async fn test_prices_are_valued_with_what_was_knowable() {
    let db = fresh_warehouse().await;
    db.insert(&reported("AAPL", 1.25)).await;
    derive(&db).await;
    db.insert(&[
        // before any filing was accepted
        price("AAPL", date(2023, 4, 3), 80.0),
        // Q3 known, no TTM yet
        price("AAPL", date(2024, 1, 16), 90.0),
        // Q4 and the first TTM known
        price("AAPL", date(2024, 3, 1), 100.0),
    ])
    .await;

    let result = market_metrics::pipeline(db.handle(), settings(), RunFilter::default())
        .run()
        .await
        .unwrap();

    assert_eq!(result.status, JobStatus::Success);
    assert_eq!(result.records_loaded, 2);

    let metrics: Vec<MarketMetricRecord> = db.all("price_date").await;
    assert_eq!(metrics.len(), 2);

    let january = &metrics[0];
    assert_eq!(january.price_date, date(2024, 1, 16));
    assert_eq!(january.fiscal_period, "Q3");
    assert_eq!(january.fiscal_date, Some(date(2023, 9, 30)));
    assert_eq!(january.pe_ratio, Some(72.0));
    assert_eq!(january.pe_ratio_ttm, None);
    assert!(!january.is_ttm);
    assert_eq!(january.ttm_accepted_date, None);

    let march = &metrics[1];
    assert_eq!(march.price_date, date(2024, 3, 1));
    assert_eq!(march.fiscal_period, "Q4");
    assert_eq!(march.pe_ratio_ttm, Some(20.0));
    assert_eq!(march.pb_ratio, Some(2.0));
    assert_eq!(march.market_cap, Some(100_000.0));
    assert_eq!(march.enterprise_value, Some(103_000.0));
    assert!(march.is_ttm);
    assert!(march.financial_key.is_some());
}

#[tokio::test]
async fn test_close_on_filing_day_uses_the_previous_filing() {
    let db = fresh_warehouse().await;
    db.insert(&reported("AAPL", 1.25)).await;
    derive(&db).await;
    // Q4 and the first TTM are accepted at 16:00 that day
    db.insert(&[price("AAPL", date(2024, 2, 1), 90.0), price("AAPL", date(2024, 2, 2), 100.0)])
        .await;

    market_metrics::pipeline(db.handle(), settings(), RunFilter::default())
        .run()
        .await
        .unwrap();

    let metrics: Vec<MarketMetricRecord> = db.all("price_date").await;
    assert_eq!(metrics.len(), 2);
    assert_eq!(metrics[0].fiscal_period, "Q3");
    assert_eq!(metrics[0].fiscal_date, Some(date(2023, 9, 30)));
    assert_eq!(metrics[0].ttm_accepted_date, None);
    assert_eq!(metrics[0].pe_ratio_ttm, None);
    assert_eq!(metrics[1].fiscal_period, "Q4");
    assert_eq!(metrics[1].pe_ratio_ttm, Some(20.0));
}

#[tokio::test]
async fn test_zero_ttm_eps_leaves_pe_undefined() {
    let db = fresh_warehouse().await;
    db.insert(&reported("MSFT", 0.0)).await;
    derive(&db).await;
    db.insert(&[price("MSFT", date(2024, 3, 1), 100.0)]).await;

    market_metrics::pipeline(db.handle(), settings(), RunFilter::default())
        .run()
        .await
        .unwrap();

    let metrics: Vec<MarketMetricRecord> = db.all("price_date").await;
    assert_eq!(metrics.len(), 1);
    assert_eq!(metrics[0].pe_ratio_ttm, None);
    assert_eq!(metrics[0].pe_ratio, None);
    assert_eq!(metrics[0].market_cap, Some(100_000.0));
}

#[tokio::test]
async fn test_valued_prices_are_not_recomputed() {
    let db = fresh_warehouse().await;
    db.insert(&reported("AAPL", 1.25)).await;
    derive(&db).await;
    db.insert(&[price("AAPL", date(2024, 3, 1), 100.0)]).await;

    let first = market_metrics::pipeline(db.handle(), settings(), RunFilter::default())
        .run()
        .await
        .unwrap();
    db.insert(&[price("AAPL", date(2024, 3, 4), 104.0)]).await;
    let second = market_metrics::pipeline(db.handle(), settings(), RunFilter::default())
        .run()
        .await
        .unwrap();

    assert_eq!(first.records_loaded, 1);
    assert_eq!(second.records_extracted, 1);
    assert_eq!(second.records_loaded, 1);
    assert_eq!(db.count("market_metrics").await, 2);
}
