//! Lifecycle controller behavior with mocked extract and load capabilities

use assert_matches::assert_matches;
use async_trait::async_trait;
use mockall::{mock, Sequence};
use pretty_assertions::assert_eq;

use fundamentals_etl::etl::monitor::JobMonitor;
use fundamentals_etl::etl::{Extraction, Extractor, Loader, Pipeline};
use fundamentals_etl::models::DailyPrice;
use fundamentals_etl::pipelines::prices::{PriceTransformer, SymbolBar};
use fundamentals_etl::pipelines::MergeLoader;
use fundamentals_etl::{EtlError, JobStatus};

use crate::common::{fixtures, fresh_warehouse, logging};

mock! {
    pub BarSource {}

    #[async_trait]
    impl Extractor for BarSource {
        type Record = SymbolBar;

        async fn extract(&self) -> Result<Extraction<SymbolBar>, EtlError>;
    }
}

mock! {
    pub PriceSink {}

    #[async_trait]
    impl Loader for PriceSink {
        type Record = DailyPrice;

        async fn load(&self, layer: &str, batch: &[DailyPrice]) -> Result<u64, EtlError>;
    }
}

fn bars(n: u32) -> Extraction<SymbolBar> {
    Extraction::new(
        (1..=n)
            .map(|day| SymbolBar {
                symbol: "AAPL".to_string(),
                bar: fixtures::bar(&format!("2024-03-{:02}", day), 170.0 + f64::from(day)),
            })
            .collect(),
    )
}

#[tokio::test]
async fn test_transient_extract_failure_is_retried_then_loaded() {
    logging::init_test_logging();
    let db = fresh_warehouse().await;

    let mut seq = Sequence::new();
    let mut source = MockBarSource::new();
    source
        .expect_extract()
        .times(1)
        .in_sequence(&mut seq)
        .returning(|| Err(EtlError::Transient("connection reset".into())));
    source
        .expect_extract()
        .times(1)
        .in_sequence(&mut seq)
        .returning(|| Ok(bars(3)));

    let pipeline = Pipeline::new(
        "prices_under_test",
        source,
        PriceTransformer,
        MergeLoader::<DailyPrice>::upsert(db.handle(), &["symbol", "price_date"]),
        fixtures::settings(),
    )
    .with_monitor(JobMonitor::new(db.handle()));

    let result = pipeline.run().await.expect("run should recover");

    assert_eq!(result.status, JobStatus::Success);
    assert_eq!(result.records_loaded, 3);
    assert_eq!(result.metadata["extract_attempts"], 2);
    assert_eq!(result.metadata["load_batches"], 2);
    assert_eq!(db.count("daily_prices").await, 3);
    assert_eq!(db.count("etl_job_history").await, 1);
}

#[tokio::test]
async fn test_fatal_extract_error_is_not_retried() {
    let db = fresh_warehouse().await;

    let mut source = MockBarSource::new();
    source
        .expect_extract()
        .times(1)
        .returning(|| Err(EtlError::Fatal("schema drift".into())));
    let mut sink = MockPriceSink::new();
    sink.expect_load().never();

    let pipeline = Pipeline::new("prices_under_test", source, PriceTransformer, sink, fixtures::settings())
        .with_monitor(JobMonitor::new(db.handle()));

    let err = pipeline.run().await.expect_err("fatal extract must fail the run");

    assert_matches!(err.source, EtlError::Fatal(_));
    assert_eq!(err.result.status, JobStatus::Failed);
    assert_eq!(err.result.records_extracted, 0);

    let history = JobMonitor::new(db.handle())
        .job_history(Some("prices_under_test"), None, 10)
        .await
        .unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].text("status").unwrap().as_deref(), Some("failed"));
    assert_eq!(db.count("etl_job_errors").await, 1);
}

#[tokio::test]
async fn test_transient_load_failure_is_retried_per_batch() {
    let mut source = MockBarSource::new();
    source.expect_extract().times(1).returning(|| Ok(bars(3)));

    let mut seq = Sequence::new();
    let mut sink = MockPriceSink::new();
    sink.expect_load()
        .times(1)
        .in_sequence(&mut seq)
        .returning(|_, _| Err(EtlError::Transient("database is locked".into())));
    sink.expect_load()
        .times(2)
        .in_sequence(&mut seq)
        .returning(|_, batch| Ok(batch.len() as u64));

    let mut settings = fixtures::settings();
    settings.enable_monitoring = false;
    let pipeline = Pipeline::new("prices_under_test", source, PriceTransformer, sink, settings);

    let result = pipeline.run().await.unwrap();

    assert_eq!(result.status, JobStatus::Success);
    assert_eq!(result.records_loaded, 3);
}

#[tokio::test]
async fn test_exhausted_load_retries_fail_the_run() {
    let mut source = MockBarSource::new();
    source.expect_extract().times(1).returning(|| Ok(bars(3)));

    let mut sink = MockPriceSink::new();
    sink.expect_load()
        .times(2)
        .returning(|_, _| Err(EtlError::Transient("database is locked".into())));

    let pipeline = Pipeline::new("prices_under_test", source, PriceTransformer, sink, fixtures::settings());

    let err = pipeline.run().await.unwrap_err();

    assert_matches!(err.source, EtlError::Transient(_));
    assert_eq!(err.result.status, JobStatus::Failed);
    assert_eq!(err.result.records_extracted, 3);
    assert_eq!(err.result.records_transformed, 3);
    assert_eq!(err.result.records_loaded, 0);
    assert!(err.result.errors.iter().any(|e| e.contains("database is locked")));
}

#[tokio::test]
async fn test_monitoring_failure_does_not_fail_the_job() {
    let db = fresh_warehouse().await;
    let monitoring = fresh_warehouse().await;
    monitoring.sqlite.close().await;

    let mut source = MockBarSource::new();
    source.expect_extract().times(1).returning(|| Ok(bars(1)));

    let pipeline = Pipeline::new(
        "prices_under_test",
        source,
        PriceTransformer,
        MergeLoader::<DailyPrice>::upsert(db.handle(), &["symbol", "price_date"]),
        fixtures::settings(),
    )
    .with_monitor(JobMonitor::new(monitoring.handle()));

    let result = pipeline.run().await.unwrap();

    assert_eq!(result.status, JobStatus::Success);
    assert_eq!(db.count("daily_prices").await, 1);
}
