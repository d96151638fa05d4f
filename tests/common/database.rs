//! Throwaway SQLite warehouses backed by a temp directory

use std::sync::Arc;

use fundamentals_etl::warehouse::mapping::TableRecord;
use fundamentals_etl::warehouse::{SqlValue, SqliteWarehouse, Warehouse};
use tempfile::TempDir;

/// A fresh warehouse; the database file is removed on drop.
pub struct TestWarehouse {
    _dir: TempDir,
    pub sqlite: SqliteWarehouse,
    pub warehouse: Arc<dyn Warehouse>,
}

pub async fn fresh_warehouse() -> TestWarehouse {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let sqlite = SqliteWarehouse::connect(dir.path().join("warehouse.db"))
        .await
        .expect("Failed to open test warehouse");
    let warehouse: Arc<dyn Warehouse> = Arc::new(sqlite.clone());
    TestWarehouse {
        _dir: dir,
        sqlite,
        warehouse,
    }
}

impl TestWarehouse {
    pub fn handle(&self) -> Arc<dyn Warehouse> {
        Arc::clone(&self.warehouse)
    }

    pub async fn count(&self, table: &str) -> i64 {
        let rows = self
            .warehouse
            .fetch(&format!("SELECT COUNT(*) AS n FROM {}", table), &[])
            .await
            .expect("count query failed");
        rows[0].required_i64("n").expect("count column")
    }

    pub async fn insert<R: TableRecord>(&self, records: &[R]) {
        let rows: Vec<_> = records.iter().map(TableRecord::to_row).collect();
        self.warehouse
            .bulk_insert(R::TABLE, &rows)
            .await
            .expect("fixture insert failed");
    }

    /// Fetch every row of `table` as typed records.
    pub async fn all<R: TableRecord>(&self, order_by: &str) -> Vec<R> {
        let rows = self
            .warehouse
            .fetch(&format!("SELECT * FROM {} ORDER BY {}", R::TABLE, order_by), &[])
            .await
            .expect("select failed");
        rows.iter().map(|row| R::from_row(row).expect("row mapping failed")).collect()
    }

    pub async fn scalar_f64(&self, query: &str, params: &[SqlValue]) -> Option<f64> {
        let rows = self.warehouse.fetch(query, params).await.expect("query failed");
        rows.first().and_then(|row| row.values().next().cloned()).and_then(|v| match v {
            SqlValue::Real(x) => Some(x),
            SqlValue::Integer(i) => Some(i as f64),
            _ => None,
        })
    }
}
