//! Concrete pipelines: upstream API extraction (companies, prices,
//! statements) and the derived-metric engines (TTM, ratios, market metrics).

pub mod company;
pub mod market_metrics;
pub mod prices;
pub mod ratios;
pub mod statements;
pub mod ttm;

use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::error::EtlError;
use crate::etl::Loader;
use crate::warehouse::{SqlValue, TableRecord, Warehouse};

/// Symbols fetched from the API at once; the client's rate limiter still
/// paces the actual requests.
pub const FETCH_CONCURRENCY: usize = 5;

/// Optional restrictions applied by the derived-metric extract queries.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunFilter {
    pub symbols: Option<Vec<String>>,
    /// Inclusive lower bound on the engine's date column.
    pub from: Option<NaiveDate>,
    /// Inclusive upper bound on the engine's date column.
    pub to: Option<NaiveDate>,
}

impl RunFilter {
    pub fn symbols(symbols: &[&str]) -> Self {
        Self {
            symbols: Some(symbols.iter().map(|s| s.to_string()).collect()),
            ..Default::default()
        }
    }

    /// ` AND <column> IN (?, ...)`, or nothing when unfiltered.
    pub fn symbol_clause(&self, column: &str, params: &mut Vec<SqlValue>) -> String {
        match &self.symbols {
            Some(symbols) if !symbols.is_empty() => {
                params.extend(symbols.iter().map(|s| SqlValue::from(s.as_str())));
                format!(" AND {} IN ({})", column, vec!["?"; symbols.len()].join(", "))
            }
            _ => String::new(),
        }
    }

    /// ` AND <column> >= ? AND <column> <= ?` for whichever bounds are set.
    pub fn date_clause(&self, column: &str, params: &mut Vec<SqlValue>) -> String {
        let mut clause = String::new();
        if let Some(from) = self.from {
            clause.push_str(&format!(" AND {} >= ?", column));
            params.push(SqlValue::Date(from));
        }
        if let Some(to) = self.to {
            clause.push_str(&format!(" AND {} <= ?", column));
            params.push(SqlValue::Date(to));
        }
        clause
    }

    pub fn includes(&self, symbol: &str) -> bool {
        match &self.symbols {
            Some(symbols) if !symbols.is_empty() => symbols.iter().any(|s| s == symbol),
            _ => true,
        }
    }
}

/// Loads every layer into `R::TABLE` with a keyed merge.
pub struct MergeLoader<R> {
    warehouse: Arc<dyn Warehouse>,
    match_keys: &'static [&'static str],
    update_columns: Option<&'static [&'static str]>,
    _record: PhantomData<fn() -> R>,
}

impl<R> MergeLoader<R> {
    /// Existing rows are refreshed with the incoming values.
    pub fn upsert(warehouse: Arc<dyn Warehouse>, match_keys: &'static [&'static str]) -> Self {
        Self {
            warehouse,
            match_keys,
            update_columns: None,
            _record: PhantomData,
        }
    }

    /// Existing rows are left untouched.
    pub fn insert_if_absent(warehouse: Arc<dyn Warehouse>, match_keys: &'static [&'static str]) -> Self {
        Self {
            warehouse,
            match_keys,
            update_columns: Some(&[]),
            _record: PhantomData,
        }
    }
}

#[async_trait]
impl<R> Loader for MergeLoader<R>
where
    R: TableRecord + Send + Sync,
{
    type Record = R;

    async fn load(&self, _layer: &str, batch: &[R]) -> Result<u64, EtlError> {
        let rows: Vec<_> = batch.iter().map(TableRecord::to_row).collect();
        let written = self
            .warehouse
            .merge(R::TABLE, &rows, self.match_keys, self.update_columns)
            .await?;
        Ok(written)
    }
}
