use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::query::Query;
use sqlx::sqlite::{
    SqliteArguments, SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow, SqliteSynchronous,
};
use sqlx::{Column, Row, Sqlite, SqlitePool, TypeInfo, ValueRef};
use tracing::{debug, info};

use super::schema::SCHEMA;
use super::{SqlValue, Warehouse, WarehouseRow, DATE_FORMAT, TIMESTAMP_FORMAT};
use crate::error::WarehouseError;

/// SQLx-backed warehouse on a single SQLite file
#[derive(Clone)]
pub struct SqliteWarehouse {
    pool: SqlitePool,
}

impl SqliteWarehouse {
    /// Open (or create) the database file and make sure the schema exists.
    pub async fn connect(database_path: impl AsRef<Path>) -> Result<Self, WarehouseError> {
        let database_path = database_path.as_ref();
        info!("🗄️  Connecting to warehouse: {}", database_path.display());

        // WAL so readers in dependent pipelines don't block on writers
        let options = SqliteConnectOptions::new()
            .filename(database_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .pragma("cache_size", "10000")
            .pragma("temp_store", "memory");

        let pool = SqlitePoolOptions::new()
            .max_connections(16)
            .acquire_timeout(Duration::from_secs(30))
            .connect_with(options)
            .await?;

        let warehouse = Self { pool };
        warehouse.init_schema().await?;
        info!("✅ Warehouse ready");
        Ok(warehouse)
    }

    pub async fn init_schema(&self) -> Result<(), WarehouseError> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl Warehouse for SqliteWarehouse {
    async fn fetch(&self, query: &str, params: &[SqlValue]) -> Result<Vec<WarehouseRow>, WarehouseError> {
        let mut statement = sqlx::query(query);
        for param in params {
            statement = bind_value(statement, param);
        }

        let rows = statement.fetch_all(&self.pool).await?;
        debug!("fetched {} rows", rows.len());
        rows.iter().map(decode_row).collect()
    }

    async fn bulk_insert(&self, table: &str, rows: &[WarehouseRow]) -> Result<u64, WarehouseError> {
        if rows.is_empty() {
            return Ok(0);
        }
        let columns = shared_columns(table, rows)?;
        let sql = insert_statement(table, &columns);

        let mut tx = self.pool.begin().await?;
        let mut affected = 0;
        for row in rows {
            let mut statement = sqlx::query(&sql);
            for value in row.values() {
                statement = bind_value(statement, value);
            }
            affected += statement.execute(&mut *tx).await?.rows_affected();
        }
        tx.commit().await?;

        debug!("inserted {} rows into {}", affected, table);
        Ok(affected)
    }

    async fn merge(
        &self,
        table: &str,
        rows: &[WarehouseRow],
        match_keys: &[&str],
        update_columns: Option<&[&str]>,
    ) -> Result<u64, WarehouseError> {
        if rows.is_empty() {
            return Ok(0);
        }
        let columns = shared_columns(table, rows)?;
        for key in match_keys {
            validate_identifier(key)?;
            if !columns.iter().any(|c| c.eq_ignore_ascii_case(key)) {
                return Err(WarehouseError::mapping(key, format!("merge key missing from rows for {}", table)));
            }
        }

        let updates: Vec<String> = match update_columns {
            Some(list) => {
                for column in list {
                    validate_identifier(column)?;
                }
                list.iter().map(|c| c.to_ascii_lowercase()).collect()
            }
            None => columns
                .iter()
                .filter(|c| !match_keys.iter().any(|k| k.eq_ignore_ascii_case(c)))
                .cloned()
                .collect(),
        };

        let conflict_action = if updates.is_empty() {
            "DO NOTHING".to_string()
        } else {
            let assignments: Vec<String> = updates.iter().map(|c| format!("{c} = excluded.{c}")).collect();
            format!("DO UPDATE SET {}", assignments.join(", "))
        };
        let sql = format!(
            "{} ON CONFLICT({}) {}",
            insert_statement(table, &columns),
            match_keys.join(", "),
            conflict_action
        );

        let mut tx = self.pool.begin().await?;
        let mut affected = 0;
        for row in rows {
            let mut statement = sqlx::query(&sql);
            for value in row.values() {
                statement = bind_value(statement, value);
            }
            affected += statement.execute(&mut *tx).await?.rows_affected();
        }
        tx.commit().await?;

        debug!("merged {} rows into {}", affected, table);
        Ok(affected)
    }
}

fn insert_statement(table: &str, columns: &[String]) -> String {
    let placeholders = vec!["?"; columns.len()].join(", ");
    format!("INSERT INTO {} ({}) VALUES ({})", table, columns.join(", "), placeholders)
}

/// Every row in one write must carry the same columns in the same order.
fn shared_columns(table: &str, rows: &[WarehouseRow]) -> Result<Vec<String>, WarehouseError> {
    validate_identifier(table)?;
    let columns: Vec<String> = rows[0].column_names().map(str::to_string).collect();
    if columns.is_empty() {
        return Err(WarehouseError::InconsistentColumns { table: table.to_string() });
    }
    for column in &columns {
        validate_identifier(column)?;
    }
    let consistent = rows.iter().all(|row| {
        row.len() == columns.len() && row.column_names().zip(&columns).all(|(a, b)| a == b)
    });
    if !consistent {
        return Err(WarehouseError::InconsistentColumns { table: table.to_string() });
    }
    Ok(columns)
}

pub(crate) fn validate_identifier(name: &str) -> Result<(), WarehouseError> {
    let mut chars = name.chars();
    let valid = matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid {
        Ok(())
    } else {
        Err(WarehouseError::InvalidIdentifier(name.to_string()))
    }
}

fn bind_value<'q>(
    query: Query<'q, Sqlite, SqliteArguments<'q>>,
    value: &SqlValue,
) -> Query<'q, Sqlite, SqliteArguments<'q>> {
    match value {
        SqlValue::Null => query.bind(None::<String>),
        SqlValue::Integer(v) => query.bind(*v),
        SqlValue::Real(v) => query.bind(*v),
        SqlValue::Text(v) => query.bind(v.clone()),
        SqlValue::Bool(v) => query.bind(*v),
        SqlValue::Date(v) => query.bind(v.format(DATE_FORMAT).to_string()),
        SqlValue::Timestamp(v) => query.bind(v.format(TIMESTAMP_FORMAT).to_string()),
    }
}

/// Decode by SQLite storage class; typing beyond that happens in the row getters.
fn decode_row(row: &SqliteRow) -> Result<WarehouseRow, WarehouseError> {
    let mut decoded = WarehouseRow::new();
    for (index, column) in row.columns().iter().enumerate() {
        let raw = row.try_get_raw(index)?;
        let value = if raw.is_null() {
            SqlValue::Null
        } else {
            let storage_class = raw.type_info().name().to_string();
            match storage_class.as_str() {
                "INTEGER" | "BIGINT" | "INT8" | "BOOLEAN" => SqlValue::Integer(row.try_get::<i64, _>(index)?),
                "REAL" | "NUMERIC" => SqlValue::Real(row.try_get::<f64, _>(index)?),
                "TEXT" | "DATE" | "DATETIME" | "TIME" => SqlValue::Text(row.try_get::<String, _>(index)?),
                other => {
                    return Err(WarehouseError::mapping(
                        column.name(),
                        format!("unsupported storage class {}", other),
                    ))
                }
            }
        };
        decoded.set(column.name(), value);
    }
    Ok(decoded)
}
