use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info};
use uuid::Uuid;

use super::quality::QualityIssue;
use super::result::JobResult;
use crate::error::WarehouseError;
use crate::warehouse::{SqlValue, Warehouse, WarehouseRow};

const MAX_MESSAGE_LEN: usize = 5000;
const MAX_ISSUE_LEN: usize = 1000;

/// Persists job results, their errors and data-quality issues.
#[derive(Clone)]
pub struct JobMonitor {
    warehouse: Arc<dyn Warehouse>,
}

impl JobMonitor {
    pub fn new(warehouse: Arc<dyn Warehouse>) -> Self {
        Self { warehouse }
    }

    /// Store a finalized result and return its generated job id.
    pub async fn save_job_result(&self, result: &JobResult, issues: &[QualityIssue]) -> Result<String, WarehouseError> {
        let job_id = Uuid::new_v4().to_string();
        let metadata = serde_json::to_string(&result.metadata).unwrap_or_else(|_| "{}".to_string());

        let job = WarehouseRow::new()
            .with("job_id", job_id.as_str())
            .with("job_name", result.job_name.as_str())
            .with("status", result.status.as_str())
            .with("start_time", result.start_time)
            .with("end_time", result.end_time)
            .with("duration_seconds", result.duration_seconds)
            .with("records_extracted", result.records_extracted as i64)
            .with("records_transformed", result.records_transformed as i64)
            .with("records_loaded", result.records_loaded as i64)
            .with("error_count", result.errors.len() as i64)
            .with("metadata", metadata);
        self.warehouse.bulk_insert("etl_job_history", &[job]).await?;
        info!("💾 Saved job result for {} with job_id: {}", result.job_name, job_id);

        if !result.errors.is_empty() {
            let now = Utc::now();
            let rows: Vec<WarehouseRow> = result
                .errors
                .iter()
                .map(|error| {
                    WarehouseRow::new()
                        .with("job_id", job_id.as_str())
                        .with("error_message", truncate(error, MAX_MESSAGE_LEN))
                        .with("created_at", now)
                })
                .collect();
            self.warehouse.bulk_insert("etl_job_errors", &rows).await?;
            debug!("saved {} errors for job {}", rows.len(), job_id);
        }

        if !issues.is_empty() {
            self.save_data_quality_issues(&job_id, issues).await?;
        }

        Ok(job_id)
    }

    pub async fn save_data_quality_issues(&self, job_id: &str, issues: &[QualityIssue]) -> Result<u64, WarehouseError> {
        let now = Utc::now();
        let rows: Vec<WarehouseRow> = issues
            .iter()
            .map(|issue| {
                WarehouseRow::new()
                    .with("job_id", job_id)
                    .with("table_name", issue.table_name.as_str())
                    .with("record_identifier", issue.record_identifier.as_str())
                    .with("issue_description", truncate(&issue.description, MAX_ISSUE_LEN))
                    .with("created_at", now)
            })
            .collect();
        let saved = self.warehouse.bulk_insert("etl_data_quality_issues", &rows).await?;
        debug!("saved {} data quality issues for job {}", saved, job_id);
        Ok(saved)
    }

    /// Most recent runs first, optionally filtered by job name and status.
    pub async fn job_history(
        &self,
        job_name: Option<&str>,
        status: Option<&str>,
        limit: u32,
    ) -> Result<Vec<WarehouseRow>, WarehouseError> {
        let mut query = String::from(
            "SELECT job_id, job_name, status, start_time, end_time, duration_seconds, \
             records_extracted, records_transformed, records_loaded, error_count \
             FROM etl_job_history WHERE 1=1",
        );
        let mut params = Vec::new();
        if let Some(name) = job_name {
            query.push_str(" AND job_name = ?");
            params.push(SqlValue::from(name));
        }
        if let Some(status) = status {
            query.push_str(" AND status = ?");
            params.push(SqlValue::from(status));
        }
        query.push_str(" ORDER BY start_time DESC LIMIT ?");
        params.push(SqlValue::Integer(i64::from(limit)));

        self.warehouse.fetch(&query, &params).await
    }

    /// Errors recorded within the last `days` days, newest first.
    pub async fn recent_errors(&self, days: u32) -> Result<Vec<WarehouseRow>, WarehouseError> {
        let since = Utc::now() - chrono::Duration::days(i64::from(days));
        self.warehouse
            .fetch(
                "SELECT j.job_name, j.start_time, e.error_message, e.created_at \
                 FROM etl_job_errors e JOIN etl_job_history j ON e.job_id = j.job_id \
                 WHERE e.created_at >= ? ORDER BY e.created_at DESC",
                &[SqlValue::from(since)],
            )
            .await
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}
