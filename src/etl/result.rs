//! Job outcome: each phase reports its own immutable outcome and
//! [`PhaseOutcomes::finalize`] reduces them into one [`JobResult`].

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{info, warn};

use super::quality::ValidationReport;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Running,
    Success,
    Partial,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Success => "success",
            JobStatus::Partial => "partial",
            JobStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Summary of one pipeline invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobResult {
    pub job_name: String,
    pub status: JobStatus,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub duration_seconds: Option<f64>,
    pub records_extracted: u64,
    pub records_transformed: u64,
    pub records_loaded: u64,
    pub errors: Vec<String>,
    pub metadata: BTreeMap<String, Value>,
}

impl JobResult {
    pub fn pending(job_name: &str) -> Self {
        Self {
            job_name: job_name.to_string(),
            status: JobStatus::Pending,
            start_time: Utc::now(),
            end_time: None,
            duration_seconds: None,
            records_extracted: 0,
            records_transformed: 0,
            records_loaded: 0,
            errors: Vec::new(),
            metadata: BTreeMap::new(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == JobStatus::Success
    }

    /// Counts as "succeeded" for exit-code purposes.
    pub fn completed(&self) -> bool {
        matches!(self.status, JobStatus::Success | JobStatus::Partial)
    }

    pub fn calculation_errors(&self) -> u64 {
        self.metadata.get("calculation_errors").and_then(Value::as_u64).unwrap_or(0)
    }

    pub fn log_summary(&self) {
        info!("📊 Result summary for {}:", self.job_name);
        info!("   Status: {}", self.status);
        info!("   Records extracted: {}", self.records_extracted);
        info!("   Records transformed: {}", self.records_transformed);
        info!("   Records loaded: {}", self.records_loaded);
        if let Some(duration) = self.duration_seconds {
            info!("   Duration: {:.2}s", duration);
        }
        if !self.errors.is_empty() {
            warn!("   Errors: {}", self.errors.len());
            for error in self.errors.iter().take(5) {
                warn!("     - {}", error);
            }
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtractOutcome {
    pub records: u64,
    pub attempts: u32,
    pub errors: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransformOutcome {
    pub records: u64,
    pub layers: BTreeMap<String, u64>,
    pub errors: Vec<String>,
    pub calculation_errors: u64,
    pub metadata: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoadOutcome {
    pub records: u64,
    pub batches: u64,
}

/// Whatever phases actually ran, in order.
#[derive(Debug, Clone, Default)]
pub struct PhaseOutcomes {
    pub extract: Option<ExtractOutcome>,
    pub transform: Option<TransformOutcome>,
    pub validation: Option<ValidationReport>,
    pub load: Option<LoadOutcome>,
}

impl PhaseOutcomes {
    /// Reduce the phase outcomes into the final result.
    ///
    /// `failure` is the error that aborted the run, if any.
    pub fn finalize(self, job_name: &str, started: DateTime<Utc>, failure: Option<String>) -> JobResult {
        let ended = Utc::now();
        let mut result = JobResult::pending(job_name);
        result.start_time = started;
        result.end_time = Some(ended);
        result.duration_seconds = Some((ended - started).num_milliseconds() as f64 / 1000.0);

        let mut non_fatal = false;

        if let Some(extract) = self.extract {
            result.records_extracted = extract.records;
            result.metadata.insert("extract_attempts".into(), json!(extract.attempts));
            // an empty extract ends the job as success; its errors are still reported
            non_fatal |= extract.records > 0 && !extract.errors.is_empty();
            result.errors.extend(extract.errors);
        }

        if let Some(transform) = self.transform {
            result.records_transformed = transform.records;
            result.metadata.extend(transform.metadata);
            result.metadata.insert("layers".into(), json!(transform.layers));
            result
                .metadata
                .insert("calculation_errors".into(), json!(transform.calculation_errors));
            non_fatal |= !transform.errors.is_empty() || transform.calculation_errors > 0;
            result.errors.extend(transform.errors);
        }

        if let Some(validation) = self.validation {
            result.metadata.insert(
                "validation".into(),
                json!({
                    "total_records": validation.total_records,
                    "valid_records": validation.valid_records,
                    "invalid_records": validation.invalid_records,
                }),
            );
        }

        if let Some(load) = self.load {
            result.records_loaded = load.records;
            result.metadata.insert("load_batches".into(), json!(load.batches));
        }

        result.status = match failure {
            Some(error) => {
                result.errors.push(error);
                JobStatus::Failed
            }
            None if non_fatal => JobStatus::Partial,
            None => JobStatus::Success,
        };
        result
    }
}
