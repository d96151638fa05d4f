//! Generic extract → transform → load lifecycle.
//!
//! A [`Pipeline`] is assembled from three injected capabilities: an
//! [`Extractor`], a pure [`Transformer`] and a [`Loader`]. The pipeline owns
//! the cross-cutting behavior: retry on transient errors, batching, staging
//! validation, phase hooks and result persistence.

pub mod monitor;
pub mod quality;
pub mod result;
pub mod retry;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use tracing::{error, info, warn};

use crate::error::{EtlError, RunError};
use monitor::JobMonitor;
use quality::{validate_batch, QualityIssue, Validate};
use result::{ExtractOutcome, JobResult, LoadOutcome, PhaseOutcomes, TransformOutcome};
use retry::with_retry;

/// Name of the layer that gets field-level validation.
pub const STAGING_LAYER: &str = "staging";

/// Output of the extract phase: records plus non-fatal per-item errors.
#[derive(Debug, Clone)]
pub struct Extraction<R> {
    pub records: Vec<R>,
    pub errors: Vec<String>,
}

impl<R> Extraction<R> {
    pub fn new(records: Vec<R>) -> Self {
        Self { records, errors: Vec::new() }
    }
}

impl<R> Default for Extraction<R> {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

/// A named record set produced by a transformer.
#[derive(Debug, Clone, PartialEq)]
pub struct Layer<T> {
    pub name: String,
    pub records: Vec<T>,
}

impl<T> Layer<T> {
    pub fn new(name: &str, records: Vec<T>) -> Self {
        Self { name: name.to_string(), records }
    }
}

/// Output of the transform phase.
#[derive(Debug, Clone)]
pub struct Transformation<T> {
    /// Loaded in this order.
    pub layers: Vec<Layer<T>>,
    pub errors: Vec<String>,
    pub calculation_errors: u64,
    pub metadata: BTreeMap<String, Value>,
}

impl<T> Transformation<T> {
    pub fn single(layer: &str, records: Vec<T>) -> Self {
        Self {
            layers: vec![Layer::new(layer, records)],
            errors: Vec::new(),
            calculation_errors: 0,
            metadata: BTreeMap::new(),
        }
    }

    pub fn records(&self) -> u64 {
        self.layers.iter().map(|l| l.records.len() as u64).sum()
    }
}

#[async_trait]
pub trait Extractor: Send + Sync {
    type Record: Send;

    async fn extract(&self) -> Result<Extraction<Self::Record>, EtlError>;
}

/// Pure and deterministic; never retried.
pub trait Transformer: Send + Sync {
    type Input;
    type Output;

    fn transform(&self, records: Vec<Self::Input>) -> Transformation<Self::Output>;
}

#[async_trait]
pub trait Loader: Send + Sync {
    type Record: Send + Sync;

    /// Write one batch of one layer, returning rows written.
    async fn load(&self, layer: &str, batch: &[Self::Record]) -> Result<u64, EtlError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Extract,
    Transform,
    Load,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookStage {
    Pre,
    Post,
}

/// What a hook sees around each phase.
#[derive(Debug, Clone)]
pub struct PhaseEvent<'a> {
    pub job_name: &'a str,
    pub phase: Phase,
    pub stage: HookStage,
    /// Record count, once known.
    pub records: Option<u64>,
}

pub type Hook = Arc<dyn Fn(&PhaseEvent<'_>) -> Result<(), String> + Send + Sync>;

#[derive(Debug, Clone)]
pub struct EtlSettings {
    pub batch_size: usize,
    /// Total attempts for extract and for each load batch.
    pub max_retries: u32,
    pub retry_delay: Duration,
    pub enable_monitoring: bool,
}

impl Default for EtlSettings {
    fn default() -> Self {
        Self {
            batch_size: 1000,
            max_retries: 3,
            retry_delay: Duration::from_secs(5),
            enable_monitoring: true,
        }
    }
}

pub struct Pipeline<E, T, L> {
    job_name: String,
    extractor: E,
    transformer: T,
    loader: L,
    settings: EtlSettings,
    hooks: Vec<Hook>,
    monitor: Option<JobMonitor>,
}

impl<E, T, L> Pipeline<E, T, L>
where
    E: Extractor,
    T: Transformer<Input = E::Record, Output = L::Record>,
    L: Loader,
    L::Record: Validate,
{
    pub fn new(job_name: &str, extractor: E, transformer: T, loader: L, settings: EtlSettings) -> Self {
        Self {
            job_name: job_name.to_string(),
            extractor,
            transformer,
            loader,
            settings,
            hooks: Vec::new(),
            monitor: None,
        }
    }

    /// Attach a monitor; ignored when monitoring is disabled in settings.
    pub fn with_monitor(mut self, monitor: JobMonitor) -> Self {
        if self.settings.enable_monitoring {
            self.monitor = Some(monitor);
        }
        self
    }

    pub fn with_hook(mut self, hook: Hook) -> Self {
        self.hooks.push(hook);
        self
    }

    pub fn job_name(&self) -> &str {
        &self.job_name
    }

    /// Run extract → transform → load once.
    ///
    /// Only extract or load exhausting its retries produces `Err`; every
    /// other problem is folded into the returned result.
    pub async fn run(&self) -> Result<JobResult, RunError> {
        let started = Utc::now();
        let mut outcomes = PhaseOutcomes::default();
        info!("🚀 Starting ETL job: {}", self.job_name);

        // Extract
        self.fire(Phase::Extract, HookStage::Pre, None);
        let extracted = with_retry(
            &format!("{} extract", self.job_name),
            self.settings.max_retries,
            self.settings.retry_delay,
            || self.extractor.extract(),
        )
        .await;
        let (extraction, attempts) = match extracted {
            Ok(value) => value,
            Err(e) => return Err(self.fail(outcomes, started, e, &[]).await),
        };
        let extracted_count = extraction.records.len() as u64;
        outcomes.extract = Some(ExtractOutcome {
            records: extracted_count,
            attempts,
            errors: extraction.errors,
        });
        self.fire(Phase::Extract, HookStage::Post, Some(extracted_count));
        info!("📥 Extracted {} records", extracted_count);

        if extraction.records.is_empty() {
            info!("📭 No data extracted, ending job");
            return Ok(self.finish(outcomes, started, &[]).await);
        }

        // Transform
        self.fire(Phase::Transform, HookStage::Pre, Some(extracted_count));
        let transformation = self.transformer.transform(extraction.records);
        let transformed_count = transformation.records();
        self.fire(Phase::Transform, HookStage::Post, Some(transformed_count));
        info!("🔄 Transformed {} records", transformed_count);

        let mut issues: Vec<QualityIssue> = Vec::new();
        if let Some(staging) = transformation.layers.iter().find(|l| l.name == STAGING_LAYER) {
            if let Some(report) = validate_batch(&staging.name, &staging.records, Utc::now().date_naive()) {
                if report.invalid_records > 0 {
                    warn!(
                        "🔍 Found {} invalid records out of {}",
                        report.invalid_records, report.total_records
                    );
                }
                issues = report.issues.clone();
                outcomes.validation = Some(report);
            }
        }

        outcomes.transform = Some(TransformOutcome {
            records: transformed_count,
            layers: transformation
                .layers
                .iter()
                .map(|l| (l.name.clone(), l.records.len() as u64))
                .collect(),
            errors: transformation.errors,
            calculation_errors: transformation.calculation_errors,
            metadata: transformation.metadata,
        });

        // Load
        self.fire(Phase::Load, HookStage::Pre, Some(transformed_count));
        let batch_size = self.settings.batch_size.max(1);
        let mut load = LoadOutcome::default();
        for layer in &transformation.layers {
            for (index, batch) in layer.records.chunks(batch_size).enumerate() {
                let loaded = with_retry(
                    &format!("{} load {} batch {}", self.job_name, layer.name, index + 1),
                    self.settings.max_retries,
                    self.settings.retry_delay,
                    || self.loader.load(&layer.name, batch),
                )
                .await;
                match loaded {
                    Ok((count, _)) => {
                        load.records += count;
                        load.batches += 1;
                    }
                    Err(e) => {
                        outcomes.load = Some(load);
                        return Err(self.fail(outcomes, started, e, &issues).await);
                    }
                }
            }
        }
        let loaded_count = load.records;
        outcomes.load = Some(load);
        self.fire(Phase::Load, HookStage::Post, Some(loaded_count));
        info!("📤 Loaded {} records", loaded_count);

        Ok(self.finish(outcomes, started, &issues).await)
    }

    async fn finish(&self, outcomes: PhaseOutcomes, started: chrono::DateTime<Utc>, issues: &[QualityIssue]) -> JobResult {
        let result = outcomes.finalize(&self.job_name, started, None);
        info!("✅ ETL job {} completed: {}", self.job_name, result.status);
        result.log_summary();
        self.persist(&result, issues).await;
        result
    }

    async fn fail(
        &self,
        outcomes: PhaseOutcomes,
        started: chrono::DateTime<Utc>,
        source: EtlError,
        issues: &[QualityIssue],
    ) -> RunError {
        error!("❌ ETL job {} failed: {}", self.job_name, source);
        let result = outcomes.finalize(&self.job_name, started, Some(source.to_string()));
        result.log_summary();
        self.persist(&result, issues).await;
        RunError {
            result: Box::new(result),
            source,
        }
    }

    async fn persist(&self, result: &JobResult, issues: &[QualityIssue]) {
        let Some(monitor) = &self.monitor else {
            return;
        };
        if let Err(e) = monitor.save_job_result(result, issues).await {
            error!("Failed to save job result to monitoring: {}", e);
        }
    }

    fn fire(&self, phase: Phase, stage: HookStage, records: Option<u64>) {
        let event = PhaseEvent {
            job_name: &self.job_name,
            phase,
            stage,
            records,
        };
        for hook in &self.hooks {
            if let Err(e) = hook(&event) {
                error!("Hook execution failed for {:?} {:?}: {}", stage, phase, e);
            }
        }
    }
}
