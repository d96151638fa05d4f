//! Daily run: independent API pipelines in parallel, then the derived-metric
//! engines in dependency order.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::task::JoinSet;
use tracing::{error, info, warn};

use crate::api::{ApiGateway, ReportingPeriod};
use crate::error::RunError;
use crate::etl::result::{JobResult, JobStatus};
use crate::etl::EtlSettings;
use crate::pipelines::prices::DateRange;
use crate::pipelines::statements::DEFAULT_LIMIT;
use crate::pipelines::{company, market_metrics, prices, ratios, statements, ttm, RunFilter};
use crate::warehouse::Warehouse;

pub const DEFAULT_SYMBOLS: [&str; 3] = ["AAPL", "MSFT", "GOOGL"];

/// Which stages a daily run executes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stages {
    pub companies: bool,
    pub prices: bool,
    pub statements: bool,
    pub ttm: bool,
    pub ratios: bool,
    pub market_metrics: bool,
}

impl Default for Stages {
    fn default() -> Self {
        Self {
            companies: true,
            prices: true,
            statements: true,
            ttm: true,
            ratios: true,
            market_metrics: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct DailyPlan {
    pub symbols: Vec<String>,
    pub stages: Stages,
    pub price_range: DateRange,
    pub period: ReportingPeriod,
    pub limit: u32,
    /// Run the derived engines over every company, not just `symbols`.
    pub all_symbols: bool,
}

impl DailyPlan {
    pub fn new(symbols: Vec<String>) -> Self {
        Self {
            symbols,
            stages: Stages::default(),
            price_range: DateRange::resolve(None, None),
            period: ReportingPeriod::Quarter,
            limit: DEFAULT_LIMIT,
            all_symbols: false,
        }
    }

    fn derived_filter(&self) -> RunFilter {
        if self.all_symbols {
            RunFilter::default()
        } else {
            RunFilter {
                symbols: Some(self.symbols.clone()),
                ..Default::default()
            }
        }
    }
}

/// One line of the end-of-run report.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineReport {
    pub job_name: String,
    pub status: JobStatus,
    pub records_loaded: u64,
    pub duration_seconds: f64,
    pub errors: Vec<String>,
}

impl PipelineReport {
    pub fn succeeded(&self) -> bool {
        matches!(self.status, JobStatus::Success | JobStatus::Partial)
    }

    fn failed(job_name: &str, message: String) -> Self {
        Self {
            job_name: job_name.to_string(),
            status: JobStatus::Failed,
            records_loaded: 0,
            duration_seconds: 0.0,
            errors: vec![message],
        }
    }
}

impl From<JobResult> for PipelineReport {
    fn from(result: JobResult) -> Self {
        Self {
            job_name: result.job_name,
            status: result.status,
            records_loaded: result.records_loaded,
            duration_seconds: result.duration_seconds.unwrap_or_default(),
            errors: result.errors,
        }
    }
}

/// A failed run still carries its finalized result.
pub fn into_result(outcome: Result<JobResult, RunError>) -> JobResult {
    match outcome {
        Ok(result) => result,
        Err(e) => *e.result,
    }
}

#[derive(Debug, Clone, Default)]
pub struct RunReport {
    pub pipelines: Vec<PipelineReport>,
    pub timed_out: bool,
    pub duration: Duration,
}

impl RunReport {
    /// 0 when every pipeline succeeded, 1 when some did, 2 when none did.
    pub fn exit_code(&self) -> i32 {
        let succeeded = self.pipelines.iter().filter(|p| p.succeeded()).count();
        if succeeded == 0 {
            2
        } else if succeeded == self.pipelines.len() && !self.timed_out {
            0
        } else {
            1
        }
    }

    pub fn log(&self) {
        info!("{}", "=".repeat(60));
        info!("📋 Pipeline Execution Summary ({:.1}s)", self.duration.as_secs_f64());
        for report in &self.pipelines {
            let icon = if report.succeeded() { "✅" } else { "❌" };
            info!(
                "  {} {}: {} ({} records, {:.1}s)",
                icon, report.job_name, report.status, report.records_loaded, report.duration_seconds
            );
            for e in report.errors.iter().take(3) {
                error!("    - {}", e);
            }
        }
        if self.timed_out {
            error!("⏰ Run exceeded its time budget; remaining pipelines were cancelled");
        }
    }
}

pub struct Orchestrator {
    api: Option<Arc<dyn ApiGateway>>,
    warehouse: Arc<dyn Warehouse>,
    settings: EtlSettings,
    timeout: Option<Duration>,
}

impl Orchestrator {
    pub fn new(api: Option<Arc<dyn ApiGateway>>, warehouse: Arc<dyn Warehouse>, settings: EtlSettings) -> Self {
        Self {
            api,
            warehouse,
            settings,
            timeout: None,
        }
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub async fn run(&self, plan: &DailyPlan) -> RunReport {
        let started = Instant::now();
        if plan.symbols.is_empty() {
            error!("No symbols to process");
            return RunReport::default();
        }
        info!("🚀 Starting daily pipeline for {} symbols", plan.symbols.len());

        let reports = Mutex::new(Vec::new());
        let timed_out = match self.timeout {
            Some(budget) => tokio::time::timeout(budget, self.run_stages(plan, &reports)).await.is_err(),
            None => {
                self.run_stages(plan, &reports).await;
                false
            }
        };

        RunReport {
            pipelines: reports.into_inner().unwrap_or_else(|poisoned| poisoned.into_inner()),
            timed_out,
            duration: started.elapsed(),
        }
    }

    async fn run_stages(&self, plan: &DailyPlan, reports: &Mutex<Vec<PipelineReport>>) {
        let record = |report: PipelineReport| {
            if let Ok(mut reports) = reports.lock() {
                reports.push(report);
            }
        };

        self.run_independent(plan, &record).await;

        let stages = plan.stages;
        if stages.ttm || stages.ratios || stages.market_metrics {
            info!("PHASE 2: Running dependent ETLs sequentially");
        }
        let filter = plan.derived_filter();
        if stages.statements && stages.ttm {
            let pipeline = ttm::pipeline(Arc::clone(&self.warehouse), self.settings.clone(), filter.clone());
            record(into_result(pipeline.run().await).into());
        }
        if stages.ratios {
            let pipeline = ratios::pipeline(Arc::clone(&self.warehouse), self.settings.clone(), filter.clone());
            record(into_result(pipeline.run().await).into());
        }
        if stages.market_metrics {
            let pipeline = market_metrics::pipeline(Arc::clone(&self.warehouse), self.settings.clone(), filter);
            record(into_result(pipeline.run().await).into());
        }
    }

    /// Company, price and statement pipelines write disjoint tables, so they
    /// run as concurrent tasks.
    async fn run_independent(&self, plan: &DailyPlan, record: &impl Fn(PipelineReport)) {
        let stages = plan.stages;
        let wanted = [
            (company::JOB_NAME, stages.companies),
            (prices::JOB_NAME, stages.prices),
            (statements::JOB_NAME, stages.statements),
        ];
        if !wanted.iter().any(|(_, on)| *on) {
            return;
        }
        let Some(api) = &self.api else {
            for (job_name, _) in wanted.iter().filter(|(_, on)| *on) {
                warn!("Skipping {}: no API client configured", job_name);
                record(PipelineReport::failed(job_name, "no API client configured".into()));
            }
            return;
        };

        info!("PHASE 1: Running independent ETLs in parallel");
        let mut tasks = JoinSet::new();
        if stages.companies {
            let pipeline = company::pipeline(
                Arc::clone(api),
                Arc::clone(&self.warehouse),
                self.settings.clone(),
                plan.symbols.clone(),
            );
            tasks.spawn(async move { into_result(pipeline.run().await) });
        }
        if stages.prices {
            let pipeline = prices::pipeline(
                Arc::clone(api),
                Arc::clone(&self.warehouse),
                self.settings.clone(),
                plan.symbols.clone(),
                plan.price_range,
            );
            tasks.spawn(async move { into_result(pipeline.run().await) });
        }
        if stages.statements {
            let pipeline = statements::pipeline(
                Arc::clone(api),
                Arc::clone(&self.warehouse),
                self.settings.clone(),
                plan.symbols.clone(),
                plan.period,
                plan.limit,
            );
            tasks.spawn(async move { into_result(pipeline.run().await) });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(result) => record(result.into()),
                Err(e) => {
                    error!("Pipeline task panicked: {}", e);
                    record(PipelineReport::failed("unknown", e.to_string()));
                }
            }
        }
    }
}
