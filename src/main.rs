use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use fundamentals_etl::api::{ApiGateway, FmpClient, ReportingPeriod};
use fundamentals_etl::etl::monitor::JobMonitor;
use fundamentals_etl::orchestrator::{into_result, DailyPlan, Orchestrator, Stages, DEFAULT_SYMBOLS};
use fundamentals_etl::pipelines::prices::DateRange;
use fundamentals_etl::pipelines::statements::DEFAULT_LIMIT;
use fundamentals_etl::pipelines::{company, market_metrics, prices, ratios, statements, ttm, RunFilter};
use fundamentals_etl::warehouse::Warehouse;
use fundamentals_etl::{Config, JobResult, SqliteWarehouse};

#[derive(Parser, Debug)]
#[command(name = "fundamentals-etl", version, about = "Financial data ETL and point-in-time analytics")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run every pipeline: API extraction in parallel, then TTM, ratios and market metrics
    Daily(DailyArgs),
    /// Fetch company profiles
    Companies(SymbolArgs),
    /// Fetch end-of-day prices
    Prices {
        #[command(flatten)]
        symbols: SymbolArgs,
        #[command(flatten)]
        dates: DateArgs,
    },
    /// Fetch income, balance-sheet and cash-flow statements
    Statements {
        #[command(flatten)]
        symbols: SymbolArgs,
        #[command(flatten)]
        statements: StatementArgs,
    },
    /// Compute trailing-twelve-month aggregates
    Ttm(FilterArgs),
    /// Compute financial ratios
    Ratios {
        #[command(flatten)]
        filter: FilterArgs,
        #[command(flatten)]
        dates: DateArgs,
    },
    /// Compute point-in-time valuation multiples
    MarketMetrics {
        #[command(flatten)]
        filter: FilterArgs,
        #[command(flatten)]
        dates: DateArgs,
    },
    /// Create the warehouse tables
    InitDb,
    /// Show recent job runs and errors
    History {
        #[arg(long)]
        job: Option<String>,
        #[arg(long)]
        status: Option<String>,
        #[arg(long, default_value_t = 20)]
        limit: u32,
        /// Also list errors from the last N days
        #[arg(long)]
        errors_days: Option<u32>,
    },
}

#[derive(Args, Debug)]
struct SymbolArgs {
    /// Ticker symbols; defaults to AAPL MSFT GOOGL
    #[arg(long, num_args = 1.., value_delimiter = ',')]
    symbols: Vec<String>,
}

impl SymbolArgs {
    fn resolve(&self) -> Vec<String> {
        if self.symbols.is_empty() {
            info!("No symbols specified, using default test symbols");
            DEFAULT_SYMBOLS.iter().map(|s| s.to_string()).collect()
        } else {
            self.symbols.iter().map(|s| s.trim().to_uppercase()).collect()
        }
    }
}

#[derive(Args, Debug)]
struct FilterArgs {
    /// Restrict to these symbols; all companies when omitted
    #[arg(long, num_args = 1.., value_delimiter = ',')]
    symbols: Vec<String>,
}

#[derive(Args, Debug, Clone, Copy)]
struct DateArgs {
    #[arg(long)]
    from: Option<NaiveDate>,
    #[arg(long)]
    to: Option<NaiveDate>,
}

#[derive(Args, Debug, Clone, Copy)]
struct StatementArgs {
    /// Fetch annual statements instead of quarterly
    #[arg(long)]
    annual: bool,
    #[arg(long, default_value_t = DEFAULT_LIMIT)]
    limit: u32,
}

impl StatementArgs {
    fn period(&self) -> ReportingPeriod {
        if self.annual {
            ReportingPeriod::Annual
        } else {
            ReportingPeriod::Quarter
        }
    }
}

#[derive(Args, Debug)]
struct DailyArgs {
    #[command(flatten)]
    symbols: SymbolArgs,
    #[command(flatten)]
    dates: DateArgs,
    #[command(flatten)]
    statements: StatementArgs,
    /// Run the derived engines over every company in the warehouse
    #[arg(long)]
    all_symbols: bool,
    #[arg(long)]
    skip_companies: bool,
    #[arg(long)]
    skip_prices: bool,
    #[arg(long)]
    skip_statements: bool,
    #[arg(long)]
    skip_ttm: bool,
    #[arg(long)]
    skip_ratios: bool,
    #[arg(long)]
    skip_market_metrics: bool,
}

fn filter(args: &FilterArgs, dates: Option<DateArgs>) -> RunFilter {
    RunFilter {
        symbols: (!args.symbols.is_empty()).then(|| args.symbols.iter().map(|s| s.to_uppercase()).collect()),
        from: dates.and_then(|d| d.from),
        to: dates.and_then(|d| d.to),
    }
}

fn api_client(config: &Config) -> Result<Arc<dyn ApiGateway>> {
    let client = FmpClient::from_config(config).context("FMP API client unavailable")?;
    Ok(Arc::new(client))
}

/// 0 for success/partial, 2 for a failed run.
fn report(result: &JobResult) -> i32 {
    if result.completed() {
        println!("✅ {}: {} ({} records loaded)", result.job_name, result.status, result.records_loaded);
        0
    } else {
        eprintln!("❌ {}: {}", result.job_name, result.status);
        for e in result.errors.iter().take(5) {
            eprintln!("   - {}", e);
        }
        2
    }
}

async fn run(cli: Cli, config: Config) -> Result<i32> {
    let sqlite = SqliteWarehouse::connect(&config.database_path)
        .await
        .with_context(|| format!("Failed to open warehouse at {}", config.database_path.display()))?;
    info!("💾 Warehouse ready at {}", config.database_path.display());
    let warehouse: Arc<dyn Warehouse> = Arc::new(sqlite);
    let settings = config.etl_settings();

    let result = match cli.command {
        Command::InitDb => {
            println!("✅ Warehouse schema initialized at {}", config.database_path.display());
            return Ok(0);
        }
        Command::History {
            job,
            status,
            limit,
            errors_days,
        } => {
            let monitor = JobMonitor::new(Arc::clone(&warehouse));
            for row in monitor.job_history(job.as_deref(), status.as_deref(), limit).await? {
                println!(
                    "{} {:<22} {:<8} loaded={} errors={}",
                    row.text("start_time")?.unwrap_or_default(),
                    row.text("job_name")?.unwrap_or_default(),
                    row.text("status")?.unwrap_or_default(),
                    row.i64("records_loaded")?.unwrap_or(0),
                    row.i64("error_count")?.unwrap_or(0),
                );
            }
            if let Some(days) = errors_days {
                for row in monitor.recent_errors(days).await? {
                    println!(
                        "⚠️  {} {}: {}",
                        row.text("created_at")?.unwrap_or_default(),
                        row.text("job_name")?.unwrap_or_default(),
                        row.text("error_message")?.unwrap_or_default(),
                    );
                }
            }
            return Ok(0);
        }
        Command::Daily(args) => {
            let api = match api_client(&config) {
                Ok(api) => Some(api),
                Err(e) => {
                    error!("{:#}", e);
                    None
                }
            };
            let mut plan = DailyPlan::new(args.symbols.resolve());
            plan.stages = Stages {
                companies: !args.skip_companies,
                prices: !args.skip_prices,
                statements: !args.skip_statements,
                ttm: !args.skip_ttm,
                ratios: !args.skip_ratios,
                market_metrics: !args.skip_market_metrics,
            };
            plan.price_range = DateRange::resolve(args.dates.from, args.dates.to);
            plan.period = args.statements.period();
            plan.limit = args.statements.limit;
            plan.all_symbols = args.all_symbols;

            let orchestrator =
                Orchestrator::new(api, Arc::clone(&warehouse), settings).with_timeout(config.pipeline_timeout);
            let summary = orchestrator.run(&plan).await;
            summary.log();
            return Ok(summary.exit_code());
        }
        Command::Companies(symbols) => {
            let pipeline = company::pipeline(api_client(&config)?, warehouse, settings, symbols.resolve());
            into_result(pipeline.run().await)
        }
        Command::Prices { symbols, dates } => {
            let range = DateRange::resolve(dates.from, dates.to);
            let pipeline = prices::pipeline(api_client(&config)?, warehouse, settings, symbols.resolve(), range);
            into_result(pipeline.run().await)
        }
        Command::Statements { symbols, statements: args } => {
            let pipeline = statements::pipeline(
                api_client(&config)?,
                warehouse,
                settings,
                symbols.resolve(),
                args.period(),
                args.limit,
            );
            into_result(pipeline.run().await)
        }
        Command::Ttm(args) => into_result(ttm::pipeline(warehouse, settings, filter(&args, None)).run().await),
        Command::Ratios { filter: args, dates } => {
            into_result(ratios::pipeline(warehouse, settings, filter(&args, Some(dates))).run().await)
        }
        Command::MarketMetrics { filter: args, dates } => {
            into_result(market_metrics::pipeline(warehouse, settings, filter(&args, Some(dates))).run().await)
        }
    };

    Ok(report(&result))
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env()?;

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    tracing_subscriber::fmt().with_env_filter(env_filter).with_target(false).init();

    let cli = Cli::parse();
    let code = run(cli, config).await?;
    std::process::exit(code);
}
