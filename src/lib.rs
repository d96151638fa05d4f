pub mod api;
pub mod calc;
pub mod config;
pub mod error;
pub mod etl;
pub mod models;
pub mod orchestrator;
pub mod pipelines;
pub mod warehouse;

pub use config::Config;
pub use error::{ApiError, CalculationError, EtlError, RunError, WarehouseError};
pub use etl::result::{JobResult, JobStatus};
pub use etl::{EtlSettings, Pipeline};
pub use warehouse::{SqliteWarehouse, Warehouse};
