//! Common test utilities and helpers

pub mod database;
pub mod fixtures;

pub use database::{fresh_warehouse, TestWarehouse};

/// Logging utilities for tests
pub mod logging {
    use std::sync::Once;
    use tracing::{debug, info};

    static INIT: Once = Once::new();

    /// Initialize test logging
    pub fn init_test_logging() {
        INIT.call_once(|| {
            // test-log may already have installed a subscriber
            let _ = tracing::subscriber::set_global_default(
                tracing_subscriber::fmt()
                    .with_env_filter("fundamentals_etl=debug,main=debug")
                    .with_test_writer()
                    .finish(),
            );
        });
    }

    pub fn log_test_step(step: &str) {
        info!("🧪 Test Step: {}", step);
    }

    pub fn log_test_data<T: std::fmt::Debug>(label: &str, data: &T) {
        debug!("📊 {}: {:?}", label, data);
    }
}
