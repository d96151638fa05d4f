//! Company profiles: API → staging → `companies`.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use tracing::{info, warn};

use super::{MergeLoader, FETCH_CONCURRENCY};
use crate::api::{ApiGateway, ProfileDto};
use crate::error::EtlError;
use crate::etl::monitor::JobMonitor;
use crate::etl::{EtlSettings, Extraction, Extractor, Pipeline, Transformation, Transformer, STAGING_LAYER};
use crate::models::CompanyProfile;
use crate::warehouse::Warehouse;

pub const JOB_NAME: &str = "company_profiles";

pub struct CompanyExtractor {
    api: Arc<dyn ApiGateway>,
    symbols: Vec<String>,
}

impl CompanyExtractor {
    pub fn new(api: Arc<dyn ApiGateway>, symbols: Vec<String>) -> Self {
        Self { api, symbols }
    }
}

#[async_trait]
impl Extractor for CompanyExtractor {
    type Record = ProfileDto;

    async fn extract(&self) -> Result<Extraction<ProfileDto>, EtlError> {
        info!("🏢 Fetching company profiles for {} symbols", self.symbols.len());
        let mut extraction = Extraction::default();

        let mut fetches = stream::iter(self.symbols.iter().cloned())
            .map(|symbol| async move {
                let fetched = self.api.fetch_profile(&symbol).await;
                (symbol, fetched)
            })
            .buffered(FETCH_CONCURRENCY);
        while let Some((symbol, fetched)) = fetches.next().await {
            match fetched {
                Ok(Some(profile)) => extraction.records.push(profile),
                Ok(None) => {
                    warn!("No profile returned for {}", symbol);
                    extraction.errors.push(format!("{}: no profile returned", symbol));
                }
                Err(e) => {
                    warn!("❌ Failed to fetch profile for {}: {}", symbol, e);
                    extraction.errors.push(format!("{}: {}", symbol, e));
                }
            }
        }
        Ok(extraction)
    }
}

pub fn to_company(profile: ProfileDto, updated_at: DateTime<Utc>) -> CompanyProfile {
    CompanyProfile {
        symbol: profile.symbol.trim().to_uppercase(),
        company_name: profile.company_name.unwrap_or_default().trim().to_string(),
        sector: profile.sector.filter(|s| !s.is_empty()),
        industry: profile.industry.filter(|s| !s.is_empty()),
        exchange: profile.exchange.filter(|s| !s.is_empty()),
        market_cap: profile.market_cap,
        updated_at,
    }
}

pub struct CompanyTransformer;

impl Transformer for CompanyTransformer {
    type Input = ProfileDto;
    type Output = CompanyProfile;

    fn transform(&self, profiles: Vec<ProfileDto>) -> Transformation<CompanyProfile> {
        let updated_at = Utc::now();
        let companies = profiles.into_iter().map(|p| to_company(p, updated_at)).collect();
        Transformation::single(STAGING_LAYER, companies)
    }
}

pub type CompanyPipeline = Pipeline<CompanyExtractor, CompanyTransformer, MergeLoader<CompanyProfile>>;

pub fn pipeline(
    api: Arc<dyn ApiGateway>,
    warehouse: Arc<dyn Warehouse>,
    settings: EtlSettings,
    symbols: Vec<String>,
) -> CompanyPipeline {
    Pipeline::new(
        JOB_NAME,
        CompanyExtractor::new(api, symbols),
        CompanyTransformer,
        MergeLoader::upsert(Arc::clone(&warehouse), &["symbol"]),
        settings,
    )
    .with_monitor(JobMonitor::new(warehouse))
}
