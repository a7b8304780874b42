//! 縣市 / 鄉鎮區查詢

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::debug;

use rf_core::ports::RegistrationApiPort;

/// Address option lists for the step-1 form. Lookups are public data, so
/// no token preflight here.
pub struct LookupAddress {
    api: Arc<dyn RegistrationApiPort>,
}

impl LookupAddress {
    pub fn new(api: Arc<dyn RegistrationApiPort>) -> Self {
        Self { api }
    }

    pub async fn cities(&self) -> Result<Vec<String>> {
        let cities = self
            .api
            .lookup_cities()
            .await
            .context("failed to fetch city list")?;
        debug!(count = cities.len(), "city list fetched");
        Ok(cities)
    }

    pub async fn districts(&self, city: &str) -> Result<Vec<String>> {
        let districts = self
            .api
            .lookup_districts(city)
            .await
            .with_context(|| format!("failed to fetch districts for {city}"))?;
        debug!(city, count = districts.len(), "district list fetched");
        Ok(districts)
    }
}
