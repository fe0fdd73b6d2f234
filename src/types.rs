use crate::env::{env_or, parse_env};
use crate::{
    DEFAULT_EXPECTED_UPDATE_PERIOD_DAYS, DEFAULT_LOOKBACK, DEFAULT_PROPERTY,
    FilterConfig, MembershipStore, Result, StoreKind, UniqueFilter,
};
use derive_builder::Builder;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use utoipa::ToSchema;

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct RecordRequest {
    #[serde(default)]
    pub id: u64,
    #[schema(value_type = Object)]
    pub payload: Value,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct WorkingResponse {
    pub working: bool,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    pub message: String,
}

/// Filters served by this process, all sharing one backing store
pub struct AppState {
    pub store: Arc<dyn MembershipStore>,
    pub default_config: FilterConfig,
    pub filters: RwLock<HashMap<String, Arc<UniqueFilter>>>,
}

impl AppState {
    pub fn new(
        store: Arc<dyn MembershipStore>,
        default_config: FilterConfig,
    ) -> Self {
        Self {
            store,
            default_config,
            filters: RwLock::new(HashMap::new()),
        }
    }

    /// Returns the filter for `id`, creating it with the default config on
    /// first use.
    pub async fn filter(&self, id: &str) -> Result<Arc<UniqueFilter>> {
        if let Some(filter) = self.filters.read().await.get(id) {
            return Ok(filter.clone());
        }

        let mut filters = self.filters.write().await;
        if let Some(filter) = filters.get(id) {
            return Ok(filter.clone());
        }
        let filter = Arc::new(UniqueFilter::new(
            id,
            self.default_config.clone(),
            self.store.clone(),
        )?);
        filters.insert(id.to_string(), filter.clone());
        Ok(filter)
    }

    /// Replaces the config of `id`. Stored fingerprints and health
    /// timestamps carry over to the new instance.
    pub async fn configure(
        &self,
        id: &str,
        config: FilterConfig,
    ) -> Result<Arc<UniqueFilter>> {
        let mut filters = self.filters.write().await;
        let mut filter = UniqueFilter::new(id, config, self.store.clone())?;
        if let Some(previous) = filters.get(id) {
            filter = filter.with_health(previous.shared_health());
        }
        let filter = Arc::new(filter);
        filters.insert(id.to_string(), filter.clone());
        Ok(filter)
    }
}

#[derive(Builder, Clone)]
#[builder(pattern = "owned")]
pub struct ServerConfig {
    #[builder(default = "\"127.0.0.1\".to_string()")]
    pub server_host: String,
    #[builder(default = "3000")]
    pub server_port: u16,
    #[builder(default)]
    pub store: StoreKind,
    #[builder(default = "DEFAULT_PROPERTY.to_string()")]
    pub property: String,
    #[builder(default = "DEFAULT_LOOKBACK")]
    pub lookback: usize,
    #[builder(default = "DEFAULT_EXPECTED_UPDATE_PERIOD_DAYS")]
    pub expected_update_period_in_days: u64,
}

impl ServerConfig {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        Ok(Self {
            server_host: env_or("SERVER_HOST", "127.0.0.1"),
            server_port: parse_env("SERVER_PORT", "3000")?,
            store: parse_env("UNIQUE_STORE", "memory")?,
            // property may legitimately be blank, so no fallback on empty
            property: std::env::var("UNIQUE_PROPERTY")
                .unwrap_or_else(|_| DEFAULT_PROPERTY.to_string()),
            lookback: parse_env(
                "UNIQUE_LOOKBACK",
                &DEFAULT_LOOKBACK.to_string(),
            )?,
            expected_update_period_in_days: parse_env(
                "UNIQUE_EXPECTED_UPDATE_PERIOD_DAYS",
                &DEFAULT_EXPECTED_UPDATE_PERIOD_DAYS.to_string(),
            )?,
        })
    }

    /// Config applied to filters created on first use
    pub fn filter_config(&self) -> FilterConfig {
        FilterConfig {
            property: self.property.clone(),
            lookback: Some(self.lookback),
            expected_update_period_in_days: Some(
                self.expected_update_period_in_days,
            ),
            ..FilterConfig::default()
        }
    }
}
