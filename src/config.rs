use anyhow::{anyhow, Result};
use url::Url;

use crate::api::Algorithm;

/// Runtime configuration, read from the environment.
#[derive(Debug, Clone)]
pub struct Config {
    pub api_base: String,
    pub dataset: String,
    pub model: String,
    pub algorithm: Algorithm,
    pub gcf_size: i64,
    pub cf_method: String,
    pub strategy: String,
    pub direction: i64,
    pub features_to_change: i64,
    pub data_timeout_secs: u64,
    pub http_timeout_secs: Option<u64>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base: "http://127.0.0.1:8000/".to_string(),
            dataset: "compas".to_string(),
            model: "xgb".to_string(),
            algorithm: Algorithm::CGlance,
            gcf_size: 3,
            cf_method: "Dice".to_string(),
            strategy: "Max Effectiveness".to_string(),
            direction: 1,
            features_to_change: 5,
            data_timeout_secs: 60,
            http_timeout_secs: None,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let d = Self::default();
        let algorithm = match std::env::var("GLANCE_ALGORITHM") {
            Ok(raw) => raw.parse()?,
            Err(_) => d.algorithm,
        };
        let cfg = Self {
            api_base: std::env::var("GLANCE_API_BASE").unwrap_or(d.api_base),
            dataset: std::env::var("GLANCE_DATASET").unwrap_or(d.dataset),
            model: std::env::var("GLANCE_MODEL").unwrap_or(d.model),
            algorithm,
            gcf_size: std::env::var("GLANCE_GCF_SIZE").ok().and_then(|v| v.parse().ok()).unwrap_or(d.gcf_size),
            cf_method: std::env::var("GLANCE_CF_METHOD").unwrap_or(d.cf_method),
            strategy: std::env::var("GLANCE_STRATEGY").unwrap_or(d.strategy),
            direction: std::env::var("GLANCE_DIRECTION").ok().and_then(|v| v.parse().ok()).unwrap_or(d.direction),
            features_to_change: std::env::var("GLANCE_FEATURES_TO_CHANGE").ok().and_then(|v| v.parse().ok()).unwrap_or(d.features_to_change),
            data_timeout_secs: std::env::var("GLANCE_DATA_TIMEOUT_SECS").ok().and_then(|v| v.parse().ok()).unwrap_or(d.data_timeout_secs),
            http_timeout_secs: std::env::var("GLANCE_HTTP_TIMEOUT_SECS").ok().and_then(|v| v.parse().ok()),
        };
        cfg.base_url()?;
        Ok(cfg)
    }

    /// Base URL with a guaranteed trailing slash, so relative endpoint
    /// paths join under it instead of replacing its last segment.
    pub fn base_url(&self) -> Result<Url> {
        let mut raw = self.api_base.trim().to_string();
        if !raw.ends_with('/') {
            raw.push('/');
        }
        let url = Url::parse(&raw).map_err(|e| anyhow!("invalid GLANCE_API_BASE {:?}: {}", self.api_base, e))?;
        if url.cannot_be_a_base() {
            return Err(anyhow!("GLANCE_API_BASE {:?} cannot be used as a base URL", self.api_base));
        }
        Ok(url)
    }
}
