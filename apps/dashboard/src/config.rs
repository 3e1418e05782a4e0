use std::{collections::HashMap, fs, path::Path, time::Duration};

use anyhow::{Context, Result};
use client_core::{
    config::{DEFAULT_REFRESH_INTERVAL, DEFAULT_REQUEST_TIMEOUT},
    ApiBaseSource, ClientConfig, DeploymentProfile,
};
use shared::protocol::DEFAULT_SAMPLE_LIMIT;

#[derive(Debug, Clone)]
pub struct Settings {
    pub api_base: Option<String>,
    pub profile: DeploymentProfile,
    pub origin: Option<String>,
    pub sample_limit: u32,
    pub refresh_interval_ms: u64,
    pub request_timeout_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_base: None,
            profile: DeploymentProfile::Development,
            origin: None,
            sample_limit: DEFAULT_SAMPLE_LIMIT,
            refresh_interval_ms: DEFAULT_REFRESH_INTERVAL.as_millis() as u64,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT.as_secs(),
        }
    }
}

/// Defaults, then `path` if it exists, then the process environment.
pub fn load_settings(path: &Path) -> Result<Settings> {
    let mut settings = Settings::default();
    if let Ok(raw) = fs::read_to_string(path) {
        settings
            .apply_file(&raw)
            .with_context(|| format!("invalid settings file {}", path.display()))?;
    }
    settings.apply_env(|key| std::env::var(key).ok())?;
    Ok(settings)
}

impl Settings {
    fn apply_file(&mut self, raw: &str) -> Result<()> {
        let file_cfg = toml::from_str::<HashMap<String, toml::Value>>(raw)?;
        if let Some(v) = file_cfg.get("api_base").and_then(toml::Value::as_str) {
            self.api_base = Some(v.to_string());
        }
        if let Some(v) = file_cfg.get("profile").and_then(toml::Value::as_str) {
            self.profile = v.parse()?;
        }
        if let Some(v) = file_cfg.get("origin").and_then(toml::Value::as_str) {
            self.origin = Some(v.to_string());
        }
        if let Some(v) = file_cfg.get("sample_limit").and_then(toml::Value::as_integer) {
            self.sample_limit = u32::try_from(v).context("sample_limit out of range")?;
        }
        if let Some(v) = file_cfg
            .get("refresh_interval_ms")
            .and_then(toml::Value::as_integer)
        {
            self.refresh_interval_ms =
                u64::try_from(v).context("refresh_interval_ms out of range")?;
        }
        if let Some(v) = file_cfg
            .get("request_timeout_secs")
            .and_then(toml::Value::as_integer)
        {
            self.request_timeout_secs =
                u64::try_from(v).context("request_timeout_secs out of range")?;
        }
        Ok(())
    }

    fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(v) = lookup("DASHBOARD_API_BASE") {
            self.api_base = Some(v);
        }
        if let Some(v) = lookup("APP__API_BASE") {
            self.api_base = Some(v);
        }
        if let Some(v) = lookup("DASHBOARD_PROFILE") {
            self.profile = v.parse()?;
        }
        if let Some(v) = lookup("DASHBOARD_ORIGIN") {
            self.origin = Some(v);
        }
        if let Some(v) = lookup("DASHBOARD_SAMPLE_LIMIT") {
            self.sample_limit = v
                .parse()
                .with_context(|| format!("DASHBOARD_SAMPLE_LIMIT is not a number: {v}"))?;
        }
        if let Some(v) = lookup("DASHBOARD_REFRESH_INTERVAL_MS") {
            self.refresh_interval_ms = v
                .parse()
                .with_context(|| format!("DASHBOARD_REFRESH_INTERVAL_MS is not a number: {v}"))?;
        }
        Ok(())
    }

    pub fn client_config(&self) -> Result<ClientConfig> {
        let source = ApiBaseSource {
            override_url: self.api_base.clone(),
            profile: self.profile,
            origin: self.origin.clone(),
        };
        let config = ClientConfig::resolve(&source)?
            .with_sample_limit(self.sample_limit)?
            .with_refresh_interval(Duration::from_millis(self.refresh_interval_ms))?
            .with_request_timeout(Duration::from_secs(self.request_timeout_secs));
        Ok(config)
    }
}
