use std::time::Duration;

use shared::protocol::{DEFAULT_SAMPLE_LIMIT, MAX_SAMPLE_LIMIT};
use url::Url;

use crate::error::ConfigError;

pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_millis(5000);
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEVELOPMENT_API_BASE: &str = "http://127.0.0.1:8000";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeploymentProfile {
    Production,
    #[default]
    Development,
}

impl std::str::FromStr for DeploymentProfile {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "production" | "prod" | "release" => Ok(Self::Production),
            "development" | "dev" | "debug" => Ok(Self::Development),
            other => Err(ConfigError::UnknownProfile(other.to_string())),
        }
    }
}

/// Inputs for resolving the backend base address once at startup.
#[derive(Debug, Clone, Default)]
pub struct ApiBaseSource {
    /// Explicit override; wins when present and non-empty.
    pub override_url: Option<String>,
    pub profile: DeploymentProfile,
    /// Origin the dashboard itself is served from, used as the same-origin
    /// address in production.
    pub origin: Option<String>,
}

impl ApiBaseSource {
    pub fn resolve(&self) -> Result<Url, ConfigError> {
        let explicit = self
            .override_url
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty());
        let raw = match (explicit, self.profile) {
            (Some(value), _) => value,
            (None, DeploymentProfile::Production) => self
                .origin
                .as_deref()
                .map(str::trim)
                .filter(|value| !value.is_empty())
                .ok_or(ConfigError::MissingOrigin)?,
            (None, DeploymentProfile::Development) => DEVELOPMENT_API_BASE,
        };
        parse_base(raw)
    }
}

fn parse_base(raw: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(raw).map_err(|source| ConfigError::InvalidBase {
        value: raw.to_string(),
        source,
    })?;
    if !matches!(url.scheme(), "http" | "https") || url.cannot_be_a_base() {
        return Err(ConfigError::UnsupportedScheme(raw.to_string()));
    }
    Ok(url)
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub api_base: Url,
    pub sample_limit: u32,
    pub refresh_interval: Duration,
    pub request_timeout: Duration,
}

impl ClientConfig {
    pub fn new(api_base: Url) -> Self {
        Self {
            api_base,
            sample_limit: DEFAULT_SAMPLE_LIMIT,
            refresh_interval: DEFAULT_REFRESH_INTERVAL,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    pub fn resolve(source: &ApiBaseSource) -> Result<Self, ConfigError> {
        Ok(Self::new(source.resolve()?))
    }

    pub fn with_sample_limit(mut self, limit: u32) -> Result<Self, ConfigError> {
        if limit == 0 || limit > MAX_SAMPLE_LIMIT {
            return Err(ConfigError::SampleLimitOutOfRange(limit));
        }
        self.sample_limit = limit;
        Ok(self)
    }

    pub fn with_refresh_interval(mut self, interval: Duration) -> Result<Self, ConfigError> {
        if interval.is_zero() {
            return Err(ConfigError::ZeroRefreshInterval);
        }
        self.refresh_interval = interval;
        Ok(self)
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}
