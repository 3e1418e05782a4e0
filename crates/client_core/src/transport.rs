//! JSON-over-HTTP access to the machine backend.
//!
//! Every request resolves against a single base address fixed at startup.
//! Non-2xx responses surface the server's `detail`/`message` text; 2xx
//! responses must carry JSON, except that callers may choose to tolerate a
//! malformed body (commands do).

use async_trait::async_trait;
use reqwest::{Client, Method};
use serde::de::DeserializeOwned;
use serde_json::Value;
use shared::{domain::CommandAction, error::ApiError, protocol::machine_command_segments};
use tracing::debug;
use url::Url;

use crate::{
    config::ClientConfig,
    error::{ConfigError, TransportError, GENERIC_REQUEST_FAILURE},
};

/// Path below the base address, kept as raw segments so each one is
/// percent-encoded when the URL is built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiPath {
    segments: Vec<String>,
}

impl ApiPath {
    pub fn route(route: &str) -> Self {
        Self {
            segments: route
                .split('/')
                .filter(|segment| !segment.is_empty())
                .map(str::to_string)
                .collect(),
        }
    }

    pub fn from_segments(segments: impl IntoIterator<Item = String>) -> Self {
        Self {
            segments: segments.into_iter().collect(),
        }
    }

    pub fn command(machine: &str, action: CommandAction) -> Self {
        Self {
            segments: machine_command_segments(machine, action)
                .iter()
                .map(|segment| segment.to_string())
                .collect(),
        }
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Appends the segments to `base`, keeping any path prefix it already has.
    pub fn join_onto(&self, base: &Url) -> Result<Url, TransportError> {
        let mut url = base.clone();
        {
            let mut path = url.path_segments_mut().map_err(|_| TransportError::InvalidPath {
                path: self.to_string(),
            })?;
            path.pop_if_empty();
            path.extend(self.segments.iter());
        }
        Ok(url)
    }
}

impl std::fmt::Display for ApiPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "/{}", self.segments.join("/"))
    }
}

#[derive(Debug, Clone)]
pub struct RequestOptions {
    pub method: Method,
    pub query: Vec<(String, String)>,
    pub body: Option<Value>,
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self {
            method: Method::GET,
            query: Vec::new(),
            body: None,
        }
    }
}

impl RequestOptions {
    pub fn get() -> Self {
        Self::default()
    }

    pub fn post() -> Self {
        Self {
            method: Method::POST,
            ..Self::default()
        }
    }

    pub fn query(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.query.push((key.into(), value.to_string()));
        self
    }

    pub fn json(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }
}

#[async_trait]
pub trait Transport: Send + Sync {
    /// Issues one request and returns the parsed JSON body of a 2xx response.
    async fn request(&self, path: &ApiPath, options: RequestOptions)
        -> Result<Value, TransportError>;

    /// Absolute URL for `path`; used for links that are opened, not fetched.
    fn url_for(&self, path: &ApiPath) -> Result<Url, TransportError>;
}

pub struct HttpTransport {
    http: Client,
    base: Url,
}

impl HttpTransport {
    pub fn new(config: &ClientConfig) -> Result<Self, ConfigError> {
        let http = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(ConfigError::HttpClient)?;
        Ok(Self {
            http,
            base: config.api_base.clone(),
        })
    }

    pub fn base(&self) -> &Url {
        &self.base
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn request(
        &self,
        path: &ApiPath,
        options: RequestOptions,
    ) -> Result<Value, TransportError> {
        let url = self.url_for(path)?;
        let mut builder = self.http.request(options.method.clone(), url.clone());
        if !options.query.is_empty() {
            builder = builder.query(&options.query);
        }
        if let Some(body) = &options.body {
            builder = builder.json(body);
        }

        let network = |source| TransportError::Network {
            url: url.to_string(),
            source,
        };
        let response = builder.send().await.map_err(network)?;
        let status = response.status();
        let bytes = response.bytes().await.map_err(network)?;
        debug!(method = %options.method, %url, status = status.as_u16(), "backend request settled");

        if !status.is_success() {
            let message = serde_json::from_slice::<ApiError>(&bytes)
                .ok()
                .and_then(|body| body.text().map(str::to_string))
                .unwrap_or_else(|| GENERIC_REQUEST_FAILURE.to_string());
            return Err(TransportError::Status { status, message });
        }

        serde_json::from_slice(&bytes).map_err(|err| TransportError::MalformedResponse {
            url: url.to_string(),
            reason: err.to_string(),
        })
    }

    fn url_for(&self, path: &ApiPath) -> Result<Url, TransportError> {
        path.join_onto(&self.base)
    }
}

/// Decodes a transport payload into a typed shape.
pub fn decode<T: DeserializeOwned>(path: &ApiPath, value: Value) -> Result<T, TransportError> {
    serde_json::from_value(value).map_err(|err| TransportError::MalformedResponse {
        url: path.to_string(),
        reason: err.to_string(),
    })
}
