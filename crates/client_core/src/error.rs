use reqwest::StatusCode;
use shared::domain::CommandAction;
use thiserror::Error;

/// Message used when a non-2xx response carries no readable error text.
pub const GENERIC_REQUEST_FAILURE: &str = "request failed";

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to reach backend at {url}: {source}")]
    Network {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    /// Non-2xx response. Displays only the server-supplied text so it can be
    /// shown to the operator verbatim.
    #[error("{message}")]
    Status { status: StatusCode, message: String },
    #[error("malformed response from {url}: {reason}")]
    MalformedResponse { url: String, reason: String },
    #[error("invalid request path {path:?}")]
    InvalidPath { path: String },
}

impl TransportError {
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_malformed(&self) -> bool {
        matches!(self, Self::MalformedResponse { .. })
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid api base {value:?}: {source}")]
    InvalidBase {
        value: String,
        #[source]
        source: url::ParseError,
    },
    #[error("api base must be an http(s) URL, got {0:?}")]
    UnsupportedScheme(String),
    #[error("production profile requires a dashboard origin or an explicit api base")]
    MissingOrigin,
    #[error("unknown deployment profile {0:?}")]
    UnknownProfile(String),
    #[error("sample limit must be between 1 and 50, got {0}")]
    SampleLimitOutOfRange(u32),
    #[error("refresh interval must be greater than zero")]
    ZeroRefreshInterval,
    #[error("failed to build http client: {0}")]
    HttpClient(#[source] reqwest::Error),
}

/// An action the operator asked for that the current state does not allow.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PreconditionViolation {
    #[error("unknown machine {0}")]
    UnknownMachine(String),
    #[error("{machine} already has a command in flight")]
    Busy { machine: String },
    #[error("{machine} is already running")]
    AlreadyRunning { machine: String },
    #[error("{machine} is not running")]
    NotRunning { machine: String },
}

impl PreconditionViolation {
    pub fn action_blocked(machine: &str, action: CommandAction) -> Self {
        match action {
            CommandAction::Start => Self::AlreadyRunning {
                machine: machine.to_string(),
            },
            CommandAction::Stop => Self::NotRunning {
                machine: machine.to_string(),
            },
        }
    }
}
