use std::{fmt, str::FromStr};

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One instrument listener as reported by the backend registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Machine {
    pub name: String,
    #[serde(default)]
    pub protocol: String,
    #[serde(default)]
    pub port_display: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol_type: Option<String>,
}

impl Machine {
    pub fn new(
        name: impl Into<String>,
        protocol: impl Into<String>,
        port_display: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            protocol: protocol.into(),
            port_display: port_display.into(),
            protocol_type: None,
        }
    }
}

/// Last known run state of a machine.
///
/// The backend sends plain strings; anything other than `Running` and `Stopped`
/// (for example `Starting`) is carried through verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum MachineStatus {
    Running,
    #[default]
    Stopped,
    Other(String),
}

impl MachineStatus {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Running => "Running",
            Self::Stopped => "Stopped",
            Self::Other(value) => value,
        }
    }

    pub fn is_running(&self) -> bool {
        matches!(self, Self::Running)
    }
}

impl From<String> for MachineStatus {
    fn from(value: String) -> Self {
        match value.as_str() {
            "Running" => Self::Running,
            "Stopped" => Self::Stopped,
            _ => Self::Other(value),
        }
    }
}

impl From<&str> for MachineStatus {
    fn from(value: &str) -> Self {
        Self::from(value.to_string())
    }
}

impl From<MachineStatus> for String {
    fn from(value: MachineStatus) -> Self {
        match value {
            MachineStatus::Other(value) => value,
            other => other.as_str().to_string(),
        }
    }
}

impl fmt::Display for MachineStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single ingested sample, newest-first within its machine's list.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SampleRecord {
    #[serde(default)]
    pub sample_id: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
}

impl SampleRecord {
    pub fn new(sample_id: impl Into<String>, updated_at: impl Into<String>) -> Self {
        Self {
            sample_id: Some(sample_id.into()),
            updated_at: Some(updated_at.into()),
        }
    }

    /// Parses `updated_at`. Timestamps without an offset are taken as UTC.
    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        let raw = self.updated_at.as_deref()?.trim();
        if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
            return Some(parsed.with_timezone(&Utc));
        }
        ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
            .iter()
            .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
            .map(|naive| naive.and_utc())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandAction {
    Start,
    Stop,
}

impl CommandAction {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Stop => "stop",
        }
    }
}

impl fmt::Display for CommandAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
#[error("unknown command action: {0}")]
pub struct UnknownAction(pub String);

impl FromStr for CommandAction {
    type Err = UnknownAction;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "start" => Ok(Self::Start),
            "stop" => Ok(Self::Stop),
            other => Err(UnknownAction(other.to_string())),
        }
    }
}
