use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use crate::domain::{CommandAction, Machine, MachineStatus, SampleRecord};

pub type StatusMap = HashMap<String, MachineStatus>;
pub type SampleMap = HashMap<String, Vec<SampleRecord>>;

pub const DEFAULT_SAMPLE_LIMIT: u32 = 3;
pub const MAX_SAMPLE_LIMIT: u32 = 50;

pub fn machines_route() -> &'static str {
    "/api/machines"
}

pub fn machine_status_route() -> &'static str {
    "/api/machine-status"
}

pub fn machine_samples_route() -> &'static str {
    "/api/machine-samples"
}

/// Path segments for a command endpoint; the caller encodes them.
pub fn machine_command_segments(name: &str, action: CommandAction) -> [&str; 4] {
    ["api", "machines", name, action.as_str()]
}

/// File name of a machine's log as served under `/logs/`.
///
/// Every whitespace character becomes its own underscore, matching the
/// names the backend writes log files under.
pub fn log_file_name(machine_name: &str) -> String {
    let safe: String = machine_name
        .chars()
        .map(|c| if c.is_whitespace() { '_' } else { c })
        .collect();
    format!("{safe}.log")
}

/// `GET /api/machines` answers either with a list or with a name-keyed map.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MachineListPayload {
    List(Vec<Machine>),
    Map(BTreeMap<String, Machine>),
}

impl MachineListPayload {
    pub fn into_machines(self) -> Vec<Machine> {
        match self {
            Self::List(machines) => machines,
            Self::Map(machines) => machines.into_values().collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SamplesQuery {
    pub limit: u32,
}

/// Acknowledgement body for start/stop commands. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandAck {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub success: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<MachineStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}
