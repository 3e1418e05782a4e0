//! Read-only projection of store state into per-machine rows, plus the
//! gating rules for operator actions.

use chrono::{DateTime, Local};
use shared::{
    domain::{CommandAction, MachineStatus, SampleRecord},
    protocol::log_file_name,
};
use url::Url;

use crate::{error::PreconditionViolation, store::DashboardState, transport::ApiPath};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampleView {
    pub sample_id: Option<String>,
    pub updated_at: Option<DateTime<Local>>,
    /// Timestamp as sent, kept for values that do not parse.
    pub raw_updated_at: Option<String>,
}

impl SampleView {
    pub fn from_record(record: &SampleRecord) -> Self {
        Self {
            sample_id: record.sample_id.clone(),
            updated_at: record.timestamp().map(|ts| ts.with_timezone(&Local)),
            raw_updated_at: record.updated_at.clone(),
        }
    }

    pub fn display_time(&self) -> String {
        match (&self.updated_at, &self.raw_updated_at) {
            (Some(ts), _) => ts.format("%Y-%m-%d %H:%M:%S").to_string(),
            (None, Some(raw)) => raw.clone(),
            (None, None) => "-".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MachineView {
    pub name: String,
    pub protocol: String,
    pub protocol_type: Option<String>,
    pub port_display: String,
    pub status: MachineStatus,
    pub running: bool,
    pub busy: bool,
    pub newest_sample: Option<SampleView>,
}

impl MachineView {
    pub fn can_start(&self) -> bool {
        !self.busy && !self.running
    }

    pub fn can_stop(&self) -> bool {
        !self.busy && self.running
    }

    pub fn allows(&self, action: CommandAction) -> bool {
        match action {
            CommandAction::Start => self.can_start(),
            CommandAction::Stop => self.can_stop(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DashboardView {
    pub machines: Vec<MachineView>,
    pub loading: bool,
    pub error: Option<String>,
}

impl DashboardView {
    pub fn machine(&self, name: &str) -> Option<&MachineView> {
        self.machines.iter().find(|machine| machine.name == name)
    }
}

/// Projects state in registry order. Sample times are shown in local time.
pub fn project(state: &DashboardState) -> DashboardView {
    DashboardView {
        machines: state
            .machines
            .iter()
            .map(|machine| {
                let status = state.status_of(&machine.name);
                MachineView {
                    name: machine.name.clone(),
                    protocol: machine.protocol.clone(),
                    protocol_type: machine.protocol_type.clone(),
                    port_display: machine.port_display.clone(),
                    running: status.is_running(),
                    status,
                    busy: state.is_busy(&machine.name),
                    newest_sample: state
                        .recent_samples(&machine.name)
                        .first()
                        .map(SampleView::from_record),
                }
            })
            .collect(),
        loading: state.loading,
        error: state.error.clone(),
    }
}

/// Refuses actions the dashboard would show as disabled.
pub fn gate_action(
    view: &DashboardView,
    machine: &str,
    action: CommandAction,
) -> Result<(), PreconditionViolation> {
    let row = view
        .machine(machine)
        .ok_or_else(|| PreconditionViolation::UnknownMachine(machine.to_string()))?;
    if row.busy {
        return Err(PreconditionViolation::Busy {
            machine: machine.to_string(),
        });
    }
    if !row.allows(action) {
        return Err(PreconditionViolation::action_blocked(machine, action));
    }
    Ok(())
}

/// Static log link for a machine. Building it performs no request.
pub fn log_url(base: &Url, machine: &str) -> Option<Url> {
    ApiPath::from_segments(["logs".to_string(), log_file_name(machine)])
        .join_onto(base)
        .ok()
}
