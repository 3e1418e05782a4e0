use std::{collections::BTreeMap, sync::Arc};

use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::Deserialize;
use shared::{
    domain::{CommandAction, MachineStatus},
    error::ApiError,
    protocol::{
        log_file_name, machine_samples_route, machine_status_route, machines_route, CommandAck,
        MachineListPayload, SampleMap, StatusMap, DEFAULT_SAMPLE_LIMIT, MAX_SAMPLE_LIMIT,
    },
};
use tokio::sync::Notify;
use tracing::info;

use crate::app_state::{BackendState, CannedResponse, Endpoint, MockBackend};

#[derive(Debug, Deserialize)]
struct SamplesParams {
    limit: Option<i64>,
}

pub fn build_router(backend: MockBackend) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route(machines_route(), get(list_machines))
        .route(machine_status_route(), get(machine_status))
        .route(machine_samples_route(), get(machine_samples))
        .route("/api/machines/:name/:action", post(machine_command))
        .route("/logs/:file", get(machine_log))
        .with_state(backend)
}

fn api_error(status: StatusCode, detail: impl Into<String>) -> Response {
    (status, Json(ApiError::detail(detail))).into_response()
}

fn canned_response(canned: CannedResponse) -> Response {
    (
        canned.status,
        [(header::CONTENT_TYPE, "application/json")],
        canned.body,
    )
        .into_response()
}

/// Counts the request and takes any override or hold registered for it.
async fn enter(
    backend: &MockBackend,
    endpoint: Endpoint,
) -> (Option<CannedResponse>, Option<Arc<Notify>>) {
    let mut guard = backend.inner.lock().await;
    *guard.requests.entry(endpoint).or_default() += 1;
    (
        guard.canned.get(&endpoint).cloned(),
        guard.holds.remove(&endpoint),
    )
}

/// Serves `response` once any hold on the request has been released.
async fn settle(
    backend: &MockBackend,
    endpoint: Endpoint,
    compute: impl FnOnce(&mut BackendState) -> Response,
) -> Response {
    let (canned, hold) = enter(backend, endpoint).await;
    let response = match canned {
        Some(canned) => canned_response(canned),
        None => compute(&mut *backend.inner.lock().await),
    };
    if let Some(gate) = hold {
        gate.notified().await;
    }
    response
}

async fn healthz() -> &'static str {
    "ok"
}

async fn list_machines(State(backend): State<MockBackend>) -> Response {
    settle(&backend, Endpoint::Machines, |state| {
        let payload = if state.list_as_map {
            MachineListPayload::Map(
                state
                    .machines
                    .iter()
                    .map(|machine| (machine.name.clone(), machine.clone()))
                    .collect::<BTreeMap<_, _>>(),
            )
        } else {
            MachineListPayload::List(state.machines.clone())
        };
        Json(payload).into_response()
    })
    .await
}

async fn machine_status(State(backend): State<MockBackend>) -> Response {
    settle(&backend, Endpoint::Statuses, |state| {
        let statuses: StatusMap = state
            .machines
            .iter()
            .map(|machine| (machine.name.clone(), state.status_of(&machine.name)))
            .collect();
        Json(statuses).into_response()
    })
    .await
}

async fn machine_samples(
    State(backend): State<MockBackend>,
    Query(params): Query<SamplesParams>,
) -> Response {
    let limit = params.limit.unwrap_or(i64::from(DEFAULT_SAMPLE_LIMIT));
    settle(&backend, Endpoint::Samples, |state| {
        if limit <= 0 {
            return api_error(StatusCode::BAD_REQUEST, "limit must be positive");
        }
        let limit = limit.min(i64::from(MAX_SAMPLE_LIMIT)) as usize;
        let samples: SampleMap = state
            .samples
            .iter()
            .map(|(name, records)| {
                (
                    name.clone(),
                    records.iter().take(limit).cloned().collect::<Vec<_>>(),
                )
            })
            .collect();
        Json(samples).into_response()
    })
    .await
}

async fn machine_command(
    State(backend): State<MockBackend>,
    Path((name, action)): Path<(String, String)>,
) -> Response {
    let Ok(action) = action.parse::<CommandAction>() else {
        return api_error(StatusCode::NOT_FOUND, "Not Found");
    };
    settle(&backend, Endpoint::Command, |state| {
        state.commands.push((name.clone(), action.to_string()));
        let response = match action {
            CommandAction::Start => start_machine(state, &name),
            CommandAction::Stop => stop_machine(state, &name),
        };
        info!(machine = %name, %action, status = response.status().as_u16(), "command handled");
        response
    })
    .await
}

fn start_machine(state: &mut BackendState, name: &str) -> Response {
    if !state.is_configured(name) {
        return api_error(StatusCode::BAD_REQUEST, format!("{name} not configured"));
    }
    let current = state.status_of(name);
    if current.is_running() {
        return Json(CommandAck {
            success: Some(true),
            state: Some(current),
            message: Some(format!("{name} already running")),
            detail: None,
        })
        .into_response();
    }
    let next = state.start_state.clone().unwrap_or(MachineStatus::Running);
    state.statuses.insert(name.to_string(), next.clone());
    state.append_log(name, format!("{} [INFO] listener started", Utc::now().to_rfc3339()));
    Json(CommandAck {
        success: Some(true),
        state: Some(next),
        message: Some(format!("{name} starting")),
        detail: None,
    })
    .into_response()
}

fn stop_machine(state: &mut BackendState, name: &str) -> Response {
    let current = state.status_of(name);
    if !state.is_configured(name) || matches!(current, MachineStatus::Stopped) {
        return api_error(StatusCode::BAD_REQUEST, format!("{name} not running"));
    }
    state.statuses.insert(name.to_string(), MachineStatus::Stopped);
    state.append_log(name, format!("{} [INFO] listener stopped", Utc::now().to_rfc3339()));
    Json(CommandAck {
        success: Some(true),
        state: Some(MachineStatus::Stopped),
        message: Some(format!("{name} stopped")),
        detail: None,
    })
    .into_response()
}

async fn machine_log(State(backend): State<MockBackend>, Path(file): Path<String>) -> Response {
    settle(&backend, Endpoint::Logs, |state| {
        let base = file.trim();
        let base = if base.to_ascii_lowercase().ends_with(".log") {
            &base[..base.len() - 4]
        } else {
            base
        };
        match state.logs.get(&log_file_name(base)) {
            Some(lines) => (
                [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
                lines.join("\n"),
            )
                .into_response(),
            None => api_error(StatusCode::NOT_FOUND, "Log not found"),
        }
    })
    .await
}
