use std::time::Duration;

use mock_backend::{Endpoint, MockBackend};
use reqwest::StatusCode;
use shared::domain::{Machine, MachineStatus, SampleRecord};
use url::Url;

use super::*;

async fn wait_for_requests(backend: &MockBackend, endpoint: Endpoint, count: usize) {
    for _ in 0..200 {
        if backend.request_count(endpoint).await >= count {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for {count} {endpoint:?} requests");
}

async fn pcr1_backend() -> MockBackend {
    MockBackend::with_machines(vec![Machine::new("PCR1", "TCP", "5000")]).await
}

async fn config_for(backend: &MockBackend) -> ClientConfig {
    std::env::set_var("NO_PROXY", "127.0.0.1,localhost");
    let (base, _) = mock_backend::spawn(backend.clone())
        .await
        .expect("spawn backend");
    ClientConfig::new(Url::parse(&base).expect("base url"))
}

async fn bootstrapped_session(backend: &MockBackend) -> DashboardSession {
    let session = DashboardSession::new(config_for(backend).await).expect("session");
    session.reload().await;
    session
}

#[tokio::test]
async fn empty_status_map_reads_as_stopped() {
    let backend = pcr1_backend().await;
    backend
        .respond_with(Endpoint::Statuses, StatusCode::OK, "{}")
        .await;

    let session = bootstrapped_session(&backend).await;
    let view = session.view();

    assert!(!view.loading);
    assert_eq!(view.error, None);
    let row = view.machine("PCR1").expect("PCR1 row");
    assert_eq!(row.protocol, "TCP");
    assert_eq!(row.port_display, "5000");
    assert_eq!(row.status, MachineStatus::Stopped);
    assert!(row.can_start());
    assert!(!row.can_stop());
}

#[tokio::test]
async fn failed_start_surfaces_server_detail_and_releases_lock() {
    let backend = pcr1_backend().await;
    let session = bootstrapped_session(&backend).await;
    backend
        .respond_with(
            Endpoint::Command,
            StatusCode::INTERNAL_SERVER_ERROR,
            r#"{"detail":"port busy"}"#,
        )
        .await;
    let statuses_before = backend.request_count(Endpoint::Statuses).await;

    let outcome = session.dispatcher().start("PCR1").await;

    assert_eq!(
        outcome,
        DispatchOutcome::Failed {
            message: "port busy".into()
        }
    );
    let store = session.store();
    assert_eq!(store.error().as_deref(), Some("port busy"));
    assert_eq!(store.status_of("PCR1"), MachineStatus::Stopped);
    assert!(!store.is_busy("PCR1"));
    // No reconciliation fetch after a failed command.
    assert_eq!(backend.request_count(Endpoint::Statuses).await, statuses_before);
}

#[tokio::test]
async fn non_json_error_body_uses_generic_message() {
    let backend = pcr1_backend().await;
    let session = bootstrapped_session(&backend).await;
    backend
        .respond_with(Endpoint::Command, StatusCode::BAD_GATEWAY, "<html>oops</html>")
        .await;

    let outcome = session.dispatcher().start("PCR1").await;

    assert_eq!(
        outcome,
        DispatchOutcome::Failed {
            message: error::GENERIC_REQUEST_FAILURE.into()
        }
    );
}

#[tokio::test]
async fn optimistic_status_is_replaced_by_reconciliation() {
    let backend = pcr1_backend().await;
    let session = bootstrapped_session(&backend).await;
    // The backend acknowledges Running but its status endpoint still says Stopped.
    backend
        .respond_with(Endpoint::Command, StatusCode::OK, r#"{"state":"Running"}"#)
        .await;
    let gate = backend.hold_next(Endpoint::Statuses).await;
    let statuses_before = backend.request_count(Endpoint::Statuses).await;

    let dispatcher = session.dispatcher().clone();
    let task = tokio::spawn(async move { dispatcher.start("PCR1").await });

    wait_for_requests(&backend, Endpoint::Statuses, statuses_before + 1).await;
    let store = session.store();
    assert_eq!(store.status_of("PCR1"), MachineStatus::Running);
    assert!(store.is_busy("PCR1"));

    gate.notify_one();
    let outcome = task.await.expect("dispatch task");

    assert_eq!(
        outcome,
        DispatchOutcome::Completed {
            echoed: Some(MachineStatus::Running)
        }
    );
    assert_eq!(store.status_of("PCR1"), MachineStatus::Stopped);
    assert!(!store.is_busy("PCR1"));
}

#[tokio::test]
async fn successful_start_reconciles_to_backend_state() {
    let backend = pcr1_backend().await;
    backend
        .set_start_state(MachineStatus::from("Starting"))
        .await;
    let session = bootstrapped_session(&backend).await;

    let outcome = session.start_machine("PCR1").await.expect("gate");

    assert_eq!(
        outcome,
        DispatchOutcome::Completed {
            echoed: Some(MachineStatus::from("Starting"))
        }
    );
    let row = session.view().machine("PCR1").cloned().expect("row");
    assert_eq!(row.status.as_str(), "Starting");
    assert!(!row.running);
    assert!(!row.busy);
}

#[tokio::test]
async fn second_dispatch_while_pending_sends_nothing() {
    let backend = pcr1_backend().await;
    let session = bootstrapped_session(&backend).await;
    let gate = backend.hold_next(Endpoint::Command).await;

    let dispatcher = session.dispatcher().clone();
    let first = tokio::spawn(async move { dispatcher.start("PCR1").await });
    wait_for_requests(&backend, Endpoint::Command, 1).await;

    let second = session.dispatcher().start("PCR1").await;
    assert_eq!(second, DispatchOutcome::Rejected);
    let also_rejected = session.dispatcher().stop("PCR1").await;
    assert_eq!(also_rejected, DispatchOutcome::Rejected);
    assert_eq!(backend.commands().await.len(), 1);
    assert!(session.store().is_busy("PCR1"));

    gate.notify_one();
    let first = first.await.expect("first dispatch");
    assert!(matches!(first, DispatchOutcome::Completed { .. }));
    assert!(!session.store().is_busy("PCR1"));

    let after = session.dispatcher().stop("PCR1").await;
    assert!(matches!(after, DispatchOutcome::Completed { .. }));
    assert_eq!(backend.commands().await.len(), 2);
}

#[tokio::test]
async fn locks_are_per_machine() {
    let backend = MockBackend::with_machines(vec![
        Machine::new("PCR1", "TCP", "5000"),
        Machine::new("PCR2", "TCP", "5001"),
    ])
    .await;
    let session = bootstrapped_session(&backend).await;
    let gate = backend.hold_next(Endpoint::Command).await;

    let dispatcher = session.dispatcher().clone();
    let first = tokio::spawn(async move { dispatcher.start("PCR1").await });
    wait_for_requests(&backend, Endpoint::Command, 1).await;

    let other = session.dispatcher().start("PCR2").await;
    assert!(matches!(other, DispatchOutcome::Completed { .. }));

    gate.notify_one();
    first.await.expect("first dispatch");
    assert_eq!(backend.commands().await.len(), 2);
}

#[tokio::test]
async fn status_failure_keeps_previous_statuses_but_updates_samples() {
    let backend = pcr1_backend().await;
    backend.set_status("PCR1", MachineStatus::Running).await;
    backend
        .push_sample("PCR1", SampleRecord::new("S1", "2024-01-01T00:00:00Z"))
        .await;
    let session = bootstrapped_session(&backend).await;

    backend
        .respond_with(
            Endpoint::Statuses,
            StatusCode::SERVICE_UNAVAILABLE,
            r#"{"detail":"db offline"}"#,
        )
        .await;
    backend.set_status("PCR1", MachineStatus::Stopped).await;
    backend
        .push_sample("PCR1", SampleRecord::new("S2", "2024-01-01T00:05:00Z"))
        .await;

    session.refresh_engine().live_refresh().await;

    let state = session.store().snapshot();
    assert_eq!(state.status_of("PCR1"), MachineStatus::Running);
    assert_eq!(
        state.recent_samples("PCR1")[0].sample_id.as_deref(),
        Some("S2")
    );
    assert_eq!(
        state.error.as_deref(),
        Some("Failed to load machine status: db offline")
    );
}

#[tokio::test]
async fn bootstrap_applies_resources_that_succeed() {
    let backend = pcr1_backend().await;
    backend.set_status("PCR1", MachineStatus::Running).await;
    backend
        .respond_with(Endpoint::Machines, StatusCode::SERVICE_UNAVAILABLE, "down")
        .await;

    let session = bootstrapped_session(&backend).await;

    let state = session.store().snapshot();
    assert!(state.machines.is_empty());
    assert_eq!(state.status_of("PCR1"), MachineStatus::Running);
    assert_eq!(
        state.error.as_deref(),
        Some("Failed to load machines: request failed")
    );
    assert!(!state.loading);
}

#[tokio::test]
async fn loading_flag_spans_bootstrap_only() {
    let backend = pcr1_backend().await;
    let session = DashboardSession::new(config_for(&backend).await).expect("session");
    let engine = session.refresh_engine().clone();
    let store = session.store().clone();

    let gate = backend.hold_next(Endpoint::Machines).await;
    let bootstrap = tokio::spawn({
        let engine = engine.clone();
        async move { engine.bootstrap().await }
    });
    // All three fetches go out before the held listing settles.
    wait_for_requests(&backend, Endpoint::Machines, 1).await;
    wait_for_requests(&backend, Endpoint::Statuses, 1).await;
    wait_for_requests(&backend, Endpoint::Samples, 1).await;
    assert!(store.is_loading());

    gate.notify_one();
    bootstrap.await.expect("bootstrap");
    assert!(!store.is_loading());

    let gate = backend.hold_next(Endpoint::Statuses).await;
    let live = tokio::spawn(async move { engine.live_refresh().await });
    wait_for_requests(&backend, Endpoint::Statuses, 2).await;
    assert!(!store.is_loading());

    gate.notify_one();
    live.await.expect("live refresh");
    assert!(!store.is_loading());
    assert_eq!(backend.request_count(Endpoint::Machines).await, 1);
}

#[tokio::test]
async fn malformed_listing_is_reported_not_applied() {
    let backend = pcr1_backend().await;
    let session = bootstrapped_session(&backend).await;
    backend
        .respond_with(Endpoint::Samples, StatusCode::OK, "not json")
        .await;

    session.refresh_engine().live_refresh().await;

    let error = session.store().error().expect("error recorded");
    assert!(error.starts_with("Failed to load recent samples: malformed response"));
}

#[tokio::test]
async fn bootstrap_and_dispatch_clear_previous_error_but_live_refresh_does_not() {
    let backend = pcr1_backend().await;
    let session = bootstrapped_session(&backend).await;
    let store = session.store();

    store.set_error(Some("stale".into()));
    session.refresh_engine().live_refresh().await;
    assert_eq!(store.error().as_deref(), Some("stale"));

    session.reload().await;
    assert_eq!(store.error(), None);

    store.set_error(Some("stale".into()));
    let outcome = session.dispatcher().start("PCR1").await;
    assert!(matches!(outcome, DispatchOutcome::Completed { .. }));
    assert_eq!(store.error(), None);
}

#[tokio::test]
async fn malformed_command_acknowledgement_still_succeeds() {
    let backend = pcr1_backend().await;
    let session = bootstrapped_session(&backend).await;
    backend
        .respond_with(Endpoint::Command, StatusCode::OK, "started")
        .await;
    let statuses_before = backend.request_count(Endpoint::Statuses).await;

    let outcome = session.dispatcher().start("PCR1").await;

    assert_eq!(outcome, DispatchOutcome::Completed { echoed: None });
    assert_eq!(session.store().error(), None);
    assert_eq!(
        backend.request_count(Endpoint::Statuses).await,
        statuses_before + 1
    );
}

#[tokio::test]
async fn newest_sample_is_projected_with_local_time() {
    let backend = pcr1_backend().await;
    backend
        .push_sample("PCR1", SampleRecord::new("S1", "2024-01-01T00:00:00Z"))
        .await;

    let session = bootstrapped_session(&backend).await;

    let view = session.view();
    let sample = view
        .machine("PCR1")
        .and_then(|row| row.newest_sample.clone())
        .expect("newest sample");
    assert_eq!(sample.sample_id.as_deref(), Some("S1"));
    let local = sample.updated_at.expect("parsed time");
    assert_eq!(local.naive_utc().to_string(), "2024-01-01 00:00:00");
}

#[tokio::test]
async fn sample_lists_are_bounded_by_configured_limit() {
    let backend = pcr1_backend().await;
    backend
        .respond_with(
            Endpoint::Samples,
            StatusCode::OK,
            r#"{"PCR1":[{"sample_id":"S3","updated_at":null},
                        {"sample_id":"S2","updated_at":null},
                        {"sample_id":"S1","updated_at":null}]}"#,
        )
        .await;
    let config = config_for(&backend)
        .await
        .with_sample_limit(2)
        .expect("limit");
    let session = DashboardSession::new(config).expect("session");

    session.reload().await;

    let state = session.store().snapshot();
    let ids: Vec<_> = state
        .recent_samples("PCR1")
        .iter()
        .filter_map(|record| record.sample_id.clone())
        .collect();
    assert_eq!(ids, vec!["S3", "S2"]);
}

#[tokio::test]
async fn machine_registry_accepts_mapping_payload() {
    let backend = MockBackend::with_machines(vec![
        Machine::new("PCR2", "TCP", "5001"),
        Machine::new("PCR1", "TCP", "5000"),
    ])
    .await;
    backend.list_machines_as_map(true).await;

    let session = bootstrapped_session(&backend).await;

    let names: Vec<_> = session
        .view()
        .machines
        .into_iter()
        .map(|row| row.name)
        .collect();
    assert_eq!(names, vec!["PCR1", "PCR2"]);
}

#[tokio::test]
async fn later_resolving_refresh_wins_even_if_older() {
    let backend = pcr1_backend().await;
    let session = bootstrapped_session(&backend).await;
    let engine = session.refresh_engine().clone();

    let gate = backend.hold_next(Endpoint::Statuses).await;
    let before = backend.request_count(Endpoint::Statuses).await;
    let stale = tokio::spawn({
        let engine = engine.clone();
        async move { engine.live_refresh().await }
    });
    wait_for_requests(&backend, Endpoint::Statuses, before + 1).await;

    backend.set_status("PCR1", MachineStatus::Running).await;
    engine.live_refresh().await;
    assert_eq!(session.store().status_of("PCR1"), MachineStatus::Running);

    gate.notify_one();
    stale.await.expect("stale refresh");
    assert_eq!(session.store().status_of("PCR1"), MachineStatus::Stopped);
}

#[tokio::test]
async fn unreachable_backend_reports_every_resource_and_settles() {
    std::env::set_var("NO_PROXY", "127.0.0.1,localhost");
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind");
    let addr = listener.local_addr().expect("addr");
    drop(listener);
    let config = ClientConfig::new(Url::parse(&format!("http://{addr}")).expect("url"))
        .with_request_timeout(Duration::from_secs(2));
    let session = DashboardSession::new(config).expect("session");

    session.reload().await;

    let view = session.view();
    assert!(!view.loading);
    assert!(view.machines.is_empty());
    let error = view.error.expect("error");
    assert!(error.starts_with("Failed to load "), "{error}");
    assert!(error.contains("failed to reach backend"), "{error}");
}

#[tokio::test]
async fn live_timer_refreshes_statuses_only_and_stops_on_teardown() {
    let backend = pcr1_backend().await;
    let config = config_for(&backend)
        .await
        .with_refresh_interval(Duration::from_millis(40))
        .expect("interval");
    let mut session = DashboardSession::new(config).expect("session");

    session.start().await;
    assert!(session.is_live());
    session.start().await;
    assert_eq!(backend.request_count(Endpoint::Machines).await, 1);

    backend.set_status("PCR1", MachineStatus::Running).await;
    let store = session.store().clone();
    for _ in 0..200 {
        if store.status_of("PCR1") == MachineStatus::Running {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(store.status_of("PCR1"), MachineStatus::Running);
    assert_eq!(backend.request_count(Endpoint::Machines).await, 1);

    session.teardown();
    tokio::time::sleep(Duration::from_millis(100)).await;
    let settled = backend.request_count(Endpoint::Statuses).await;
    tokio::time::sleep(Duration::from_millis(250)).await;
    assert_eq!(backend.request_count(Endpoint::Statuses).await, settled);
}

#[tokio::test]
async fn slow_live_refresh_does_not_hold_back_the_next_tick() {
    let backend = pcr1_backend().await;
    let config = config_for(&backend)
        .await
        .with_refresh_interval(Duration::from_millis(40))
        .expect("interval");
    let mut session = DashboardSession::new(config).expect("session");
    session.start().await;
    let after_bootstrap = backend.request_count(Endpoint::Statuses).await;

    let gate = backend.hold_next(Endpoint::Statuses).await;
    wait_for_requests(&backend, Endpoint::Statuses, after_bootstrap + 3).await;

    gate.notify_one();
    session.teardown();
}

#[tokio::test]
async fn gated_requests_never_reach_the_backend() {
    let backend = pcr1_backend().await;
    let session = bootstrapped_session(&backend).await;

    let refused = session.stop_machine("PCR1").await;
    assert_eq!(
        refused,
        Err(PreconditionViolation::NotRunning {
            machine: "PCR1".into()
        })
    );
    let unknown = session.start_machine("Ghost").await;
    assert!(matches!(unknown, Err(PreconditionViolation::UnknownMachine(_))));
    assert!(backend.commands().await.is_empty());

    session.start_machine("PCR1").await.expect("start allowed");
    let refused = session.start_machine("PCR1").await;
    assert_eq!(
        refused,
        Err(PreconditionViolation::AlreadyRunning {
            machine: "PCR1".into()
        })
    );
    assert_eq!(backend.commands().await.len(), 1);
}

#[tokio::test]
async fn log_url_is_built_without_fetching() {
    let backend = MockBackend::with_machines(vec![Machine::new("Cobas 6000", "AUTO-Serial", "COM3")])
        .await;
    let session = DashboardSession::new(config_for(&backend).await).expect("session");

    let url = session.log_url("Cobas 6000").expect("log url");

    assert!(url.as_str().ends_with("/logs/Cobas_6000.log"));
    assert_eq!(backend.request_count(Endpoint::Logs).await, 0);
}
