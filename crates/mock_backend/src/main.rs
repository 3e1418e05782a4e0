use std::{net::SocketAddr, time::Duration};

use chrono::Utc;
use mock_backend::{build_router, config::load_settings, MockBackend};
use shared::domain::{Machine, MachineStatus, SampleRecord};
use tracing::info;
use tracing_subscriber::EnvFilter;

fn seed_machines() -> Vec<Machine> {
    vec![
        Machine {
            protocol_type: Some("TCP/IP".into()),
            ..Machine::new("PCR1", "AUTO-TCP", "IP: 10.0.0.21 Port: 5000")
        },
        Machine {
            protocol_type: Some("Serial".into()),
            ..Machine::new("Cobas 6000", "AUTO-Serial", "COM: COM3 @ 9600,N,8,1")
        },
        Machine {
            protocol_type: Some("TCP/IP".into()),
            ..Machine::new("Sysmex XN", "AUTO-TCP", "Port: 6001")
        },
    ]
}

/// Appends a synthetic sample to every running machine on a fixed cadence.
async fn ingest_samples(backend: MockBackend, every: Duration) {
    let mut ticker = tokio::time::interval(every);
    let mut counter: u64 = 0;
    loop {
        ticker.tick().await;
        for machine in seed_machines() {
            if backend.status_of(&machine.name).await != MachineStatus::Running {
                continue;
            }
            counter += 1;
            let sample_id = format!("S{counter:05}");
            backend
                .push_sample(
                    &machine.name,
                    SampleRecord::new(sample_id.clone(), Utc::now().to_rfc3339()),
                )
                .await;
            info!(machine = %machine.name, %sample_id, "ingested synthetic sample");
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let settings = load_settings();
    let backend = MockBackend::with_machines(seed_machines()).await;

    if settings.sample_every_secs > 0 {
        tokio::spawn(ingest_samples(
            backend.clone(),
            Duration::from_secs(settings.sample_every_secs),
        ));
    }

    let addr: SocketAddr = settings.bind_addr.parse()?;
    info!(%addr, "mock backend listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, build_router(backend)).await?;
    Ok(())
}
