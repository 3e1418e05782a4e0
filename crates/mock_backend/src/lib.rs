//! In-memory implementation of the machine backend HTTP contract.
//!
//! Used as the server side of client integration tests and as a local
//! development backend (`cargo run -p mock_backend`).

mod api;
mod app_state;
pub mod config;

use anyhow::Result;
use tokio::{net::TcpListener, task::JoinHandle};

pub use api::build_router;
pub use app_state::{CannedResponse, Endpoint, MockBackend};

/// Serves `backend` on an ephemeral local port and returns its base URL.
pub async fn spawn(backend: MockBackend) -> Result<(String, JoinHandle<()>)> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let app = build_router(backend);
    let handle = tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    Ok((format!("http://{addr}"), handle))
}

#[cfg(test)]
#[path = "tests/api_tests.rs"]
mod tests;
