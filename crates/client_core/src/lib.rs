//! Client-side state reconciliation and command dispatch for the lab
//! machine dashboard.
//!
//! Data flows one way into the [`StateStore`] (transport → refresh engine or
//! dispatcher → store) and one way out (store → [`presentation`]).

pub mod config;
pub mod dispatcher;
pub mod error;
pub mod presentation;
pub mod refresh;
pub mod session;
pub mod store;
pub mod transport;

pub use config::{ApiBaseSource, ClientConfig, DeploymentProfile};
pub use dispatcher::{CommandDispatcher, DispatchOutcome};
pub use error::{ConfigError, PreconditionViolation, TransportError};
pub use presentation::{DashboardView, MachineView, SampleView};
pub use refresh::{LiveRefreshTask, RefreshEngine, Resource};
pub use session::DashboardSession;
pub use store::{ActionGuard, DashboardState, StateStore, StoreChange};
pub use transport::{ApiPath, HttpTransport, RequestOptions, Transport};

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
