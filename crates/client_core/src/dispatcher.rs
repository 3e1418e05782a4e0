use std::sync::Arc;

use shared::{
    domain::{CommandAction, MachineStatus},
    protocol::CommandAck,
};
use tracing::{debug, info, warn};

use crate::{
    error::TransportError,
    refresh::RefreshEngine,
    store::StateStore,
    transport::{decode, ApiPath, RequestOptions, Transport},
};

/// Which path a dispatch took. Informational only: every effect of a
/// dispatch lands in the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// The machine's action lock was already held; nothing was sent.
    Rejected,
    /// The backend accepted the command. `echoed` is the state it reported.
    Completed { echoed: Option<MachineStatus> },
    Failed { message: String },
}

/// Sends start/stop commands, one in flight per machine.
#[derive(Clone)]
pub struct CommandDispatcher {
    transport: Arc<dyn Transport>,
    store: Arc<StateStore>,
    refresh: RefreshEngine,
}

impl CommandDispatcher {
    pub fn new(
        transport: Arc<dyn Transport>,
        store: Arc<StateStore>,
        refresh: RefreshEngine,
    ) -> Self {
        Self {
            transport,
            store,
            refresh,
        }
    }

    /// Does not check the machine's current status; callers gate that.
    pub async fn dispatch(&self, machine: &str, action: CommandAction) -> DispatchOutcome {
        let Some(_lock) = self.store.try_acquire_action(machine) else {
            debug!(machine, %action, "dispatch rejected: command already in flight");
            return DispatchOutcome::Rejected;
        };
        self.store.set_error(None);

        match self.send(machine, action).await {
            Ok(ack) => {
                if let Some(state) = ack.state.clone() {
                    self.store.set_status(machine, state);
                }
                info!(machine, %action, state = ?ack.state, "command accepted");
                self.refresh.live_refresh().await;
                DispatchOutcome::Completed { echoed: ack.state }
            }
            Err(err) => {
                let message = err.to_string();
                warn!(machine, %action, error = %message, "command failed");
                self.store.set_error(Some(message.clone()));
                DispatchOutcome::Failed { message }
            }
        }
        // `_lock` drops here on every path and clears the busy flag.
    }

    pub async fn start(&self, machine: &str) -> DispatchOutcome {
        self.dispatch(machine, CommandAction::Start).await
    }

    pub async fn stop(&self, machine: &str) -> DispatchOutcome {
        self.dispatch(machine, CommandAction::Stop).await
    }

    async fn send(&self, machine: &str, action: CommandAction) -> Result<CommandAck, TransportError> {
        let path = ApiPath::command(machine, action);
        let acknowledged = self
            .transport
            .request(&path, RequestOptions::post())
            .await
            .and_then(|value| decode::<CommandAck>(&path, value));
        match acknowledged {
            Ok(ack) => Ok(ack),
            // The command ran; only its acknowledgement is unreadable.
            Err(err) if err.is_malformed() => {
                debug!(machine, %action, error = %err, "ignoring malformed command acknowledgement");
                Ok(CommandAck::default())
            }
            Err(err) => Err(err),
        }
    }
}
