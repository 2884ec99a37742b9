use super::actor::{Command, Outputs, SessionActor};
use super::config::{DisconnectOptions, SessionConfig, SessionParameters};
use super::negotiator::SessionNegotiator;
use super::state::SessionState;
use crate::diagnostics::{DiagnosticEvent, Diagnostics};
use crate::error::SessionError;
use crate::observable::{Observable, Subscription};
use crate::transcript::TranscriptEntry;
use tokio::sync::{mpsc, oneshot};
use tracing::info;

/// Handle to a running session.
///
/// Cheap to clone. The session task stops and releases its transport once
/// the last handle is dropped.
#[derive(Clone)]
pub struct SessionManager {
    commands: mpsc::UnboundedSender<Command>,
    outputs: Outputs,
}

impl SessionManager {
    /// Start a session task; must be called inside a tokio runtime
    pub fn spawn(mut negotiator: SessionNegotiator, config: SessionConfig) -> Self {
        negotiator.configure(&config);

        let diagnostics = Diagnostics::new(config.diagnostics_capacity);
        diagnostics.set_enabled(config.diagnostics_enabled);
        let outputs = Outputs {
            state: Observable::new(SessionState::Idle),
            transcript: Observable::new(Vec::new()),
            diagnostics,
        };

        let (commands, commands_rx) = mpsc::unbounded_channel();
        SessionActor::spawn(negotiator, &config, outputs.clone(), commands_rx);
        info!(
            "Session manager started (backoff: {} steps, channel timeout: {}ms)",
            config.backoff.len(),
            config.channel_open_timeout.as_millis()
        );

        Self { commands, outputs }
    }

    /// Establish a new session, superseding any attempt or session in flight.
    ///
    /// Resolves once the control channel is open and instructions are sent,
    /// with `SessionError::Superseded` if a later connect or a disconnect
    /// overtakes it.
    pub async fn connect(&self, params: SessionParameters) -> Result<(), SessionError> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(Command::Connect { params, reply })
            .map_err(|_| SessionError::Closed)?;
        rx.await.map_err(|_| SessionError::Closed)?
    }

    /// Close everything and stop recovery; resolves once resources are released
    pub async fn disconnect(&self, options: DisconnectOptions) -> Result<(), SessionError> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(Command::Disconnect { options, reply })
            .map_err(|_| SessionError::Closed)?;
        rx.await.map_err(|_| SessionError::Closed)
    }

    pub fn state(&self) -> SessionState {
        self.outputs.state.get()
    }

    pub fn snapshot_transcript(&self) -> Vec<TranscriptEntry> {
        self.outputs.transcript.get()
    }

    pub fn subscribe_state(&self) -> Subscription<SessionState> {
        self.outputs.state.subscribe()
    }

    pub fn subscribe_transcript(&self) -> Subscription<Vec<TranscriptEntry>> {
        self.outputs.transcript.subscribe()
    }

    pub fn subscribe_diagnostics(&self) -> Subscription<Vec<DiagnosticEvent>> {
        self.outputs.diagnostics.subscribe()
    }

    pub fn set_diagnostics_enabled(&self, enabled: bool) {
        self.outputs.diagnostics.set_enabled(enabled);
    }

    pub fn clear_diagnostics(&self) {
        self.outputs.diagnostics.clear();
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        &self.outputs.diagnostics
    }
}
