//! Session actor
//!
//! A single task owns every piece of mutable session state. Caller commands,
//! negotiation results, backoff timers and transport events are all funneled
//! into it over channels and handled one at a time, so each mutation and its
//! publication complete before the next input is looked at.
//!
//! Every connection attempt gets a fresh attempt id. Results and events that
//! carry a stale id belong to a superseded attempt and are discarded, with
//! any connection they hand over closed on arrival.

use super::config::{DisconnectOptions, SessionConfig, SessionParameters};
use super::monitor::ConnectionMonitor;
use super::negotiator::{Connection, SessionNegotiator};
use super::recovery::{
    RecoveryController, RecoveryStep, CONNECTION_LOST_NOTICE, GAVE_UP_NOTICE, RECONNECTED_NOTICE,
};
use super::reducer::{ConversationReducer, Effect};
use super::state::SessionState;
use crate::diagnostics::Diagnostics;
use crate::error::SessionError;
use crate::observable::Observable;
use crate::protocol::{self, ClientEvent, ServerEvent};
use crate::transcript::{Transcript, TranscriptEntry};
use crate::transport::{ConnectivitySignal, TransportEvent};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::error::SendError;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Requests from the public handle
pub(crate) enum Command {
    Connect {
        params: SessionParameters,
        reply: oneshot::Sender<Result<(), SessionError>>,
    },
    Disconnect {
        options: DisconnectOptions,
        reply: oneshot::Sender<()>,
    },
}

/// Results of work the actor spawned
enum Internal {
    Negotiated {
        attempt: u64,
        result: Result<Connection, SessionError>,
    },
    BackoffElapsed {
        attempt: u64,
    },
    Transport {
        attempt: u64,
        event: TransportEvent,
    },
}

/// The attempt currently in flight, and who is waiting for it
enum Pending {
    Caller {
        attempt: u64,
        reply: oneshot::Sender<Result<(), SessionError>>,
    },
    Recovery {
        attempt: u64,
    },
}

impl Pending {
    fn attempt(&self) -> u64 {
        match self {
            Pending::Caller { attempt, .. } | Pending::Recovery { attempt } => *attempt,
        }
    }
}

struct Active {
    attempt: u64,
    connection: Connection,
    forwarder: JoinHandle<()>,
}

/// Published outputs, shared with the handle
#[derive(Clone)]
pub(crate) struct Outputs {
    pub state: Observable<SessionState>,
    pub transcript: Observable<Vec<TranscriptEntry>>,
    pub diagnostics: Diagnostics,
}

pub(crate) struct SessionActor {
    negotiator: Arc<SessionNegotiator>,
    outputs: Outputs,
    transcript: Transcript,
    reducer: ConversationReducer,
    monitor: ConnectionMonitor,
    recovery: RecoveryController,
    attempt: u64,
    pending: Option<Pending>,
    active: Option<Active>,
    last_params: Option<SessionParameters>,
    internal_tx: mpsc::UnboundedSender<Internal>,
}

impl SessionActor {
    pub(crate) fn spawn(
        negotiator: SessionNegotiator,
        config: &SessionConfig,
        outputs: Outputs,
        commands: mpsc::UnboundedReceiver<Command>,
    ) {
        let (internal_tx, internal_rx) = mpsc::unbounded_channel();
        let actor = Self {
            negotiator: Arc::new(negotiator),
            outputs,
            transcript: Transcript::new(),
            reducer: ConversationReducer::new(),
            monitor: ConnectionMonitor::new(),
            recovery: RecoveryController::new(config.backoff.clone()),
            attempt: 0,
            pending: None,
            active: None,
            last_params: None,
            internal_tx,
        };
        tokio::spawn(actor.run(commands, internal_rx));
    }

    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<Command>,
        mut internal: mpsc::UnboundedReceiver<Internal>,
    ) {
        debug!("Session actor started");

        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(command) => self.handle_command(command),
                    None => break,
                },
                Some(event) = internal.recv() => self.handle_internal(event),
            }
        }

        // Every handle is gone
        self.supersede();
        self.teardown();
        debug!("Session actor stopped");
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Connect { params, reply } => self.connect(params, reply),
            Command::Disconnect { options, reply } => {
                self.disconnect(options);
                let _ = reply.send(());
            }
        }
    }

    fn handle_internal(&mut self, event: Internal) {
        match event {
            Internal::Negotiated { attempt, result } => self.on_negotiated(attempt, result),
            Internal::BackoffElapsed { attempt } => self.on_backoff_elapsed(attempt),
            Internal::Transport { attempt, event } => {
                if !matches!(&self.active, Some(active) if active.attempt == attempt) {
                    debug!("Ignoring transport event from stale attempt {}", attempt);
                    return;
                }
                self.on_transport(event);
            }
        }
    }

    // Caller operations

    fn connect(
        &mut self,
        params: SessionParameters,
        reply: oneshot::Sender<Result<(), SessionError>>,
    ) {
        self.supersede();
        self.teardown();

        let attempt = self.attempt;
        info!("Connecting session (attempt {})", attempt);
        self.last_params = Some(params.clone());
        self.set_state(SessionState::Connecting);
        self.pending = Some(Pending::Caller { attempt, reply });
        self.spawn_negotiation(attempt, params);
    }

    fn disconnect(&mut self, options: DisconnectOptions) {
        self.supersede();
        self.teardown();

        if options.clear_transcript {
            self.transcript.clear();
            self.publish_transcript();
            self.set_state(SessionState::Idle);
        } else {
            self.set_state(SessionState::Disconnected);
        }
        self.outputs.diagnostics.record(
            "client.disconnect",
            format!("clearTranscript={}", options.clear_transcript),
        );
        info!("Session disconnected");
    }

    /// Invalidate the attempt in flight and cancel any recovery episode
    fn supersede(&mut self) {
        self.attempt += 1;
        match self.pending.take() {
            Some(Pending::Caller { reply, .. }) => {
                let _ = reply.send(Err(SessionError::Superseded));
            }
            Some(Pending::Recovery { attempt }) => {
                self.outputs
                    .diagnostics
                    .record("recovery.cancelled", format!("attempt={}", attempt));
            }
            None => {}
        }
        self.recovery.cancel();
    }

    /// Close the live transport, if any, and forget its conversation state
    fn teardown(&mut self) {
        if let Some(mut active) = self.active.take() {
            active.forwarder.abort();
            active.connection.close();
            self.outputs
                .diagnostics
                .record("transport.closed", format!("attempt={}", active.attempt));
        }
        self.reducer.reset();
        self.monitor.reset();
    }

    // Negotiation

    fn spawn_negotiation(&self, attempt: u64, params: SessionParameters) {
        let negotiator = Arc::clone(&self.negotiator);
        let diagnostics = self.outputs.diagnostics.clone();
        let tx = self.internal_tx.clone();

        tokio::spawn(async move {
            let result = negotiator.negotiate(&params, &diagnostics).await;
            if let Err(SendError(Internal::Negotiated {
                result: Ok(mut connection),
                ..
            })) = tx.send(Internal::Negotiated { attempt, result })
            {
                // Actor is gone; nobody will own this connection
                connection.close();
            }
        });
    }

    fn on_negotiated(&mut self, attempt: u64, result: Result<Connection, SessionError>) {
        let current = attempt == self.attempt
            && matches!(&self.pending, Some(pending) if pending.attempt() == attempt);
        if !current {
            if let Ok(mut connection) = result {
                connection.close();
            }
            self.outputs
                .diagnostics
                .record("attempt.stale", format!("attempt={}", attempt));
            return;
        }
        let Some(pending) = self.pending.take() else {
            return;
        };

        match (pending, result) {
            (Pending::Caller { reply, .. }, Ok(connection)) => {
                self.install(attempt, connection);
                self.set_state(SessionState::Listening);
                info!("Session connected");
                let _ = reply.send(Ok(()));
            }
            (Pending::Caller { reply, .. }, Err(err)) => {
                error!("Session connect failed: {}", err);
                self.set_state(SessionState::Error);
                let _ = reply.send(Err(err));
            }
            (Pending::Recovery { .. }, Ok(connection)) => {
                self.install(attempt, connection);
                self.recovery.succeeded();
                self.transcript.push_notice(RECONNECTED_NOTICE);
                self.publish_transcript();
                self.set_state(SessionState::Listening);
                self.outputs.diagnostics.mark("recovery.ok");
                info!("Session reconnected");
            }
            (Pending::Recovery { .. }, Err(err)) => {
                warn!("Reconnect attempt failed: {}", err);
                self.outputs
                    .diagnostics
                    .record("recovery.failed", err.to_string());
                match self.recovery.attempt_failed() {
                    RecoveryStep::Retry(delay) => self.schedule_attempt(delay),
                    RecoveryStep::Exhausted => self.give_up(),
                }
            }
        }
    }

    /// Take ownership of a negotiated connection and start forwarding its events
    fn install(&mut self, attempt: u64, mut connection: Connection) {
        let (buffered, events) = connection.take_events();
        let tx = self.internal_tx.clone();

        let forwarder = tokio::spawn(async move {
            for event in buffered {
                if tx.send(Internal::Transport { attempt, event }).is_err() {
                    return;
                }
            }
            if let Some(mut events) = events {
                while let Some(event) = events.recv().await {
                    if tx.send(Internal::Transport { attempt, event }).is_err() {
                        break;
                    }
                }
            }
        });

        self.active = Some(Active {
            attempt,
            connection,
            forwarder,
        });
    }

    // Recovery

    fn begin_recovery(&mut self) {
        if self.recovery.is_recovering() {
            self.outputs
                .diagnostics
                .record("recovery.ignored", "already recovering");
            return;
        }
        if self.last_params.is_none() {
            return;
        }

        warn!("Transport lost, starting recovery");
        match self.recovery.try_begin() {
            Some(delay) => {
                self.set_state(SessionState::Reconnecting);
                self.transcript.push_notice(CONNECTION_LOST_NOTICE);
                self.publish_transcript();
                self.schedule_attempt(delay);
            }
            None => {
                self.teardown();
                self.give_up();
            }
        }
    }

    fn schedule_attempt(&mut self, delay: Duration) {
        self.attempt += 1;
        let attempt = self.attempt;
        self.teardown();
        self.pending = Some(Pending::Recovery { attempt });

        self.outputs.diagnostics.record(
            "recovery.attempt",
            format!(
                "{}/{} in {}ms",
                self.recovery.attempt().map(|i| i + 1).unwrap_or(0),
                self.recovery.schedule_len(),
                delay.as_millis()
            ),
        );

        let tx = self.internal_tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(Internal::BackoffElapsed { attempt });
        });
    }

    fn on_backoff_elapsed(&mut self, attempt: u64) {
        let scheduled = attempt == self.attempt
            && matches!(self.pending, Some(Pending::Recovery { attempt: a }) if a == attempt);
        if !scheduled {
            debug!("Ignoring backoff timer for stale attempt {}", attempt);
            return;
        }

        match self.last_params.clone() {
            Some(params) => self.spawn_negotiation(attempt, params),
            None => {
                self.pending = None;
                self.recovery.cancel();
            }
        }
    }

    fn give_up(&mut self) {
        error!("Reconnection failed, giving up");
        self.transcript.push_notice(GAVE_UP_NOTICE);
        self.publish_transcript();
        self.set_state(SessionState::Disconnected);
        self.outputs.diagnostics.mark("recovery.exhausted");
    }

    // Transport events

    fn on_transport(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Connectivity(signal) => self.on_connectivity(signal),
            TransportEvent::ChannelMessage(raw) => self.on_message(&raw),
            TransportEvent::ChannelOpen => self.outputs.diagnostics.mark("dc.open"),
            TransportEvent::ChannelError(e) => self.outputs.diagnostics.record("dc.error", e),
            TransportEvent::ChannelClosed => self.outputs.diagnostics.mark("dc.close"),
        }
    }

    fn on_connectivity(&mut self, signal: ConnectivitySignal) {
        let kind = match signal {
            ConnectivitySignal::Ice(_) => "pc.ice",
            ConnectivitySignal::Peer(_) => "pc.state",
        };
        self.outputs.diagnostics.record(kind, signal.to_string());

        let decision = self.monitor.observe(signal);
        if let Some(state) = decision.state {
            self.set_state(state);
        }
        if decision.recover {
            self.begin_recovery();
        }
    }

    fn on_message(&mut self, raw: &str) {
        let message = match protocol::decode(raw) {
            Ok(message) => message,
            Err(e) => {
                debug!("Dropping malformed control message: {}", e);
                return;
            }
        };

        let diagnostics = &self.outputs.diagnostics;
        match (&message.event, message.summary()) {
            (ServerEvent::Error { .. }, summary) => diagnostics.record_raw(
                &message.kind,
                summary.unwrap_or_default(),
                message.raw.clone(),
            ),
            (_, Some(summary)) => diagnostics.record(&message.kind, summary),
            (_, None) => diagnostics.mark(&message.kind),
        }

        let effects = self.reducer.apply(&message.event, &mut self.transcript);
        for effect in effects {
            match effect {
                Effect::SetState(state) => self.set_state(state),
                Effect::PublishTranscript => self.publish_transcript(),
                Effect::Send(event) => self.send(&event),
            }
        }
    }

    fn send(&mut self, event: &ClientEvent) {
        let Some(active) = self.active.as_mut() else {
            self.outputs.diagnostics.record("send.dropped", event.kind());
            return;
        };
        match active.connection.send(event) {
            Ok(true) => self.outputs.diagnostics.record("client.send", event.kind()),
            Ok(false) => self
                .outputs
                .diagnostics
                .record("send.dropped", format!("{} (channel not open)", event.kind())),
            Err(e) => {
                warn!("Failed to send {}: {:#}", event.kind(), e);
                self.outputs
                    .diagnostics
                    .record("send.error", format!("{}: {:#}", event.kind(), e));
            }
        }
    }

    // Publication

    fn set_state(&self, state: SessionState) {
        self.outputs.diagnostics.record("state", state.as_str());
        if self.outputs.state.set_if_changed(state) {
            debug!("Session state -> {}", state);
        }
    }

    fn publish_transcript(&self) {
        self.outputs.transcript.set(self.transcript.entries().to_vec());
    }
}
