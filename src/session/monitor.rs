use super::state::SessionState;
use crate::transport::{ConnectivitySignal, IceState, PeerState};

/// What the session should do about a connectivity signal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MonitorDecision {
    /// State to assert, if the signal maps to one
    pub state: Option<SessionState>,

    /// Whether the signal reports a failure that calls for recovery
    pub recover: bool,
}

/// Maps ICE and peer-connection signals onto session state.
///
/// Both layers are watched and may disagree or arrive out of order; each is
/// authoritative for what it reports. Mapping is idempotent, deduplication
/// happens in the state observable.
#[derive(Debug, Default)]
pub struct ConnectionMonitor {
    last_ice: Option<IceState>,
    last_peer: Option<PeerState>,
}

impl ConnectionMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observe(&mut self, signal: ConnectivitySignal) -> MonitorDecision {
        match signal {
            ConnectivitySignal::Ice(state) => {
                self.last_ice = Some(state);
                match state {
                    IceState::Connected | IceState::Completed => settled(SessionState::Listening),
                    IceState::Disconnected | IceState::Failed => failed(),
                    IceState::Closed => settled(SessionState::Disconnected),
                    IceState::New | IceState::Checking => MonitorDecision::default(),
                }
            }
            ConnectivitySignal::Peer(state) => {
                self.last_peer = Some(state);
                match state {
                    PeerState::Connected => settled(SessionState::Listening),
                    PeerState::Disconnected | PeerState::Failed => failed(),
                    PeerState::Closed => settled(SessionState::Disconnected),
                    PeerState::New | PeerState::Connecting => MonitorDecision::default(),
                }
            }
        }
    }

    pub fn last_ice(&self) -> Option<IceState> {
        self.last_ice
    }

    pub fn last_peer(&self) -> Option<PeerState> {
        self.last_peer
    }

    /// Forget signals from a torn-down transport
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

fn settled(state: SessionState) -> MonitorDecision {
    MonitorDecision {
        state: Some(state),
        recover: false,
    }
}

fn failed() -> MonitorDecision {
    MonitorDecision {
        state: Some(SessionState::Reconnecting),
        recover: true,
    }
}
