//! Realtime conversational session
//!
//! `SessionManager` is the public handle. Connection attempts run through the
//! `SessionNegotiator`; conversation events are folded into the transcript
//! by the `ConversationReducer`; the `ConnectionMonitor` and
//! `RecoveryController` decide when and how to reconnect.

mod actor;
pub mod config;
pub mod manager;
pub mod monitor;
pub mod negotiator;
pub mod recovery;
pub mod reducer;
pub mod state;

pub use config::{DisconnectOptions, SessionConfig, SessionParameters, DEFAULT_INSTRUCTIONS};
pub use manager::SessionManager;
pub use monitor::{ConnectionMonitor, MonitorDecision};
pub use negotiator::{Connection, SessionNegotiator};
pub use recovery::{
    RecoveryController, RecoveryPhase, RecoveryStep, CONNECTION_LOST_NOTICE, GAVE_UP_NOTICE,
    RECONNECTED_NOTICE,
};
pub use reducer::{ConversationReducer, Effect, REMOTE_ERROR_PREFIX};
pub use state::SessionState;
