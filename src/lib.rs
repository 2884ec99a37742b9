pub mod api;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod http;
pub mod observable;
pub mod protocol;
pub mod session;
pub mod transcript;
pub mod transport;

pub use api::{
    CredentialProvider, CredentialRequest, EphemeralCredential, HttpSignaling, KeyValidation,
    SignalingClient, StaticCredentials, TokenClient, VadSettings,
};
pub use config::Config;
pub use diagnostics::{DiagnosticEvent, Diagnostics, DiagnosticsLog};
pub use error::{MediaError, SessionError};
pub use http::{create_router, AppState};
pub use observable::{Observable, Subscription};
pub use session::{
    DisconnectOptions, SessionConfig, SessionManager, SessionNegotiator, SessionParameters,
    SessionState,
};
pub use transcript::{EntryStatus, Role, Transcript, TranscriptEntry};
