//! Clients for the remote collaborators of a connection attempt
//!
//! - Credential endpoint: exchanges caller key material for an ephemeral secret
//! - Signaling endpoint: trades the local offer for the remote answer

mod credentials;
mod signaling;
mod types;

pub use credentials::{CredentialProvider, StaticCredentials, TokenClient};
pub use signaling::{HttpSignaling, SignalingClient};
pub use types::{
    error_message, CredentialRequest, EphemeralCredential, KeyValidation, VadSettings,
};
