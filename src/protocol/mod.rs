//! Control-channel wire format
//!
//! Every message is a single JSON object with a `type` discriminator.
//! Inbound messages decode into the closed [`ServerEvent`] enum, with
//! [`ServerEvent::Unknown`] catching types this client does not handle.

mod messages;

pub use messages::{
    decode, ClientEvent, DecodeError, InboundMessage, RemoteError, ResponseOptions, ServerEvent,
    SessionUpdate, CONTROL_CHANNEL_LABEL,
};
