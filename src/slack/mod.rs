//! Slack integration: Web API client and inbound request verification.
//!
//! The client covers the two calls the pipeline needs (`users.lookupByEmail`
//! and `chat.postMessage`); `signature` authenticates the event payloads
//! Slack pushes at us when a transcript lands in Drive.

pub mod client;
pub mod signature;

pub use client::{SlackClient, SlackError};
pub use signature::{verify_signature, SignatureError};
