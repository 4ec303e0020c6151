//! Meeting transcript analysis pipeline.
//!
//! Matches Google Meet transcripts (Drive files) to their calendar events,
//! resolves participants to Slack and Notion identities, extracts a summary
//! with action items via Gemini, and publishes recaps.
//!
//! `processor::MeetingTranscriptProcessor` is the core orchestrator;
//! `pipeline::RecapPipeline` adds the summarize and publish stages on top.
//! Request-signature verification for inbound Slack triggers lives in
//! `slack::signature`.

pub mod bridge;
pub mod config;
pub mod directory;
pub mod error;
pub mod google_api;
pub mod notion;
pub mod pipeline;
pub mod processor;
pub mod slack;
pub mod stats;
pub mod summarizer;
pub mod types;
pub mod util;
