//! Notion integration: workspace user directory and recap page publishing.

pub mod client;

pub use client::{NotionClient, NotionError, RecapPage, RecapTask};
