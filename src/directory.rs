//! Identity directory seam.
//!
//! A directory resolves participant emails to one service's internal user
//! identities (Slack user ids, Notion person ids). Implementations live with
//! their API clients; the processor only sees this trait.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::PipelineError;

/// One verified directory identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryUser {
    pub id: String,
    pub display_name: String,
}

/// Participant email → directory identity, for one directory.
///
/// Only verified matches appear; unmatched emails are absent (no placeholder
/// entries). Keys are the requested emails verbatim, whatever case the
/// service reports back.
pub type UserMapping = HashMap<String, DirectoryUser>;

/// Batch email→identity resolution against one external directory.
///
/// Must be safe with zero or many emails, and must not fail for individually
/// unmatched addresses; those are simply left out of the result. Transport
/// and auth failures propagate.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn batch_lookup(&self, emails: &[String]) -> Result<UserMapping, PipelineError>;
}
