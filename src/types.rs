//! Core data model for transcript processing.
//!
//! Everything here is constructed fresh per processing run and never mutated
//! after being returned to the caller. Serialized forms use snake_case (the
//! shapes callers persist or forward); API wire quirks stay inside the client
//! modules as private raw types.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::directory::UserMapping;

/// Lifecycle state of one `process_transcript` call.
///
/// A returned result is always `Completed` or `Failed`; `Queued` and
/// `InProgress` exist for callers that persist or display in-flight state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingStatus {
    Queued,
    InProgress,
    Completed,
    Failed,
}

/// A normalized calendar event, as matched to a transcript file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalendarEvent {
    pub id: String,
    pub title: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub organizer_email: String,
    pub attendee_emails: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    /// Parent series id when the event is one instance of a recurring series.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recurring_series_id: Option<String>,
}

/// Identity of the transcript file itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileInfo {
    pub id: String,
    pub name: String,
    pub created_time: DateTime<Utc>,
}

/// The meeting a transcript belongs to, produced once per run by the
/// Calendar Bridge and immutable afterward.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeetingInfo {
    pub event: CalendarEvent,
    /// Union of organizer and attendee emails in discovery order (organizer
    /// first), de-duplicated case-insensitively, first-seen casing kept.
    pub participant_emails: Vec<String>,
    pub file_info: FileInfo,
}

impl MeetingInfo {
    pub fn new(event: CalendarEvent, file_info: FileInfo) -> Self {
        let mut participant_emails: Vec<String> = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();

        let candidates = std::iter::once(event.organizer_email.as_str())
            .chain(event.attendee_emails.iter().map(|e| e.as_str()));
        for email in candidates {
            if email.is_empty() {
                continue;
            }
            if seen.insert(email.to_ascii_lowercase()) {
                participant_emails.push(email.to_string());
            }
        }

        Self {
            event,
            participant_emails,
            file_info,
        }
    }
}

/// Directory resolutions for one run, plus the derived Slack mention tokens.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserMappings {
    #[serde(default)]
    pub slack: UserMapping,
    #[serde(default)]
    pub notion: UserMapping,
    /// Mention tokens ordered like `participants` (unmatched participants
    /// contribute none).
    #[serde(default)]
    pub slack_mentions: Vec<String>,
}

/// Outcome of one `process_transcript` call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessingResult {
    pub status: ProcessingStatus,
    pub file_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meeting: Option<MeetingInfo>,
    #[serde(default)]
    pub participants: Vec<String>,
    #[serde(default)]
    pub user_mappings: UserMappings,
    #[serde(default)]
    pub errors: Vec<String>,
}

impl ProcessingResult {
    /// Fresh in-progress result, created at the top of a processing run.
    pub fn started(file_id: &str) -> Self {
        Self {
            status: ProcessingStatus::InProgress,
            file_id: file_id.to_string(),
            meeting: None,
            participants: Vec::new(),
            user_mappings: UserMappings::default(),
            errors: Vec::new(),
        }
    }
}

/// A task extracted from the transcript by the summarizer.
///
/// The summarizer supplies `task` and optionally `assignee_email`;
/// `notion_user_id`/`auto_assigned` are only ever set by
/// `assign_action_owners`, never by parsing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionItem {
    pub task: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assignee_email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notion_user_id: Option<String>,
    #[serde(default)]
    pub auto_assigned: bool,
}
