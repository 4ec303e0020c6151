//! Calendar bridge: ties a Drive transcript file back to the meeting it records.
//!
//! Google Meet names transcripts after the event ("Weekly Sync - 2026/08/12
//! 10:03 GMT-07:00 - Transcript"), but the naming is not guaranteed, so the
//! bridge scores every candidate event on title similarity and time proximity
//! instead of trusting the name alone.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

use crate::error::PipelineError;
use crate::google_api::drive::{self, DriveFile};
use crate::google_api::{calendar, GoogleAuth};
use crate::types::{CalendarEvent, FileInfo, MeetingInfo};

/// How far back from file creation to search for the source event.
const LOOKBACK_HOURS: i64 = 8;
/// Transcripts occasionally land before the event formally ends, so the
/// search window extends slightly past file creation.
const LOOKAHEAD_MINUTES: i64 = 30;
/// Combined title + time score a candidate must reach to count as a match.
const MATCH_THRESHOLD: u32 = 100;

/// Resolves transcript files to the calendar events that produced them.
#[async_trait]
pub trait CalendarBridge: Send + Sync {
    /// Resolve a Drive file ID to the meeting (event + participants) it
    /// records, or `None` when no calendar event matches well enough.
    async fn find_meeting_with_participants(
        &self,
        file_id: &str,
    ) -> Result<Option<MeetingInfo>, PipelineError>;
}

/// Production bridge backed by the Drive and Calendar APIs.
pub struct DriveCalendarBridge {
    auth: Arc<GoogleAuth>,
    user_key: String,
}

impl DriveCalendarBridge {
    pub fn new(auth: Arc<GoogleAuth>, user_key: impl Into<String>) -> Self {
        Self {
            auth,
            user_key: user_key.into(),
        }
    }
}

#[async_trait]
impl CalendarBridge for DriveCalendarBridge {
    async fn find_meeting_with_participants(
        &self,
        file_id: &str,
    ) -> Result<Option<MeetingInfo>, PipelineError> {
        let token = self.auth.access_token(&self.user_key).await?;
        let file = drive::get_file_metadata(&token, file_id).await?;

        let window_start = file.created_time - Duration::hours(LOOKBACK_HOURS);
        let window_end = file.created_time + Duration::minutes(LOOKAHEAD_MINUTES);
        let events = calendar::fetch_events_window(&token, window_start, window_end).await?;

        log::debug!(
            "Bridge: {} candidate events for file {} ({})",
            events.len(),
            file_id,
            file.name
        );

        Ok(best_match(&file, &events)
            .map(|event| MeetingInfo::new(event.clone(), file_info(&file))))
    }
}

fn file_info(file: &DriveFile) -> FileInfo {
    FileInfo {
        id: file.id.clone(),
        name: file.name.clone(),
        created_time: file.created_time,
    }
}

// ============================================================================
// Matching
// ============================================================================

/// Pick the event that best explains `file`, or `None` if nothing clears the
/// threshold. Ties go to the event whose end is closest to file creation.
fn best_match<'a>(file: &DriveFile, events: &'a [CalendarEvent]) -> Option<&'a CalendarEvent> {
    let cleaned = clean_transcript_title(&file.name);
    let mut best: Option<(&CalendarEvent, u32)> = None;

    for event in events {
        let score =
            title_score(&cleaned, &event.title) + time_proximity_score(file.created_time, event);
        if score < MATCH_THRESHOLD {
            continue;
        }

        let better = match best {
            None => true,
            Some((current, current_score)) => {
                score > current_score
                    || (score == current_score
                        && end_distance(file.created_time, event)
                            < end_distance(file.created_time, current))
            }
        };
        if better {
            best = Some((event, score));
        }
    }

    best.map(|(event, _)| event)
}

fn end_distance(created: DateTime<Utc>, event: &CalendarEvent) -> i64 {
    (created - event.end).num_seconds().abs()
}

/// Strip the boilerplate Google Meet appends to transcript file names,
/// leaving just the meeting title.
pub(crate) fn clean_transcript_title(name: &str) -> String {
    let mut kept: Vec<&str> = Vec::new();

    for segment in name.split(" - ") {
        let trimmed = segment.trim();
        if trimmed.is_empty() {
            continue;
        }
        let lower = trimmed.to_lowercase();
        if lower == "transcript" || lower == "notes by gemini" || lower == "gemini notes" {
            continue;
        }
        // Date/time segments ("2026/08/12 10:03 GMT-07:00") start with a digit.
        if trimmed.starts_with(|c: char| c.is_ascii_digit()) {
            continue;
        }
        kept.push(trimmed);
    }

    if kept.is_empty() {
        name.trim().to_string()
    } else {
        kept.join(" - ")
    }
}

/// Title similarity. An exact match is decisive on its own; weaker signals
/// need time proximity to clear the threshold.
fn title_score(file_title: &str, event_title: &str) -> u32 {
    let file_norm = file_title.trim().to_lowercase();
    let event_norm = event_title.trim().to_lowercase();

    if file_norm.is_empty() || event_norm.is_empty() {
        return 0;
    }
    if file_norm == event_norm {
        return 100;
    }
    if file_norm.contains(&event_norm) || event_norm.contains(&file_norm) {
        return 70;
    }

    let file_tokens: HashSet<&str> = file_norm
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .collect();
    let event_tokens: HashSet<&str> = event_norm
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .collect();
    if file_tokens.is_empty() || event_tokens.is_empty() {
        return 0;
    }

    let shared = file_tokens.intersection(&event_tokens).count();
    let smaller = file_tokens.len().min(event_tokens.len());
    if shared as f64 / smaller as f64 > 0.5 {
        50
    } else {
        0
    }
}

/// Proximity of file creation to the event. Meet exports transcripts within
/// minutes of the recording stopping, so inside-or-just-after scores highest.
fn time_proximity_score(created: DateTime<Utc>, event: &CalendarEvent) -> u32 {
    if created >= event.start && created <= event.end + Duration::minutes(10) {
        return 80;
    }

    let gap = end_distance(created, event);
    if gap <= 3600 {
        60
    } else if gap <= 3 * 3600 {
        30
    } else {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn event(id: &str, title: &str, start: DateTime<Utc>, minutes: i64) -> CalendarEvent {
        CalendarEvent {
            id: id.to_string(),
            title: title.to_string(),
            start,
            end: start + Duration::minutes(minutes),
            organizer_email: "organizer@company.com".to_string(),
            attendee_emails: vec!["attendee@company.com".to_string()],
            location: None,
            recurring_series_id: None,
        }
    }

    fn drive_file(name: &str, created: DateTime<Utc>) -> DriveFile {
        DriveFile {
            id: "file1".to_string(),
            name: name.to_string(),
            created_time: created,
            mime_type: "application/vnd.google-apps.document".to_string(),
        }
    }

    fn at(hour: u32, min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 8, 12, hour, min, 0).unwrap()
    }

    #[test]
    fn test_clean_title_strips_meet_boilerplate() {
        assert_eq!(
            clean_transcript_title("Weekly Sync - 2026/08/12 10:03 GMT-07:00 - Transcript"),
            "Weekly Sync"
        );
        assert_eq!(
            clean_transcript_title("Design Review - Notes by Gemini"),
            "Design Review"
        );
        assert_eq!(clean_transcript_title("Plain Meeting Notes"), "Plain Meeting Notes");
    }

    #[test]
    fn test_clean_title_keeps_original_when_everything_looks_like_noise() {
        assert_eq!(clean_transcript_title("Transcript"), "Transcript");
    }

    #[test]
    fn test_exact_title_match_alone_clears_threshold() {
        let events = vec![event("e1", "Weekly Sync", at(3, 0), 30)];
        // File created hours after the event: time score is zero.
        let file = drive_file("Weekly Sync - 2026/08/12 - Transcript", at(9, 0));

        let matched = best_match(&file, &events).unwrap();
        assert_eq!(matched.id, "e1");
    }

    #[test]
    fn test_containment_needs_time_proximity() {
        let far = vec![event("e1", "Sync", at(1, 0), 30)];
        let near = vec![event("e2", "Sync", at(9, 0), 30)];
        let file = drive_file("Weekly Sync Extended - Transcript", at(9, 35));

        // 70 (containment) + 0 (time) falls short.
        assert!(best_match(&file, &far).is_none());
        // 70 + 80 (just after the event ended) clears it.
        assert_eq!(best_match(&file, &near).unwrap().id, "e2");
    }

    #[test]
    fn test_token_overlap_scores_weakest() {
        let events = vec![event("e1", "Q3 Roadmap Planning", at(9, 0), 60)];
        let file = drive_file("Roadmap Planning Session - Transcript", at(10, 5));

        // 2 of 3 event tokens shared (> 0.5) plus inside/just-after time.
        assert_eq!(best_match(&file, &events).unwrap().id, "e1");
    }

    #[test]
    fn test_unrelated_event_never_matches() {
        let events = vec![event("e1", "1:1 Maria / Tom", at(9, 0), 30)];
        let file = drive_file("Incident Postmortem - Transcript", at(9, 35));

        assert!(best_match(&file, &events).is_none());
    }

    #[test]
    fn test_time_proximity_tiers() {
        let e = event("e1", "Sync", at(9, 0), 30);

        // During the event.
        assert_eq!(time_proximity_score(at(9, 15), &e), 80);
        // Five minutes after it ended.
        assert_eq!(time_proximity_score(at(9, 35), &e), 80);
        // Forty minutes after.
        assert_eq!(time_proximity_score(at(10, 10), &e), 60);
        // Two hours after.
        assert_eq!(time_proximity_score(at(11, 30), &e), 30);
        // Six hours after.
        assert_eq!(time_proximity_score(at(15, 30), &e), 0);
    }

    #[test]
    fn test_tie_break_prefers_closest_end() {
        // Recurring series: same title, morning and afternoon instances, and
        // a file created late enough that both score identically on time.
        let events = vec![
            event("morning", "Team Standup", at(9, 0), 15),
            event("afternoon", "Team Standup", at(14, 0), 15),
        ];
        let file = drive_file("Team Standup - Transcript", at(20, 0));

        assert_eq!(best_match(&file, &events).unwrap().id, "afternoon");
    }

    #[test]
    fn test_best_score_wins_over_earlier_candidate() {
        let events = vec![
            event("weak", "Planning", at(9, 0), 30),
            event("strong", "Sprint Planning", at(9, 0), 30),
        ];
        let file = drive_file("Sprint Planning - Transcript", at(9, 35));

        assert_eq!(best_match(&file, &events).unwrap().id, "strong");
    }
}
