//! Google Calendar API v3: windowed event listing for transcript matching.

use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::types::CalendarEvent;

use super::{error_for_response, parse_datetime_utc, send_with_retry, GoogleApiError, RetryPolicy};

const EVENTS_URL: &str = "https://www.googleapis.com/calendar/v3/calendars/primary/events";

// ============================================================================
// API response types (deserialized from Google Calendar JSON)
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EventListResponse {
    #[serde(default)]
    items: Vec<EventRaw>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EventRaw {
    #[serde(default)]
    id: String,
    #[serde(default)]
    summary: Option<String>,
    start: Option<EventDateTime>,
    end: Option<EventDateTime>,
    #[serde(default)]
    attendees: Vec<AttendeeRaw>,
    organizer: Option<OrganizerRaw>,
    #[serde(default)]
    location: Option<String>,
    #[serde(default)]
    recurring_event_id: Option<String>,
    #[serde(default)]
    status: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EventDateTime {
    date_time: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AttendeeRaw {
    #[serde(default)]
    email: String,
    #[serde(default)]
    response_status: Option<String>,
    #[serde(default)]
    resource: Option<bool>,
    #[serde(rename = "self", default)]
    is_self: Option<bool>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OrganizerRaw {
    #[serde(default)]
    email: String,
}

// ============================================================================
// Calendar API
// ============================================================================

/// Fetch events whose span intersects `[time_min, time_max)`.
///
/// Handles pagination (maxResults=250, pageToken). Cancelled events,
/// self-declined events, and all-day entries are dropped; resource rooms are
/// dropped from attendee lists.
pub async fn fetch_events_window(
    access_token: &str,
    time_min: DateTime<Utc>,
    time_max: DateTime<Utc>,
) -> Result<Vec<CalendarEvent>, GoogleApiError> {
    let client = super::http();
    let time_min_s = time_min.to_rfc3339();
    let time_max_s = time_max.to_rfc3339();

    let mut all_events = Vec::new();
    let mut page_token: Option<String> = None;

    loop {
        let mut request = client.get(EVENTS_URL).bearer_auth(access_token).query(&[
            ("timeMin", time_min_s.as_str()),
            ("timeMax", time_max_s.as_str()),
            ("singleEvents", "true"),
            ("orderBy", "startTime"),
            ("maxResults", "250"),
        ]);

        if let Some(ref token) = page_token {
            request = request.query(&[("pageToken", token.as_str())]);
        }

        let resp = send_with_retry(request, &RetryPolicy::default()).await?;
        if !resp.status().is_success() {
            return Err(error_for_response(resp).await);
        }

        let body: EventListResponse = resp.json().await?;
        for item in body.items {
            if let Some(event) = normalize_event(item) {
                all_events.push(event);
            }
        }

        page_token = body.next_page_token;
        if page_token.is_none() {
            break;
        }
    }

    Ok(all_events)
}

fn normalize_event(raw: EventRaw) -> Option<CalendarEvent> {
    if raw.status.as_deref() == Some("cancelled") {
        return None;
    }

    let self_declined = raw
        .attendees
        .iter()
        .any(|a| a.is_self == Some(true) && a.response_status.as_deref() == Some("declined"));
    if self_declined {
        return None;
    }

    // Timed events only; an all-day entry can't anchor a transcript.
    let start = raw
        .start
        .as_ref()?
        .date_time
        .as_deref()
        .and_then(parse_datetime_utc)?;
    let end = raw
        .end
        .as_ref()?
        .date_time
        .as_deref()
        .and_then(parse_datetime_utc)?;

    let attendee_emails: Vec<String> = raw
        .attendees
        .iter()
        .filter(|a| a.resource != Some(true))
        .map(|a| a.email.clone())
        .filter(|e| !e.is_empty())
        .collect();

    Some(CalendarEvent {
        id: raw.id,
        title: raw.summary.unwrap_or_else(|| "(No title)".to_string()),
        start,
        end,
        organizer_email: raw.organizer.map(|o| o.email).unwrap_or_default(),
        attendee_emails,
        location: raw.location.filter(|l| !l.is_empty()),
        recurring_series_id: raw.recurring_event_id,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_deserialization_and_normalization() {
        let json = r#"{
            "items": [
                {
                    "id": "event123",
                    "summary": "Team Standup",
                    "start": {"dateTime": "2026-08-12T09:00:00-05:00"},
                    "end": {"dateTime": "2026-08-12T09:30:00-05:00"},
                    "attendees": [
                        {"email": "alice@company.com", "responseStatus": "accepted"},
                        {"email": "bob@company.com", "responseStatus": "needsAction"},
                        {"email": "room-4@resource.calendar.google.com", "resource": true}
                    ],
                    "organizer": {"email": "alice@company.com"},
                    "recurringEventId": "abc123",
                    "location": "Room 4"
                }
            ]
        }"#;

        let resp: EventListResponse = serde_json::from_str(json).unwrap();
        assert_eq!(resp.items.len(), 1);

        let event = normalize_event(resp.items.into_iter().next().unwrap()).unwrap();
        assert_eq!(event.title, "Team Standup");
        assert_eq!(
            event.attendee_emails,
            vec!["alice@company.com", "bob@company.com"]
        );
        assert_eq!(event.organizer_email, "alice@company.com");
        assert_eq!(event.recurring_series_id.as_deref(), Some("abc123"));
        assert_eq!(event.location.as_deref(), Some("Room 4"));
    }

    #[test]
    fn test_cancelled_event_is_dropped() {
        let raw: EventRaw = serde_json::from_str(
            r#"{
                "id": "dead1",
                "summary": "Cancelled Sync",
                "status": "cancelled",
                "start": {"dateTime": "2026-08-12T10:00:00Z"},
                "end": {"dateTime": "2026-08-12T11:00:00Z"}
            }"#,
        )
        .unwrap();

        assert!(normalize_event(raw).is_none());
    }

    #[test]
    fn test_self_declined_event_is_dropped() {
        let raw: EventRaw = serde_json::from_str(
            r#"{
                "id": "declined1",
                "summary": "Meeting I declined",
                "start": {"dateTime": "2026-08-12T10:00:00Z"},
                "end": {"dateTime": "2026-08-12T11:00:00Z"},
                "attendees": [
                    {"email": "me@company.com", "self": true, "responseStatus": "declined"},
                    {"email": "other@company.com", "responseStatus": "accepted"}
                ]
            }"#,
        )
        .unwrap();

        assert!(normalize_event(raw).is_none());
    }

    #[test]
    fn test_all_day_event_is_dropped() {
        let raw: EventRaw = serde_json::from_str(
            r#"{
                "id": "allday1",
                "summary": "Company Holiday",
                "start": {"date": "2026-08-12"},
                "end": {"date": "2026-08-13"}
            }"#,
        )
        .unwrap();

        assert!(normalize_event(raw).is_none());
    }
}
