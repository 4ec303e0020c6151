//! Slack Web API client.
//!
//! Uses reqwest with Bearer token auth. Slack reports failures inside a 200
//! response (`ok: false` plus an error code), so HTTP status alone is not
//! enough to classify a call.

use async_trait::async_trait;
use serde::Deserialize;

use crate::directory::{DirectoryUser, UserDirectory, UserMapping};
use crate::error::PipelineError;
use crate::util::{http_client, name_from_email};

const SLACK_API_BASE: &str = "https://slack.com/api";

#[derive(Debug, thiserror::Error)]
pub enum SlackError {
    #[error("Slack API request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Slack API error: {0}")]
    Api(String),
}

impl SlackError {
    /// Whether retrying the same call later could succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            SlackError::Http(e) => e.is_timeout() || e.is_connect(),
            SlackError::Api(code) => code == "ratelimited" || code == "internal_error",
        }
    }
}

// ============================================================================
// API response types
// ============================================================================

#[derive(Debug, Deserialize)]
struct LookupResponse {
    ok: bool,
    error: Option<String>,
    user: Option<SlackUserRaw>,
}

#[derive(Debug, Deserialize)]
struct SlackUserRaw {
    id: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    profile: Option<ProfileRaw>,
}

#[derive(Debug, Deserialize)]
struct ProfileRaw {
    #[serde(default)]
    display_name: Option<String>,
    #[serde(default)]
    real_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PostMessageResponse {
    ok: bool,
    error: Option<String>,
    ts: Option<String>,
}

// ============================================================================
// Client
// ============================================================================

#[derive(Clone)]
pub struct SlackClient {
    http: reqwest::Client,
    bot_token: String,
}

impl SlackClient {
    pub fn new(bot_token: impl Into<String>) -> Self {
        Self {
            http: http_client(),
            bot_token: bot_token.into(),
        }
    }

    /// Look up a workspace user by email. Returns `None` for addresses with
    /// no Slack account (external guests, service addresses).
    pub async fn lookup_user_by_email(
        &self,
        email: &str,
    ) -> Result<Option<DirectoryUser>, SlackError> {
        let resp = self
            .http
            .get(format!("{}/users.lookupByEmail", SLACK_API_BASE))
            .bearer_auth(&self.bot_token)
            .query(&[("email", email)])
            .send()
            .await?;

        let body: LookupResponse = resp.json().await?;
        if !body.ok {
            let code = body.error.unwrap_or_else(|| "unknown_error".to_string());
            if code == "users_not_found" || code == "user_not_found" {
                return Ok(None);
            }
            return Err(SlackError::Api(code));
        }

        Ok(body.user.map(|raw| DirectoryUser {
            display_name: display_name(&raw, email),
            id: raw.id,
        }))
    }

    /// Post a message to a channel. Returns the timestamp Slack assigns,
    /// usable as a thread anchor for follow-ups.
    pub async fn post_message(&self, channel: &str, text: &str) -> Result<String, SlackError> {
        let body = serde_json::json!({ "channel": channel, "text": text });
        let resp = self
            .http
            .post(format!("{}/chat.postMessage", SLACK_API_BASE))
            .bearer_auth(&self.bot_token)
            .json(&body)
            .send()
            .await?;

        let parsed: PostMessageResponse = resp.json().await?;
        if !parsed.ok {
            return Err(SlackError::Api(
                parsed.error.unwrap_or_else(|| "unknown_error".to_string()),
            ));
        }
        parsed
            .ts
            .ok_or_else(|| SlackError::Api("missing ts in chat.postMessage response".to_string()))
    }
}

/// Best available human-readable name for a Slack user.
fn display_name(raw: &SlackUserRaw, email: &str) -> String {
    let from_profile = raw.profile.as_ref().and_then(|p| {
        [p.display_name.as_deref(), p.real_name.as_deref()]
            .into_iter()
            .flatten()
            .find(|s| !s.trim().is_empty())
            .map(|s| s.to_string())
    });

    from_profile
        .or_else(|| raw.name.clone().filter(|s| !s.trim().is_empty()))
        .unwrap_or_else(|| name_from_email(email))
}

#[async_trait]
impl UserDirectory for SlackClient {
    async fn batch_lookup(&self, emails: &[String]) -> Result<UserMapping, PipelineError> {
        // Sequential on purpose: users.lookupByEmail is one of Slack's more
        // tightly rate-limited methods.
        let mut mapping = UserMapping::new();
        for email in emails {
            match self.lookup_user_by_email(email).await? {
                Some(user) => {
                    mapping.insert(email.clone(), user);
                }
                None => log::debug!("Slack: no account for {}", email),
            }
        }
        Ok(mapping)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_response_with_user() {
        let json = r#"{
            "ok": true,
            "user": {
                "id": "U023BECGF",
                "name": "bobby",
                "profile": {
                    "display_name": "Bobby Tables",
                    "real_name": "Robert Tables"
                }
            }
        }"#;

        let resp: LookupResponse = serde_json::from_str(json).unwrap();
        assert!(resp.ok);
        let user = resp.user.unwrap();
        assert_eq!(user.id, "U023BECGF");
        assert_eq!(display_name(&user, "bobby@company.com"), "Bobby Tables");
    }

    #[test]
    fn test_lookup_response_user_not_found() {
        let json = r#"{"ok": false, "error": "users_not_found"}"#;

        let resp: LookupResponse = serde_json::from_str(json).unwrap();
        assert!(!resp.ok);
        assert_eq!(resp.error.as_deref(), Some("users_not_found"));
    }

    #[test]
    fn test_display_name_fallback_chain() {
        let with_real_name: SlackUserRaw = serde_json::from_str(
            r#"{"id": "U1", "name": "tmble", "profile": {"display_name": "", "real_name": "Tara Mble"}}"#,
        )
        .unwrap();
        assert_eq!(display_name(&with_real_name, "t@x.com"), "Tara Mble");

        let handle_only: SlackUserRaw =
            serde_json::from_str(r#"{"id": "U2", "name": "tmble"}"#).unwrap();
        assert_eq!(display_name(&handle_only, "t@x.com"), "tmble");

        let bare: SlackUserRaw = serde_json::from_str(r#"{"id": "U3"}"#).unwrap();
        assert_eq!(
            display_name(&bare, "sarah.chen@acme.com"),
            "Sarah Chen"
        );
    }

    #[test]
    fn test_post_message_response() {
        let ok: PostMessageResponse =
            serde_json::from_str(r#"{"ok": true, "ts": "1503435956.000247"}"#).unwrap();
        assert!(ok.ok);
        assert_eq!(ok.ts.as_deref(), Some("1503435956.000247"));

        let err: PostMessageResponse =
            serde_json::from_str(r#"{"ok": false, "error": "channel_not_found"}"#).unwrap();
        assert!(!err.ok);
        assert_eq!(err.error.as_deref(), Some("channel_not_found"));
    }

    #[test]
    fn test_transient_classification() {
        assert!(SlackError::Api("ratelimited".to_string()).is_transient());
        assert!(!SlackError::Api("channel_not_found".to_string()).is_transient());
        assert!(!SlackError::Api("invalid_auth".to_string()).is_transient());
    }
}
