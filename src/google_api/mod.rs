//! Google API plumbing shared by the Drive and Calendar clients.
//!
//! Direct HTTP via reqwest: OAuth token model, per-user token refresh
//! (serialized process-wide), and retry-with-backoff for transient failures.
//! Tokens are minted by an external consent flow and persisted per user by
//! the token store; this module only keeps them fresh.
//!
//! Modules:
//! - token_store: per-user token persistence
//! - drive: Drive API v3 (file metadata + transcript text)
//! - calendar: Calendar API v3 (windowed event listing)

pub mod calendar;
pub mod drive;
pub mod token_store;

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use token_store::TokenStore;

/// OAuth2 scopes the pipeline needs. Read-only on both surfaces.
pub const SCOPES: &[&str] = &[
    "https://www.googleapis.com/auth/drive.readonly",
    "https://www.googleapis.com/auth/calendar.readonly",
];

// ============================================================================
// Token types
// ============================================================================

/// OAuth2 token payload persisted per user via the token store.
///
/// `token` is accepted as an alias on read for tokens written by
/// google-auth-style tooling.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GoogleToken {
    #[serde(alias = "token")]
    pub access_token: String,
    /// Long-lived; used to mint new access tokens.
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Access-token expiry (RFC 3339).
    #[serde(default)]
    pub expiry: Option<String>,
    /// Authenticated account email, when the consent flow captured it.
    #[serde(default, alias = "email")]
    pub account: Option<String>,
}

/// OAuth2 web-application client credentials (one per deployment, from
/// config, never stored inside user tokens).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuthClient {
    pub client_id: String,
    pub client_secret: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

fn default_token_uri() -> String {
    "https://oauth2.googleapis.com/token".to_string()
}

// ============================================================================
// Error type
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum GoogleApiError {
    #[error("HTTP: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Token expired or revoked")]
    AuthExpired,
    #[error("Token not found at {0}")]
    TokenNotFound(PathBuf),
    #[error("Token refresh failed: {0}")]
    RefreshFailed(String),
    #[error("API error {status}: {message}")]
    ApiError { status: u16, message: String },
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Unexpected response: {0}")]
    UnexpectedResponse(String),
}

impl GoogleApiError {
    pub fn is_transient(&self) -> bool {
        match self {
            GoogleApiError::Http(e) => e.is_timeout() || e.is_connect(),
            GoogleApiError::ApiError { status, .. } => {
                *status == 429 || *status == 408 || *status >= 500
            }
            _ => false,
        }
    }
}

// ============================================================================
// Retry
// ============================================================================

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_ms: 250,
            max_backoff_ms: 2_000,
        }
    }
}

fn status_is_retryable(status: reqwest::StatusCode) -> bool {
    status == reqwest::StatusCode::TOO_MANY_REQUESTS
        || status == reqwest::StatusCode::REQUEST_TIMEOUT
        || status.is_server_error()
}

fn retry_delay(
    attempt: u32,
    policy: &RetryPolicy,
    retry_after: Option<&reqwest::header::HeaderValue>,
) -> Duration {
    // Server-provided Retry-After wins, capped so a hostile header can't
    // stall the pipeline.
    if let Some(value) = retry_after.and_then(|v| v.to_str().ok()) {
        if let Ok(secs) = value.parse::<u64>() {
            return Duration::from_secs(secs.min(30));
        }
    }

    let exponent = 2u64.saturating_pow(attempt.saturating_sub(1));
    let base = policy
        .initial_backoff_ms
        .saturating_mul(exponent)
        .min(policy.max_backoff_ms);
    let jitter = (std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.subsec_nanos() as u64)
        .unwrap_or(0))
        % 150;
    Duration::from_millis(base.saturating_add(jitter))
}

/// Send a request, retrying transient failures (429/408/5xx and transport
/// timeouts/connect errors) with exponential backoff. Non-retryable responses
/// are returned as-is for the caller to interpret.
pub async fn send_with_retry(
    request: reqwest::RequestBuilder,
    policy: &RetryPolicy,
) -> Result<reqwest::Response, GoogleApiError> {
    let attempts = policy.max_attempts.max(1);
    for attempt in 1..=attempts {
        // Streaming bodies can't be cloned; send those once, unretried.
        let Some(cloned) = request.try_clone() else {
            return request.send().await.map_err(GoogleApiError::Http);
        };

        match cloned.send().await {
            Ok(response) => {
                let status = response.status();
                if status_is_retryable(status) && attempt < attempts {
                    let delay = retry_delay(
                        attempt,
                        policy,
                        response.headers().get(reqwest::header::RETRY_AFTER),
                    );
                    log::warn!(
                        "Google API: retry {}/{} after status {} (sleep {:?})",
                        attempt,
                        attempts,
                        status,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    continue;
                }
                return Ok(response);
            }
            Err(err) => {
                if (err.is_timeout() || err.is_connect()) && attempt < attempts {
                    let delay = retry_delay(attempt, policy, None);
                    log::warn!(
                        "Google API: retry {}/{} after transport error: {} (sleep {:?})",
                        attempt,
                        attempts,
                        err,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    continue;
                }
                return Err(GoogleApiError::Http(err));
            }
        }
    }

    Err(GoogleApiError::RefreshFailed(
        "request exhausted retries".to_string(),
    ))
}

/// Map a non-2xx response to a typed error, reading the body for the message.
pub(crate) async fn error_for_response(resp: reqwest::Response) -> GoogleApiError {
    let status = resp.status();
    if status == reqwest::StatusCode::UNAUTHORIZED {
        return GoogleApiError::AuthExpired;
    }
    let message = resp.text().await.unwrap_or_default();
    GoogleApiError::ApiError {
        status: status.as_u16(),
        message,
    }
}

// ============================================================================
// Token refresh
// ============================================================================

/// Global mutex to serialize concurrent token refreshes.
static TOKEN_REFRESH_MUTEX: std::sync::OnceLock<Mutex<()>> = std::sync::OnceLock::new();

fn refresh_mutex() -> &'static Mutex<()> {
    TOKEN_REFRESH_MUTEX.get_or_init(|| Mutex::new(()))
}

/// Shared client for all Google endpoints, with the crate-wide request
/// timeout baked in.
static HTTP: std::sync::OnceLock<reqwest::Client> = std::sync::OnceLock::new();

pub(crate) fn http() -> &'static reqwest::Client {
    HTTP.get_or_init(crate::util::http_client)
}

/// Check if a token is expired based on its expiry field.
///
/// A token within 60 seconds of expiry counts as expired so in-flight
/// requests don't outlive it.
pub fn is_token_expired(token: &GoogleToken) -> bool {
    match &token.expiry {
        None => true, // No expiry = assume expired, try refresh
        Some(expiry_str) => {
            match chrono::DateTime::parse_from_rfc3339(&expiry_str.replace('Z', "+00:00"))
                .or_else(|_| chrono::DateTime::parse_from_rfc3339(expiry_str))
            {
                Ok(expiry) => expiry <= chrono::Utc::now() + chrono::Duration::seconds(60),
                Err(_) => true, // Can't parse = assume expired
            }
        }
    }
}

/// Token source for the Drive/Calendar clients: loads a user's token from the
/// store and refreshes it when stale.
#[derive(Debug, Clone)]
pub struct GoogleAuth {
    oauth: OAuthClient,
    store: TokenStore,
}

impl GoogleAuth {
    pub fn new(oauth: OAuthClient, store: TokenStore) -> Self {
        Self { oauth, store }
    }

    /// Get a valid access token for `user_key`, refreshing if expired.
    ///
    /// This is the entry point for all Google API calls.
    pub async fn access_token(&self, user_key: &str) -> Result<String, GoogleApiError> {
        let token = self.store.load(user_key)?;
        if !is_token_expired(&token) {
            return Ok(token.access_token);
        }
        let refreshed = self.refresh(user_key, &token).await?;
        Ok(refreshed.access_token)
    }

    async fn refresh(
        &self,
        user_key: &str,
        token: &GoogleToken,
    ) -> Result<GoogleToken, GoogleApiError> {
        let _guard = refresh_mutex().lock().await;

        // Another task may have refreshed this user while we waited.
        if let Ok(current) = self.store.load(user_key) {
            if !is_token_expired(&current) {
                return Ok(current);
            }
        }

        let refresh_token = token
            .refresh_token
            .as_deref()
            .ok_or(GoogleApiError::AuthExpired)?;

        let client = http();
        let form = [
            ("client_id", self.oauth.client_id.as_str()),
            ("client_secret", self.oauth.client_secret.as_str()),
            ("refresh_token", refresh_token),
            ("grant_type", "refresh_token"),
        ];
        let resp = client.post(&self.oauth.token_uri).form(&form).send().await?;
        let status = resp.status();
        let body_text = resp.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(map_refresh_error(status.as_u16(), &body_text));
        }

        let body: serde_json::Value = serde_json::from_str(&body_text)?;
        let access_token = body["access_token"]
            .as_str()
            .ok_or_else(|| GoogleApiError::RefreshFailed("no access_token in response".into()))?;
        let expires_in = body["expires_in"].as_u64().unwrap_or(3600);
        let expiry = chrono::Utc::now() + chrono::Duration::seconds(expires_in as i64);

        let mut refreshed = token.clone();
        refreshed.access_token = access_token.to_string();
        refreshed.expiry = Some(expiry.to_rfc3339());
        self.store.save(user_key, &refreshed)?;

        log::info!("Google auth: refreshed access token for user {}", user_key);
        Ok(refreshed)
    }
}

fn map_refresh_error(status: u16, body: &str) -> GoogleApiError {
    let lowered = body.to_lowercase();
    if (status == 400 || status == 401)
        && (lowered.contains("invalid_grant") || lowered.contains("token has been expired"))
    {
        return GoogleApiError::AuthExpired;
    }
    GoogleApiError::RefreshFailed(format!("HTTP {}: {}", status, body))
}

// ============================================================================
// Timestamps
// ============================================================================

/// Parse a Google timestamp to UTC.
///
/// Google emits either RFC 3339 datetimes (with `Z` or an offset) or bare
/// dates for all-day events; dates parse as midnight UTC.
pub fn parse_datetime_utc(s: &str) -> Option<chrono::DateTime<chrono::Utc>> {
    if s.is_empty() {
        return None;
    }
    if s.contains('T') {
        chrono::DateTime::parse_from_rfc3339(&s.replace('Z', "+00:00"))
            .or_else(|_| chrono::DateTime::parse_from_rfc3339(s))
            .ok()
            .map(|dt| dt.with_timezone(&chrono::Utc))
    } else {
        chrono::NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .ok()
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .map(|dt| chrono::DateTime::from_naive_utc_and_offset(dt, chrono::Utc))
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn token(expiry: Option<String>) -> GoogleToken {
        GoogleToken {
            access_token: "ya29.test".to_string(),
            refresh_token: Some("1//refresh".to_string()),
            expiry,
            account: Some("user@example.com".to_string()),
        }
    }

    #[test]
    fn test_token_roundtrip() {
        let original = token(Some("2026-09-01T12:00:00Z".to_string()));
        let json = serde_json::to_string_pretty(&original).unwrap();
        let parsed: GoogleToken = serde_json::from_str(&json).unwrap();

        assert_eq!(parsed.access_token, "ya29.test");
        assert_eq!(parsed.refresh_token.as_deref(), Some("1//refresh"));
        assert_eq!(parsed.account.as_deref(), Some("user@example.com"));
    }

    #[test]
    fn test_token_accepts_google_auth_field_names() {
        // google-auth tooling writes "token", not "access_token"
        let json = r#"{
            "token": "ya29.alias",
            "refresh_token": "1//refresh",
            "expiry": "2026-09-01T12:00:00.000000Z",
            "email": "user@company.com"
        }"#;

        let parsed: GoogleToken = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.access_token, "ya29.alias");
        assert_eq!(parsed.account.as_deref(), Some("user@company.com"));
    }

    #[test]
    fn test_is_token_expired_no_expiry() {
        assert!(is_token_expired(&token(None)));
    }

    #[test]
    fn test_is_token_expired_past() {
        let past = chrono::Utc::now() - chrono::Duration::hours(1);
        assert!(is_token_expired(&token(Some(past.to_rfc3339()))));
    }

    #[test]
    fn test_is_token_expired_within_skew_window() {
        // 30s out is inside the 60s skew window, so it counts as expired
        let soon = chrono::Utc::now() + chrono::Duration::seconds(30);
        assert!(is_token_expired(&token(Some(soon.to_rfc3339()))));
    }

    #[test]
    fn test_is_token_expired_future() {
        let future = chrono::Utc::now() + chrono::Duration::hours(1);
        assert!(!is_token_expired(&token(Some(future.to_rfc3339()))));
    }

    #[test]
    fn test_status_is_retryable_classification() {
        assert!(status_is_retryable(reqwest::StatusCode::TOO_MANY_REQUESTS));
        assert!(status_is_retryable(reqwest::StatusCode::BAD_GATEWAY));
        assert!(status_is_retryable(reqwest::StatusCode::REQUEST_TIMEOUT));
        assert!(!status_is_retryable(reqwest::StatusCode::NOT_FOUND));
        assert!(!status_is_retryable(reqwest::StatusCode::UNAUTHORIZED));
    }

    #[test]
    fn test_retry_delay_honors_retry_after_with_cap() {
        let policy = RetryPolicy::default();
        let header = reqwest::header::HeaderValue::from_static("2");
        assert_eq!(
            retry_delay(1, &policy, Some(&header)),
            Duration::from_secs(2)
        );

        let hostile = reqwest::header::HeaderValue::from_static("86400");
        assert_eq!(
            retry_delay(1, &policy, Some(&hostile)),
            Duration::from_secs(30)
        );
    }

    #[test]
    fn test_retry_delay_backoff_is_capped() {
        let policy = RetryPolicy::default();
        // Attempt 10 would be 250ms * 2^9 uncapped; cap + jitter < 2150ms.
        let delay = retry_delay(10, &policy, None);
        assert!(delay <= Duration::from_millis(policy.max_backoff_ms + 150));
    }

    #[test]
    fn test_map_refresh_error_invalid_grant_is_auth_expired() {
        let err = map_refresh_error(400, r#"{"error": "invalid_grant"}"#);
        assert!(matches!(err, GoogleApiError::AuthExpired));

        let err = map_refresh_error(500, "server exploded");
        assert!(matches!(err, GoogleApiError::RefreshFailed(_)));
    }

    #[test]
    fn test_parse_datetime_utc_offset_and_z() {
        use chrono::Timelike;

        let dt = parse_datetime_utc("2026-08-12T09:00:00-05:00").unwrap();
        assert_eq!(dt.hour(), 14);

        let dt = parse_datetime_utc("2026-08-12T14:00:00Z").unwrap();
        assert_eq!(dt.hour(), 14);
    }

    #[test]
    fn test_parse_datetime_utc_date_only_is_midnight() {
        use chrono::Timelike;

        let dt = parse_datetime_utc("2026-08-12").unwrap();
        assert_eq!(dt.hour(), 0);
    }

    #[test]
    fn test_parse_datetime_utc_empty_and_garbage() {
        assert!(parse_datetime_utc("").is_none());
        assert!(parse_datetime_utc("next tuesday").is_none());
    }
}
