//! Slack request signature verification (`v0` signing scheme).
//!
//! Slack signs each request as `v0=HEX(HMAC_SHA256(secret, "v0:{ts}:{body}"))`
//! and sends the signature and timestamp in headers. Verification is
//! constant-time and rejects stale timestamps to stop replays.

use chrono::Utc;
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Requests whose own timestamp is further than this from now are rejected.
const MAX_TIMESTAMP_SKEW_SECS: i64 = 60 * 5;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SignatureError {
    #[error("request timestamp is stale or malformed")]
    StaleTimestamp,
    #[error("signature mismatch")]
    Mismatch,
}

/// Compute the `X-Slack-Signature` value for a request body.
pub fn compute_signature(signing_secret: &str, timestamp: &str, body: &str) -> Option<String> {
    let mut mac = HmacSha256::new_from_slice(signing_secret.as_bytes()).ok()?;
    mac.update(format!("v0:{}:{}", timestamp, body).as_bytes());
    Some(format!("v0={}", hex::encode(mac.finalize().into_bytes())))
}

/// Verify an inbound Slack request against the signing secret.
///
/// `timestamp` and `signature` come from the `X-Slack-Request-Timestamp` and
/// `X-Slack-Signature` headers; `body` is the raw request body, before any
/// JSON parsing.
pub fn verify_signature(
    signing_secret: &str,
    timestamp: &str,
    body: &str,
    signature: &str,
) -> Result<(), SignatureError> {
    let ts: i64 = timestamp
        .trim()
        .parse()
        .map_err(|_| SignatureError::StaleTimestamp)?;
    if (Utc::now().timestamp() - ts).abs() > MAX_TIMESTAMP_SKEW_SECS {
        return Err(SignatureError::StaleTimestamp);
    }

    let hex_part = signature
        .strip_prefix("v0=")
        .ok_or(SignatureError::Mismatch)?;
    let expected = hex::decode(hex_part).map_err(|_| SignatureError::Mismatch)?;

    let mut mac = HmacSha256::new_from_slice(signing_secret.as_bytes())
        .map_err(|_| SignatureError::Mismatch)?;
    mac.update(format!("v0:{}:{}", timestamp, body).as_bytes());
    mac.verify_slice(&expected)
        .map_err(|_| SignatureError::Mismatch)
}

#[cfg(test)]
mod tests {
    use super::*;

    // Worked example from Slack's signing documentation.
    const DOC_SECRET: &str = "8f742231b10e8888abcd99yyyzzz85a5";
    const DOC_TIMESTAMP: &str = "1531420618";
    const DOC_BODY: &str = "token=xyzz0WbapA4vBCDEFasx0q6G&team_id=T1DC2JH3J&team_domain=testteamnow&channel_id=G8PSS9T3V&channel_name=foobar&user_id=U2CERLKJA&user_name=roadhog&command=%2Fwebhook-collect&text=&response_url=https%3A%2F%2Fhooks.slack.com%2Fcommands%2FT1DC2JH3J%2F397700885554%2F96rGlfmib4rB0VUwCvoNueyb&trigger_id=398738663015.47445629121.803a0bc887a14d10d2c447fce8b6703c";
    const DOC_SIGNATURE: &str =
        "v0=a2114d57b48eac39b9ad189dd8316235a7b4a8d21a10bd27519666489c69b503";

    #[test]
    fn test_compute_matches_slack_documented_example() {
        let sig = compute_signature(DOC_SECRET, DOC_TIMESTAMP, DOC_BODY).unwrap();
        assert_eq!(sig, DOC_SIGNATURE);
    }

    #[test]
    fn test_verify_round_trip_with_fresh_timestamp() {
        let ts = Utc::now().timestamp().to_string();
        let body = r#"{"type":"event_callback"}"#;
        let sig = compute_signature("secret", &ts, body).unwrap();

        assert_eq!(verify_signature("secret", &ts, body, &sig), Ok(()));
    }

    #[test]
    fn test_verify_rejects_tampered_body() {
        let ts = Utc::now().timestamp().to_string();
        let sig = compute_signature("secret", &ts, "original").unwrap();

        assert_eq!(
            verify_signature("secret", &ts, "tampered", &sig),
            Err(SignatureError::Mismatch)
        );
    }

    #[test]
    fn test_verify_rejects_wrong_secret() {
        let ts = Utc::now().timestamp().to_string();
        let sig = compute_signature("secret", &ts, "body").unwrap();

        assert_eq!(
            verify_signature("other-secret", &ts, "body", &sig),
            Err(SignatureError::Mismatch)
        );
    }

    #[test]
    fn test_verify_rejects_stale_timestamp() {
        let ts = (Utc::now().timestamp() - 600).to_string();
        let sig = compute_signature("secret", &ts, "body").unwrap();

        assert_eq!(
            verify_signature("secret", &ts, "body", &sig),
            Err(SignatureError::StaleTimestamp)
        );
    }

    #[test]
    fn test_verify_rejects_malformed_inputs() {
        let ts = Utc::now().timestamp().to_string();

        assert_eq!(
            verify_signature("secret", "not-a-number", "body", "v0=abcd"),
            Err(SignatureError::StaleTimestamp)
        );
        assert_eq!(
            verify_signature("secret", &ts, "body", "missing-prefix"),
            Err(SignatureError::Mismatch)
        );
        assert_eq!(
            verify_signature("secret", &ts, "body", "v0=not-hex!"),
            Err(SignatureError::Mismatch)
        );
    }
}
