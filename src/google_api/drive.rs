//! Google Drive API v3: transcript file metadata and content.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{error_for_response, parse_datetime_utc, send_with_retry, GoogleApiError, RetryPolicy};

const DRIVE_FILES_URL: &str = "https://www.googleapis.com/drive/v3/files";

/// Meet saves transcripts as Google Docs; these must be exported, not
/// downloaded.
const GOOGLE_DOC_MIME: &str = "application/vnd.google-apps.document";

// ============================================================================
// API response types
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DriveFileRaw {
    #[serde(default)]
    id: String,
    #[serde(default)]
    name: String,
    created_time: Option<String>,
    #[serde(default)]
    mime_type: Option<String>,
}

// ============================================================================
// Public types
// ============================================================================

/// Normalized Drive file metadata.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DriveFile {
    pub id: String,
    pub name: String,
    pub created_time: DateTime<Utc>,
    pub mime_type: String,
}

// ============================================================================
// Drive API
// ============================================================================

/// Fetch metadata for one file.
pub async fn get_file_metadata(
    access_token: &str,
    file_id: &str,
) -> Result<DriveFile, GoogleApiError> {
    let client = super::http();
    let resp = send_with_retry(
        client
            .get(format!("{}/{}", DRIVE_FILES_URL, file_id))
            .bearer_auth(access_token)
            .query(&[
                ("fields", "id,name,createdTime,mimeType"),
                ("supportsAllDrives", "true"),
            ]),
        &RetryPolicy::default(),
    )
    .await?;

    if !resp.status().is_success() {
        return Err(error_for_response(resp).await);
    }

    let raw: DriveFileRaw = resp.json().await?;
    normalize_file(raw)
}

/// Fetch the transcript text for a file.
///
/// Google Docs are exported as `text/plain`; anything else is downloaded
/// directly with `alt=media`.
pub async fn fetch_file_text(
    access_token: &str,
    file: &DriveFile,
) -> Result<String, GoogleApiError> {
    let client = super::http();
    let request = if file.mime_type == GOOGLE_DOC_MIME {
        client
            .get(format!("{}/{}/export", DRIVE_FILES_URL, file.id))
            .bearer_auth(access_token)
            .query(&[("mimeType", "text/plain")])
    } else {
        client
            .get(format!("{}/{}", DRIVE_FILES_URL, file.id))
            .bearer_auth(access_token)
            .query(&[("alt", "media"), ("supportsAllDrives", "true")])
    };

    let resp = send_with_retry(request, &RetryPolicy::default()).await?;
    if !resp.status().is_success() {
        return Err(error_for_response(resp).await);
    }

    Ok(resp.text().await?)
}

fn normalize_file(raw: DriveFileRaw) -> Result<DriveFile, GoogleApiError> {
    let created_time = raw
        .created_time
        .as_deref()
        .and_then(parse_datetime_utc)
        .ok_or_else(|| {
            GoogleApiError::UnexpectedResponse(format!(
                "file {} has no usable createdTime",
                raw.id
            ))
        })?;

    Ok(DriveFile {
        id: raw.id,
        name: raw.name,
        created_time,
        mime_type: raw.mime_type.unwrap_or_default(),
    })
}
