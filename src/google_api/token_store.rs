//! Per-user OAuth token persistence.
//!
//! One JSON file per user key under the token directory (default
//! `~/.recapbot/google/`). Tokens are minted by the external consent flow;
//! this store only reads, rewrites (after refresh), and deletes them.

use std::path::PathBuf;

use super::{GoogleApiError, GoogleToken};

#[derive(Debug, Clone)]
pub struct TokenStore {
    dir: PathBuf,
}

impl TokenStore {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    /// Default token directory under the home directory.
    pub fn default_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_default()
            .join(".recapbot")
            .join("google")
    }

    /// Path of one user's token file. Keys are sanitized so Slack user ids
    /// and email addresses are both safe as file names.
    pub fn token_path(&self, user_key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", sanitize_key(user_key)))
    }

    pub fn load(&self, user_key: &str) -> Result<GoogleToken, GoogleApiError> {
        let path = self.token_path(user_key);
        if !path.exists() {
            return Err(GoogleApiError::TokenNotFound(path));
        }
        let content = std::fs::read_to_string(&path)?;
        let token: GoogleToken = serde_json::from_str(&content)?;
        Ok(token)
    }

    pub fn save(&self, user_key: &str, token: &GoogleToken) -> Result<(), GoogleApiError> {
        let path = self.token_path(user_key);

        if let Some(parent) = path.parent() {
            if !parent.exists() {
                std::fs::create_dir_all(parent)?;
                #[cfg(unix)]
                {
                    use std::os::unix::fs::PermissionsExt;
                    std::fs::set_permissions(parent, std::fs::Permissions::from_mode(0o700))?;
                }
            }
        }

        let content = serde_json::to_string_pretty(token)?;
        crate::util::atomic_write_str(&path, &content)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o600))?;
        }

        Ok(())
    }

    /// Remove a user's token. Missing file is not an error.
    pub fn delete(&self, user_key: &str) -> Result<(), GoogleApiError> {
        let path = self.token_path(user_key);
        if path.exists() {
            std::fs::remove_file(path)?;
        }
        Ok(())
    }
}

fn sanitize_key(key: &str) -> String {
    let cleaned: String = key
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
        .collect();
    let trimmed = cleaned.trim_matches('-');
    if trimmed.is_empty() {
        "default".to_string()
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_token() -> GoogleToken {
        GoogleToken {
            access_token: "ya29.sample".to_string(),
            refresh_token: Some("1//refresh".to_string()),
            expiry: Some("2026-09-01T12:00:00Z".to_string()),
            account: Some("user@example.com".to_string()),
        }
    }

    #[test]
    fn test_save_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = TokenStore::new(dir.path().to_path_buf());

        store.save("U12345", &sample_token()).unwrap();
        let loaded = store.load("U12345").unwrap();

        assert_eq!(loaded.access_token, "ya29.sample");
        assert_eq!(loaded.refresh_token.as_deref(), Some("1//refresh"));
    }

    #[test]
    fn test_load_missing_is_token_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = TokenStore::new(dir.path().to_path_buf());

        match store.load("U99999") {
            Err(GoogleApiError::TokenNotFound(path)) => {
                assert!(path.ends_with("U99999.json"));
            }
            other => panic!("expected TokenNotFound, got {:?}", other),
        }
    }

    #[test]
    fn test_delete_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = TokenStore::new(dir.path().to_path_buf());

        store.save("U12345", &sample_token()).unwrap();
        store.delete("U12345").unwrap();
        store.delete("U12345").unwrap();
        assert!(store.load("U12345").is_err());
    }

    #[test]
    fn test_sanitize_key_handles_emails_and_edge_cases() {
        assert_eq!(sanitize_key("U0ABC123"), "U0ABC123");
        assert_eq!(sanitize_key("user@example.com"), "user-example-com");
        assert_eq!(sanitize_key("../escape"), "escape");
        assert_eq!(sanitize_key(""), "default");
    }

    #[test]
    fn test_separate_users_have_separate_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = TokenStore::new(dir.path().to_path_buf());

        let mut other = sample_token();
        other.access_token = "ya29.other".to_string();

        store.save("U1", &sample_token()).unwrap();
        store.save("U2", &other).unwrap();

        assert_eq!(store.load("U1").unwrap().access_token, "ya29.sample");
        assert_eq!(store.load("U2").unwrap().access_token, "ya29.other");
    }
}
