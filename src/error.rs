//! Crate-wide error type.
//!
//! Each collaborator module owns a typed error (GoogleApiError, SlackError,
//! NotionError, GeminiError); `PipelineError` wraps them so the collaborator
//! traits and the pipeline deal with one type. The processor never surfaces
//! these to its caller; it stringifies them into `ProcessingResult.errors`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Google API: {0}")]
    Google(#[from] crate::google_api::GoogleApiError),

    #[error("Slack API: {0}")]
    Slack(#[from] crate::slack::SlackError),

    #[error("Notion API: {0}")]
    Notion(#[from] crate::notion::NotionError),

    #[error("Gemini: {0}")]
    Gemini(#[from] crate::summarizer::GeminiError),

    #[error("Config error: {0}")]
    Config(String),

    /// Collaborator failure with no richer structure. Displays the message
    /// verbatim so it lands in `ProcessingResult.errors` untouched.
    #[error("{0}")]
    Collaborator(String),
}

impl PipelineError {
    /// Returns true if a retry without operator intervention could succeed.
    ///
    /// The HTTP clients already retry transient statuses internally; this
    /// classification is for callers that requeue whole files.
    pub fn is_transient(&self) -> bool {
        match self {
            PipelineError::Google(e) => e.is_transient(),
            PipelineError::Slack(e) => e.is_transient(),
            PipelineError::Notion(e) => e.is_transient(),
            PipelineError::Gemini(e) => e.is_transient(),
            PipelineError::Config(_) => false,
            PipelineError::Collaborator(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collaborator_error_displays_message_verbatim() {
        let err = PipelineError::Collaborator("Test error".to_string());
        assert_eq!(err.to_string(), "Test error");
    }

    #[test]
    fn test_config_error_is_not_transient() {
        let err = PipelineError::Config("missing slack.botToken".to_string());
        assert!(!err.is_transient());
    }
}
