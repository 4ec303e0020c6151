//! Transcript summarization via the Gemini API.
//!
//! Produces a structured recap (summary, key points, decisions, action items)
//! from raw transcript text. The model is asked for JSON and the response is
//! parsed defensively since models occasionally wrap output in markdown
//! fences anyway.

use serde::{Deserialize, Serialize};

use crate::types::ActionItem;
use crate::util::http_client;

const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/models";
const DEFAULT_GEMINI_MODEL: &str = "gemini-1.5-flash";

/// Maximum transcript content sent to the model (covers ~75 min calls).
const MAX_PROMPT_CHARS: usize = 60_000;

/// Head portion kept under tail-biased truncation (attendee context, opening).
const HEAD_KEEP_CHARS: usize = 3_000;

/// Allowance for the elision marker spliced between head and tail.
const SPLICE_RESERVE: usize = 40;

#[derive(Debug, thiserror::Error)]
pub enum GeminiError {
    #[error("Gemini API request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Gemini API error {status}: {message}")]
    Api { status: u16, message: String },
    #[error("Gemini returned no usable text")]
    EmptyResponse,
    #[error("failed to parse summary from model output: {0}")]
    Parse(String),
}

impl GeminiError {
    /// Whether retrying the same call later could succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            GeminiError::Http(e) => e.is_timeout() || e.is_connect(),
            GeminiError::Api { status, .. } => *status == 429 || *status >= 500,
            GeminiError::EmptyResponse => true,
            GeminiError::Parse(_) => false,
        }
    }
}

/// Structured recap extracted from one transcript.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TranscriptSummary {
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub key_points: Vec<String>,
    #[serde(default)]
    pub decisions: Vec<String>,
    #[serde(default)]
    pub action_items: Vec<ActionItem>,
}

// ============================================================================
// API response types
// ============================================================================

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<CandidateRaw>,
}

#[derive(Debug, Deserialize)]
struct CandidateRaw {
    content: Option<ContentRaw>,
}

#[derive(Debug, Deserialize)]
struct ContentRaw {
    #[serde(default)]
    parts: Vec<PartRaw>,
}

#[derive(Debug, Deserialize)]
struct PartRaw {
    #[serde(default)]
    text: Option<String>,
}

fn response_text(resp: GenerateContentResponse) -> Option<String> {
    let content = resp.candidates.into_iter().next()?.content?;
    let mut text = String::new();
    for part in content.parts {
        if let Some(t) = part.text {
            text.push_str(&t);
        }
    }
    if text.trim().is_empty() {
        None
    } else {
        Some(text)
    }
}

// ============================================================================
// Summarizer
// ============================================================================

pub struct GeminiSummarizer {
    http: reqwest::Client,
    api_key: String,
    model: String,
}

impl GeminiSummarizer {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            http: http_client(),
            api_key: api_key.into(),
            model: DEFAULT_GEMINI_MODEL.to_string(),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Summarize one transcript. `participants` lets the model resolve
    /// spoken names ("Sarah will take that") to attendee emails.
    pub async fn summarize(
        &self,
        title: &str,
        participants: &[String],
        transcript: &str,
    ) -> Result<TranscriptSummary, GeminiError> {
        let prompt = build_prompt(title, participants, transcript);
        let body = serde_json::json!({
            "contents": [{ "parts": [{ "text": prompt }] }],
            "generationConfig": {
                "temperature": 0.2,
                "responseMimeType": "application/json"
            }
        });

        let url = format!("{}/{}:generateContent", GEMINI_API_BASE, self.model);
        let resp = self
            .http
            .post(url)
            .query(&[("key", self.api_key.as_str())])
            .json(&body)
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let message = resp.text().await.unwrap_or_default();
            return Err(GeminiError::Api { status, message });
        }

        let parsed: GenerateContentResponse = resp.json().await?;
        let text = response_text(parsed).ok_or(GeminiError::EmptyResponse)?;

        let json = extract_json(&text)
            .ok_or_else(|| GeminiError::Parse("no JSON object in model output".to_string()))?;
        serde_json::from_str(json).map_err(|e| GeminiError::Parse(e.to_string()))
    }
}

/// Build the recap prompt.
fn build_prompt(title: &str, participants: &[String], transcript: &str) -> String {
    let truncated = truncate_transcript(transcript);
    let title = if title.trim().is_empty() {
        "Untitled meeting"
    } else {
        title
    };
    let participant_line = if participants.is_empty() {
        String::new()
    } else {
        format!("Participants: {}\n", participants.join(", "))
    };

    format!(
        r#"You are writing a recap of a work meeting from its transcript.

Meeting: "{title}"
{participant_line}
Focus on the substantive discussion. Skip greetings, scheduling chatter,
and small talk at the start of the call.

Return ONLY a JSON object, with no other text before or after.
The JSON must conform exactly to this schema:

{{
  "summary": "2-3 sentence executive summary of outcomes, not a chronological recap",
  "key_points": ["substantive discussion point, one sentence each"],
  "decisions": ["explicit decision made, with the decider when identifiable"],
  "action_items": [
    {{"task": "concise imperative task, max 10 words", "assignee_email": "owner's email or null"}}
  ]
}}

Rules for action items:
- The task must be imperative: verb + object, not a description.
- Set "assignee_email" only when the owner is clearly one of the listed
  participants; otherwise use null. Never invent an email.
- If nothing was agreed, return an empty array.

Transcript:
{transcript}
"#,
        title = title,
        participant_line = participant_line,
        transcript = truncated,
    )
}

/// Cap transcript content with a tail-biased split.
///
/// Long calls bury the substance late in the file, so trimming keeps a short
/// head (attendee context, meeting opening) and spends the rest of the budget
/// on the tail.
fn truncate_transcript(content: &str) -> String {
    if content.len() <= MAX_PROMPT_CHARS {
        return content.to_string();
    }

    let mut head_end = HEAD_KEEP_CHARS;
    while !content.is_char_boundary(head_end) {
        head_end -= 1;
    }

    let mut tail_start = content.len() - (MAX_PROMPT_CHARS - head_end - SPLICE_RESERVE);
    while !content.is_char_boundary(tail_start) {
        tail_start += 1;
    }

    format!(
        "{}\n\n[... {} chars omitted ...]\n\n{}",
        &content[..head_end],
        tail_start - head_end,
        &content[tail_start..]
    )
}

/// Pull the JSON object out of a model response, tolerating markdown fences
/// and stray prose around it.
fn extract_json(response: &str) -> Option<&str> {
    if let Some(start) = response.find("```") {
        let after = start + 3;
        let body_start = match response[after..].find('\n') {
            Some(nl) => after + nl + 1,
            None => after,
        };
        if let Some(end) = response[body_start..].find("```") {
            let candidate = response[body_start..body_start + end].trim();
            if candidate.starts_with('{') {
                return Some(candidate);
            }
        }
    }

    let start = response.find('{')?;
    let end = response.rfind('}')?;
    if end > start {
        Some(response[start..=end].trim())
    } else {
        None
    }
}
