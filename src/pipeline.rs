//! End-to-end recap flow: core processing, Gemini summary, and publication
//! to Slack and Notion.
//!
//! Every stage after the core is optional and failure-isolated: a missing or
//! failing stage records a message on the outcome and the run carries on.
//! `run` never returns an error; `stage_errors` and the embedded
//! `ProcessingResult` are the only failure signals.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use uuid::Uuid;

use crate::bridge::clean_transcript_title;
use crate::google_api::drive::{self, DriveFile};
use crate::google_api::{GoogleApiError, GoogleAuth};
use crate::notion::{NotionClient, RecapPage, RecapTask};
use crate::processor::MeetingTranscriptProcessor;
use crate::slack::SlackClient;
use crate::summarizer::{GeminiSummarizer, TranscriptSummary};
use crate::types::{ActionItem, ProcessingResult, ProcessingStatus, UserMappings};
use crate::util::name_from_email;

// ============================================================================
// Outcome
// ============================================================================

/// Everything one pipeline run produced.
#[derive(Debug, Clone, Serialize)]
pub struct RecapOutcome {
    pub result: ProcessingResult,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<TranscriptSummary>,
    /// Action items after owner assignment, in extraction order.
    pub actions: Vec<ActionItem>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub slack_ts: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notion_page_url: Option<String>,
    /// Failures from the fetch, summary, and publish stages. Core failures
    /// stay in `result.errors`.
    pub stage_errors: Vec<String>,
}

impl RecapOutcome {
    fn core_only(result: ProcessingResult) -> Self {
        Self {
            result,
            summary: None,
            actions: Vec::new(),
            slack_ts: None,
            notion_page_url: None,
            stage_errors: Vec::new(),
        }
    }
}

// ============================================================================
// Pipeline
// ============================================================================

struct SlackPublisher {
    client: SlackClient,
    channel: String,
}

struct NotionPublisher {
    client: NotionClient,
    database_id: String,
}

/// Orchestrates one transcript from file id to published recap.
pub struct RecapPipeline {
    processor: MeetingTranscriptProcessor,
    auth: Arc<GoogleAuth>,
    /// Token-store key for the Drive account that owns the transcripts.
    drive_user: String,
    summarizer: Option<GeminiSummarizer>,
    slack: Option<SlackPublisher>,
    notion: Option<NotionPublisher>,
}

impl RecapPipeline {
    pub fn new(
        processor: MeetingTranscriptProcessor,
        auth: Arc<GoogleAuth>,
        drive_user: impl Into<String>,
    ) -> Self {
        Self {
            processor,
            auth,
            drive_user: drive_user.into(),
            summarizer: None,
            slack: None,
            notion: None,
        }
    }

    pub fn with_summarizer(mut self, summarizer: GeminiSummarizer) -> Self {
        self.summarizer = Some(summarizer);
        self
    }

    pub fn with_slack(mut self, client: SlackClient, channel: impl Into<String>) -> Self {
        self.slack = Some(SlackPublisher {
            client,
            channel: channel.into(),
        });
        self
    }

    pub fn with_notion(mut self, client: NotionClient, database_id: impl Into<String>) -> Self {
        self.notion = Some(NotionPublisher {
            client,
            database_id: database_id.into(),
        });
        self
    }

    pub fn processor(&self) -> &MeetingTranscriptProcessor {
        &self.processor
    }

    /// Process one transcript and publish its recap.
    pub async fn run(&self, file_id: &str) -> RecapOutcome {
        let result = self.processor.process_transcript(file_id).await;
        let mut outcome = RecapOutcome::core_only(result);

        if outcome.result.status != ProcessingStatus::Completed {
            return outcome;
        }
        let Some(summarizer) = &self.summarizer else {
            return outcome;
        };

        let (file, transcript) = match self.fetch_transcript(file_id).await {
            Ok(fetched) => fetched,
            Err(e) => {
                log::warn!("Pipeline: transcript fetch failed for {}: {}", file_id, e);
                outcome
                    .stage_errors
                    .push(format!("Transcript fetch failed: {}", e));
                return outcome;
            }
        };

        let title = recap_title(&outcome.result, &file);
        let summary = match summarizer
            .summarize(&title, &outcome.result.participants, &transcript)
            .await
        {
            Ok(summary) => summary,
            Err(e) => {
                log::warn!("Pipeline: summarize failed for {}: {}", file_id, e);
                outcome.stage_errors.push(e.to_string());
                return outcome;
            }
        };
        log::debug!(
            "Pipeline: summarized {} ({} key points, {} actions)",
            file_id,
            summary.key_points.len(),
            summary.action_items.len()
        );

        let actions = self
            .processor
            .assign_action_owners(&summary.action_items, &outcome.result.user_mappings);

        if let Some(slack) = &self.slack {
            let text =
                render_slack_recap(&title, &summary, &actions, &outcome.result.user_mappings);
            match slack.client.post_message(&slack.channel, &text).await {
                Ok(ts) => {
                    log::info!("Pipeline: posted recap for {} to {}", file_id, slack.channel);
                    outcome.slack_ts = Some(ts);
                }
                Err(e) => {
                    log::warn!("Pipeline: Slack post failed for {}: {}", file_id, e);
                    outcome.stage_errors.push(e.to_string());
                }
            }
        }

        if let Some(notion) = &self.notion {
            let page = recap_page(&title, &summary, &actions, &outcome.result.user_mappings);
            match notion
                .client
                .create_recap_page(&notion.database_id, &page)
                .await
            {
                Ok(url) => {
                    log::info!("Pipeline: created recap page for {}: {}", file_id, url);
                    outcome.notion_page_url = Some(url);
                }
                Err(e) => {
                    log::warn!("Pipeline: Notion page failed for {}: {}", file_id, e);
                    outcome.stage_errors.push(e.to_string());
                }
            }
        }

        outcome.summary = Some(summary);
        outcome.actions = actions;
        outcome
    }

    /// Run the pipeline over a batch, keyed by file id like the core's batch
    /// API (duplicate ids overwrite, logged there as caller errors).
    ///
    /// Recaps publish to rate-limited chat APIs, so runs with a summarizer go
    /// one at a time. Without one, every run stops at the core anyway and the
    /// batch is handed to the core's worker pool.
    pub async fn run_batch(&self, file_ids: &[String]) -> HashMap<String, RecapOutcome> {
        let batch_id = Uuid::new_v4();
        log::info!(
            "Pipeline: batch {} starting ({} files)",
            batch_id,
            file_ids.len()
        );

        let outcomes: HashMap<String, RecapOutcome> = if self.summarizer.is_some() {
            let mut map = HashMap::with_capacity(file_ids.len());
            for file_id in file_ids {
                let outcome = self.run(file_id).await;
                if map.insert(file_id.clone(), outcome).is_some() {
                    log::warn!("Pipeline: duplicate file id in batch: {}", file_id);
                }
            }
            map
        } else {
            self.processor
                .batch_process_transcripts(file_ids)
                .await
                .into_iter()
                .map(|(id, result)| (id, RecapOutcome::core_only(result)))
                .collect()
        };

        let failed = outcomes
            .values()
            .filter(|o| o.result.status != ProcessingStatus::Completed)
            .count();
        log::info!(
            "Pipeline: batch {} finished ({} ok, {} failed)",
            batch_id,
            outcomes.len() - failed,
            failed
        );
        outcomes
    }

    async fn fetch_transcript(
        &self,
        file_id: &str,
    ) -> Result<(DriveFile, String), GoogleApiError> {
        let token = self.auth.access_token(&self.drive_user).await?;
        let file = drive::get_file_metadata(&token, file_id).await?;
        let text = drive::fetch_file_text(&token, &file).await?;
        Ok((file, text))
    }
}

// ============================================================================
// Rendering
// ============================================================================

/// Title for the recap: the matched meeting's title when there is one,
/// otherwise the transcript file name with Meet's decoration stripped.
fn recap_title(result: &ProcessingResult, file: &DriveFile) -> String {
    if let Some(meeting) = &result.meeting {
        return meeting.event.title.clone();
    }
    let cleaned = clean_transcript_title(&file.name);
    if cleaned.is_empty() {
        "Meeting recap".to_string()
    } else {
        cleaned
    }
}

/// Owner rendering for Slack: a mention when the directory resolved the
/// email, a readable name otherwise.
fn owner_mention(email: &str, mappings: &UserMappings) -> String {
    match mappings.slack.get(email) {
        Some(user) => format!("<@{}>", user.id),
        None => owner_display_name(email, mappings),
    }
}

/// Plain display name for an owner, for surfaces without mention tokens.
fn owner_display_name(email: &str, mappings: &UserMappings) -> String {
    mappings
        .notion
        .get(email)
        .or_else(|| mappings.slack.get(email))
        .map(|user| user.display_name.clone())
        .unwrap_or_else(|| name_from_email(email))
}

fn render_slack_recap(
    title: &str,
    summary: &TranscriptSummary,
    actions: &[ActionItem],
    mappings: &UserMappings,
) -> String {
    let mut lines: Vec<String> = vec![format!("*{}*", title)];
    if !mappings.slack_mentions.is_empty() {
        lines.push(mappings.slack_mentions.join(" "));
    }
    if !summary.summary.is_empty() {
        lines.push(String::new());
        lines.push(summary.summary.clone());
    }
    if !summary.key_points.is_empty() {
        lines.push(String::new());
        lines.push("*Key points*".to_string());
        for point in &summary.key_points {
            lines.push(format!("• {}", point));
        }
    }
    if !summary.decisions.is_empty() {
        lines.push(String::new());
        lines.push("*Decisions*".to_string());
        for decision in &summary.decisions {
            lines.push(format!("• {}", decision));
        }
    }
    if !actions.is_empty() {
        lines.push(String::new());
        lines.push("*Action items*".to_string());
        for action in actions {
            match action.assignee_email.as_deref() {
                Some(email) => lines.push(format!(
                    "• {} ({})",
                    action.task,
                    owner_mention(email, mappings)
                )),
                None => lines.push(format!("• {}", action.task)),
            }
        }
    }
    lines.join("\n")
}

fn recap_page(
    title: &str,
    summary: &TranscriptSummary,
    actions: &[ActionItem],
    mappings: &UserMappings,
) -> RecapPage {
    RecapPage {
        title: title.to_string(),
        summary: summary.summary.clone(),
        key_points: summary.key_points.clone(),
        decisions: summary.decisions.clone(),
        action_items: actions
            .iter()
            .map(|action| RecapTask {
                text: action.task.clone(),
                owner: action
                    .assignee_email
                    .as_deref()
                    .map(|email| owner_display_name(email, mappings)),
            })
            .collect(),
    }
}
