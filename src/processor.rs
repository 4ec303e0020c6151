//! Transcript processing orchestration.
//!
//! `MeetingTranscriptProcessor` composes the calendar bridge and the two
//! identity directories: it correlates a transcript file with its meeting,
//! resolves every participant against Slack and Notion, builds mention
//! tokens, assigns action-item owners, and tracks run statistics.
//!
//! The contract callers rely on: `process_transcript` always returns a
//! `ProcessingResult`. Collaborator failures land in `result.errors` with
//! `status = failed`, never as a propagated error. A file with no matching
//! calendar event is a recoverable gap (warning entry, still `completed`),
//! not a failure.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Semaphore;

use crate::bridge::CalendarBridge;
use crate::directory::{UserDirectory, UserMapping};
use crate::error::PipelineError;
use crate::stats::{RunStatistics, StatisticsSnapshot};
use crate::types::{ActionItem, ProcessingResult, ProcessingStatus, UserMappings};

/// Batch fan-out width when the caller doesn't pick one.
const DEFAULT_MAX_WORKERS: usize = 4;

/// How long `cleanup` waits for in-flight work before forcing shutdown.
const CLEANUP_DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

/// Construction-time feature switches.
#[derive(Debug, Clone)]
pub struct ProcessorOptions {
    /// Gates the calendar bridge. Disabled, every run takes the
    /// "meeting not found" path without any lookup.
    pub google_calendar_enabled: bool,
    /// Gates both identity directories.
    pub user_mapping_enabled: bool,
    /// Concurrent directory lookups and batch fan-out when set; fully
    /// sequential otherwise.
    pub parallel_processing: bool,
    /// Upper bound on concurrent files in a batch (minimum 1).
    pub max_workers: usize,
}

impl Default for ProcessorOptions {
    fn default() -> Self {
        Self {
            google_calendar_enabled: true,
            user_mapping_enabled: true,
            parallel_processing: true,
            max_workers: DEFAULT_MAX_WORKERS,
        }
    }
}

struct ProcessorInner {
    options: ProcessorOptions,
    calendar_bridge: Option<Arc<dyn CalendarBridge>>,
    slack_directory: Option<Arc<dyn UserDirectory>>,
    notion_directory: Option<Arc<dyn UserDirectory>>,
    stats: RunStatistics,
    /// Present only when `parallel_processing` is on.
    workers: Option<Arc<Semaphore>>,
    shutdown: AtomicBool,
}

/// The core orchestrator. Cheap to clone; clones share collaborators,
/// statistics, and the worker pool.
#[derive(Clone)]
pub struct MeetingTranscriptProcessor {
    inner: Arc<ProcessorInner>,
}

impl MeetingTranscriptProcessor {
    /// Wire up a processor. Collaborators whose feature flag is off are
    /// dropped here, so a disabled subsystem is absent, not merely unused.
    pub fn new(
        options: ProcessorOptions,
        calendar_bridge: Option<Arc<dyn CalendarBridge>>,
        slack_directory: Option<Arc<dyn UserDirectory>>,
        notion_directory: Option<Arc<dyn UserDirectory>>,
    ) -> Self {
        let options = ProcessorOptions {
            max_workers: options.max_workers.max(1),
            ..options
        };

        let calendar_bridge = calendar_bridge.filter(|_| options.google_calendar_enabled);
        let slack_directory = slack_directory.filter(|_| options.user_mapping_enabled);
        let notion_directory = notion_directory.filter(|_| options.user_mapping_enabled);

        let workers = options
            .parallel_processing
            .then(|| Arc::new(Semaphore::new(options.max_workers)));

        Self {
            inner: Arc::new(ProcessorInner {
                options,
                calendar_bridge,
                slack_directory,
                notion_directory,
                stats: RunStatistics::new(),
                workers,
                shutdown: AtomicBool::new(false),
            }),
        }
    }

    pub fn has_calendar_bridge(&self) -> bool {
        self.inner.calendar_bridge.is_some()
    }

    pub fn has_user_directories(&self) -> bool {
        self.inner.slack_directory.is_some() || self.inner.notion_directory.is_some()
    }

    // ========================================================================
    // Single-file processing
    // ========================================================================

    /// Process one transcript file. Never returns an error: `status` and
    /// `errors` on the result are the sole failure signal. Statistics are
    /// updated on every path, including rejection after `cleanup`.
    pub async fn process_transcript(&self, file_id: &str) -> ProcessingResult {
        let started = Instant::now();
        let mut result = ProcessingResult::started(file_id);

        if self.inner.shutdown.load(Ordering::SeqCst) {
            result
                .errors
                .push("Processor has been shut down".to_string());
            result.status = ProcessingStatus::Failed;
        } else {
            self.run(file_id, &mut result).await;
            if result.status == ProcessingStatus::InProgress {
                result.status = ProcessingStatus::Completed;
            }
        }

        let elapsed = started.elapsed();
        self.inner
            .stats
            .record(result.status == ProcessingStatus::Completed, elapsed);

        log::debug!(
            "Processor: processed {} in {:?}: {:?} ({} errors)",
            file_id,
            elapsed,
            result.status,
            result.errors.len()
        );
        result
    }

    /// Steps 2-6: meeting correlation, identity resolution, mention tokens.
    /// Pushes into `result` instead of returning errors; leaves `status`
    /// untouched unless something failed.
    async fn run(&self, file_id: &str, result: &mut ProcessingResult) {
        let meeting = match &self.inner.calendar_bridge {
            Some(bridge) => match bridge.find_meeting_with_participants(file_id).await {
                Ok(found) => found,
                Err(e) => {
                    log::warn!("Processor: calendar lookup failed for {}: {}", file_id, e);
                    result.errors.push(e.to_string());
                    result.status = ProcessingStatus::Failed;
                    return;
                }
            },
            None => None,
        };

        let Some(meeting) = meeting else {
            log::info!("Processor: no meeting matched file {}", file_id);
            result
                .errors
                .push(format!("Meeting not found for file ID: {}", file_id));
            return;
        };

        result.participants = meeting.participant_emails.clone();
        result.meeting = Some(meeting);

        if result.participants.is_empty() || !self.has_user_directories() {
            return;
        }

        let (slack, notion) = self.lookup_identities(&result.participants).await;
        record_lookup(
            slack,
            &mut result.user_mappings.slack,
            &mut result.errors,
            &mut result.status,
        );
        record_lookup(
            notion,
            &mut result.user_mappings.notion,
            &mut result.errors,
            &mut result.status,
        );

        let mentions: Vec<String> = result
            .participants
            .iter()
            .filter_map(|email| result.user_mappings.slack.get(email))
            .map(|user| format!("<@{}>", user.id))
            .collect();
        result.user_mappings.slack_mentions = mentions;
    }

    /// Resolve participants against both directories. The two lookups are
    /// independent; parallel mode joins them, sequential mode still attempts
    /// both so the final mappings are identical either way.
    async fn lookup_identities(
        &self,
        participants: &[String],
    ) -> (LookupOutcome, LookupOutcome) {
        let slack = self.inner.slack_directory.as_deref();
        let notion = self.inner.notion_directory.as_deref();

        if self.inner.options.parallel_processing {
            tokio::join!(
                lookup_one(slack, participants),
                lookup_one(notion, participants)
            )
        } else {
            (
                lookup_one(slack, participants).await,
                lookup_one(notion, participants).await,
            )
        }
    }

    // ========================================================================
    // Batch processing
    // ========================================================================

    /// Run `process_transcript` for every id, isolating per-file failure.
    /// The returned map has one entry per distinct id; ids are assumed
    /// unique, and a duplicate keeps only its last result.
    pub async fn batch_process_transcripts(
        &self,
        file_ids: &[String],
    ) -> HashMap<String, ProcessingResult> {
        let mut results = HashMap::with_capacity(file_ids.len());

        match &self.inner.workers {
            Some(workers) => {
                let mut handles = Vec::with_capacity(file_ids.len());
                for file_id in file_ids {
                    let processor = self.clone();
                    let pool = Arc::clone(workers);
                    let id = file_id.clone();
                    handles.push((
                        file_id.clone(),
                        tokio::spawn(async move {
                            // A closed pool means cleanup ran; fall through and
                            // let the shutdown check reject the call.
                            let _permit = pool.acquire().await.ok();
                            processor.process_transcript(&id).await
                        }),
                    ));
                }

                for (file_id, handle) in handles {
                    let result = match handle.await {
                        Ok(result) => result,
                        Err(e) => {
                            log::error!("Processor: task for {} died: {}", file_id, e);
                            let mut failed = ProcessingResult::started(&file_id);
                            failed.errors.push(e.to_string());
                            failed.status = ProcessingStatus::Failed;
                            failed
                        }
                    };
                    if results.insert(file_id.clone(), result).is_some() {
                        log::warn!("Processor: duplicate file id in batch: {}", file_id);
                    }
                }
            }
            None => {
                for file_id in file_ids {
                    let result = self.process_transcript(file_id).await;
                    if results.insert(file_id.clone(), result).is_some() {
                        log::warn!("Processor: duplicate file id in batch: {}", file_id);
                    }
                }
            }
        }

        results
    }

    // ========================================================================
    // Action ownership, statistics, shutdown
    // ========================================================================

    /// Annotate action items with Notion owners. Pure: returns new items,
    /// preserving order and every other field; inputs are never mutated.
    /// An assignee email with no Notion match leaves the item untouched.
    pub fn assign_action_owners(
        &self,
        actions: &[ActionItem],
        user_mappings: &UserMappings,
    ) -> Vec<ActionItem> {
        actions
            .iter()
            .map(|action| {
                let mut assigned = action.clone();
                if let Some(email) = &action.assignee_email {
                    if let Some(user) = user_mappings.notion.get(email) {
                        assigned.notion_user_id = Some(user.id.clone());
                        assigned.auto_assigned = true;
                    }
                }
                assigned
            })
            .collect()
    }

    /// Snapshot of the lifetime counters for this processor instance.
    pub fn get_statistics(&self) -> StatisticsSnapshot {
        self.inner.stats.snapshot()
    }

    /// Stop accepting work and wait (bounded) for in-flight batch tasks to
    /// drain. Idempotent; after the first call returns, every subsequent
    /// `process_transcript` yields a failed result.
    pub async fn cleanup(&self) {
        if self.inner.shutdown.swap(true, Ordering::SeqCst) {
            return;
        }

        if let Some(workers) = &self.inner.workers {
            let all = self.inner.options.max_workers as u32;
            match tokio::time::timeout(CLEANUP_DRAIN_TIMEOUT, workers.acquire_many(all)).await {
                Ok(Ok(_drained)) => log::debug!("Processor: drained cleanly"),
                Ok(Err(_closed)) => {}
                Err(_) => log::warn!(
                    "Processor: cleanup timed out after {:?} waiting for in-flight work",
                    CLEANUP_DRAIN_TIMEOUT
                ),
            }
            workers.close();
        }
    }
}

type LookupOutcome = Option<Result<UserMapping, PipelineError>>;

async fn lookup_one(directory: Option<&dyn UserDirectory>, emails: &[String]) -> LookupOutcome {
    match directory {
        Some(dir) => Some(dir.batch_lookup(emails).await),
        None => None,
    }
}

/// Fold one directory outcome into the result: a mapping on success, an
/// error entry plus failed status otherwise.
fn record_lookup(
    outcome: LookupOutcome,
    slot: &mut UserMapping,
    errors: &mut Vec<String>,
    status: &mut ProcessingStatus,
) {
    match outcome {
        Some(Ok(mapping)) => *slot = mapping,
        Some(Err(e)) => {
            errors.push(e.to_string());
            *status = ProcessingStatus::Failed;
        }
        None => {}
    }
}
