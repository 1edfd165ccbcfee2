//! Drives a labeling run: pull messages, evaluate rules, apply labels

use futures::StreamExt;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::client::GmailClient;
use crate::error::Result;
use crate::label_registry::LabelMapping;
use crate::models::Message;
use crate::rules::RuleSet;
use crate::source::{MessageSource, SourceEvent};

/// Called with the running totals after every message
pub type ProgressCallback = Arc<dyn Fn(&ProcessingStats) + Send + Sync>;

/// Where a run currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    Idle,
    Fetching,
    Evaluating,
    Labeling,
    Skipping,
    Done,
}

impl fmt::Display for RunPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RunPhase::Idle => "idle",
            RunPhase::Fetching => "fetching",
            RunPhase::Evaluating => "evaluating",
            RunPhase::Labeling => "labeling",
            RunPhase::Skipping => "skipping",
            RunPhase::Done => "done",
        };
        f.write_str(name)
    }
}

/// Counters for one run. Never persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProcessingStats {
    /// Messages that went through rule evaluation, including failed ones
    pub processed: usize,
    /// Messages without a payload
    pub skipped: usize,
    /// Processed messages that got (or in dry-run would get) labels
    pub labeled: usize,
    /// Processed messages whose labeling failed
    pub failed: usize,
    /// Whether the message listing failed part-way
    pub listing_failed: bool,
    /// Messages per applied label name
    pub label_counts: BTreeMap<String, usize>,
}

impl ProcessingStats {
    pub fn summary_line(&self) -> String {
        format!(
            "processed {} messages ({} labeled, {} failed), skipped {}",
            self.processed, self.labeled, self.failed, self.skipped
        )
    }
}

#[derive(Debug, Clone)]
pub struct OrganizerOptions {
    /// Evaluate and count, but never call modify
    pub dry_run: bool,
    /// Log running totals every this many processed messages
    pub progress_interval: usize,
}

impl Default for OrganizerOptions {
    fn default() -> Self {
        Self {
            dry_run: false,
            progress_interval: 10,
        }
    }
}

/// Per-run bookkeeping
struct RunState {
    phase: RunPhase,
    stats: ProcessingStats,
}

impl RunState {
    fn enter(&mut self, phase: RunPhase) {
        debug!("Run phase {} -> {}", self.phase, phase);
        self.phase = phase;
    }
}

pub struct Organizer {
    client: Arc<dyn GmailClient>,
    source: MessageSource,
    rules: RuleSet,
    mapping: LabelMapping,
    options: OrganizerOptions,
    on_progress: Option<ProgressCallback>,
}

impl Organizer {
    pub fn new(client: Arc<dyn GmailClient>, rules: RuleSet, mapping: LabelMapping) -> Self {
        Self {
            source: MessageSource::new(Arc::clone(&client)),
            client,
            rules,
            mapping,
            options: OrganizerOptions::default(),
            on_progress: None,
        }
    }

    pub fn with_options(mut self, options: OrganizerOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_query(mut self, query: Option<String>) -> Self {
        self.source = self.source.with_query(query);
        self
    }

    pub fn on_progress(mut self, callback: ProgressCallback) -> Self {
        self.on_progress = Some(callback);
        self
    }

    /// Process up to `limit` recent messages.
    ///
    /// Per-message failures are logged and counted; they never end the run.
    pub async fn run(&self, limit: usize) -> ProcessingStats {
        let mut state = RunState {
            phase: RunPhase::Idle,
            stats: ProcessingStats::default(),
        };

        info!(
            "Organizing up to {} messages with {} rules{}",
            limit,
            self.rules.len(),
            if self.options.dry_run { " (dry run)" } else { "" }
        );

        state.enter(RunPhase::Fetching);
        let mut events = self.source.fetch(limit);

        while let Some(event) = events.next().await {
            let message = match event {
                SourceEvent::Message(message) => message,
                SourceEvent::ListingFailed(e) => {
                    warn!("Message listing failed, continuing with what was listed: {}", e);
                    state.stats.listing_failed = true;
                    continue;
                }
            };

            self.handle(&mut state, message).await;

            if let Some(callback) = &self.on_progress {
                callback(&state.stats);
            }
            state.enter(RunPhase::Fetching);
        }

        state.enter(RunPhase::Done);
        info!("Run complete: {}", state.stats.summary_line());
        state.stats
    }

    async fn handle(&self, state: &mut RunState, message: Message) {
        if !message.is_structurally_valid() {
            state.enter(RunPhase::Skipping);
            debug!("Skipping message {}: no payload", message.id);
            state.stats.skipped += 1;
            return;
        }

        state.enter(RunPhase::Evaluating);
        let labels = self.rules.evaluate(&message);

        if !labels.is_empty() {
            state.enter(RunPhase::Labeling);
            match self.apply(&message, &labels).await {
                Ok(()) => {
                    state.stats.labeled += 1;
                    for label in &labels {
                        *state.stats.label_counts.entry(label.clone()).or_default() += 1;
                    }
                }
                Err(e) => {
                    warn!("Failed to label message {}: {}", message.id, e);
                    state.stats.failed += 1;
                }
            }
        } else {
            debug!("No rule matched message {}", message.id);
        }

        state.stats.processed += 1;
        if state.stats.processed % self.options.progress_interval.max(1) == 0 {
            info!("Progress: {}", state.stats.summary_line());
        }
    }

    /// One modify call carrying every matched label id
    async fn apply(&self, message: &Message, labels: &BTreeSet<String>) -> Result<()> {
        let label_ids = self.mapping.resolve(labels)?;

        if self.options.dry_run {
            info!("[dry run] would label message {} with {:?}", message.id, labels);
            return Ok(());
        }

        self.client.modify_message(&message.id, &label_ids).await?;
        debug!("Labeled message {} with {:?}", message.id, labels);
        Ok(())
    }
}
