//! Command-line interface

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::auth::CredentialStore;
use crate::client::{GmailClient, ProductionGmailClient};
use crate::config::Config;
use crate::error::Result;
use crate::label_registry::{LabelMapping, LabelRegistry};
use crate::organizer::{Organizer, OrganizerOptions, ProcessingStats, ProgressCallback};

#[derive(Parser, Debug)]
#[command(name = "gmail-organizer")]
#[command(version = "0.1.0")]
#[command(about = "Label recent Gmail messages by sender domain", long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    pub config: PathBuf,

    /// Path to OAuth2 credentials file
    #[arg(long, default_value = "credentials.json")]
    pub credentials: PathBuf,

    /// Path to token cache file
    #[arg(long, default_value = ".gmail-organizer/token.json")]
    pub token_cache: PathBuf,

    /// Verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Authenticate with Gmail API
    Auth {
        /// Force re-authentication even if token exists
        #[arg(long)]
        force: bool,
    },

    /// Label the most recent messages according to a rule set
    Run {
        /// How many recent messages to look at (overrides config)
        #[arg(short = 'n', long)]
        max_messages: Option<u32>,

        /// Rule set to apply (overrides config)
        #[arg(short, long)]
        rule_set: Option<String>,

        /// Gmail search query narrowing which messages are listed
        #[arg(short, long)]
        query: Option<String>,

        /// Evaluate rules and report, but don't create labels or modify messages
        #[arg(long)]
        dry_run: bool,
    },

    /// List the labels in the account
    Labels,

    /// Show the rules of a rule set
    Rules {
        /// Rule set to show (defaults to the configured one)
        #[arg(short, long)]
        rule_set: Option<String>,
    },

    /// Generate example configuration file
    InitConfig {
        /// Path to create config file
        #[arg(short, long, default_value = "config.toml")]
        output: PathBuf,

        /// Overwrite existing file
        #[arg(long)]
        force: bool,
    },
}

/// Progress reporter using indicatif
pub struct ProgressReporter {
    multi: MultiProgress,
    spinner_style: ProgressStyle,
    bar_style: ProgressStyle,
}

impl ProgressReporter {
    /// Draw into an existing MultiProgress so log lines print above the bars
    pub fn with_multi_progress(multi: MultiProgress) -> Self {
        let spinner_style = ProgressStyle::default_spinner()
            .template("{spinner:.green} [{elapsed:>6}] {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_chars("⠁⠂⠄⡀⢀⠠⠐⠈ ");

        let bar_style = ProgressStyle::default_bar()
            .template("[{elapsed:>6}] {bar:40.cyan/blue} {pos:>5}/{len:5} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("##-");

        Self {
            multi,
            spinner_style,
            bar_style,
        }
    }

    pub fn add_spinner(&self, msg: &str) -> ProgressBar {
        let pb = self.multi.add(ProgressBar::new_spinner());
        pb.set_style(self.spinner_style.clone());
        pb.set_message(msg.to_string());
        pb.enable_steady_tick(Duration::from_millis(100));
        pb
    }

    pub fn add_progress_bar(&self, len: u64, msg: &str) -> ProgressBar {
        let pb = self.multi.add(ProgressBar::new(len));
        pb.set_style(self.bar_style.clone());
        pb.set_message(msg.to_string());
        pb
    }

    /// Finish a spinner and leave a check line in its place
    pub fn finish_spinner(&self, pb: &ProgressBar, msg: &str) {
        pb.finish_and_clear();
        let _ = self.multi.println(format!("  ✓ {}", msg));
    }
}

/// Command-line overrides for one run
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub max_messages: Option<u32>,
    pub rule_set: Option<String>,
    pub query: Option<String>,
    pub dry_run: bool,
}

impl RunOptions {
    /// Fold the overrides into `config` and re-validate it
    pub fn apply(&self, config: &mut Config) -> Result<()> {
        if let Some(max) = self.max_messages {
            config.organizer.max_messages = max;
        }
        if let Some(name) = &self.rule_set {
            config.organizer.rule_set = name.clone();
        }
        if self.query.is_some() {
            config.organizer.query = self.query.clone();
        }
        config.organizer.dry_run |= self.dry_run;
        config.validate()
    }
}

/// Outcome of one organizer run
#[derive(Debug, Clone)]
pub struct Report {
    pub run_id: String,
    pub rule_set: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub dry_run: bool,
    pub stats: ProcessingStats,
    /// Labels created in the account (or, in a dry run, that would be)
    pub labels_created: Vec<String>,
}

impl Report {
    pub fn duration_seconds(&self) -> i64 {
        (self.completed_at - self.started_at).num_seconds()
    }

    pub fn summary(&self) -> String {
        let mut out = String::new();
        out.push_str("\n========================================\n");
        if self.dry_run {
            out.push_str("Organizer Summary (DRY RUN, no changes made)\n");
        } else {
            out.push_str("Organizer Summary\n");
        }
        out.push_str("========================================\n");
        out.push_str(&format!("Run ID: {}\n", self.run_id));
        out.push_str(&format!("Rule set: {}\n", self.rule_set));
        out.push_str(&format!("Duration: {} seconds\n", self.duration_seconds()));
        out.push_str(&format!("Messages processed: {}\n", self.stats.processed));
        out.push_str(&format!("Messages skipped: {}\n", self.stats.skipped));
        out.push_str(&format!("Messages labeled: {}\n", self.stats.labeled));
        out.push_str(&format!("Messages failed: {}\n", self.stats.failed));

        let created = if self.dry_run { "Labels to create" } else { "Labels created" };
        if self.labels_created.is_empty() {
            out.push_str(&format!("{}: none\n", created));
        } else {
            out.push_str(&format!("{}: {}\n", created, self.labels_created.join(", ")));
        }

        for (label, count) in &self.stats.label_counts {
            out.push_str(&format!("  {}: {}\n", label, count));
        }
        if self.stats.listing_failed {
            out.push_str("Warning: message listing failed part-way; some messages were not seen\n");
        }
        out.push_str("========================================");
        out
    }
}

/// Build the Gmail client from the cached (or freshly obtained) credentials
pub async fn connect(cli: &Cli) -> Result<Arc<dyn GmailClient>> {
    let store = CredentialStore::new(&cli.credentials, &cli.token_cache);
    let hub = store.connect().await?;
    Ok(Arc::new(ProductionGmailClient::new(hub)))
}

/// Resolve labels and organize messages with an already connected client.
///
/// Label listing or creation failures abort before any message is touched.
pub async fn organize(
    client: Arc<dyn GmailClient>,
    config: &Config,
    progress: Option<ProgressCallback>,
) -> Result<Report> {
    let started_at = Utc::now();
    let run_id = uuid::Uuid::new_v4().to_string();
    let settings = &config.organizer;

    let rules = config.rule_set(None)?;
    let wanted: BTreeSet<String> = rules.label_names();
    info!(
        "Starting run {} with rule set '{}' ({} labels)",
        run_id,
        settings.rule_set,
        wanted.len()
    );

    let registry = LabelRegistry::new(Arc::clone(&client));
    let (mapping, labels_created) = if settings.dry_run {
        let plan = registry.plan(&wanted).await?;
        // placeholder ids so resolution succeeds; nothing is sent in a dry run
        let mapping: LabelMapping = plan
            .existing
            .iter()
            .chain(plan.missing.iter())
            .map(|name| crate::models::LabelInfo {
                id: format!("planned:{}", name),
                name: name.clone(),
            })
            .collect();
        (mapping, plan.missing)
    } else {
        let ensured = registry.ensure(&wanted).await?;
        (ensured.mapping, ensured.created)
    };

    let mut organizer = Organizer::new(Arc::clone(&client), rules, mapping)
        .with_query(settings.query.clone())
        .with_options(OrganizerOptions {
            dry_run: settings.dry_run,
            progress_interval: settings.progress_interval,
        });
    if let Some(callback) = progress {
        organizer = organizer.on_progress(callback);
    }

    let stats = organizer.run(settings.max_messages as usize).await;

    Ok(Report {
        run_id,
        rule_set: settings.rule_set.clone(),
        started_at,
        completed_at: Utc::now(),
        dry_run: settings.dry_run,
        stats,
        labels_created,
    })
}

/// Full `run` command: configuration, authentication, labels, messages
pub async fn run_pipeline(cli: &Cli, options: &RunOptions, multi: MultiProgress) -> Result<Report> {
    let reporter = ProgressReporter::with_multi_progress(multi);

    let config_spinner = reporter.add_spinner("Loading configuration...");
    let mut config = Config::load(&cli.config).await?;
    options.apply(&mut config)?;
    reporter.finish_spinner(
        &config_spinner,
        &format!("Configuration loaded (rule set '{}')", config.organizer.rule_set),
    );

    let auth_spinner = reporter.add_spinner("Authenticating with Gmail API...");
    let client = connect(cli).await?;
    reporter.finish_spinner(&auth_spinner, "Gmail API authenticated");

    let bar = reporter.add_progress_bar(
        config.organizer.max_messages as u64,
        "Organizing messages...",
    );
    let tick = bar.clone();
    let progress: ProgressCallback = Arc::new(move |stats: &ProcessingStats| {
        tick.set_position((stats.processed + stats.skipped) as u64);
    });

    let report = organize(client, &config, Some(progress)).await;
    bar.finish_and_clear();
    let report = report?;

    reporter.finish_spinner(&bar, &report.stats.summary_line());
    Ok(report)
}
