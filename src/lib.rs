//! Gmail Organizer
//!
//! Labels the most recent messages of a Gmail account by sender domain.
//!
//! # Overview
//!
//! - **Authentication**: OAuth2 installed-app flow with a cached token
//! - **Sender extraction**: best-effort address and domain parsing of `From`
//! - **Rules**: named rule sets mapping sender domains to label names
//! - **Labels**: name to id resolution, creating missing labels idempotently
//! - **Organizer**: sequential fetch, evaluate, label loop with per-message
//!   error isolation
//!
//! # Example Usage
//!
//! ```no_run
//! use gmail_organizer::{auth::CredentialStore, cli, config::Config, ProductionGmailClient};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("config.toml".as_ref()).await?;
//!
//!     let hub = CredentialStore::new("credentials.json", ".gmail-organizer/token.json")
//!         .connect()
//!         .await?;
//!     let client = Arc::new(ProductionGmailClient::new(hub));
//!
//!     let report = cli::organize(client, &config, None).await?;
//!     println!("{}", report.summary());
//!     Ok(())
//! }
//! ```
//!
//! # Module Organization
//!
//! - [`auth`] - OAuth2 authentication and Gmail hub construction
//! - [`client`] - Gmail API client trait and retrying production client
//! - [`cli`] - Command-line interface and run orchestration
//! - [`config`] - Configuration file and rule set definitions
//! - [`error`] - Error types and result alias
//! - [`label_registry`] - Label name resolution and creation
//! - [`models`] - Message and label data structures
//! - [`organizer`] - The per-message labeling loop
//! - [`rules`] - Predicates, rules and rule sets
//! - [`sender`] - Sender address and domain extraction
//! - [`source`] - Lazy stream of recent messages

pub mod auth;
pub mod cli;
pub mod client;
pub mod config;
pub mod error;
pub mod label_registry;
pub mod models;
pub mod organizer;
pub mod rules;
pub mod sender;
pub mod source;

pub use error::{GmailError, Result};

pub use models::{Header, LabelInfo, Message, MessagePage, MessagePayload};

pub use client::{GmailClient, ListRequest, ProductionGmailClient};

pub use config::{Config, OrganizerConfig};

pub use rules::{default_rules, Classifier, Predicate, Rule, RuleConfig, RuleSet};

pub use label_registry::{EnsuredLabels, LabelMapping, LabelPlan, LabelRegistry};

pub use source::{MessageSource, SourceEvent};

pub use organizer::{Organizer, OrganizerOptions, ProcessingStats, RunPhase};

pub use cli::{Cli, Commands, ProgressReporter, Report, RunOptions};
