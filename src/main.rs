use anyhow::Result;
use clap::Parser;
use gmail_organizer::auth::CredentialStore;
use gmail_organizer::cli::{self, Cli, Commands, RunOptions};
use gmail_organizer::client::GmailClient;
use gmail_organizer::config::Config;
use gmail_organizer::error::GmailError;
use indicatif::MultiProgress;
use std::io::Write;
use std::process;
use std::sync::{Arc, Mutex};
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::EnvFilter;

/// Log writer that prints through MultiProgress so lines land above the bars
#[derive(Clone)]
struct ProgressAwareWriter {
    multi: Arc<MultiProgress>,
    pending: Arc<Mutex<Vec<u8>>>,
}

impl Write for ProgressAwareWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        if let Ok(mut pending) = self.pending.lock() {
            pending.extend_from_slice(buf);
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        let Ok(mut pending) = self.pending.lock() else {
            return Ok(());
        };
        let line = String::from_utf8_lossy(&pending).trim_end_matches('\n').to_string();
        pending.clear();
        if !line.is_empty() {
            self.multi.println(line)?;
        }
        Ok(())
    }
}

impl Drop for ProgressAwareWriter {
    fn drop(&mut self) {
        let _ = self.flush();
    }
}

#[derive(Clone)]
struct ProgressAwareMakeWriter {
    multi: Arc<MultiProgress>,
}

impl<'a> MakeWriter<'a> for ProgressAwareMakeWriter {
    type Writer = ProgressAwareWriter;

    fn make_writer(&'a self) -> Self::Writer {
        ProgressAwareWriter {
            multi: Arc::clone(&self.multi),
            pending: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        display_error(&e);
        process::exit(1);
    }
}

async fn run() -> Result<()> {
    // aws-lc-rs everywhere except Windows, where ring avoids the NASM/CMake build
    #[cfg(not(windows))]
    rustls::crypto::aws_lc_rs::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("Failed to install default crypto provider"))?;

    #[cfg(windows)]
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("Failed to install default crypto provider"))?;

    let cli = Cli::parse();

    let default_filter = if cli.verbose {
        "gmail_organizer=debug,warn"
    } else {
        "gmail_organizer=info,warn"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    let multi_progress = Arc::new(MultiProgress::new());
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(ProgressAwareMakeWriter {
            multi: Arc::clone(&multi_progress),
        })
        .with_target(false)
        .init();

    match cli.command {
        Commands::Auth { force } => {
            let store = CredentialStore::new(&cli.credentials, &cli.token_cache);
            if force && store.forget().await? {
                tracing::info!("Removed existing token cache");
            }

            let client = cli::connect(&cli).await?;
            println!("Successfully authenticated with Gmail API");
            println!("Token cached at: {:?}", cli.token_cache);
            println!("Connected to account: {}", client.account_email().await?);
            Ok(())
        }

        Commands::Run {
            max_messages,
            ref rule_set,
            ref query,
            dry_run,
        } => {
            if dry_run {
                println!("Running in DRY RUN mode - no changes will be made");
            }
            let options = RunOptions {
                max_messages,
                rule_set: rule_set.clone(),
                query: query.clone(),
                dry_run,
            };

            let report = cli::run_pipeline(&cli, &options, (*multi_progress).clone()).await?;
            println!("{}", report.summary());
            Ok(())
        }

        Commands::Labels => {
            let client = cli::connect(&cli).await?;
            let mut labels = client.list_labels().await?;
            labels.sort_by(|a, b| a.name.to_lowercase().cmp(&b.name.to_lowercase()));

            println!("{} labels:", labels.len());
            for label in labels {
                println!("  {:<40} {}", label.name, label.id);
            }
            Ok(())
        }

        Commands::Rules { ref rule_set } => {
            let config = Config::load(&cli.config).await?;
            let name = rule_set.as_deref().unwrap_or(&config.organizer.rule_set);
            // builds the set so invalid rules are reported here too
            config.rule_set(Some(name))?;

            println!("Rule set '{}':", name);
            for rule in config.rule_sets.get(name).into_iter().flatten() {
                println!("  {:<20} <- {}", rule.label, rule.matcher);
            }
            Ok(())
        }

        Commands::InitConfig { ref output, force } => {
            if output.exists() && !force {
                return Err(GmailError::ConfigError(format!(
                    "Configuration file already exists at {:?}. Use --force to overwrite.",
                    output
                ))
                .into());
            }

            Config::create_example(output).await?;
            println!("Created example configuration file at: {:?}", output);
            println!("\nKey settings to review:");
            println!("  - organizer.max_messages: How many recent messages a run looks at");
            println!("  - organizer.rule_set: Which entry of rule_sets to apply");
            println!("  - rule_sets.<name>: Label and sender-domain match of each rule");
            Ok(())
        }
    }
}

/// Print the error chain plus a hint for the common setup failures
fn display_error(error: &anyhow::Error) {
    eprintln!("Error: {}", error);
    for cause in error.chain().skip(1) {
        eprintln!("  Caused by: {}", cause);
    }

    match error.downcast_ref::<GmailError>() {
        Some(GmailError::AuthError(_)) => {
            eprintln!("\nHint: Make sure your credentials.json file is valid,");
            eprintln!("      or set GMAIL_CLIENT_ID and GMAIL_CLIENT_SECRET.");
            eprintln!("      Try running: gmail-organizer auth --force");
        }
        Some(GmailError::ConfigError(_)) => {
            eprintln!("\nHint: Check your configuration file for errors.");
            eprintln!("      Run: gmail-organizer init-config --force");
        }
        Some(GmailError::LabelError(_)) => {
            eprintln!("\nHint: Labels could not be listed or created; no message was changed.");
        }
        _ => {}
    }
}
