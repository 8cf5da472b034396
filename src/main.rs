//! # Docintel - Document Intelligence Host
//!
//! Boots the core, plugs in the built-in features and ingests files.
//!
//! ## Quick Start
//!
//! ```bash
//! # Ingest a document
//! cargo run -- path/to/report.pdf
//!
//! # Use a throwaway store and change a setting
//! cargo run -- --memory --set theme=dark notes.txt
//! ```

use std::path::PathBuf;
use std::rc::Rc;

use clap::Parser;
use serde_json::Value;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use docintel_core::{BackendKind, Config, CoreApi, Event, EventKind, FileHandle, Severity, Subscription};
use docintel_features::{FeatureManager, UPLOAD_CONTAINER, UploadFeature};

/// Docintel - document intelligence host
#[derive(Parser, Debug)]
#[command(name = "docintel")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Files to ingest
    #[arg(value_name = "FILE")]
    files: Vec<PathBuf>,

    /// Config file (defaults to the user config dir)
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Storage file to use instead of the configured one
    #[arg(short, long, value_name = "PATH", conflicts_with = "memory")]
    storage: Option<PathBuf>,

    /// Keep everything in memory
    #[arg(short, long)]
    memory: bool,

    /// Persist a setting before ingesting
    #[arg(long = "set", value_name = "KEY=VALUE")]
    settings: Vec<String>,

    /// Verbose logging
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    // Initialize logging
    let log_level = match args.verbose {
        0 => tracing::Level::WARN,
        1 => tracing::Level::INFO,
        2 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_level(true)
                .with_writer(std::io::stderr),
        )
        .with(tracing_subscriber::filter::LevelFilter::from_level(
            log_level,
        ))
        .init();

    tracing::info!("Document Intelligence Platform initializing v{}", env!("CARGO_PKG_VERSION"));

    let config = resolve_config(&args)?;
    let api = Rc::new(CoreApi::from_config(&config)?);
    let _notifications = install_notification_sink(&api);

    // Mount points exist before features look for them
    api.ui().register_container(UPLOAD_CONTAINER);

    let upload = UploadFeature::new(Rc::clone(&api), config.upload.clone());
    let mut features = FeatureManager::new();
    features.register(Box::new(upload.clone()))?;
    for (id, error) in features.activate_all() {
        tracing::warn!("Feature {} unavailable: {}", id, error);
    }

    tracing::info!("Core system ready");

    for setting in &args.settings {
        let (key, value) = parse_setting(setting)?;
        if !api.settings().set(key, &value).await {
            api.ui()
                .show_notification(format!("Could not save setting {key}"), Severity::Warning);
        }
    }

    for path in &args.files {
        match FileHandle::from_path(path).await {
            Ok(file) => {
                api.documents().upload(file);
            }
            Err(e) => api.ui().show_notification(
                format!("Cannot open {}: {}", path.display(), e),
                Severity::Error,
            ),
        }
    }

    upload.process_pending().await;

    if let Some(document) = api.documents().current() {
        println!(
            "{} ({}, {} bytes, id {})",
            document.name, document.mime_type, document.size, document.id
        );
        let text = api.documents().get_text();
        if !text.is_empty() {
            println!("{} characters of text", text.chars().count());
        }
    }

    Ok(())
}

/// Loads config and applies command-line overrides.
fn resolve_config(args: &Args) -> anyhow::Result<Config> {
    let mut config = match &args.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load(),
    };

    if args.memory {
        config.storage.backend = BackendKind::Memory;
    } else if let Some(path) = &args.storage {
        config.storage.backend = BackendKind::File;
        config.storage.path = Some(path.clone());
    }

    Ok(config)
}

/// Prints `ui:notification` events to stderr.
fn install_notification_sink(api: &CoreApi) -> Subscription {
    api.events().subscribe(EventKind::Notification, |event| {
        if let Event::Notification { message, severity } = event {
            eprintln!("[{severity}] {message}");
        }
    })
}

/// Splits `key=value`. Values that parse as JSON are stored as JSON,
/// anything else as a string.
fn parse_setting(raw: &str) -> anyhow::Result<(&str, Value)> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| anyhow::anyhow!("Expected KEY=VALUE, got {raw:?}"))?;
    if key.is_empty() {
        anyhow::bail!("Setting key must not be empty");
    }
    let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
    Ok((key, value))
}
