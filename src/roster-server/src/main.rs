//! Roster portal server: duty registrations and email campaigns for the
//! on-call roster.
//!
//! Main entry point that wires the services, starts maintenance tasks and
//! serves the HTTP API.

use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};
use clap::Parser;
use roster_api::ApiServer;
use roster_channels::{BrevoClient, DocumentLibrary, EmailSender};
use roster_core::config::AppConfig;
use roster_management::ManagementState;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "roster-server")]
#[command(about = "On-call duty roster portal with email campaign dispatch and tracking")]
#[command(version)]
struct Cli {
    /// Node identifier (overrides config)
    #[arg(long, env = "ROSTER__NODE_ID")]
    node_id: Option<String>,

    /// Bind address (overrides config)
    #[arg(long, env = "ROSTER__API__HOST")]
    host: Option<String>,

    /// HTTP port (overrides config)
    #[arg(long, env = "ROSTER__API__HTTP_PORT")]
    http_port: Option<u16>,

    /// Directory of attachable documents loaded at startup
    #[arg(long, env = "ROSTER__DOCUMENTS__DIR")]
    documents_dir: Option<String>,
}

/// Time left until the next `hour_utc:00` strictly after `now`.
fn until_next_run(now: DateTime<Utc>, hour_utc: u32) -> Duration {
    let today = now
        .date_naive()
        .and_hms_opt(hour_utc.min(23), 0, 0)
        .map(|naive| Utc.from_utc_datetime(&naive))
        .unwrap_or(now);
    let next = if today > now {
        today
    } else {
        today + ChronoDuration::days(1)
    };
    (next - now).to_std().unwrap_or(Duration::from_secs(60))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "roster_server=info,roster_management=info,roster_api=info,tower_http=info".into()),
        )
        .json()
        .init();

    let cli = Cli::parse();

    info!("Roster server starting up");

    // Load configuration
    let mut config = AppConfig::load().unwrap_or_else(|e| {
        warn!(error = %e, "Failed to load config, using defaults");
        AppConfig::default()
    });

    // Apply CLI overrides
    if let Some(node_id) = cli.node_id {
        config.node_id = node_id;
    }
    if let Some(host) = cli.host {
        config.api.host = host;
    }
    if let Some(port) = cli.http_port {
        config.api.http_port = port;
    }
    if let Some(dir) = cli.documents_dir {
        config.documents.dir = Some(dir);
    }

    info!(
        node_id = %config.node_id,
        http_port = config.api.http_port,
        metrics_port = config.metrics.port,
        webhook_secret = config.webhook.secret.is_some(),
        reminders = config.reminders.enabled,
        "Configuration loaded"
    );

    // Email provider and attachable documents
    let sender: Arc<dyn EmailSender> = Arc::new(BrevoClient::new(config.email.clone()));
    let documents = Arc::new(DocumentLibrary::new());
    if let Some(dir) = &config.documents.dir {
        match documents.load_dir(dir).await {
            Ok(count) => info!(dir = %dir, count, "Documents loaded"),
            Err(e) => error!(dir = %dir, error = %e, "Failed to load documents, attachments disabled"),
        }
    }

    let management = ManagementState::new(&config, sender, documents);
    let api_server = ApiServer::new(config.clone(), management.clone());

    // Start metrics exporter
    if let Err(e) = api_server.start_metrics().await {
        error!(error = %e, "Failed to start metrics exporter");
    }

    // Spawn upload and session maintenance
    let purge_every = Duration::from_secs(config.uploads.purge_interval_secs.max(1));
    let importer = management.importer.clone();
    let auth = management.auth.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(purge_every);
        loop {
            interval.tick().await;
            let uploads = importer.cache().evict_expired();
            let sessions = auth.purge_expired();
            if uploads > 0 || sessions > 0 {
                info!(uploads, sessions, "Expired uploads and sessions purged");
            }
        }
    });

    // Spawn the daily reminder sweep
    if config.reminders.enabled {
        let mailer = management.mailer.clone();
        let hour_utc = config.reminders.hour_utc;
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(until_next_run(Utc::now(), hour_utc)).await;
                mailer.run_reminders(Utc::now().date_naive()).await;
            }
        });
    }

    info!("Roster server is ready to serve traffic");

    // Start HTTP server (blocks until shutdown)
    api_server.start_http().await?;

    Ok(())
}
