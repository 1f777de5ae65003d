//! cloudpulse - multi-account cloud health monitor
//!
//! Polls the health API of every configured account, classifies accounts
//! and the fleet, alerts on thresholds and newly opened issues, and serves
//! a dashboard.

mod config;
mod health;
mod html;
mod notify;
mod provider;
mod scheduler;
mod web;

use config::{AccountRegistry, ConfigError, LookbackWindow, MonitorConfig, ServerConfig};
use notify::NotifyManager;
use provider::{caller_identity, load_sdk_config, AwsHealthClient, AwsProviderFactory, FleetPoller};
use scheduler::{render_console, ReportWriter, Scheduler};
use web::{AppState, Server};

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Multi-account cloud health monitor
#[derive(Parser, Debug)]
#[command(name = "cloudpulse")]
#[command(version, about)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    /// Monitoring configuration file (overrides CLOUDPULSE_CONFIG)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the scheduled checks and the dashboard (default)
    Serve,

    /// Run one fleet check and print the report
    Check {
        /// Lookback window in days (1, 3, 7, 14 or 30)
        #[arg(long)]
        days: Option<u32>,

        /// Do not write the JSON report file
        #[arg(long)]
        no_save: bool,
    },

    /// Check credentials and health API access for every account
    Verify,
}

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env()
            .add_directive("cloudpulse=info".parse()?))
        .init();

    let cli = Cli::parse();

    // Load configuration
    let mut server_cfg = ServerConfig::load();
    if let Some(path) = cli.config {
        server_cfg.config_path = path;
    }
    let monitor_cfg = MonitorConfig::load(&server_cfg.config_path);

    let registry = match AccountRegistry::from_config(&monitor_cfg) {
        Ok(r) => r,
        Err(e) => {
            tracing::error!("Invalid account configuration: {}", e);
            AccountRegistry::default()
        }
    };
    tracing::info!("{} account(s) configured", registry.len());
    match registry.default_account() {
        Ok(account) => tracing::info!("Default account: {}", account.name),
        Err(e) => tracing::debug!("No default account: {}", e),
    }

    let timeout = Duration::from_secs(monitor_cfg.polling.request_timeout_secs);
    let registry = Arc::new(registry);
    let poller = Arc::new(FleetPoller::new(
        registry.clone(),
        Arc::new(AwsProviderFactory::new(timeout)),
        Duration::from_millis(monitor_cfg.polling.account_delay_ms),
    ));

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(server_cfg, monitor_cfg, poller).await,
        Command::Check { days, no_save } => {
            check(&server_cfg, &monitor_cfg, &poller, days, no_save).await
        }
        Command::Verify => verify(&registry, timeout).await,
    }
}

async fn serve(
    server_cfg: ServerConfig,
    monitor_cfg: MonitorConfig,
    poller: Arc<FleetPoller>,
) -> Result<(), BoxError> {
    tracing::info!("Starting cloudpulse on port {}...", server_cfg.http_port);

    if poller.registry().is_empty() {
        tracing::warn!("No accounts configured; scheduled checks disabled");
    } else {
        let reports = monitor_cfg
            .report
            .save_reports
            .then(|| ReportWriter::new(server_cfg.report_dir.clone()));
        let scheduler = Scheduler::new(
            &monitor_cfg,
            poller.clone(),
            NotifyManager::from_config(&monitor_cfg),
            reports,
        );
        scheduler.start();
    }

    let state = AppState::new(
        server_cfg,
        poller,
        monitor_cfg.lookback_days,
        Duration::from_secs(monitor_cfg.polling.cache_ttl_secs),
    );
    Server::new(state).start().await
}

async fn check(
    server_cfg: &ServerConfig,
    monitor_cfg: &MonitorConfig,
    poller: &FleetPoller,
    days: Option<u32>,
    no_save: bool,
) -> Result<(), BoxError> {
    if poller.registry().is_empty() {
        return Err(ConfigError::NoAccounts.into());
    }

    let days = match days {
        Some(d) => LookbackWindow::try_from(d)?,
        None => monitor_cfg.lookback_days,
    };

    let fleet = poller.poll_fleet(days).await;
    print!("{}", render_console(&fleet.report));

    if !no_save && monitor_cfg.report.save_reports {
        let path = ReportWriter::new(server_cfg.report_dir.clone()).write(&fleet.report)?;
        println!("Report saved to {}", path.display());
    }

    Ok(())
}

async fn verify(registry: &AccountRegistry, timeout: Duration) -> Result<(), BoxError> {
    if registry.is_empty() {
        return Err(ConfigError::NoAccounts.into());
    }

    let mut failed = 0;
    for account in registry.accounts() {
        println!("{} ({})", account.name, account.region);

        let shared = match load_sdk_config(account, timeout).await {
            Ok(shared) => shared,
            Err(e) => {
                failed += 1;
                println!("  ❌ configuration: {} [{}]", e, e.kind());
                continue;
            }
        };

        match caller_identity(&shared).await {
            Ok(identity) => println!("  ✅ credentials: {}", identity),
            Err(e) => {
                failed += 1;
                println!("  ❌ credentials: {} [{}]", e, e.kind());
                continue;
            }
        }

        let result = match AwsHealthClient::new(&shared, account) {
            Ok(client) => client.check_access().await,
            Err(e) => Err(e),
        };
        match result {
            Ok(n) => println!("  ✅ health API reachable ({} event(s) returned)", n),
            Err(e) => {
                failed += 1;
                println!("  ❌ health API: {} [{}]", e, e.kind());
            }
        }
    }

    if failed > 0 {
        return Err(format!("{} check(s) failed across {} account(s)", failed, registry.len()).into());
    }
    println!("All {} account(s) verified", registry.len());
    Ok(())
}
