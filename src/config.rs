//! Configuration module for cloudpulse.
//!
//! Process settings come from environment variables; the monitoring setup
//! (accounts, thresholds, schedule, notification transports) comes from a
//! JSON file. Both fall back to defaults rather than failing.

use crate::health::{AlertPolicy, AlertThresholds};

use chrono::NaiveTime;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::env;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use thiserror::Error;

/// Configuration error types.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("account name must not be empty")]
    EmptyAccountName,
    #[error("duplicate account name: {0}")]
    DuplicateAccount(String),
    #[error("invalid region {region:?} for account {account}")]
    InvalidRegion { account: String, region: String },
    #[error("unknown account: {0}")]
    UnknownAccount(String),
    #[error("no accounts configured")]
    NoAccounts,
    #[error("several accounts configured but no default_account set")]
    NoDefaultAccount,
    #[error("invalid lookback window {0}: expected one of 1, 3, 7, 14, 30 days")]
    InvalidLookback(u32),
    #[error("invalid daily check time {0:?}: expected HH:MM")]
    InvalidTime(String),
}

// ============================================================================
// Process settings
// ============================================================================

/// Server configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// HTTP port for the dashboard (default: 8080)
    pub http_port: u16,
    /// Path to the monitoring configuration file (default: "cloudpulse.json")
    pub config_path: PathBuf,
    /// Directory for JSON fleet reports (default: "reports")
    pub report_dir: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_port: 8080,
            config_path: PathBuf::from("cloudpulse.json"),
            report_dir: PathBuf::from("reports"),
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables.
    ///
    /// Environment variables:
    /// - `CLOUDPULSE_HTTP_PORT`: HTTP port (default: 8080)
    /// - `CLOUDPULSE_CONFIG`: monitoring config file (default: "cloudpulse.json")
    /// - `CLOUDPULSE_REPORT_DIR`: report directory (default: "reports")
    pub fn load() -> Self {
        let mut cfg = Self::default();

        if let Ok(port_str) = env::var("CLOUDPULSE_HTTP_PORT") {
            if let Ok(port) = port_str.parse() {
                cfg.http_port = port;
            }
        }

        if let Ok(path) = env::var("CLOUDPULSE_CONFIG") {
            cfg.config_path = PathBuf::from(path);
        }

        if let Ok(dir) = env::var("CLOUDPULSE_REPORT_DIR") {
            cfg.report_dir = PathBuf::from(dir);
        }

        cfg
    }
}

// ============================================================================
// Monitoring configuration
// ============================================================================

/// Top-level monitoring configuration read from JSON.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub accounts: Vec<AccountConfig>,
    pub default_account: Option<String>,
    pub lookback_days: LookbackWindow,
    pub thresholds: AlertThresholds,
    pub alerts: AlertPolicy,
    pub schedule: ScheduleConfig,
    pub polling: PollingConfig,
    pub email: EmailConfig,
    pub webhook: WebhookConfig,
    pub report: ReportConfig,
}

impl MonitorConfig {
    /// Read the config file, falling back to defaults when it is missing or
    /// malformed.
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(text) => match serde_json::from_str(&text) {
                Ok(cfg) => {
                    tracing::info!("Loaded configuration from {}", path.display());
                    cfg
                }
                Err(e) => {
                    tracing::warn!(
                        "Failed to parse {}: {}; using defaults",
                        path.display(),
                        e
                    );
                    Self::default()
                }
            },
            Err(e) => {
                tracing::warn!(
                    "Configuration file {} not readable ({}); using defaults",
                    path.display(),
                    e
                );
                Self::default()
            }
        }
    }
}

/// Where an account's credentials come from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum CredentialSource {
    /// The SDK default chain: environment, shared config files, web
    /// identity, container and instance roles.
    #[serde(rename = "default")]
    DefaultChain,
    /// A named profile from the shared config files.
    Profile { profile: String },
    /// Keys written directly in the config file.
    Static {
        access_key_id: String,
        secret_access_key: String,
        #[serde(default)]
        session_token: Option<String>,
    },
    /// Keys read from named environment variables at connect time.
    Environment {
        #[serde(default = "default_access_key_var")]
        access_key_id_var: String,
        #[serde(default = "default_secret_key_var")]
        secret_access_key_var: String,
        #[serde(default = "default_session_token_var")]
        session_token_var: String,
    },
}

impl Default for CredentialSource {
    fn default() -> Self {
        Self::DefaultChain
    }
}

fn default_access_key_var() -> String {
    "AWS_ACCESS_KEY_ID".to_string()
}

fn default_secret_key_var() -> String {
    "AWS_SECRET_ACCESS_KEY".to_string()
}

fn default_session_token_var() -> String {
    "AWS_SESSION_TOKEN".to_string()
}

/// One monitored account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountConfig {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_region")]
    pub region: String,
    #[serde(default)]
    pub credentials: CredentialSource,
    /// Overrides the partition's global Health endpoint.
    #[serde(default)]
    pub endpoint: Option<String>,
}

fn default_region() -> String {
    "us-east-1".to_string()
}

fn region_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[a-z]{2}(-[a-z]+)+-\d+$").expect("region pattern is valid")
    })
}

/// Whether `region` looks like a provider region code such as `us-east-1`.
pub fn is_valid_region(region: &str) -> bool {
    region_pattern().is_match(region)
}

/// Validated account list, resolved once at startup.
#[derive(Debug, Clone, Default)]
pub struct AccountRegistry {
    accounts: Vec<AccountConfig>,
    default_account: Option<String>,
}

impl AccountRegistry {
    /// Validate names and regions. Order is preserved.
    pub fn new(
        accounts: Vec<AccountConfig>,
        default_account: Option<String>,
    ) -> Result<Self, ConfigError> {
        let mut seen = HashSet::new();
        for account in &accounts {
            if account.name.trim().is_empty() {
                return Err(ConfigError::EmptyAccountName);
            }
            if !seen.insert(account.name.as_str()) {
                return Err(ConfigError::DuplicateAccount(account.name.clone()));
            }
            if !is_valid_region(&account.region) {
                return Err(ConfigError::InvalidRegion {
                    account: account.name.clone(),
                    region: account.region.clone(),
                });
            }
        }

        if let Some(name) = &default_account {
            if !accounts.iter().any(|a| &a.name == name) {
                return Err(ConfigError::UnknownAccount(name.clone()));
            }
        }

        Ok(Self {
            accounts,
            default_account,
        })
    }

    pub fn from_config(cfg: &MonitorConfig) -> Result<Self, ConfigError> {
        Self::new(cfg.accounts.clone(), cfg.default_account.clone())
    }

    pub fn get(&self, name: &str) -> Option<&AccountConfig> {
        self.accounts.iter().find(|a| a.name == name)
    }

    /// The configured default account, or the only account when exactly one
    /// is configured. Never guesses among several.
    pub fn default_account(&self) -> Result<&AccountConfig, ConfigError> {
        match &self.default_account {
            Some(name) => self
                .get(name)
                .ok_or_else(|| ConfigError::UnknownAccount(name.clone())),
            None => match self.accounts.as_slice() {
                [only] => Ok(only),
                [] => Err(ConfigError::NoAccounts),
                _ => Err(ConfigError::NoDefaultAccount),
            },
        }
    }

    pub fn accounts(&self) -> &[AccountConfig] {
        &self.accounts
    }

    pub fn names(&self) -> Vec<&str> {
        self.accounts.iter().map(|a| a.name.as_str()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }

    pub fn len(&self) -> usize {
        self.accounts.len()
    }
}

/// Polling lookback window in days.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct LookbackWindow(u32);

impl LookbackWindow {
    pub const ALLOWED: [u32; 5] = [1, 3, 7, 14, 30];

    pub fn days(&self) -> u32 {
        self.0
    }

    pub fn duration(&self) -> chrono::Duration {
        chrono::Duration::days(i64::from(self.0))
    }
}

impl Default for LookbackWindow {
    fn default() -> Self {
        Self(7)
    }
}

impl TryFrom<u32> for LookbackWindow {
    type Error = ConfigError;

    fn try_from(days: u32) -> Result<Self, Self::Error> {
        if Self::ALLOWED.contains(&days) {
            Ok(Self(days))
        } else {
            Err(ConfigError::InvalidLookback(days))
        }
    }
}

impl From<LookbackWindow> for u32 {
    fn from(w: LookbackWindow) -> u32 {
        w.0
    }
}

impl fmt::Display for LookbackWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}d", self.0)
    }
}

/// Job schedule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    /// Local time of the daily check, "HH:MM".
    pub daily_check_time: String,
    /// Minutes between urgent checks.
    pub urgent_check_interval: u64,
    /// Seconds between scheduler ticks.
    pub tick_seconds: u64,
    /// Lookback used by the scheduled checks, in days.
    pub check_lookback_days: LookbackWindow,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            daily_check_time: "09:00".to_string(),
            urgent_check_interval: 30,
            tick_seconds: 60,
            check_lookback_days: LookbackWindow(1),
        }
    }
}

impl ScheduleConfig {
    pub fn daily_time(&self) -> Result<NaiveTime, ConfigError> {
        NaiveTime::parse_from_str(&self.daily_check_time, "%H:%M")
            .map_err(|_| ConfigError::InvalidTime(self.daily_check_time.clone()))
    }
}

/// Provider call pacing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollingConfig {
    /// Delay between accounts in a fleet poll, in milliseconds.
    pub account_delay_ms: u64,
    /// Per-request timeout, in seconds.
    pub request_timeout_secs: u64,
    /// Dashboard cache lifetime, in seconds.
    pub cache_ttl_secs: u64,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            account_delay_ms: 1000,
            request_timeout_secs: 30,
            cache_ttl_secs: 300,
        }
    }
}

/// SMTP transport settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmailConfig {
    pub smtp_server: String,
    pub smtp_port: u16,
    pub sender_email: String,
    pub sender_password: String,
    pub recipients: Vec<String>,
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            smtp_server: "smtp.gmail.com".to_string(),
            smtp_port: 587,
            sender_email: String::new(),
            sender_password: String::new(),
            recipients: Vec::new(),
        }
    }
}

impl EmailConfig {
    pub fn is_configured(&self) -> bool {
        !self.sender_email.is_empty() && !self.recipients.is_empty()
    }
}

/// Chat webhook settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WebhookConfig {
    pub webhook_url: String,
    pub channel: String,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            webhook_url: String::new(),
            channel: "#aws-health".to_string(),
        }
    }
}

impl WebhookConfig {
    pub fn is_configured(&self) -> bool {
        !self.webhook_url.is_empty()
    }
}

/// JSON report output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    /// Write a report file after every daily check.
    pub save_reports: bool,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self { save_reports: true }
    }
}
