//! Poll-level failure taxonomy.

use serde::Serialize;
use thiserror::Error;

/// Why a poll of one account failed.
///
/// None of these are fatal to the process: a failed poll degrades the
/// account's summary to the error state.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum PollError {
    #[error("credentials not found")]
    CredentialsMissing,
    #[error("Business or Enterprise support plan required")]
    SubscriptionRequired,
    #[error("access to the Health API denied")]
    AccessDenied,
    #[error("account not found")]
    AccountNotFound,
    #[error("client initialization failed: {0}")]
    ClientInit(String),
    #[error("API call failed: {0}")]
    Api(String),
}

impl PollError {
    /// Short machine-friendly tag used in logs and JSON.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::CredentialsMissing => "credentials_missing",
            Self::SubscriptionRequired => "subscription_required",
            Self::AccessDenied => "access_denied",
            Self::AccountNotFound => "account_not_found",
            Self::ClientInit(_) => "client_init",
            Self::Api(_) => "api",
        }
    }
}
