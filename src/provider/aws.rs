//! AWS Health provider built on the AWS SDK.
//!
//! Health is a global service: whatever region an account is configured
//! with, calls go to the Health endpoint of that region's partition.

use super::{HealthProvider, ProviderFactory, TimeRange};
use crate::config::{is_valid_region, AccountConfig, CredentialSource};
use crate::health::{EventCategory, PollError, RawEvent};

use async_trait::async_trait;
use aws_config::timeout::TimeoutConfig;
use aws_config::{BehaviorVersion, Region, SdkConfig};
use aws_credential_types::Credentials;
use aws_sdk_health::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_health::primitives::DateTime as SdkDateTime;
use aws_sdk_health::types::{DateTimeRange, EntityFilter, Event, EventFilter, EventTypeCategory};
use chrono::{DateTime, Utc};
use std::fmt;
use std::time::Duration;

const PAGE_SIZE: i32 = 100;
const CREDENTIALS_PROVIDER: &str = "cloudpulse";

/// Region that serves the Health API for `region`'s partition.
pub fn health_region(region: &str) -> &'static str {
    if region.starts_with("cn-") {
        "cn-northwest-1"
    } else if region.starts_with("us-gov-") {
        "us-gov-west-1"
    } else {
        "us-east-1"
    }
}

/// Map a provider error to the poll taxonomy.
///
/// The structured error code is authoritative. Matching on the message text
/// only happens when no code is available.
pub fn classify_error(code: Option<&str>, message: &str) -> PollError {
    let Some(raw_code) = code else {
        return classify_message(message);
    };

    // Codes may arrive namespaced or with a trailing URI, e.g.
    // "com.amazonaws.health#AccessDeniedException".
    let code = raw_code.rsplit('#').next().unwrap_or(raw_code);
    let code = code.split(':').next().unwrap_or(code);
    match code {
        "SubscriptionRequiredException" => PollError::SubscriptionRequired,
        "AccessDeniedException" | "AccessDenied" => PollError::AccessDenied,
        "UnrecognizedClientException" | "InvalidUserID.NotFound" | "InvalidClientTokenId" => {
            PollError::AccountNotFound
        }
        "MissingAuthenticationTokenException" | "MissingAuthenticationToken" => {
            PollError::CredentialsMissing
        }
        _ if message.is_empty() => PollError::Api(code.to_string()),
        _ => PollError::Api(format!("{}: {}", code, message)),
    }
}

/// Substring shim for errors that carry no code.
fn classify_message(message: &str) -> PollError {
    if message.contains("Unable to locate credentials")
        || message.contains("no providers in chain provided credentials")
        || message.contains("failed to load credentials")
        || message.contains("an error occurred while loading credentials")
    {
        PollError::CredentialsMissing
    } else if message.contains("SubscriptionRequiredException") {
        PollError::SubscriptionRequired
    } else if message.contains("AccessDenied") {
        PollError::AccessDenied
    } else if message.contains("InvalidUserID.NotFound") {
        PollError::AccountNotFound
    } else {
        PollError::Api(message.to_string())
    }
}

/// Classify any SDK operation failure.
fn sdk_error<E, R>(err: SdkError<E, R>) -> PollError
where
    E: ProvideErrorMetadata + std::error::Error + 'static,
    R: fmt::Debug,
{
    match err.code() {
        Some(code) => classify_error(Some(code), err.message().unwrap_or_default()),
        None => classify_error(None, &DisplayErrorContext(&err).to_string()),
    }
}

/// Keys named by environment variables, looked up through `lookup`.
fn environment_credentials<F>(
    access_key_id_var: &str,
    secret_access_key_var: &str,
    session_token_var: &str,
    lookup: F,
) -> Result<Credentials, PollError>
where
    F: Fn(&str) -> Option<String>,
{
    let access_key_id = lookup(access_key_id_var).unwrap_or_default();
    let secret_access_key = lookup(secret_access_key_var).unwrap_or_default();
    if access_key_id.is_empty() || secret_access_key.is_empty() {
        return Err(PollError::CredentialsMissing);
    }

    Ok(Credentials::new(
        access_key_id,
        secret_access_key,
        lookup(session_token_var).filter(|t| !t.is_empty()),
        None,
        CREDENTIALS_PROVIDER,
    ))
}

/// Load the shared SDK configuration for one account.
///
/// The account region is kept here so regional services (STS) use it.
pub async fn load_sdk_config(
    account: &AccountConfig,
    timeout: Duration,
) -> Result<SdkConfig, PollError> {
    if !is_valid_region(&account.region) {
        return Err(PollError::ClientInit(format!(
            "invalid region {:?}",
            account.region
        )));
    }

    let loader = aws_config::defaults(BehaviorVersion::latest())
        .region(Region::new(account.region.clone()))
        .timeout_config(TimeoutConfig::builder().operation_timeout(timeout).build());

    let loader = match &account.credentials {
        CredentialSource::DefaultChain => loader,
        CredentialSource::Profile { profile } => loader.profile_name(profile),
        CredentialSource::Static {
            access_key_id,
            secret_access_key,
            session_token,
        } => {
            if access_key_id.is_empty() || secret_access_key.is_empty() {
                return Err(PollError::CredentialsMissing);
            }
            loader.credentials_provider(Credentials::new(
                access_key_id,
                secret_access_key,
                session_token.clone().filter(|t| !t.is_empty()),
                None,
                CREDENTIALS_PROVIDER,
            ))
        }
        CredentialSource::Environment {
            access_key_id_var,
            secret_access_key_var,
            session_token_var,
        } => loader.credentials_provider(environment_credentials(
            access_key_id_var,
            secret_access_key_var,
            session_token_var,
            |name| std::env::var(name).ok(),
        )?),
    };

    Ok(loader.load().await)
}

/// Identity behind an account's credentials.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallerIdentity {
    pub account_id: String,
    pub arn: String,
    pub user_id: String,
}

impl fmt::Display for CallerIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "account {} as {} (user id {})",
            self.account_id, self.arn, self.user_id
        )
    }
}

/// Ask STS who the loaded credentials belong to.
pub async fn caller_identity(shared: &SdkConfig) -> Result<CallerIdentity, PollError> {
    let resp = aws_sdk_sts::Client::new(shared)
        .get_caller_identity()
        .send()
        .await
        .map_err(sdk_error)?;

    Ok(CallerIdentity {
        account_id: resp.account().unwrap_or_default().to_string(),
        arn: resp.arn().unwrap_or_default().to_string(),
        user_id: resp.user_id().unwrap_or_default().to_string(),
    })
}

fn to_utc(time: Option<&SdkDateTime>) -> Option<DateTime<Utc>> {
    time.and_then(|t| DateTime::from_timestamp(t.secs(), t.subsec_nanos()))
}

fn raw_event(event: &Event) -> RawEvent {
    RawEvent {
        arn: event.arn().map(str::to_string),
        service: event.service().map(str::to_string),
        event_type_code: event.event_type_code().map(str::to_string),
        event_type_category: event.event_type_category().map(|c| c.as_str().to_string()),
        region: event.region().map(str::to_string),
        status_code: event.status_code().map(|s| s.as_str().to_string()),
        start_time: to_utc(event.start_time()),
        end_time: to_utc(event.end_time()),
        last_updated_time: to_utc(event.last_updated_time()),
    }
}

fn event_filter(range: TimeRange, categories: &[EventCategory]) -> EventFilter {
    EventFilter::builder()
        .start_times(
            DateTimeRange::builder()
                .from(SdkDateTime::from_secs(range.from.timestamp()))
                .to(SdkDateTime::from_secs(range.to.timestamp()))
                .build(),
        )
        .set_event_type_categories(Some(
            categories
                .iter()
                .map(|c| EventTypeCategory::from(c.as_str()))
                .collect(),
        ))
        .build()
}

/// AWS Health client bound to one account.
#[derive(Debug, Clone)]
pub struct AwsHealthClient {
    client: aws_sdk_health::Client,
}

impl AwsHealthClient {
    /// Build a Health client from an account's shared configuration.
    pub fn new(shared: &SdkConfig, account: &AccountConfig) -> Result<Self, PollError> {
        let mut builder = aws_sdk_health::config::Builder::from(shared)
            .region(Region::new(health_region(&account.region)));

        if let Some(endpoint) = &account.endpoint {
            reqwest::Url::parse(endpoint).map_err(|e| {
                PollError::ClientInit(format!("invalid endpoint {}: {}", endpoint, e))
            })?;
            builder = builder.endpoint_url(endpoint);
        }

        Ok(Self {
            client: aws_sdk_health::Client::from_conf(builder.build()),
        })
    }

    /// Load the account's configuration and build a client.
    pub async fn connect(account: &AccountConfig, timeout: Duration) -> Result<Self, PollError> {
        let shared = load_sdk_config(account, timeout).await?;
        Self::new(&shared, account)
    }

    /// One-result listing used by the setup check.
    pub async fn check_access(&self) -> Result<usize, PollError> {
        let resp = self
            .client
            .describe_events()
            .max_results(1)
            .send()
            .await
            .map_err(sdk_error)?;
        Ok(resp.events().len())
    }
}

#[async_trait]
impl HealthProvider for AwsHealthClient {
    async fn list_events(
        &self,
        range: TimeRange,
        categories: &[EventCategory],
    ) -> Result<Vec<RawEvent>, PollError> {
        let filter = event_filter(range, categories);
        let mut events = Vec::new();
        let mut next_token: Option<String> = None;

        loop {
            let page = self
                .client
                .describe_events()
                .filter(filter.clone())
                .max_results(PAGE_SIZE)
                .set_next_token(next_token.take())
                .send()
                .await
                .map_err(sdk_error)?;
            events.extend(page.events().iter().map(raw_event));

            match page.next_token() {
                Some(token) if !token.is_empty() => next_token = Some(token.to_string()),
                _ => break,
            }
        }

        Ok(events)
    }

    async fn event_description(&self, id: &str) -> Result<String, PollError> {
        let resp = self
            .client
            .describe_event_details()
            .event_arns(id)
            .send()
            .await
            .map_err(sdk_error)?;

        Ok(resp
            .successful_set()
            .first()
            .and_then(|d| d.event_description())
            .and_then(|d| d.latest_description())
            .unwrap_or_default()
            .to_string())
    }

    async fn count_affected_entities(&self, id: &str) -> Result<u64, PollError> {
        let filter = EntityFilter::builder()
            .event_arns(id)
            .build()
            .map_err(|e| PollError::Api(e.to_string()))?;
        let mut count = 0u64;
        let mut next_token: Option<String> = None;

        loop {
            let page = self
                .client
                .describe_affected_entities()
                .filter(filter.clone())
                .set_next_token(next_token.take())
                .send()
                .await
                .map_err(sdk_error)?;
            count += page.entities().len() as u64;

            match page.next_token() {
                Some(token) if !token.is_empty() => next_token = Some(token.to_string()),
                _ => break,
            }
        }

        Ok(count)
    }
}

/// Builds [`AwsHealthClient`]s.
#[derive(Debug, Clone)]
pub struct AwsProviderFactory {
    timeout: Duration,
}

impl AwsProviderFactory {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

#[async_trait]
impl ProviderFactory for AwsProviderFactory {
    async fn connect(
        &self,
        account: &AccountConfig,
    ) -> Result<Box<dyn HealthProvider>, PollError> {
        Ok(Box::new(AwsHealthClient::connect(account, self.timeout).await?))
    }
}
