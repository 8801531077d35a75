use std::num::NonZeroU32;
use std::time::Duration;

use crate::retry::RetryPolicy;

const DEFAULT_SHEETS_BASE_URL: &str = "https://sheets.googleapis.com/v4/spreadsheets";
const DEFAULT_SHEETS_TAB: &str = "Leads";
const DEFAULT_PHONE_LOOKUP_BASE_URL: &str = "https://lookups.twilio.com";

/// Automation webhook that receives every lead as JSON.
#[derive(Debug, Clone)]
pub struct WebhookConfig {
    pub url: String,
    pub timeout: Duration,
}

/// Spreadsheet backup destination.
#[derive(Debug, Clone)]
pub struct SheetsConfig {
    pub spreadsheet_id: String,
    pub access_token: String,
    pub tab: String,
    pub base_url: String,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct CrmConfig {
    pub base_url: String,
    pub api_key: String,
    /// Send the key in this header instead of `Authorization: Bearer`.
    pub auth_header: Option<String>,
    pub api_version: Option<String>,
    pub location_id: Option<String>,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct PhoneLookupConfig {
    pub account_sid: String,
    pub auth_token: String,
    pub base_url: String,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub app_env: String,
    pub webhook: Option<WebhookConfig>,
    pub sheets: Option<SheetsConfig>,
    pub crm: Option<CrmConfig>,
    pub phone_lookup: Option<PhoneLookupConfig>,
    pub rate_limit_requests: NonZeroU32,
    pub rate_limit_window: Duration,
    /// Take the client IP from `X-Forwarded-For` / `X-Real-IP`. Only safe
    /// behind a proxy that overwrites those headers.
    pub trust_proxy_headers: bool,
    pub phone_cache_ttl: Duration,
    pub delivery_timeout: Duration,
    pub delivery_max_attempts: u32,
    pub retry_initial_interval: Duration,
    pub retry_max_interval: Duration,
    pub max_body_bytes: usize,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        let config = Self::from_lookup(|key| std::env::var(key).ok())?;

        // Log successful configuration load (without sensitive values)
        tracing::info!("Configuration loaded successfully");
        tracing::debug!("Environment: {}", config.app_env);
        tracing::debug!("Server Port: {}", config.port);
        match config.webhook {
            Some(ref webhook) => tracing::debug!("Lead webhook: {}", webhook.url),
            None => tracing::warn!("LEAD_WEBHOOK_URL not set, webhook delivery disabled"),
        }
        match config.sheets {
            Some(ref sheets) => tracing::debug!("Spreadsheet tab: {}", sheets.tab),
            None => tracing::warn!("GOOGLE_SHEETS_ID not set, spreadsheet backup disabled"),
        }
        match config.crm {
            Some(ref crm) => tracing::debug!("CRM Base URL: {}", crm.base_url),
            None => tracing::warn!("CRM_BASE_URL not set, CRM delivery disabled"),
        }
        if config.trust_proxy_headers {
            tracing::info!("Client IPs taken from proxy headers");
        }
        if config.phone_lookup.is_none() {
            tracing::warn!("Phone lookup not configured, using format validation only");
        }

        Ok(config)
    }

    /// Builds the configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let delivery_timeout = Duration::from_secs(number(&var, "DELIVERY_TIMEOUT_SECS", 10)?);

        let webhook = match var("LEAD_WEBHOOK_URL") {
            Some(url) => Some(WebhookConfig {
                url: http_url("LEAD_WEBHOOK_URL", url)?,
                timeout: delivery_timeout,
            }),
            None => None,
        };

        let sheets = match var("GOOGLE_SHEETS_ID") {
            Some(spreadsheet_id) => Some(SheetsConfig {
                spreadsheet_id,
                access_token: var("GOOGLE_SHEETS_ACCESS_TOKEN").ok_or_else(|| {
                    anyhow::anyhow!(
                        "GOOGLE_SHEETS_ACCESS_TOKEN required when GOOGLE_SHEETS_ID is set"
                    )
                })?,
                tab: var("GOOGLE_SHEETS_TAB").unwrap_or_else(|| DEFAULT_SHEETS_TAB.to_string()),
                base_url: http_url(
                    "GOOGLE_SHEETS_BASE_URL",
                    var("GOOGLE_SHEETS_BASE_URL")
                        .unwrap_or_else(|| DEFAULT_SHEETS_BASE_URL.to_string()),
                )?,
                timeout: delivery_timeout,
            }),
            None => None,
        };

        let crm = match var("CRM_BASE_URL") {
            Some(url) => Some(CrmConfig {
                base_url: http_url("CRM_BASE_URL", url)?,
                api_key: var("CRM_API_KEY").ok_or_else(|| {
                    anyhow::anyhow!("CRM_API_KEY required when CRM_BASE_URL is set")
                })?,
                auth_header: var("CRM_AUTH_HEADER"),
                api_version: var("CRM_API_VERSION"),
                location_id: var("CRM_LOCATION_ID"),
                timeout: delivery_timeout,
            }),
            None => None,
        };

        let phone_lookup = match var("PHONE_LOOKUP_ACCOUNT_SID") {
            Some(account_sid) => Some(PhoneLookupConfig {
                account_sid,
                auth_token: var("PHONE_LOOKUP_AUTH_TOKEN").ok_or_else(|| {
                    anyhow::anyhow!(
                        "PHONE_LOOKUP_AUTH_TOKEN required when PHONE_LOOKUP_ACCOUNT_SID is set"
                    )
                })?,
                base_url: http_url(
                    "PHONE_LOOKUP_BASE_URL",
                    var("PHONE_LOOKUP_BASE_URL")
                        .unwrap_or_else(|| DEFAULT_PHONE_LOOKUP_BASE_URL.to_string()),
                )?,
                timeout: delivery_timeout,
            }),
            None => None,
        };

        let rate_limit_requests = NonZeroU32::new(number(&var, "RATE_LIMIT_REQUESTS", 5)?)
            .ok_or_else(|| anyhow::anyhow!("RATE_LIMIT_REQUESTS must be at least 1"))?;
        let rate_limit_window = Duration::from_secs(number(&var, "RATE_LIMIT_WINDOW_SECS", 60)?);
        if rate_limit_window.is_zero() {
            anyhow::bail!("RATE_LIMIT_WINDOW_SECS must be at least 1");
        }

        let delivery_max_attempts = number(&var, "DELIVERY_MAX_ATTEMPTS", 3)?;
        if delivery_max_attempts == 0 {
            anyhow::bail!("DELIVERY_MAX_ATTEMPTS must be at least 1");
        }

        Ok(Self {
            port: var("PORT")
                .unwrap_or_else(|| "3000".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("PORT must be a valid number between 1-65535"))?,
            app_env: var("APP_ENV").unwrap_or_else(|| "development".to_string()),
            webhook,
            sheets,
            crm,
            phone_lookup,
            rate_limit_requests,
            rate_limit_window,
            trust_proxy_headers: flag(&var, "TRUST_PROXY_HEADERS")?,
            phone_cache_ttl: Duration::from_secs(number(&var, "PHONE_CACHE_TTL_SECS", 86_400)?),
            delivery_timeout,
            delivery_max_attempts,
            retry_initial_interval: Duration::from_millis(number(&var, "RETRY_INITIAL_MS", 1000)?),
            retry_max_interval: Duration::from_millis(number(&var, "RETRY_MAX_MS", 5000)?),
            max_body_bytes: number(&var, "MAX_BODY_BYTES", 65_536)?,
        })
    }

    pub fn is_production(&self) -> bool {
        self.app_env.eq_ignore_ascii_case("production")
    }

    /// Whether internal error messages may be returned to clients.
    pub fn expose_error_details(&self) -> bool {
        !self.is_production()
    }

    /// Retry policy for the webhook and CRM destinations.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.delivery_max_attempts,
            2,
            self.retry_initial_interval,
            Some(self.retry_max_interval),
        )
    }
}

fn http_url(key: &str, url: String) -> anyhow::Result<String> {
    if !url.starts_with("http://") && !url.starts_with("https://") {
        anyhow::bail!("{} must start with http:// or https://", key);
    }
    Ok(url.trim_end_matches('/').to_string())
}

fn flag<F>(var: &F, key: &str) -> anyhow::Result<bool>
where
    F: Fn(&str) -> Option<String>,
{
    match var(key).map(|v| v.trim().to_lowercase()).as_deref() {
        None | Some("false") | Some("0") | Some("no") => Ok(false),
        Some("true") | Some("1") | Some("yes") => Ok(true),
        Some(_) => anyhow::bail!("{} must be true or false", key),
    }
}

fn number<T, F>(var: &F, key: &str, default: T) -> anyhow::Result<T>
where
    T: std::str::FromStr,
    F: Fn(&str) -> Option<String>,
{
    match var(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| anyhow::anyhow!("{} must be a valid non-negative number", key)),
        None => Ok(default),
    }
}
