use async_trait::async_trait;
use moka::future::Cache;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

use crate::config::PhoneLookupConfig;
use crate::errors::AppError;
use crate::models::PhoneVerification;
use crate::parsing::{phone_digits, to_e164};

/// A carrier-lookup provider.
#[async_trait]
pub trait PhoneLookup: Send + Sync {
    /// Classify an E.164 number. `Err` means the provider could not answer,
    /// not that the number is invalid.
    async fn lookup(&self, e164: &str) -> Result<PhoneVerification, AppError>;
}

#[derive(Debug, Deserialize)]
struct LookupResponse {
    #[serde(default)]
    valid: Option<bool>,
    phone_number: Option<String>,
    line_type_intelligence: Option<LineTypeIntelligence>,
}

#[derive(Debug, Deserialize)]
struct LineTypeIntelligence {
    #[serde(rename = "type")]
    line_type: Option<String>,
    carrier_name: Option<String>,
}

/// HTTP client for the carrier-lookup API.
#[derive(Clone)]
pub struct LookupApiClient {
    client: reqwest::Client,
    base_url: String,
    account_sid: String,
    auth_token: String,
}

impl LookupApiClient {
    pub fn new(config: &PhoneLookupConfig) -> Result<Self, AppError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| {
                AppError::ExternalApiError(format!("Failed to create phone lookup client: {}", e))
            })?;

        Ok(Self {
            client,
            base_url: config.base_url.clone(),
            account_sid: config.account_sid.clone(),
            auth_token: config.auth_token.clone(),
        })
    }
}

#[async_trait]
impl PhoneLookup for LookupApiClient {
    async fn lookup(&self, e164: &str) -> Result<PhoneVerification, AppError> {
        let url = format!("{}/v2/PhoneNumbers/{}", self.base_url, e164);
        tracing::debug!("Looking up phone number via {}", self.base_url);

        let response = self
            .client
            .get(&url)
            .query(&[("Fields", "line_type_intelligence")])
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .send()
            .await
            .map_err(|e| AppError::ExternalApiError(format!("Phone lookup failed: {}", e)))?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Ok(PhoneVerification {
                is_valid: false,
                ..Default::default()
            });
        }
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(AppError::ExternalApiError(format!(
                "Phone lookup returned {}: {}",
                status, error_text
            )));
        }

        let data: LookupResponse = response.json().await.map_err(|e| {
            AppError::ExternalApiError(format!("Failed to parse phone lookup response: {}", e))
        })?;

        let (line_type, carrier) = match data.line_type_intelligence {
            Some(info) => (info.line_type, info.carrier_name),
            None => (None, None),
        };

        Ok(PhoneVerification {
            is_valid: data.valid.unwrap_or(true),
            phone_number: data.phone_number,
            line_type,
            carrier,
            error: None,
        })
    }
}

/// Verifies phone numbers, caching valid classifications by digits.
#[derive(Clone)]
pub struct PhoneVerifier {
    provider: Option<Arc<dyn PhoneLookup>>,
    cache: Cache<String, PhoneVerification>,
}

impl PhoneVerifier {
    pub fn new(provider: Option<Arc<dyn PhoneLookup>>, ttl: Duration) -> Self {
        let cache = Cache::builder()
            .time_to_live(ttl)
            .max_capacity(10_000)
            .build();
        Self { provider, cache }
    }

    /// Verifier with no provider: every number gets format validation only.
    pub fn disabled() -> Self {
        Self::new(None, Duration::from_secs(86_400))
    }

    /// Classify `raw`. Never fails: provider problems come back with `error`
    /// set, so callers can fall back to format validation.
    pub async fn verify(&self, raw: &str) -> PhoneVerification {
        let digits = phone_digits(raw);
        if digits.len() < 10 {
            return PhoneVerification {
                is_valid: false,
                ..Default::default()
            };
        }

        let Some(provider) = self.provider.as_ref() else {
            return PhoneVerification::unavailable("Phone lookup not configured");
        };

        if let Some(cached) = self.cache.get(&digits).await {
            tracing::debug!("Phone verification cache hit");
            return cached;
        }

        match provider.lookup(&to_e164(raw)).await {
            Ok(result) => {
                if result.is_valid {
                    self.cache.insert(digits, result.clone()).await;
                } else {
                    tracing::info!("Phone lookup classified number as invalid");
                }
                result
            }
            Err(e) => {
                tracing::warn!("Phone lookup unavailable, falling back to format check: {}", e);
                PhoneVerification::unavailable(e.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct CountingLookup {
        valid: bool,
        fail: bool,
        calls: AtomicU32,
    }

    impl CountingLookup {
        fn new(valid: bool, fail: bool) -> Arc<Self> {
            Arc::new(Self {
                valid,
                fail,
                calls: AtomicU32::new(0),
            })
        }
    }

    #[async_trait]
    impl PhoneLookup for CountingLookup {
        async fn lookup(&self, e164: &str) -> Result<PhoneVerification, AppError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(AppError::ExternalApiError("timeout".to_string()));
            }
            Ok(PhoneVerification {
                is_valid: self.valid,
                phone_number: Some(e164.to_string()),
                line_type: Some("mobile".to_string()),
                ..Default::default()
            })
        }
    }

    #[tokio::test]
    async fn test_valid_results_are_cached_by_digits() {
        let provider = CountingLookup::new(true, false);
        let verifier = PhoneVerifier::new(Some(provider.clone()), Duration::from_secs(60));

        let first = verifier.verify("(512) 555-0100").await;
        let second = verifier.verify("512-555-0100").await;

        assert!(first.is_valid);
        assert_eq!(first, second);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
        assert_eq!(first.phone_number.as_deref(), Some("+15125550100"));
    }

    #[tokio::test]
    async fn test_invalid_results_are_not_cached() {
        let provider = CountingLookup::new(false, false);
        let verifier = PhoneVerifier::new(Some(provider.clone()), Duration::from_secs(60));

        assert!(!verifier.verify("5125550100").await.is_valid);
        assert!(!verifier.verify("5125550100").await.is_valid);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_provider_failure_is_reported_not_raised() {
        let verifier = PhoneVerifier::new(
            Some(CountingLookup::new(true, true)),
            Duration::from_secs(60),
        );
        let result = verifier.verify("5125550100").await;
        assert!(!result.is_valid);
        assert!(result.provider_failed());
    }

    #[tokio::test]
    async fn test_short_numbers_skip_the_provider() {
        let provider = CountingLookup::new(true, false);
        let verifier = PhoneVerifier::new(Some(provider.clone()), Duration::from_secs(60));
        let result = verifier.verify("555-0100").await;
        assert!(!result.is_valid);
        assert!(!result.provider_failed());
        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_disabled_verifier_reports_unavailable() {
        let result = PhoneVerifier::disabled().verify("5125550100").await;
        assert!(result.provider_failed());
    }
}
