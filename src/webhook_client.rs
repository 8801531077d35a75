use async_trait::async_trait;
use std::time::Duration;

use crate::config::WebhookConfig;
use crate::delivery::{DeliveryError, DeliveryReceipt, LeadDestination};
use crate::errors::AppError;
use crate::models::LeadRecord;

/// Posts leads to an automation webhook.
#[derive(Clone)]
pub struct WebhookClient {
    client: reqwest::Client,
    url: String,
    timeout: Duration,
}

impl WebhookClient {
    pub fn new(config: &WebhookConfig) -> Result<Self, AppError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| {
                AppError::ExternalApiError(format!("Failed to create webhook client: {}", e))
            })?;

        Ok(Self {
            client,
            url: config.url.clone(),
            timeout: config.timeout,
        })
    }
}

#[async_trait]
impl LeadDestination for WebhookClient {
    async fn deliver(&self, lead: &LeadRecord) -> Result<DeliveryReceipt, DeliveryError> {
        tracing::info!("Posting lead {} to webhook", lead.lead_id);

        let response = self
            .client
            .post(&self.url)
            .json(lead)
            .send()
            .await
            .map_err(|e| DeliveryError::from_reqwest(e, self.timeout))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(DeliveryError::from_status(status.as_u16(), error_text));
        }

        Ok(DeliveryReceipt::default())
    }
}
