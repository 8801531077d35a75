use async_trait::async_trait;
use reqwest::RequestBuilder;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

use crate::config::CrmConfig;
use crate::crm_adapter::{CrmAdapter, CrmContact, PlaceholderIdentity};
use crate::delivery::{DeliveryError, DeliveryReceipt, LeadDestination};
use crate::errors::AppError;
use crate::models::LeadRecord;

/// How requests to the CRM are authenticated.
pub trait CrmAuth: Send + Sync {
    fn authorize(&self, request: RequestBuilder) -> RequestBuilder;
}

/// `Authorization: Bearer <token>`.
pub struct BearerToken(pub String);

impl CrmAuth for BearerToken {
    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        request.bearer_auth(&self.0)
    }
}

/// API key in a custom header.
pub struct ApiKeyHeader {
    pub header: String,
    pub key: String,
}

impl CrmAuth for ApiKeyHeader {
    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        request.header(self.header.as_str(), &self.key)
    }
}

/// Client for the CRM contacts API.
#[derive(Clone)]
pub struct CrmClient {
    client: reqwest::Client,
    base_url: String,
    auth: Arc<dyn CrmAuth>,
    api_version: Option<String>,
    adapter: CrmAdapter,
    timeout: Duration,
}

impl CrmClient {
    /// Creates a new `CrmClient`.
    ///
    /// # Arguments
    ///
    /// * `config` - CRM section of the application config. `auth_header`
    ///   selects header-key auth; otherwise the key is sent as a bearer token.
    pub fn new(config: &CrmConfig) -> Result<Self, AppError> {
        let auth: Arc<dyn CrmAuth> = match config.auth_header {
            Some(ref header) => Arc::new(ApiKeyHeader {
                header: header.clone(),
                key: config.api_key.clone(),
            }),
            None => Arc::new(BearerToken(config.api_key.clone())),
        };
        let adapter = CrmAdapter::new(Arc::new(PlaceholderIdentity), config.location_id.clone());
        Self::with_parts(config, auth, adapter)
    }

    /// Creates a client with an explicit auth strategy and adapter.
    pub fn with_parts(
        config: &CrmConfig,
        auth: Arc<dyn CrmAuth>,
        adapter: CrmAdapter,
    ) -> Result<Self, AppError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| AppError::ExternalApiError(format!("Failed to create CRM client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.base_url.clone(),
            auth,
            api_version: config.api_version.clone(),
            adapter,
            timeout: config.timeout,
        })
    }

    fn prepare(&self, request: RequestBuilder) -> RequestBuilder {
        let request = self.auth.authorize(request);
        match self.api_version {
            Some(ref version) => request.header("Version", version),
            None => request,
        }
    }

    async fn send(&self, request: RequestBuilder) -> Result<Value, DeliveryError> {
        let response = self
            .prepare(request)
            .send()
            .await
            .map_err(|e| DeliveryError::from_reqwest(e, self.timeout))?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());

        if (200..300).contains(&status) {
            return Ok(serde_json::from_str(&body).unwrap_or(Value::Null));
        }

        let is_duplicate = status == 409
            || ((status == 400 || status == 422) && body.to_lowercase().contains("duplicate"));
        if is_duplicate {
            return Err(DeliveryError::Duplicate {
                existing_id: existing_contact_id(&body),
            });
        }

        Err(DeliveryError::from_status(status, body))
    }

    /// Creates a contact, returning its id when the CRM reports one.
    ///
    /// # Returns
    ///
    /// * `Result<Option<String>, DeliveryError>` - `Duplicate` when the contact exists.
    pub async fn create_contact(&self, contact: &CrmContact) -> Result<Option<String>, DeliveryError> {
        let url = format!("{}/contacts/", self.base_url);
        let data = self.send(self.client.post(&url).json(contact)).await?;
        Ok(contact_id(&data))
    }

    pub async fn update_contact(
        &self,
        contact_id: &str,
        contact: &CrmContact,
    ) -> Result<(), DeliveryError> {
        let url = format!("{}/contacts/{}", self.base_url, contact_id);
        // Location is fixed at creation and rejected on update.
        let contact = CrmContact {
            location_id: None,
            ..contact.clone()
        };
        self.send(self.client.put(&url).json(&contact)).await?;
        Ok(())
    }
}

fn contact_id(data: &Value) -> Option<String> {
    data.pointer("/contact/id")
        .or_else(|| data.get("id"))
        .and_then(Value::as_str)
        .map(str::to_string)
}

fn existing_contact_id(body: &str) -> Option<String> {
    let data: Value = serde_json::from_str(body).ok()?;
    data.pointer("/meta/contactId")
        .or_else(|| data.get("contactId"))
        .and_then(Value::as_str)
        .map(str::to_string)
}

#[async_trait]
impl LeadDestination for CrmClient {
    async fn deliver(&self, lead: &LeadRecord) -> Result<DeliveryReceipt, DeliveryError> {
        let contact = self.adapter.to_contact(lead);
        tracing::info!("Creating CRM contact for lead {}", lead.lead_id);

        match self.create_contact(&contact).await {
            Ok(id) => Ok(DeliveryReceipt { reference: id }),
            Err(DeliveryError::Duplicate {
                existing_id: Some(id),
            }) => {
                tracing::info!(
                    "CRM contact {} already exists for lead {}, updating",
                    id,
                    lead.lead_id
                );
                self.update_contact(&id, &contact).await?;
                Ok(DeliveryReceipt {
                    reference: Some(id),
                })
            }
            Err(e) => Err(e),
        }
    }

    /// Auth failures and unresolvable duplicates fail the same way every time.
    fn is_retryable(&self, error: &DeliveryError) -> bool {
        !matches!(
            error,
            DeliveryError::Unauthorized { .. } | DeliveryError::Duplicate { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_existing_contact_id_locations() {
        assert_eq!(
            existing_contact_id(r#"{"message":"duplicate","meta":{"contactId":"abc"}}"#),
            Some("abc".to_string())
        );
        assert_eq!(
            existing_contact_id(r#"{"contactId":"xyz"}"#),
            Some("xyz".to_string())
        );
        assert_eq!(existing_contact_id("duplicate contact"), None);
    }

    #[test]
    fn test_contact_id_from_create_response() {
        let data = serde_json::json!({"contact": {"id": "c-1"}});
        assert_eq!(contact_id(&data), Some("c-1".to_string()));
        assert_eq!(contact_id(&serde_json::json!({"id": "c-2"})), Some("c-2".to_string()));
        assert_eq!(contact_id(&Value::Null), None);
    }

    #[test]
    fn test_auth_and_duplicates_are_terminal() {
        let client = CrmClient::new(&CrmConfig {
            base_url: "https://crm.example.com".to_string(),
            api_key: "key".to_string(),
            auth_header: None,
            api_version: None,
            location_id: None,
            timeout: Duration::from_secs(1),
        })
        .unwrap();

        assert!(!client.is_retryable(&DeliveryError::from_status(401, "nope")));
        assert!(!client.is_retryable(&DeliveryError::Duplicate { existing_id: None }));
        assert!(client.is_retryable(&DeliveryError::from_status(503, "later")));
        assert!(client.is_retryable(&DeliveryError::Transport("reset".to_string())));
    }
}
