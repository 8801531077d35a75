use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use url::Url;

use crate::config::SheetsConfig;
use crate::delivery::{DeliveryError, DeliveryReceipt, LeadDestination};
use crate::errors::AppError;
use crate::models::LeadRecord;

/// Column order of the backup sheet. Column A holds the lead id.
pub const COLUMNS: [&str; 21] = [
    "Lead ID",
    "Timestamp",
    "Last Updated",
    "Submission Type",
    "First Name",
    "Last Name",
    "Email",
    "Phone",
    "Address",
    "Street",
    "City",
    "State",
    "Zip",
    "Condition",
    "Timeline",
    "Price",
    "Listed",
    "Source",
    "Phone Valid",
    "Line Type",
    "Carrier",
];

#[derive(Debug, Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<Value>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AppendResponse {
    updates: Option<AppendUpdates>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AppendUpdates {
    updated_range: Option<String>,
}

/// Spreadsheet backup: one row per lead, updated in place when the lead
/// progresses from partial to complete.
#[derive(Clone)]
pub struct SheetsClient {
    client: reqwest::Client,
    base_url: String,
    spreadsheet_id: String,
    tab: String,
    access_token: String,
    timeout: Duration,
}

impl SheetsClient {
    pub fn new(config: &SheetsConfig) -> Result<Self, AppError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| {
                AppError::ExternalApiError(format!("Failed to create sheets client: {}", e))
            })?;

        Ok(Self {
            client,
            base_url: config.base_url.clone(),
            spreadsheet_id: config.spreadsheet_id.clone(),
            tab: config.tab.clone(),
            access_token: config.access_token.clone(),
            timeout: config.timeout,
        })
    }

    /// `{base}/{spreadsheet}/values/{range}` with each segment escaped.
    fn values_url(&self, range: &str) -> Result<Url, DeliveryError> {
        let mut url = Url::parse(&self.base_url)
            .map_err(|e| DeliveryError::Transport(format!("Invalid sheets base URL: {}", e)))?;
        url.path_segments_mut()
            .map_err(|_| DeliveryError::Transport("Sheets base URL cannot be a base".to_string()))?
            .pop_if_empty()
            .push(&self.spreadsheet_id)
            .push("values")
            .push(range);
        Ok(url)
    }

    /// 1-based row holding `lead_id` in column A, if any.
    async fn find_row(&self, lead_id: &str) -> Result<Option<usize>, DeliveryError> {
        let url = self.values_url(&format!("{}!A:A", self.tab))?;

        let response = self
            .client
            .get(url)
            .bearer_auth(&self.access_token)
            .send()
            .await
            .map_err(|e| DeliveryError::from_reqwest(e, self.timeout))?;
        let response = check_status(response).await?;

        let range: ValueRange = response
            .json()
            .await
            .map_err(|e| DeliveryError::InvalidResponse(e.to_string()))?;

        Ok(range
            .values
            .iter()
            .position(|row| row.first().and_then(Value::as_str) == Some(lead_id))
            .map(|index| index + 1))
    }

    async fn update_row(&self, row: usize, values: Vec<Value>) -> Result<(), DeliveryError> {
        let range = format!("{}!A{}", self.tab, row);
        let mut url = self.values_url(&range)?;
        url.query_pairs_mut().append_pair("valueInputOption", "RAW");

        let response = self
            .client
            .put(url)
            .bearer_auth(&self.access_token)
            .json(&json!({
                "range": range,
                "majorDimension": "ROWS",
                "values": [values],
            }))
            .send()
            .await
            .map_err(|e| DeliveryError::from_reqwest(e, self.timeout))?;
        check_status(response).await?;
        Ok(())
    }

    async fn append_row(&self, values: Vec<Value>) -> Result<Option<String>, DeliveryError> {
        let mut url = self.values_url(&format!("{}!A1:append", self.tab))?;
        url.query_pairs_mut()
            .append_pair("valueInputOption", "RAW")
            .append_pair("insertDataOption", "INSERT_ROWS");

        let response = self
            .client
            .post(url)
            .bearer_auth(&self.access_token)
            .json(&json!({
                "majorDimension": "ROWS",
                "values": [values],
            }))
            .send()
            .await
            .map_err(|e| DeliveryError::from_reqwest(e, self.timeout))?;
        let response = check_status(response).await?;

        // The updated range is informational only.
        let appended: Option<AppendResponse> = response.json().await.ok();
        Ok(appended
            .and_then(|a| a.updates)
            .and_then(|u| u.updated_range))
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, DeliveryError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let error_text = response
        .text()
        .await
        .unwrap_or_else(|_| "Unknown error".to_string());
    Err(DeliveryError::from_status(status.as_u16(), error_text))
}

fn text(value: Option<&str>) -> Value {
    Value::String(value.unwrap_or_default().to_string())
}

/// Spreadsheet row for `lead`, in `COLUMNS` order.
pub fn lead_row(lead: &LeadRecord) -> Vec<Value> {
    let verification = lead.phone_verification.as_ref();
    vec![
        json!(lead.lead_id),
        json!(lead.timestamp.to_rfc3339()),
        json!(lead.last_updated.to_rfc3339()),
        json!(lead.submission_type.as_str()),
        text(lead.first_name.as_deref()),
        text(lead.last_name.as_deref()),
        text(lead.email.as_deref()),
        json!(lead.phone),
        json!(lead.address),
        text(lead.address_line1.as_deref()),
        text(lead.city.as_deref()),
        text(lead.state.as_deref()),
        text(lead.postal_code.as_deref()),
        text(lead.property_condition.map(|c| c.as_str())),
        text(lead.timeline.map(|t| t.as_str())),
        lead.price.map(|p| json!(p)).unwrap_or_else(|| json!("")),
        text(lead.is_property_listed.map(|l| if l { "Yes" } else { "No" })),
        json!(lead.referral_source),
        text(verification.map(|v| if v.is_valid { "Yes" } else { "No" })),
        text(verification.and_then(|v| v.line_type.as_deref())),
        text(verification.and_then(|v| v.carrier.as_deref())),
    ]
}

#[async_trait]
impl LeadDestination for SheetsClient {
    async fn deliver(&self, lead: &LeadRecord) -> Result<DeliveryReceipt, DeliveryError> {
        let values = lead_row(lead);

        match self.find_row(&lead.lead_id).await? {
            Some(row) => {
                tracing::info!("Updating spreadsheet row {} for lead {}", row, lead.lead_id);
                self.update_row(row, values).await?;
                Ok(DeliveryReceipt {
                    reference: Some(format!("{}!A{}", self.tab, row)),
                })
            }
            None => {
                tracing::info!("Appending spreadsheet row for lead {}", lead.lead_id);
                let range = self.append_row(values).await?;
                Ok(DeliveryReceipt { reference: range })
            }
        }
    }
}
