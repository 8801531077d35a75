//! Fan-out of one normalized lead to the webhook, spreadsheet and CRM.
//!
//! Every configured destination is attempted, concurrently, regardless of how
//! the others fare. The lead counts as captured when at least one of them
//! accepted it.

use async_trait::async_trait;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::models::LeadRecord;
use crate::retry::RetryPolicy;

/// The three places a lead is delivered to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Destination {
    Webhook,
    Spreadsheet,
    Crm,
}

impl Destination {
    pub fn as_str(&self) -> &'static str {
        match self {
            Destination::Webhook => "webhook",
            Destination::Spreadsheet => "spreadsheet",
            Destination::Crm => "crm",
        }
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a single delivery attempt failed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeliveryError {
    #[error("authentication rejected (HTTP {status}): {message}")]
    Unauthorized { status: u16, message: String },
    #[error("duplicate contact already exists")]
    Duplicate { existing_id: Option<String> },
    #[error("HTTP {status}: {message}")]
    Status { status: u16, message: String },
    #[error("request timed out after {0:?}")]
    Timeout(Duration),
    #[error("request failed: {0}")]
    Transport(String),
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

impl DeliveryError {
    /// Map a non-2xx response onto the error taxonomy.
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        match status {
            401 | 403 => DeliveryError::Unauthorized { status, message },
            _ => DeliveryError::Status { status, message },
        }
    }

    pub fn from_reqwest(err: reqwest::Error, timeout: Duration) -> Self {
        if err.is_timeout() {
            DeliveryError::Timeout(timeout)
        } else {
            DeliveryError::Transport(err.to_string())
        }
    }

    pub fn is_auth(&self) -> bool {
        matches!(self, DeliveryError::Unauthorized { .. })
    }

    /// Failure class without any remote response text.
    pub fn brief(&self) -> String {
        match self {
            DeliveryError::Unauthorized { status, .. } | DeliveryError::Status { status, .. } => {
                format!("HTTP {}", status)
            }
            DeliveryError::Duplicate { .. } => "duplicate contact".to_string(),
            DeliveryError::Timeout(_) => "timed out".to_string(),
            DeliveryError::Transport(_) => "request failed".to_string(),
            DeliveryError::InvalidResponse(_) => "invalid response".to_string(),
        }
    }
}

/// What a destination hands back on success.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeliveryReceipt {
    /// Remote identifier, e.g. the CRM contact id or the sheet row.
    pub reference: Option<String>,
}

/// A remote system that accepts normalized leads.
#[async_trait]
pub trait LeadDestination: Send + Sync {
    async fn deliver(&self, lead: &LeadRecord) -> Result<DeliveryReceipt, DeliveryError>;

    /// Whether a failed attempt is worth repeating.
    fn is_retryable(&self, _error: &DeliveryError) -> bool {
        true
    }
}

/// Per-destination result of one fan-out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DestinationOutcome {
    pub destination: Destination,
    pub success: bool,
    /// Not configured, so never attempted.
    pub skipped: bool,
    pub attempts: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// `error` reduced to its class, safe to show to clients.
    #[serde(skip)]
    pub brief: Option<String>,
}

impl DestinationOutcome {
    fn skipped(destination: Destination) -> Self {
        Self {
            destination,
            success: false,
            skipped: true,
            attempts: 0,
            reference: None,
            error: Some("not configured".to_string()),
            brief: Some("not configured".to_string()),
        }
    }

    fn failed(destination: Destination, attempts: u32, error: String, brief: String) -> Self {
        Self {
            destination,
            success: false,
            skipped: false,
            attempts,
            reference: None,
            error: Some(error),
            brief: Some(brief),
        }
    }

    fn reason(&self) -> &str {
        self.error.as_deref().unwrap_or("unknown error")
    }

    fn brief_reason(&self) -> &str {
        self.brief.as_deref().unwrap_or("unknown error")
    }
}

/// Aggregated outcome across all destinations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeliveryReport {
    pub outcomes: Vec<DestinationOutcome>,
}

impl DeliveryReport {
    pub fn any_succeeded(&self) -> bool {
        self.outcomes.iter().any(|o| o.success)
    }

    pub fn all_succeeded(&self) -> bool {
        self.outcomes.iter().all(|o| o.success)
    }

    pub fn outcome(&self, destination: Destination) -> Option<&DestinationOutcome> {
        self.outcomes.iter().find(|o| o.destination == destination)
    }

    /// Which destinations were skipped or failed, present iff not all succeeded.
    /// Client-facing, so failures are named by class only.
    pub fn warning(&self) -> Option<String> {
        if self.all_succeeded() {
            return None;
        }
        let missed: Vec<String> = self
            .outcomes
            .iter()
            .filter(|o| !o.success)
            .map(|o| {
                if o.skipped {
                    format!("{} (skipped: not configured)", o.destination)
                } else {
                    format!("{} (failed: {})", o.destination, o.brief_reason())
                }
            })
            .collect();
        Some(format!(
            "Lead saved, but some destinations did not receive it: {}",
            missed.join(", ")
        ))
    }

    /// One line naming every destination's failure reason.
    pub fn failure_summary(&self) -> String {
        self.outcomes
            .iter()
            .filter(|o| !o.success)
            .map(|o| format!("{}: {}", o.destination, o.reason()))
            .collect::<Vec<_>>()
            .join("; ")
    }

    /// Like `failure_summary`, but with status classes instead of remote
    /// response bodies.
    pub fn brief_failure_summary(&self) -> String {
        self.outcomes
            .iter()
            .filter(|o| !o.success)
            .map(|o| format!("{}: {}", o.destination, o.brief_reason()))
            .collect::<Vec<_>>()
            .join("; ")
    }
}

/// A destination together with the retry policy it is delivered under.
#[derive(Clone)]
struct Route {
    target: Arc<dyn LeadDestination>,
    policy: RetryPolicy,
}

/// Attempts every destination for a lead and aggregates the outcome.
#[derive(Clone, Default)]
pub struct DeliveryOrchestrator {
    webhook: Option<Route>,
    spreadsheet: Option<Route>,
    crm: Option<Route>,
}

impl DeliveryOrchestrator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Webhook automation, retried under `policy`.
    pub fn with_webhook(mut self, target: Arc<dyn LeadDestination>, policy: RetryPolicy) -> Self {
        self.webhook = Some(Route { target, policy });
        self
    }

    /// Spreadsheet backup, always a single attempt.
    pub fn with_spreadsheet(mut self, target: Arc<dyn LeadDestination>) -> Self {
        self.spreadsheet = Some(Route {
            target,
            policy: RetryPolicy::single_attempt(),
        });
        self
    }

    /// CRM, retried under `policy` except where the destination refuses.
    pub fn with_crm(mut self, target: Arc<dyn LeadDestination>, policy: RetryPolicy) -> Self {
        self.crm = Some(Route { target, policy });
        self
    }

    pub async fn deliver(&self, lead: &LeadRecord) -> DeliveryReport {
        tracing::info!(
            "Delivering lead {} ({}) to all destinations",
            lead.lead_id,
            lead.submission_type
        );

        let lead = Arc::new(lead.clone());
        let (webhook, spreadsheet, crm) = tokio::join!(
            spawn_attempt(Destination::Webhook, self.webhook.clone(), lead.clone()),
            spawn_attempt(Destination::Spreadsheet, self.spreadsheet.clone(), lead.clone()),
            spawn_attempt(Destination::Crm, self.crm.clone(), lead.clone()),
        );

        let report = DeliveryReport {
            outcomes: vec![webhook, spreadsheet, crm],
        };

        if report.all_succeeded() {
            tracing::info!("✓ Lead {} delivered to every destination", lead.lead_id);
        } else if report.any_succeeded() {
            tracing::warn!(
                "Lead {} partially delivered: {}",
                lead.lead_id,
                report.failure_summary()
            );
        } else {
            tracing::error!(
                "✗ Lead {} reached no destination: {}",
                lead.lead_id,
                report.failure_summary()
            );
        }

        report
    }
}

/// Runs one destination on its own task, so a panic there is contained to
/// that destination's outcome.
async fn spawn_attempt(
    destination: Destination,
    route: Option<Route>,
    lead: Arc<LeadRecord>,
) -> DestinationOutcome {
    let Some(route) = route else {
        tracing::warn!("{} destination not configured, skipping", destination);
        return DestinationOutcome::skipped(destination);
    };

    let lead_id = lead.lead_id.clone();
    match tokio::spawn(async move { attempt(destination, &route, &lead).await }).await {
        Ok(outcome) => outcome,
        Err(e) => {
            tracing::error!("✗ {} task for lead {} aborted: {}", destination, lead_id, e);
            DestinationOutcome::failed(
                destination,
                1,
                format!("delivery task aborted: {}", e),
                "internal error".to_string(),
            )
        }
    }
}

async fn attempt(destination: Destination, route: &Route, lead: &LeadRecord) -> DestinationOutcome {
    let target = route.target.as_ref();
    let outcome = route
        .policy
        .run(
            move |attempt| async move {
                tracing::debug!("{} attempt {} for lead {}", destination, attempt, lead.lead_id);
                target.deliver(lead).await
            },
            |err| target.is_retryable(err),
        )
        .await;

    match outcome.result {
        Ok(receipt) => {
            tracing::info!(
                "✓ {} accepted lead {} after {} attempt(s)",
                destination,
                lead.lead_id,
                outcome.attempts
            );
            DestinationOutcome {
                destination,
                success: true,
                skipped: false,
                attempts: outcome.attempts,
                reference: receipt.reference,
                error: None,
                brief: None,
            }
        }
        Err(err) => {
            tracing::error!(
                "✗ {} rejected lead {} after {} attempt(s): {}",
                destination,
                lead.lead_id,
                outcome.attempts,
                err
            );
            DestinationOutcome::failed(destination, outcome.attempts, err.to_string(), err.brief())
        }
    }
}
