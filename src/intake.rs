//! The submission pipeline shared by every intake endpoint:
//! parse → validate/normalize → verify phone → deliver → respond.

use chrono::Utc;
use serde::de::DeserializeOwned;
use serde_json::error::Category;
use std::sync::Arc;

use crate::delivery::{DeliveryOrchestrator, DeliveryReport};
use crate::errors::AppError;
use crate::models::{LeadRecord, SubmissionResponse};
use crate::phone_verification::PhoneVerifier;
use crate::schemas::{CompleteSubmission, FormSubmission, PartialSubmission, ValidationErrors};

/// Decode a request body into one of the submission schemas.
///
/// Syntax errors are a bad request; a well-formed body of the wrong shape is
/// reported as a validation failure on `body`.
pub fn parse_body<T: DeserializeOwned>(body: &[u8]) -> Result<T, AppError> {
    serde_json::from_slice(body).map_err(|e| match e.classify() {
        Category::Syntax | Category::Eof | Category::Io => {
            AppError::BadRequest("Invalid JSON body".to_string())
        }
        Category::Data => {
            let mut errors = ValidationErrors::default();
            errors.add("body", e.to_string());
            AppError::Validation(errors)
        }
    })
}

#[derive(Clone)]
pub struct Intake {
    verifier: PhoneVerifier,
    orchestrator: Arc<DeliveryOrchestrator>,
}

impl Intake {
    pub fn new(verifier: PhoneVerifier, orchestrator: Arc<DeliveryOrchestrator>) -> Self {
        Self {
            verifier,
            orchestrator,
        }
    }

    /// First funnel step. Phone verification is advisory only.
    pub async fn process_partial(
        &self,
        submission: PartialSubmission,
    ) -> Result<SubmissionResponse, AppError> {
        let mut lead = submission.validate(Utc::now())?;
        tracing::info!("Processing partial lead {}", lead.lead_id);

        let verification = self.verifier.verify(&lead.phone).await;
        if !verification.provider_failed() {
            if !verification.is_valid {
                tracing::warn!(
                    "Partial lead {} has a phone the provider rejected, accepting anyway",
                    lead.lead_id
                );
            }
            lead.phone_verification = Some(verification);
        }

        self.deliver(lead).await
    }

    /// Single-step complete submission.
    pub async fn process_lead(
        &self,
        submission: CompleteSubmission,
    ) -> Result<SubmissionResponse, AppError> {
        let lead = submission.validate(Utc::now())?;
        tracing::info!("Processing complete lead {}", lead.lead_id);
        let lead = self.verify_complete(lead).await?;
        self.deliver(lead).await
    }

    /// Multi-step form submission, possibly upgrading an earlier partial lead.
    pub async fn process_form(
        &self,
        submission: FormSubmission,
    ) -> Result<SubmissionResponse, AppError> {
        let lead = submission.validate(Utc::now())?;
        tracing::info!("Processing form lead {}", lead.lead_id);
        let lead = self.verify_complete(lead).await?;
        self.deliver(lead).await
    }

    /// Rejects numbers the provider explicitly classified as invalid. Provider
    /// outages fall back to the ≥10 digit check the schema already applied.
    async fn verify_complete(&self, mut lead: LeadRecord) -> Result<LeadRecord, AppError> {
        let verification = self.verifier.verify(&lead.phone).await;

        if verification.provider_failed() {
            tracing::warn!(
                "Phone verification unavailable for lead {}, using format validation",
                lead.lead_id
            );
            return Ok(lead);
        }

        if !verification.is_valid {
            let mut errors = ValidationErrors::default();
            errors.add("phone", "Invalid phone number");
            return Err(AppError::Validation(errors));
        }

        lead.phone_verification = Some(verification);
        Ok(lead)
    }

    async fn deliver(&self, lead: LeadRecord) -> Result<SubmissionResponse, AppError> {
        let report = self.orchestrator.deliver(&lead).await;
        respond(lead.lead_id, &report)
    }
}

/// Success when at least one destination accepted the lead.
pub fn respond(lead_id: String, report: &DeliveryReport) -> Result<SubmissionResponse, AppError> {
    if !report.any_succeeded() {
        return Err(AppError::DeliveryFailed {
            summary: report.brief_failure_summary(),
            details: report.failure_summary(),
        });
    }
    Ok(SubmissionResponse {
        success: true,
        lead_id,
        warning: report.warning(),
    })
}
