use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

// ============ Lead Model ============

/// Funnel stage of a lead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubmissionType {
    /// First step of the funnel: address, phone and consent only.
    Partial,
    /// Full contact and property details.
    Complete,
}

impl SubmissionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubmissionType::Partial => "partial",
            SubmissionType::Complete => "complete",
        }
    }
}

impl fmt::Display for SubmissionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Seller-reported property condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PropertyCondition {
    Excellent,
    Good,
    Fair,
    Poor,
}

impl PropertyCondition {
    pub const ALLOWED: [&'static str; 4] = ["excellent", "good", "fair", "poor"];

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "excellent" => Some(Self::Excellent),
            "good" => Some(Self::Good),
            "fair" => Some(Self::Fair),
            "poor" => Some(Self::Poor),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Excellent => "excellent",
            Self::Good => "good",
            Self::Fair => "fair",
            Self::Poor => "poor",
        }
    }
}

/// How soon the seller wants to sell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Timeline {
    #[serde(rename = "asap")]
    Asap,
    #[serde(rename = "30days")]
    ThirtyDays,
    #[serde(rename = "60days")]
    SixtyDays,
    #[serde(rename = "90days")]
    NinetyDays,
    #[serde(rename = "flexible")]
    Flexible,
}

impl Timeline {
    pub const ALLOWED: [&'static str; 5] = ["asap", "30days", "60days", "90days", "flexible"];

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "asap" => Some(Self::Asap),
            "30days" => Some(Self::ThirtyDays),
            "60days" => Some(Self::SixtyDays),
            "90days" => Some(Self::NinetyDays),
            "flexible" => Some(Self::Flexible),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Asap => "asap",
            Self::ThirtyDays => "30days",
            Self::SixtyDays => "60days",
            Self::NinetyDays => "90days",
            Self::Flexible => "flexible",
        }
    }
}

/// One entry of a geocoder `address_components` list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddressComponent {
    #[serde(alias = "long_name")]
    pub long_name: String,
    #[serde(alias = "short_name")]
    pub short_name: String,
    #[serde(default)]
    pub types: Vec<String>,
}

/// Result of a phone verification lookup.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhoneVerification {
    pub is_valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub carrier: Option<String>,
    /// Set when the provider could not classify the number at all.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PhoneVerification {
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self {
            is_valid: false,
            error: Some(reason.into()),
            ..Default::default()
        }
    }

    /// True when the provider itself failed, as opposed to rejecting the number.
    pub fn provider_failed(&self) -> bool {
        self.error.is_some()
    }
}

/// Normalized lead, the single payload every destination receives.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeadRecord {
    pub lead_id: String,
    pub timestamp: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
    pub submission_type: SubmissionType,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    pub phone: String,

    pub address: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address_line1: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub postal_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub place_id: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub property_condition: Option<PropertyCondition>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeline: Option<Timeline>,
    pub price: Option<f64>,
    /// Asking price exactly as the seller typed it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub asking_price: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_property_listed: Option<bool>,

    pub referral_source: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub consent: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone_verification: Option<PhoneVerification>,
}

impl LeadRecord {
    pub fn is_partial(&self) -> bool {
        self.submission_type == SubmissionType::Partial
    }
}

// ============ API Models ============

/// Body of every successful submission response.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionResponse {
    pub success: bool,
    pub lead_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}
