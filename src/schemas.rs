//! Submission schemas for the three intake endpoints.
//!
//! Each schema deserializes leniently (every field optional) and then validates
//! in one pass, collecting every violation before returning. A `LeadRecord` is
//! only built once the whole submission is known to be valid.

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use uuid::Uuid;

use crate::models::{AddressComponent, LeadRecord, PropertyCondition, SubmissionType, Timeline};
use crate::parsing::{
    format_phone_for_storage, parse_address_components, parse_price, phone_digits,
    split_full_name, validate_address, AddressInput, ParsedAddress,
};

const DEFAULT_SOURCE: &str = "website";
const MAX_LEAD_ID_LEN: usize = 128;

// RFC 5322 simplified, with at least one dot in the domain.
static EMAIL_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^[a-zA-Z0-9.!#$%&'*+/=?^_`{|}~-]+@[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?(?:\.[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?)+$",
    )
    .expect("valid email regex")
});

/// Validate email address format.
pub fn is_valid_email(email: &str) -> bool {
    email.len() >= 5 && EMAIL_REGEX.is_match(email)
}

/// Generate a fresh correlation id: `lead_<unix millis>_<8 hex chars>`.
pub fn generate_lead_id(now: DateTime<Utc>) -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("lead_{}_{}", now.timestamp_millis(), &suffix[..8])
}

// ============ Validation Errors ============

/// A single violated field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

/// Every violation found in one submission.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValidationErrors(Vec<FieldError>);

impl ValidationErrors {
    pub fn add(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.0.push(FieldError {
            field: field.into(),
            message: message.into(),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn has_field(&self, field: &str) -> bool {
        self.0.iter().any(|e| e.field == field)
    }

    pub fn into_inner(self) -> Vec<FieldError> {
        self.0
    }

    fn into_result<T>(self, value: impl FnOnce() -> T) -> Result<T, ValidationErrors> {
        if self.is_empty() {
            Ok(value())
        } else {
            Err(self)
        }
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .0
            .iter()
            .map(|e| format!("{}: {}", e.field, e.message))
            .collect();
        f.write_str(&parts.join("; "))
    }
}

// ============ Field Rules ============

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn required_text(errors: &mut ValidationErrors, field: &str, value: Option<&str>) -> Option<String> {
    let text = non_empty(value);
    if text.is_none() {
        errors.add(field, format!("{} is required", field));
    }
    text
}

fn required_phone(errors: &mut ValidationErrors, value: Option<&str>) -> Option<String> {
    match non_empty(value) {
        None => {
            errors.add("phone", "phone is required");
            None
        }
        Some(raw) if phone_digits(&raw).len() < 10 => {
            errors.add("phone", "Phone number must have at least 10 digits");
            None
        }
        Some(raw) => Some(format_phone_for_storage(&raw)),
    }
}

fn optional_email(errors: &mut ValidationErrors, value: Option<&str>) -> Option<String> {
    let email = non_empty(value)?.to_lowercase();
    if is_valid_email(&email) {
        Some(email)
    } else {
        errors.add("email", "Invalid email address");
        None
    }
}

fn required_email(errors: &mut ValidationErrors, value: Option<&str>) -> Option<String> {
    if non_empty(value).is_none() {
        errors.add("email", "email is required");
        return None;
    }
    optional_email(errors, value)
}

fn required_condition(errors: &mut ValidationErrors, value: Option<&str>) -> Option<PropertyCondition> {
    let parsed = value.map(str::trim).and_then(PropertyCondition::parse);
    if parsed.is_none() {
        errors.add(
            "propertyCondition",
            format!("Must be one of: {}", PropertyCondition::ALLOWED.join(", ")),
        );
    }
    parsed
}

fn required_timeline(errors: &mut ValidationErrors, field: &str, value: Option<&str>) -> Option<Timeline> {
    let parsed = value.map(str::trim).and_then(Timeline::parse);
    if parsed.is_none() {
        errors.add(field, format!("Must be one of: {}", Timeline::ALLOWED.join(", ")));
    }
    parsed
}

fn lead_id_or_new(errors: &mut ValidationErrors, value: Option<&str>, now: DateTime<Utc>) -> String {
    match non_empty(value) {
        Some(id) if id.len() > MAX_LEAD_ID_LEN => {
            errors.add("leadId", "leadId is too long");
            id
        }
        Some(id) => id,
        None => generate_lead_id(now),
    }
}

/// Parse a client timestamp, RFC 3339 first, then common naive layouts as UTC.
fn parse_timestamp(
    errors: &mut ValidationErrors,
    field: &str,
    value: Option<&str>,
) -> Option<DateTime<Utc>> {
    let raw = non_empty(value)?;
    let parsed = DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|_| {
            chrono::NaiveDateTime::parse_from_str(&raw, "%Y-%m-%d %H:%M:%S%.f")
                .map(|ndt| DateTime::<Utc>::from_naive_utc_and_offset(ndt, Utc))
        });
    match parsed {
        Ok(ts) => Some(ts),
        Err(_) => {
            errors.add(field, "Invalid timestamp format. Expected ISO 8601 (RFC3339)");
            None
        }
    }
}

/// Accepts JSON booleans and the usual yes/no strings.
fn optional_flag(errors: &mut ValidationErrors, field: &str, value: Option<&Value>) -> Option<bool> {
    match value? {
        Value::Null => None,
        Value::Bool(b) => Some(*b),
        Value::String(s) => match s.trim().to_lowercase().as_str() {
            "" => None,
            "true" | "yes" => Some(true),
            "false" | "no" => Some(false),
            _ => {
                errors.add(field, "Must be true or false");
                None
            }
        },
        _ => {
            errors.add(field, "Must be true or false");
            None
        }
    }
}

/// Price as a number plus the original text, kept for audit.
fn price_fields(value: Option<&Value>) -> (Option<f64>, Option<String>) {
    match value {
        None | Some(Value::Null) => (None, None),
        Some(raw) => {
            let original = match raw {
                Value::String(s) => non_empty(Some(s)),
                other => Some(other.to_string()),
            };
            let parsed = parse_price(raw);
            if parsed.is_none() && original.is_some() {
                tracing::warn!("Unparseable asking price {:?}, forwarding as null", original);
            }
            (parsed, original)
        }
    }
}

/// Two spellings of one attribute: the first non-blank wins.
fn either_text(preferred: Option<String>, fallback: Option<String>) -> Option<String> {
    preferred.filter(|v| !v.trim().is_empty()).or(fallback)
}

fn either_value(preferred: Option<Value>, fallback: Option<Value>) -> Option<Value> {
    preferred
        .filter(|v| match v {
            Value::Null => false,
            Value::String(s) => !s.trim().is_empty(),
            _ => true,
        })
        .or(fallback)
}

// ============ Address Resolution ============

/// Address sub-fields as submitted.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddressFields {
    #[serde(default)]
    pub address_line1: Option<String>,
    #[serde(default)]
    pub street_address: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub postal_code: Option<String>,
    #[serde(default)]
    pub zip_code: Option<String>,
    #[serde(default)]
    pub place_id: Option<String>,
    #[serde(default)]
    pub address_components: Option<Vec<AddressComponent>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct ResolvedAddress {
    address_line1: Option<String>,
    city: Option<String>,
    state: Option<String>,
    postal_code: Option<String>,
    place_id: Option<String>,
}

impl AddressFields {
    fn has_structured_data(&self) -> bool {
        let components = self
            .address_components
            .as_ref()
            .map(|c| !c.is_empty())
            .unwrap_or(false);
        components
            || [
                &self.address_line1,
                &self.street_address,
                &self.city,
                &self.state,
                &self.postal_code,
                &self.zip_code,
            ]
            .iter()
            .any(|f| non_empty(f.as_deref()).is_some())
    }

    /// Merge explicit sub-fields over parsed components and validate them.
    ///
    /// Free-form-only submissions are left unresolved; downstream consumers
    /// fall back to splitting the address string.
    fn resolve(&self, errors: &mut ValidationErrors) -> ResolvedAddress {
        let place_id = non_empty(self.place_id.as_deref());
        if !self.has_structured_data() {
            return ResolvedAddress {
                place_id,
                ..Default::default()
            };
        }

        let parsed = self
            .address_components
            .as_deref()
            .map(parse_address_components)
            .unwrap_or_default();
        let pick = |explicit: &Option<String>, component: &str| {
            non_empty(explicit.as_deref()).or_else(|| non_empty(Some(component)))
        };
        let line1 = either_text(self.address_line1.clone(), self.street_address.clone());
        let postal_code = either_text(self.postal_code.clone(), self.zip_code.clone());

        let merged = ParsedAddress {
            address_line1: pick(&line1, &parsed.address_line1).unwrap_or_default(),
            city: pick(&self.city, &parsed.city).unwrap_or_default(),
            state: pick(&self.state, &parsed.state).unwrap_or_default(),
            postal_code: pick(&postal_code, &parsed.postal_code).unwrap_or_default(),
        };

        let validation = validate_address(&AddressInput::from(&merged));
        for message in validation.errors {
            errors.add("address", message);
        }
        if merged.postal_code.is_empty() {
            tracing::warn!("Address submitted without a postal code: {}", merged.address_line1);
        }

        ResolvedAddress {
            address_line1: non_empty(Some(&merged.address_line1)),
            city: non_empty(Some(&merged.city)),
            state: non_empty(Some(&merged.state)),
            postal_code: non_empty(Some(&merged.postal_code)),
            place_id,
        }
    }
}

// ============ Partial Schema ============

/// First funnel step: address, phone and consent.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartialSubmission {
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub consent: Option<Value>,
    #[serde(flatten)]
    pub address_fields: AddressFields,
    #[serde(default)]
    pub lead_id: Option<String>,
    #[serde(default)]
    pub last_updated: Option<String>,
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub referral_source: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
}

impl PartialSubmission {
    pub fn validate(self, now: DateTime<Utc>) -> Result<LeadRecord, ValidationErrors> {
        let mut errors = ValidationErrors::default();

        let address = required_text(&mut errors, "address", self.address.as_deref());
        let phone = required_phone(&mut errors, self.phone.as_deref());
        if self.consent != Some(Value::Bool(true)) {
            errors.add("consent", "Consent is required");
        }
        let resolved = self.address_fields.resolve(&mut errors);
        let email = optional_email(&mut errors, self.email.as_deref());
        let last_updated = parse_timestamp(&mut errors, "lastUpdated", self.last_updated.as_deref());
        let lead_id = lead_id_or_new(&mut errors, self.lead_id.as_deref(), now);

        let (first_name, last_name) = match (
            non_empty(self.first_name.as_deref()),
            non_empty(self.last_name.as_deref()),
        ) {
            (None, None) => match self.full_name.as_deref().and_then(split_full_name) {
                Some((first, last)) => (Some(first), Some(last)),
                None => (None, None),
            },
            names => names,
        };

        errors.into_result(|| LeadRecord {
            lead_id,
            timestamp: now,
            last_updated: last_updated.unwrap_or(now),
            submission_type: SubmissionType::Partial,
            first_name,
            last_name,
            email,
            phone: phone.unwrap_or_default(),
            address: address.unwrap_or_default(),
            address_line1: resolved.address_line1,
            city: resolved.city,
            state: resolved.state,
            postal_code: resolved.postal_code,
            place_id: resolved.place_id,
            property_condition: None,
            timeline: None,
            price: None,
            asking_price: None,
            is_property_listed: None,
            referral_source: non_empty(either_text(self.referral_source, self.source).as_deref())
                .unwrap_or_else(|| DEFAULT_SOURCE.to_string()),
            consent: Some(true),
            phone_verification: None,
        })
    }
}

// ============ Complete Schemas ============

/// Single-step funnel: one `fullName` field.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompleteSubmission {
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub property_condition: Option<String>,
    #[serde(default)]
    pub timeline: Option<String>,
    #[serde(default)]
    pub timeframe: Option<String>,
    #[serde(default)]
    pub asking_price: Option<Value>,
    #[serde(default)]
    pub price: Option<Value>,
    #[serde(default)]
    pub is_property_listed: Option<Value>,
    #[serde(flatten)]
    pub address_fields: AddressFields,
    #[serde(default)]
    pub referral_source: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub lead_id: Option<String>,
}

impl CompleteSubmission {
    pub fn validate(self, now: DateTime<Utc>) -> Result<LeadRecord, ValidationErrors> {
        let mut errors = ValidationErrors::default();

        let names = required_text(&mut errors, "fullName", self.full_name.as_deref())
            .and_then(|full| split_full_name(&full));

        complete_record(
            errors,
            now,
            CompleteFields {
                names,
                timeline_field: "timeline",
                address: self.address,
                email: self.email,
                phone: self.phone,
                property_condition: self.property_condition,
                timeline: either_text(self.timeline, self.timeframe),
                price: either_value(self.asking_price, self.price),
                is_property_listed: self.is_property_listed,
                address_fields: self.address_fields,
                source: either_text(self.referral_source, self.source),
                timestamp: self.timestamp,
                lead_id: self.lead_id,
            },
        )
    }
}

/// Multi-step funnel: separate first/last name, may upgrade a partial lead.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormSubmission {
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub property_condition: Option<String>,
    #[serde(default)]
    pub timeline: Option<String>,
    #[serde(default)]
    pub timeframe: Option<String>,
    #[serde(default)]
    pub asking_price: Option<Value>,
    #[serde(default)]
    pub price: Option<Value>,
    #[serde(default)]
    pub is_property_listed: Option<Value>,
    #[serde(flatten)]
    pub address_fields: AddressFields,
    #[serde(default)]
    pub referral_source: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub lead_id: Option<String>,
}

impl FormSubmission {
    pub fn validate(self, now: DateTime<Utc>) -> Result<LeadRecord, ValidationErrors> {
        let mut errors = ValidationErrors::default();

        let first = required_text(&mut errors, "firstName", self.first_name.as_deref());
        let last = required_text(&mut errors, "lastName", self.last_name.as_deref());

        complete_record(
            errors,
            now,
            CompleteFields {
                names: first.zip(last),
                timeline_field: "timeframe",
                address: self.address,
                email: self.email,
                phone: self.phone,
                property_condition: self.property_condition,
                timeline: either_text(self.timeline, self.timeframe),
                price: either_value(self.asking_price, self.price),
                is_property_listed: self.is_property_listed,
                address_fields: self.address_fields,
                source: either_text(self.referral_source, self.source),
                timestamp: self.timestamp,
                lead_id: self.lead_id,
            },
        )
    }
}

struct CompleteFields {
    names: Option<(String, String)>,
    timeline_field: &'static str,
    address: Option<String>,
    email: Option<String>,
    phone: Option<String>,
    property_condition: Option<String>,
    timeline: Option<String>,
    price: Option<Value>,
    is_property_listed: Option<Value>,
    address_fields: AddressFields,
    source: Option<String>,
    timestamp: Option<String>,
    lead_id: Option<String>,
}

fn complete_record(
    mut errors: ValidationErrors,
    now: DateTime<Utc>,
    fields: CompleteFields,
) -> Result<LeadRecord, ValidationErrors> {
    let address = required_text(&mut errors, "address", fields.address.as_deref());
    let email = required_email(&mut errors, fields.email.as_deref());
    let phone = required_phone(&mut errors, fields.phone.as_deref());
    let condition = required_condition(&mut errors, fields.property_condition.as_deref());
    let timeline = required_timeline(&mut errors, fields.timeline_field, fields.timeline.as_deref());
    let listed = optional_flag(&mut errors, "isPropertyListed", fields.is_property_listed.as_ref());
    let resolved = fields.address_fields.resolve(&mut errors);
    let timestamp = parse_timestamp(&mut errors, "timestamp", fields.timestamp.as_deref());
    let lead_id = lead_id_or_new(&mut errors, fields.lead_id.as_deref(), now);
    let (price, asking_price) = price_fields(fields.price.as_ref());

    errors.into_result(|| {
        let (first_name, last_name) = fields.names.unzip();
        LeadRecord {
            lead_id,
            timestamp: timestamp.unwrap_or(now),
            last_updated: now,
            submission_type: SubmissionType::Complete,
            first_name,
            last_name,
            email,
            phone: phone.unwrap_or_default(),
            address: address.unwrap_or_default(),
            address_line1: resolved.address_line1,
            city: resolved.city,
            state: resolved.state,
            postal_code: resolved.postal_code,
            place_id: resolved.place_id,
            property_condition: condition,
            timeline,
            price,
            asking_price,
            is_property_listed: listed,
            referral_source: non_empty(fields.source.as_deref())
                .unwrap_or_else(|| DEFAULT_SOURCE.to_string()),
            consent: None,
            phone_verification: None,
        }
    })
}
