//! Maps normalized leads onto the CRM contact shape.
//!
//! Anonymous partial leads still need a name in the CRM, so how a contact is
//! named is an explicit [`IdentityStrategy`] rather than a hidden default.

use serde::Serialize;
use std::sync::Arc;

use crate::models::LeadRecord;
use crate::parsing::{is_valid_phone_number, split_address_fallback, to_e164};

/// First/last name sent to the CRM.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContactIdentity {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

/// Decides what a CRM contact is called.
pub trait IdentityStrategy: Send + Sync {
    fn identity(&self, lead: &LeadRecord) -> ContactIdentity;
}

fn real_identity(lead: &LeadRecord) -> ContactIdentity {
    let clean = |name: &Option<String>| {
        name.as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map(str::to_string)
    };
    ContactIdentity {
        first_name: clean(&lead.first_name),
        last_name: clean(&lead.last_name),
    }
}

/// Names anonymous partial leads `New{n} Lead{n}`, `n` taken from the lead id.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlaceholderIdentity;

impl PlaceholderIdentity {
    /// Last six digits of the lead id, or a checksum of it when it has none.
    pub fn suffix(lead_id: &str) -> String {
        let digits: Vec<char> = lead_id.chars().filter(char::is_ascii_digit).collect();
        if digits.is_empty() {
            let checksum = lead_id
                .bytes()
                .fold(0u32, |acc, b| acc.wrapping_mul(31).wrapping_add(u32::from(b)));
            return format!("{:06}", checksum % 1_000_000);
        }
        let start = digits.len().saturating_sub(6);
        digits[start..].iter().collect()
    }
}

impl IdentityStrategy for PlaceholderIdentity {
    fn identity(&self, lead: &LeadRecord) -> ContactIdentity {
        let identity = real_identity(lead);
        if !lead.is_partial() || identity.first_name.is_some() || identity.last_name.is_some() {
            return identity;
        }
        let n = Self::suffix(&lead.lead_id);
        ContactIdentity {
            first_name: Some(format!("New{}", n)),
            last_name: Some(format!("Lead{}", n)),
        }
    }
}

/// Sends whatever name the seller gave, possibly none.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassthroughIdentity;

impl IdentityStrategy for PassthroughIdentity {
    fn identity(&self, lead: &LeadRecord) -> ContactIdentity {
        real_identity(lead)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomField {
    pub key: String,
    pub field_value: String,
}

/// Contact payload accepted by the CRM.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CrmContact {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    pub phone: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address1: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub postal_code: Option<String>,
    pub country: String,
    pub source: String,
    pub tags: Vec<String>,
    pub custom_fields: Vec<CustomField>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location_id: Option<String>,
}

/// Tag for the asking-price range.
pub fn price_bracket(price: f64) -> &'static str {
    if price < 200_000.0 {
        "under-200k"
    } else if price < 400_000.0 {
        "200k-400k"
    } else if price < 600_000.0 {
        "400k-600k"
    } else if price < 1_000_000.0 {
        "600k-1m"
    } else {
        "1m-plus"
    }
}

fn non_empty(value: &str) -> Option<String> {
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_string())
}

#[derive(Clone)]
pub struct CrmAdapter {
    identity: Arc<dyn IdentityStrategy>,
    location_id: Option<String>,
}

impl CrmAdapter {
    pub fn new(identity: Arc<dyn IdentityStrategy>, location_id: Option<String>) -> Self {
        Self {
            identity,
            location_id,
        }
    }

    pub fn to_contact(&self, lead: &LeadRecord) -> CrmContact {
        let identity = self.identity.identity(lead);

        let has_structured = lead.address_line1.is_some() || lead.city.is_some();
        let (address1, city, state, postal_code) = if has_structured {
            (
                lead.address_line1.clone(),
                lead.city.clone(),
                lead.state.clone(),
                lead.postal_code.clone(),
            )
        } else {
            let parsed = split_address_fallback(&lead.address);
            (
                non_empty(&parsed.address_line1),
                non_empty(&parsed.city),
                non_empty(&parsed.state),
                non_empty(&parsed.postal_code),
            )
        };

        let phone = if is_valid_phone_number(&lead.phone) {
            to_e164(&lead.phone)
        } else {
            lead.phone.clone()
        };

        CrmContact {
            first_name: identity.first_name,
            last_name: identity.last_name,
            email: lead.email.as_deref().and_then(non_empty),
            phone,
            address1,
            city,
            state,
            postal_code,
            country: "US".to_string(),
            source: lead.referral_source.clone(),
            tags: tags(lead),
            custom_fields: custom_fields(lead),
            location_id: self.location_id.clone(),
        }
    }
}

impl Default for CrmAdapter {
    fn default() -> Self {
        Self::new(Arc::new(PlaceholderIdentity), None)
    }
}

fn tags(lead: &LeadRecord) -> Vec<String> {
    let mut tags = vec![if lead.is_partial() {
        "partial-lead".to_string()
    } else {
        "complete-lead".to_string()
    }];
    if let Some(condition) = lead.property_condition {
        tags.push(format!("condition-{}", condition.as_str()));
    }
    if let Some(timeline) = lead.timeline {
        tags.push(format!("timeline-{}", timeline.as_str()));
    }
    if let Some(price) = lead.price {
        tags.push(format!("price-{}", price_bracket(price)));
    }
    match lead.is_property_listed {
        Some(true) => tags.push("listed".to_string()),
        Some(false) => tags.push("not-listed".to_string()),
        None => {}
    }
    tags
}

fn custom_fields(lead: &LeadRecord) -> Vec<CustomField> {
    let mut fields = vec![
        ("lead_id", Some(lead.lead_id.clone())),
        ("submission_type", Some(lead.submission_type.to_string())),
        (
            "property_condition",
            lead.property_condition.map(|c| c.as_str().to_string()),
        ),
        ("timeline", lead.timeline.map(|t| t.as_str().to_string())),
        ("asking_price", lead.asking_price.clone()),
        ("price", lead.price.map(|p| p.to_string())),
        (
            "property_listed",
            lead.is_property_listed.map(|l| if l { "yes" } else { "no" }.to_string()),
        ),
    ];
    if let Some(verification) = &lead.phone_verification {
        fields.push(("phone_line_type", verification.line_type.clone()));
        fields.push(("phone_carrier", verification.carrier.clone()));
    }

    fields
        .into_iter()
        .filter_map(|(key, value)| {
            value.map(|field_value| CustomField {
                key: key.to_string(),
                field_value,
            })
        })
        .collect()
}
