//! Normalization helpers shared by the submission schemas and the CRM adapter.
//!
//! Everything here is pure: loosely formatted user or geocoder input goes in,
//! normalized scalar values come out. Nothing in this module panics on bad input.

use once_cell::sync::Lazy;
use phonenumber::country::Id as CountryId;
use phonenumber::Mode;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::models::AddressComponent;

static PRICE_NUMBER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?:\d+(?:\.\d*)?|\.\d+)$").expect("valid price regex"));

/// Parse a loosely formatted asking price.
///
/// Accepts JSON numbers as-is and strings such as `"$ 425,000"`, `"425K"` or
/// `"1.5M"`. Returns `None` for null, empty, negative or unparseable input.
pub fn parse_price(input: &Value) -> Option<f64> {
    match input {
        Value::Null => None,
        Value::Number(n) => n.as_f64().filter(|v| v.is_finite() && *v >= 0.0),
        Value::String(s) => parse_price_str(s),
        _ => None,
    }
}

/// String form of [`parse_price`].
pub fn parse_price_str(raw: &str) -> Option<f64> {
    let cleaned: String = raw
        .chars()
        .filter(|c| *c != '$' && *c != ',' && !c.is_whitespace())
        .collect();

    if cleaned.is_empty() {
        return None;
    }

    let (number, multiplier) = match cleaned.chars().last() {
        Some('k') | Some('K') => (&cleaned[..cleaned.len() - 1], 1_000.0),
        Some('m') | Some('M') => (&cleaned[..cleaned.len() - 1], 1_000_000.0),
        _ => (cleaned.as_str(), 1.0),
    };

    if !PRICE_NUMBER.is_match(number) {
        return None;
    }

    number
        .parse::<f64>()
        .ok()
        .map(|v| v * multiplier)
        .filter(|v| v.is_finite() && *v >= 0.0)
}

/// Digits only, in order.
pub fn phone_digits(raw: &str) -> String {
    raw.chars().filter(|c| c.is_ascii_digit()).collect()
}

/// Format a 10-digit number as `(XXX) XXX-XXXX`.
///
/// Anything that does not strip down to exactly ten digits is returned untouched,
/// so already-formatted international numbers survive the round trip.
pub fn format_phone_for_storage(raw: &str) -> String {
    let digits = phone_digits(raw);
    if digits.len() != 10 {
        return raw.to_string();
    }
    format!("({}) {}-{}", &digits[0..3], &digits[3..6], &digits[6..10])
}

pub fn is_valid_phone_number(raw: &str) -> bool {
    phone_digits(raw).len() == 10
}

/// E.164 representation used for provider lookups and the CRM.
///
/// Parses with the US region through `phonenumber`; numbers the library cannot
/// parse fall back to `+1` followed by the raw digits.
pub fn to_e164(raw: &str) -> String {
    match phonenumber::parse(Some(CountryId::US), raw) {
        Ok(number) => number.format().mode(Mode::E164).to_string(),
        Err(e) => {
            tracing::debug!("phonenumber could not parse '{}': {:?}", raw, e);
            let digits = phone_digits(raw);
            if digits.len() == 11 && digits.starts_with('1') {
                format!("+{}", digits)
            } else {
                format!("+1{}", digits)
            }
        }
    }
}

/// Split a combined name on whitespace.
///
/// The first token is the first name and the remainder the last name. A single
/// token is used for both. Returns `None` for blank input.
pub fn split_full_name(full_name: &str) -> Option<(String, String)> {
    let mut tokens = full_name.split_whitespace();
    let first = tokens.next()?.to_string();
    let rest: Vec<&str> = tokens.collect();
    if rest.is_empty() {
        Some((first.clone(), first))
    } else {
        Some((first, rest.join(" ")))
    }
}

/// Street/city/state/zip extracted from geocoder components.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParsedAddress {
    pub address_line1: String,
    pub city: String,
    pub state: String,
    pub postal_code: String,
}

const CITY_TYPES: [&str; 4] = [
    "locality",
    "sublocality",
    "postal_town",
    "administrative_area_level_2",
];

/// Decompose a geocoder component list.
///
/// City resolution walks `locality`, `sublocality`, `postal_town` and finally
/// the county; the first type present wins regardless of component order.
pub fn parse_address_components(components: &[AddressComponent]) -> ParsedAddress {
    let find = |kind: &str| {
        components
            .iter()
            .find(|c| c.types.iter().any(|t| t == kind))
    };

    let street_number = find("street_number").map(|c| c.long_name.as_str()).unwrap_or("");
    let route = find("route").map(|c| c.long_name.as_str()).unwrap_or("");
    let address_line1 = format!("{} {}", street_number, route).trim().to_string();

    let mut city = String::new();
    for kind in CITY_TYPES {
        if let Some(component) = find(kind) {
            city = component.long_name.clone();
            break;
        }
    }

    let state = find("administrative_area_level_1")
        .map(|c| c.short_name.clone())
        .unwrap_or_default();
    let postal_code = find("postal_code")
        .map(|c| c.long_name.clone())
        .unwrap_or_default();

    ParsedAddress {
        address_line1,
        city,
        state,
        postal_code,
    }
}

/// Input to [`validate_address`].
#[derive(Debug, Clone, Copy, Default)]
pub struct AddressInput<'a> {
    pub address_line1: &'a str,
    pub city: &'a str,
    pub state: &'a str,
    pub postal_code: Option<&'a str>,
}

impl<'a> From<&'a ParsedAddress> for AddressInput<'a> {
    fn from(parsed: &'a ParsedAddress) -> Self {
        Self {
            address_line1: &parsed.address_line1,
            city: &parsed.city,
            state: &parsed.state,
            postal_code: Some(&parsed.postal_code),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressValidation {
    pub is_valid: bool,
    pub errors: Vec<String>,
}

pub fn validate_address(input: &AddressInput<'_>) -> AddressValidation {
    let mut errors = Vec::new();
    if input.address_line1.trim().is_empty() {
        errors.push("Street address is required".to_string());
    }
    if input.city.trim().is_empty() {
        errors.push("City is required".to_string());
    }
    if input.state.trim().is_empty() {
        errors.push("State is required".to_string());
    }
    AddressValidation {
        is_valid: errors.is_empty(),
        errors,
    }
}

/// Best-effort split of an already formatted address string.
///
/// `"1600 Pennsylvania Ave NW, Washington, DC 20500"` becomes street
/// `1600 Pennsylvania Ave NW`, city `Washington`, state `DC`, zip `20500`.
/// Approximate by nature; structured components always take precedence.
pub fn split_address_fallback(address: &str) -> ParsedAddress {
    let segments: Vec<&str> = address.split(',').map(str::trim).collect();

    let address_line1 = segments.first().copied().unwrap_or("").to_string();
    let city = segments.get(1).copied().unwrap_or("").to_string();

    let mut state_zip = segments.get(2).copied().unwrap_or("").split_whitespace();
    let state = state_zip.next().unwrap_or("").to_string();
    let postal_code = state_zip.next().unwrap_or("").to_string();

    ParsedAddress {
        address_line1,
        city,
        state,
        postal_code,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn component(long: &str, short: &str, types: &[&str]) -> AddressComponent {
        AddressComponent {
            long_name: long.to_string(),
            short_name: short.to_string(),
            types: types.iter().map(|t| t.to_string()).collect(),
        }
    }

    #[test]
    fn test_parse_price_documented_formats() {
        assert_eq!(parse_price(&json!("425,000")), Some(425000.0));
        assert_eq!(parse_price(&json!("$ 425,000")), Some(425000.0));
        assert_eq!(parse_price(&json!("425K")), Some(425000.0));
        assert_eq!(parse_price(&json!("1.5M")), Some(1500000.0));
        assert_eq!(parse_price(&json!("abc")), None);
        assert_eq!(parse_price(&json!(0)), Some(0.0));
    }

    #[test]
    fn test_parse_price_empty_and_null() {
        assert_eq!(parse_price(&Value::Null), None);
        assert_eq!(parse_price(&json!("")), None);
        assert_eq!(parse_price(&json!("   ")), None);
        assert_eq!(parse_price(&json!("$")), None);
        assert_eq!(parse_price(&json!("k")), None);
    }

    #[test]
    fn test_parse_price_rejects_negative_and_exotic() {
        assert_eq!(parse_price(&json!(-5)), None);
        assert_eq!(parse_price(&json!("-5")), None);
        assert_eq!(parse_price(&json!("inf")), None);
        assert_eq!(parse_price(&json!("12abc")), None);
        assert_eq!(parse_price(&json!(true)), None);
    }

    #[test]
    fn test_parse_price_lowercase_suffix() {
        assert_eq!(parse_price_str("350k"), Some(350000.0));
        assert_eq!(parse_price_str("2m"), Some(2000000.0));
    }

    #[test]
    fn test_format_phone_ten_digits() {
        assert_eq!(format_phone_for_storage("5551234567"), "(555) 123-4567");
        assert_eq!(format_phone_for_storage("555.123.4567"), "(555) 123-4567");
        assert_eq!(format_phone_for_storage("(555) 123-4567"), "(555) 123-4567");
    }

    #[test]
    fn test_format_phone_passthrough() {
        assert_eq!(format_phone_for_storage("+1 555 123 4567"), "+1 555 123 4567");
        assert_eq!(format_phone_for_storage("12345"), "12345");
        assert!(!is_valid_phone_number("+1 555 123 4567"));
        assert!(is_valid_phone_number("555-123-4567"));
    }

    #[test]
    fn test_to_e164_fallback() {
        assert_eq!(to_e164("555-123-4567"), "+15551234567");
    }

    #[test]
    fn test_split_full_name() {
        assert_eq!(
            split_full_name("John Doe"),
            Some(("John".to_string(), "Doe".to_string()))
        );
        assert_eq!(
            split_full_name("  Mary Ann  Smith "),
            Some(("Mary".to_string(), "Ann Smith".to_string()))
        );
        assert_eq!(
            split_full_name("Cher"),
            Some(("Cher".to_string(), "Cher".to_string()))
        );
        assert_eq!(split_full_name("   "), None);
    }

    #[test]
    fn test_parse_address_components_full() {
        let components = vec![
            component("1600", "1600", &["street_number"]),
            component("Pennsylvania Avenue Northwest", "Pennsylvania Ave NW", &["route"]),
            component("Washington", "Washington", &["locality", "political"]),
            component("District of Columbia", "DC", &["administrative_area_level_1"]),
            component("20500", "20500", &["postal_code"]),
        ];

        let parsed = parse_address_components(&components);
        assert_eq!(parsed.address_line1, "1600 Pennsylvania Avenue Northwest");
        assert_eq!(parsed.city, "Washington");
        assert_eq!(parsed.state, "DC");
        assert_eq!(parsed.postal_code, "20500");
    }

    #[test]
    fn test_parse_address_components_city_priority() {
        // County listed first must not shadow a later postal_town.
        let components = vec![
            component("Kings County", "Kings County", &["administrative_area_level_2"]),
            component("Brooklyn", "Brooklyn", &["sublocality", "political"]),
            component("NY", "NY", &["administrative_area_level_1"]),
        ];
        assert_eq!(parse_address_components(&components).city, "Brooklyn");

        let county_only = vec![component(
            "Travis County",
            "Travis County",
            &["administrative_area_level_2"],
        )];
        assert_eq!(parse_address_components(&county_only).city, "Travis County");
    }

    #[test]
    fn test_parse_address_components_missing_parts() {
        let parsed = parse_address_components(&[component("Main St", "Main St", &["route"])]);
        assert_eq!(parsed.address_line1, "Main St");
        assert_eq!(parsed.city, "");
        assert_eq!(parsed.postal_code, "");
    }

    #[test]
    fn test_validate_address_messages() {
        let result = validate_address(&AddressInput::default());
        assert!(!result.is_valid);
        assert_eq!(
            result.errors,
            vec![
                "Street address is required",
                "City is required",
                "State is required"
            ]
        );
    }

    #[test]
    fn test_validate_address_postal_code_optional() {
        let input = AddressInput {
            address_line1: "1 Main St",
            city: "Austin",
            state: "TX",
            postal_code: None,
        };
        assert!(validate_address(&input).is_valid);
    }

    #[test]
    fn test_split_address_fallback() {
        let parsed = split_address_fallback("1600 Pennsylvania Ave NW, Washington, DC 20500");
        assert_eq!(parsed.address_line1, "1600 Pennsylvania Ave NW");
        assert_eq!(parsed.city, "Washington");
        assert_eq!(parsed.state, "DC");
        assert_eq!(parsed.postal_code, "20500");

        let short = split_address_fallback("123 Main St");
        assert_eq!(short.address_line1, "123 Main St");
        assert!(short.city.is_empty());
        assert!(short.state.is_empty());
    }
}
