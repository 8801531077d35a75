/// Property-based tests using proptest
/// Tests invariants and properties that should hold for all inputs
use proptest::prelude::*;
use regex::Regex;
use seller_leads_api::parsing::{
    format_phone_for_storage, is_valid_phone_number, parse_price, parse_price_str, phone_digits,
    validate_address, AddressInput,
};
use seller_leads_api::schemas::is_valid_email;
use serde_json::json;

// Property: Price parsing should never panic and never yield a bad number
proptest! {
    #[test]
    fn price_parsing_never_panics(raw in "\\PC*") {
        if let Some(price) = parse_price_str(&raw) {
            prop_assert!(price.is_finite());
            prop_assert!(price >= 0.0);
        }
    }

    #[test]
    fn formatted_prices_parse_to_their_value(n in 0u64..100_000_000u64) {
        let plain = n.to_string();
        let mut grouped = String::new();
        for (i, c) in plain.chars().enumerate() {
            if i > 0 && (plain.len() - i) % 3 == 0 {
                grouped.push(',');
            }
            grouped.push(c);
        }

        prop_assert_eq!(parse_price_str(&plain), Some(n as f64));
        prop_assert_eq!(parse_price_str(&grouped), Some(n as f64));
        prop_assert_eq!(parse_price_str(&format!("$ {}", grouped)), Some(n as f64));
    }

    #[test]
    fn thousand_suffix_multiplies(n in 0u32..100_000u32) {
        prop_assert_eq!(parse_price_str(&format!("{}k", n)), Some(n as f64 * 1_000.0));
        prop_assert_eq!(parse_price_str(&format!("{}K", n)), Some(n as f64 * 1_000.0));
    }

    #[test]
    fn numeric_prices_pass_through(n in 0.0f64..1e12) {
        prop_assert_eq!(parse_price(&json!(n)), Some(n));
    }
}

// Property: Phone formatting is either canonical or the identity
proptest! {
    #[test]
    fn phone_formatting_never_panics(raw in "\\PC*") {
        let _ = format_phone_for_storage(&raw);
    }

    #[test]
    fn ten_digit_phones_are_canonical(digits in "[0-9]{10}", sep in "[ .()-]{0,2}") {
        let raw = format!("{}{}{}{}", &digits[..3], sep, &digits[3..6], &digits[6..]);
        let formatted = format_phone_for_storage(&raw);
        let canonical = Regex::new(r"^\(\d{3}\) \d{3}-\d{4}$").unwrap();

        prop_assert!(canonical.is_match(&formatted));
        prop_assert_eq!(phone_digits(&formatted), digits);
        prop_assert!(is_valid_phone_number(&raw));
    }

    #[test]
    fn other_lengths_are_returned_unchanged(digits in "[0-9]{0,9}|[0-9]{11,15}") {
        prop_assert_eq!(format_phone_for_storage(&digits), digits.clone());
        prop_assert!(!is_valid_phone_number(&digits));
    }
}

// Property: Address validation reports exactly the missing parts
proptest! {
    #[test]
    fn address_validation_matches_missing_fields(
        has_street in any::<bool>(),
        has_city in any::<bool>(),
        has_state in any::<bool>(),
        has_zip in any::<bool>(),
    ) {
        let pick = |present: bool, value: &'static str| if present { value } else { "  " };
        let input = AddressInput {
            address_line1: pick(has_street, "123 Main St"),
            city: pick(has_city, "Austin"),
            state: pick(has_state, "TX"),
            postal_code: has_zip.then_some("78701"),
        };

        let result = validate_address(&input);

        let mut expected = Vec::new();
        if !has_street {
            expected.push("Street address is required");
        }
        if !has_city {
            expected.push("City is required");
        }
        if !has_state {
            expected.push("State is required");
        }

        prop_assert_eq!(result.is_valid, expected.is_empty());
        prop_assert_eq!(result.errors, expected);
    }
}

// Property: Email validation should never panic
proptest! {
    #[test]
    fn email_validation_never_panics(email in "\\PC*") {
        let _ = is_valid_email(&email);
    }

    #[test]
    fn simple_emails_are_valid(
        local in "[a-z]{1,10}",
        domain in "[a-z]{1,10}",
        tld in "[a-z]{2,4}"
    ) {
        let email = format!("{}@{}.{}", local, domain, tld);
        prop_assert!(is_valid_email(&email));
    }

    #[test]
    fn emails_without_domain_dot_are_invalid(local in "[a-z]{1,10}", domain in "[a-z]{3,10}") {
        let email = format!("{}@{}", local, domain);
        prop_assert!(!is_valid_email(&email));
    }
}
