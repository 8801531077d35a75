/// Integration tests with mocked external APIs
/// Exercises every outbound client against wiremock without hitting real services
use chrono::Utc;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

use seller_leads_api::config::{CrmConfig, PhoneLookupConfig, SheetsConfig, WebhookConfig};
use seller_leads_api::crm_client::CrmClient;
use seller_leads_api::delivery::{DeliveryError, DeliveryOrchestrator, Destination, LeadDestination};
use seller_leads_api::models::{LeadRecord, PropertyCondition, SubmissionType, Timeline};
use seller_leads_api::phone_verification::{LookupApiClient, PhoneLookup, PhoneVerifier};
use seller_leads_api::retry::RetryPolicy;
use seller_leads_api::sheets_client::SheetsClient;
use seller_leads_api::webhook_client::WebhookClient;
use wiremock::matchers::{
    basic_auth, bearer_token, body_partial_json, header, method, path, query_param,
};
use wiremock::{Mock, MockServer, ResponseTemplate};

const TIMEOUT: Duration = Duration::from_secs(2);

fn fast_retry() -> RetryPolicy {
    RetryPolicy::new(3, 2, Duration::from_millis(1), Some(Duration::from_millis(5)))
}

fn test_lead(submission_type: SubmissionType) -> LeadRecord {
    let now = Utc::now();
    let complete = submission_type == SubmissionType::Complete;
    LeadRecord {
        lead_id: "lead_1718000000000_a1b2c3d4".to_string(),
        timestamp: now,
        last_updated: now,
        submission_type,
        first_name: complete.then(|| "John".to_string()),
        last_name: complete.then(|| "Doe".to_string()),
        email: complete.then(|| "john@example.com".to_string()),
        phone: "(512) 555-0100".to_string(),
        address: "123 Main St, Austin, TX 78701".to_string(),
        address_line1: Some("123 Main St".to_string()),
        city: Some("Austin".to_string()),
        state: Some("TX".to_string()),
        postal_code: Some("78701".to_string()),
        place_id: None,
        property_condition: complete.then_some(PropertyCondition::Good),
        timeline: complete.then_some(Timeline::Asap),
        price: complete.then_some(425_000.0),
        asking_price: complete.then(|| "425,000".to_string()),
        is_property_listed: None,
        referral_source: "website".to_string(),
        consent: Some(true),
        phone_verification: None,
    }
}

fn sheets_config(base_url: String) -> SheetsConfig {
    SheetsConfig {
        spreadsheet_id: "sheet-123".to_string(),
        access_token: "sheets-token".to_string(),
        tab: "Leads".to_string(),
        base_url: format!("{}/v4/spreadsheets", base_url),
        timeout: TIMEOUT,
    }
}

fn crm_config(base_url: String, auth_header: Option<&str>) -> CrmConfig {
    CrmConfig {
        base_url,
        api_key: "crm-key".to_string(),
        auth_header: auth_header.map(str::to_string),
        api_version: Some("2021-07-28".to_string()),
        location_id: Some("loc-1".to_string()),
        timeout: TIMEOUT,
    }
}

// ============ Webhook ============

#[tokio::test]
async fn test_webhook_posts_lead_json() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/hooks/lead"))
        .and(body_partial_json(json!({
            "leadId": "lead_1718000000000_a1b2c3d4",
            "submissionType": "complete",
            "firstName": "John",
            "price": 425000.0
        })))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = WebhookClient::new(&WebhookConfig {
        url: format!("{}/hooks/lead", mock_server.uri()),
        timeout: TIMEOUT,
    })
    .unwrap();

    let result = client.deliver(&test_lead(SubmissionType::Complete)).await;
    assert!(result.is_ok());
}

#[tokio::test]
async fn test_webhook_non_2xx_is_an_error() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500).set_body_string("scenario disabled"))
        .mount(&mock_server)
        .await;

    let client = WebhookClient::new(&WebhookConfig {
        url: mock_server.uri(),
        timeout: TIMEOUT,
    })
    .unwrap();

    let err = client
        .deliver(&test_lead(SubmissionType::Partial))
        .await
        .unwrap_err();
    assert_eq!(
        err,
        DeliveryError::Status {
            status: 500,
            message: "scenario disabled".to_string()
        }
    );
}

#[tokio::test]
async fn test_webhook_timeout_is_reported() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(500)))
        .mount(&mock_server)
        .await;

    let client = WebhookClient::new(&WebhookConfig {
        url: mock_server.uri(),
        timeout: Duration::from_millis(50),
    })
    .unwrap();

    let err = client
        .deliver(&test_lead(SubmissionType::Partial))
        .await
        .unwrap_err();
    assert!(matches!(err, DeliveryError::Timeout(_)));
}

// ============ Spreadsheet ============

#[tokio::test]
async fn test_sheets_appends_new_lead() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v4/spreadsheets/sheet-123/values/Leads!A:A"))
        .and(bearer_token("sheets-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "range": "Leads!A1:A2",
            "values": [["Lead ID"], ["lead_other"]]
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path("/v4/spreadsheets/sheet-123/values/Leads!A1:append"))
        .and(query_param("valueInputOption", "RAW"))
        .and(query_param("insertDataOption", "INSERT_ROWS"))
        .and(body_partial_json(json!({
            "values": [["lead_1718000000000_a1b2c3d4"]]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "updates": { "updatedRange": "Leads!A3:U3" }
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = SheetsClient::new(&sheets_config(mock_server.uri())).unwrap();
    let receipt = client
        .deliver(&test_lead(SubmissionType::Partial))
        .await
        .unwrap();
    assert_eq!(receipt.reference.as_deref(), Some("Leads!A3:U3"));
}

#[tokio::test]
async fn test_sheets_updates_existing_row() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v4/spreadsheets/sheet-123/values/Leads!A:A"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "values": [["Lead ID"], ["lead_other"], ["lead_1718000000000_a1b2c3d4"]]
        })))
        .mount(&mock_server)
        .await;

    Mock::given(method("PUT"))
        .and(path("/v4/spreadsheets/sheet-123/values/Leads!A3"))
        .and(query_param("valueInputOption", "RAW"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&mock_server)
        .await;

    let client = SheetsClient::new(&sheets_config(mock_server.uri())).unwrap();
    let receipt = client
        .deliver(&test_lead(SubmissionType::Complete))
        .await
        .unwrap();
    assert_eq!(receipt.reference.as_deref(), Some("Leads!A3"));
}

#[tokio::test]
async fn test_sheets_empty_sheet_appends() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "range": "Leads!A1:A1" })))
        .mount(&mock_server)
        .await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = SheetsClient::new(&sheets_config(mock_server.uri())).unwrap();
    let receipt = client
        .deliver(&test_lead(SubmissionType::Partial))
        .await
        .unwrap();
    assert!(receipt.reference.is_none());
}

#[tokio::test]
async fn test_sheets_formula_text_is_stored_verbatim() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "range": "Leads!A1:A1" })))
        .mount(&mock_server)
        .await;

    Mock::given(method("POST"))
        .and(query_param("valueInputOption", "RAW"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(1)
        .mount(&mock_server)
        .await;

    let mut lead = test_lead(SubmissionType::Complete);
    lead.first_name = Some("=HYPERLINK(\"http://evil.example\")".to_string());

    let client = SheetsClient::new(&sheets_config(mock_server.uri())).unwrap();
    client.deliver(&lead).await.unwrap();

    let requests = mock_server.received_requests().await.unwrap();
    let append = requests
        .iter()
        .find(|r| r.method.as_str() == "POST")
        .unwrap();
    let body: serde_json::Value = serde_json::from_slice(&append.body).unwrap();
    assert_eq!(body["values"][0][4], "=HYPERLINK(\"http://evil.example\")");
}

#[tokio::test]
async fn test_sheets_auth_failure() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(401).set_body_string("token expired"))
        .mount(&mock_server)
        .await;

    let client = SheetsClient::new(&sheets_config(mock_server.uri())).unwrap();
    let err = client
        .deliver(&test_lead(SubmissionType::Partial))
        .await
        .unwrap_err();
    assert!(err.is_auth());
}

// ============ CRM ============

#[tokio::test]
async fn test_crm_creates_contact() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/contacts/"))
        .and(bearer_token("crm-key"))
        .and(header("Version", "2021-07-28"))
        .and(body_partial_json(json!({
            "firstName": "John",
            "lastName": "Doe",
            "email": "john@example.com",
            "phone": "+15125550100",
            "locationId": "loc-1",
            "tags": ["complete-lead", "condition-good", "timeline-asap", "price-400k-600k"]
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "contact": { "id": "c-1" }
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = CrmClient::new(&crm_config(mock_server.uri(), None)).unwrap();
    let receipt = client
        .deliver(&test_lead(SubmissionType::Complete))
        .await
        .unwrap();
    assert_eq!(receipt.reference.as_deref(), Some("c-1"));
}

#[tokio::test]
async fn test_crm_partial_lead_gets_placeholder_name() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/contacts/"))
        .and(body_partial_json(json!({
            "firstName": "New001234",
            "lastName": "Lead001234",
            "tags": ["partial-lead"]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "c-2" })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = CrmClient::new(&crm_config(mock_server.uri(), None)).unwrap();
    let receipt = client
        .deliver(&test_lead(SubmissionType::Partial))
        .await
        .unwrap();
    assert_eq!(receipt.reference.as_deref(), Some("c-2"));

    let requests = mock_server.received_requests().await.unwrap();
    let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
    assert!(body.get("email").is_none());
}

#[tokio::test]
async fn test_crm_duplicate_falls_back_to_update() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/contacts/"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "message": "This location does not allow duplicated contacts.",
            "meta": { "contactId": "c-9" }
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("PUT"))
        .and(path("/contacts/c-9"))
        .and(body_partial_json(json!({ "firstName": "John" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "contact": { "id": "c-9" } })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = CrmClient::new(&crm_config(mock_server.uri(), None)).unwrap();
    let receipt = client
        .deliver(&test_lead(SubmissionType::Complete))
        .await
        .unwrap();
    assert_eq!(receipt.reference.as_deref(), Some("c-9"));

    let requests = mock_server.received_requests().await.unwrap();
    let update: serde_json::Value = serde_json::from_slice(&requests[1].body).unwrap();
    assert!(update.get("locationId").is_none());
}

#[tokio::test]
async fn test_crm_conflict_without_id_is_terminal() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(409).set_body_string("conflict"))
        .expect(1)
        .mount(&mock_server)
        .await;

    let crm = Arc::new(CrmClient::new(&crm_config(mock_server.uri(), None)).unwrap());
    let report = DeliveryOrchestrator::new()
        .with_crm(crm, fast_retry())
        .deliver(&test_lead(SubmissionType::Complete))
        .await;

    let outcome = report.outcome(Destination::Crm).unwrap();
    assert!(!outcome.success);
    assert_eq!(outcome.attempts, 1);
}

#[tokio::test]
async fn test_crm_api_key_header_auth() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/contacts/"))
        .and(header("X-API-Key", "crm-key"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "contact": { "id": "c-3" } })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = CrmClient::new(&crm_config(mock_server.uri(), Some("X-API-Key"))).unwrap();
    assert!(client
        .deliver(&test_lead(SubmissionType::Complete))
        .await
        .is_ok());
}

// ============ Orchestrator retry behaviour ============

#[tokio::test]
async fn test_crm_auth_failure_is_not_retried() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/contacts/"))
        .respond_with(ResponseTemplate::new(401).set_body_string("Invalid JWT"))
        .expect(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path("/hook"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&mock_server)
        .await;

    let crm = Arc::new(CrmClient::new(&crm_config(mock_server.uri(), None)).unwrap());
    let webhook = Arc::new(
        WebhookClient::new(&WebhookConfig {
            url: format!("{}/hook", mock_server.uri()),
            timeout: TIMEOUT,
        })
        .unwrap(),
    );

    let report = DeliveryOrchestrator::new()
        .with_webhook(webhook, fast_retry())
        .with_crm(crm, fast_retry())
        .deliver(&test_lead(SubmissionType::Complete))
        .await;

    assert!(report.any_succeeded());
    let crm_outcome = report.outcome(Destination::Crm).unwrap();
    assert_eq!(crm_outcome.attempts, 1);
    assert!(report.warning().unwrap().contains("crm (failed"));
}

#[tokio::test]
async fn test_webhook_recovers_after_transient_failures() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .expect(2)
        .mount(&mock_server)
        .await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&mock_server)
        .await;

    let webhook = Arc::new(
        WebhookClient::new(&WebhookConfig {
            url: mock_server.uri(),
            timeout: TIMEOUT,
        })
        .unwrap(),
    );

    let report = DeliveryOrchestrator::new()
        .with_webhook(webhook, fast_retry())
        .deliver(&test_lead(SubmissionType::Partial))
        .await;

    let outcome = report.outcome(Destination::Webhook).unwrap();
    assert!(outcome.success);
    assert_eq!(outcome.attempts, 3);
}

#[tokio::test]
async fn test_spreadsheet_is_attempted_once() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .expect(1)
        .mount(&mock_server)
        .await;

    let sheets = Arc::new(SheetsClient::new(&sheets_config(mock_server.uri())).unwrap());
    let report = DeliveryOrchestrator::new()
        .with_spreadsheet(sheets)
        .deliver(&test_lead(SubmissionType::Partial))
        .await;

    assert!(!report.any_succeeded());
    assert!(report.failure_summary().contains("spreadsheet: HTTP 503"));
}

// ============ Phone lookup ============

fn lookup_config(base_url: String) -> PhoneLookupConfig {
    PhoneLookupConfig {
        account_sid: "AC123".to_string(),
        auth_token: "secret".to_string(),
        base_url,
        timeout: TIMEOUT,
    }
}

#[tokio::test]
async fn test_phone_lookup_valid_number() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v2/PhoneNumbers/+15125550100"))
        .and(query_param("Fields", "line_type_intelligence"))
        .and(basic_auth("AC123", "secret"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "valid": true,
            "phone_number": "+15125550100",
            "line_type_intelligence": { "type": "mobile", "carrier_name": "Verizon Wireless" }
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = LookupApiClient::new(&lookup_config(mock_server.uri())).unwrap();
    let result = client.lookup("+15125550100").await.unwrap();
    assert!(result.is_valid);
    assert_eq!(result.line_type.as_deref(), Some("mobile"));
    assert_eq!(result.carrier.as_deref(), Some("Verizon Wireless"));
}

#[tokio::test]
async fn test_phone_lookup_not_found_is_invalid() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&mock_server)
        .await;

    let client = LookupApiClient::new(&lookup_config(mock_server.uri())).unwrap();
    let result = client.lookup("+15125550100").await.unwrap();
    assert!(!result.is_valid);
    assert!(!result.provider_failed());
}

#[tokio::test]
async fn test_phone_verifier_caches_across_formats() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "valid": true,
            "phone_number": "+15125550100"
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client: Arc<dyn PhoneLookup> =
        Arc::new(LookupApiClient::new(&lookup_config(mock_server.uri())).unwrap());
    let verifier = PhoneVerifier::new(Some(client), Duration::from_secs(60));

    assert!(verifier.verify("(512) 555-0100").await.is_valid);
    assert!(verifier.verify("512.555.0100").await.is_valid);
}

#[tokio::test]
async fn test_phone_provider_error_falls_back() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&mock_server)
        .await;

    let client: Arc<dyn PhoneLookup> =
        Arc::new(LookupApiClient::new(&lookup_config(mock_server.uri())).unwrap());
    let verifier = PhoneVerifier::new(Some(client), Duration::from_secs(60));

    let result = verifier.verify("5125550100").await;
    assert!(result.provider_failed());
}
