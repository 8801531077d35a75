//! Seller Lead Intake API Library
//!
//! Accepts seller lead submissions from the public funnel, validates and
//! normalizes them, verifies the phone number, and fans the lead out to an
//! automation webhook, a spreadsheet backup and a CRM.
//!
//! # Modules
//!
//! - `config`: Configuration management.
//! - `crm_adapter`: Lead → CRM contact mapping and identity strategies.
//! - `crm_client`: CRM contacts API client.
//! - `delivery`: Destination trait and the delivery orchestrator.
//! - `errors`: Error handling types.
//! - `handlers`: HTTP request handlers.
//! - `intake`: Validation → verification → delivery pipeline.
//! - `models`: Core data models.
//! - `parsing`: Price, phone and address parsers.
//! - `phone_verification`: Carrier lookup with a verification cache.
//! - `rate_limit`: Per-IP submission throttle.
//! - `retry`: Retry policy with capped exponential backoff.
//! - `router`: Routes and middleware.
//! - `schemas`: Submission schemas and validation.
//! - `sheets_client`: Spreadsheet backup client.
//! - `webhook_client`: Automation webhook client.

pub mod config;
pub mod crm_adapter;
pub mod crm_client;
pub mod delivery;
pub mod errors;
pub mod handlers;
pub mod intake;
pub mod models;
pub mod parsing;
pub mod phone_verification;
pub mod rate_limit;
pub mod retry;
pub mod router;
pub mod schemas;
pub mod sheets_client;
pub mod webhook_client;
