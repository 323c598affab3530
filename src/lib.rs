//! BACEN CCS Gateway Library
//!
//! Queries the Central Bank's CCS registry for bank-account relationships,
//! drives the detailing workflow (on-demand, queued and harvested) and keeps
//! the resulting request trees in PostgreSQL.
//!
//! # Modules
//!
//! - `api`: HTTP-layer components (handlers, caller extraction).
//! - `core`: Workflow engine, submission window and validation.
//! - `integrations`: BACEN registry client and payloads.
//! - `auth`: JWT caller identity extractor.
//! - `bank_enricher`: Participant (bank) name resolution with caching.
//! - `ccs_storage`: Relationship store trait and PostgreSQL implementation.
//! - `ccs_workflow`: CCS workflow engine.
//! - `circuit_breaker`: Circuit breaker for the participant registry.
//! - `config`: Configuration management.
//! - `db`: Database connection, pool and migrations.
//! - `errors`: Error handling types.
//! - `handlers`: HTTP request handlers.
//! - `models`: Core data models.
//! - `registry_client`: BACEN CCS HTTP client.
//! - `registry_models`: BACEN XML/JSON payloads.
//! - `time_window`: Clock and submission window.
//! - `validation`: Input validation.

pub mod api;
pub mod core;
pub mod integrations;

// Re-export primary modules for shared use in tests and other binaries
pub mod auth;
pub mod bank_enricher;
pub mod ccs_storage;
pub mod ccs_workflow;
pub mod circuit_breaker;
pub mod config;
pub mod db;
pub mod errors;
pub mod handlers;
pub mod models;
pub mod registry_client;
pub mod registry_models;
pub mod time_window;
pub mod validation;
