//! Sponsor Tracker: creator-facing sponsorship deal tracking.
//!
//! Sled-backed storage, JWT bearer auth, and an Axum REST API with a
//! Stripe-compatible checkout integration.

pub mod auth;
pub mod checkout;
pub mod config;
pub mod dashboard;
pub mod error;
pub mod models;
// REST API module: Axum handlers, auth gate, envelope, OpenAPI docs
pub mod rest;
pub mod sponsorships;
pub mod storage;
pub mod telemetry;
