//! Donation payment backend for Yayasan Ihsan Prihatin
//!
//! Covers the full lifecycle of an online donation: intake and first gateway
//! bill, payment callback reconciliation, bounded retries, receipt issuance
//! and delivery.

pub mod api;
pub mod config;
pub mod database;
pub mod error;
pub mod gateway;
pub mod health;
pub mod logging;
pub mod middleware;
pub mod services;
