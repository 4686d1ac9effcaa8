//! Fraud-risk scoring and real-time gating for instant transfers.

pub mod clock;
pub mod collaborator;
pub mod config;
pub mod engine;
pub mod error;
pub mod event;
pub mod report;
pub mod risk_gate;
pub mod score_ledger;
pub mod store;
pub mod suspicion_classifier;
pub mod temporal_features;
pub mod transaction;
pub mod types;
