//! Transfer requests and committed transactions.
//!
//! A `TransferRequest` is what reaches the gate. A `Transaction` only
//! exists once the gate has committed it with a final status; it is
//! never updated afterwards.

use crate::{
    error::{RiskError, RiskResult},
    types::{AccountId, Score, TransactionId},
};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TransferRequest {
    pub transaction_id:      TransactionId,
    pub origin_account:      AccountId,
    pub destination_account: AccountId,
    pub amount:              f64,
    #[serde(default)]
    pub description:         String,
    pub requested_at:        NaiveDateTime,
}

impl TransferRequest {
    /// Boundary checks. A request that fails here never reaches the gate.
    pub fn validate(&self) -> RiskResult<()> {
        if self.transaction_id.trim().is_empty() {
            return Err(RiskError::validation("transaction_id", "must not be empty"));
        }
        if self.origin_account.trim().is_empty() {
            return Err(RiskError::validation("origin_account", "must not be empty"));
        }
        if self.destination_account.trim().is_empty() {
            return Err(RiskError::validation("destination_account", "must not be empty"));
        }
        if self.origin_account == self.destination_account {
            return Err(RiskError::validation(
                "destination_account",
                "must differ from origin_account",
            ));
        }
        if !self.amount.is_finite() || self.amount <= 0.0 {
            return Err(RiskError::validation("amount", format!("{} is not a positive amount", self.amount)));
        }
        if self.description.chars().count() > 140 {
            return Err(RiskError::validation("description", "longer than 140 characters"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionStatus {
    Completed,
    Suspicious,
    Blocked,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Completed  => "COMPLETED",
            TransactionStatus::Suspicious => "SUSPICIOUS",
            TransactionStatus::Blocked    => "BLOCKED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "COMPLETED"  => Some(TransactionStatus::Completed),
            "SUSPICIOUS" => Some(TransactionStatus::Suspicious),
            "BLOCKED"    => Some(TransactionStatus::Blocked),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Transaction {
    pub id:                     TransactionId,
    pub origin_account:         AccountId,
    pub destination_account:    AccountId,
    pub amount:                 f64,
    pub description:            String,
    pub timestamp:              NaiveDateTime,
    pub status:                 TransactionStatus,
    pub risk_score_at_decision: Score,
}

impl Transaction {
    pub fn commit(request: &TransferRequest, status: TransactionStatus, score: Score) -> Self {
        Self {
            id:                     request.transaction_id.clone(),
            origin_account:         request.origin_account.clone(),
            destination_account:    request.destination_account.clone(),
            amount:                 request.amount,
            description:            request.description.clone(),
            timestamp:              request.requested_at,
            status,
            risk_score_at_decision: score,
        }
    }
}
