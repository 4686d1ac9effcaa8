//! Shared primitive types used across the risk engine.

/// Identifier of the customer that owns a score ledger entry.
pub type CustomerId = String;

/// Identifier of a payment account (an instant-transfer key resolves to one).
pub type AccountId = String;

/// Identifier of a candidate or committed transfer.
pub type TransactionId = String;

/// Confidence score on the 0–100 scale. Lower means riskier.
pub type Score = u8;

/// Clamp any signed intermediate result onto the score scale.
pub fn clamp_score(value: i64) -> Score {
    value.clamp(0, 100) as Score
}
