use super::{time_col, to_sql_time, RiskStore};
use crate::{
    collaborator::{ActivityHistory, ReceiptStats, ReportStats, TransactionJournal},
    error::RiskResult,
    risk_gate::Decision,
    transaction::{Transaction, TransactionStatus},
};
use chrono::NaiveDateTime;
use rusqlite::{params, types::Type, OptionalExtension};

impl RiskStore {
    // ── Transactions ──────────────────────────────────────────────

    pub fn transaction(&self, transaction_id: &str) -> RiskResult<Option<Transaction>> {
        let tx = self
            .conn()
            .query_row(
                "SELECT transaction_id, origin_account, destination_account, amount,
                        description, occurred_at, status, risk_score_at_decision
                 FROM pix_transaction WHERE transaction_id = ?1",
                params![transaction_id],
                |row| {
                    let status: String = row.get(6)?;
                    Ok(Transaction {
                        id:                     row.get(0)?,
                        origin_account:         row.get(1)?,
                        destination_account:    row.get(2)?,
                        amount:                 row.get(3)?,
                        description:            row.get(4)?,
                        timestamp:              time_col(row, 5)?,
                        status:                 TransactionStatus::parse(&status).ok_or_else(|| {
                            rusqlite::Error::FromSqlConversionFailure(
                                6,
                                Type::Text,
                                format!("unknown transaction status {status}").into(),
                            )
                        })?,
                        risk_score_at_decision: row.get::<_, i64>(7)?.clamp(0, 100) as u8,
                    })
                },
            )
            .optional()?;
        Ok(tx)
    }

    pub fn transaction_count(&self, status: Option<TransactionStatus>) -> RiskResult<u64> {
        let conn = self.conn();
        let count: i64 = match status {
            Some(s) => conn.query_row(
                "SELECT COUNT(*) FROM pix_transaction WHERE status = ?1",
                params![s.as_str()],
                |row| row.get(0),
            )?,
            None => conn.query_row("SELECT COUNT(*) FROM pix_transaction", [], |row| row.get(0))?,
        };
        Ok(count as u64)
    }

    pub fn receipt_totals(&self, account_id: &str, since: NaiveDateTime) -> RiskResult<ReceiptStats> {
        let (count, total): (i64, f64) = self.conn().query_row(
            "SELECT COUNT(*), COALESCE(SUM(amount), 0.0)
             FROM pix_transaction
             WHERE destination_account = ?1 AND status = 'COMPLETED' AND occurred_at >= ?2",
            params![account_id, to_sql_time(since)],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        Ok(ReceiptStats { count: count as u32, total_amount: total })
    }

    pub fn timestamps_for(&self, account_id: &str, since: NaiveDateTime) -> RiskResult<Vec<NaiveDateTime>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT occurred_at FROM pix_transaction
             WHERE (origin_account = ?1 OR destination_account = ?1) AND occurred_at >= ?2
             ORDER BY occurred_at",
        )?;
        let rows = stmt.query_map(params![account_id, to_sql_time(since)], |row| time_col(row, 0))?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    // ── Gate decisions ────────────────────────────────────────────

    pub fn decision_count(&self) -> RiskResult<u64> {
        let count: i64 = self
            .conn()
            .query_row("SELECT COUNT(*) FROM gate_decision", [], |row| row.get(0))?;
        Ok(count as u64)
    }
}

impl TransactionJournal for RiskStore {
    fn commit_transaction(&self, tx: &Transaction) -> RiskResult<()> {
        self.conn().execute(
            "INSERT INTO pix_transaction (
                transaction_id, origin_account, destination_account, amount,
                description, occurred_at, status, risk_score_at_decision
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                tx.id,
                tx.origin_account,
                tx.destination_account,
                tx.amount,
                tx.description,
                to_sql_time(tx.timestamp),
                tx.status.as_str(),
                tx.risk_score_at_decision as i64,
            ],
        )?;
        Ok(())
    }

    /// First write wins; a replayed decision never overwrites the stored one.
    fn record_decision(&self, decision: &Decision) -> RiskResult<()> {
        let payload = serde_json::to_string(decision)?;
        self.conn().execute(
            "INSERT OR IGNORE INTO gate_decision (transaction_id, action, score, decided_at, payload)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                decision.transaction_id,
                decision.action.as_str(),
                decision.score as i64,
                to_sql_time(decision.decided_at),
                payload,
            ],
        )?;
        Ok(())
    }

    fn find_decision(&self, transaction_id: &str) -> RiskResult<Option<Decision>> {
        let payload: Option<String> = self
            .conn()
            .query_row(
                "SELECT payload FROM gate_decision WHERE transaction_id = ?1",
                params![transaction_id],
                |row| row.get(0),
            )
            .optional()?;
        match payload {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }
}

impl ActivityHistory for RiskStore {
    fn report_stats(&self, account_id: &str, since: NaiveDateTime) -> RiskResult<ReportStats> {
        self.report_totals(account_id, since)
    }

    fn receipt_stats(&self, account_id: &str, since: NaiveDateTime) -> RiskResult<ReceiptStats> {
        self.receipt_totals(account_id, since)
    }

    fn transaction_timestamps(&self, account_id: &str, since: NaiveDateTime) -> RiskResult<Vec<NaiveDateTime>> {
        self.timestamps_for(account_id, since)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transaction::TransferRequest;
    use chrono::{Duration, NaiveDate};

    fn at(d: u32, h: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 3, d).unwrap().and_hms_opt(h, 0, 0).unwrap()
    }

    fn tx(id: &str, to: &str, amount: f64, when: NaiveDateTime, status: TransactionStatus) -> Transaction {
        let request = TransferRequest {
            transaction_id:      id.into(),
            origin_account:      "acc-src".into(),
            destination_account: to.into(),
            amount,
            description:         String::new(),
            requested_at:        when,
        };
        Transaction::commit(&request, status, 80)
    }

    #[test]
    fn receipts_count_completed_inbound_in_window() {
        let store = RiskStore::in_memory().unwrap();
        store.migrate().unwrap();
        store.commit_transaction(&tx("t1", "acc-dst", 100.0, at(1, 10), TransactionStatus::Completed)).unwrap();
        store.commit_transaction(&tx("t2", "acc-dst", 50.0, at(20, 10), TransactionStatus::Completed)).unwrap();
        store.commit_transaction(&tx("t3", "acc-dst", 999.0, at(21, 10), TransactionStatus::Blocked)).unwrap();
        store.commit_transaction(&tx("t4", "acc-other", 70.0, at(21, 11), TransactionStatus::Completed)).unwrap();

        let stats = store.receipt_stats("acc-dst", at(10, 0)).unwrap();
        assert_eq!(stats.count, 1);
        assert_eq!(stats.total_amount, 50.0);

        let stamps = store.transaction_timestamps("acc-dst", at(1, 0) - Duration::days(1)).unwrap();
        assert_eq!(stamps, vec![at(1, 10), at(20, 10), at(21, 10)]);
        assert_eq!(store.transaction("t3").unwrap().unwrap().status, TransactionStatus::Blocked);
    }

    #[test]
    fn duplicate_commit_is_rejected() {
        let store = RiskStore::in_memory().unwrap();
        store.migrate().unwrap();
        let t = tx("t1", "acc-dst", 10.0, at(2, 9), TransactionStatus::Completed);
        store.commit_transaction(&t).unwrap();
        assert!(store.commit_transaction(&t).is_err());
    }
}

