use super::{time_col, to_sql_time, RiskStore};
use crate::{
    collaborator::ScoreStore,
    error::RiskResult,
    score_ledger::{AccountStatus, ScoreRecord},
};
use rusqlite::{params, types::Type};

impl RiskStore {
    // ── Score ledger checkpoint ───────────────────────────────────

    /// Upsert every record in one transaction.
    pub fn save_ledger(&self, records: &[ScoreRecord]) -> RiskResult<()> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO score_ledger (
                    customer_id, score, total_reports, total_transactions,
                    total_amount, last_updated, account_status
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                ON CONFLICT(customer_id) DO UPDATE SET
                    score              = excluded.score,
                    total_reports      = excluded.total_reports,
                    total_transactions = excluded.total_transactions,
                    total_amount       = excluded.total_amount,
                    last_updated       = excluded.last_updated,
                    account_status     = excluded.account_status",
            )?;
            for r in records {
                stmt.execute(params![
                    r.customer_id,
                    r.score as i64,
                    r.total_reports as i64,
                    r.total_transactions as i64,
                    r.total_amount,
                    to_sql_time(r.last_updated),
                    r.account_status.as_str(),
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    pub fn load_ledger(&self) -> RiskResult<Vec<ScoreRecord>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT customer_id, score, total_reports, total_transactions,
                    total_amount, last_updated, account_status
             FROM score_ledger ORDER BY customer_id",
        )?;
        let rows = stmt.query_map([], |row| {
            let status: String = row.get(6)?;
            Ok(ScoreRecord {
                customer_id:        row.get(0)?,
                score:              row.get::<_, i64>(1)?.clamp(0, 100) as u8,
                total_reports:      row.get::<_, i64>(2)? as u32,
                total_transactions: row.get::<_, i64>(3)? as u32,
                total_amount:       row.get(4)?,
                last_updated:       time_col(row, 5)?,
                account_status:     AccountStatus::parse(&status).ok_or_else(|| {
                    rusqlite::Error::FromSqlConversionFailure(
                        6,
                        Type::Text,
                        format!("unknown account status {status}").into(),
                    )
                })?,
            })
        })?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }
}

impl ScoreStore for RiskStore {
    fn save_score(&self, record: &ScoreRecord) -> RiskResult<()> {
        self.save_ledger(std::slice::from_ref(record))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn checkpoint_overwrites_previous_rows() {
        let store = RiskStore::in_memory().unwrap();
        store.migrate().unwrap();
        let at = NaiveDate::from_ymd_opt(2025, 2, 1).unwrap().and_hms_opt(8, 30, 0).unwrap();
        let mut record = ScoreRecord {
            customer_id:        "cust-1".into(),
            score:              92,
            total_reports:      1,
            total_transactions: 4,
            total_amount:       820.5,
            last_updated:       at,
            account_status:     AccountStatus::Normal,
        };
        store.save_ledger(&[record.clone()]).unwrap();
        record.score = 60;
        record.account_status = AccountStatus::Monitored;
        store.save_ledger(&[record.clone()]).unwrap();

        assert_eq!(store.load_ledger().unwrap(), vec![record]);
    }

    #[test]
    fn single_row_upsert_leaves_others_alone() {
        let store = RiskStore::in_memory().unwrap();
        store.migrate().unwrap();
        let at = NaiveDate::from_ymd_opt(2025, 2, 1).unwrap().and_hms_opt(8, 30, 0).unwrap();
        let base = ScoreRecord {
            customer_id:        "cust-1".into(),
            score:              100,
            total_reports:      0,
            total_transactions: 0,
            total_amount:       0.0,
            last_updated:       at,
            account_status:     AccountStatus::Normal,
        };
        let other = ScoreRecord {
            customer_id:    "cust-2".into(),
            score:          30,
            account_status: AccountStatus::Blocked,
            ..base.clone()
        };
        store.save_ledger(&[base.clone(), other.clone()]).unwrap();

        let penalised = ScoreRecord { score: 92, total_reports: 1, ..base };
        store.save_score(&penalised).unwrap();

        assert_eq!(store.load_ledger().unwrap(), vec![penalised, other]);
    }
}
