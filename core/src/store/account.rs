use super::{time_col, to_sql_time, RiskStore};
use crate::{
    collaborator::{AccountDirectory, AccountProfile},
    error::RiskResult,
};
use rusqlite::{params, OptionalExtension};

impl RiskStore {
    // ── Account ───────────────────────────────────────────────────

    /// Register or replace an account.
    pub fn insert_account(&self, profile: &AccountProfile) -> RiskResult<()> {
        self.conn().execute(
            "INSERT OR REPLACE INTO account (account_id, customer_id, holder_name, opened_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                profile.account_id,
                profile.customer_id,
                profile.holder_name,
                to_sql_time(profile.opened_at),
            ],
        )?;
        Ok(())
    }

    pub fn accounts(&self) -> RiskResult<Vec<AccountProfile>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT account_id, customer_id, holder_name, opened_at
             FROM account ORDER BY account_id",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(AccountProfile {
                account_id:  row.get(0)?,
                customer_id: row.get(1)?,
                holder_name: row.get(2)?,
                opened_at:   time_col(row, 3)?,
            })
        })?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    pub fn accounts_of_customer(&self, customer_id: &str) -> RiskResult<Vec<String>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT account_id FROM account WHERE customer_id = ?1 ORDER BY account_id",
        )?;
        let rows = stmt.query_map(params![customer_id], |row| row.get(0))?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }
}

impl AccountDirectory for RiskStore {
    fn account(&self, account_id: &str) -> RiskResult<Option<AccountProfile>> {
        let profile = self
            .conn()
            .query_row(
                "SELECT account_id, customer_id, holder_name, opened_at
                 FROM account WHERE account_id = ?1",
                params![account_id],
                |row| {
                    Ok(AccountProfile {
                        account_id:  row.get(0)?,
                        customer_id: row.get(1)?,
                        holder_name: row.get(2)?,
                        opened_at:   time_col(row, 3)?,
                    })
                },
            )
            .optional()?;
        Ok(profile)
    }
}
