use super::{time_col, to_sql_time, RiskStore};
use crate::{
    collaborator::{ReportSink, ReportStats},
    error::{RiskError, RiskResult},
    report::{
        generate_protocol, NewReport, Report, ReportBreakdown, ReportPriority, ReportStatus, ReportType,
    },
    types::CustomerId,
};
use chrono::NaiveDateTime;
use rusqlite::{params, types::Type, OptionalExtension, Row};
use std::collections::BTreeMap;

const REPORT_COLUMNS: &str = "report_id, protocol, target_account, transaction_id, reason,
                              report_type, priority, status, reporter, created_at";

fn conversion_error(idx: usize, what: &str, raw: &str) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, format!("unknown {what} {raw}").into())
}

fn report_from_row(row: &Row<'_>) -> rusqlite::Result<Report> {
    let report_type: String = row.get(5)?;
    let priority: String = row.get(6)?;
    let status: String = row.get(7)?;
    Ok(Report {
        id:             row.get(0)?,
        protocol:       row.get(1)?,
        target_account: row.get(2)?,
        transaction_id: row.get(3)?,
        reason:         row.get(4)?,
        report_type:    ReportType::from_code(&report_type),
        priority:       ReportPriority::parse(&priority).ok_or_else(|| conversion_error(6, "priority", &priority))?,
        status:         ReportStatus::parse(&status).ok_or_else(|| conversion_error(7, "status", &status))?,
        reporter:       row.get(8)?,
        created_at:     time_col(row, 9)?,
    })
}

impl RiskStore {
    // ── Reports ───────────────────────────────────────────────────

    pub fn reports_for_account(&self, account_id: &str) -> RiskResult<Vec<Report>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {REPORT_COLUMNS} FROM report WHERE target_account = ?1 ORDER BY report_id"
        ))?;
        let rows = stmt.query_map(params![account_id], report_from_row)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    pub fn report_by_protocol(&self, protocol: &str) -> RiskResult<Option<Report>> {
        let report = self
            .conn()
            .query_row(
                &format!("SELECT {REPORT_COLUMNS} FROM report WHERE protocol = ?1"),
                params![protocol],
                report_from_row,
            )
            .optional()?;
        Ok(report)
    }

    pub fn report_count(&self) -> RiskResult<u64> {
        let count: i64 = self
            .conn()
            .query_row("SELECT COUNT(*) FROM report", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    /// Report totals by status, type and priority.
    pub fn report_breakdown(&self) -> RiskResult<ReportBreakdown> {
        let mut by_status: BTreeMap<String, u64> =
            ReportStatus::ALL.iter().map(|s| (s.as_str().to_string(), 0)).collect();
        by_status.extend(self.report_counts_by("status")?);
        let mut by_priority: BTreeMap<String, u64> =
            ReportPriority::ALL.iter().map(|p| (p.as_str().to_string(), 0)).collect();
        by_priority.extend(self.report_counts_by("priority")?);

        Ok(ReportBreakdown {
            total: self.report_count()?,
            by_status,
            by_type: self.report_counts_by("report_type")?.into_iter().collect(),
            by_priority,
        })
    }

    /// `column` is always one of the fixed names above, never caller input.
    fn report_counts_by(&self, column: &'static str) -> RiskResult<Vec<(String, u64)>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {column}, COUNT(*) FROM report GROUP BY {column} ORDER BY {column}"
        ))?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)? as u64))
        })?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// Reports ever filed against any account of the customer.
    pub fn report_count_for_customer(&self, customer_id: &str) -> RiskResult<u32> {
        let count: i64 = self.conn().query_row(
            "SELECT COUNT(*) FROM report r
             JOIN account a ON a.account_id = r.target_account
             WHERE a.customer_id = ?1",
            params![customer_id],
            |row| row.get(0),
        )?;
        Ok(count as u32)
    }

    /// Report totals per owning customer. Reports against unregistered
    /// accounts count under the account id.
    pub fn report_counts_by_customer(&self) -> RiskResult<Vec<(CustomerId, u32)>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT COALESCE(a.customer_id, r.target_account) AS owner, COUNT(*)
             FROM report r
             LEFT JOIN account a ON a.account_id = r.target_account
             GROUP BY owner
             ORDER BY owner",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)? as u32))
        })?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    pub fn report_totals(&self, account_id: &str, since: NaiveDateTime) -> RiskResult<ReportStats> {
        let (total, recent, last): (i64, i64, Option<String>) = self.conn().query_row(
            "SELECT COUNT(*),
                    COALESCE(SUM(CASE WHEN created_at >= ?2 THEN 1 ELSE 0 END), 0),
                    MAX(created_at)
             FROM report WHERE target_account = ?1",
            params![account_id, to_sql_time(since)],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )?;
        let last_report_at = match last {
            Some(raw) => Some(super::from_sql_time(2, &raw)?),
            None => None,
        };
        Ok(ReportStats {
            total: total as u32,
            recent: recent as u32,
            last_report_at,
        })
    }
}

impl ReportSink for RiskStore {
    fn file_report(&self, report: &NewReport) -> RiskResult<Report> {
        if report.target_account.trim().is_empty() {
            return Err(RiskError::validation("target_account", "must not be empty"));
        }
        let protocol = generate_protocol(report.created_at);
        let conn = self.conn();
        conn.execute(
            "INSERT INTO report (
                protocol, target_account, transaction_id, reason,
                report_type, priority, status, reporter, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                protocol,
                report.target_account,
                report.transaction_id,
                report.reason,
                report.report_type.code(),
                report.priority.as_str(),
                ReportStatus::Pending.as_str(),
                report.reporter,
                to_sql_time(report.created_at),
            ],
        )?;
        Ok(Report {
            id:             conn.last_insert_rowid(),
            protocol,
            target_account: report.target_account.clone(),
            transaction_id: report.transaction_id.clone(),
            reason:         report.reason.clone(),
            report_type:    report.report_type,
            priority:       report.priority,
            status:         ReportStatus::Pending,
            reporter:       report.reporter.clone(),
            created_at:     report.created_at,
        })
    }

    fn report(&self, report_id: i64) -> RiskResult<Option<Report>> {
        let report = self
            .conn()
            .query_row(
                &format!("SELECT {REPORT_COLUMNS} FROM report WHERE report_id = ?1"),
                params![report_id],
                report_from_row,
            )
            .optional()?;
        Ok(report)
    }

    fn set_report_status(&self, report_id: i64, status: ReportStatus) -> RiskResult<()> {
        let changed = self.conn().execute(
            "UPDATE report SET status = ?1 WHERE report_id = ?2",
            params![status.as_str(), report_id],
        )?;
        if changed == 0 {
            return Err(RiskError::not_found("report", report_id.to_string()));
        }
        Ok(())
    }
}
