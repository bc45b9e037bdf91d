use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, OptionalExtension};
use serde_json::Value;

use autopiloot_types::{AuditLogEntry, Checkpoint, DailyCosts};

use crate::db::{ts, StateStore};
use crate::error::StoreResult;
use crate::videos::add_cost_in_tx;

/// Ledger bucket for a billable external call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CostCategory {
    Transcription,
    Llm,
    Other,
}

impl CostCategory {
    fn column(self) -> &'static str {
        match self {
            CostCategory::Transcription => "transcription_usd",
            CostCategory::Llm => "llm_usd",
            CostCategory::Other => "other_usd",
        }
    }
}

impl StateStore {
    pub async fn upsert_checkpoint(&self, checkpoint: &Checkpoint) -> StoreResult<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT OR REPLACE INTO checkpoints (checkpoint_key, updated_at, doc)
             VALUES (?1, ?2, ?3)",
            params![
                checkpoint.key(),
                ts(checkpoint.updated_at),
                serde_json::to_string(checkpoint)?
            ],
        )?;
        Ok(())
    }

    pub async fn get_checkpoint(
        &self,
        service: &str,
        scope: &str,
    ) -> StoreResult<Option<Checkpoint>> {
        let conn = self.conn.lock().await;
        let doc: Option<String> = conn
            .query_row(
                "SELECT doc FROM checkpoints WHERE checkpoint_key = ?1",
                params![autopiloot_types::ops::checkpoint_key(service, scope)],
                |row| row.get(0),
            )
            .optional()?;
        Ok(doc.map(|d| serde_json::from_str(&d)).transpose()?)
    }

    pub async fn list_checkpoints(&self) -> StoreResult<Vec<Checkpoint>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare("SELECT doc FROM checkpoints ORDER BY checkpoint_key ASC")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        let mut checkpoints = Vec::new();
        for doc in rows {
            checkpoints.push(serde_json::from_str(&doc?)?);
        }
        Ok(checkpoints)
    }

    /// Add a billable amount to today's (or the given day's) ledger row.
    pub async fn add_cost(
        &self,
        date: NaiveDate,
        category: CostCategory,
        amount_usd: f64,
    ) -> StoreResult<()> {
        let mut conn = self.conn.lock().await;
        let tx = conn.transaction()?;
        add_cost_in_tx(
            &tx,
            &date.format("%Y-%m-%d").to_string(),
            category.column(),
            amount_usd,
        )?;
        tx.commit()?;
        Ok(())
    }

    pub async fn get_daily_costs(&self, date: NaiveDate) -> StoreResult<Option<DailyCosts>> {
        let conn = self.conn.lock().await;
        let row = conn
            .query_row(
                "SELECT total_usd, transcription_usd, llm_usd, other_usd
                 FROM costs_daily WHERE date = ?1",
                params![date.format("%Y-%m-%d").to_string()],
                |row| {
                    Ok(DailyCosts {
                        date,
                        total_usd: row.get(0)?,
                        transcription_usd: row.get(1)?,
                        llm_usd: row.get(2)?,
                        other_usd: row.get(3)?,
                    })
                },
            )
            .optional()?;
        Ok(row)
    }

    /// At-least-once quota accounting: increments are applied after the
    /// fact, dispatch refusal at the threshold prevents runaway.
    pub async fn add_quota_usage(
        &self,
        date: NaiveDate,
        service: &str,
        units: u64,
    ) -> StoreResult<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO quota_daily (date, service, units_used) VALUES (?1, ?2, ?3)
             ON CONFLICT(date, service) DO UPDATE SET units_used = units_used + ?3",
            params![date.format("%Y-%m-%d").to_string(), service, units as i64],
        )?;
        Ok(())
    }

    pub async fn get_quota_usage(&self, date: NaiveDate, service: &str) -> StoreResult<u64> {
        let conn = self.conn.lock().await;
        let units: Option<i64> = conn
            .query_row(
                "SELECT units_used FROM quota_daily WHERE date = ?1 AND service = ?2",
                params![date.format("%Y-%m-%d").to_string(), service],
                |row| row.get(0),
            )
            .optional()?;
        Ok(units.unwrap_or(0) as u64)
    }

    /// Unconditional append; ordering within a video follows commit order.
    pub async fn append_audit(&self, entry: &AuditLogEntry) -> StoreResult<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO audit_logs (actor, action, timestamp, details) VALUES (?1, ?2, ?3, ?4)",
            params![
                entry.actor,
                entry.action,
                ts(entry.timestamp),
                serde_json::to_string(&entry.details)?
            ],
        )?;
        Ok(())
    }

    /// Audit entries in `[since, until)`, optionally restricted to one
    /// action, oldest first.
    pub async fn query_audit(
        &self,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
        action: Option<&str>,
    ) -> StoreResult<Vec<AuditLogEntry>> {
        let conn = self.conn.lock().await;
        let mut entries = Vec::new();

        let mut collect = |doc: rusqlite::Result<(String, String, String, String)>| -> StoreResult<()> {
            let (actor, action, timestamp, details) = doc?;
            let details: Value = serde_json::from_str(&details)?;
            let timestamp = DateTime::parse_from_rfc3339(&timestamp)
                .map(|dt| dt.with_timezone(&Utc))
                .unwrap_or_else(|_| Utc::now());
            entries.push(AuditLogEntry {
                actor,
                action,
                timestamp,
                details,
            });
            Ok(())
        };

        match action {
            Some(action) => {
                let mut stmt = conn.prepare(
                    "SELECT actor, action, timestamp, details FROM audit_logs
                     WHERE timestamp >= ?1 AND timestamp < ?2 AND action = ?3
                     ORDER BY id ASC",
                )?;
                let rows = stmt.query_map(params![ts(since), ts(until), action], |row| {
                    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
                })?;
                for row in rows {
                    collect(row)?;
                }
            }
            None => {
                let mut stmt = conn.prepare(
                    "SELECT actor, action, timestamp, details FROM audit_logs
                     WHERE timestamp >= ?1 AND timestamp < ?2
                     ORDER BY id ASC",
                )?;
                let rows = stmt.query_map(params![ts(since), ts(until)], |row| {
                    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
                })?;
                for row in rows {
                    collect(row)?;
                }
            }
        }

        Ok(entries)
    }
}
