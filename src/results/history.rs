//! Bounded pass-rate history of completed runs, with simple trends.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;

use super::summary::TestResultsSummary;
use crate::storage::Pool;

/// Entries kept; older rows are trimmed on insert.
pub const HISTORY_LIMIT: usize = 100;
/// Entries considered when computing trends.
pub const TREND_WINDOW: usize = 10;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub timestamp: DateTime<Utc>,
    pub project_name: String,
    pub pass_rate: f64,
    pub total_tests: i64,
    pub build_number: String,
    pub branch: String,
}

/// Percentage change from the first to the last entry of the trend window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TestTrends {
    pub pass_rate_trend: f64,
    pub total_tests_trend: f64,
}

#[derive(Clone)]
pub struct TestHistory {
    pool: Pool,
}

impl TestHistory {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    /// Append an entry for `summary` and trim to [`HISTORY_LIMIT`].
    pub fn record(&self, summary: &TestResultsSummary) -> Result<()> {
        let conn = self.pool.get()?;
        conn.execute(
            "INSERT INTO test_history (recorded_at, project_name, pass_rate, total_tests, build_number, branch)
             VALUES (?1, ?2, ?3, ?4, ?5, 'unknown')",
            rusqlite::params![
                summary.last_updated().to_rfc3339(),
                summary.project_name(),
                summary.overall_pass_rate(),
                summary.total_steps() as i64,
                summary.run_id().to_string(),
            ],
        )
        .context("Failed to insert history entry")?;

        conn.execute(
            "DELETE FROM test_history WHERE id NOT IN (
                SELECT id FROM test_history ORDER BY id DESC LIMIT ?1
             )",
            rusqlite::params![HISTORY_LIMIT as i64],
        )?;

        Ok(())
    }

    /// Whether run `run_id` of `project` already has an entry.
    pub fn contains(&self, project: &str, run_id: i64) -> Result<bool> {
        let conn = self.pool.get()?;
        let found: i64 = conn.query_row(
            "SELECT count(*) FROM test_history WHERE project_name = ?1 AND build_number = ?2",
            rusqlite::params![project, run_id.to_string()],
            |row| row.get(0),
        )?;
        Ok(found > 0)
    }

    /// Append an entry unless the run is already recorded.
    ///
    /// Returns whether a row was written.
    pub fn record_once(&self, summary: &TestResultsSummary) -> Result<bool> {
        if self.contains(summary.project_name(), summary.run_id())? {
            return Ok(false);
        }
        self.record(summary)?;
        Ok(true)
    }

    /// The newest `limit` entries, oldest first.
    pub fn list(&self, limit: usize) -> Result<Vec<HistoryEntry>> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(
            "SELECT recorded_at, project_name, pass_rate, total_tests, build_number, branch
             FROM test_history ORDER BY id DESC LIMIT ?1",
        )?;

        let rows = stmt.query_map([limit as i64], |row| {
            let recorded_at: String = row.get(0)?;
            Ok(HistoryEntry {
                timestamp: DateTime::parse_from_rfc3339(&recorded_at)
                    .unwrap_or_default()
                    .with_timezone(&Utc),
                project_name: row.get(1)?,
                pass_rate: row.get(2)?,
                total_tests: row.get(3)?,
                build_number: row.get(4)?,
                branch: row.get(5)?,
            })
        })?;

        let mut entries = Vec::new();
        for r in rows {
            entries.push(r?);
        }
        entries.reverse();
        Ok(entries)
    }

    pub fn trends(&self) -> Result<TestTrends> {
        let recent = self.list(TREND_WINDOW)?;
        if recent.len() < 2 {
            return Ok(TestTrends::default());
        }

        let pass_rates: Vec<f64> = recent.iter().map(|e| e.pass_rate).collect();
        let totals: Vec<f64> = recent.iter().map(|e| e.total_tests as f64).collect();

        Ok(TestTrends {
            pass_rate_trend: trend(&pass_rates),
            total_tests_trend: trend(&totals),
        })
    }
}

/// `((last - first) / first) * 100`, or `0.0` when it is undefined.
pub fn trend(values: &[f64]) -> f64 {
    match (values.first(), values.last()) {
        (Some(&first), Some(&last)) if values.len() >= 2 && first != 0.0 => {
            (last - first) / first * 100.0
        }
        _ => 0.0,
    }
}
