/// Run history persistence
///
/// A finished run is stored with its full ledger so `scout history` and
/// `scout replay` can show it later.
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use sqlx::{Row, SqlitePool};

use crate::orchestrator::{RunResult, Step, StepStatus};

/// Summary row of a stored run
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct RunRow {
    pub id: String,
    pub domain: String,
    pub workflow: String,
    pub termination: String,
    pub iterations: i64,
    pub total_cost: f64,
    pub total_tokens: i64,
    pub summary: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

pub struct RunRepository {
    pool: SqlitePool,
}

impl RunRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Store a run and its steps in one transaction
    pub async fn record(&self, result: &RunResult) -> Result<()> {
        let mut tx = self
            .pool
            .begin()
            .await
            .context("Failed to begin transaction")?;

        let json = serde_json::to_string(result).context("Failed to serialize run result")?;
        sqlx::query(
            "INSERT OR REPLACE INTO runs \
             (id, domain, workflow, termination, iterations, total_cost, total_tokens, summary, result, started_at, finished_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&result.run_id)
        .bind(&result.request.domain)
        .bind(result.request.workflow.as_str())
        .bind(result.termination.as_str())
        .bind(result.iterations as i64)
        .bind(result.total_cost)
        .bind(result.total_tokens as i64)
        .bind(&result.summary)
        .bind(json)
        .bind(result.started_at.timestamp_millis())
        .bind(result.finished_at.timestamp_millis())
        .execute(&mut *tx)
        .await
        .context("Failed to insert run")?;

        sqlx::query("DELETE FROM run_steps WHERE run_id = ?")
            .bind(&result.run_id)
            .execute(&mut *tx)
            .await
            .context("Failed to clear previous steps")?;

        for step in &result.steps {
            sqlx::query(
                "INSERT OR REPLACE INTO run_steps \
                 (run_id, step_index, iteration, capability, input, status, summary, error, cost, evidence_count, started_at, finished_at) \
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(&result.run_id)
            .bind(step.index as i64)
            .bind(step.iteration as i64)
            .bind(&step.capability)
            .bind(step.input.to_string())
            .bind(step.status.as_str())
            .bind(&step.summary)
            .bind(&step.error)
            .bind(step.cost)
            .bind(step.evidence_count as i64)
            .bind(step.started_at.timestamp_millis())
            .bind(step.finished_at.map(|t| t.timestamp_millis()))
            .execute(&mut *tx)
            .await
            .context("Failed to insert run step")?;
        }

        tx.commit().await.context("Failed to commit run")?;
        Ok(())
    }

    /// Most recent runs first
    pub async fn recent(&self, limit: i64) -> Result<Vec<RunRow>> {
        let rows = sqlx::query(
            "SELECT id, domain, workflow, termination, iterations, total_cost, total_tokens, summary, started_at, finished_at \
             FROM runs ORDER BY started_at DESC LIMIT ?",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list runs")?;

        Ok(rows
            .iter()
            .map(|r| RunRow {
                id: r.get("id"),
                domain: r.get("domain"),
                workflow: r.get("workflow"),
                termination: r.get("termination"),
                iterations: r.get("iterations"),
                total_cost: r.get("total_cost"),
                total_tokens: r.get("total_tokens"),
                summary: r.get("summary"),
                started_at: millis(r.get("started_at")),
                finished_at: millis(r.get("finished_at")),
            })
            .collect())
    }

    /// Ledger of one run, in order
    pub async fn steps(&self, run_id: &str) -> Result<Vec<Step>> {
        let rows = sqlx::query(
            "SELECT step_index, iteration, capability, input, status, summary, error, cost, evidence_count, started_at, finished_at \
             FROM run_steps WHERE run_id = ? ORDER BY step_index ASC",
        )
        .bind(run_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch run steps")?;

        rows.iter()
            .map(|r| {
                let input: String = r.get("input");
                let finished: Option<i64> = r.get("finished_at");
                Ok(Step {
                    index: r.get::<i64, _>("step_index") as usize,
                    iteration: r.get::<i64, _>("iteration") as usize,
                    capability: r.get("capability"),
                    input: serde_json::from_str(&input).context("Corrupt step input")?,
                    status: StepStatus::parse(r.get::<String, _>("status").as_str()),
                    summary: r.get("summary"),
                    error: r.get("error"),
                    cost: r.get("cost"),
                    evidence_count: r.get::<i64, _>("evidence_count") as usize,
                    started_at: millis(r.get("started_at")),
                    finished_at: finished.map(millis),
                })
            })
            .collect()
    }

    /// Full stored result of a run
    pub async fn result(&self, run_id: &str) -> Result<Option<Value>> {
        let row: Option<String> = sqlx::query_scalar("SELECT result FROM runs WHERE id = ?")
            .bind(run_id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch run")?;

        row.map(|json| serde_json::from_str(&json).context("Corrupt run result"))
            .transpose()
    }
}

fn millis(ms: i64) -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp_millis(ms).unwrap_or_default()
}
