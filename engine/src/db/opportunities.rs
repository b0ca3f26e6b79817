/// Opportunity persistence
///
/// One row per company domain. Saving a domain again replaces the row but
/// keeps its original `created_at`.
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use sdk::errors::EngineError;

use crate::capabilities::{OpportunityRecord, OpportunityStore};

pub struct OpportunityRepository {
    pool: SqlitePool,
}

impl OpportunityRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert or replace the row for `record.domain`
    pub async fn save(&self, record: &OpportunityRecord) -> Result<()> {
        let now = record.updated_at.timestamp_millis();
        let pitch = record.pitch.as_ref().map(Value::to_string);

        sqlx::query(
            "INSERT INTO opportunities \
             (domain, company_name, score, company, contacts, pitch, run_id, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?) \
             ON CONFLICT(domain) DO UPDATE SET \
             company_name = excluded.company_name, score = excluded.score, \
             company = excluded.company, contacts = excluded.contacts, \
             pitch = COALESCE(excluded.pitch, opportunities.pitch), \
             run_id = excluded.run_id, updated_at = excluded.updated_at",
        )
        .bind(&record.domain)
        .bind(&record.company_name)
        .bind(record.score.map(i64::from))
        .bind(record.company.to_string())
        .bind(record.contacts.to_string())
        .bind(pitch)
        .bind(&record.run_id)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .context("Failed to save opportunity")?;

        Ok(())
    }

    pub async fn get(&self, domain: &str) -> Result<Option<OpportunityRecord>> {
        let row = sqlx::query(
            "SELECT domain, company_name, score, company, contacts, pitch, run_id, updated_at \
             FROM opportunities WHERE domain = ?",
        )
        .bind(domain)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch opportunity")?;

        row.map(|r| from_row(&r)).transpose()
    }

    /// Most recently updated first
    pub async fn list(&self, limit: i64) -> Result<Vec<OpportunityRecord>> {
        let rows = sqlx::query(
            "SELECT domain, company_name, score, company, contacts, pitch, run_id, updated_at \
             FROM opportunities ORDER BY updated_at DESC LIMIT ?",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list opportunities")?;

        rows.iter().map(from_row).collect()
    }
}

fn from_row(r: &SqliteRow) -> Result<OpportunityRecord> {
    let company: String = r.get("company");
    let contacts: String = r.get("contacts");
    let pitch: Option<String> = r.get("pitch");
    let score: Option<i64> = r.get("score");

    Ok(OpportunityRecord {
        domain: r.get("domain"),
        company_name: r.get("company_name"),
        score: score.map(|s| s.clamp(0, 100) as u8),
        company: serde_json::from_str(&company).context("Corrupt company JSON")?,
        contacts: serde_json::from_str(&contacts).context("Corrupt contacts JSON")?,
        pitch: pitch
            .map(|p| serde_json::from_str(&p))
            .transpose()
            .context("Corrupt pitch JSON")?,
        run_id: r.get("run_id"),
        updated_at: DateTime::<Utc>::from_timestamp_millis(r.get("updated_at")).unwrap_or_default(),
    })
}

#[async_trait]
impl OpportunityStore for OpportunityRepository {
    async fn upsert(&self, record: &OpportunityRecord) -> Result<(), EngineError> {
        self.save(record)
            .await
            .map_err(|e| EngineError::Database(format!("{:#}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use serde_json::json;
    use tempfile::TempDir;

    fn record(run_id: &str, score: u8, pitch: Option<Value>) -> OpportunityRecord {
        OpportunityRecord {
            domain: "acme.com".to_string(),
            company_name: Some("Acme".to_string()),
            score: Some(score),
            company: json!({"domain": "acme.com", "name": "Acme"}),
            contacts: json!([]),
            pitch,
            run_id: run_id.to_string(),
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_upsert_by_domain() {
        let temp_dir = TempDir::new().unwrap();
        let db = Database::new(&temp_dir.path().join("scout.db")).await.unwrap();
        let repo = db.opportunities();

        repo.upsert(&record("run-1", 40, Some(json!({"subject": "Hi"}))))
            .await
            .unwrap();
        repo.upsert(&record("run-2", 70, None)).await.unwrap();

        let all = repo.list(10).await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].score, Some(70));
        assert_eq!(all[0].run_id, "run-2");
        // A later save without a pitch keeps the earlier draft
        assert_eq!(all[0].pitch, Some(json!({"subject": "Hi"})));

        assert!(repo.get("other.io").await.unwrap().is_none());
        db.close().await.unwrap();
    }
}
