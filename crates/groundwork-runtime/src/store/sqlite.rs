//! SQLite fact store.
//!
//! Each fact is one row: indexed columns for filtering plus the full JSON
//! body. A trigger aborts any `UPDATE`, so stored rows never change in place.

use async_trait::async_trait;
use chrono::SecondsFormat;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use sqlx::FromRow;
use std::collections::HashSet;

use groundwork_core::{ExtractionMethod, Fact};

use super::{check_fact, FactStore, StoreError};

pub struct SqliteFactStore {
    pool: SqlitePool,
}

#[derive(Debug, FromRow)]
struct BodyRow {
    body: String,
}

fn backend(e: sqlx::Error) -> StoreError {
    StoreError::Backend(e.to_string())
}

impl SqliteFactStore {
    /// Open a store.
    ///
    /// # Example URLs
    /// - `sqlite://facts.db?mode=rwc` - file, created if missing
    /// - `sqlite::memory:` - use [`SqliteFactStore::in_memory`] instead
    pub async fn new(database_url: &str) -> Result<Self, StoreError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await
            .map_err(backend)?;

        let store = Self { pool };
        store.run_migrations().await?;
        Ok(store)
    }

    /// Ephemeral store. One connection, kept open, since every SQLite
    /// connection to `:memory:` gets its own database.
    pub async fn in_memory() -> Result<Self, StoreError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await
            .map_err(backend)?;

        let store = Self { pool };
        store.run_migrations().await?;
        Ok(store)
    }

    async fn run_migrations(&self) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS facts (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                fact_id TEXT NOT NULL UNIQUE,
                transcription_id TEXT NOT NULL,
                fact_version INTEGER NOT NULL,
                fact_text TEXT NOT NULL,
                start_char INTEGER NOT NULL,
                end_char INTEGER NOT NULL CHECK (end_char > start_char),
                confidence_score REAL NOT NULL,
                extraction_method TEXT NOT NULL,
                created_at TEXT NOT NULL,
                body TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_facts_generation ON facts(transcription_id, fact_version);
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(backend)?;

        sqlx::query(
            r#"
            CREATE TRIGGER IF NOT EXISTS facts_append_only
            BEFORE UPDATE ON facts
            BEGIN
                SELECT RAISE(ABORT, 'facts are append-only');
            END;
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(backend)?;

        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl FactStore for SqliteFactStore {
    async fn store_facts(&self, facts: &[Fact]) -> Result<usize, StoreError> {
        let mut batch_ids = HashSet::with_capacity(facts.len());
        for fact in facts {
            check_fact(fact)?;
            if !batch_ids.insert(fact.fact_id()) {
                return Err(StoreError::DuplicateFact(fact.fact_id()));
            }
        }

        let mut tx = self.pool.begin().await.map_err(backend)?;

        for fact in facts {
            let body = serde_json::to_string(fact)
                .map_err(|e| StoreError::Serialization(e.to_string()))?;
            let span = fact.source_span();

            let result = sqlx::query(
                r#"
                INSERT INTO facts (
                    fact_id, transcription_id, fact_version, fact_text,
                    start_char, end_char, confidence_score, extraction_method,
                    created_at, body
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(fact.fact_id().to_string())
            .bind(fact.transcription_id())
            .bind(fact.fact_version() as i64)
            .bind(fact.fact_text())
            .bind(span.start_char as i64)
            .bind(span.end_char as i64)
            .bind(fact.confidence_score())
            .bind(fact.extraction_method().as_str())
            .bind(fact.timestamp().to_rfc3339_opts(SecondsFormat::Micros, true))
            .bind(body)
            .execute(&mut *tx)
            .await;

            // Dropping `tx` on the error path rolls the batch back
            match result {
                Ok(_) => {}
                Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                    return Err(StoreError::DuplicateFact(fact.fact_id()));
                }
                Err(e) => return Err(backend(e)),
            }
        }

        tx.commit().await.map_err(backend)?;
        tracing::debug!(count = facts.len(), "Facts committed");
        Ok(facts.len())
    }

    async fn get_facts(
        &self,
        transcription_id: &str,
        version: u32,
    ) -> Result<Vec<Fact>, StoreError> {
        let rows = sqlx::query_as::<_, BodyRow>(
            r#"
            SELECT body FROM facts
            WHERE transcription_id = ? AND fact_version = ?
            ORDER BY created_at, seq
            "#,
        )
        .bind(transcription_id)
        .bind(version as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;

        rows.into_iter()
            .map(|row| {
                serde_json::from_str(&row.body)
                    .map_err(|e| StoreError::Serialization(e.to_string()))
            })
            .collect()
    }

    async fn latest_version(&self, transcription_id: &str) -> Result<Option<u32>, StoreError> {
        let latest: Option<i64> =
            sqlx::query_scalar("SELECT MAX(fact_version) FROM facts WHERE transcription_id = ?")
                .bind(transcription_id)
                .fetch_one(&self.pool)
                .await
                .map_err(backend)?;

        latest.map(to_version).transpose()
    }

    async fn versions(&self, transcription_id: &str) -> Result<Vec<u32>, StoreError> {
        let versions: Vec<i64> = sqlx::query_scalar(
            "SELECT DISTINCT fact_version FROM facts WHERE transcription_id = ? ORDER BY fact_version",
        )
        .bind(transcription_id)
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;

        versions.into_iter().map(to_version).collect()
    }

    async fn has_generation(
        &self,
        transcription_id: &str,
        version: u32,
    ) -> Result<bool, StoreError> {
        let exists: i64 = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM facts WHERE transcription_id = ? AND fact_version = ?)",
        )
        .bind(transcription_id)
        .bind(version as i64)
        .fetch_one(&self.pool)
        .await
        .map_err(backend)?;

        Ok(exists != 0)
    }

    async fn has_extraction(
        &self,
        transcription_id: &str,
        version: u32,
    ) -> Result<bool, StoreError> {
        let exists: i64 = sqlx::query_scalar(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM facts
                WHERE transcription_id = ? AND fact_version = ? AND extraction_method = ?
            )
            "#,
        )
        .bind(transcription_id)
        .bind(version as i64)
        .bind(ExtractionMethod::LlmDecomposition.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(backend)?;

        Ok(exists != 0)
    }

    fn name(&self) -> &str {
        "sqlite"
    }
}

fn to_version(raw: i64) -> Result<u32, StoreError> {
    u32::try_from(raw)
        .map_err(|_| StoreError::Backend(format!("fact_version {} out of range", raw)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::contract;

    #[tokio::test]
    async fn test_round_trip() {
        contract::round_trip(&SqliteFactStore::in_memory().await.unwrap()).await;
    }

    #[tokio::test]
    async fn test_batch_is_atomic() {
        contract::batch_is_atomic(&SqliteFactStore::in_memory().await.unwrap()).await;
    }

    #[tokio::test]
    async fn test_duplicates_rejected() {
        contract::duplicates_rejected(&SqliteFactStore::in_memory().await.unwrap()).await;
    }

    #[tokio::test]
    async fn test_corrections_append() {
        contract::corrections_append(&SqliteFactStore::in_memory().await.unwrap()).await;
    }

    #[tokio::test]
    async fn test_invalid_corrections_rejected() {
        contract::invalid_corrections_rejected(&SqliteFactStore::in_memory().await.unwrap()).await;
    }

    #[tokio::test]
    async fn test_correction_keeps_advisories() {
        contract::correction_keeps_advisories(&SqliteFactStore::in_memory().await.unwrap()).await;
    }

    #[tokio::test]
    async fn test_update_is_refused() {
        let store = SqliteFactStore::in_memory().await.unwrap();
        let fact = contract::fact("t-1", "User has a headache.", 0, 18, 1);
        store.store_facts(std::slice::from_ref(&fact)).await.unwrap();

        let result = sqlx::query("UPDATE facts SET fact_text = 'User is fine.'")
            .execute(store.pool())
            .await;
        assert!(result.is_err());
        assert_eq!(store.get_facts("t-1", 1).await.unwrap(), vec![fact]);
    }
}
