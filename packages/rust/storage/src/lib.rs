//! Turso Embedded / libSQL storage layer (offline mode).
//!
//! The [`Storage`] struct wraps a libSQL database holding meeting records
//! and the news items attached to them by the enrichment pipeline.
//! Keywords and news items are stored as JSON text.

mod migrations;

use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::{Connection, Database, params};
use tracing::{debug, info};

use meetnews_shared::{
    CandidateItem, MeetNewsError, MeetingRecord, MeetingSummaryRow, NewMeeting, RankingMode,
    Result,
};

fn storage_err(e: impl std::fmt::Display) -> MeetNewsError {
    MeetNewsError::Storage(e.to_string())
}

// ---------------------------------------------------------------------------
// NewsSink
// ---------------------------------------------------------------------------

/// Destination for a finished enrichment result.
#[async_trait]
pub trait NewsSink: Send + Sync {
    /// Overwrite the news items of `record_id`.
    async fn update_news_items(
        &self,
        record_id: i64,
        items: &[CandidateItem],
        ranking: RankingMode,
    ) -> Result<()>;
}

// ---------------------------------------------------------------------------
// Storage
// ---------------------------------------------------------------------------

/// Primary storage handle wrapping a libSQL database.
pub struct Storage {
    #[allow(dead_code)]
    db: Database,
    conn: Connection,
}

impl Storage {
    /// Open or create a database at `path`.
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| MeetNewsError::io(parent, e))?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(storage_err)?;

        let conn = db.connect().map_err(storage_err)?;

        let storage = Self { db, conn };
        storage.run_migrations().await?;
        Ok(storage)
    }

    /// Run pending schema migrations.
    async fn run_migrations(&self) -> Result<()> {
        let current_version = self.get_schema_version().await;

        for migration in migrations::all_migrations() {
            if migration.version > current_version {
                info!(
                    version = migration.version,
                    description = migration.description,
                    "applying migration"
                );
                self.conn
                    .execute_batch(migration.sql)
                    .await
                    .map_err(|e| {
                        MeetNewsError::Storage(format!(
                            "migration v{} failed: {e}",
                            migration.version
                        ))
                    })?;
            }
        }
        Ok(())
    }

    /// Get the current schema version, or 0 if no migrations have been applied.
    async fn get_schema_version(&self) -> u32 {
        let result = self
            .conn
            .query("SELECT MAX(version) FROM schema_migrations", params![])
            .await;

        match result {
            Ok(mut rows) => {
                if let Ok(Some(row)) = rows.next().await {
                    row.get::<u32>(0).unwrap_or(0)
                } else {
                    0
                }
            }
            Err(_) => 0, // Table doesn't exist yet
        }
    }

    // -----------------------------------------------------------------------
    // Meeting operations
    // -----------------------------------------------------------------------

    /// Insert a meeting record and return its id.
    ///
    /// The record is left pending, so a polling worker will pick it up.
    pub async fn insert_meeting(&self, meeting: &NewMeeting) -> Result<i64> {
        self.insert(meeting, None).await
    }

    /// Insert a meeting record already marked as queued.
    ///
    /// For callers that enqueue the record themselves; pollers skip it.
    pub async fn insert_meeting_queued(&self, meeting: &NewMeeting) -> Result<i64> {
        let now = Utc::now().to_rfc3339();
        self.insert(meeting, Some(&now)).await
    }

    async fn insert(&self, meeting: &NewMeeting, queued_at: Option<&str>) -> Result<i64> {
        let keywords = serde_json::to_string(&meeting.keywords).map_err(storage_err)?;
        let now = Utc::now().to_rfc3339();

        self.conn
            .execute(
                "INSERT INTO meetings (user_id, title, created_dt, original_meeting, summary_meeting, keywords, news_queued_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    meeting.user_id,
                    meeting.title.as_str(),
                    now.as_str(),
                    meeting.original_meeting.as_str(),
                    meeting.summary_meeting.as_str(),
                    keywords.as_str(),
                    queued_at
                ],
            )
            .await
            .map_err(storage_err)?;

        let id = self.conn.last_insert_rowid();
        debug!(id, user_id = meeting.user_id, queued = queued_at.is_some(), "meeting inserted");
        Ok(id)
    }

    /// Get a meeting by id, scoped to its owner.
    pub async fn get_meeting(&self, id: i64, user_id: i64) -> Result<Option<MeetingRecord>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, user_id, title, created_dt, original_meeting, summary_meeting,
                        keywords, news_items, news_ranking, news_queued_at
                 FROM meetings WHERE id = ?1 AND user_id = ?2",
                params![id, user_id],
            )
            .await
            .map_err(storage_err)?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_meeting(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(storage_err(e)),
        }
    }

    /// List an owner's meetings, newest first.
    pub async fn list_meetings(&self, user_id: i64) -> Result<Vec<MeetingSummaryRow>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, title, created_dt FROM meetings
                 WHERE user_id = ?1 ORDER BY created_dt DESC, id DESC",
                params![user_id],
            )
            .await
            .map_err(storage_err)?;

        let mut results = Vec::new();
        while let Some(row) = rows.next().await.map_err(storage_err)? {
            results.push(MeetingSummaryRow {
                id: row.get::<i64>(0).map_err(storage_err)?,
                title: row.get::<String>(1).map_err(storage_err)?,
                created_dt: parse_timestamp(&row.get::<String>(2).map_err(storage_err)?)?,
            });
        }
        Ok(results)
    }

    /// Delete a meeting. Returns whether a row was removed.
    pub async fn delete_meeting(&self, id: i64, user_id: i64) -> Result<bool> {
        let affected = self
            .conn
            .execute(
                "DELETE FROM meetings WHERE id = ?1 AND user_id = ?2",
                params![id, user_id],
            )
            .await
            .map_err(storage_err)?;
        Ok(affected > 0)
    }

    /// Reset a meeting's news items to empty. Returns whether a row matched.
    ///
    /// With `requeued` the record is marked as handed to a worker by the
    /// caller; otherwise it goes back to pending for a polling worker.
    pub async fn clear_news_items(&self, id: i64, user_id: i64, requeued: bool) -> Result<bool> {
        let queued_at = requeued.then(|| Utc::now().to_rfc3339());
        let affected = self
            .conn
            .execute(
                "UPDATE meetings SET news_items = NULL, news_ranking = NULL, news_queued_at = ?3
                 WHERE id = ?1 AND user_id = ?2",
                params![id, user_id, queued_at],
            )
            .await
            .map_err(storage_err)?;
        debug!(id, user_id, requeued, cleared = affected > 0, "news items cleared");
        Ok(affected > 0)
    }

    /// Mark a meeting as handed to a worker. Returns whether a row matched.
    pub async fn mark_queued(&self, id: i64, user_id: i64) -> Result<bool> {
        let now = Utc::now().to_rfc3339();
        let affected = self
            .conn
            .execute(
                "UPDATE meetings SET news_queued_at = ?3 WHERE id = ?1 AND user_id = ?2",
                params![id, user_id, now.as_str()],
            )
            .await
            .map_err(storage_err)?;
        Ok(affected > 0)
    }

    /// Claim up to `limit` pending meetings, oldest first.
    ///
    /// Pending means never handed to a worker, no news items yet, and a
    /// summary and keyword list to search with. Each returned record has
    /// been marked as queued; a record claimed concurrently by another
    /// worker is skipped.
    pub async fn claim_pending(&self, limit: u32) -> Result<Vec<MeetingRecord>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, user_id, title, created_dt, original_meeting, summary_meeting,
                        keywords, news_items, news_ranking, news_queued_at
                 FROM meetings
                 WHERE news_queued_at IS NULL AND news_items IS NULL
                   AND summary_meeting IS NOT NULL AND TRIM(summary_meeting) != ''
                   AND keywords IS NOT NULL AND keywords != '[]'
                 ORDER BY id LIMIT ?1",
                params![i64::from(limit)],
            )
            .await
            .map_err(storage_err)?;

        let mut candidates = Vec::new();
        while let Some(row) = rows.next().await.map_err(storage_err)? {
            candidates.push(row_to_meeting(&row)?);
        }
        drop(rows);

        let now = Utc::now();
        let stamp = now.to_rfc3339();
        let mut claimed = Vec::with_capacity(candidates.len());
        for mut record in candidates {
            let affected = self
                .conn
                .execute(
                    "UPDATE meetings SET news_queued_at = ?2
                     WHERE id = ?1 AND news_queued_at IS NULL AND news_items IS NULL",
                    params![record.id, stamp.as_str()],
                )
                .await
                .map_err(storage_err)?;
            if affected == 1 {
                record.news_queued_at = Some(now);
                claimed.push(record);
            }
        }

        if !claimed.is_empty() {
            debug!(claimed = claimed.len(), "pending meetings claimed");
        }
        Ok(claimed)
    }
}

#[async_trait]
impl NewsSink for Storage {
    async fn update_news_items(
        &self,
        record_id: i64,
        items: &[CandidateItem],
        ranking: RankingMode,
    ) -> Result<()> {
        let json = serde_json::to_string(items).map_err(storage_err)?;

        let affected = self
            .conn
            .execute(
                "UPDATE meetings SET news_items = ?1, news_ranking = ?2 WHERE id = ?3",
                params![json.as_str(), ranking.as_str(), record_id],
            )
            .await
            .map_err(storage_err)?;

        if affected == 0 {
            return Err(MeetNewsError::not_found(format!("meeting {record_id}")));
        }
        debug!(record_id, items = items.len(), ranking = ranking.as_str(), "news items stored");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Row mapping
// ---------------------------------------------------------------------------

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| MeetNewsError::Storage(format!("bad timestamp {raw:?}: {e}")))
}

fn parse_json_column<T: serde::de::DeserializeOwned>(
    raw: Option<String>,
    column: &str,
) -> Result<Option<T>> {
    raw.map(|s| {
        serde_json::from_str(&s)
            .map_err(|e| MeetNewsError::Storage(format!("bad JSON in {column}: {e}")))
    })
    .transpose()
}

/// Convert a libSQL row to a [`MeetingRecord`].
fn row_to_meeting(row: &libsql::Row) -> Result<MeetingRecord> {
    let news_ranking = row
        .get::<Option<String>>(8)
        .map_err(storage_err)?
        .map(|s| s.parse::<RankingMode>().map_err(MeetNewsError::Storage))
        .transpose()?;

    Ok(MeetingRecord {
        id: row.get::<i64>(0).map_err(storage_err)?,
        user_id: row.get::<i64>(1).map_err(storage_err)?,
        title: row.get::<String>(2).map_err(storage_err)?,
        created_dt: parse_timestamp(&row.get::<String>(3).map_err(storage_err)?)?,
        original_meeting: row.get::<String>(4).map_err(storage_err)?,
        summary_meeting: row.get::<Option<String>>(5).map_err(storage_err)?,
        keywords: parse_json_column(row.get::<Option<String>>(6).map_err(storage_err)?, "keywords")?,
        news_items: parse_json_column(
            row.get::<Option<String>>(7).map_err(storage_err)?,
            "news_items",
        )?,
        news_ranking,
        news_queued_at: row
            .get::<Option<String>>(9)
            .map_err(storage_err)?
            .map(|raw| parse_timestamp(&raw))
            .transpose()?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    /// Create a temp file storage for testing.
    async fn test_storage() -> Storage {
        let tmp = std::env::temp_dir().join(format!("meetnews_test_{}.db", Uuid::now_v7()));
        Storage::open(&tmp).await.expect("open test db")
    }

    fn meeting(user_id: i64, title: &str) -> NewMeeting {
        NewMeeting {
            user_id,
            title: title.into(),
            original_meeting: "전체 회의록 원문".into(),
            summary_meeting: "Quarterly roadmap review".into(),
            keywords: vec!["반도체".into(), "AI".into()],
        }
    }

    #[tokio::test]
    async fn open_and_migrate() {
        let storage = test_storage().await;
        assert_eq!(storage.get_schema_version().await, 3);
    }

    #[tokio::test]
    async fn idempotent_migration() {
        let tmp = std::env::temp_dir().join(format!("meetnews_test_{}.db", Uuid::now_v7()));
        let first = Storage::open(&tmp).await.unwrap();
        drop(first);
        let second = Storage::open(&tmp).await.expect("reopen");
        assert_eq!(second.get_schema_version().await, 3);
    }

    #[tokio::test]
    async fn insert_and_get_is_owner_scoped() {
        let storage = test_storage().await;
        let id = storage.insert_meeting(&meeting(1, "Roadmap")).await.unwrap();

        let record = storage.get_meeting(id, 1).await.unwrap().expect("found");
        assert_eq!(record.title, "Roadmap");
        assert_eq!(record.original_meeting, "전체 회의록 원문");
        assert_eq!(record.summary_meeting.as_deref(), Some("Quarterly roadmap review"));
        assert_eq!(
            record.keywords,
            Some(vec!["반도체".to_string(), "AI".to_string()])
        );
        assert!(record.news_items.is_none());
        assert!(record.news_ranking.is_none());

        assert!(storage.get_meeting(id, 2).await.unwrap().is_none());
        assert!(storage.get_meeting(id + 100, 1).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn list_is_newest_first_per_owner() {
        let storage = test_storage().await;
        let a = storage.insert_meeting(&meeting(1, "first")).await.unwrap();
        let b = storage.insert_meeting(&meeting(1, "second")).await.unwrap();
        storage.insert_meeting(&meeting(2, "other owner")).await.unwrap();

        let rows = storage.list_meetings(1).await.unwrap();
        let ids: Vec<_> = rows.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![b, a]);
    }

    #[tokio::test]
    async fn update_then_clear_news_items() {
        let storage = test_storage().await;
        let id = storage.insert_meeting(&meeting(1, "Roadmap")).await.unwrap();

        let mut item = CandidateItem::new("https://news.example.com/a", "칩 수요 급증", "본문");
        item.summary = Some("요약".into());
        storage
            .update_news_items(id, &[item.clone()], RankingMode::Similarity)
            .await
            .expect("update");

        let record = storage.get_meeting(id, 1).await.unwrap().unwrap();
        assert_eq!(record.news_items, Some(vec![item]));
        assert_eq!(record.news_ranking, Some(RankingMode::Similarity));

        assert!(storage.clear_news_items(id, 1, false).await.unwrap());
        let record = storage.get_meeting(id, 1).await.unwrap().unwrap();
        assert!(record.news_items.is_none());
        assert!(record.news_ranking.is_none());
    }

    #[tokio::test]
    async fn news_json_keeps_non_ascii() {
        let storage = test_storage().await;
        let id = storage.insert_meeting(&meeting(1, "Roadmap")).await.unwrap();
        let item = CandidateItem::new("https://news.example.com/a", "칩 수요", "본문");
        storage
            .update_news_items(id, &[item], RankingMode::Fallback)
            .await
            .unwrap();

        let mut rows = storage
            .conn
            .query("SELECT news_items FROM meetings WHERE id = ?1", params![id])
            .await
            .unwrap();
        let raw: String = rows.next().await.unwrap().unwrap().get(0).unwrap();
        assert!(raw.contains("칩 수요"));
        assert!(!raw.contains("\\u"));
    }

    #[tokio::test]
    async fn clear_for_wrong_owner_matches_nothing() {
        let storage = test_storage().await;
        let id = storage.insert_meeting(&meeting(1, "Roadmap")).await.unwrap();
        assert!(!storage.clear_news_items(id, 99, false).await.unwrap());
    }

    #[tokio::test]
    async fn update_missing_record_is_not_found() {
        let storage = test_storage().await;
        let err = storage
            .update_news_items(42, &[], RankingMode::Fallback)
            .await
            .unwrap_err();
        assert!(matches!(err, MeetNewsError::NotFound(_)));
    }

    #[tokio::test]
    async fn delete_meeting_removes_row() {
        let storage = test_storage().await;
        let id = storage.insert_meeting(&meeting(1, "Roadmap")).await.unwrap();
        assert!(!storage.delete_meeting(id, 2).await.unwrap());
        assert!(storage.delete_meeting(id, 1).await.unwrap());
        assert!(storage.get_meeting(id, 1).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn claim_pending_takes_each_record_once() {
        let storage = test_storage().await;
        let a = storage.insert_meeting(&meeting(1, "a")).await.unwrap();
        let b = storage.insert_meeting(&meeting(2, "b")).await.unwrap();
        storage.insert_meeting_queued(&meeting(1, "queued")).await.unwrap();

        let mut no_keywords = meeting(1, "no keywords");
        no_keywords.keywords.clear();
        storage.insert_meeting(&no_keywords).await.unwrap();

        let claimed = storage.claim_pending(10).await.unwrap();
        let ids: Vec<_> = claimed.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![a, b]);
        assert!(claimed.iter().all(|r| r.news_queued_at.is_some()));

        assert!(storage.claim_pending(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn claim_pending_respects_limit() {
        let storage = test_storage().await;
        for n in 0..3 {
            storage.insert_meeting(&meeting(1, &format!("m{n}"))).await.unwrap();
        }
        assert_eq!(storage.claim_pending(2).await.unwrap().len(), 2);
        assert_eq!(storage.claim_pending(2).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn clear_without_requeue_makes_record_pending_again() {
        let storage = test_storage().await;
        let id = storage.insert_meeting_queued(&meeting(1, "done")).await.unwrap();
        storage
            .update_news_items(id, &[], RankingMode::Fallback)
            .await
            .unwrap();
        assert!(storage.claim_pending(10).await.unwrap().is_empty());

        assert!(storage.clear_news_items(id, 1, false).await.unwrap());
        let claimed = storage.claim_pending(10).await.unwrap();
        assert_eq!(claimed.len(), 1);
        assert_eq!(claimed[0].id, id);
    }

    #[tokio::test]
    async fn clear_with_requeue_keeps_record_claimed() {
        let storage = test_storage().await;
        let id = storage.insert_meeting(&meeting(1, "retry")).await.unwrap();
        assert!(storage.clear_news_items(id, 1, true).await.unwrap());

        let record = storage.get_meeting(id, 1).await.unwrap().unwrap();
        assert!(record.news_queued_at.is_some());
        assert!(storage.claim_pending(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn mark_queued_is_owner_scoped() {
        let storage = test_storage().await;
        let id = storage.insert_meeting(&meeting(1, "m")).await.unwrap();
        assert!(!storage.mark_queued(id, 2).await.unwrap());
        assert!(storage.mark_queued(id, 1).await.unwrap());
        assert!(storage.claim_pending(10).await.unwrap().is_empty());
    }
}
