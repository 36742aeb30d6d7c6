//! Repository for the `cached_responses` table.
//!
//! Rows are addressed by the extraction fingerprint. Freshness is decided
//! here (`expires_at` against the caller's clock) so the cache layer above
//! stays a thin policy shell.

use crate::errors::PersistenceResult;
use chrono::{DateTime, TimeZone, Utc};
use sqlx::{Row, SqlitePool};
use std::collections::HashMap;
use tracing::debug;

/// One stored extraction result.
#[derive(Debug, Clone)]
pub struct CachedResponse {
    pub fingerprint: String,
    pub url: String,
    pub kind: String,
    pub selector: String,
    pub wait_policy: String,
    pub options_json: String,
    pub data: String,
    pub metadata_json: String,
    pub hit_count: u64,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Counter snapshot for the observability tick.
#[derive(Debug, Clone, Default)]
pub struct ResponseCounts {
    pub total: u64,
    pub total_hits: u64,
    pub per_kind: HashMap<String, u64>,
    /// Entries whose expiry falls within the reporting horizon.
    pub expiring_soon: u64,
}

#[derive(Clone)]
pub struct CachedResponseStore {
    pool: SqlitePool,
}

impl CachedResponseStore {
    pub(crate) fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Fetch a non-expired entry and atomically increment its hit counter.
    /// Expired or missing entries return `None`.
    pub async fn get_fresh(
        &self,
        fingerprint: &str,
        now: DateTime<Utc>,
    ) -> PersistenceResult<Option<CachedResponse>> {
        let row = sqlx::query(
            r#"
            UPDATE cached_responses
            SET hit_count = hit_count + 1
            WHERE fingerprint = ? AND expires_at > ?
            RETURNING fingerprint, url, kind, selector, wait_policy, options_json,
                      data, metadata_json, hit_count, created_at, expires_at
            "#,
        )
        .bind(fingerprint)
        .bind(now.timestamp_millis())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| row_to_response(&r)))
    }

    /// Insert or replace the entry for a fingerprint.
    pub async fn put(&self, response: &CachedResponse) -> PersistenceResult<()> {
        sqlx::query(
            r#"
            INSERT INTO cached_responses
                (fingerprint, url, kind, selector, wait_policy, options_json,
                 data, metadata_json, hit_count, created_at, expires_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(fingerprint) DO UPDATE SET
                data = excluded.data,
                metadata_json = excluded.metadata_json,
                hit_count = 0,
                created_at = excluded.created_at,
                expires_at = excluded.expires_at
            "#,
        )
        .bind(&response.fingerprint)
        .bind(&response.url)
        .bind(&response.kind)
        .bind(&response.selector)
        .bind(&response.wait_policy)
        .bind(&response.options_json)
        .bind(&response.data)
        .bind(&response.metadata_json)
        .bind(response.hit_count as i64)
        .bind(response.created_at.timestamp_millis())
        .bind(response.expires_at.timestamp_millis())
        .execute(&self.pool)
        .await?;

        debug!(fingerprint = %response.fingerprint, url = %response.url, "Stored cached response");
        Ok(())
    }

    /// Delete every entry for a URL. Returns the number removed.
    pub async fn delete_by_url(&self, url: &str) -> PersistenceResult<u64> {
        let mut tx = self.pool.begin().await?;
        let result = sqlx::query("DELETE FROM cached_responses WHERE url = ?")
            .bind(url)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(result.rows_affected())
    }

    /// Delete every entry whose expiry is in the past. Returns the number
    /// removed.
    pub async fn delete_expired(&self, now: DateTime<Utc>) -> PersistenceResult<u64> {
        let mut tx = self.pool.begin().await?;
        let result = sqlx::query("DELETE FROM cached_responses WHERE expires_at < ?")
            .bind(now.timestamp_millis())
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(result.rows_affected())
    }

    /// Remove everything.
    pub async fn flush(&self) -> PersistenceResult<u64> {
        let mut tx = self.pool.begin().await?;
        let result = sqlx::query("DELETE FROM cached_responses")
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(result.rows_affected())
    }

    /// Counter snapshot; `horizon_ms` bounds the expiring-soon window.
    pub async fn counts(
        &self,
        now: DateTime<Utc>,
        horizon_ms: i64,
    ) -> PersistenceResult<ResponseCounts> {
        let totals = sqlx::query(
            "SELECT COUNT(*) AS total, COALESCE(SUM(hit_count), 0) AS hits FROM cached_responses",
        )
        .fetch_one(&self.pool)
        .await?;

        let per_kind_rows =
            sqlx::query("SELECT kind, COUNT(*) AS n FROM cached_responses GROUP BY kind")
                .fetch_all(&self.pool)
                .await?;

        let expiring = sqlx::query(
            "SELECT COUNT(*) AS n FROM cached_responses WHERE expires_at > ? AND expires_at <= ?",
        )
        .bind(now.timestamp_millis())
        .bind(now.timestamp_millis() + horizon_ms)
        .fetch_one(&self.pool)
        .await?;

        let mut per_kind = HashMap::new();
        for row in per_kind_rows {
            per_kind.insert(
                row.get::<String, _>("kind"),
                row.get::<i64, _>("n") as u64,
            );
        }

        Ok(ResponseCounts {
            total: totals.get::<i64, _>("total") as u64,
            total_hits: totals.get::<i64, _>("hits") as u64,
            per_kind,
            expiring_soon: expiring.get::<i64, _>("n") as u64,
        })
    }
}

fn row_to_response(row: &sqlx::sqlite::SqliteRow) -> CachedResponse {
    CachedResponse {
        fingerprint: row.get("fingerprint"),
        url: row.get("url"),
        kind: row.get("kind"),
        selector: row.get("selector"),
        wait_policy: row.get("wait_policy"),
        options_json: row.get("options_json"),
        data: row.get("data"),
        metadata_json: row.get("metadata_json"),
        hit_count: row.get::<i64, _>("hit_count") as u64,
        created_at: millis_to_datetime(row.get::<i64, _>("created_at")),
        expires_at: millis_to_datetime(row.get::<i64, _>("expires_at")),
    }
}

pub(crate) fn millis_to_datetime(millis: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(millis)
        .single()
        .unwrap_or_else(Utc::now)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Store;
    use chrono::Duration as ChronoDuration;

    fn sample(fingerprint: &str, url: &str, expires_at: DateTime<Utc>) -> CachedResponse {
        CachedResponse {
            fingerprint: fingerprint.to_string(),
            url: url.to_string(),
            kind: "html".to_string(),
            selector: "h1".to_string(),
            wait_policy: "load".to_string(),
            options_json: "{}".to_string(),
            data: "<h1>Hi</h1>".to_string(),
            metadata_json: r#"{"elementCount":1}"#.to_string(),
            hit_count: 0,
            created_at: Utc::now(),
            expires_at,
        }
    }

    #[tokio::test]
    async fn put_then_get_returns_bytewise_equal_payload() {
        let store = Store::open_in_memory().await.unwrap();
        let responses = store.responses();
        let now = Utc::now();

        let entry = sample("a".repeat(32).as_str(), "https://ex.com/", now + ChronoDuration::hours(1));
        responses.put(&entry).await.unwrap();

        let fetched = responses
            .get_fresh(&entry.fingerprint, now)
            .await
            .unwrap()
            .expect("entry should be fresh");
        assert_eq!(fetched.data, entry.data);
        assert_eq!(fetched.metadata_json, entry.metadata_json);
        assert_eq!(fetched.hit_count, 1);
    }

    #[tokio::test]
    async fn hit_counter_increments_per_lookup() {
        let store = Store::open_in_memory().await.unwrap();
        let responses = store.responses();
        let now = Utc::now();

        let entry = sample("b".repeat(32).as_str(), "https://ex.com/", now + ChronoDuration::hours(1));
        responses.put(&entry).await.unwrap();

        for expected in 1..=3u64 {
            let fetched = responses
                .get_fresh(&entry.fingerprint, now)
                .await
                .unwrap()
                .unwrap();
            assert_eq!(fetched.hit_count, expected);
        }
    }

    #[tokio::test]
    async fn expired_entries_are_invisible() {
        let store = Store::open_in_memory().await.unwrap();
        let responses = store.responses();
        let now = Utc::now();

        let entry = sample("c".repeat(32).as_str(), "https://ex.com/", now - ChronoDuration::seconds(1));
        responses.put(&entry).await.unwrap();

        assert!(responses
            .get_fresh(&entry.fingerprint, now)
            .await
            .unwrap()
            .is_none());

        let removed = responses.delete_expired(now).await.unwrap();
        assert_eq!(removed, 1);
    }

    #[tokio::test]
    async fn delete_by_url_removes_all_entries_for_that_url() {
        let store = Store::open_in_memory().await.unwrap();
        let responses = store.responses();
        let now = Utc::now();
        let fresh = now + ChronoDuration::hours(1);

        responses.put(&sample("d".repeat(32).as_str(), "https://a.com/", fresh)).await.unwrap();
        responses.put(&sample("e".repeat(32).as_str(), "https://a.com/", fresh)).await.unwrap();
        responses.put(&sample("f".repeat(32).as_str(), "https://b.com/", fresh)).await.unwrap();

        assert_eq!(responses.delete_by_url("https://a.com/").await.unwrap(), 2);
        let counts = responses.counts(now, 60_000).await.unwrap();
        assert_eq!(counts.total, 1);
    }

    #[tokio::test]
    async fn counts_track_kinds_and_expiring_soon() {
        let store = Store::open_in_memory().await.unwrap();
        let responses = store.responses();
        let now = Utc::now();

        let mut css = sample("1".repeat(32).as_str(), "https://a.com/", now + ChronoDuration::minutes(10));
        css.kind = "css".to_string();
        responses.put(&css).await.unwrap();
        responses
            .put(&sample("2".repeat(32).as_str(), "https://a.com/", now + ChronoDuration::hours(2)))
            .await
            .unwrap();

        let counts = responses.counts(now, 30 * 60 * 1000).await.unwrap();
        assert_eq!(counts.total, 2);
        assert_eq!(counts.per_kind.get("css"), Some(&1));
        assert_eq!(counts.per_kind.get("html"), Some(&1));
        assert_eq!(counts.expiring_soon, 1);
    }
}
