//! Dedup Store (spec §4.1): persistent, concurrent-safe membership queries over
//! `(scope, feed, url)` triples, backed by SQLite via `rusqlite`.
//!
//! URLs/feed names/scope names are never stored as text; they're hashed to
//! signed 64-bit integers first (see [`crate::hashing`]), keeping the index
//! fixed-width and the table small.

use std::path::Path;

use anyhow::{Context, Result};
use rusqlite::{params_from_iter, Connection};
use tokio::sync::Mutex;

use crate::hashing::hash64;

/// Query parameter chunk size, compatible with conservative embedded-SQL
/// parameter-count limits (spec §4.1).
const CHUNK_SIZE: usize = 100;

pub struct DedupStore {
    conn: Mutex<Connection>,
}

impl DedupStore {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("opening dedup store at {}", path.display()))?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS post (
                scope_hash INTEGER NOT NULL,
                feed_hash  INTEGER NOT NULL,
                url_hash   INTEGER NOT NULL,
                PRIMARY KEY (scope_hash, feed_hash, url_hash)
            );
            CREATE INDEX IF NOT EXISTS post_scope_url ON post (scope_hash, url_hash);
            VACUUM;
            ANALYZE;",
        )
        .context("initializing dedup store schema")?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    pub async fn is_new_feed(&self, scope: &str, feed: &str) -> Result<bool> {
        let scope_hash = hash64(scope);
        let feed_hash = hash64(feed);
        let conn = self.conn.lock().await;
        let exists: bool = conn
            .query_row(
                "SELECT EXISTS(SELECT 1 FROM post WHERE scope_hash = ?1 AND feed_hash = ?2)",
                rusqlite::params![scope_hash, feed_hash],
                |row| row.get(0),
            )
            .context("querying is_new_feed")?;
        Ok(!exists)
    }

    /// Subset of `urls` with no existing `(scope, *, url)` triple. Preserves input
    /// order; duplicate inputs collapse to a single output entry (spec §4.1).
    pub async fn unposted_for_scope(&self, scope: &str, urls: &[String]) -> Result<Vec<String>> {
        let scope_hash = hash64(scope);
        self.unposted(urls, |conn, chunk_hashes, placeholders| {
            let sql = format!(
                "SELECT url_hash FROM post WHERE scope_hash = ? AND url_hash IN ({placeholders})"
            );
            let mut stmt = conn.prepare(&sql)?;
            let mut params: Vec<i64> = vec![scope_hash];
            params.extend_from_slice(chunk_hashes);
            let rows = stmt.query_map(params_from_iter(params.iter()), |row| row.get::<_, i64>(0))?;
            rows.collect::<rusqlite::Result<Vec<_>>>()
        })
        .await
    }

    /// Subset of `urls` with no existing `(scope, feed, url)` triple.
    pub async fn unposted_for_feed(&self, scope: &str, feed: &str, urls: &[String]) -> Result<Vec<String>> {
        let scope_hash = hash64(scope);
        let feed_hash = hash64(feed);
        self.unposted(urls, |conn, chunk_hashes, placeholders| {
            let sql = format!(
                "SELECT url_hash FROM post WHERE scope_hash = ? AND feed_hash = ? AND url_hash IN ({placeholders})"
            );
            let mut stmt = conn.prepare(&sql)?;
            let mut params: Vec<i64> = vec![scope_hash, feed_hash];
            params.extend_from_slice(chunk_hashes);
            let rows = stmt.query_map(params_from_iter(params.iter()), |row| row.get::<_, i64>(0))?;
            rows.collect::<rusqlite::Result<Vec<_>>>()
        })
        .await
    }

    async fn unposted(
        &self,
        urls: &[String],
        query_chunk: impl Fn(&Connection, &[i64], &str) -> rusqlite::Result<Vec<i64>>,
    ) -> Result<Vec<String>> {
        let mut seen = std::collections::HashSet::new();
        let unique: Vec<&String> = urls.iter().filter(|u| seen.insert(u.as_str())).collect();
        if unique.is_empty() {
            return Ok(Vec::new());
        }
        let hashes: Vec<i64> = unique.iter().map(|u| hash64(u)).collect();

        let conn = self.conn.lock().await;
        let mut posted = std::collections::HashSet::new();
        for chunk in hashes.chunks(CHUNK_SIZE) {
            let placeholders = std::iter::repeat("?").take(chunk.len()).collect::<Vec<_>>().join(",");
            let found = query_chunk(&conn, chunk, &placeholders).context("querying unposted URLs")?;
            posted.extend(found);
        }

        Ok(unique
            .into_iter()
            .zip(hashes)
            .filter(|(_, h)| !posted.contains(h))
            .map(|(u, _)| u.clone())
            .collect())
    }

    /// Atomically record `urls` as posted under `(scope, feed)`.
    pub async fn insert_posted(&self, scope: &str, feed: &str, urls: &[String]) -> Result<()> {
        if urls.is_empty() {
            return Ok(());
        }
        let scope_hash = hash64(scope);
        let feed_hash = hash64(feed);
        let mut conn = self.conn.lock().await;
        let tx = conn.transaction().context("opening insert_posted transaction")?;
        {
            let mut stmt = tx
                .prepare("INSERT OR IGNORE INTO post (scope_hash, feed_hash, url_hash) VALUES (?1, ?2, ?3)")
                .context("preparing insert_posted statement")?;
            for url in urls {
                stmt.execute(rusqlite::params![scope_hash, feed_hash, hash64(url)])
                    .context("inserting posted url")?;
            }
        }
        tx.commit().context("committing insert_posted transaction")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_store() -> (tempfile::TempDir, DedupStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = DedupStore::open(&dir.path().join("dedup.sqlite3")).unwrap();
        (dir, store)
    }

    #[tokio::test]
    async fn new_feed_is_reported_until_first_insert() {
        let (_dir, store) = temp_store();
        assert!(store.is_new_feed("#chan", "feed").await.unwrap());
        store
            .insert_posted("#chan", "feed", &["https://a.com/1".to_string()])
            .await
            .unwrap();
        assert!(!store.is_new_feed("#chan", "feed").await.unwrap());
    }

    #[tokio::test]
    async fn unposted_for_feed_excludes_inserted_urls_and_preserves_order() {
        let (_dir, store) = temp_store();
        let urls = vec!["https://a.com/1".to_string(), "https://a.com/2".to_string(), "https://a.com/3".to_string()];
        store.insert_posted("#chan", "feed", &urls[..1]).await.unwrap();
        let unposted = store.unposted_for_feed("#chan", "feed", &urls).await.unwrap();
        assert_eq!(unposted, vec!["https://a.com/2".to_string(), "https://a.com/3".to_string()]);
    }

    #[tokio::test]
    async fn unposted_for_scope_ignores_feed_distinction() {
        let (_dir, store) = temp_store();
        store
            .insert_posted("#chan", "feed-a", &["https://a.com/1".to_string()])
            .await
            .unwrap();
        let unposted = store
            .unposted_for_scope("#chan", &["https://a.com/1".to_string(), "https://a.com/2".to_string()])
            .await
            .unwrap();
        assert_eq!(unposted, vec!["https://a.com/2".to_string()]);
    }

    #[tokio::test]
    async fn duplicate_inputs_collapse() {
        let (_dir, store) = temp_store();
        let unposted = store
            .unposted_for_feed("#chan", "feed", &["https://a.com/1".to_string(), "https://a.com/1".to_string()])
            .await
            .unwrap();
        assert_eq!(unposted, vec!["https://a.com/1".to_string()]);
    }
}
