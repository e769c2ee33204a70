// src/store/sqlite.rs
//! SQLite-backed insight store. Uniqueness lives in the schema
//! (`UNIQUE(source, dedup_key)`); timestamps are stored as unix seconds.
//! Filter columns (`search_text`, `facets`) are case-folded in Rust at insert,
//! since SQLite's `lower()` only folds ASCII.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteRow,
};
use sqlx::{QueryBuilder, Row, Sqlite};
use std::path::Path;
use std::str::FromStr;
use tracing::info;

use crate::dedup::DedupKey;
use crate::error::StoreError;
use crate::insight::Insight;
use crate::query::InsightFilter;
use crate::store::InsightStore;

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (creating if needed) the database file and run migrations.
    pub async fn connect(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    StoreError::Unavailable(format!("creating {}: {e}", parent.display()))
                })?;
            }
        }
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;
        let store = Self { pool };
        store.migrate().await?;
        info!(target: "store", path = %path.display(), "sqlite store ready");
        Ok(store)
    }

    /// Private in-memory database; lives as long as the store.
    pub async fn in_memory() -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?;
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;
        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS insights (
                id TEXT PRIMARY KEY,
                source TEXT NOT NULL,
                source_kind TEXT NOT NULL,
                dedup_key TEXT NOT NULL,
                title TEXT NOT NULL,
                summary TEXT NOT NULL,
                date INTEGER NOT NULL,
                link TEXT,
                author TEXT,
                matched_keywords TEXT NOT NULL DEFAULT '[]',
                mentioned_tools TEXT NOT NULL DEFAULT '[]',
                topics TEXT NOT NULL DEFAULT '[]',
                search_text TEXT NOT NULL DEFAULT '',
                facets TEXT NOT NULL DEFAULT '[]',
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL,
                UNIQUE(source, dedup_key)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_insights_date ON insights(date)")
            .execute(&self.pool)
            .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_insights_created ON insights(created_at)")
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

fn to_json<T: Serialize>(v: &T) -> Result<String, StoreError> {
    serde_json::to_string(v).map_err(|e| StoreError::Unavailable(format!("encoding row: {e}")))
}

fn from_json<T: DeserializeOwned>(s: &str) -> Result<T, StoreError> {
    serde_json::from_str(s).map_err(|e| StoreError::Unavailable(format!("corrupt row: {e}")))
}

fn from_ts(secs: i64) -> Result<DateTime<Utc>, StoreError> {
    DateTime::from_timestamp(secs, 0)
        .ok_or_else(|| StoreError::Unavailable(format!("corrupt timestamp {secs}")))
}

fn row_to_insight(row: &SqliteRow) -> Result<Insight, StoreError> {
    Ok(Insight {
        id: row.try_get("id")?,
        source: row.try_get("source")?,
        source_kind: row.try_get("source_kind")?,
        title: row.try_get("title")?,
        summary: row.try_get("summary")?,
        date: from_ts(row.try_get("date")?)?,
        link: row.try_get("link")?,
        author: row.try_get("author")?,
        matched_keywords: from_json(&row.try_get::<String, _>("matched_keywords")?)?,
        mentioned_tools: from_json(&row.try_get::<String, _>("mentioned_tools")?)?,
        topics: from_json(&row.try_get::<String, _>("topics")?)?,
        created_at: from_ts(row.try_get("created_at")?)?,
        updated_at: from_ts(row.try_get("updated_at")?)?,
    })
}

/// Folded title and summary for substring search.
fn search_text(insight: &Insight) -> String {
    format!("{}\n{}", insight.title, insight.summary).to_lowercase()
}

/// Folded `kind:value` tags for every set-valued filter.
fn facets(insight: &Insight) -> Vec<String> {
    let tagged = |kind: &str, v: &str| format!("{kind}:{}", v.trim().to_lowercase());
    std::iter::once(tagged("source", &insight.source))
        .chain(insight.mentioned_tools.iter().map(|v| tagged("tool", v.as_str())))
        .chain(insight.matched_keywords.iter().map(|v| tagged("keyword", v.as_str())))
        .chain(insight.topics.iter().map(|v| tagged("topic", v.as_str())))
        .collect()
}

fn escape_like(s: &str) -> String {
    s.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_")
}

/// `AND EXISTS` clause matching any of `wanted` among the row's `kind:` facets.
fn push_any_of(qb: &mut QueryBuilder<'_, Sqlite>, kind: &str, wanted: &[String]) {
    if wanted.is_empty() {
        return;
    }
    qb.push(" AND EXISTS (SELECT 1 FROM json_each(insights.facets) WHERE json_each.value IN (");
    let mut sep = qb.separated(", ");
    for w in wanted {
        sep.push_bind(format!("{kind}:{}", w.trim().to_lowercase()));
    }
    sep.push_unseparated("))");
}

#[async_trait]
impl InsightStore for SqliteStore {
    async fn insert(&self, insight: &Insight) -> Result<(), StoreError> {
        let key = insight.dedup_key().storage_key();
        let res = sqlx::query(
            r#"
            INSERT INTO insights (
                id, source, source_kind, dedup_key, title, summary, date, link, author,
                matched_keywords, mentioned_tools, topics, search_text, facets,
                created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&insight.id)
        .bind(&insight.source)
        .bind(&insight.source_kind)
        .bind(&key)
        .bind(&insight.title)
        .bind(&insight.summary)
        .bind(insight.date.timestamp())
        .bind(insight.link.as_deref())
        .bind(insight.author.as_deref())
        .bind(to_json(&insight.matched_keywords)?)
        .bind(to_json(&insight.mentioned_tools)?)
        .bind(to_json(&insight.topics)?)
        .bind(search_text(insight))
        .bind(to_json(&facets(insight))?)
        .bind(insight.created_at.timestamp())
        .bind(insight.updated_at.timestamp())
        .execute(&self.pool)
        .await;

        match res {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                Err(StoreError::ConstraintViolation {
                    source_name: insight.source.clone(),
                    key,
                })
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn contains(&self, source: &str, key: &DedupKey) -> Result<bool, StoreError> {
        let n: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM insights WHERE source = ? AND dedup_key = ?",
        )
        .bind(source)
        .bind(key.storage_key())
        .fetch_one(&self.pool)
        .await?;
        Ok(n > 0)
    }

    async fn query(&self, filter: &InsightFilter) -> Result<Vec<Insight>, StoreError> {
        let now = Utc::now();
        let mut qb: QueryBuilder<'_, Sqlite> = QueryBuilder::new("SELECT * FROM insights WHERE 1 = 1");

        if let Some(t) = filter.text_query() {
            let pat = format!("%{}%", escape_like(&t.to_lowercase()));
            qb.push(" AND search_text LIKE ")
                .push_bind(pat)
                .push(" ESCAPE '\\'");
        }
        push_any_of(&mut qb, "source", &filter.sources);
        push_any_of(&mut qb, "tool", &filter.tools);
        push_any_of(&mut qb, "keyword", &filter.keywords);
        push_any_of(&mut qb, "topic", &filter.topics);
        if let Some(lb) = filter.lower_bound(now) {
            qb.push(" AND date >= ").push_bind(lb.timestamp());
        }
        if let Some(ub) = filter.date_to {
            qb.push(" AND date <= ").push_bind(ub.timestamp());
        }
        qb.push(" ORDER BY date DESC, id ASC LIMIT ")
            .push_bind(filter.effective_limit() as i64)
            .push(" OFFSET ")
            .push_bind(filter.offset as i64);

        let rows = qb.build().fetch_all(&self.pool).await?;
        rows.iter().map(row_to_insight).collect()
    }
}
