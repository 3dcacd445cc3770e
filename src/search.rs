//! Full-text search over document text.
//!
//! The [`SearchIndex`] trait is keyed by document id, which always equals the
//! database id. [`SqliteSearchIndex`] stores entries in the `documents_fts`
//! FTS5 table and ranks with BM25.

use anyhow::{bail, Result};
use async_trait::async_trait;
use sqlx::{Row, SqlitePool};

use crate::models::{SearchHit, SearchResults};

#[async_trait]
pub trait SearchIndex: Send + Sync {
    /// Adds or replaces the entry for `id`.
    async fn index(&self, id: &str, name: &str, text: &str) -> Result<()>;

    async fn remove(&self, id: &str) -> Result<()>;

    async fn search(&self, query: &SearchQuery, limit: i64, offset: i64) -> Result<SearchResults>;

    /// Drops every entry.
    async fn clear(&self) -> Result<()>;
}

/// A parsed user query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchQuery {
    Term(String),
    Phrase(String),
}

impl SearchQuery {
    /// Whitespace inside the trimmed input makes a phrase query.
    pub fn parse(input: &str) -> Result<SearchQuery> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            bail!("query must not be empty");
        }
        if trimmed.split_whitespace().nth(1).is_some() {
            let words: Vec<&str> = trimmed.split_whitespace().collect();
            Ok(SearchQuery::Phrase(words.join(" ")))
        } else {
            Ok(SearchQuery::Term(trimmed.to_string()))
        }
    }

    /// FTS5 MATCH expression. Both forms are quoted so user input can never
    /// be read as query syntax.
    pub fn to_fts(&self) -> String {
        let raw = match self {
            SearchQuery::Term(t) => t,
            SearchQuery::Phrase(p) => p,
        };
        format!("\"{}\"", raw.replace('"', "\"\""))
    }
}

pub struct SqliteSearchIndex {
    pool: SqlitePool,
}

impl SqliteSearchIndex {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SearchIndex for SqliteSearchIndex {
    async fn index(&self, id: &str, name: &str, text: &str) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM documents_fts WHERE document_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        sqlx::query("INSERT INTO documents_fts (document_id, name, full_text) VALUES (?, ?, ?)")
            .bind(id)
            .bind(name)
            .bind(text)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn remove(&self, id: &str) -> Result<()> {
        sqlx::query("DELETE FROM documents_fts WHERE document_id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn search(&self, query: &SearchQuery, limit: i64, offset: i64) -> Result<SearchResults> {
        let expr = query.to_fts();

        let total: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM documents_fts WHERE documents_fts MATCH ?")
                .bind(&expr)
                .fetch_one(&self.pool)
                .await?;

        let rows = sqlx::query(
            r#"
            SELECT document_id, bm25(documents_fts) AS rank,
                   snippet(documents_fts, 2, '>>>', '<<<', '...', 32) AS snippet
            FROM documents_fts
            WHERE documents_fts MATCH ?
            ORDER BY rank
            LIMIT ? OFFSET ?
            "#,
        )
        .bind(&expr)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        let hits = rows
            .iter()
            .map(|row| {
                let rank: f64 = row.get("rank");
                SearchHit {
                    id: row.get("document_id"),
                    score: -rank, // negate so higher = better
                    snippet: row.get("snippet"),
                }
            })
            .collect();

        Ok(SearchResults { total, hits })
    }

    async fn clear(&self) -> Result<()> {
        sqlx::query("DELETE FROM documents_fts")
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migrate;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn memory_index() -> SqliteSearchIndex {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        migrate::bootstrap(&pool).await.unwrap();
        SqliteSearchIndex::new(pool)
    }

    #[test]
    fn whitespace_makes_a_phrase() {
        assert_eq!(
            SearchQuery::parse("  total   due ").unwrap(),
            SearchQuery::Phrase("total due".into())
        );
        assert_eq!(
            SearchQuery::parse("invoice").unwrap(),
            SearchQuery::Term("invoice".into())
        );
        assert!(SearchQuery::parse("   ").is_err());
    }

    #[test]
    fn quotes_are_escaped() {
        let q = SearchQuery::Term("say\"hi".into());
        assert_eq!(q.to_fts(), "\"say\"\"hi\"");
    }

    #[tokio::test]
    async fn index_replaces_previous_entry() {
        let index = memory_index().await;
        index.index("a", "a.txt", "alpha bravo").await.unwrap();
        index.index("a", "a.txt", "charlie delta").await.unwrap();

        let old = SearchQuery::parse("alpha").unwrap();
        assert_eq!(index.search(&old, 10, 0).await.unwrap().total, 0);

        let new = SearchQuery::parse("charlie").unwrap();
        let results = index.search(&new, 10, 0).await.unwrap();
        assert_eq!(results.total, 1);
        assert_eq!(results.hits[0].id, "a");
    }

    #[tokio::test]
    async fn phrase_requires_adjacent_words() {
        let index = memory_index().await;
        index.index("a", "a.txt", "the total amount due").await.unwrap();
        index.index("b", "b.txt", "amount total due").await.unwrap();

        let q = SearchQuery::parse("total amount").unwrap();
        let results = index.search(&q, 10, 0).await.unwrap();
        assert_eq!(results.total, 1);
        assert_eq!(results.hits[0].id, "a");
        assert!(results.hits[0].snippet.contains(">>>"));
    }

    #[tokio::test]
    async fn remove_and_clear() {
        let index = memory_index().await;
        index.index("a", "a.txt", "shared word").await.unwrap();
        index.index("b", "b.txt", "shared word").await.unwrap();
        let q = SearchQuery::parse("shared").unwrap();

        index.remove("a").await.unwrap();
        assert_eq!(index.search(&q, 10, 0).await.unwrap().total, 1);

        index.clear().await.unwrap();
        assert_eq!(index.search(&q, 10, 0).await.unwrap().total, 0);
    }
}
