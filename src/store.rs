//! Document metadata storage.
//!
//! The [`DocumentStore`] trait is the only way the pipeline reads or mutates
//! document rows. [`SqliteDocumentStore`] is the production backend; tests can
//! wrap it to inject failures.
//!
//! Implementations must be `Send + Sync`: the scheduler, manual triggers and
//! HTTP handlers all share one instance.

use anyhow::Result;
use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use crate::models::{Document, DocumentField, Page};

#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Inserts or updates the row keyed on `path`. An existing row keeps its
    /// id; the id of `doc` is used only for new rows. Returns the live id.
    async fn save(&self, doc: &Document) -> Result<String>;

    async fn get(&self, id: &str) -> Result<Option<Document>>;

    async fn get_by_path(&self, path: &str) -> Result<Option<Document>>;

    /// Oldest live document with this content hash.
    async fn get_by_hash(&self, hash: &str) -> Result<Option<Document>>;

    async fn list_folder(&self, folder: &str) -> Result<Vec<Document>>;

    /// Newest-first listing. `page` is 1-based.
    async fn newest(&self, page: i64, page_size: i64) -> Result<Page>;

    async fn all(&self) -> Result<Vec<Document>>;

    /// Returns whether a row was removed.
    async fn delete(&self, id: &str) -> Result<bool>;

    /// Returns whether a row was updated.
    async fn update_field(&self, id: &str, field: DocumentField) -> Result<bool>;

    async fn count(&self) -> Result<i64>;
}

const COLUMNS: &str = "id, name, path, ingress_time, folder, hash, document_type, full_text, url";

pub struct SqliteDocumentStore {
    pool: SqlitePool,
}

impl SqliteDocumentStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn row_to_document(row: &SqliteRow) -> Document {
    Document {
        id: row.get("id"),
        name: row.get("name"),
        path: row.get("path"),
        ingress_time: row.get("ingress_time"),
        folder: row.get("folder"),
        hash: row.get("hash"),
        document_type: row.get("document_type"),
        full_text: row.get("full_text"),
        url: row.get("url"),
    }
}

#[async_trait]
impl DocumentStore for SqliteDocumentStore {
    async fn save(&self, doc: &Document) -> Result<String> {
        let existing_id: Option<String> =
            sqlx::query_scalar("SELECT id FROM documents WHERE path = ?")
                .bind(&doc.path)
                .fetch_optional(&self.pool)
                .await?;

        let doc_id = existing_id.unwrap_or_else(|| doc.id.clone());

        sqlx::query(
            r#"
            INSERT INTO documents (id, name, path, ingress_time, folder, hash, document_type, full_text, url)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(path) DO UPDATE SET
                name = excluded.name,
                ingress_time = excluded.ingress_time,
                folder = excluded.folder,
                hash = excluded.hash,
                document_type = excluded.document_type,
                full_text = excluded.full_text
            "#,
        )
        .bind(&doc_id)
        .bind(&doc.name)
        .bind(&doc.path)
        .bind(doc.ingress_time)
        .bind(&doc.folder)
        .bind(&doc.hash)
        .bind(&doc.document_type)
        .bind(&doc.full_text)
        .bind(&doc.url)
        .execute(&self.pool)
        .await?;

        Ok(doc_id)
    }

    async fn get(&self, id: &str) -> Result<Option<Document>> {
        let row = sqlx::query(&format!("SELECT {COLUMNS} FROM documents WHERE id = ?"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(row_to_document))
    }

    async fn get_by_path(&self, path: &str) -> Result<Option<Document>> {
        let row = sqlx::query(&format!("SELECT {COLUMNS} FROM documents WHERE path = ?"))
            .bind(path)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(row_to_document))
    }

    async fn get_by_hash(&self, hash: &str) -> Result<Option<Document>> {
        let row = sqlx::query(&format!(
            "SELECT {COLUMNS} FROM documents WHERE hash = ? ORDER BY id ASC LIMIT 1"
        ))
        .bind(hash)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.as_ref().map(row_to_document))
    }

    async fn list_folder(&self, folder: &str) -> Result<Vec<Document>> {
        let rows = sqlx::query(&format!(
            "SELECT {COLUMNS} FROM documents WHERE folder = ? ORDER BY name ASC"
        ))
        .bind(folder)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(row_to_document).collect())
    }

    async fn newest(&self, page: i64, page_size: i64) -> Result<Page> {
        let page = page.max(1);
        let page_size = page_size.max(1);

        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM documents")
            .fetch_one(&self.pool)
            .await?;

        let rows = sqlx::query(&format!(
            "SELECT {COLUMNS} FROM documents ORDER BY id DESC LIMIT ? OFFSET ?"
        ))
        .bind(page_size)
        .bind((page - 1) * page_size)
        .fetch_all(&self.pool)
        .await?;

        Ok(Page {
            documents: rows.iter().map(row_to_document).collect(),
            total,
        })
    }

    async fn all(&self) -> Result<Vec<Document>> {
        let rows = sqlx::query(&format!("SELECT {COLUMNS} FROM documents ORDER BY id ASC"))
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.iter().map(row_to_document).collect())
    }

    async fn delete(&self, id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM documents WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn update_field(&self, id: &str, field: DocumentField) -> Result<bool> {
        let (sql, value) = match field {
            DocumentField::Url(url) => ("UPDATE documents SET url = ? WHERE id = ?", url),
            DocumentField::Folder(folder) => {
                ("UPDATE documents SET folder = ? WHERE id = ?", folder)
            }
        };
        let result = sqlx::query(sql)
            .bind(value)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn count(&self) -> Result<i64> {
        let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM documents")
            .fetch_one(&self.pool)
            .await?;
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migrate;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn memory_store() -> SqliteDocumentStore {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        migrate::bootstrap(&pool).await.unwrap();
        SqliteDocumentStore::new(pool)
    }

    fn doc(id: &str, path: &str, hash: &str) -> Document {
        Document {
            id: id.to_string(),
            name: path.rsplit('/').next().unwrap_or(path).to_string(),
            path: path.to_string(),
            ingress_time: 1_700_000_000,
            folder: "New".to_string(),
            hash: hash.to_string(),
            document_type: "txt".to_string(),
            full_text: "hello".to_string(),
            url: String::new(),
        }
    }

    #[tokio::test]
    async fn save_keeps_existing_id_for_same_path() {
        let store = memory_store().await;
        let first = store.save(&doc("a", "/docs/New/x.txt", "h1")).await.unwrap();
        let second = store.save(&doc("b", "/docs/New/x.txt", "h2")).await.unwrap();
        assert_eq!(first, "a");
        assert_eq!(second, "a");
        assert_eq!(store.count().await.unwrap(), 1);
        let stored = store.get("a").await.unwrap().unwrap();
        assert_eq!(stored.hash, "h2");
    }

    #[tokio::test]
    async fn save_does_not_clobber_published_url() {
        let store = memory_store().await;
        store.save(&doc("a", "/docs/New/x.txt", "h1")).await.unwrap();
        store
            .update_field("a", DocumentField::Url("/document/view/a".into()))
            .await
            .unwrap();
        store.save(&doc("z", "/docs/New/x.txt", "h1")).await.unwrap();
        let stored = store.get("a").await.unwrap().unwrap();
        assert_eq!(stored.url, "/document/view/a");
    }

    #[tokio::test]
    async fn get_by_hash_returns_none_when_absent() {
        let store = memory_store().await;
        assert!(store.get_by_hash("missing").await.unwrap().is_none());
        store.save(&doc("a", "/docs/a.txt", "h1")).await.unwrap();
        assert_eq!(store.get_by_hash("h1").await.unwrap().unwrap().id, "a");
    }

    #[tokio::test]
    async fn newest_pages_in_descending_id_order() {
        let store = memory_store().await;
        for i in 0..5 {
            store
                .save(&doc(&format!("id{i}"), &format!("/docs/{i}.txt"), "h"))
                .await
                .unwrap();
        }
        let page = store.newest(1, 2).await.unwrap();
        assert_eq!(page.total, 5);
        let ids: Vec<_> = page.documents.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["id4", "id3"]);

        let last = store.newest(3, 2).await.unwrap();
        assert_eq!(last.documents.len(), 1);
        assert_eq!(last.documents[0].id, "id0");
    }

    #[tokio::test]
    async fn folder_patch_and_listing() {
        let store = memory_store().await;
        store.save(&doc("a", "/docs/a.txt", "h")).await.unwrap();
        assert!(store
            .update_field("a", DocumentField::Folder("Invoices".into()))
            .await
            .unwrap());
        assert!(!store
            .update_field("nope", DocumentField::Folder("x".into()))
            .await
            .unwrap());
        let listed = store.list_folder("Invoices").await.unwrap();
        assert_eq!(listed.len(), 1);
        assert!(store.list_folder("New").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn delete_reports_whether_row_existed() {
        let store = memory_store().await;
        store.save(&doc("a", "/docs/a.txt", "h")).await.unwrap();
        assert!(store.delete("a").await.unwrap());
        assert!(!store.delete("a").await.unwrap());
        assert!(store.get_by_path("/docs/a.txt").await.unwrap().is_none());
    }
}
