//! HTTP API.
//!
//! Thin axum layer over [`Engine`]. Every handler delegates to one engine
//! operation and maps its result onto a status code and a JSON body.
//!
//! # Endpoints
//!
//! | Method   | Path | Description |
//! |----------|------|-------------|
//! | `POST`   | `/api/ingest` | Start an ingestion run in the background |
//! | `POST`   | `/api/clean` | Start a clean run in the background |
//! | `GET`    | `/api/clean/last` | Report of the last finished clean run |
//! | `GET`    | `/api/documents/latest?page=` | Newest documents, 20 per page |
//! | `GET`    | `/api/documents/filesystem` | Document storage tree with document ids |
//! | `GET`    | `/api/document/{id}` | One document |
//! | `DELETE` | `/api/document/{id}` | Delete document, index entry and stored file |
//! | `DELETE` | `/api/document?path=` | Delete a folder or file under storage and its documents |
//! | `PATCH`  | `/api/document/move` | Reassign the folder of several documents |
//! | `POST`   | `/api/document/upload` | Multipart upload (`file`, optional `path`) |
//! | `GET`    | `/api/folder/{*folder}` | Documents in one folder |
//! | `POST`   | `/api/folder?path=&folder=` | Create a folder under storage |
//! | `GET`    | `/api/search?term=&page=` | Full-text search |
//! | `POST`   | `/api/search/reindex` | Rebuild the search index |
//! | `GET`    | `/document/view/{id}` | Raw stored file |
//! | `GET`    | `/api/about` | Version, OCR and database status |
//! | `GET`    | `/health` | Health check (returns version) |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "not_found", "message": "no document with id ..." } }
//! ```
//!
//! Error codes: `bad_request` (400), `not_found` (404), `busy` (409),
//! `conflict` (409), `extraction_failed` (422), `registration_failed` (500),
//! `internal` (500).

use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{delete, get, patch, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};

use crate::engine::{Engine, LATEST_PAGE_SIZE};
use crate::error::{RegisterError, StorageError};
use crate::ingest::FileOutcome;
use crate::models::{About, CleanReport, Document, FileTree, SearchHit};
use crate::scheduler::Triggered;

pub const MAX_UPLOAD_BYTES: usize = 64 * 1024 * 1024;

#[derive(Clone)]
struct AppState {
    engine: Arc<Engine>,
}

/// Builds the full router. Exposed separately from [`run_server`] so it can
/// be driven in-process.
pub fn router(engine: Arc<Engine>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/ingest", post(handle_ingest))
        .route("/api/clean", post(handle_clean))
        .route("/api/clean/last", get(handle_last_clean))
        .route("/api/documents/latest", get(handle_latest))
        .route("/api/documents/filesystem", get(handle_file_tree))
        .route("/api/document", delete(handle_delete_path))
        .route("/api/document/move", patch(handle_move))
        .route(
            "/api/document/upload",
            post(handle_upload).layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES)),
        )
        .route("/api/document/{id}", get(handle_get).delete(handle_delete))
        .route("/api/folder", post(handle_create_folder))
        .route("/api/folder/{*folder}", get(handle_folder))
        .route("/api/search", get(handle_search))
        .route("/api/search/reindex", post(handle_reindex))
        .route("/document/view/{id}", get(handle_view))
        .route("/api/about", get(handle_about))
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(AppState { engine })
}

/// Binds to `[server].bind` and serves until `shutdown` resolves.
pub async fn run_server(
    engine: Arc<Engine>,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    let bind_addr = engine.config().server.bind.clone();
    let app = router(engine);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!(bind = %bind_addr, "HTTP server listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    Ok(())
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

struct AppError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code.to_string(),
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request",
        message: message.into(),
    }
}

fn not_found(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::NOT_FOUND,
        code: "not_found",
        message: message.into(),
    }
}

fn busy() -> AppError {
    AppError {
        status: StatusCode::CONFLICT,
        code: "busy",
        message: "a job is already running".to_string(),
    }
}

fn internal(err: anyhow::Error) -> AppError {
    error!(error = %format!("{:#}", err), "request failed");
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "internal",
        message: err.to_string(),
    }
}

fn storage_error(err: StorageError) -> AppError {
    match err {
        StorageError::NotFound(_) => not_found(err.to_string()),
        StorageError::AlreadyExists(_) => AppError {
            status: StatusCode::CONFLICT,
            code: "conflict",
            message: err.to_string(),
        },
        StorageError::Io(e) => internal(e),
        invalid => bad_request(invalid.to_string()),
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ Jobs ============

#[derive(Serialize)]
struct TriggerResponse {
    status: Triggered,
}

fn accepted(result: Triggered) -> Result<(StatusCode, Json<TriggerResponse>), AppError> {
    match result {
        Triggered::Started => Ok((
            StatusCode::ACCEPTED,
            Json(TriggerResponse { status: result }),
        )),
        Triggered::Busy => Err(busy()),
    }
}

async fn handle_ingest(
    State(state): State<AppState>,
) -> Result<(StatusCode, Json<TriggerResponse>), AppError> {
    accepted(state.engine.trigger_ingestion())
}

async fn handle_clean(
    State(state): State<AppState>,
) -> Result<(StatusCode, Json<TriggerResponse>), AppError> {
    accepted(state.engine.trigger_clean())
}

async fn handle_last_clean(State(state): State<AppState>) -> Result<Json<CleanReport>, AppError> {
    state
        .engine
        .last_clean()
        .map(Json)
        .ok_or_else(|| not_found("no clean run has finished yet"))
}

// ============ Documents ============

#[derive(Deserialize)]
struct PageParams {
    page: Option<i64>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct LatestResponse {
    documents: Vec<Document>,
    page: i64,
    total_count: i64,
    total_pages: i64,
    has_next: bool,
    has_previous: bool,
}

async fn handle_latest(
    State(state): State<AppState>,
    Query(params): Query<PageParams>,
) -> Result<Json<LatestResponse>, AppError> {
    let page = params.page.unwrap_or(1);
    if page < 1 {
        return Err(bad_request("page must be at least 1"));
    }
    let result = state.engine.latest(page).await.map_err(internal)?;
    let total_pages = (result.total + LATEST_PAGE_SIZE - 1) / LATEST_PAGE_SIZE;

    Ok(Json(LatestResponse {
        documents: result.documents,
        page,
        total_count: result.total,
        total_pages,
        has_next: page < total_pages,
        has_previous: page > 1,
    }))
}

async fn handle_get(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Document>, AppError> {
    state
        .engine
        .get(&id)
        .await
        .map_err(internal)?
        .map(Json)
        .ok_or_else(|| not_found(format!("no document with id {}", id)))
}

async fn handle_delete(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    match state.engine.delete_document(&id).await.map_err(internal)? {
        Some(_) => Ok(StatusCode::NO_CONTENT),
        None => Err(not_found(format!("no document with id {}", id))),
    }
}

#[derive(Deserialize)]
struct MoveRequest {
    ids: Vec<String>,
    folder: String,
}

#[derive(Serialize)]
struct MoveResponse {
    updated: usize,
}

async fn handle_move(
    State(state): State<AppState>,
    Json(req): Json<MoveRequest>,
) -> Result<Json<MoveResponse>, AppError> {
    if req.ids.is_empty() {
        return Err(bad_request("ids must not be empty"));
    }
    let updated = state
        .engine
        .move_documents(&req.ids, &req.folder)
        .await
        .map_err(internal)?;
    Ok(Json(MoveResponse { updated }))
}

async fn handle_folder(
    State(state): State<AppState>,
    Path(folder): Path<String>,
) -> Result<Json<Vec<Document>>, AppError> {
    state
        .engine
        .folder(&folder)
        .await
        .map(Json)
        .map_err(internal)
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct UploadResponse {
    id: String,
    url: String,
    duplicate_of: Option<String>,
}

async fn handle_upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<UploadResponse>), AppError> {
    let mut rel_dir = String::new();
    let mut file: Option<(String, Vec<u8>)> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| bad_request(format!("multipart error: {}", e)))?
    {
        let field_name = field.name().map(str::to_string);
        match field_name.as_deref() {
            Some("path") => {
                rel_dir = field
                    .text()
                    .await
                    .map_err(|e| bad_request(format!("unreadable path field: {}", e)))?;
            }
            Some("file") => {
                let name = field
                    .file_name()
                    .map(str::to_string)
                    .ok_or_else(|| bad_request("file field has no file name"))?;
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| bad_request(format!("unreadable file field: {}", e)))?;
                file = Some((name, bytes.to_vec()));
            }
            _ => {}
        }
    }

    let (name, bytes) = file.ok_or_else(|| bad_request("missing file field"))?;
    let outcome = state
        .engine
        .upload(&rel_dir, &name, &bytes)
        .await
        .map_err(storage_error)?;

    match outcome {
        FileOutcome::Registered(reg) => Ok((
            StatusCode::CREATED,
            Json(UploadResponse {
                url: crate::routes::view_url(&reg.id),
                id: reg.id,
                duplicate_of: reg.duplicate_of,
            }),
        )),
        FileOutcome::Unsupported => Err(bad_request(format!("invalid file type: {}", name))),
        FileOutcome::ExtractFailed(e) => Err(AppError {
            status: StatusCode::UNPROCESSABLE_ENTITY,
            code: "extraction_failed",
            message: e.to_string(),
        }),
        FileOutcome::RegisterFailed(e) => Err(registration_failed(e)),
        FileOutcome::Panicked(message) => Err(AppError {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            code: "internal",
            message: format!("processing {} panicked: {}", name, message),
        }),
    }
}

fn registration_failed(err: RegisterError) -> AppError {
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "registration_failed",
        message: err.to_string(),
    }
}

// ============ Search ============

#[derive(Deserialize)]
struct SearchParams {
    term: Option<String>,
    page: Option<i64>,
}

#[derive(Serialize)]
struct SearchResponse {
    total: i64,
    page: i64,
    hits: Vec<SearchHit>,
}

async fn handle_search(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Result<Response, AppError> {
    let term = params.term.unwrap_or_default();
    if term.trim().is_empty() {
        return Err(bad_request("query must not be empty"));
    }
    let page = params.page.unwrap_or(1);
    if page < 1 {
        return Err(bad_request("page must be at least 1"));
    }

    let results = state.engine.search(&term, page).await.map_err(internal)?;
    if results.hits.is_empty() {
        return Ok(StatusCode::NO_CONTENT.into_response());
    }
    Ok(Json(SearchResponse {
        total: results.total,
        page,
        hits: results.hits,
    })
    .into_response())
}

#[derive(Serialize)]
struct ReindexResponse {
    indexed: usize,
}

async fn handle_reindex(State(state): State<AppState>) -> Result<Json<ReindexResponse>, AppError> {
    if state.engine.guard().is_running() {
        return Err(busy());
    }
    let indexed = state.engine.reindex().await.map_err(internal)?;
    Ok(Json(ReindexResponse { indexed }))
}

// ============ Storage ============

async fn handle_file_tree(State(state): State<AppState>) -> Result<Json<FileTree>, AppError> {
    state.engine.file_tree().await.map(Json).map_err(internal)
}

#[derive(Deserialize)]
struct CreateFolderParams {
    #[serde(default)]
    path: String,
    folder: String,
}

#[derive(Serialize)]
struct CreateFolderResponse {
    path: String,
}

async fn handle_create_folder(
    State(state): State<AppState>,
    Query(params): Query<CreateFolderParams>,
) -> Result<(StatusCode, Json<CreateFolderResponse>), AppError> {
    let path = state
        .engine
        .create_folder(&params.path, &params.folder)
        .await
        .map_err(storage_error)?;
    Ok((StatusCode::CREATED, Json(CreateFolderResponse { path })))
}

#[derive(Deserialize)]
struct DeletePathParams {
    path: String,
}

#[derive(Serialize)]
struct DeletePathResponse {
    removed: usize,
}

async fn handle_delete_path(
    State(state): State<AppState>,
    Query(params): Query<DeletePathParams>,
) -> Result<Json<DeletePathResponse>, AppError> {
    let removed = state
        .engine
        .delete_path(&params.path)
        .await
        .map_err(storage_error)?;
    Ok(Json(DeletePathResponse { removed }))
}

async fn handle_about(State(state): State<AppState>) -> Result<Json<About>, AppError> {
    state.engine.about().await.map(Json).map_err(internal)
}

// ============ GET /document/view/{id} ============

async fn handle_view(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response, AppError> {
    let path = state
        .engine
        .routes()
        .resolve(&id)
        .ok_or_else(|| not_found(format!("no document with id {}", id)))?;

    let bytes = match tokio::fs::read(&path).await {
        Ok(b) => b,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(not_found(format!("stored file for {} is missing", id)));
        }
        Err(e) => return Err(internal(e.into())),
    };

    let mime = mime_guess::from_path(&path).first_or_octet_stream();
    Ok(([(header::CONTENT_TYPE, mime.to_string())], bytes).into_response())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, DbConfig, DocumentsConfig, IngressConfig};
    use crate::extract::Extractor;
    use crate::search::SqliteSearchIndex;
    use crate::store::SqliteDocumentStore;
    use axum::body::Body;
    use axum::http::Request;
    use sqlx::sqlite::SqlitePoolOptions;
    use tempfile::TempDir;
    use tower::ServiceExt;

    async fn test_engine(tmp: &TempDir) -> Arc<Engine> {
        let config = Config {
            db: DbConfig {
                path: tmp.path().join("db.sqlite"),
            },
            ingress: IngressConfig {
                root: tmp.path().join("ingress"),
                interval_minutes: 10,
                preserve_structure: false,
                delete_on_process: true,
                processed_folder: None,
                exclude_globs: vec![],
            },
            documents: DocumentsConfig {
                root: tmp.path().join("docs"),
                new_document_folder: "New".into(),
            },
            ocr: Default::default(),
            converter: Default::default(),
            server: Default::default(),
            logging: Default::default(),
        };

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        crate::migrate::bootstrap(&pool).await.unwrap();

        let extractor = Extractor::from_config(&config);
        Arc::new(
            Engine::new(
                Arc::new(config),
                Arc::new(SqliteDocumentStore::new(pool.clone())),
                Arc::new(SqliteSearchIndex::new(pool)),
                extractor,
            )
            .unwrap(),
        )
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn multipart_request(path: &str, file_name: &str, content: &str) -> Request<Body> {
        let boundary = "XBOUNDARYX";
        let body = format!(
            "--{b}\r\nContent-Disposition: form-data; name=\"path\"\r\n\r\n{path}\r\n\
             --{b}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{file_name}\"\r\n\
             Content-Type: text/plain\r\n\r\n{content}\r\n--{b}--\r\n",
            b = boundary,
        );
        Request::builder()
            .method("POST")
            .uri("/api/document/upload")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={}", boundary),
            )
            .body(Body::from(body))
            .unwrap()
    }

    #[tokio::test]
    async fn health_reports_version() {
        let tmp = TempDir::new().unwrap();
        let app = router(test_engine(&tmp).await);
        let response = app
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["status"], "ok");
    }

    #[tokio::test]
    async fn unknown_document_is_404_with_error_body() {
        let tmp = TempDir::new().unwrap();
        let app = router(test_engine(&tmp).await);
        let response = app
            .oneshot(Request::get("/api/document/nope").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let json = body_json(response).await;
        assert_eq!(json["error"]["code"], "not_found");
    }

    #[tokio::test]
    async fn empty_search_term_is_rejected() {
        let tmp = TempDir::new().unwrap();
        let app = router(test_engine(&tmp).await);
        let response = app
            .oneshot(Request::get("/api/search?term=%20").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn upload_then_search_view_and_delete() {
        let tmp = TempDir::new().unwrap();
        let engine = test_engine(&tmp).await;
        let app = router(engine.clone());

        let response = app
            .clone()
            .oneshot(multipart_request("2024", "memo.txt", "quarterly budget memo"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let json = body_json(response).await;
        let id = json["id"].as_str().unwrap().to_string();
        assert_eq!(json["url"], format!("/document/view/{}", id));
        assert!(!tmp.path().join("ingress/2024/memo.txt").exists());

        let response = app
            .clone()
            .oneshot(Request::get("/api/search?term=budget").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["total"], 1);
        assert_eq!(json["hits"][0]["id"], id.as_str());

        let response = app
            .clone()
            .oneshot(
                Request::get(format!("/document/view/{}", id))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers()[header::CONTENT_TYPE]
            .to_str()
            .unwrap()
            .starts_with("text/plain"));

        let response = app
            .clone()
            .oneshot(
                Request::delete(format!("/api/document/{}", id))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert!(!tmp.path().join("docs/New/memo.txt").exists());

        let response = app
            .oneshot(Request::get("/api/search?term=budget").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn upload_rejects_unsupported_type_and_escaping_path() {
        let tmp = TempDir::new().unwrap();
        let app = router(test_engine(&tmp).await);

        let response = app
            .clone()
            .oneshot(multipart_request("", "tool.exe", "MZ"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = app
            .oneshot(multipart_request("../outside", "memo.txt", "text"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(!tmp.path().join("outside").exists());
    }

    #[tokio::test]
    async fn latest_reports_paging_and_move_patches_folder() {
        let tmp = TempDir::new().unwrap();
        let engine = test_engine(&tmp).await;
        let app = router(engine.clone());

        let response = app
            .clone()
            .oneshot(multipart_request("", "a.txt", "alpha"))
            .await
            .unwrap();
        let id = body_json(response).await["id"].as_str().unwrap().to_string();

        let response = app
            .clone()
            .oneshot(
                Request::get("/api/documents/latest?page=1")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let json = body_json(response).await;
        assert_eq!(json["totalCount"], 1);
        assert_eq!(json["totalPages"], 1);
        assert_eq!(json["hasNext"], false);
        assert_eq!(json["hasPrevious"], false);

        let response = app
            .clone()
            .oneshot(
                Request::patch("/api/document/move")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(
                        serde_json::json!({ "ids": [id, "missing"], "folder": "/archive/2024/" })
                            .to_string(),
                    ))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(body_json(response).await["updated"], 1);

        let response = app
            .oneshot(
                Request::get("/api/folder/archive/2024")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let json = body_json(response).await;
        assert_eq!(json.as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn trigger_is_busy_while_guard_is_held() {
        let tmp = TempDir::new().unwrap();
        let engine = test_engine(&tmp).await;
        let app = router(engine.clone());

        let permit = engine.guard().try_acquire().unwrap();
        let response = app
            .clone()
            .oneshot(Request::post("/api/ingest").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);
        assert_eq!(body_json(response).await["error"]["code"], "busy");
        drop(permit);

        let response = app
            .oneshot(Request::post("/api/clean").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);
    }

    #[tokio::test]
    async fn upload_io_failure_is_internal_not_bad_request() {
        let tmp = TempDir::new().unwrap();
        let app = router(test_engine(&tmp).await);
        // a regular file where the ingress directory should be
        std::fs::write(tmp.path().join("ingress"), "not a directory").unwrap();

        let response = app
            .oneshot(multipart_request("2024", "memo.txt", "text"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body_json(response).await["error"]["code"], "internal");
    }

    #[tokio::test]
    async fn folders_are_created_listed_and_deleted() {
        let tmp = TempDir::new().unwrap();
        let engine = test_engine(&tmp).await;
        let app = router(engine.clone());

        let response = app
            .clone()
            .oneshot(
                Request::post("/api/folder?path=&folder=Archive")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(body_json(response).await["path"], "Archive");
        assert!(tmp.path().join("docs/Archive").is_dir());

        let response = app
            .clone()
            .oneshot(
                Request::post("/api/folder?path=&folder=Archive")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);

        let response = app
            .clone()
            .oneshot(
                Request::post("/api/folder?path=..&folder=evil")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = app
            .clone()
            .oneshot(multipart_request("", "note.txt", "folder note"))
            .await
            .unwrap();
        let id = body_json(response).await["id"].as_str().unwrap().to_string();

        let response = app
            .clone()
            .oneshot(
                Request::get("/api/documents/filesystem")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        let nodes = json["nodes"].as_array().unwrap();
        let note = nodes.iter().find(|n| n["path"] == "New/note.txt").unwrap();
        assert_eq!(note["documentId"], id.as_str());
        assert_eq!(note["isDir"], false);
        let root = nodes.iter().find(|n| n["path"] == "").unwrap();
        assert_eq!(root["children"], serde_json::json!(["Archive", "New"]));
        assert!(json["untracked"].as_array().unwrap().is_empty());

        let response = app
            .clone()
            .oneshot(Request::delete("/api/document?path=").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(tmp.path().join("docs/New/note.txt").exists());

        let response = app
            .clone()
            .oneshot(Request::delete("/api/document?path=New").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["removed"], 1);
        assert!(!tmp.path().join("docs/New").exists());
        assert!(engine.get(&id).await.unwrap().is_none());
        assert!(engine.routes().resolve(&id).is_none());

        let response = app
            .oneshot(Request::delete("/api/document?path=New").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn about_reports_configuration() {
        let tmp = TempDir::new().unwrap();
        let app = router(test_engine(&tmp).await);
        let response = app
            .oneshot(Request::get("/api/about").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["ocrConfigured"], false);
        assert_eq!(json["databaseType"], "sqlite");
        assert_eq!(json["documentCount"], 0);
        assert_eq!(json["intervalMinutes"], 10);
    }
}
