//! JSON HTTP server.
//!
//! Exposes upload, question answering and store management over HTTP. The
//! handlers are thin: each one calls the same functions the CLI uses, with
//! the [`AppContext`] shared as axum state.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`    | `/health` | Health check (returns version) |
//! | `POST`   | `/documents` | Multipart upload, one or more `file` parts |
//! | `GET`    | `/documents` | List ingested sources |
//! | `DELETE` | `/documents` | Clear the store |
//! | `DELETE` | `/documents/{filename}` | Remove one source |
//! | `GET`    | `/search?q=&limit=&text=` | Management search |
//! | `GET`    | `/stats` | Document and chunk counts |
//! | `POST`   | `/query` | Answer a question with sources |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "unsupported_format", "message": "...", "stage": "extract", "filename": "blob.xyz" } }
//! ```
//!
//! | Code | Status |
//! |------|--------|
//! | `bad_request` | 400 |
//! | `not_found` | 404 |
//! | `dimension_mismatch` | 409 |
//! | `payload_too_large` | 413 |
//! | `unsupported_format` | 415 |
//! | `extraction_failed` | 422 |
//! | `storage_error` | 500 |
//! | `upstream_error` | 502 |
//! | `provider_unavailable` | 503 |
//! | `timeout` | 504 |
//!
//! Generation failures also carry the `sources` the answer would have been
//! grounded on.

use axum::{
    extract::{multipart::MultipartError, DefaultBodyLimit, Multipart, Path, Query, State},
    http::{header, StatusCode},
    middleware,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tracing::info;

use askdocs_core::answer::Answer;
use askdocs_core::models::{SourceRef, SourceSummary, UploadedDocument};
use askdocs_core::{RagError, Stage};

use crate::ask::ask;
use crate::context::AppContext;
use crate::ingest::{ingest_batch, BatchReport, FileStatus};
use crate::manage::{self, SearchHit, StatsReport};

/// Allowance for multipart framing on top of the upload cap.
const MULTIPART_OVERHEAD: usize = 1024 * 1024;

/// Build the router with all routes and layers.
pub fn router(ctx: AppContext) -> Router {
    let body_limit = ctx.config.upload.limit() as usize + MULTIPART_OVERHEAD;

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route(
            "/documents",
            post(handle_upload).get(handle_list).delete(handle_clear),
        )
        .route("/documents/{filename}", delete(handle_delete_source))
        .route("/search", get(handle_search))
        .route("/stats", get(handle_stats))
        .route("/query", post(handle_query))
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(body_limit))
        .layer(middleware::map_response(json_body_limit_rejection))
        .layer(cors)
        .with_state(ctx)
}

/// Start the server on `[server].bind` and run until the process ends.
pub async fn run_server(ctx: AppContext) -> anyhow::Result<()> {
    let bind_addr = ctx.config.server.bind.clone();
    let app = router(ctx);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!(bind = %bind_addr, "server listening");
    println!("askdocs server listening on http://{}", bind_addr);

    axum::serve(listener, app).await?;
    Ok(())
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: &'static str,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    stage: Option<Stage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    filename: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    sources: Option<Vec<SourceRef>>,
}

/// Error type that converts into an Axum HTTP response.
#[derive(Debug)]
struct AppError {
    status: StatusCode,
    code: &'static str,
    message: String,
    stage: Option<Stage>,
    filename: Option<String>,
    sources: Option<Vec<SourceRef>>,
}

impl AppError {
    fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
            stage: None,
            filename: None,
            sources: None,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
                stage: self.stage,
                filename: self.filename,
                sources: self.sources,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError::new(StatusCode::BAD_REQUEST, "bad_request", message)
}

fn body_too_large() -> AppError {
    AppError::new(
        StatusCode::PAYLOAD_TOO_LARGE,
        "payload_too_large",
        "request body exceeds the upload size limit",
    )
}

/// Map a failed multipart read, keeping body limit overruns as 413.
fn multipart_error(err: MultipartError, context: &str) -> AppError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        body_too_large()
    } else {
        bad_request(format!("{context}: {}", err.body_text()))
    }
}

/// Replace the plain-text 413 produced by the body limit layer with the
/// JSON error body. Responses that are already JSON pass through.
async fn json_body_limit_rejection(response: Response) -> Response {
    if response.status() != StatusCode::PAYLOAD_TOO_LARGE {
        return response;
    }
    let is_json = response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("application/json"));
    if is_json {
        response
    } else {
        body_too_large().into_response()
    }
}

/// HTTP status and error code for a pipeline error.
fn classify(err: &RagError) -> (StatusCode, &'static str) {
    match err {
        RagError::InvalidInput(_) => (StatusCode::BAD_REQUEST, "bad_request"),
        RagError::FileTooLarge { .. } => (StatusCode::PAYLOAD_TOO_LARGE, "payload_too_large"),
        RagError::UnsupportedFormat { .. } => {
            (StatusCode::UNSUPPORTED_MEDIA_TYPE, "unsupported_format")
        }
        RagError::Extraction { .. } => (StatusCode::UNPROCESSABLE_ENTITY, "extraction_failed"),
        RagError::DimensionMismatch { .. } => (StatusCode::CONFLICT, "dimension_mismatch"),
        RagError::Storage(_) => (StatusCode::INTERNAL_SERVER_ERROR, "storage_error"),
        RagError::EmbeddingService { .. } | RagError::Generation { .. } => {
            (StatusCode::BAD_GATEWAY, "upstream_error")
        }
        RagError::Timeout { .. } => (StatusCode::GATEWAY_TIMEOUT, "timeout"),
        RagError::Config(_) => (StatusCode::SERVICE_UNAVAILABLE, "provider_unavailable"),
    }
}

impl From<RagError> for AppError {
    fn from(err: RagError) -> Self {
        let (status, code) = classify(&err);
        let stage = Some(err.stage());
        let filename = err.filename().map(str::to_string);
        let message = err.to_string();
        let sources = match err {
            RagError::Generation { sources, .. } => Some(sources),
            _ => None,
        };
        Self {
            status,
            code,
            message,
            stage,
            filename,
            sources,
        }
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

// ============ /documents ============

/// Handler for `POST /documents`.
///
/// Every `file` part is ingested in order; a failing file does not stop
/// the others. When the request held a single file and it failed, the
/// failure is returned as a regular error response instead.
async fn handle_upload(
    State(ctx): State<AppContext>,
    mut multipart: Multipart,
) -> Result<Json<BatchReport>, AppError> {
    let mut docs = Vec::new();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| multipart_error(e, "invalid multipart body"))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let filename = field
            .file_name()
            .map(str::to_string)
            .filter(|n| !n.trim().is_empty())
            .ok_or_else(|| bad_request("file part is missing a filename"))?;
        let bytes = field
            .bytes()
            .await
            .map_err(|e| multipart_error(e, &format!("failed to read '{filename}'")))?;
        docs.push(UploadedDocument::new(filename, bytes.to_vec()));
    }

    if docs.is_empty() {
        return Err(bad_request("no 'file' parts in upload"));
    }

    let mut report = ingest_batch(&ctx, docs).await;
    if report.results.len() == 1 && report.results[0].status == FileStatus::Failed {
        if let Some(cause) = report.results[0].cause.take() {
            return Err(cause.into());
        }
    }
    Ok(Json(report))
}

#[derive(Serialize)]
struct SourcesResponse {
    sources: Vec<SourceSummary>,
}

async fn handle_list(State(ctx): State<AppContext>) -> Result<Json<SourcesResponse>, AppError> {
    let sources = manage::list(&ctx).await?;
    Ok(Json(SourcesResponse { sources }))
}

#[derive(Serialize)]
struct ClearResponse {
    cleared: u64,
}

async fn handle_clear(State(ctx): State<AppContext>) -> Result<Json<ClearResponse>, AppError> {
    let cleared = manage::clear(&ctx).await?;
    Ok(Json(ClearResponse { cleared }))
}

#[derive(Serialize)]
struct DeleteResponse {
    filename: String,
    deleted: u64,
}

async fn handle_delete_source(
    State(ctx): State<AppContext>,
    Path(filename): Path<String>,
) -> Result<Json<DeleteResponse>, AppError> {
    let deleted = ctx.store.delete_source(&filename).await?;
    if deleted == 0 {
        return Err(AppError::new(
            StatusCode::NOT_FOUND,
            "not_found",
            format!("no document named '{filename}'"),
        ));
    }
    Ok(Json(DeleteResponse { filename, deleted }))
}

// ============ GET /search ============

#[derive(Deserialize)]
struct SearchParams {
    #[serde(default)]
    q: String,
    limit: Option<usize>,
    #[serde(default)]
    text: bool,
}

#[derive(Serialize)]
struct SearchResponse {
    results: Vec<SearchHit>,
}

async fn handle_search(
    State(ctx): State<AppContext>,
    Query(params): Query<SearchParams>,
) -> Result<Json<SearchResponse>, AppError> {
    if params.q.trim().is_empty() {
        return Err(bad_request("q must not be empty"));
    }
    let results = manage::search(&ctx, &params.q, params.limit, params.text).await?;
    Ok(Json(SearchResponse { results }))
}

// ============ GET /stats ============

async fn handle_stats(State(ctx): State<AppContext>) -> Result<Json<StatsReport>, AppError> {
    Ok(Json(manage::stats(&ctx).await?))
}

// ============ POST /query ============

#[derive(Deserialize)]
struct QueryRequest {
    question: String,
}

async fn handle_query(
    State(ctx): State<AppContext>,
    Json(req): Json<QueryRequest>,
) -> Result<Json<Answer>, AppError> {
    Ok(Json(ask(&ctx, &req.question).await?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::providers::hashing::HashingEmbedder;
    use crate::providers::DisabledGenerator;
    use askdocs_core::answer::Generator;
    use askdocs_core::store::memory::InMemoryStore;
    use askdocs_core::ProviderError;
    use async_trait::async_trait;
    use serde_json::Value;
    use std::sync::Arc;

    struct EchoGenerator;

    #[async_trait]
    impl Generator for EchoGenerator {
        fn model_name(&self) -> &str {
            "echo"
        }
        async fn generate(&self, prompt: &str) -> Result<String, ProviderError> {
            Ok(format!("echo: {} chars", prompt.len()))
        }
    }

    async fn spawn(generator: Arc<dyn Generator>) -> String {
        let mut config = Config::default();
        config.retrieval.score_threshold = 0.3;
        spawn_with(config, generator).await
    }

    async fn spawn_with(config: Config, generator: Arc<dyn Generator>) -> String {
        let ctx = AppContext::new(
            config,
            Arc::new(InMemoryStore::new()),
            Arc::new(HashingEmbedder::new(256)),
            generator,
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router(ctx)).await.unwrap();
        });
        format!("http://{addr}")
    }

    fn multipart(files: &[(&str, &[u8])]) -> (String, Vec<u8>) {
        let boundary = "askdocs-test-boundary";
        let mut body = Vec::new();
        for (name, bytes) in files {
            body.extend_from_slice(format!("--{boundary}\r\n").as_bytes());
            body.extend_from_slice(
                format!(
                    "Content-Disposition: form-data; name=\"file\"; filename=\"{name}\"\r\n\
                     Content-Type: application/octet-stream\r\n\r\n"
                )
                .as_bytes(),
            );
            body.extend_from_slice(bytes);
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{boundary}--\r\n").as_bytes());
        (format!("multipart/form-data; boundary={boundary}"), body)
    }

    async fn upload(base: &str, files: &[(&str, &[u8])]) -> reqwest::Response {
        let (content_type, body) = multipart(files);
        reqwest::Client::new()
            .post(format!("{base}/documents"))
            .header("content-type", content_type)
            .body(body)
            .send()
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn health_reports_version() {
        let base = spawn(Arc::new(DisabledGenerator)).await;
        let body: Value = reqwest::get(format!("{base}/health"))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(body["status"], "ok");
        assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
    }

    #[tokio::test]
    async fn upload_query_and_manage() {
        let base = spawn(Arc::new(EchoGenerator)).await;
        let resp = upload(
            &base,
            &[
                ("volcano.txt", b"Volcanoes erupt molten lava from the mantle.".as_slice()),
                ("bread.md", b"Bread dough rises because yeast ferments sugar.".as_slice()),
            ],
        )
        .await;
        assert_eq!(resp.status(), 200);
        let report: Value = resp.json().await.unwrap();
        assert_eq!(report["results"][0]["status"], "ingested");
        assert_eq!(report["results"][1]["chunks"], 1);

        let client = reqwest::Client::new();
        let answer: Value = client
            .post(format!("{base}/query"))
            .json(&serde_json::json!({"question": "bread dough rises because of yeast"}))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(answer["grounded"], true);
        assert_eq!(answer["sources"][0]["filename"], "bread.md");
        assert!(answer["answer"].as_str().unwrap().starts_with("echo:"));

        let sources: Value = reqwest::get(format!("{base}/documents"))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(sources["sources"].as_array().unwrap().len(), 2);

        let search: Value = reqwest::get(format!("{base}/search?q=LAVA&text=true"))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(search["results"][0]["filename"], "volcano.txt");

        let stats: Value = reqwest::get(format!("{base}/stats"))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(stats["document_count"], 2);
        assert_eq!(stats["chunk_count"], 2);
        assert_eq!(stats["dims"], 256);

        let resp = client
            .delete(format!("{base}/documents/volcano.txt"))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);
        let resp = client
            .delete(format!("{base}/documents/volcano.txt"))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 404);

        let cleared: Value = client
            .delete(format!("{base}/documents"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(cleared["cleared"], 1);
    }

    #[tokio::test]
    async fn unsupported_upload_maps_to_415() {
        let base = spawn(Arc::new(DisabledGenerator)).await;
        let resp = upload(&base, &[("blob.xyz", [0xc3u8, 0x28, 0xa0, 0xa1].as_slice())]).await;
        assert_eq!(resp.status(), 415);
        let body: Value = resp.json().await.unwrap();
        assert_eq!(body["error"]["code"], "unsupported_format");
        assert_eq!(body["error"]["stage"], "extract");
        assert_eq!(body["error"]["filename"], "blob.xyz");
    }

    #[tokio::test]
    async fn batch_upload_reports_per_file_errors() {
        let base = spawn(Arc::new(DisabledGenerator)).await;
        let resp = upload(
            &base,
            &[
                ("broken.pptx", b"not a zip".as_slice()),
                ("fine.txt", b"plain text".as_slice()),
            ],
        )
        .await;
        assert_eq!(resp.status(), 200);
        let body: Value = resp.json().await.unwrap();
        assert_eq!(body["results"][0]["status"], "failed");
        assert!(body["results"][0]["error"].as_str().is_some());
        assert_eq!(body["results"][1]["status"], "ingested");
    }

    #[tokio::test]
    async fn query_errors() {
        let base = spawn(Arc::new(DisabledGenerator)).await;
        let client = reqwest::Client::new();

        let resp = client
            .post(format!("{base}/query"))
            .json(&serde_json::json!({"question": "   "}))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 400);

        let empty: Value = client
            .post(format!("{base}/query"))
            .json(&serde_json::json!({"question": "anything at all"}))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(empty["grounded"], false);
        assert!(empty["sources"].as_array().unwrap().is_empty());

        upload(
            &base,
            &[("notes.txt", b"quarterly revenue grew in the north region".as_slice())],
        )
        .await;
        let resp = client
            .post(format!("{base}/query"))
            .json(&serde_json::json!({"question": "quarterly revenue in the north region"}))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 502);
        let body: Value = resp.json().await.unwrap();
        assert_eq!(body["error"]["code"], "upstream_error");
        assert_eq!(body["error"]["stage"], "generate");
        assert_eq!(body["error"]["sources"][0]["filename"], "notes.txt");
    }

    async fn spawn_small_limit() -> String {
        let mut config = Config::default();
        config.upload.max_bytes = 10;
        spawn_with(config, Arc::new(DisabledGenerator)).await
    }

    #[tokio::test]
    async fn oversized_request_body_gets_json_413() {
        let base = spawn_small_limit().await;
        let big = vec![b'a'; 2 * 1024 * 1024];
        let resp = upload(&base, &[("big.txt", big.as_slice())]).await;
        assert_eq!(resp.status(), 413);
        let body: Value = resp.json().await.unwrap();
        assert_eq!(body["error"]["code"], "payload_too_large");
    }

    #[tokio::test]
    async fn oversized_chunked_body_gets_json_413() {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let base = spawn_small_limit().await;
        let addr = base.trim_start_matches("http://").to_string();
        let (content_type, body) = multipart(&[("big.txt", vec![b'a'; 1100 * 1024].as_slice())]);

        let stream = tokio::net::TcpStream::connect(&addr).await.unwrap();
        let (mut reader, mut writer) = stream.into_split();
        let head = format!(
            "POST /documents HTTP/1.1\r\nHost: {addr}\r\nContent-Type: {content_type}\r\n\
             Transfer-Encoding: chunked\r\nConnection: close\r\n\r\n"
        );
        let send = tokio::spawn(async move {
            writer.write_all(head.as_bytes()).await?;
            for piece in body.chunks(8 * 1024) {
                writer
                    .write_all(format!("{:x}\r\n", piece.len()).as_bytes())
                    .await?;
                writer.write_all(piece).await?;
                writer.write_all(b"\r\n").await?;
            }
            writer.write_all(b"0\r\n\r\n").await
        });

        let mut response = Vec::new();
        let mut buf = [0u8; 4096];
        loop {
            match reader.read(&mut buf).await {
                Ok(0) | Err(_) => break,
                Ok(n) => response.extend_from_slice(&buf[..n]),
            }
            if String::from_utf8_lossy(&response).contains("payload_too_large") {
                break;
            }
        }
        let _ = send.await;

        let text = String::from_utf8_lossy(&response);
        assert!(text.starts_with("HTTP/1.1 413"), "got: {text}");
        assert!(text.contains("payload_too_large"), "got: {text}");
    }
}
