use crate::error::ApiError;
use axum::extract::multipart::{MultipartError, MultipartRejection};
use axum::extract::rejection::JsonRejection;
use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use pdf_chat_core::{ChatError, DocumentChat};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

pub const GREETING: &str = "Hello World! I am your AI Tutor. Upload a PDF to /upload, then ask me about it on /chat.";

const NO_FILE_PART: &str = "No file part in the request";
const NO_SELECTED_FILE: &str = "No selected file";
const NOT_A_PDF: &str = "File must be a PDF";
const EMPTY_FILE: &str = "Uploaded file is empty";
const TOO_LARGE: &str = "Uploaded file exceeds the size limit";

#[derive(Clone)]
pub struct AppState {
    chat: Arc<DocumentChat>,
    upload_dir: PathBuf,
}

impl AppState {
    pub fn new(chat: Arc<DocumentChat>, upload_dir: impl Into<PathBuf>) -> Self {
        Self {
            chat,
            upload_dir: upload_dir.into(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub question: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatResponse {
    pub answer: String,
}

pub fn router(state: AppState, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/", get(greeting_handler))
        .route("/upload", post(upload_handler))
        .route("/chat", post(chat_handler))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn greeting_handler() -> &'static str {
    GREETING
}

async fn upload_handler(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<String, ApiError> {
    let mut multipart = multipart.map_err(|rejection| {
        warn!(reason = %rejection, "upload rejected: not a multipart body");
        ApiError::Validation(NO_FILE_PART.to_string())
    })?;

    let (raw_name, data) = read_file_field(&mut multipart).await?;
    if raw_name.trim().is_empty() {
        return Err(ApiError::Validation(NO_SELECTED_FILE.to_string()));
    }

    let filename = sanitize_filename(&raw_name)
        .ok_or_else(|| ApiError::Validation(NO_SELECTED_FILE.to_string()))?;
    if !is_pdf(&filename) {
        warn!(filename = %filename, "upload rejected: not a pdf");
        return Err(ApiError::Validation(NOT_A_PDF.to_string()));
    }
    if data.is_empty() {
        return Err(ApiError::Validation(EMPTY_FILE.to_string()));
    }

    tokio::fs::create_dir_all(&state.upload_dir)
        .await
        .map_err(|error| ApiError::Ingestion(format!("Error storing PDF: {error}")))?;
    let path = state.upload_dir.join(&filename);
    tokio::fs::write(&path, &data)
        .await
        .map_err(|error| ApiError::Ingestion(format!("Error storing PDF: {error}")))?;
    info!(path = %path.display(), bytes = data.len(), "upload stored");

    let summary = state.chat.load_document(&path).await.map_err(|error| {
        error!(path = %path.display(), %error, "pdf ingestion failed");
        ApiError::Ingestion(format!("Error processing PDF: {error}"))
    })?;
    info!(
        session_id = %summary.session_id,
        document_id = %summary.document_id,
        pages = summary.pages,
        chunks = summary.chunks,
        "upload processed"
    );

    Ok(format!(
        "File '{}' uploaded and processed successfully ({} pages, {} chunks).",
        filename, summary.pages, summary.chunks
    ))
}

async fn chat_handler(
    State(state): State<AppState>,
    body: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Json<ChatResponse>, ApiError> {
    if !state.chat.has_document().await {
        warn!("chat rejected: no document processed");
        return Err(ChatError::NoDocument.into());
    }

    let Json(request) = body.map_err(|rejection| {
        warn!(reason = %rejection.body_text(), "chat rejected: malformed body");
        ApiError::Validation(format!("Invalid request body: {}", rejection.body_text()))
    })?;

    let question = request.question.unwrap_or_default();
    if question.trim().is_empty() {
        return Err(ApiError::Validation(
            "The 'question' field is required and must not be empty".to_string(),
        ));
    }

    let answer = state.chat.chat(&question).await.map_err(|error| {
        if matches!(error, ChatError::Generation(_) | ChatError::Retrieval(_)) {
            error!(%error, "chat failed");
        }
        ApiError::from(error)
    })?;

    Ok(Json(ChatResponse { answer }))
}

/// Returns the file name and bytes of the first part named `file`.
async fn read_file_field(multipart: &mut Multipart) -> Result<(String, Vec<u8>), ApiError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|error| multipart_error(error, NO_FILE_PART.to_string()))?
    {
        if field.name() != Some("file") {
            continue;
        }

        let filename = field.file_name().unwrap_or_default().to_string();
        let data = field.bytes().await.map_err(|error| {
            let message = format!("Failed to read file: {error}");
            multipart_error(error, message)
        })?;
        return Ok((filename, data.to_vec()));
    }

    Err(ApiError::Validation(NO_FILE_PART.to_string()))
}

fn multipart_error(error: MultipartError, message: String) -> ApiError {
    if error.status() == StatusCode::PAYLOAD_TOO_LARGE {
        warn!(%error, "upload rejected: body over size limit");
        return ApiError::PayloadTooLarge(TOO_LARGE.to_string());
    }

    warn!(%error, "upload rejected: unreadable multipart body");
    ApiError::Validation(message)
}

/// Keeps only the final path component so uploads cannot escape the
/// upload directory.
fn sanitize_filename(raw: &str) -> Option<String> {
    let name = raw
        .rsplit(|ch| ch == '/' || ch == '\\')
        .next()
        .unwrap_or_default()
        .trim();

    if name.is_empty() || name == "." || name == ".." {
        None
    } else {
        Some(name.to_string())
    }
}

fn is_pdf(filename: &str) -> bool {
    filename.to_ascii_lowercase().ends_with(".pdf")
}
