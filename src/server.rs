//! Interactive mode: upload PDFs through a form, download the sheet.

use crate::batch::{self, DocumentInput};
use crate::error::ExtractError;
use crate::extractor::Extractor;
use crate::sheet::SheetWriter;
use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, Multipart, State},
    http::{StatusCode, header},
    response::{Html, IntoResponse, Response},
    routing::get,
};
use serde_json::json;
use std::io::Write;
use std::sync::Arc;
use thiserror::Error;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

const UPLOAD_FORM: &str = include_str!("../assets/upload.html");
const DOWNLOAD_NAME: &str = "extracted_data.csv";

#[derive(Debug, Error)]
pub enum ApiError {
    /// Upload rejected before reaching the extractor.
    #[error("{0}")]
    Validation(String),

    #[error("Extraction failed: {0}")]
    Extraction(#[from] ExtractError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ApiError::Validation(msg) => (StatusCode::UNPROCESSABLE_ENTITY, msg.clone()),
            ApiError::Extraction(e) => {
                error!("Extraction error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, self.to_string())
            }
            ApiError::Internal(e) => {
                error!("Internal error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal error".to_string(),
                )
            }
        };

        let body = Json(json!({
            "error": message,
            "status": status.as_u16(),
        }));

        (status, body).into_response()
    }
}

#[derive(Clone)]
pub struct AppState {
    pub extractor: Arc<dyn Extractor>,
    pub max_file_bytes: usize,
}

pub fn router(state: AppState, max_request_bytes: usize) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/upload", get(show_form).post(handle_upload))
        .layer(DefaultBodyLimit::max(max_request_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> &'static str {
    "OK"
}

async fn show_form() -> Html<&'static str> {
    Html(UPLOAD_FORM)
}

async fn handle_upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Response, ApiError> {
    let mut uploads = Vec::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::Validation(format!("Malformed upload: {e}")))?
    {
        if !matches!(field.name(), Some("pdfs") | Some("pdfs[]")) {
            continue;
        }
        let file_name = field.file_name().unwrap_or("upload.pdf").to_string();
        let content_type = field.content_type().map(str::to_string);
        let bytes = field
            .bytes()
            .await
            .map_err(|e| ApiError::Validation(format!("{file_name}: upload interrupted: {e}")))?;

        validate_upload(&file_name, content_type.as_deref(), &bytes, state.max_file_bytes)?;
        uploads.push((file_name, bytes));
    }

    if uploads.is_empty() {
        return Err(ApiError::Validation(
            "At least one PDF file is required".to_string(),
        ));
    }
    info!(files = uploads.len(), "Upload accepted");

    let inputs = tokio::task::spawn_blocking(move || {
        uploads
            .into_iter()
            .map(|(name, bytes)| DocumentInput::from_pdf(name, &bytes))
            .collect::<Vec<_>>()
    })
    .await
    .map_err(|e| ApiError::Internal(format!("PDF text task failed: {e}")))?;

    let body = render_sheet(state.extractor.as_ref(), inputs).await?;

    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{DOWNLOAD_NAME}\""),
            ),
        ],
        body,
    )
        .into_response())
}

/// Write the sheet to a temp file and return its bytes. The file is
/// removed when `tmp` drops.
async fn render_sheet(
    extractor: &dyn Extractor,
    inputs: Vec<DocumentInput>,
) -> Result<Vec<u8>, ApiError> {
    let tmp = tempfile::Builder::new()
        .prefix("pdf_extract_")
        .suffix(".csv")
        .tempfile()
        .map_err(ExtractError::from)?;

    let mut sheet = SheetWriter::new(tmp.reopen().map_err(ExtractError::from)?, extractor.layout())?;
    let summary = batch::process_documents(extractor, inputs, &mut sheet).await?;
    sheet.finish()?.flush().map_err(ExtractError::from)?;

    let body = tokio::fs::read(tmp.path())
        .await
        .map_err(ExtractError::from)?;
    info!(
        documents = summary.documents,
        failures = summary.failures,
        bytes = body.len(),
        "Sheet ready for download"
    );
    Ok(body)
}

/// Reject empty, oversized or non-PDF uploads.
pub fn validate_upload(
    file_name: &str,
    content_type: Option<&str>,
    bytes: &[u8],
    max_bytes: usize,
) -> Result<(), ApiError> {
    if bytes.is_empty() {
        return Err(ApiError::Validation(format!("{file_name}: file is empty")));
    }
    if bytes.len() > max_bytes {
        return Err(ApiError::Validation(format!(
            "{file_name}: may not be greater than {} kilobytes",
            max_bytes / 1024
        )));
    }

    let named_pdf = file_name.to_lowercase().ends_with(".pdf")
        || content_type.is_some_and(|ct| ct.eq_ignore_ascii_case("application/pdf"));
    if !named_pdf || !bytes.starts_with(b"%PDF-") {
        return Err(ApiError::Validation(format!(
            "{file_name}: must be a file of type: pdf"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractor::PatternExtractor;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    const BOUNDARY: &str = "invoice-sheet-boundary";

    fn app() -> Router {
        let state = AppState {
            extractor: Arc::new(PatternExtractor::default()),
            max_file_bytes: 1024,
        };
        router(state, 1024 * 1024)
    }

    fn upload(files: &[(&str, &str, &str)]) -> Request<Body> {
        let mut body = Vec::new();
        for (name, content_type, data) in files {
            body.extend_from_slice(
                format!(
                    "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"pdfs[]\"; filename=\"{name}\"\r\nContent-Type: {content_type}\r\n\r\n"
                )
                .as_bytes(),
            );
            body.extend_from_slice(data.as_bytes());
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());

        Request::builder()
            .method("POST")
            .uri("/upload")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .unwrap()
    }

    async fn body_string(resp: Response) -> String {
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_form_and_health() {
        let resp = app()
            .oneshot(Request::get("/upload").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert!(body_string(resp).await.contains("name=\"pdfs[]\""));

        let resp = app()
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(body_string(resp).await, "OK");
    }

    #[tokio::test]
    async fn test_non_pdf_rejected() {
        let resp = app()
            .oneshot(upload(&[("notes.txt", "text/plain", "hello")]))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert!(body_string(resp).await.contains("must be a file of type: pdf"));
    }

    #[tokio::test]
    async fn test_no_files_rejected() {
        let resp = app().oneshot(upload(&[])).await.unwrap();
        assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn test_broken_pdf_becomes_error_row() {
        let resp = app()
            .oneshot(upload(&[
                ("one.pdf", "application/pdf", "%PDF-1.4 truncated"),
                ("two.pdf", "application/pdf", "%PDF-1.7 also truncated"),
            ]))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(
            resp.headers()[header::CONTENT_DISPOSITION],
            "attachment; filename=\"extracted_data.csv\""
        );

        let body = body_string(resp).await;
        let rows: Vec<&str> = body.lines().collect();
        assert_eq!(rows.len(), 3);
        assert!(rows[0].starts_with("File,Order Number"));
        assert!(rows[1].starts_with("one.pdf,") && rows[1].contains("ERROR:"));
        assert!(rows[2].starts_with("two.pdf,") && rows[2].contains("ERROR:"));
    }

    #[test]
    fn test_validate_upload() {
        let pdf = b"%PDF-1.4 ...";
        assert!(validate_upload("a.pdf", Some("application/pdf"), pdf, 1024).is_ok());
        assert!(validate_upload("A.PDF", None, pdf, 1024).is_ok());
        assert!(validate_upload("blob", Some("application/pdf"), pdf, 1024).is_ok());
        assert!(validate_upload("a.pdf", None, b"", 1024).is_err());
        assert!(validate_upload("a.pdf", None, pdf, 4).is_err());
        assert!(validate_upload("a.pdf", None, b"PK\x03\x04", 1024).is_err());
        assert!(validate_upload("a.exe", Some("application/octet-stream"), pdf, 1024).is_err());
    }
}
