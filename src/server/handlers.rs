//! Request handlers: `/healthz` and `/flatten`.
//!
//! `/flatten` accepts the document two ways, chosen by the request's
//! `Content-Type`:
//!
//! * `multipart/form-data` with a `file` part (browser forms, n8n's
//!   "binary data" uploads);
//! * any other type: the raw request body is the PDF.
//!
//! In both cases the declared media type must be `application/pdf` or
//! `application/octet-stream`.

use super::error::ApiError;
use super::AppState;
use crate::config::Dpi;
use crate::files::flattened_file_name;
use crate::flatten::flatten_async;
use axum::{
    body::Bytes,
    extract::{
        multipart::MultipartError, rejection::QueryRejection, FromRequest, Multipart, Query,
        Request, State,
    },
    http::{header, HeaderMap, HeaderName},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, info};

const ACCEPTED_MEDIA_TYPES: [&str; 2] = ["application/pdf", "application/octet-stream"];

const PAGE_COUNT_HEADER: &str = "x-page-count";

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    pub ok: bool,
}

/// Handler: GET /healthz
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { ok: true })
}

/// Query parameters of `POST /flatten`.
#[derive(Debug, Deserialize)]
pub struct FlattenParams {
    /// Rasterisation DPI (72–600). Falls back to the server default.
    pub dpi: Option<u32>,
    /// Name used for the download when the PDF arrives as a raw body.
    pub filename: Option<String>,
}

/// The uploaded document, however it arrived.
struct Upload {
    file_name: Option<String>,
    bytes: Bytes,
}

/// Handler: POST /flatten
pub async fn flatten(
    State(state): State<AppState>,
    params: Result<Query<FlattenParams>, QueryRejection>,
    request: Request,
) -> Result<Response, ApiError> {
    let Query(params) = params.map_err(|e| ApiError::InvalidRequest(e.body_text()))?;

    let dpi = match params.dpi {
        Some(value) => Dpi::new(value)?,
        None => state.default_dpi,
    };

    let upload = if is_multipart(request.headers()) {
        let multipart = Multipart::from_request(request, &state)
            .await
            .map_err(|e| ApiError::InvalidRequest(e.body_text()))?;
        read_multipart(multipart).await?
    } else {
        let media_type = media_type(request.headers());
        ensure_pdf_media_type(media_type.as_deref())?;
        let bytes = Bytes::from_request(request, &state)
            .await
            .map_err(|e| ApiError::Body {
                status: e.status(),
                message: e.body_text(),
            })?;
        Upload {
            file_name: params.filename,
            bytes,
        }
    };

    if upload.bytes.is_empty() {
        return Err(ApiError::InvalidRequest("Empty file".into()));
    }

    info!(
        "Flatten request: {} bytes at {} DPI (file: {})",
        upload.bytes.len(),
        dpi,
        upload.file_name.as_deref().unwrap_or("<unnamed>")
    );

    // One deadline covers both the wait for a permit and the transform.
    let deadline = Instant::now() + state.timeout;
    let permit = match timeout_at(deadline, Arc::clone(&state.permits).acquire_owned()).await {
        Ok(Ok(permit)) => permit,
        Ok(Err(e)) => {
            return Err(ApiError::Internal(format!(
                "Concurrency limiter closed: {e}"
            )))
        }
        Err(_) => return Err(ApiError::Timeout(state.timeout.as_secs())),
    };

    // The permit travels with the job so it is only returned once the
    // blocking transform has actually finished, even after a timeout.
    let service = Arc::clone(&state.service);
    let bytes = upload.bytes.to_vec();
    let job = tokio::spawn(async move {
        let result = flatten_async(service, bytes, dpi).await;
        drop(permit);
        result
    });

    let output = match timeout_at(deadline, job).await {
        Ok(Ok(result)) => result?,
        Ok(Err(e)) => return Err(ApiError::Internal(format!("Flatten job failed: {e}"))),
        Err(_) => return Err(ApiError::Timeout(state.timeout.as_secs())),
    };

    let file_name = flattened_file_name(upload.file_name.as_deref());
    debug!(
        "Responding with {} ({} pages, {} bytes)",
        file_name,
        output.stats.page_count,
        output.pdf.len()
    );

    Ok((
        [
            (header::CONTENT_TYPE, "application/pdf".to_string()),
            (header::CONTENT_DISPOSITION, content_disposition(&file_name)),
            (
                HeaderName::from_static(PAGE_COUNT_HEADER),
                output.stats.page_count.to_string(),
            ),
        ],
        output.pdf,
    )
        .into_response())
}

/// Pull the `file` part out of a multipart upload.
async fn read_multipart(mut multipart: Multipart) -> Result<Upload, ApiError> {
    while let Some(field) = multipart.next_field().await.map_err(body_error)? {
        if field.name() != Some("file") {
            continue;
        }

        ensure_pdf_media_type(field.content_type())?;
        let file_name = field.file_name().map(str::to_string);
        let bytes = field.bytes().await.map_err(body_error)?;
        return Ok(Upload { file_name, bytes });
    }

    Err(ApiError::InvalidRequest(
        "Missing multipart field 'file'".into(),
    ))
}

fn body_error(e: MultipartError) -> ApiError {
    ApiError::Body {
        status: e.status(),
        message: e.body_text(),
    }
}

fn is_multipart(headers: &HeaderMap) -> bool {
    media_type(headers).as_deref() == Some("multipart/form-data")
}

/// The request's media type, lower-cased and without parameters.
fn media_type(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(normalise_media_type)
}

fn normalise_media_type(value: &str) -> String {
    value
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

fn ensure_pdf_media_type(declared: Option<&str>) -> Result<(), ApiError> {
    let accepted = declared
        .map(normalise_media_type)
        .is_some_and(|t| ACCEPTED_MEDIA_TYPES.contains(&t.as_str()));
    if accepted {
        Ok(())
    } else {
        Err(ApiError::InvalidRequest("Upload a PDF file".into()))
    }
}

/// `attachment; filename="..."` restricted to printable ASCII.
fn content_disposition(file_name: &str) -> String {
    let safe: String = file_name
        .chars()
        .map(|c| match c {
            '"' | '\\' => '_',
            c if c.is_ascii_graphic() || c == ' ' => c,
            _ => '_',
        })
        .collect();
    format!("attachment; filename=\"{safe}\"")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn media_type_normalisation() {
        assert_eq!(normalise_media_type("Application/PDF"), "application/pdf");
        assert_eq!(
            normalise_media_type("multipart/form-data; boundary=xyz"),
            "multipart/form-data"
        );
    }

    #[test]
    fn pdf_media_types_are_accepted() {
        assert!(ensure_pdf_media_type(Some("application/pdf")).is_ok());
        assert!(ensure_pdf_media_type(Some("application/octet-stream")).is_ok());
        assert!(ensure_pdf_media_type(Some("application/pdf; charset=binary")).is_ok());
        assert!(ensure_pdf_media_type(Some("image/png")).is_err());
        assert!(ensure_pdf_media_type(None).is_err());
    }

    #[test]
    fn content_disposition_is_header_safe() {
        assert_eq!(
            content_disposition("report.flattened.pdf"),
            "attachment; filename=\"report.flattened.pdf\""
        );
        assert_eq!(
            content_disposition("a\"b\\ü.flattened.pdf"),
            "attachment; filename=\"a_b__.flattened.pdf\""
        );
    }
}
