//! HTTP request handlers
//!
//! Maps the subtitle service's typed errors onto status codes and
//! serves the two public operations: fetch a library item's subtitle
//! stream in a named format, and convert in-memory subtitle bytes
//! between formats.

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use std::sync::Arc;

use crate::error::SubtitleError;
use crate::service::SubtitleService;

/// HTTP error type
#[derive(Debug)]
pub enum HttpError {
    BadRequest(String),
    NotFound(String),
    Unprocessable(String),
    InternalError(String),
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            HttpError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            HttpError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            HttpError::Unprocessable(msg) => (StatusCode::UNPROCESSABLE_ENTITY, msg),
            HttpError::InternalError(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };
        (status, body).into_response()
    }
}

impl From<SubtitleError> for HttpError {
    fn from(err: SubtitleError) -> Self {
        match err {
            SubtitleError::InvalidArgument(_) | SubtitleError::UnsupportedFormat(_) => {
                HttpError::BadRequest(err.to_string())
            }
            SubtitleError::SourceNotFound { .. } | SubtitleError::StreamNotFound { .. } => {
                HttpError::NotFound(err.to_string())
            }
            SubtitleError::Parse { .. } => HttpError::Unprocessable(err.to_string()),
            _ => HttpError::InternalError(err.to_string()),
        }
    }
}

/// MIME type for a subtitle format tag.
fn content_type(format: &str) -> &'static str {
    match format.to_ascii_lowercase().as_str() {
        "srt" | "subrip" => "application/x-subrip",
        "ass" | "ssa" => "text/x-ssa",
        "vtt" | "webvtt" => "text/vtt",
        _ => "application/octet-stream",
    }
}

/// Health check endpoint
pub async fn health_check() -> &'static str {
    "OK"
}

/// Version endpoint
pub async fn version_check() -> &'static str {
    concat!("subtitle-server v", env!("CARGO_PKG_VERSION"))
}

/// Subtitle stream endpoint
/// GET /items/{item_id}/{source_id}/subtitles/{index}/stream.{format}
pub async fn get_subtitle(
    State(service): State<Arc<SubtitleService>>,
    Path((item_id, source_id, index, file)): Path<(String, String, u32, String)>,
) -> Result<Response, HttpError> {
    let format = file
        .strip_prefix("stream.")
        .ok_or_else(|| HttpError::BadRequest(format!("unexpected file name: {}", file)))?;

    let payload = service
        .get_subtitle(&item_id, &source_id, index, format)
        .await?;

    let mut headers = HeaderMap::new();
    headers.insert(
        "Content-Type",
        HeaderValue::from_static(content_type(format)),
    );
    Ok((headers, payload).into_response())
}

/// In-memory conversion endpoint
/// POST /convert/{from}/{to}, body = subtitle bytes
pub async fn convert(
    State(service): State<Arc<SubtitleService>>,
    Path((from, to)): Path<(String, String)>,
    body: Bytes,
) -> Result<Response, HttpError> {
    let converted = service.convert_text(&body, &from, &to)?;

    let mut headers = HeaderMap::new();
    headers.insert("Content-Type", HeaderValue::from_static(content_type(&to)));
    Ok((headers, converted).into_response())
}

/// Lock registry stats endpoint
/// GET /debug/locks
pub async fn lock_stats(State(service): State<Arc<SubtitleService>>) -> Response {
    Json(serde_json::json!({ "live_locks": service.live_locks() })).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_type() {
        assert_eq!(content_type("SRT"), "application/x-subrip");
        assert_eq!(content_type("vtt"), "text/vtt");
        assert_eq!(content_type("ass"), "text/x-ssa");
        assert_eq!(content_type("bin"), "application/octet-stream");
    }

    #[test]
    fn test_error_mapping() {
        let err: HttpError = SubtitleError::UnsupportedFormat("dfxp".to_string()).into();
        assert!(matches!(err, HttpError::BadRequest(_)));

        let err: HttpError = SubtitleError::SourceNotFound {
            item_id: "i".to_string(),
            source_id: "s".to_string(),
        }
        .into();
        assert!(matches!(err, HttpError::NotFound(_)));

        let err: HttpError = SubtitleError::StreamNotFound {
            source_id: "s".to_string(),
            index: 2,
        }
        .into();
        assert!(matches!(err, HttpError::NotFound(_)));

        let err: HttpError = SubtitleError::parse("srt", "bad timing").into();
        assert!(matches!(err, HttpError::Unprocessable(_)));

        let err: HttpError = SubtitleError::ProcessFailed {
            operation: "extract".to_string(),
            output: std::path::PathBuf::from("x.ass"),
            reason: "timed out".to_string(),
        }
        .into();
        assert!(matches!(err, HttpError::InternalError(_)));
    }
}
