use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

use crate::ingest::ScanError;
use crate::report::analyzer::AnalysisError;
use crate::report::ExportError;
use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("upload stream failed: {0}")]
    Ingest(#[from] ScanError),

    #[error("analysis failed: {0}")]
    Analysis(#[from] AnalysisError),

    #[error("export failed: {0}")]
    Export(#[from] ExportError),

    #[error("database error: {0}")]
    Store(#[from] StoreError),

    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_type, code, msg) = match &self {
            AppError::InvalidParameter(reason) => (
                StatusCode::BAD_REQUEST,
                "invalid_request_error",
                "bad_request",
                reason.clone(),
            ),
            AppError::Ingest(e) => (
                StatusCode::BAD_REQUEST,
                "invalid_request_error",
                "upload_failed",
                format!("cannot parse file: {}", e),
            ),
            AppError::Analysis(e) => {
                tracing::error!("analysis failed: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "report_failed",
                    "could not build report".to_string(),
                )
            }
            AppError::Export(e) => {
                tracing::error!("export failed: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "export_failed",
                    "could not export report".to_string(),
                )
            }
            AppError::Store(e) => {
                tracing::error!("database error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "internal_server_error",
                    "internal server error".to_string(),
                )
            }
            AppError::Internal(e) => {
                tracing::error!("internal error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "internal_server_error",
                    "internal server error".to_string(),
                )
            }
        };

        let body = Json(json!({
            "error": {
                "message": msg,
                "type": error_type,
                "code": code,
            }
        }));

        (status, body).into_response()
    }
}
