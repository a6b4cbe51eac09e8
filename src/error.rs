use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use crate::model::PredictError;

/// Fatal problems with the input files. Any of these aborts startup.
#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error("cost table is missing required columns {missing:?}; columns present: {present:?}")]
    MissingColumns {
        missing: Vec<String>,
        present: Vec<String>,
    },

    #[error("cost table has no data rows")]
    EmptyDataset,

    #[error("row {row}, column '{column}': expected a number, got '{value}'")]
    BadNumber {
        row: usize,
        column: String,
        value: String,
    },

    #[error("unsupported cost table format '{0}' (expected .xlsx, .xls, .xlsm, .ods or .csv)")]
    UnsupportedFormat(String),

    #[error("GeoJSON must carry a '{attribute}' attribute on every feature; attributes present: {present:?}")]
    MissingNameAttribute {
        attribute: &'static str,
        present: Vec<String>,
    },

    #[error("{missing} of {total} GeoJSON features have no '{attribute}' attribute")]
    UnnamedFeatures {
        attribute: &'static str,
        missing: usize,
        total: usize,
    },

    #[error("GeoJSON contains no features with usable geometry")]
    NoUsableFeatures,

    #[error("GeoJSON root must be a FeatureCollection or Feature")]
    NotAFeatureCollection,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EncodeError {
    #[error("value '{value}' was not seen in column '{column}' during training")]
    UnseenCategory { column: String, value: String },

    #[error("no encoder fitted for column '{0}'")]
    UnknownColumn(String),
}

/// Per-request failures, rendered as `{"detail": "..."}`.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Could not validate API KEY")]
    AccessDenied,

    #[error("Model/data belum siap")]
    NotReady,

    #[error("Penyakit '{0}' tidak ditemukan di data")]
    UnknownDisease(String),

    #[error("{0}")]
    InvalidRequest(String),

    #[error(transparent)]
    Model(#[from] PredictError),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::AccessDenied => StatusCode::FORBIDDEN,
            Self::NotReady => StatusCode::SERVICE_UNAVAILABLE,
            Self::UnknownDisease(_) => StatusCode::BAD_REQUEST,
            Self::InvalidRequest(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Model(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    detail: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::warn!("request failed: {}", self);
        }
        (
            status,
            Json(ErrorBody {
                detail: self.to_string(),
            }),
        )
            .into_response()
    }
}
