// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2023-2025 Matter Labs

//! HTTP boundary of the [`Gateway`]

use crate::{error::Error, fingerprint::Fingerprint, gateway::Gateway, VerificationOutcome};
use actix_web::{
    http::StatusCode,
    web::{self, Bytes, Data, Json, Path},
    HttpResponse, ResponseError,
};
use anyhow::anyhow;
use serde::Serialize;
use std::fmt::{Debug, Display, Formatter};
use tracing::{error, warn};

/// Evidence submission
pub const UPLOAD_URL: &str = "/report/upload";
/// Stored verdict of a fingerprint
pub const REPORT_URL: &str = "/report/{fingerprint}";

/// Default upper bound of an evidence payload
pub const DEFAULT_MAX_PAYLOAD: usize = 1024 * 1024;

/// Anyhow error with an HTTP status code
pub struct HttpResponseError {
    /// error message
    pub error: anyhow::Error,
    /// HTTP status code
    pub status_code: StatusCode,
}

impl std::error::Error for HttpResponseError {}

/// Attach an HTTP status code to an anyhow error turning it into an HttpResponseError
pub trait Status {
    /// The Ok type
    type Ok;
    /// Attach an HTTP status code to an anyhow error turning it into an HttpResponseError
    fn status(self, status: StatusCode) -> Result<Self::Ok, HttpResponseError>;
}

impl<T, E> Status for Result<T, E>
where
    E: Into<anyhow::Error>,
{
    type Ok = T;
    fn status(self, status: StatusCode) -> Result<T, HttpResponseError> {
        self.map_err(|error| HttpResponseError::new(error.into(), status))
    }
}

impl HttpResponseError {
    fn new(error: anyhow::Error, status_code: StatusCode) -> Self {
        Self { error, status_code }
    }
}

impl From<Error> for HttpResponseError {
    fn from(error: Error) -> Self {
        let status_code = match &error {
            Error::Parse(_) | Error::Validation { .. } => StatusCode::BAD_REQUEST,
            Error::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            Error::Storage(_) | Error::Verifier(_) => StatusCode::SERVICE_UNAVAILABLE,
        };
        if error.is_client_error() {
            warn!("Rejected submission: {error}");
        } else {
            error!("Failed to process submission: {error}");
        }
        Self::new(anyhow!(error), status_code)
    }
}

impl Debug for HttpResponseError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if f.alternate() {
            write!(f, "{:#?}", self.error)
        } else {
            write!(f, "{:?}", self.error)
        }
    }
}

impl Display for HttpResponseError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if f.alternate() {
            write!(f, "{:#}", self.error)
        } else {
            write!(f, "{}", self.error)
        }
    }
}

impl ResponseError for HttpResponseError {
    fn status_code(&self) -> StatusCode {
        self.status_code
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code())
            .json(serde_json::json!({ "error": format!("{:#}", self.error) }))
    }
}

/// Stored verdict as returned by [`get_report`]
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredReport {
    /// deduplication key
    pub fingerprint: Fingerprint,
    /// verdict of the first verification
    pub verified: bool,
    /// time of the first verification
    pub created_at: chrono::DateTime<chrono::Utc>,
}

/// Submit evidence, the request body is the raw payload.
pub async fn upload_report(
    gateway: Data<Gateway>,
    body: Bytes,
) -> Result<Json<VerificationOutcome>, HttpResponseError> {
    let outcome = gateway.verify_evidence(&body).await?;
    Ok(Json(outcome))
}

/// Look up the stored verdict of a fingerprint.
pub async fn get_report(
    gateway: Data<Gateway>,
    fingerprint: Path<String>,
) -> Result<Json<StoredReport>, HttpResponseError> {
    let fingerprint: Fingerprint = fingerprint
        .parse()
        .map_err(|e| anyhow!("invalid fingerprint: {e}"))
        .status(StatusCode::BAD_REQUEST)?;

    let record = gateway
        .record(&fingerprint)
        .await?
        .ok_or_else(|| anyhow!("no verdict for {fingerprint}"))
        .status(StatusCode::NOT_FOUND)?;

    Ok(Json(StoredReport {
        fingerprint: record.fingerprint,
        verified: record.verified,
        created_at: record.created_at,
    }))
}

/// Payload limit for evidence submissions
pub fn new_payload_cfg(limit: usize) -> web::PayloadConfig {
    web::PayloadConfig::new(limit)
}

/// Register the gateway routes
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource(UPLOAD_URL).route(web::post().to(upload_report)))
        .service(web::resource(REPORT_URL).route(web::get().to(get_report)));
}
