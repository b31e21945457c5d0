use std::str::FromStr;

use actix_multipart::Multipart;
use actix_web::http::StatusCode;
use actix_web::web::Bytes;
use actix_web::{web, HttpRequest, HttpResponse, Responder, ResponseError};
use futures_util::StreamExt as _;
use serde::{Deserialize, Serialize};
use shared::dto::{CompletionRequest, RecordFilter, Status};
use shared::error::AppError;
use shared::ocr::RawSubmission;
use shared::service::CertificateService;
use tracing::{error, info};
use uuid::Uuid;

pub const SUBMITTER_HEADER: &str = "X-Submitter-Id";
pub const STAFF_HEADER: &str = "X-Staff-Id";

const DEFAULT_SEARCH_LIMIT: usize = 5;
const DEFAULT_LEADERBOARD_LIMIT: usize = 10;

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    App(#[from] AppError),
    #[error("{0}")]
    BadRequest(String),
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::App(e) => match e {
                AppError::DuplicateContent { .. } => StatusCode::CONFLICT,
                AppError::RecordNotFound(_) => StatusCode::NOT_FOUND,
                AppError::InvalidStateTransition { .. } => StatusCode::BAD_REQUEST,
                AppError::ExtractionUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        if status.is_server_error() {
            error!(error = %self, "request failed");
        }
        HttpResponse::build(status).json(ErrorResponse {
            error: self.to_string(),
        })
    }
}

type ApiResult = Result<HttpResponse, ApiError>;

fn required_header(req: &HttpRequest, name: &str) -> Result<String, ApiError> {
    req.headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .ok_or_else(|| ApiError::BadRequest(format!("missing {name} header")))
}

pub async fn health() -> impl Responder {
    "OK"
}

pub async fn upload(
    req: HttpRequest,
    mut payload: Multipart,
    service: web::Data<CertificateService>,
) -> ApiResult {
    let submitter_id = required_header(&req, SUBMITTER_HEADER)?;
    let mut submission: Option<RawSubmission> = None;

    while let Some(item) = payload.next().await {
        let mut field = item.map_err(|e| ApiError::BadRequest(e.to_string()))?;
        if field.name() != "file" {
            while let Some(_chunk) = field.next().await {}
            continue;
        }
        let filename = field
            .content_disposition()
            .get_filename()
            .map(|f| f.to_string())
            .unwrap_or_else(|| "upload.bin".into());
        let content_type = field.content_type().map(|m| m.essence_str().to_string());
        let mut buf = Vec::new();
        while let Some(chunk) = field.next().await {
            let bytes: Bytes = chunk.map_err(|e| ApiError::BadRequest(e.to_string()))?;
            buf.extend_from_slice(&bytes);
        }
        submission = Some(RawSubmission::new(buf, filename, content_type.as_deref()));
    }

    let submission = submission
        .filter(|s| !s.bytes.is_empty())
        .ok_or_else(|| ApiError::BadRequest("multipart field 'file' is required".into()))?;
    info!(file = %submission.filename, size = submission.bytes.len(), %submitter_id, "handling upload");

    let out = service.upload(submission, &submitter_id).await?;
    Ok(HttpResponse::Created().json(out))
}

pub async fn submit(
    body: web::Json<CompletionRequest>,
    service: web::Data<CertificateService>,
) -> ApiResult {
    let out = service.complete(body.into_inner()).await?;
    Ok(HttpResponse::Ok().json(out))
}

#[derive(Debug, Deserialize)]
pub struct ListParams {
    pub submitter_id: Option<String>,
    /// Comma separated, e.g. `processed,validated`.
    pub status: Option<String>,
}

impl ListParams {
    fn filter(&self) -> Result<RecordFilter, ApiError> {
        let statuses = match self.status.as_deref().filter(|s| !s.trim().is_empty()) {
            Some(raw) => Some(
                raw.split(',')
                    .map(|s| {
                        Status::from_str(s.trim())
                            .map_err(|_| ApiError::BadRequest(format!("unknown status '{s}'")))
                    })
                    .collect::<Result<Vec<_>, _>>()?,
            ),
            None => None,
        };
        Ok(RecordFilter {
            submitter_id: self.submitter_id.clone(),
            statuses,
        })
    }
}

pub async fn list_certificates(
    params: web::Query<ListParams>,
    service: web::Data<CertificateService>,
) -> ApiResult {
    let rows = service.list(&params.filter()?).await?;
    Ok(HttpResponse::Ok().json(rows))
}

pub async fn get_certificate(
    path: web::Path<Uuid>,
    service: web::Data<CertificateService>,
) -> ApiResult {
    let row = service.detail(path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(row))
}

pub async fn validate_certificate(
    req: HttpRequest,
    path: web::Path<Uuid>,
    service: web::Data<CertificateService>,
) -> ApiResult {
    let staff_id = required_header(&req, STAFF_HEADER)?;
    let out = service.validate(path.into_inner(), &staff_id).await?;
    Ok(HttpResponse::Ok().json(out))
}

#[derive(Debug, Deserialize)]
pub struct SearchParams {
    #[serde(default)]
    pub query: String,
    pub limit: Option<usize>,
}

pub async fn search(
    params: web::Query<SearchParams>,
    service: web::Data<CertificateService>,
) -> ApiResult {
    let limit = params.limit.unwrap_or(DEFAULT_SEARCH_LIMIT);
    let groups = service.search(&params.query, limit).await?;
    Ok(HttpResponse::Ok().json(groups))
}

#[derive(Debug, Deserialize)]
pub struct LimitParams {
    pub limit: Option<usize>,
}

pub async fn leaderboard(
    params: web::Query<LimitParams>,
    service: web::Data<CertificateService>,
) -> ApiResult {
    let board = service
        .leaderboard(params.limit.unwrap_or(DEFAULT_LEADERBOARD_LIMIT))
        .await?;
    Ok(HttpResponse::Ok().json(board))
}

pub async fn dashboard_counts(service: web::Data<CertificateService>) -> ApiResult {
    Ok(HttpResponse::Ok().json(service.dashboard_counts().await?))
}

pub async fn submitter_summary(
    path: web::Path<String>,
    service: web::Data<CertificateService>,
) -> ApiResult {
    let summary = service.submitter_summary(&path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(summary))
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/health", web::get().to(health))
        .route("/certificates/upload", web::post().to(upload))
        .route("/certificates/submit", web::post().to(submit))
        .route("/certificates", web::get().to(list_certificates))
        .route("/certificates/{id}", web::get().to(get_certificate))
        .route(
            "/certificates/{id}/validate",
            web::post().to(validate_certificate),
        )
        .route("/search", web::get().to(search))
        .route("/leaderboard", web::get().to(leaderboard))
        .route("/dashboard/counts", web::get().to(dashboard_counts))
        .route("/submitters/{id}/summary", web::get().to(submitter_summary));
}
