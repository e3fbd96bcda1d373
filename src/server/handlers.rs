use anyhow::{Context, Result};
use axum::body::{Body, Bytes};
use axum::extract::{DefaultBodyLimit, FromRequest, Multipart, State};
use axum::http::{HeaderMap, HeaderValue, Method, Request, Response, StatusCode, header};
use axum::middleware::Next;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use std::future::Future;
use std::sync::Arc;
use tracing::{info, warn};

use super::models::{ErrorResponse, TranslateRequest, TranslateResponse};
use super::state::ServerState;
use crate::error::PipelineError;
use crate::pipeline::PagePipeline;
use crate::render::image_format_from_mime;

const PDF_MIME: &str = "application/pdf";
const PNG_MIME: &str = "image/png";

type ApiError = (StatusCode, Json<ErrorResponse>);

const IMAGE_FIELDS: &[&str] = &["image", "file"];
const PDF_FIELDS: &[&str] = &["pdf", "file"];

/// Builds the router. Request bodies up to `max_upload_bytes` are accepted on
/// every route.
pub fn app(pipeline: PagePipeline, max_upload_bytes: usize) -> Router {
    let state = Arc::new(ServerState { pipeline });
    Router::new()
        .route("/health", get(health))
        .route("/translate-image", post(translate_image))
        .route("/translate-pdf", post(translate_pdf))
        .route("/translate", post(translate_json))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .with_state(state)
        .layer(axum::middleware::from_fn(cors_middleware))
}

pub async fn run_server(pipeline: PagePipeline, addr: String, max_upload_bytes: usize) -> Result<()> {
    let app = app(pipeline, max_upload_bytes);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| "failed to bind server address")?;
    info!("listening on {}", addr);
    axum::serve(listener, app).await?;
    Ok(())
}

async fn health() -> impl IntoResponse {
    (StatusCode::OK, Json(serde_json::json!({ "status": "ok" })))
}

async fn cors_middleware(req: Request<Body>, next: Next) -> Result<Response<Body>, StatusCode> {
    if req.method() == Method::OPTIONS {
        let mut response = Response::new(Body::empty());
        *response.status_mut() = StatusCode::NO_CONTENT;
        apply_cors_headers(response.headers_mut());
        return Ok(response);
    }
    let mut response = next.run(req).await;
    apply_cors_headers(response.headers_mut());
    Ok(response)
}

fn apply_cors_headers(headers: &mut HeaderMap) {
    headers.insert("access-control-allow-origin", HeaderValue::from_static("*"));
    headers.insert(
        "access-control-allow-methods",
        HeaderValue::from_static("GET,POST,OPTIONS"),
    );
    headers.insert(
        "access-control-allow-headers",
        HeaderValue::from_static("content-type,authorization"),
    );
    headers.insert(
        "access-control-expose-headers",
        HeaderValue::from_static("x-failed-pages"),
    );
}

async fn translate_image(
    State(state): State<Arc<ServerState>>,
    request: Request<Body>,
) -> Result<Response<Body>, ApiError> {
    let body = read_upload(request, IMAGE_FIELDS).await?;
    let (bytes, report) = run_job(state, move |state| async move {
        crate::translate_image_bytes(&state.pipeline, &body, PNG_MIME).await
    })
    .await?;
    let failed = if report.status == crate::pipeline::PageStatus::Translated {
        Vec::new()
    } else {
        vec![report.page]
    };
    Ok(binary_response(PNG_MIME, bytes, &failed))
}

async fn translate_pdf(
    State(state): State<Arc<ServerState>>,
    request: Request<Body>,
) -> Result<Response<Body>, ApiError> {
    let body = read_upload(request, PDF_FIELDS).await?;
    let (bytes, report) = run_job(state, move |state| async move {
        crate::translate_pdf_bytes(&state.pipeline, &body).await
    })
    .await?;
    Ok(binary_response(PDF_MIME, bytes, &report.failed_pages()))
}

async fn translate_json(
    State(state): State<Arc<ServerState>>,
    Json(payload): Json<TranslateRequest>,
) -> Result<Json<TranslateResponse>, ApiError> {
    let bytes = BASE64
        .decode(payload.data_base64.trim())
        .map_err(|err| bad_request(format!("data_base64 is not valid base64: {}", err)))?;
    let is_pdf = payload.mime.as_deref() == Some(PDF_MIME) || bytes.starts_with(b"%PDF");
    let output_mime = match payload.output_mime.as_deref() {
        Some(mime) if image_format_from_mime(mime).is_some() => mime.to_string(),
        Some(mime) if !is_pdf => return Err(bad_request(format!("unsupported output mime '{}'", mime))),
        _ => PNG_MIME.to_string(),
    };

    let response = run_job(state, move |state| async move {
        if is_pdf {
            let (pdf, report) = crate::translate_pdf_bytes(&state.pipeline, &bytes).await?;
            Ok::<_, anyhow::Error>(TranslateResponse {
                mime: PDF_MIME.to_string(),
                data_base64: BASE64.encode(pdf),
                report: serde_json::to_value(report)?,
            })
        } else {
            let (image, report) =
                crate::translate_image_bytes(&state.pipeline, &bytes, &output_mime).await?;
            Ok::<_, anyhow::Error>(TranslateResponse {
                mime: output_mime,
                data_base64: BASE64.encode(image),
                report: serde_json::to_value(report)?,
            })
        }
    })
    .await?;
    Ok(Json(response))
}

/// Upload bytes from either a `multipart/form-data` form (first field named
/// in `fields`) or a raw request body.
async fn read_upload(request: Request<Body>, fields: &[&str]) -> Result<Bytes, ApiError> {
    let is_multipart = request
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.starts_with("multipart/form-data"));
    if !is_multipart {
        return Bytes::from_request(request, &())
            .await
            .map_err(|rejection| rejected(rejection.status(), rejection.body_text()));
    }

    let mut multipart = Multipart::from_request(request, &())
        .await
        .map_err(|rejection| rejected(rejection.status(), rejection.body_text()))?;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| rejected(err.status(), err.body_text()))?
    {
        if field.name().is_some_and(|name| fields.contains(&name)) {
            return field
                .bytes()
                .await
                .map_err(|err| rejected(err.status(), err.body_text()));
        }
    }
    Err(bad_request(format!(
        "no upload found in form (expected field '{}')",
        fields.join("' or '")
    )))
}

fn rejected(status: StatusCode, error: String) -> ApiError {
    (status, Json(ErrorResponse { error }))
}

/// Runs a pipeline job to completion on a blocking thread. Job futures hold
/// renderers and are not `Send`.
async fn run_job<T, F, Fut>(state: Arc<ServerState>, job: F) -> Result<T, ApiError>
where
    F: FnOnce(Arc<ServerState>) -> Fut + Send + 'static,
    Fut: Future<Output = Result<T>>,
    T: Send + 'static,
{
    let handle = tokio::runtime::Handle::current();
    tokio::task::spawn_blocking(move || handle.block_on(job(state)))
        .await
        .map_err(|err| {
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: format!("server task failed: {}", err),
                }),
            )
        })?
        .map_err(error_response)
}

fn binary_response(mime: &'static str, bytes: Vec<u8>, failed_pages: &[usize]) -> Response<Body> {
    let mut response = Response::new(Body::from(bytes));
    let headers = response.headers_mut();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(mime));
    if !failed_pages.is_empty() {
        let list = failed_pages
            .iter()
            .map(|page| page.to_string())
            .collect::<Vec<_>>()
            .join(",");
        if let Ok(value) = HeaderValue::from_str(&list) {
            headers.insert("x-failed-pages", value);
        }
    }
    response
}

fn bad_request(error: String) -> ApiError {
    rejected(StatusCode::BAD_REQUEST, error)
}

fn error_response(err: anyhow::Error) -> ApiError {
    let status = match err.downcast_ref::<PipelineError>() {
        Some(pipeline_err) if pipeline_err.is_input_error() => StatusCode::BAD_REQUEST,
        Some(PipelineError::TranslationBatchMismatch { .. }) | Some(PipelineError::Translation(_)) => {
            StatusCode::BAD_GATEWAY
        }
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status != StatusCode::BAD_REQUEST {
        warn!("request failed: {:#}", err);
    }
    (
        status,
        Json(ErrorResponse {
            error: format!("{:#}", err),
        }),
    )
}
