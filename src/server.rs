use std::{net::SocketAddr, sync::Arc, time::Duration};

use axum::{
    extract::{multipart::Field, DefaultBodyLimit, Multipart, State},
    http::{header, Method, StatusCode},
    response::IntoResponse,
    routing::post,
    Json, Router,
};
use bytes::{Bytes, BytesMut};
use log::{info, warn};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::Span;

use crate::{
    codec::{Codec, OutputFormat, Quality},
    config::{Config, Limits},
    error::ConvertError,
    models::{self, ConversionRequest, UploadedImage},
    pipeline,
};

/// Room for multipart boundaries and the two text fields on top of the
/// batch ceiling.
const MULTIPART_OVERHEAD: usize = 1024 * 1024;

#[derive(Clone)]
pub struct AppState {
    config: Arc<Config>,
    codec: Codec,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        let codec = Codec::new(config.avif_speed);
        Self {
            config: Arc::new(config),
            codec,
        }
    }
}

async fn fallback_func() -> (StatusCode, Json<models::ResponseError>) {
    (
        StatusCode::NOT_FOUND,
        Json(models::ResponseError {
            message: String::new(),
            error: String::from("page not found"),
        }),
    )
}

// Reads one file part chunk by chunk, enforcing both ceilings as bytes arrive
async fn read_file(
    field: &mut Field<'_>,
    file_name: &str,
    limits: &Limits,
    batch_bytes: &mut usize,
) -> Result<Bytes, ConvertError> {
    let mut buffer = BytesMut::new();

    while let Some(chunk) = field.chunk().await? {
        if buffer.len() + chunk.len() > limits.max_file_bytes {
            return Err(ConvertError::FileTooLarge {
                name: file_name.to_string(),
                limit: limits.max_file_bytes,
            });
        }
        *batch_bytes += chunk.len();
        if *batch_bytes > limits.max_batch_bytes {
            return Err(ConvertError::BatchTooLarge {
                limit: limits.max_batch_bytes,
            });
        }
        buffer.extend_from_slice(&chunk);
    }

    Ok(buffer.freeze())
}

/// Collects `images`, `format` and `quality` from the form. Parts may come in
/// any order; for repeated text fields the last one wins.
async fn read_request(
    mut multipart: Multipart,
    limits: &Limits,
) -> Result<ConversionRequest, ConvertError> {
    let mut images = Vec::new();
    let mut format = None;
    let mut quality = None;
    let mut batch_bytes = 0usize;

    while let Some(mut field) = multipart.next_field().await? {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("images") => {
                if images.len() == limits.max_files {
                    return Err(ConvertError::TooManyFiles {
                        limit: limits.max_files,
                    });
                }
                let file_name = field.file_name().unwrap_or_default().to_string();
                let data = read_file(&mut field, &file_name, limits, &mut batch_bytes).await?;
                info!("Received file: {} ({} bytes)", file_name, data.len());
                images.push(UploadedImage { file_name, data });
            }
            Some("format") => format = Some(field.text().await?),
            Some("quality") => quality = Some(field.text().await?),
            other => warn!("Ignoring unexpected form field: {:?}", other),
        }
    }

    Ok(ConversionRequest {
        images,
        format: format.as_deref().map(OutputFormat::parse).unwrap_or_default(),
        quality: Quality::parse(quality.as_deref())?,
    })
}

/// `POST /convert`: the whole archive is built before any header is sent, so
/// a failing file always yields an error response instead of a cut-off zip.
async fn convert_handler(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<impl IntoResponse, ConvertError> {
    let request = read_request(multipart, &state.config.limits).await?;
    info!(
        "Converting {} file(s) to {:?}",
        request.images.len(),
        request.format.extension()
    );

    let codec = state.codec;
    let zip_level = state.config.zip_level;
    let archive = tokio::task::spawn_blocking(move || {
        pipeline::convert_batch(&request, &codec, zip_level)
    })
    .await??;

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "application/zip"),
            (
                header::CONTENT_DISPOSITION,
                "attachment; filename=converted.zip",
            ),
        ],
        archive,
    ))
}

pub fn app(state: AppState) -> Router {
    let body_limit = state
        .config
        .limits
        .max_batch_bytes
        .saturating_add(MULTIPART_OVERHEAD);

    // Configure CORS
    let cors = CorsLayer::new()
        .allow_methods([Method::POST, Method::GET])
        .allow_headers(Any)
        .allow_origin(Any);

    Router::new()
        .route("/convert", post(convert_handler))
        .fallback(fallback_func)
        .with_state(state)
        .layer(cors)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http().on_response(
            |response: &http::Response<axum::body::BoxBody>, latency: Duration, span: &Span| {
                let status = response.status();

                info!(
                    "Time: {:?}ms, Response Status: {}",
                    latency.as_millis(),
                    status.as_u16()
                );

                span.in_scope(|| {});
            },
        ))
}

pub async fn serve(config: Config) -> anyhow::Result<()> {
    let addr: SocketAddr = config.addr;
    let app = app(AppState::new(config));

    info!("Server started on http://{}", addr);

    axum::Server::bind(&addr)
        .serve(app.into_make_service())
        .await?;

    Ok(())
}
