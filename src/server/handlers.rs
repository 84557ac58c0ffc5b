//! Request handlers

use super::state::{lock_pipeline, AppState};
use super::templates;
use crate::error::NoBackError;
use crate::tracing_config::spans;
use axum::{
    body::Bytes,
    extract::{multipart::MultipartRejection, Multipart, Path, State},
    http::{header, StatusCode},
    response::{Html, IntoResponse, Response},
};
use tracing::{debug, error, info, warn};

/// `GET /`: the upload form
pub async fn index() -> Html<String> {
    Html(templates::index_page())
}

/// `POST /process_image`: save the upload, run the pipeline, show the result
///
/// A request without a file in the `image` field gets the "no image" page with
/// status 200 and never reaches the model. Any failure after that point is a
/// 500 with a generic page; the cause is only logged.
pub async fn process_image(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Response {
    let multipart = match multipart {
        Ok(multipart) => multipart,
        Err(rejection) => {
            warn!(reason = %rejection.body_text(), "Request is not a multipart upload");
            return Html(templates::missing_upload_page()).into_response();
        },
    };

    let upload = match read_image_field(multipart, state.config().max_upload_bytes).await {
        Ok(Some(upload)) => upload,
        Ok(None) => {
            info!("Upload form submitted without an image");
            return Html(templates::missing_upload_page()).into_response();
        },
        Err(response) => return response,
    };

    let span = spans::upload(upload.len());
    let pipeline = state.pipeline();
    let outcome = tokio::task::spawn_blocking(move || {
        let _entered = span.enter();
        let mut pipeline = lock_pipeline(&pipeline);
        pipeline.process_upload(&upload)
    })
    .await;

    match outcome {
        Ok(Ok(result)) => {
            info!(
                width = result.original_dimensions.0,
                height = result.original_dimensions.1,
                total_ms = result.timings.total_ms,
                "Background removed"
            );
            let config = state.config();
            if config.debug {
                match serde_json::to_string(&result.timings) {
                    Ok(timings) => debug!(
                        timings = %timings,
                        inference_ratio = result.timings.inference_ratio(),
                        unattributed_ms = result.timings.other_overhead_ms(),
                        "Stage timings"
                    ),
                    Err(e) => warn!(error = %e, "Failed to serialize timings"),
                }
            }
            Html(templates::result_page(
                &config.output_url(),
                &config.output_filename,
            ))
            .into_response()
        },
        Ok(Err(e)) => {
            error!(error = %e, "Failed to process upload");
            server_error()
        },
        Err(e) => {
            error!(error = %e, "Processing task failed");
            server_error()
        },
    }
}

/// Pull the bytes of the `image` file field out of the form
///
/// Returns `Ok(None)` when the field is absent or was submitted without a
/// file name.
async fn read_image_field(
    mut multipart: Multipart,
    max_upload_bytes: usize,
) -> Result<Option<Bytes>, Response> {
    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => return Ok(None),
            Err(e) => return Err(multipart_error(&e, max_upload_bytes)),
        };

        if field.name() != Some("image") {
            continue;
        }

        let has_file_name = field.file_name().is_some_and(|name| !name.is_empty());
        if !has_file_name {
            return Ok(None);
        }

        return field
            .bytes()
            .await
            .map(Some)
            .map_err(|e| multipart_error(&e, max_upload_bytes));
    }
}

fn multipart_error(e: &axum::extract::multipart::MultipartError, max_upload_bytes: usize) -> Response {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        warn!(error = %e, "Upload exceeds size limit");
        return (
            StatusCode::PAYLOAD_TOO_LARGE,
            Html(templates::upload_too_large_page(max_upload_bytes)),
        )
            .into_response();
    }
    error!(error = %e, "Malformed multipart body");
    server_error()
}

/// `GET /NoBackImages/{file}`: the latest composite
pub async fn output_image(State(state): State<AppState>, Path(file_name): Path<String>) -> Response {
    if file_name != state.config().output_filename {
        return StatusCode::NOT_FOUND.into_response();
    }

    let output_path = state.config().output_path();
    let pipeline = state.pipeline();
    // Read under the pipeline lock so a half-written file is never served
    let read = tokio::task::spawn_blocking(move || {
        let _guard = lock_pipeline(&pipeline);
        std::fs::read(&output_path)
            .map_err(|e| NoBackError::file_io_error("read output image", &output_path, &e))
    })
    .await;

    match read {
        Ok(Ok(bytes)) => (
            [
                (header::CONTENT_TYPE, "image/jpeg"),
                (header::CACHE_CONTROL, "no-store"),
            ],
            bytes,
        )
            .into_response(),
        Ok(Err(NoBackError::Io(e))) if e.kind() == std::io::ErrorKind::NotFound => {
            StatusCode::NOT_FOUND.into_response()
        },
        Ok(Err(e)) => {
            error!(error = %e, "Failed to serve output image");
            server_error()
        },
        Err(e) => {
            error!(error = %e, "Output read task failed");
            server_error()
        },
    }
}

fn server_error() -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Html(templates::server_error_page()),
    )
        .into_response()
}
