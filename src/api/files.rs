/// File upload, listing, download and deletion endpoints
use crate::{
    blob_store::BlobResponse,
    context::AppContext,
    error::{MediaError, MediaResult},
};
use axum::{
    body::Body,
    extract::{
        multipart::{MultipartError, MultipartRejection},
        Multipart, Path, State,
    },
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use tokio::io::AsyncReadExt;

/// Multipart part carrying the uploaded file
const FILE_FIELD: &str = "file";

/// Build file routes
pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/files", get(list_files).post(upload_file))
        .route("/files/:id", get(get_file).delete(delete_file))
}

/// Upload a file
///
/// Expects `multipart/form-data` with one part named `file`.
async fn upload_file(
    State(ctx): State<AppContext>,
    multipart: Result<Multipart, MultipartRejection>,
) -> MediaResult<impl IntoResponse> {
    let mut multipart =
        multipart.map_err(|rejection| MediaError::Validation(rejection.body_text()))?;

    let mut upload = None;
    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }
        let filename = field.file_name().unwrap_or_default().to_string();
        let data = field.bytes().await.map_err(multipart_error)?;
        upload = Some((filename, data));
        break;
    }

    let (filename, data) = upload
        .ok_or_else(|| MediaError::Validation(format!("missing '{}' part", FILE_FIELD)))?;

    let stored = ctx.blob_store.upload(data.to_vec(), &filename).await?;

    Ok((
        StatusCode::OK,
        Json(BlobResponse::new(stored.id, stored.filename, ctx.public_url())),
    ))
}

/// List all stored files
async fn list_files(State(ctx): State<AppContext>) -> MediaResult<Json<Vec<BlobResponse>>> {
    let entries = ctx.blob_store.list().await?;

    Ok(Json(
        entries
            .into_iter()
            .map(|entry| BlobResponse::new(entry.id, entry.filename, ctx.public_url()))
            .collect(),
    ))
}

/// Download a file by id
///
/// Body is opaque binary; the original filename travels in
/// `Content-Disposition`.
async fn get_file(
    State(ctx): State<AppContext>,
    Path(id): Path<String>,
) -> MediaResult<Response> {
    let content = ctx
        .blob_store
        .get(&id)
        .await?
        .ok_or_else(|| MediaError::NotFound(format!("File not found: {}", id)))?;

    tracing::debug!(id = %content.id, filename = %content.filename, size = content.size, "serving blob");

    let mut data = Vec::with_capacity(content.size as usize);
    let mut file = content.file;
    file.read_to_end(&mut data)
        .await
        .map_err(|e| MediaError::Storage(format!("Failed to read blob {}: {}", id, e)))?;

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/octet-stream")
        .header(header::CONTENT_LENGTH, data.len().to_string())
        .header(header::CONTENT_DISPOSITION, content_disposition(&content.filename))
        .body(Body::from(data))
        .map_err(|e| MediaError::Internal(format!("Failed to build response: {}", e)))
}

/// Delete a file by id
async fn delete_file(
    State(ctx): State<AppContext>,
    Path(id): Path<String>,
) -> MediaResult<StatusCode> {
    if ctx.blob_store.delete(&id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(MediaError::NotFound(format!("File not found: {}", id)))
    }
}

fn multipart_error(e: MultipartError) -> MediaError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        MediaError::PayloadTooLarge(e.body_text())
    } else {
        MediaError::Validation(format!("Malformed multipart body: {}", e.body_text()))
    }
}

/// `inline` disposition with an ASCII fallback name and an RFC 5987 UTF-8 name
fn content_disposition(filename: &str) -> String {
    let ascii: String = filename
        .chars()
        .map(|c| match c {
            '"' | '\\' => '_',
            c if c.is_ascii() && !c.is_ascii_control() => c,
            _ => '_',
        })
        .collect();

    format!(
        "inline; filename=\"{}\"; filename*=UTF-8''{}",
        ascii,
        urlencoding::encode(filename)
    )
}
