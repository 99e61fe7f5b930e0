use std::path::Path;

use axum::{
    Json,
    extract::{Multipart, State, multipart::Field},
    http::StatusCode,
};
use tokio::io::AsyncWriteExt;
use tracing::{error, info, warn};
use uuid::Uuid;

use lounge_types::api::UploadedFile;
use lounge_types::files::{classify_file_type, extension};

use crate::AppState;

/// Multipart field carrying the file.
const FILE_FIELD: &str = "file";

/// POST /upload: accepts `multipart/form-data` with a `file` field, saves it
/// under a fresh name in the upload directory and describes where it landed.
pub async fn upload_file(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<UploadedFile>, StatusCode> {
    while let Some(field) = multipart.next_field().await.map_err(|e| {
        warn!("Bad multipart body: {}", e);
        e.status()
    })? {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }

        let original = field.file_name().unwrap_or("upload").to_string();
        let stored = stored_name(&original);

        tokio::fs::create_dir_all(&state.upload_dir)
            .await
            .map_err(|e| {
                error!("Failed to create upload directory {}: {}", state.upload_dir.display(), e);
                StatusCode::INTERNAL_SERVER_ERROR
            })?;

        let path = state.upload_dir.join(&stored);
        let file_size = match save_field(field, &path).await {
            Ok(size) => size,
            Err(status) => {
                let _ = tokio::fs::remove_file(&path).await;
                return Err(status);
            }
        };

        info!("Stored upload {} as {} ({} bytes)", original, stored, file_size);

        return Ok(Json(UploadedFile {
            file_type: classify_file_type(&original).as_str().to_string(),
            file_url: public_file_url(&state.public_url, &stored),
            file_name: original,
            file_size,
        }));
    }

    Err(StatusCode::BAD_REQUEST)
}

/// Stream one multipart field to disk. Returns the number of bytes written.
async fn save_field(mut field: Field<'_>, path: &Path) -> Result<u64, StatusCode> {
    let mut file = tokio::fs::File::create(path).await.map_err(|e| {
        error!("Failed to create file {}: {}", path.display(), e);
        StatusCode::INTERNAL_SERVER_ERROR
    })?;

    let mut written: u64 = 0;
    while let Some(chunk) = field.chunk().await.map_err(|e| {
        warn!("Upload to {} aborted: {}", path.display(), e);
        e.status()
    })? {
        file.write_all(&chunk).await.map_err(|e| {
            error!("Failed to write file {}: {}", path.display(), e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?;
        written += chunk.len() as u64;
    }

    file.flush().await.map_err(|e| {
        error!("Failed to flush file {}: {}", path.display(), e);
        StatusCode::INTERNAL_SERVER_ERROR
    })?;

    Ok(written)
}

/// `<uuid v4><ext>`, keeping the original extension only when it is a plain
/// alphanumeric suffix.
fn stored_name(original: &str) -> String {
    let ext = extension(original);
    let keep = ext.len() > 1 && ext[1..].chars().all(|c| c.is_ascii_alphanumeric());
    if keep {
        format!("{}{}", Uuid::new_v4(), ext)
    } else {
        Uuid::new_v4().to_string()
    }
}

fn public_file_url(public_url: &str, stored: &str) -> String {
    format!("{}/uploads/{}", public_url.trim_end_matches('/'), stored)
}
