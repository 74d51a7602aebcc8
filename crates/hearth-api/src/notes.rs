use std::collections::HashMap;

use axum::{
    Extension,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as B64;
use tracing::{error, info};
use uuid::Uuid;

use hearth_db::models::{NewNote, NewNoteImage, NoteImageRow};
use hearth_types::api::{Claims, CreateNoteRequest};
use hearth_types::models::Note;

use crate::auth::AppState;
use crate::error::ApiError;
use crate::extract::{Json, Path};
use crate::houses::require_member;
use crate::images::{self, MAX_IMAGES_PER_NOTE};
use crate::storage::Storage;
use crate::{convert, with_db};

/// Notes of a house, newest first, with their images in upload order.
pub async fn list_notes(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(house_id): Path<Uuid>,
) -> Result<Json<Vec<Note>>, ApiError> {
    require_member(&state, house_id, claims.sub).await?;

    let hid = house_id.to_string();
    let (rows, images) = with_db(&state, move |db| {
        let rows = db.list_notes(&hid)?;
        let ids: Vec<String> = rows.iter().map(|r| r.id.clone()).collect();
        let images = db.get_images_for_notes(&ids)?;
        Ok((rows, images))
    })
    .await?;

    let mut by_note: HashMap<String, Vec<NoteImageRow>> = HashMap::new();
    for img in images {
        by_note.entry(img.note_id.clone()).or_default().push(img);
    }

    let notes = rows
        .into_iter()
        .map(|row| {
            let images = by_note.remove(&row.id).unwrap_or_default();
            convert::note(row, images, &state.storage)
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Json(notes))
}

/// Decoded, checked upload waiting to be written.
struct PendingImage {
    row: NewNoteImage,
    data: Vec<u8>,
}

/// Create a note with its images.
///
/// Image files are stored one after another before the note rows are written
/// in a single transaction. If any step fails, every file already stored for
/// this note is deleted again.
pub async fn create_note(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(house_id): Path<Uuid>,
    Json(req): Json<CreateNoteRequest>,
) -> Result<impl IntoResponse, ApiError> {
    require_member(&state, house_id, claims.sub).await?;

    let title = req.title.trim().to_string();
    if title.is_empty() {
        return Err(ApiError::validation("Title is required"));
    }
    if req.images.len() > MAX_IMAGES_PER_NOTE {
        return Err(ApiError::validation(format!(
            "A note can have at most {} images",
            MAX_IMAGES_PER_NOTE
        )));
    }

    let note_id = Uuid::new_v4();

    // Validate everything before touching storage.
    let mut pending = Vec::with_capacity(req.images.len());
    for upload in &req.images {
        let data = B64
            .decode(upload.data.trim())
            .map_err(|_| ApiError::validation("Image data is not valid base64"))?;
        let ext = images::check_image(&upload.content_type, &data)?;
        let image_id = Uuid::new_v4();
        pending.push(PendingImage {
            row: NewNoteImage {
                id: image_id.to_string(),
                storage_key: format!("notes/{}/{}.{}", note_id, image_id, ext),
                content_type: upload.content_type.clone(),
                size: data.len() as i64,
                sha256: images::sha256_hex(&data),
            },
            data,
        });
    }

    let stored = store_images(&state.storage, note_id, &pending).await?;

    let note = NewNote {
        id: note_id.to_string(),
        house_id: house_id.to_string(),
        created_by: claims.sub.to_string(),
        title,
        content: req.content,
        category: req.category.as_str().to_string(),
    };
    let rows: Vec<NewNoteImage> = pending.into_iter().map(|p| p.row).collect();
    let nid = note.id.clone();
    let written = with_db(&state, move |db| {
        db.create_note(&note, &rows)?;
        let row = db
            .get_note(&nid)?
            .ok_or_else(|| anyhow::anyhow!("note {} missing after insert", nid))?;
        let images = db.get_images_for_notes(std::slice::from_ref(&nid))?;
        Ok((row, images))
    })
    .await;

    let (row, image_rows) = match written {
        Ok(written) => written,
        Err(e) => {
            state.storage.delete_all(&stored).await;
            return Err(e);
        }
    };

    let note = convert::note(row, image_rows, &state.storage)?;
    Ok((StatusCode::CREATED, Json(note)))
}

/// Write the images one after another and return their keys.
/// On the first failed write, the images already written are removed again.
async fn store_images(
    storage: &Storage,
    note_id: Uuid,
    pending: &[PendingImage],
) -> Result<Vec<String>, ApiError> {
    let mut stored: Vec<String> = Vec::with_capacity(pending.len());
    for image in pending {
        if let Err(e) = storage.put(&image.row.storage_key, &image.data).await {
            error!("Upload of {} failed, rolling back note {}: {}", image.row.storage_key, note_id, e);
            storage.delete_all(&stored).await;
            return Err(e.into());
        }
        stored.push(image.row.storage_key.clone());
    }
    Ok(stored)
}

/// Delete a note the caller created, along with its image files.
///
/// Notes by other members look the same as missing ones.
pub async fn delete_note(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path((house_id, note_id)): Path<(Uuid, Uuid)>,
) -> Result<StatusCode, ApiError> {
    require_member(&state, house_id, claims.sub).await?;

    let (nid, hid, uid) = (note_id.to_string(), house_id.to_string(), claims.sub.to_string());
    let keys = with_db(&state, move |db| db.delete_note(&nid, &hid, &uid))
        .await?
        .ok_or_else(|| ApiError::not_found("Note not found"))?;

    state.storage.delete_all(&keys).await;
    info!("Note {} deleted by {} ({} images)", note_id, claims.sub, keys.len());
    Ok(StatusCode::NO_CONTENT)
}
