use axum::{
    Extension,
    body::Bytes,
    extract::State,
    http::{HeaderMap, header},
};
use tracing::info;
use uuid::Uuid;

use hearth_types::api::{Claims, UpdateProfileRequest, UploadResponse};
use hearth_types::models::Profile;

use crate::auth::{AppState, validate_username};
use crate::error::ApiError;
use crate::extract::Json;
use crate::{convert, images, with_db};

pub async fn get_profile(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<Profile>, ApiError> {
    let uid = claims.sub.to_string();
    let row = with_db(&state, move |db| db.get_profile(&uid))
        .await?
        .ok_or_else(|| ApiError::not_found("Profile not found"))?;
    Ok(Json(convert::profile(row, &state.storage)?))
}

pub async fn update_profile(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<UpdateProfileRequest>,
) -> Result<Json<Profile>, ApiError> {
    let username = validate_username(&req.username)?;

    let uid = claims.sub.to_string();
    let row = with_db(&state, move |db| {
        if !db.update_username(&uid, &username)? {
            return Ok(None);
        }
        db.get_profile(&uid)
    })
    .await?
    .ok_or_else(|| ApiError::not_found("Profile not found"))?;

    Ok(Json(convert::profile(row, &state.storage)?))
}

/// Replace the caller's avatar with the raw image in the request body,
/// stored as a JPEG no larger than 400x400.
pub async fn upload_avatar(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<UploadResponse>, ApiError> {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    let data = images::prepare_avatar(content_type, body).await?;

    let key = format!("avatars/users/{}/{}.jpg", claims.sub, Uuid::new_v4().simple());
    state.storage.put(&key, &data).await?;

    let (uid, k) = (claims.sub.to_string(), key.clone());
    let previous = match with_db(&state, move |db| db.set_profile_avatar(&uid, &k)).await {
        Ok(previous) => previous,
        Err(e) => {
            state.storage.delete_all(std::slice::from_ref(&key)).await;
            return Err(e);
        }
    };
    if let Some(previous) = previous {
        state.storage.delete_all(&[previous]).await;
    }

    info!("Avatar updated for {}", claims.sub);
    Ok(Json(UploadResponse {
        url: state.storage.public_url(&key),
        size: data.len() as u64,
    }))
}
