use axum::{
    Extension,
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode, header},
    response::IntoResponse,
};
use tracing::{info, warn};
use uuid::Uuid;

use hearth_db::models::{MembershipRow, NewHouse};
use hearth_db::{CreateHouseOutcome, Database, JoinOutcome};
use hearth_ledger::{
    DEFAULT_CURRENCY, generate_invite_code, is_supported_currency, is_well_formed, normalize_invite_code,
};
use hearth_types::api::{Claims, CreateHouseRequest, JoinHouseRequest, UploadResponse};
use hearth_types::models::{House, HouseMembership};

use crate::auth::AppState;
use crate::error::ApiError;
use crate::extract::{Json, Path};
use crate::{convert, images, with_db};

/// Load the caller's membership of a house.
///
/// Houses the caller does not belong to are reported as missing, so ids of
/// other households cannot be discovered.
pub(crate) async fn require_member(
    state: &AppState,
    house_id: Uuid,
    user_id: Uuid,
) -> Result<MembershipRow, ApiError> {
    let (hid, uid) = (house_id.to_string(), user_id.to_string());
    with_db(state, move |db| db.get_membership(&hid, &uid))
        .await?
        .ok_or_else(|| ApiError::not_found("House not found"))
}

pub async fn list_houses(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<Vec<HouseMembership>>, ApiError> {
    let uid = claims.sub.to_string();
    let rows = with_db(&state, move |db| db.list_houses_for_user(&uid)).await?;

    let houses = rows
        .into_iter()
        .map(|row| convert::house_membership(row, &state.storage))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Json(houses))
}

pub async fn create_house(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreateHouseRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let name = req.name.trim().to_string();
    let address = req.address.trim().to_string();
    if name.is_empty() || address.is_empty() {
        return Err(ApiError::validation("House name and address are required"));
    }
    let currency = match req.currency.as_deref().map(str::trim) {
        None | Some("") => DEFAULT_CURRENCY.to_string(),
        Some(c) => {
            let c = c.to_ascii_uppercase();
            if !is_supported_currency(&c) {
                return Err(ApiError::validation(format!("Unsupported currency '{}'", c)));
            }
            c
        }
    };

    let house = NewHouse {
        id: Uuid::new_v4().to_string(),
        name,
        address,
        currency,
        created_by: claims.sub.to_string(),
        membership_id: Uuid::new_v4().to_string(),
    };
    let attempts = state.invite_attempts;
    let row = with_db(&state, move |db| {
        create_with_fresh_code(db, &house, attempts, generate_invite_code)
    })
    .await?
    .ok_or_else(|| ApiError::Conflict("Could not allocate an invite code, please try again".into()))?;

    let house = convert::house(row, &state.storage)?;
    Ok((StatusCode::CREATED, Json(house)))
}

/// Insert the house, drawing a new invite code whenever the last one was taken.
/// Returns `None` once `attempts` codes have all collided.
fn create_with_fresh_code(
    db: &Database,
    house: &NewHouse,
    attempts: u32,
    mut next_code: impl FnMut() -> String,
) -> anyhow::Result<Option<hearth_db::models::HouseRow>> {
    for attempt in 1..=attempts.max(1) {
        let code = next_code();
        match db.create_house(house, &code)? {
            CreateHouseOutcome::Created(row) => return Ok(Some(row)),
            CreateHouseOutcome::InviteCodeTaken => {
                warn!("Invite code collision on attempt {} for house {}", attempt, house.id);
            }
        }
    }
    Ok(None)
}

pub async fn join_house(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<JoinHouseRequest>,
) -> Result<Json<House>, ApiError> {
    let invalid = || ApiError::not_found("Invalid invite code");
    let code = normalize_invite_code(&req.invite_code);
    if !is_well_formed(&code) {
        return Err(invalid());
    }

    let (mid, uid) = (Uuid::new_v4().to_string(), claims.sub.to_string());
    let outcome = with_db(&state, move |db| db.join_house_by_code(&mid, &code, &uid)).await?;

    match outcome {
        JoinOutcome::Joined(row) => Ok(Json(convert::house(row, &state.storage)?)),
        JoinOutcome::AlreadyMember(_) => {
            Err(ApiError::Conflict("You are already a member of this house".into()))
        }
        JoinOutcome::NotFound => Err(invalid()),
    }
}

pub async fn get_house(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(house_id): Path<Uuid>,
) -> Result<Json<House>, ApiError> {
    require_member(&state, house_id, claims.sub).await?;

    let hid = house_id.to_string();
    let row = with_db(&state, move |db| db.get_house(&hid))
        .await?
        .ok_or_else(|| ApiError::not_found("House not found"))?;
    Ok(Json(convert::house(row, &state.storage)?))
}

/// Replace the house picture. Admins only.
pub async fn upload_house_avatar(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(house_id): Path<Uuid>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<UploadResponse>, ApiError> {
    let membership = require_member(&state, house_id, claims.sub).await?;
    if !membership.is_admin {
        return Err(ApiError::forbidden("Only house admins can change the house picture"));
    }

    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    let data = images::prepare_avatar(content_type, body).await?;

    let key = format!("avatars/houses/{}/{}.jpg", house_id, Uuid::new_v4().simple());
    state.storage.put(&key, &data).await?;

    let (hid, k) = (house_id.to_string(), key.clone());
    let previous = match with_db(&state, move |db| db.set_house_avatar(&hid, &k)).await {
        Ok(previous) => previous,
        Err(e) => {
            state.storage.delete_all(std::slice::from_ref(&key)).await;
            return Err(e);
        }
    };
    if let Some(previous) = previous {
        state.storage.delete_all(&[previous]).await;
    }

    info!("House {} avatar updated by {}", house_id, claims.sub);
    Ok(Json(UploadResponse {
        url: state.storage.public_url(&key),
        size: data.len() as u64,
    }))
}
