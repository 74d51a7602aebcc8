use axum::{Extension, extract::State};
use tracing::debug;
use uuid::Uuid;

use hearth_types::api::Claims;
use hearth_types::models::{Member, Presence};

use crate::auth::AppState;
use crate::error::ApiError;
use crate::extract::{Json, Path};
use crate::houses::require_member;
use crate::{convert, with_db};

/// Members in join order, each with their current presence.
pub async fn list_members(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(house_id): Path<Uuid>,
) -> Result<Json<Vec<Member>>, ApiError> {
    require_member(&state, house_id, claims.sub).await?;

    let hid = house_id.to_string();
    let rows = with_db(&state, move |db| db.list_members(&hid)).await?;
    let members = rows
        .into_iter()
        .map(|row| convert::member(row, &state.storage))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Json(members))
}

pub async fn get_presence(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(house_id): Path<Uuid>,
) -> Result<Json<Presence>, ApiError> {
    require_member(&state, house_id, claims.sub).await?;

    let (uid, hid) = (claims.sub.to_string(), house_id.to_string());
    let row = with_db(&state, move |db| db.get_presence(&uid, &hid)).await?;
    Ok(Json(convert::presence(house_id, claims.sub, row)?))
}

pub async fn toggle_presence(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(house_id): Path<Uuid>,
) -> Result<Json<Presence>, ApiError> {
    require_member(&state, house_id, claims.sub).await?;

    let id = Uuid::new_v4().to_string();
    let (uid, hid) = (claims.sub.to_string(), house_id.to_string());
    let row = with_db(&state, move |db| {
        db.toggle_presence(&id, &uid, &hid, &hearth_db::now())
    })
    .await?;

    debug!("User {} is_home={} in house {}", claims.sub, row.is_home, house_id);
    Ok(Json(convert::presence(house_id, claims.sub, Some(row))?))
}
