pub mod auth;
pub mod convert;
pub mod error;
pub mod expenses;
pub mod extract;
pub mod houses;
pub mod images;
pub mod members;
pub mod middleware;
pub mod notes;
pub mod profile;
pub mod storage;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    middleware::from_fn_with_state,
    routing::{delete, get, patch, post, put},
};
use tower_http::services::ServeDir;
use tracing::error;

use hearth_db::Database;

pub use auth::{AppState, AppStateInner};
pub use error::ApiError;
pub use storage::Storage;

/// Room for a note carrying the maximum number of images, base64-encoded.
const MAX_BODY_BYTES: usize = 72 * 1024 * 1024;

/// Run blocking DB work off the async runtime.
pub(crate) async fn with_db<F, T>(state: &AppState, f: F) -> Result<T, ApiError>
where
    F: FnOnce(&Database) -> anyhow::Result<T> + Send + 'static,
    T: Send + 'static,
{
    let state = state.clone();
    tokio::task::spawn_blocking(move || f(&state.db))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            ApiError::Internal(anyhow::anyhow!("blocking task failed: {}", e))
        })?
        .map_err(ApiError::from)
}

async fn health() -> &'static str {
    "ok"
}

/// All HTTP routes. Everything except auth, health and `/storage` needs a bearer token.
pub fn router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .route("/health", get(health));

    let protected_routes = Router::new()
        .route("/profile", get(profile::get_profile).patch(profile::update_profile))
        .route("/profile/avatar", put(profile::upload_avatar))
        .route("/houses", get(houses::list_houses).post(houses::create_house))
        .route("/houses/join", post(houses::join_house))
        .route("/houses/{house_id}", get(houses::get_house))
        .route("/houses/{house_id}/avatar", put(houses::upload_house_avatar))
        .route("/houses/{house_id}/members", get(members::list_members))
        .route("/houses/{house_id}/presence", get(members::get_presence))
        .route("/houses/{house_id}/presence/toggle", post(members::toggle_presence))
        .route(
            "/houses/{house_id}/expenses",
            get(expenses::list_expenses).post(expenses::create_expense),
        )
        .route("/payments/{payment_id}", patch(expenses::update_payment))
        .route(
            "/houses/{house_id}/notes",
            get(notes::list_notes).post(notes::create_note),
        )
        .route("/houses/{house_id}/notes/{note_id}", delete(notes::delete_note))
        .layer(from_fn_with_state(state.clone(), middleware::require_auth));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .nest_service("/storage", ServeDir::new(state.storage.dir()))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .with_state(state)
}
