use std::time::{Duration, SystemTime};

use tracing::{debug, info, warn};

use hearth_api::AppState;

/// Background task that prunes orphaned storage objects.
///
/// Runs on an interval, lists every stored object, and deletes the ones that
/// no note image, profile or house points at once they are older than `grace`.
/// The grace period keeps uploads that are still waiting for their rows.
pub async fn run_cleanup_loop(state: AppState, every: Duration, grace: Duration) {
    let mut interval = tokio::time::interval(every);

    loop {
        interval.tick().await;

        match sweep_orphans(&state, grace).await {
            Ok(count) => {
                if count > 0 {
                    info!("Cleanup: removed {} orphaned objects", count);
                }
            }
            Err(e) => {
                warn!("Cleanup error: {}", e);
            }
        }
    }
}

async fn sweep_orphans(state: &AppState, grace: Duration) -> anyhow::Result<usize> {
    // List first so anything referenced after this point is also seen below.
    let objects = state.storage.list().await?;

    let db_state = state.clone();
    let referenced =
        tokio::task::spawn_blocking(move || db_state.db.referenced_storage_keys()).await??;

    let now = SystemTime::now();
    let mut removed = 0;
    for object in objects {
        if referenced.contains(&object.key) {
            continue;
        }
        let age = now.duration_since(object.modified).unwrap_or_default();
        if age < grace {
            debug!("Cleanup: {} is unreferenced but only {:?} old", object.key, age);
            continue;
        }
        if let Err(e) = state.storage.delete(&object.key).await {
            warn!("Cleanup: could not remove {}: {}", object.key, e);
            continue;
        }
        removed += 1;
    }

    Ok(removed)
}
