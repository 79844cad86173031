//! Automatic vibe generation on source changes.
//!
//! The reactor watches the source channel of a [`CanvasService`]. Each wake-up
//! reads the newest content, so a burst of edits between wake-ups collapses
//! into one request. Requests are spawned rather than awaited in line; a
//! result that arrives after a newer request or edit is discarded by the
//! session's token check.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::service::CanvasService;

/// Spawns the reactor. It stops when the service is dropped.
pub fn spawn_vibe_reactor(service: Arc<CanvasService>) -> JoinHandle<()> {
    let mut source_rx = service.subscribe_source();
    let service = Arc::downgrade(&service);

    tokio::spawn(async move {
        info!("Vibe reactor started");
        while source_rx.changed().await.is_ok() {
            let snapshot = source_rx.borrow_and_update().clone();
            if snapshot.content.trim().is_empty() {
                debug!(revision = snapshot.revision, "Source is blank, skipping vibe");
                continue;
            }
            let Some(service) = service.upgrade() else {
                break;
            };

            debug!(revision = snapshot.revision, "Source changed, requesting vibe");
            tokio::spawn(async move {
                // Failures are recorded in the session and broadcast.
                if let Err(e) = service.generate_vibe().await {
                    debug!(error = %e, "Vibe request ended with error");
                }
            });
        }
        info!("Vibe reactor stopped");
    })
}
