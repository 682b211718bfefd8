use crate::session::SessionRegistry;
use std::sync::Arc;
use std::time::Duration;

/// Spawn a background task that periodically drops expired sessions.
///
/// Expiry is already enforced on every lookup; this only keeps the registry
/// from growing without bound over a long evening.
pub fn spawn_session_sweeper(
    sessions: Arc<SessionRegistry>,
    interval: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // The first tick completes immediately
        ticker.tick().await;

        loop {
            ticker.tick().await;
            let removed = sessions.sweep_expired().await;
            if removed > 0 {
                tracing::debug!(removed, "Swept expired sessions");
            }
        }
    })
}
