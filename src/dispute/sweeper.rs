//! Background job for dispute auto-resolution

use std::sync::Arc;
use std::time::Duration;

use super::service::DisputeService;

/// Run the auto-resolve sweep every `interval`, forever
pub async fn run(dispute_service: Arc<DisputeService>, interval: Duration) {
    tracing::info!(interval_secs = interval.as_secs(), "Starting dispute sweeper");

    loop {
        tokio::time::sleep(interval).await;

        match dispute_service.auto_resolve_now().await {
            Ok(0) => {}
            Ok(resolved) => {
                tracing::info!(resolved, "Disputes auto-resolved");
            }
            Err(e) => {
                tracing::error!("Error running auto-resolve sweep: {}", e);
            }
        }
    }
}
