// SPDX-License-Identifier: Apache-2.0

use std::time::Duration;

use scholaris_index::SearchBackend;
use tracing::{info, warn};

use crate::IngestError;

pub const WAIT_TIMEOUT: Duration = Duration::from_secs(60);
pub const WAIT_INTERVAL: Duration = Duration::from_secs(5);

/// Polls the backend until it answers or the timeout passes.
pub async fn wait_for_elasticsearch(
    backend: &dyn SearchBackend,
    timeout: Duration,
    interval: Duration,
) -> Result<(), IngestError> {
    let deadline = tokio::time::Instant::now() + timeout;
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        if backend.ping().await {
            info!(attempt, "elasticsearch is reachable");
            return Ok(());
        }
        if tokio::time::Instant::now() + interval > deadline {
            return Err(IngestError(format!(
                "elasticsearch unreachable after {attempt} attempts over {}s",
                timeout.as_secs()
            )));
        }
        warn!(attempt, "elasticsearch not reachable yet, retrying");
        tokio::time::sleep(interval).await;
    }
}
