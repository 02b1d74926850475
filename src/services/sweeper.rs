//! Periodic purge of expired nonces and replay entries.

use std::{sync::Arc, time::Duration};

use tokio::task::JoinHandle;
use tracing::{debug, error};

use crate::services::{nonce::NonceStore, replay::ReplayStore};

/// Run one purge pass over both stores.
///
/// Returns `(nonces_removed, jtis_removed)`; a failing nonce store counts as zero.
pub async fn sweep_once(nonces: &dyn NonceStore, replay: &dyn ReplayStore) -> (usize, usize) {
    let purged_nonces = nonces.purge_expired().await.unwrap_or_else(|e| {
        error!(error = %e, "nonce store purge failed");
        0
    });
    let purged_jtis = replay.purge_expired().await;

    if purged_nonces > 0 || purged_jtis > 0 {
        debug!(purged_nonces, purged_jtis, "swept expired entries");
    }

    (purged_nonces, purged_jtis)
}

/// Spawn the background sweeper. The task runs until the runtime shuts down.
pub fn spawn(
    nonces: Arc<dyn NonceStore>,
    replay: Arc<dyn ReplayStore>,
    every: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        // The first tick fires immediately; nothing can be expired yet.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            sweep_once(nonces.as_ref(), replay.as_ref()).await;
        }
    })
}
