//! Background cache sweeping
//!
//! Periodically removes expired and corrupt records from the durable tier,
//! reporting each pass over a tokio channel.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::debug;

use crate::cache::{CacheManager, SweepStats};

/// Default time between sweeps
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// Configuration for the background sweep
#[derive(Debug, Clone)]
pub struct SweepConfig {
    pub interval: Duration,
    pub enabled: bool,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_SWEEP_INTERVAL,
            enabled: true,
        }
    }
}

/// Handle for the background sweep task
pub struct SweepHandle {
    /// Stats from each completed pass
    pub receiver: mpsc::Receiver<SweepStats>,
    shutdown_tx: mpsc::Sender<()>,
}

impl SweepHandle {
    /// Spawns the sweep loop; the first pass runs one interval after spawning
    ///
    /// A disabled config spawns nothing and the receiver never yields.
    pub fn spawn(cache: Arc<CacheManager>, config: SweepConfig) -> Self {
        let (stats_tx, stats_rx) = mpsc::channel(16);
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);

        if config.enabled {
            tokio::spawn(async move {
                let mut interval = tokio::time::interval(config.interval);
                interval.tick().await;

                loop {
                    tokio::select! {
                        _ = interval.tick() => {
                            let stats = cache.clean_expired();
                            debug!(removed = stats.removed(), "Background sweep finished");
                            // Nobody listening is fine; keep sweeping
                            let _ = stats_tx.try_send(stats);
                        }
                        _ = shutdown_rx.recv() => break,
                    }
                }
            });
        }

        Self {
            receiver: stats_rx,
            shutdown_tx,
        }
    }

    /// Stops the sweep loop
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(()).await;
    }

    /// Stats from a finished pass, without waiting
    pub fn try_recv(&mut self) -> Option<SweepStats> {
        self.receiver.try_recv().ok()
    }
}
