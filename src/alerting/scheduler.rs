use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, error, info, warn};

use super::evaluation_service::EvaluationService;

/// Owned handle to the periodic alert evaluation loop.
///
/// Runs never overlap: each one finishes before the next tick is awaited.
pub struct AlertScheduler {
    shutdown: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

impl AlertScheduler {
    pub fn start(service: Arc<EvaluationService>, period: Duration) -> Self {
        let (shutdown, mut stop) = oneshot::channel::<()>();

        let handle = tokio::spawn(async move {
            info!(period_seconds = period.as_secs(), "Alert evaluation scheduler started.");
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = &mut stop => break,
                    _ = ticker.tick() => {}
                }

                let svc = service.clone();
                // A separate task turns a panic inside one run into a JoinError.
                let mut run = tokio::spawn(async move { svc.run_once().await });

                tokio::select! {
                    _ = &mut stop => {
                        run.abort();
                        break;
                    }
                    outcome = &mut run => match outcome {
                        Ok(Ok(summary)) => debug!(
                            heartbeat_alerts = summary.heartbeat_alerts,
                            low_disk_alerts = summary.low_disk_alerts,
                            "Alert evaluation run finished."
                        ),
                        Ok(Err(e)) => error!(error = %e, "Alert evaluation run failed."),
                        Err(e) => error!(error = %e, "Alert evaluation run panicked."),
                    },
                }
            }
            info!("Alert evaluation scheduler stopped.");
        });

        Self { shutdown, handle }
    }

    /// Stops the loop, abandoning a run in progress, and waits for it to exit.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(());
        if let Err(e) = self.handle.await {
            warn!(error = %e, "Alert scheduler task ended abnormally.");
        }
    }
}
