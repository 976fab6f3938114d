//! Long-lived periodic background tasks

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time;
use tracing::debug;

/// Handle to a periodic task started with [`BackgroundTask::spawn_periodic`]
pub struct BackgroundTask {
    name: &'static str,
    running: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

impl BackgroundTask {
    /// Run `tick` every `period` until shut down.
    ///
    /// The first run happens immediately. Missed ticks are skipped rather
    /// than bunched up when a run overruns the period.
    pub fn spawn_periodic<F, Fut>(name: &'static str, period: Duration, mut tick: F) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let running = Arc::new(AtomicBool::new(true));
        let flag = Arc::clone(&running);

        let handle = tokio::spawn(async move {
            let mut interval = time::interval(period);
            interval.set_missed_tick_behavior(time::MissedTickBehavior::Skip);

            while flag.load(Ordering::Relaxed) {
                interval.tick().await;
                tick().await;
            }

            debug!(task = name, "Background task stopped");
        });

        BackgroundTask {
            name,
            running,
            handle,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed) && !self.handle.is_finished()
    }

    /// Stop the task and wait for it to exit
    pub async fn shutdown(self) {
        self.running.store(false, Ordering::Relaxed);
        self.handle.abort();
        let _ = self.handle.await;
        debug!(task = self.name, "Background task shut down");
    }
}
