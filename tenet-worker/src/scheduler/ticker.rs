//! Periodic tasks
//!
//! Each tick runs in its own task and is awaited before the next one, so a
//! sweep that errors or panics is logged and the next tick still runs.

use std::future::Future;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};

/// Runs `task` every `period` until the returned handle is aborted
pub fn spawn_periodic<F, Fut>(name: &'static str, period: Duration, task: F) -> JoinHandle<()>
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    tokio::spawn(async move {
        tracing::info!("Starting periodic task '{}' (interval: {:?})", name, period);

        let mut interval = time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            interval.tick().await;

            match tokio::spawn(task()).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::error!("Periodic task '{}' failed: {:#}", name, e),
                Err(e) => tracing::error!("Periodic task '{}' panicked: {}", name, e),
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_failures_do_not_stop_ticking() {
        let runs = Arc::new(AtomicUsize::new(0));
        let counter = runs.clone();

        let handle = spawn_periodic("flaky", Duration::from_millis(10), move || {
            let counter = counter.clone();
            async move {
                let n = counter.fetch_add(1, Ordering::SeqCst);
                match n % 3 {
                    0 => anyhow::bail!("sweep {} failed", n),
                    1 => panic!("sweep {} panicked", n),
                    _ => Ok(()),
                }
            }
        });

        tokio::time::sleep(Duration::from_millis(200)).await;
        handle.abort();

        assert!(runs.load(Ordering::SeqCst) >= 4);
    }
}
