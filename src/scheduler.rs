// src/scheduler.rs
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use log::debug;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;

/// Callback invoked on every refresh tick.
pub type RefreshCallback =
    Arc<dyn Fn() -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

/// Drives refresh attempts: once immediately at start, then once per
/// period.
///
/// The callback is awaited inside the tick loop, so at most one refresh
/// is in flight at a time; ticks that fire while a refresh is still
/// running are skipped, not queued.
pub struct RefreshScheduler {
    stopped: Arc<AtomicBool>,
    shutdown_tx: mpsc::Sender<()>,
}

impl RefreshScheduler {
    /// Spawns the background tick task. Requires a tokio runtime.
    pub fn start(period: Duration, on_refresh: RefreshCallback) -> Self {
        let stopped = Arc::new(AtomicBool::new(false));
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);
        let task_stopped = Arc::clone(&stopped);

        tokio::spawn(async move {
            // The first tick of a tokio interval completes immediately,
            // which gives the refresh-at-start behavior.
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => break,
                    _ = ticker.tick() => {
                        if task_stopped.load(Ordering::SeqCst) {
                            break;
                        }
                        on_refresh().await;
                    }
                }
            }
            debug!("refresh scheduler stopped");
        });

        Self {
            stopped,
            shutdown_tx,
        }
    }

    /// Halts future ticks. Does not abort an in-flight refresh and does
    /// not wait for it. Idempotent.
    pub fn stop(&self) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        let _ = self.shutdown_tx.try_send(());
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }
}

impl Drop for RefreshScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;
    use tokio::time::sleep;

    fn counting_callback(count: Arc<AtomicU32>) -> RefreshCallback {
        Arc::new(move || {
            let count = Arc::clone(&count);
            Box::pin(async move {
                count.fetch_add(1, Ordering::SeqCst);
            })
        })
    }

    #[tokio::test]
    async fn fires_immediately_at_start() {
        let count = Arc::new(AtomicU32::new(0));
        let scheduler =
            RefreshScheduler::start(Duration::from_secs(60), counting_callback(Arc::clone(&count)));

        sleep(Duration::from_millis(50)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);

        scheduler.stop();
    }

    #[tokio::test]
    async fn ticks_on_the_period() {
        let count = Arc::new(AtomicU32::new(0));
        let scheduler =
            RefreshScheduler::start(Duration::from_millis(20), counting_callback(Arc::clone(&count)));

        sleep(Duration::from_millis(110)).await;
        scheduler.stop();

        // Immediate tick plus several periodic ones.
        assert!(count.load(Ordering::SeqCst) >= 3);
    }

    #[tokio::test]
    async fn stop_halts_future_ticks() {
        let count = Arc::new(AtomicU32::new(0));
        let scheduler =
            RefreshScheduler::start(Duration::from_millis(20), counting_callback(Arc::clone(&count)));

        sleep(Duration::from_millis(50)).await;
        scheduler.stop();
        assert!(scheduler.is_stopped());

        let after_stop = count.load(Ordering::SeqCst);
        sleep(Duration::from_millis(100)).await;
        assert_eq!(count.load(Ordering::SeqCst), after_stop);
    }

    #[tokio::test]
    async fn stop_is_idempotent() {
        let scheduler = RefreshScheduler::start(
            Duration::from_millis(20),
            counting_callback(Arc::new(AtomicU32::new(0))),
        );
        scheduler.stop();
        scheduler.stop();
        assert!(scheduler.is_stopped());
    }

    #[tokio::test]
    async fn at_most_one_refresh_in_flight() {
        let in_flight = Arc::new(AtomicU32::new(0));
        let overlapped = Arc::new(AtomicBool::new(false));

        let cb_in_flight = Arc::clone(&in_flight);
        let cb_overlapped = Arc::clone(&overlapped);
        let callback: RefreshCallback = Arc::new(move || {
            let in_flight = Arc::clone(&cb_in_flight);
            let overlapped = Arc::clone(&cb_overlapped);
            Box::pin(async move {
                if in_flight.fetch_add(1, Ordering::SeqCst) > 0 {
                    overlapped.store(true, Ordering::SeqCst);
                }
                // Runs well past the next scheduled tick.
                sleep(Duration::from_millis(50)).await;
                in_flight.fetch_sub(1, Ordering::SeqCst);
            })
        });

        let scheduler = RefreshScheduler::start(Duration::from_millis(10), callback);
        sleep(Duration::from_millis(200)).await;
        scheduler.stop();

        assert!(!overlapped.load(Ordering::SeqCst));
    }
}
