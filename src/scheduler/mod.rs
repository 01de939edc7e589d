//! Capture scheduling.
//!
//! Two independent triggers invoke the same capture+send: a fixed-period tick
//! and an explicit user snapshot. Neither waits on the other and no
//! debouncing is performed; two captures may fire in close succession.

use std::time::Duration;

use tokio::sync::{mpsc, watch};

use crate::camera::VideoSource;
use crate::capture::FrameCapturer;
use crate::connection::ConnectionManager;
use crate::protocol;

/// Drives the capture-encode-transmit loop for one session.
pub struct CaptureScheduler {
    period: Duration,
    capturer: FrameCapturer,
    source: Box<dyn VideoSource>,
    manager: ConnectionManager,
}

impl CaptureScheduler {
    pub fn new(
        period: Duration,
        capturer: FrameCapturer,
        source: Box<dyn VideoSource>,
        manager: ConnectionManager,
    ) -> Self {
        Self {
            period,
            capturer,
            source,
            manager,
        }
    }

    /// Run until the shutdown signal flips. Owns the video source for the
    /// session's lifetime; the first periodic fire happens one full period
    /// after arming.
    pub async fn run(
        mut self,
        mut snapshot_rx: mpsc::UnboundedReceiver<()>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let mut ticker = tokio::time::interval(self.period);
        ticker.tick().await; // the zeroth tick fires immediately; skip it

        loop {
            tokio::select! {
                _ = ticker.tick() => self.shoot(),
                Some(()) = snapshot_rx.recv() => self.shoot(),
                _ = shutdown.changed() => break,
            }
        }
    }

    /// One capture+send. A capture failure skips the cycle; a send outside
    /// the Open state is dropped by the manager.
    fn shoot(&mut self) {
        let payload = match self.capturer.capture(self.source.as_mut()) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::debug!("capture skipped: {e}");
                return;
            }
        };
        match protocol::encode_frame(payload) {
            Ok(message) => {
                if self.manager.send(message) {
                    tracing::debug!("frame sent");
                }
            }
            Err(e) => tracing::warn!("frame encode failed: {e}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::FakeSource;
    use crate::connection::ConnectionState;
    use crate::sink::RecordingSink;
    use std::sync::Arc;

    const PERIOD: Duration = Duration::from_millis(3000);

    fn open_manager() -> (ConnectionManager, mpsc::UnboundedReceiver<String>) {
        let manager = ConnectionManager::new(Arc::new(RecordingSink::new()));
        let (_id, rx) = manager.install_for_test(ConnectionState::Open);
        (manager, rx)
    }

    fn spawn_scheduler(
        source: FakeSource,
        manager: ConnectionManager,
    ) -> (mpsc::UnboundedSender<()>, watch::Sender<bool>) {
        let (snapshot_tx, snapshot_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let scheduler = CaptureScheduler::new(
            PERIOD,
            FrameCapturer::new(80),
            Box::new(source),
            manager,
        );
        tokio::spawn(scheduler.run(snapshot_rx, shutdown_rx));
        (snapshot_tx, shutdown_tx)
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<String>) -> Vec<String> {
        let mut out = Vec::new();
        while let Ok(msg) = rx.try_recv() {
            out.push(msg);
        }
        out
    }

    #[tokio::test(start_paused = true)]
    async fn test_periodic_trigger_sends_one_frame_per_period() {
        let (manager, mut rx) = open_manager();
        let (_snapshot_tx, shutdown_tx) = spawn_scheduler(FakeSource::new((16, 12), (4, 3)), manager);

        // Three periods elapse: ticks at 3000, 6000 and 9000 ms.
        tokio::time::sleep(Duration::from_millis(9001)).await;
        let _ = shutdown_tx.send(true);
        tokio::task::yield_now().await;

        let sent = drain(&mut rx);
        assert_eq!(sent.len(), 3);
        for message in &sent {
            assert!(message.starts_with(r#"{"dataURI":{"contentType":"image/jpeg""#));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_manual_snapshot_fires_independently_of_the_timer() {
        let (manager, mut rx) = open_manager();
        let (snapshot_tx, shutdown_tx) = spawn_scheduler(FakeSource::new((16, 12), (4, 3)), manager);

        // No time passes; two user snapshots in close succession both fire.
        snapshot_tx.send(()).unwrap();
        snapshot_tx.send(()).unwrap();
        tokio::time::sleep(Duration::from_millis(1)).await;

        assert_eq!(drain(&mut rx).len(), 2);

        // The periodic trigger keeps its own phase.
        tokio::time::sleep(Duration::from_millis(3000)).await;
        let _ = shutdown_tx.send(true);
        assert_eq!(drain(&mut rx).len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_capture_failure_skips_the_cycle() {
        let (manager, mut rx) = open_manager();
        let mut source = FakeSource::new((16, 12), (4, 3));
        source.frame = None; // not yet playing
        let (_snapshot_tx, shutdown_tx) = spawn_scheduler(source, manager);

        tokio::time::sleep(Duration::from_millis(9001)).await;
        let _ = shutdown_tx.send(true);

        assert!(drain(&mut rx).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_sends_drop_silently_without_open_connection() {
        let manager = ConnectionManager::new(Arc::new(RecordingSink::new()));
        let (_id, mut rx) = manager.install_for_test(ConnectionState::Closed);
        let (_snapshot_tx, shutdown_tx) = spawn_scheduler(FakeSource::new((16, 12), (4, 3)), manager);

        tokio::time::sleep(Duration::from_millis(6001)).await;
        let _ = shutdown_tx.send(true);

        assert!(drain(&mut rx).is_empty());
    }
}
