//! Session wiring.
//!
//! Brings up the connection, acquires the camera, arms the capture scheduler
//! and runs the terminal control surface until ctrl-c. Teardown flips a watch
//! channel that every task observes.

use std::sync::Arc;

use anyhow::Result;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{mpsc, watch};

use crate::camera::{CameraAcquirer, FacingMode};
use crate::capture::FrameCapturer;
use crate::config::WatchConfig;
use crate::connection::{self, ConnectionManager};
use crate::scheduler::CaptureScheduler;
use crate::sink::OutputSink;

/// Run one watch session until ctrl-c.
pub async fn run(
    config: WatchConfig,
    acquirer: Arc<dyn CameraAcquirer>,
    sink: Arc<dyn OutputSink>,
) -> Result<()> {
    let endpoint = connection::endpoint_url(&config.page)?;
    let manager = ConnectionManager::new(sink.clone());
    manager.connect(endpoint);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let (snapshot_tx, snapshot_rx) = mpsc::unbounded_channel();

    let armed = arm_capture(
        &config,
        acquirer.as_ref(),
        &sink,
        &manager,
        snapshot_rx,
        shutdown_rx.clone(),
    )
    .await;

    if armed {
        tokio::spawn(control_loop(
            snapshot_tx,
            config.facing,
            sink.clone(),
            shutdown_rx,
        ));
    }

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutting down");
    let _ = shutdown_tx.send(true);
    Ok(())
}

/// Acquire the camera and arm the capture pipeline.
///
/// The facing mode is captured by value at the moment the request is
/// constructed. Returns false on denial: a single user-visible error is
/// produced, no capture ever fires and inbound results still flow.
async fn arm_capture(
    config: &WatchConfig,
    acquirer: &dyn CameraAcquirer,
    sink: &Arc<dyn OutputSink>,
    manager: &ConnectionManager,
    snapshot_rx: mpsc::UnboundedReceiver<()>,
    shutdown: watch::Receiver<bool>,
) -> bool {
    let facing = config.facing;
    match acquirer.acquire(facing).await {
        Ok(source) => {
            let scheduler = CaptureScheduler::new(
                config.capture_period,
                FrameCapturer::new(config.jpeg_quality),
                source,
                manager.clone(),
            );
            tokio::spawn(scheduler.run(snapshot_rx, shutdown));
            true
        }
        Err(e) => {
            sink.error(&format!("Could not access the camera. Error: {e}"));
            false
        }
    }
}

/// Terminal stand-in for the page's pointer and flip affordances: an empty
/// line (or `snap`) takes a snapshot, `flip` toggles the facing mode used by
/// the next acquisition request. Flipping does not re-acquire the open
/// stream.
async fn control_loop(
    snapshot_tx: mpsc::UnboundedSender<()>,
    mut facing: FacingMode,
    sink: Arc<dyn OutputSink>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => match line {
                Ok(Some(line)) => match line.trim() {
                    "" | "snap" => {
                        let _ = snapshot_tx.send(());
                    }
                    "flip" => {
                        facing = facing.flipped();
                        sink.status(&format!("facing mode: {facing}"));
                    }
                    other => sink.status(&format!("unknown command: {other}")),
                },
                Ok(None) | Err(_) => break,
            },
            _ = shutdown.changed() => break,
        }
    }
}
