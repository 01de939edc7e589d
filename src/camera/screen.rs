//! Default video source: the primary display.
//!
//! Stands in for a physical camera on desktops. Grabbing runs on a dedicated
//! thread (scrap's Capturer is not Send on X11) that keeps a latest-frame
//! slot warm; the capturer pulls from the slot on its own schedule.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use scrap::{Capturer, Display};

use super::{AcquireError, CameraAcquirer, FacingMode, VideoFrame, VideoSource};

/// How often the grab thread refreshes the latest-frame slot.
const GRAB_FPS: u32 = 10;

/// Acquires the primary display as the session's video source.
///
/// The facing-mode constraint travels with the request but a display grab has
/// only one "camera"; a real camera backend maps the constraint to a device.
pub struct ScreenAcquirer {
    max_width: u32,
}

impl ScreenAcquirer {
    pub fn new(max_width: u32) -> Self {
        Self { max_width }
    }
}

#[async_trait]
impl CameraAcquirer for ScreenAcquirer {
    async fn acquire(&self, facing: FacingMode) -> Result<Box<dyn VideoSource>, AcquireError> {
        tracing::debug!(facing = %facing, "acquiring primary display");
        let source = ScreenSource::open(self.max_width)?;
        Ok(Box::new(source))
    }
}

/// Live display source backed by the grab thread.
pub struct ScreenSource {
    running: Arc<AtomicBool>,
    latest: Arc<Mutex<Option<VideoFrame>>>,
    display_size: (u32, u32),
}

impl ScreenSource {
    /// Start grabbing the primary display. The rendered size is the native
    /// resolution capped to `max_width`, preserving aspect ratio.
    pub fn open(max_width: u32) -> Result<Self, AcquireError> {
        // Probe for a display before spawning the thread so the failure
        // surfaces at acquisition time.
        let display =
            Display::primary().map_err(|e| AcquireError::NoDevice(e.to_string()))?;
        let src_w = display.width();
        let src_h = display.height();
        drop(display); // Capturer must be created inside the thread

        let display_size = capped_size(src_w as u32, src_h as u32, max_width);
        let running = Arc::new(AtomicBool::new(true));
        let latest = Arc::new(Mutex::new(None));

        let running_thread = running.clone();
        let latest_thread = latest.clone();
        std::thread::spawn(move || {
            let display = match Display::primary() {
                Ok(d) => d,
                Err(e) => {
                    tracing::error!("display grab: no display: {e}");
                    return;
                }
            };
            let capturer = match Capturer::new(display) {
                Ok(c) => c,
                Err(e) => {
                    tracing::error!("display grab: failed to start: {e}");
                    return;
                }
            };
            grab_loop(capturer, src_w, src_h, latest_thread, running_thread);
        });

        Ok(Self {
            running,
            latest,
            display_size,
        })
    }

    fn stop(&self) {
        self.running.store(false, Ordering::Relaxed);
    }
}

impl Drop for ScreenSource {
    fn drop(&mut self) {
        self.stop();
    }
}

impl VideoSource for ScreenSource {
    fn display_size(&self) -> (u32, u32) {
        self.display_size
    }

    fn current_frame(&mut self) -> Option<VideoFrame> {
        self.latest.lock().ok()?.clone()
    }
}

fn grab_loop(
    mut capturer: Capturer,
    src_w: usize,
    src_h: usize,
    latest: Arc<Mutex<Option<VideoFrame>>>,
    running: Arc<AtomicBool>,
) {
    let frame_interval = Duration::from_millis(1000 / GRAB_FPS as u64);

    while running.load(Ordering::Relaxed) {
        match capturer.frame() {
            Ok(frame) => {
                // scrap gives BGRA pixels; the stride may include padding
                let stride = frame.len() / src_h;
                let rgb = bgra_to_rgb(&frame, src_w, src_h, stride);
                if let Ok(mut slot) = latest.lock() {
                    *slot = Some(VideoFrame {
                        width: src_w as u32,
                        height: src_h as u32,
                        data: rgb,
                    });
                }
                std::thread::sleep(frame_interval);
            }
            Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                // Frame not ready yet
                std::thread::sleep(Duration::from_millis(5));
            }
            Err(_) => {
                // Grab error, retry after a short delay
                std::thread::sleep(Duration::from_millis(50));
            }
        }
    }
}

/// Convert a BGRA buffer to tightly packed RGB.
fn bgra_to_rgb(bgra: &[u8], width: usize, height: usize, stride: usize) -> Vec<u8> {
    let mut rgb = Vec::with_capacity(width * height * 3);
    for y in 0..height {
        for x in 0..width {
            let offset = y * stride + x * 4;
            if offset + 2 < bgra.len() {
                rgb.push(bgra[offset + 2]);
                rgb.push(bgra[offset + 1]);
                rgb.push(bgra[offset]);
            } else {
                rgb.extend_from_slice(&[0, 0, 0]);
            }
        }
    }
    rgb
}

fn capped_size(width: u32, height: u32, max_width: u32) -> (u32, u32) {
    if width <= max_width || width == 0 {
        return (width, height);
    }
    let scale = max_width as f64 / width as f64;
    (max_width, (height as f64 * scale) as u32)
}
