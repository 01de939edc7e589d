use std::time::Duration;

use crate::camera::FacingMode;

/// Capture period observed in production.
pub const DEFAULT_CAPTURE_PERIOD: Duration = Duration::from_millis(3000);
/// Speech synthesis locale tag.
pub const DEFAULT_SPEECH_LOCALE: &str = "en-US";
/// JPEG quality (1-100). Higher is sharper and more bandwidth.
pub const DEFAULT_JPEG_QUALITY: u8 = 80;
/// Cap on the rendered capture width.
pub const DEFAULT_MAX_WIDTH: u32 = 1280;

/// Settings for one watch session.
#[derive(Debug, Clone)]
pub struct WatchConfig {
    /// URL of the hosting page; its scheme selects `ws` vs `wss`.
    pub page: String,
    pub capture_period: Duration,
    pub facing: FacingMode,
    pub jpeg_quality: u8,
    pub speech_locale: String,
    pub max_width: u32,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            page: "http://localhost:8080".to_string(),
            capture_period: DEFAULT_CAPTURE_PERIOD,
            facing: FacingMode::Environment,
            jpeg_quality: DEFAULT_JPEG_QUALITY,
            speech_locale: DEFAULT_SPEECH_LOCALE.to_string(),
            max_width: DEFAULT_MAX_WIDTH,
        }
    }
}
