pub mod screen;

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use thiserror::Error;

/// Which physical camera an acquisition request asks for.
///
/// The value is captured when the request is constructed and travels with it;
/// flipping the mode afterwards never affects an already-open stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FacingMode {
    /// Camera pointed at the user.
    User,
    /// Camera pointed away from the user.
    Environment,
}

impl FacingMode {
    /// The opposite mode, used by the flip control.
    pub fn flipped(self) -> Self {
        match self {
            FacingMode::User => FacingMode::Environment,
            FacingMode::Environment => FacingMode::User,
        }
    }

    /// Constraint string sent with an acquisition request.
    pub fn as_constraint(self) -> &'static str {
        match self {
            FacingMode::User => "user",
            FacingMode::Environment => "environment",
        }
    }
}

impl fmt::Display for FacingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_constraint())
    }
}

#[derive(Debug, Error)]
#[error("unknown facing mode: {0} (expected \"user\" or \"environment\")")]
pub struct ParseFacingModeError(String);

impl FromStr for FacingMode {
    type Err = ParseFacingModeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(FacingMode::User),
            "environment" => Ok(FacingMode::Environment),
            other => Err(ParseFacingModeError(other.to_string())),
        }
    }
}

/// One raw frame from a live source, tightly packed RGB24.
#[derive(Debug, Clone)]
pub struct VideoFrame {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

/// A live video source attached to the session.
///
/// Implementations publish whatever frame is most recent; the capturer pulls
/// on its own schedule and tolerates gaps.
pub trait VideoSource: Send {
    /// Current rendered size. Re-read at every capture; it may change while
    /// the stream is open.
    fn display_size(&self) -> (u32, u32);

    /// Most recent frame, or `None` while the source is not yet playing.
    fn current_frame(&mut self) -> Option<VideoFrame>;
}

#[derive(Debug, Error)]
pub enum AcquireError {
    #[error("camera permission denied: {0}")]
    PermissionDenied(String),
    #[error("no capture device available: {0}")]
    NoDevice(String),
}

/// Boundary for camera stream acquisition.
///
/// The facing-mode constraint is passed by value so an in-flight request can
/// never race a later flip of the toggle.
#[async_trait]
pub trait CameraAcquirer: Send + Sync {
    async fn acquire(&self, facing: FacingMode) -> Result<Box<dyn VideoSource>, AcquireError>;
}

/// Source with a fixed gradient frame and an adjustable rendered size.
#[cfg(test)]
pub(crate) struct FakeSource {
    pub(crate) display: (u32, u32),
    pub(crate) frame: Option<VideoFrame>,
}

#[cfg(test)]
impl FakeSource {
    pub(crate) fn new(display: (u32, u32), native: (u32, u32)) -> Self {
        let (w, h) = native;
        let mut data = Vec::with_capacity((w * h * 3) as usize);
        for y in 0..h {
            for x in 0..w {
                data.extend_from_slice(&[(x * 7 % 256) as u8, (y * 13 % 256) as u8, 128]);
            }
        }
        Self {
            display,
            frame: Some(VideoFrame {
                width: w,
                height: h,
                data,
            }),
        }
    }
}

#[cfg(test)]
impl VideoSource for FakeSource {
    fn display_size(&self) -> (u32, u32) {
        self.display
    }

    fn current_frame(&mut self) -> Option<VideoFrame> {
        self.frame.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_facing_mode_flip() {
        assert_eq!(FacingMode::User.flipped(), FacingMode::Environment);
        assert_eq!(FacingMode::Environment.flipped(), FacingMode::User);
    }

    #[test]
    fn test_facing_mode_parse() {
        assert_eq!("user".parse::<FacingMode>().unwrap(), FacingMode::User);
        assert_eq!(
            "environment".parse::<FacingMode>().unwrap(),
            FacingMode::Environment
        );
        assert!("selfie".parse::<FacingMode>().is_err());
    }

    #[test]
    fn test_facing_mode_constraint_round_trip() {
        for mode in [FacingMode::User, FacingMode::Environment] {
            assert_eq!(mode.as_constraint().parse::<FacingMode>().unwrap(), mode);
        }
    }
}
