//! Still-frame capture pipeline.
//!
//! Draws the source's current frame into an offscreen raster surface sized to
//! the source's current rendered dimensions, JPEG-compresses it and packages
//! the result as a base64 payload ready for the wire.

use std::io::Cursor;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use image::codecs::jpeg::JpegEncoder;
use image::{ImageBuffer, Rgb, RgbImage};
use thiserror::Error;

use crate::camera::{VideoFrame, VideoSource};

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("video source has no current frame")]
    NoFrame,
    #[error("video source reports an empty surface ({0}x{1})")]
    EmptySurface(u32, u32),
    #[error("JPEG encode failed: {0}")]
    Encode(#[from] image::ImageError),
}

/// A single compressed snapshot plus its MIME type, ready for transmission.
///
/// Immutable once produced; it is moved into the codec for one-shot
/// serialization and not retained after send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FramePayload {
    pub content_type: String,
    /// Base64-encoded image bytes.
    pub content: String,
}

impl FramePayload {
    pub fn from_bytes(content_type: &str, bytes: &[u8]) -> Self {
        Self {
            content_type: content_type.to_string(),
            content: BASE64.encode(bytes),
        }
    }

    /// Decode the payload back to raw image bytes.
    pub fn decode_bytes(&self) -> Result<Vec<u8>, base64::DecodeError> {
        BASE64.decode(&self.content)
    }

    /// Render as a `data:` URI.
    pub fn to_data_uri(&self) -> String {
        format!("data:{};base64,{}", self.content_type, self.content)
    }

    /// Split a `data:` URI into its MIME-type and base64 components.
    pub fn from_data_uri(uri: &str) -> Option<Self> {
        let rest = uri.strip_prefix("data:")?;
        let (header, content) = rest.split_once(',')?;
        let content_type = header.strip_suffix(";base64")?;
        Some(Self {
            content_type: content_type.to_string(),
            content: content.to_string(),
        })
    }
}

/// Captures still frames from a live source.
///
/// The offscreen surface is cached across calls as an allocation reuse; it is
/// resized on every capture so its dimensions always match the source's
/// current rendered size.
pub struct FrameCapturer {
    surface: Option<RgbImage>,
    quality: u8,
}

impl FrameCapturer {
    pub fn new(quality: u8) -> Self {
        Self {
            surface: None,
            quality,
        }
    }

    /// Capture one frame as a JPEG payload.
    ///
    /// Fails with `NoFrame` when the source is not yet playing and
    /// `EmptySurface` when its rendered size is zero; callers skip the cycle.
    pub fn capture(&mut self, source: &mut dyn VideoSource) -> Result<FramePayload, CaptureError> {
        let (width, height) = source.display_size();
        if width == 0 || height == 0 {
            return Err(CaptureError::EmptySurface(width, height));
        }
        let frame = source.current_frame().ok_or(CaptureError::NoFrame)?;
        if frame.width == 0 || frame.height == 0 {
            return Err(CaptureError::NoFrame);
        }

        let quality = self.quality;
        let surface = self.surface_for(width, height);
        draw_scaled(&frame, surface);

        let jpeg = jpeg_encode(surface, quality)?;
        Ok(FramePayload::from_bytes("image/jpeg", &jpeg))
    }

    /// Reuse the cached surface when the dimensions still match, otherwise
    /// reallocate at the new size.
    fn surface_for(&mut self, width: u32, height: u32) -> &mut RgbImage {
        let stale = self
            .surface
            .as_ref()
            .map(|s| s.dimensions() != (width, height))
            .unwrap_or(true);
        if stale {
            self.surface = Some(ImageBuffer::new(width, height));
        }
        self.surface.as_mut().expect("surface just allocated")
    }
}

/// Draw the frame into the surface at origin, scaled to the surface size
/// (nearest neighbor).
fn draw_scaled(frame: &VideoFrame, surface: &mut RgbImage) {
    let (dst_w, dst_h) = surface.dimensions();
    let src_w = frame.width as usize;
    let src_h = frame.height as usize;

    for y in 0..dst_h {
        let src_y = (y as usize * src_h) / dst_h as usize;
        for x in 0..dst_w {
            let src_x = (x as usize * src_w) / dst_w as usize;
            let offset = (src_y * src_w + src_x) * 3;
            let pixel = if offset + 2 < frame.data.len() {
                Rgb([
                    frame.data[offset],
                    frame.data[offset + 1],
                    frame.data[offset + 2],
                ])
            } else {
                Rgb([0, 0, 0])
            };
            surface.put_pixel(x, y, pixel);
        }
    }
}

fn jpeg_encode(img: &RgbImage, quality: u8) -> Result<Vec<u8>, image::ImageError> {
    let mut buf = Cursor::new(Vec::new());
    let encoder = JpegEncoder::new_with_quality(&mut buf, quality);
    img.write_with_encoder(encoder)?;
    Ok(buf.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::FakeSource;

    fn jpeg_dimensions(payload: &FramePayload) -> (u32, u32) {
        let bytes = payload.decode_bytes().unwrap();
        let img = image::load_from_memory(&bytes).unwrap();
        (img.width(), img.height())
    }

    #[test]
    fn test_capture_surface_matches_display_size() {
        let mut source = FakeSource::new((64, 48), (8, 6));
        let mut capturer = FrameCapturer::new(80);

        let payload = capturer.capture(&mut source).unwrap();
        assert_eq!(payload.content_type, "image/jpeg");
        assert_eq!(jpeg_dimensions(&payload), (64, 48));
    }

    #[test]
    fn test_capture_tracks_resized_source() {
        let mut source = FakeSource::new((64, 48), (8, 6));
        let mut capturer = FrameCapturer::new(80);

        let first = capturer.capture(&mut source).unwrap();
        assert_eq!(jpeg_dimensions(&first), (64, 48));

        // The rendered size changes between captures; the cached surface
        // must not be reused at its stale dimensions.
        source.display = (32, 24);
        let second = capturer.capture(&mut source).unwrap();
        assert_eq!(jpeg_dimensions(&second), (32, 24));
    }

    #[test]
    fn test_capture_without_frame_fails() {
        let mut source = FakeSource::new((64, 48), (8, 6));
        source.frame = None;
        let mut capturer = FrameCapturer::new(80);

        assert!(matches!(
            capturer.capture(&mut source),
            Err(CaptureError::NoFrame)
        ));
    }

    #[test]
    fn test_capture_empty_surface_fails() {
        let mut source = FakeSource::new((0, 48), (8, 6));
        let mut capturer = FrameCapturer::new(80);

        assert!(matches!(
            capturer.capture(&mut source),
            Err(CaptureError::EmptySurface(0, 48))
        ));
    }

    #[test]
    fn test_payload_base64_round_trip() {
        let bytes = [0u8, 1, 2, 250, 251, 252];
        let payload = FramePayload::from_bytes("image/jpeg", &bytes);
        assert_eq!(payload.decode_bytes().unwrap(), bytes);
    }

    #[test]
    fn test_data_uri_split_and_render() {
        let payload = FramePayload::from_bytes("image/jpeg", b"abc");
        let uri = payload.to_data_uri();
        assert!(uri.starts_with("data:image/jpeg;base64,"));
        assert_eq!(FramePayload::from_data_uri(&uri).unwrap(), payload);
        assert!(FramePayload::from_data_uri("nonsense").is_none());
    }
}
