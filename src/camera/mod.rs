//! Single-frame camera capture
//!
//! A [`VideoSource`] opens devices by index; the opened [`CaptureDevice`]
//! hands out BGR frames the way camera drivers deliver them.
//! [`capture_rgb`] reads exactly one frame and always releases the device.

#[cfg(feature = "camera")]
mod opencv_source;

use std::sync::Arc;

use image::RgbImage;

#[cfg(feature = "camera")]
pub use self::opencv_source::OpenCvSource;

#[derive(Debug, thiserror::Error)]
pub enum CameraError {
    #[error("Could not open camera at index {0}. Make sure the camera is connected and not being used by another application.")]
    Open(i32),

    #[error("Failed to capture image from camera")]
    NoFrame,

    #[error("Invalid camera frame: {0}")]
    Frame(String),

    #[error("Camera backend error: {0}")]
    Backend(String),

    #[error("Camera support is not enabled in this build (rebuild with --features camera)")]
    Unsupported,
}

/// Packed 8-bit BGR frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BgrFrame {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

impl BgrFrame {
    /// Swap channel order into an RGB image
    pub fn into_rgb(self) -> Result<RgbImage, CameraError> {
        let expected = self.width as usize * self.height as usize * 3;
        if self.width == 0 || self.height == 0 || self.data.len() != expected {
            return Err(CameraError::Frame(format!(
                "{}x{} frame with {} bytes",
                self.width,
                self.height,
                self.data.len()
            )));
        }

        let mut data = self.data;
        for pixel in data.chunks_exact_mut(3) {
            pixel.swap(0, 2);
        }

        RgbImage::from_raw(self.width, self.height, data)
            .ok_or_else(|| CameraError::Frame("buffer does not match dimensions".to_string()))
    }
}

/// An opened capture device
pub trait CaptureDevice {
    /// Grab one frame; `Ok(None)` when the device produced nothing
    fn read_frame(&mut self) -> Result<Option<BgrFrame>, CameraError>;

    fn release(&mut self);
}

/// Opens capture devices by index
pub trait VideoSource: Send + Sync {
    fn open(&self, index: i32) -> Result<Box<dyn CaptureDevice>, CameraError>;
}

/// Open `index`, read one frame, release, convert to RGB
pub fn capture_rgb(source: &dyn VideoSource, index: i32) -> Result<RgbImage, CameraError> {
    let mut device = source.open(index)?;
    let frame = device.read_frame();
    device.release();

    frame?.ok_or(CameraError::NoFrame)?.into_rgb()
}

/// Source for builds without camera support
#[derive(Debug, Default, Clone, Copy)]
pub struct UnsupportedSource;

impl VideoSource for UnsupportedSource {
    fn open(&self, _index: i32) -> Result<Box<dyn CaptureDevice>, CameraError> {
        Err(CameraError::Unsupported)
    }
}

/// The capture backend compiled into this build
pub fn default_source() -> Arc<dyn VideoSource> {
    #[cfg(feature = "camera")]
    {
        Arc::new(OpenCvSource)
    }
    #[cfg(not(feature = "camera"))]
    {
        Arc::new(UnsupportedSource)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Scripted source counting opens and releases
    #[derive(Default)]
    pub struct FakeSource {
        pub fail_open: bool,
        pub frame: Option<BgrFrame>,
        pub read_error: bool,
        pub opened: Arc<AtomicUsize>,
        pub released: Arc<AtomicUsize>,
    }

    struct FakeDevice {
        frame: Option<BgrFrame>,
        read_error: bool,
        released: Arc<AtomicUsize>,
    }

    impl CaptureDevice for FakeDevice {
        fn read_frame(&mut self) -> Result<Option<BgrFrame>, CameraError> {
            if self.read_error {
                return Err(CameraError::Backend("driver hiccup".to_string()));
            }
            Ok(self.frame.take())
        }

        fn release(&mut self) {
            self.released.fetch_add(1, Ordering::SeqCst);
        }
    }

    impl VideoSource for FakeSource {
        fn open(&self, index: i32) -> Result<Box<dyn CaptureDevice>, CameraError> {
            if self.fail_open {
                return Err(CameraError::Open(index));
            }
            self.opened.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(FakeDevice {
                frame: self.frame.clone(),
                read_error: self.read_error,
                released: self.released.clone(),
            }))
        }
    }

    pub fn frame(width: u32, height: u32, bgr: [u8; 3]) -> BgrFrame {
        let data = (0..width * height).flat_map(|_| bgr).collect();
        BgrFrame { width, height, data }
    }

    #[test]
    fn test_bgr_to_rgb() {
        let rgb = frame(2, 1, [1, 2, 3]).into_rgb().unwrap();
        assert_eq!(rgb.get_pixel(0, 0).0, [3, 2, 1]);
        assert_eq!(rgb.get_pixel(1, 0).0, [3, 2, 1]);
    }

    #[test]
    fn test_bad_frame_rejected() {
        let bad = BgrFrame { width: 2, height: 2, data: vec![0; 5] };
        assert!(matches!(bad.into_rgb(), Err(CameraError::Frame(_))));
    }

    #[test]
    fn test_capture_releases_on_success() {
        let source = FakeSource { frame: Some(frame(4, 4, [0, 0, 255])), ..Default::default() };
        let image = capture_rgb(&source, 0).unwrap();
        assert_eq!(image.get_pixel(0, 0).0, [255, 0, 0]);
        assert_eq!(source.opened.load(Ordering::SeqCst), 1);
        assert_eq!(source.released.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_capture_releases_when_no_frame() {
        let source = FakeSource::default();
        assert!(matches!(capture_rgb(&source, 0), Err(CameraError::NoFrame)));
        assert_eq!(source.released.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_capture_releases_on_read_error() {
        let source = FakeSource { read_error: true, ..Default::default() };
        assert!(matches!(capture_rgb(&source, 0), Err(CameraError::Backend(_))));
        assert_eq!(source.released.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_open_failure() {
        let source = FakeSource { fail_open: true, ..Default::default() };
        let err = capture_rgb(&source, 3).unwrap_err();
        assert!(err.to_string().contains("index 3"));
        assert_eq!(source.released.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_unsupported_source() {
        assert!(matches!(capture_rgb(&UnsupportedSource, 0), Err(CameraError::Unsupported)));
    }
}
