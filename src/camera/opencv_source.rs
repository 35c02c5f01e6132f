//! OpenCV `videoio` capture backend

use opencv::core::{Mat, CV_8UC1, CV_8UC3, CV_8UC4};
use opencv::prelude::*;
use opencv::{imgproc, videoio};

use super::{BgrFrame, CameraError, CaptureDevice, VideoSource};

fn backend_err(e: opencv::Error) -> CameraError {
    CameraError::Backend(e.to_string())
}

#[derive(Debug, Default, Clone, Copy)]
pub struct OpenCvSource;

impl VideoSource for OpenCvSource {
    fn open(&self, index: i32) -> Result<Box<dyn CaptureDevice>, CameraError> {
        let capture = videoio::VideoCapture::new(index, videoio::CAP_ANY).map_err(backend_err)?;
        if !capture.is_opened().map_err(backend_err)? {
            return Err(CameraError::Open(index));
        }
        tracing::debug!("Camera {} opened", index);
        Ok(Box::new(OpenCvDevice { capture, index }))
    }
}

struct OpenCvDevice {
    capture: videoio::VideoCapture,
    index: i32,
}

impl CaptureDevice for OpenCvDevice {
    fn read_frame(&mut self) -> Result<Option<BgrFrame>, CameraError> {
        let mut frame = Mat::default();
        if !self.capture.read(&mut frame).map_err(backend_err)? || frame.rows() <= 0 || frame.cols() <= 0 {
            return Ok(None);
        }
        to_bgr_frame(frame).map(Some)
    }

    fn release(&mut self) {
        match self.capture.release() {
            Ok(()) => tracing::debug!("Camera {} released", self.index),
            Err(e) => tracing::warn!("Failed to release camera {}: {}", self.index, e),
        }
    }
}

/// Normalize any 8-bit frame to packed BGR
fn to_bgr_frame(frame: Mat) -> Result<BgrFrame, CameraError> {
    let code = match frame.typ() {
        t if t == CV_8UC3 => None,
        t if t == CV_8UC4 => Some(imgproc::COLOR_BGRA2BGR),
        t if t == CV_8UC1 => Some(imgproc::COLOR_GRAY2BGR),
        t => return Err(CameraError::Frame(format!("unsupported pixel type {}", t))),
    };

    let bgr = match code {
        Some(code) => {
            let mut converted = Mat::default();
            imgproc::cvt_color(&frame, &mut converted, code, 0).map_err(backend_err)?;
            converted
        }
        None if frame.is_continuous() => frame,
        None => frame.try_clone().map_err(backend_err)?,
    };

    let data = bgr.data_bytes().map_err(backend_err)?.to_vec();
    Ok(BgrFrame {
        width: bgr.cols() as u32,
        height: bgr.rows() as u32,
        data,
    })
}
