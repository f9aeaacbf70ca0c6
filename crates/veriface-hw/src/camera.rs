//! V4L2 camera capture via the `v4l` crate, exposed as a [`FrameSource`].

use crate::convert;
use async_trait::async_trait;
use std::path::Path;
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;
use thiserror::Error;
use v4l::buffer::Type as BufType;
use v4l::io::traits::CaptureStream;
use v4l::prelude::*;
use v4l::video::Capture;
use v4l::FourCC;
use veriface_core::{Frame, FrameSource, FrameSourceError};

const REQUESTED_WIDTH: u32 = 640;
const REQUESTED_HEIGHT: u32 = 360;
const STREAM_BUFFERS: u32 = 4;
/// Longest wait for one dequeue.
const CAPTURE_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Error, Debug)]
pub enum CameraError {
    #[error("device not found: {0}")]
    DeviceNotFound(String),
    #[error("capture failed: {0}")]
    CaptureFailed(String),
    #[error("device busy")]
    DeviceBusy,
    #[error("format negotiation failed: {0}")]
    FormatNegotiationFailed(String),
    #[error("streaming not supported")]
    StreamingNotSupported,
}

/// Info about a discovered V4L2 device.
#[derive(Debug, Clone)]
pub struct DeviceInfo {
    pub path: String,
    pub name: String,
    pub driver: String,
    pub bus: String,
}

/// Negotiated pixel format for the camera.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    /// YUYV 4:2:2 packed (2 bytes/pixel, extract Y channel).
    Yuyv,
    /// 8-bit grayscale.
    Grey,
    /// 16-bit little-endian grayscale.
    Y16,
}

/// Open V4L2 camera device with one streaming session.
///
/// One capture stream lives as long as the camera; dropping it stops
/// streaming and closes the device.
pub struct Camera {
    stream: MmapStream<'static>,
    pub width: u32,
    pub height: u32,
    pub device_path: String,
    pub fourcc: FourCC,
    pixel_format: PixelFormat,
}

impl Camera {
    /// Open a V4L2 camera device by path (e.g., "/dev/video0").
    pub fn open(device_path: &str) -> Result<Self, CameraError> {
        if !Path::new(device_path).exists() {
            return Err(CameraError::DeviceNotFound(device_path.to_string()));
        }

        let device = Device::with_path(device_path).map_err(|e| {
            if e.to_string().contains("busy") || e.to_string().contains("EBUSY") {
                CameraError::DeviceBusy
            } else {
                CameraError::DeviceNotFound(format!("{device_path}: {e}"))
            }
        })?;

        let caps = device.query_caps().map_err(|e| {
            CameraError::CaptureFailed(format!("failed to query capabilities: {e}"))
        })?;

        tracing::info!(
            device = device_path,
            driver = %caps.driver,
            card = %caps.card,
            "opened camera"
        );

        if !caps.capabilities.contains(v4l::capability::Flags::VIDEO_CAPTURE) {
            return Err(CameraError::StreamingNotSupported);
        }

        // Ask for YUYV; accept GREY or Y16 if that is what the driver settles on.
        let mut fmt = device.format().map_err(|e| {
            CameraError::FormatNegotiationFailed(format!("failed to get format: {e}"))
        })?;
        fmt.fourcc = FourCC::new(b"YUYV");
        fmt.width = REQUESTED_WIDTH;
        fmt.height = REQUESTED_HEIGHT;

        let negotiated = device.set_format(&fmt).map_err(|e| {
            CameraError::FormatNegotiationFailed(format!("failed to set format: {e}"))
        })?;

        let fourcc = negotiated.fourcc;
        let pixel_format = if fourcc == FourCC::new(b"GREY") {
            PixelFormat::Grey
        } else if fourcc == FourCC::new(b"YUYV") {
            PixelFormat::Yuyv
        } else if fourcc == FourCC::new(b"Y16 ") || fourcc == FourCC::new(b"Y16\0") {
            PixelFormat::Y16
        } else {
            return Err(CameraError::FormatNegotiationFailed(format!(
                "unsupported pixel format: {fourcc:?} (need YUYV, GREY, or Y16)"
            )));
        };

        tracing::info!(
            width = negotiated.width,
            height = negotiated.height,
            fourcc = ?fourcc,
            "negotiated format"
        );

        let mut stream = MmapStream::with_buffers(&device, BufType::VideoCapture, STREAM_BUFFERS)
            .map_err(|e| CameraError::CaptureFailed(format!("failed to create mmap stream: {e}")))?;
        stream.set_timeout(CAPTURE_TIMEOUT);

        Ok(Self {
            stream,
            width: negotiated.width,
            height: negotiated.height,
            device_path: device_path.to_string(),
            fourcc,
            pixel_format,
        })
    }

    /// Dequeue the next frame as 8-bit grayscale pixels.
    ///
    /// Fails with `CaptureFailed` if no frame arrives within the capture
    /// timeout.
    pub fn capture_gray(&mut self) -> Result<Vec<u8>, CameraError> {
        let (buf, _meta) = self
            .stream
            .next()
            .map_err(|e| CameraError::CaptureFailed(format!("failed to dequeue buffer: {e}")))?;

        let converted = match self.pixel_format {
            PixelFormat::Grey => convert::grey_to_grayscale(buf, self.width, self.height),
            PixelFormat::Y16 => convert::y16_to_grayscale(buf, self.width, self.height),
            PixelFormat::Yuyv => convert::yuyv_to_grayscale(buf, self.width, self.height),
        };
        converted.map_err(|e| {
            CameraError::CaptureFailed(format!("{:?} conversion failed: {e}", self.pixel_format))
        })
    }

    /// List available V4L2 video capture devices.
    pub fn list_devices() -> Vec<DeviceInfo> {
        let mut devices = Vec::new();

        for i in 0..16 {
            let path = format!("/dev/video{i}");
            if !Path::new(&path).exists() {
                continue;
            }
            let Ok(dev) = Device::with_path(&path) else {
                continue;
            };
            let Ok(caps) = dev.query_caps() else {
                continue;
            };
            if !caps.capabilities.contains(v4l::capability::Flags::VIDEO_CAPTURE) {
                continue;
            }
            devices.push(DeviceInfo {
                path,
                name: caps.card.clone(),
                driver: caps.driver.clone(),
                bus: caps.bus.clone(),
            });
        }

        devices
    }
}

/// Device held by a [`CameraSource`].
///
/// Captures run on the blocking pool with a clone of the handle. After
/// `release`, the device stays open until an in-flight capture returns,
/// which `CAPTURE_TIMEOUT` bounds, and `is_held` keeps reporting it until then.
struct DeviceSlot<T> {
    held: Option<Arc<Mutex<T>>>,
    released: Weak<Mutex<T>>,
}

impl<T> DeviceSlot<T> {
    fn empty() -> Self {
        Self { held: None, released: Weak::new() }
    }

    fn fill(&mut self, device: T) {
        self.held = Some(Arc::new(Mutex::new(device)));
    }

    fn handle(&self) -> Option<Arc<Mutex<T>>> {
        self.held.clone()
    }

    /// Drop our handle. Returns false if nothing was held.
    fn release(&mut self) -> bool {
        match self.held.take() {
            Some(device) => {
                self.released = Arc::downgrade(&device);
                true
            }
            None => false,
        }
    }

    fn is_held(&self) -> bool {
        self.held.is_some() || self.released.strong_count() > 0
    }
}

/// Live camera as a frame source.
///
/// The device is opened and streaming starts on `start`; it is closed on
/// `stop`, so it is held only for the duration of one session.
pub struct CameraSource {
    device_path: String,
    warmup_frames: usize,
    camera: DeviceSlot<Camera>,
    next_sequence: u64,
}

impl CameraSource {
    pub fn new(device_path: impl Into<String>) -> Self {
        Self {
            device_path: device_path.into(),
            warmup_frames: 4,
            camera: DeviceSlot::empty(),
            next_sequence: 0,
        }
    }

    /// Frames discarded after opening while exposure settles.
    pub fn with_warmup_frames(mut self, count: usize) -> Self {
        self.warmup_frames = count;
        self
    }

    pub fn device_path(&self) -> &str {
        &self.device_path
    }
}

#[async_trait]
impl FrameSource for CameraSource {
    async fn start(&mut self) -> Result<(), FrameSourceError> {
        if self.camera.handle().is_some() {
            return Ok(());
        }

        let path = self.device_path.clone();
        let warmup = self.warmup_frames;
        let camera = tokio::task::spawn_blocking(move || {
            let mut camera = Camera::open(&path)?;
            if warmup > 0 {
                tracing::debug!(count = warmup, "discarding warmup frames");
                for _ in 0..warmup {
                    let _ = camera.capture_gray();
                }
            }
            Ok::<_, CameraError>(camera)
        })
        .await
        .map_err(|e| FrameSourceError::Unavailable(format!("camera open task failed: {e}")))?
        .map_err(|e| FrameSourceError::Unavailable(e.to_string()))?;

        tracing::info!(
            device = %self.device_path,
            width = camera.width,
            height = camera.height,
            "camera acquired"
        );
        self.camera.fill(camera);
        Ok(())
    }

    async fn next_frame(&mut self) -> Result<Frame, FrameSourceError> {
        let camera = self.camera.handle().ok_or(FrameSourceError::NotStarted)?;

        let (width, height, data) = tokio::task::spawn_blocking(move || {
            let mut camera = camera
                .lock()
                .map_err(|_| CameraError::CaptureFailed("camera lock poisoned".into()))?;
            let data = camera.capture_gray()?;
            Ok::<_, CameraError>((camera.width, camera.height, data))
        })
        .await
        .map_err(|e| FrameSourceError::Capture(format!("capture task failed: {e}")))?
        .map_err(|e| FrameSourceError::Capture(e.to_string()))?;

        let frame = Frame::new(data, width, height, self.next_sequence);
        self.next_sequence += 1;
        Ok(frame)
    }

    fn stop(&mut self) {
        if self.camera.release() {
            tracing::info!(device = %self.device_path, "camera released");
        }
    }

    fn is_active(&self) -> bool {
        self.camera.is_held()
    }
}

impl Drop for CameraSource {
    fn drop(&mut self) {
        self.stop();
    }
}
