//! veriface-hw — Frame sources backed by real inputs.
//!
//! Provides a V4L2 camera source for live liveness sessions and a
//! still-image source for selfie/document photos.

pub mod camera;
pub mod convert;
pub mod still;

pub use camera::{Camera, CameraError, CameraSource, PixelFormat};
pub use still::{load_frame, StillImageError, StillImageSource};
