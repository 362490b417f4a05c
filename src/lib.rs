//! Pi-Timelapse: camera session and timelapse controller for Raspberry Pi
//!
//! The device sits behind the [`CameraDriver`] trait, so sessions run the same
//! against V4L2 hardware and against the mock driver used in tests. A
//! [`SessionController`] runs the video preview, still preview, timelapse and
//! output modes, holding at most one open handle at any time.

pub mod camera;
pub mod capture;
pub mod clock;
pub mod device;
pub mod error;
pub mod params;
pub mod preview;
pub mod session;
pub mod store;
pub mod traits;

#[cfg(test)]
pub mod mock;

pub use camera::Camera;
pub use clock::{Clock, SystemClock};
pub use device::V4L2Driver;
pub use error::{
    CaptureError, ConfigurationError, DisplayError, HardwareError, SessionError, StorageError,
};
pub use params::{CameraParameters, CapturePurpose, ParameterStore};
pub use preview::{HeadlessSurface, PreviewSurface};
pub use session::{SessionController, SessionOptions, SessionState, TimelapseSession};
pub use store::{ImageStore, PngStore};
pub use traits::{
    CameraDriver, CaptureStream, DeviceCapabilities, DeviceHandle, Format, FourCC, Frame,
    FrameMetadata, Resolution, WhiteBalanceGains,
};
