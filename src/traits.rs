//! Core traits and types for the camera abstraction.

use std::time::Duration;

use crate::error::{CaptureError, HardwareError};

/// Pixel format representation (e.g., YUYV, MJPG, RGB3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FourCC(pub [u8; 4]);

impl FourCC {
    /// Create a new `FourCC` from a 4-byte array.
    #[must_use]
    pub const fn new(code: &[u8; 4]) -> Self {
        Self(*code)
    }

    /// YUYV pixel format (4:2:2 packed).
    pub const YUYV: Self = Self::new(b"YUYV");
}

impl From<v4l::FourCC> for FourCC {
    fn from(fourcc: v4l::FourCC) -> Self {
        Self(fourcc.repr)
    }
}

impl From<FourCC> for v4l::FourCC {
    fn from(fourcc: FourCC) -> Self {
        Self::new(&fourcc.0)
    }
}

/// Frame dimensions in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolution {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl Resolution {
    /// Create a new resolution.
    #[must_use]
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

/// Video format negotiated with the driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Format {
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// Pixel format.
    pub fourcc: FourCC,
    /// Bytes per line (stride).
    pub stride: u32,
    /// Total frame size in bytes.
    pub size: u32,
}

impl Format {
    /// Create a new YUYV-sized format specification.
    #[must_use]
    pub const fn new(width: u32, height: u32, fourcc: FourCC) -> Self {
        let stride = width * 2; // YUYV is 2 bytes per pixel
        let size = stride * height;
        Self {
            width,
            height,
            fourcc,
            stride,
            size,
        }
    }

    /// Frame dimensions of this format.
    #[must_use]
    pub const fn resolution(&self) -> Resolution {
        Resolution::new(self.width, self.height)
    }
}

/// Device identification reported by the driver.
#[derive(Debug, Clone, Default)]
pub struct DeviceCapabilities {
    /// Driver name.
    pub driver: String,
    /// Card/device name.
    pub card: String,
    /// Bus information.
    pub bus_info: String,
    /// Whether the device can capture video.
    pub can_capture: bool,
    /// Whether the device supports streaming.
    pub can_stream: bool,
}

/// Red and blue white-balance gains, 1.0 meaning unity.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WhiteBalanceGains {
    /// Red channel gain.
    pub red: f32,
    /// Blue channel gain.
    pub blue: f32,
}

/// Metadata for a captured frame.
#[derive(Debug, Clone)]
pub struct FrameMetadata {
    /// Frame sequence number.
    pub sequence: u32,
    /// Capture timestamp.
    pub timestamp: Duration,
}

/// A decoded frame: `height * width * 3` bytes in BGR order.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// Packed BGR pixel data, row-major.
    pub data: Vec<u8>,
    /// Frame metadata.
    pub metadata: FrameMetadata,
}

impl Frame {
    /// Decode a packed YUYV buffer into a BGR frame.
    ///
    /// Rows start every `format.stride` bytes; bytes past `width * 2` in a row
    /// are driver padding and skipped. Each `[Y0 U Y1 V]` quadruple yields two
    /// pixels sharing U and V.
    pub fn from_yuyv(
        raw: &[u8],
        format: &Format,
        metadata: FrameMetadata,
    ) -> std::result::Result<Self, CaptureError> {
        let width = format.width as usize;
        let height = format.height as usize;
        let row_bytes = width * 2;
        let stride = (format.stride as usize).max(row_bytes);
        let expected = height.checked_sub(1).map_or(0, |rows| rows * stride + row_bytes);
        if raw.len() < expected {
            return Err(CaptureError::ShortFrame {
                expected,
                actual: raw.len(),
            });
        }

        let mut data = Vec::with_capacity(width * height * 3);
        for row in 0..height {
            let start = row * stride;
            let line = raw.get(start..start + row_bytes).ok_or(CaptureError::ShortFrame {
                expected,
                actual: raw.len(),
            })?;
            for quad in line.chunks_exact(4) {
                if let [y0, u, y1, v] = *quad {
                    let (r, g, b) = yuv_to_rgb(y0, u, v);
                    data.extend_from_slice(&[b, g, r]);
                    let (r, g, b) = yuv_to_rgb(y1, u, v);
                    data.extend_from_slice(&[b, g, r]);
                }
            }
        }

        Ok(Self {
            width: format.width,
            height: format.height,
            data,
            metadata,
        })
    }

    /// Get `(b, g, r)` values for the pixel at the specified coordinates.
    ///
    /// Returns `None` if the coordinates are outside the frame.
    #[must_use]
    pub fn pixel_at(&self, x: u32, y: u32) -> Option<(u8, u8, u8)> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let offset = ((y as usize) * (self.width as usize) + x as usize) * 3;
        let px = self.data.get(offset..offset + 3)?;
        match *px {
            [b, g, r] => Some((b, g, r)),
            _ => None,
        }
    }
}

/// Convert YUV values to RGB.
///
/// Uses the ITU-R BT.601 conversion formula; results are clamped to 0-255.
#[must_use]
#[allow(clippy::many_single_char_names)]
pub(crate) fn yuv_to_rgb(y: u8, u: u8, v: u8) -> (u8, u8, u8) {
    let y_f = f32::from(y);
    let u_f = f32::from(u) - 128.0;
    let v_f = f32::from(v) - 128.0;

    let r = 1.402f32.mul_add(v_f, y_f);
    let g = 0.714_14f32.mul_add(-v_f, 0.344_14f32.mul_add(-u_f, y_f));
    let b = 1.772f32.mul_add(u_f, y_f);

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let clamp = |val: f32| -> u8 { val.clamp(0.0, 255.0) as u8 };

    (clamp(r), clamp(g), clamp(b))
}

/// Result type for hardware operations.
pub type Result<T> = std::result::Result<T, HardwareError>;

/// A camera driver able to hand out one exclusive handle at a time.
///
/// The handle mutably borrows the driver, so a second `open` cannot compile
/// while a handle is alive.
pub trait CameraDriver {
    /// The handle type returned by `open`.
    type Handle<'a>: DeviceHandle
    where
        Self: 'a;

    /// Acquire the device at the given resolution and frame rate.
    fn open(&mut self, resolution: Resolution, frame_rate: u32) -> Result<Self::Handle<'_>>;
}

/// An open device. Dropping it releases the hardware.
pub trait DeviceHandle {
    /// The stream type returned by `create_stream`.
    type Stream<'a>: CaptureStream
    where
        Self: 'a;

    /// Get device capabilities.
    fn capabilities(&self) -> &DeviceCapabilities;

    /// Format negotiated when the handle was opened.
    fn format(&self) -> &Format;

    /// Set sensor ISO sensitivity.
    fn set_iso(&mut self, iso: u32) -> Result<()>;

    /// Enable or disable automatic exposure.
    fn set_auto_exposure(&mut self, enabled: bool) -> Result<()>;

    /// Enable or disable automatic white balance.
    fn set_auto_white_balance(&mut self, enabled: bool) -> Result<()>;

    /// Current exposure time in microseconds.
    fn shutter_speed(&self) -> Result<u32>;

    /// Fix the exposure time in microseconds.
    fn set_shutter_speed(&mut self, micros: u32) -> Result<()>;

    /// Current white-balance gains.
    fn white_balance_gains(&self) -> Result<WhiteBalanceGains>;

    /// Fix the white-balance gains.
    fn set_white_balance_gains(&mut self, gains: WhiteBalanceGains) -> Result<()>;

    /// Create a capture stream with the specified number of buffers.
    fn create_stream(
        &mut self,
        buffer_count: u32,
    ) -> std::result::Result<Self::Stream<'_>, CaptureError>;
}

/// Abstraction over capture stream operations.
pub trait CaptureStream {
    /// Capture the next frame from the stream.
    fn next_frame(&mut self) -> std::result::Result<Frame, CaptureError>;
}
