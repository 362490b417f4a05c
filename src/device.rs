//! V4L2 device implementation using the v4l crate.

use std::io;
use std::marker::PhantomData;
use std::path::Path;
use std::time::Duration;

use log::{debug, info};
use v4l::buffer::Type;
use v4l::control::{Control, Value};
use v4l::io::mmap::Stream;
use v4l::io::traits::CaptureStream as V4lCaptureStream;
use v4l::video::capture::Parameters;
use v4l::video::Capture;
use v4l::Device;

use crate::error::{CaptureError, HardwareError};
use crate::traits::{
    CameraDriver, CaptureStream, DeviceCapabilities, DeviceHandle, Format, FourCC, Frame,
    FrameMetadata, Resolution, Result, WhiteBalanceGains,
};

const V4L2_CID_AUTO_WHITE_BALANCE: u32 = 0x0098_090c;
const V4L2_CID_RED_BALANCE: u32 = 0x0098_090e;
const V4L2_CID_BLUE_BALANCE: u32 = 0x0098_090f;
const V4L2_CID_EXPOSURE_AUTO: u32 = 0x009a_0901;
const V4L2_CID_EXPOSURE_ABSOLUTE: u32 = 0x009a_0902;
const V4L2_CID_ISO_SENSITIVITY: u32 = 0x009a_0917;
const V4L2_CID_ISO_SENSITIVITY_AUTO: u32 = 0x009a_0918;

const V4L2_EXPOSURE_AUTO: i64 = 0;
const V4L2_EXPOSURE_MANUAL: i64 = 1;
const V4L2_ISO_SENSITIVITY_MANUAL: i64 = 0;

/// `V4L2_CID_EXPOSURE_ABSOLUTE` is expressed in 100 µs units.
const EXPOSURE_UNIT_MICROS: i64 = 100;

/// Balance controls are fixed point with 1000 meaning unity gain.
const BALANCE_UNITY: f32 = 1000.0;

/// Per-frame read timeout.
const FRAME_TIMEOUT: Duration = Duration::from_secs(5);

const EBUSY: i32 = 16;

/// Opens `/dev/video<index>` on demand.
pub struct V4L2Driver {
    index: u32,
}

impl V4L2Driver {
    /// Driver for the video node with the given index (e.g., 0 for /dev/video0).
    #[must_use]
    pub const fn new(index: u32) -> Self {
        Self { index }
    }

    /// Index of the video node.
    #[must_use]
    pub const fn index(&self) -> u32 {
        self.index
    }

    fn open_error(&self, err: &io::Error) -> HardwareError {
        if err.raw_os_error() == Some(EBUSY) {
            HardwareError::DeviceBusy(self.index)
        } else {
            HardwareError::DeviceOpenFailed(err.to_string())
        }
    }
}

impl CameraDriver for V4L2Driver {
    type Handle<'a> = V4L2Handle<'a>;

    fn open(&mut self, resolution: Resolution, frame_rate: u32) -> Result<V4L2Handle<'_>> {
        let node = format!("/dev/video{}", self.index);
        if !Path::new(&node).exists() {
            return Err(HardwareError::DeviceNotFound(self.index));
        }

        let device = Device::new(self.index as usize).map_err(|err| self.open_error(&err))?;

        let caps = device
            .query_caps()
            .map_err(|err| HardwareError::DeviceOpenFailed(err.to_string()))?;

        let capabilities = DeviceCapabilities {
            driver: caps.driver,
            card: caps.card,
            bus_info: caps.bus,
            can_capture: caps.capabilities.contains(v4l::capability::Flags::VIDEO_CAPTURE),
            can_stream: caps.capabilities.contains(v4l::capability::Flags::STREAMING),
        };
        if !capabilities.can_capture || !capabilities.can_stream {
            return Err(HardwareError::DeviceOpenFailed(format!(
                "{} cannot stream video",
                capabilities.card
            )));
        }

        let mut fmt = device.format().map_err(|err| self.open_error(&err))?;
        fmt.width = resolution.width;
        fmt.height = resolution.height;
        fmt.fourcc = FourCC::YUYV.into();
        let fmt = device.set_format(&fmt).map_err(|err| self.open_error(&err))?;

        let format = Format {
            width: fmt.width,
            height: fmt.height,
            fourcc: FourCC::from(fmt.fourcc),
            stride: fmt.stride,
            size: fmt.size,
        };
        if format.fourcc != FourCC::YUYV {
            return Err(HardwareError::FormatNotSupported(format));
        }

        if let Err(err) = device.set_params(&Parameters::with_fps(frame_rate)) {
            debug!("Driver rejected {frame_rate} fps: {err}");
        }

        info!(
            "Opened {} ({}) at {}x{}",
            capabilities.card, capabilities.driver, format.width, format.height
        );

        Ok(V4L2Handle {
            device,
            capabilities,
            format,
            _driver: PhantomData,
        })
    }
}

/// An open V4L2 device. The file descriptor is closed on drop.
pub struct V4L2Handle<'a> {
    device: Device,
    capabilities: DeviceCapabilities,
    format: Format,
    _driver: PhantomData<&'a mut V4L2Driver>,
}

impl V4L2Handle<'_> {
    fn read_control(&self, id: u32, name: &'static str) -> Result<i64> {
        let control = self.device.control(id).map_err(|err| HardwareError::Control {
            name,
            reason: err.to_string(),
        })?;
        match control.value {
            Value::Integer(value) => Ok(value),
            Value::Boolean(value) => Ok(i64::from(value)),
            _ => Err(HardwareError::Control {
                name,
                reason: "unexpected control type".to_owned(),
            }),
        }
    }

    fn write_control(&self, id: u32, name: &'static str, value: Value) -> Result<()> {
        self.device
            .set_control(Control { id, value })
            .map_err(|err| HardwareError::Control {
                name,
                reason: err.to_string(),
            })
    }
}

impl DeviceHandle for V4L2Handle<'_> {
    type Stream<'s> = V4L2Stream<'s> where Self: 's;

    fn capabilities(&self) -> &DeviceCapabilities {
        &self.capabilities
    }

    fn format(&self) -> &Format {
        &self.format
    }

    fn set_iso(&mut self, iso: u32) -> Result<()> {
        self.write_control(
            V4L2_CID_ISO_SENSITIVITY_AUTO,
            "iso_sensitivity_auto",
            Value::Integer(V4L2_ISO_SENSITIVITY_MANUAL),
        )?;
        self.write_control(
            V4L2_CID_ISO_SENSITIVITY,
            "iso_sensitivity",
            Value::Integer(i64::from(iso)),
        )
    }

    fn set_auto_exposure(&mut self, enabled: bool) -> Result<()> {
        let mode = if enabled {
            V4L2_EXPOSURE_AUTO
        } else {
            V4L2_EXPOSURE_MANUAL
        };
        self.write_control(V4L2_CID_EXPOSURE_AUTO, "exposure_auto", Value::Integer(mode))
    }

    fn set_auto_white_balance(&mut self, enabled: bool) -> Result<()> {
        self.write_control(
            V4L2_CID_AUTO_WHITE_BALANCE,
            "white_balance_auto",
            Value::Boolean(enabled),
        )
    }

    fn shutter_speed(&self) -> Result<u32> {
        let units = self.read_control(V4L2_CID_EXPOSURE_ABSOLUTE, "exposure_absolute")?;
        u32::try_from(units * EXPOSURE_UNIT_MICROS).map_err(|err| HardwareError::Control {
            name: "exposure_absolute",
            reason: err.to_string(),
        })
    }

    fn set_shutter_speed(&mut self, micros: u32) -> Result<()> {
        let units = (i64::from(micros) / EXPOSURE_UNIT_MICROS).max(1);
        self.write_control(
            V4L2_CID_EXPOSURE_ABSOLUTE,
            "exposure_absolute",
            Value::Integer(units),
        )
    }

    fn white_balance_gains(&self) -> Result<WhiteBalanceGains> {
        let red = self.read_control(V4L2_CID_RED_BALANCE, "red_balance")?;
        let blue = self.read_control(V4L2_CID_BLUE_BALANCE, "blue_balance")?;
        #[allow(clippy::cast_precision_loss)]
        let gains = WhiteBalanceGains {
            red: red as f32 / BALANCE_UNITY,
            blue: blue as f32 / BALANCE_UNITY,
        };
        Ok(gains)
    }

    fn set_white_balance_gains(&mut self, gains: WhiteBalanceGains) -> Result<()> {
        #[allow(clippy::cast_possible_truncation)]
        let to_fixed = |gain: f32| (gain * BALANCE_UNITY).round() as i64;
        self.write_control(
            V4L2_CID_RED_BALANCE,
            "red_balance",
            Value::Integer(to_fixed(gains.red)),
        )?;
        self.write_control(
            V4L2_CID_BLUE_BALANCE,
            "blue_balance",
            Value::Integer(to_fixed(gains.blue)),
        )
    }

    fn create_stream(
        &mut self,
        buffer_count: u32,
    ) -> std::result::Result<V4L2Stream<'_>, CaptureError> {
        let mut stream = Stream::with_buffers(&self.device, Type::VideoCapture, buffer_count)
            .map_err(|err| CaptureError::Stream(err.to_string()))?;
        stream.set_timeout(FRAME_TIMEOUT);

        Ok(V4L2Stream {
            stream,
            format: &self.format,
        })
    }
}

/// V4L2 capture stream wrapping mmap-based streaming. Buffers are unmapped on drop.
pub struct V4L2Stream<'a> {
    stream: Stream<'a>,
    format: &'a Format,
}

impl CaptureStream for V4L2Stream<'_> {
    fn next_frame(&mut self) -> std::result::Result<Frame, CaptureError> {
        let (buf, meta) = self.stream.next().map_err(|err| {
            if err.kind() == io::ErrorKind::TimedOut {
                CaptureError::Timeout
            } else {
                CaptureError::Stream(err.to_string())
            }
        })?;

        // Safe conversions: V4L2 timestamps are always non-negative in practice
        #[allow(clippy::cast_sign_loss)]
        let secs = meta.timestamp.sec.max(0) as u64;
        #[allow(clippy::cast_sign_loss, clippy::cast_possible_truncation)]
        let nanos = (meta.timestamp.usec.max(0) as u32).saturating_mul(1000);

        let used = (meta.bytesused as usize).min(buf.len());
        Frame::from_yuyv(
            buf.get(..used).unwrap_or(buf),
            self.format,
            FrameMetadata {
                sequence: meta.sequence,
                timestamp: Duration::new(secs, nanos),
            },
        )
    }
}
