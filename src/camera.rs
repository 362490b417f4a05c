//! Exclusive camera acquisition and exposure calibration.

use std::rc::Rc;
use std::time::Duration;

use log::{debug, info};

use crate::clock::Clock;
use crate::error::HardwareError;
use crate::params::{CameraParameters, CapturePurpose};
use crate::traits::{CameraDriver, DeviceHandle, Result};

/// Wait for auto exposure and auto white balance to converge.
pub const AUTO_GAIN_SETTLE: Duration = Duration::from_secs(2);

/// Wait after configuring a freshly opened handle.
pub const OPEN_SETTLE: Duration = Duration::from_millis(100);

/// Owns the driver and hands out one configured handle at a time.
pub struct Camera<D> {
    driver: D,
    clock: Rc<dyn Clock>,
}

impl<D: CameraDriver> Camera<D> {
    /// Wrap a driver; settle waits go through `clock`.
    pub fn new(driver: D, clock: Rc<dyn Clock>) -> Self {
        Self { driver, clock }
    }

    /// Discover and lock exposure and white balance when `fixed` is set.
    ///
    /// Without `fixed` the parameters are returned unchanged and the device is
    /// not touched.
    pub fn calibrate(
        &mut self,
        parameters: CameraParameters,
        fixed: bool,
    ) -> Result<CameraParameters> {
        if !fixed {
            return Ok(parameters);
        }

        info!("Calibrating exposure and white balance");
        let mut calibrated = parameters;
        let mut handle = self
            .driver
            .open(calibrated.frame, calibrated.frame_rate)?;

        handle.set_auto_exposure(true)?;
        handle.set_auto_white_balance(true)?;
        handle.set_iso(calibrated.iso)?;
        debug!("Waiting {AUTO_GAIN_SETTLE:?} for auto gain to settle");
        self.clock.sleep(AUTO_GAIN_SETTLE);

        let shutter_speed = handle.shutter_speed()?;
        handle.set_auto_exposure(false)?;
        handle.set_shutter_speed(shutter_speed)?;

        let gains = handle.white_balance_gains()?;
        handle.set_auto_white_balance(false)?;
        handle.set_white_balance_gains(gains)?;

        Self::close(handle);
        self.clock.sleep(OPEN_SETTLE);

        info!(
            "Locked shutter speed {shutter_speed} us, white balance gains r={:.3} b={:.3}",
            gains.red, gains.blue
        );
        calibrated.shutter_speed = Some(shutter_speed);
        calibrated.awb_gains = Some(gains);
        Ok(calibrated)
    }

    /// Acquire the device for `purpose`.
    ///
    /// With `fixed`, the calibrated shutter speed and gains are re-applied to
    /// the new handle after the settle wait.
    pub fn open(
        &mut self,
        parameters: &CameraParameters,
        purpose: CapturePurpose,
        fixed: bool,
    ) -> Result<D::Handle<'_>> {
        let locked = if fixed {
            match (parameters.shutter_speed, parameters.awb_gains) {
                (Some(shutter_speed), Some(gains)) => Some((shutter_speed, gains)),
                _ => return Err(HardwareError::Uncalibrated),
            }
        } else {
            None
        };

        let resolution = parameters.resolution_for(purpose);
        debug!(
            "Opening camera for {purpose:?} at {}x{}",
            resolution.width, resolution.height
        );
        let mut handle = self.driver.open(resolution, parameters.frame_rate)?;

        if let Some((shutter_speed, gains)) = locked {
            handle.set_iso(parameters.iso)?;
            self.clock.sleep(AUTO_GAIN_SETTLE);
            handle.set_auto_exposure(false)?;
            handle.set_shutter_speed(shutter_speed)?;
            handle.set_auto_white_balance(false)?;
            handle.set_white_balance_gains(gains)?;
        }

        self.clock.sleep(OPEN_SETTLE);
        Ok(handle)
    }

    /// Release the device. Dropping a handle has the same effect.
    pub fn close<H: DeviceHandle>(handle: H) {
        debug!("Releasing camera");
        drop(handle);
    }
}
