//! Mock driver, clock, surface and store for testing without hardware.

use std::cell::{Cell, RefCell};
use std::collections::{HashSet, VecDeque};
use std::path::PathBuf;
use std::rc::Rc;
use std::time::Duration;

use chrono::{NaiveDate, NaiveDateTime, TimeDelta};

use crate::clock::Clock;
use crate::error::{CaptureError, DisplayError, HardwareError, StorageError};
use crate::preview::PreviewSurface;
use crate::store::ImageStore;
use crate::traits::{
    CameraDriver, CaptureStream, DeviceCapabilities, DeviceHandle, Format, FourCC, Frame,
    FrameMetadata, Resolution, Result, WhiteBalanceGains,
};

/// A control write observed by the mock device.
#[derive(Debug, Clone, PartialEq)]
pub enum ControlEvent {
    /// ISO set.
    Iso(u32),
    /// Auto exposure toggled.
    AutoExposure(bool),
    /// Auto white balance toggled.
    AutoWhiteBalance(bool),
    /// Exposure time fixed.
    ShutterSpeed(u32),
    /// White-balance gains fixed.
    Gains(WhiteBalanceGains),
}

/// Everything the mock device saw, shared with the test.
#[derive(Debug)]
pub struct MockLog {
    open_now: Cell<usize>,
    max_open: Cell<usize>,
    opens: Cell<usize>,
    fail_open: Cell<bool>,
    captures: Cell<usize>,
    fail_captures: RefCell<HashSet<usize>>,
    active_streams: Cell<usize>,
    streams_created: Cell<usize>,
    auto_exposure: Cell<bool>,
    auto_white_balance: Cell<bool>,
    controls: RefCell<Vec<ControlEvent>>,
}

impl Default for MockLog {
    fn default() -> Self {
        Self {
            open_now: Cell::new(0),
            max_open: Cell::new(0),
            opens: Cell::new(0),
            fail_open: Cell::new(false),
            captures: Cell::new(0),
            fail_captures: RefCell::new(HashSet::new()),
            active_streams: Cell::new(0),
            streams_created: Cell::new(0),
            auto_exposure: Cell::new(true),
            auto_white_balance: Cell::new(true),
            controls: RefCell::new(Vec::new()),
        }
    }
}

impl MockLog {
    /// Handles currently open.
    pub fn open_now(&self) -> usize {
        self.open_now.get()
    }

    /// Highest number of handles open at the same time.
    pub fn max_open(&self) -> usize {
        self.max_open.get()
    }

    /// Open attempts, successful or not.
    pub fn opens(&self) -> usize {
        self.opens.get()
    }

    /// Make every following open fail with `DeviceNotFound`.
    pub fn set_fail_open(&self, fail: bool) {
        self.fail_open.set(fail);
    }

    /// Frame reads attempted.
    pub fn captures(&self) -> usize {
        self.captures.get()
    }

    /// Make the frame read with the given zero-based index time out.
    pub fn fail_capture(&self, index: usize) {
        self.fail_captures.borrow_mut().insert(index);
    }

    /// Streams currently holding buffers.
    pub fn active_streams(&self) -> usize {
        self.active_streams.get()
    }

    /// Streams created so far.
    pub fn streams_created(&self) -> usize {
        self.streams_created.get()
    }

    /// Current auto exposure state.
    pub fn auto_exposure(&self) -> bool {
        self.auto_exposure.get()
    }

    /// Current auto white balance state.
    pub fn auto_white_balance(&self) -> bool {
        self.auto_white_balance.get()
    }

    /// Control writes in order.
    pub fn controls(&self) -> Vec<ControlEvent> {
        self.controls.borrow().clone()
    }

    /// Forget recorded control writes.
    pub fn clear_controls(&self) {
        self.controls.borrow_mut().clear();
    }

    fn record(&self, event: ControlEvent) {
        self.controls.borrow_mut().push(event);
    }
}

/// Mock driver for testing without hardware.
pub struct MockDriver {
    log: Rc<MockLog>,
    pattern: TestPattern,
    shutter_speed: u32,
    gains: WhiteBalanceGains,
}

impl Default for MockDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl MockDriver {
    /// Create a new mock driver with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self {
            log: Rc::new(MockLog::default()),
            pattern: TestPattern::ColorBars,
            shutter_speed: 10_000,
            gains: WhiteBalanceGains {
                red: 1.0,
                blue: 1.0,
            },
        }
    }

    /// Set the test pattern produced by every stream.
    #[must_use]
    pub const fn with_pattern(mut self, pattern: TestPattern) -> Self {
        self.pattern = pattern;
        self
    }

    /// Set the exposure the auto modes converge to.
    #[must_use]
    pub const fn with_exposure(mut self, shutter_speed: u32, gains: WhiteBalanceGains) -> Self {
        self.shutter_speed = shutter_speed;
        self.gains = gains;
        self
    }

    /// Shared log of everything the device saw.
    pub fn log(&self) -> Rc<MockLog> {
        Rc::clone(&self.log)
    }
}

impl CameraDriver for MockDriver {
    type Handle<'a> = MockHandle<'a>;

    fn open(&mut self, resolution: Resolution, _frame_rate: u32) -> Result<MockHandle<'_>> {
        let log = &self.log;
        log.opens.set(log.opens.get() + 1);
        if log.fail_open.get() {
            return Err(HardwareError::DeviceNotFound(0));
        }

        let open_now = log.open_now.get() + 1;
        log.open_now.set(open_now);
        log.max_open.set(log.max_open.get().max(open_now));

        Ok(MockHandle {
            driver: self,
            capabilities: DeviceCapabilities {
                driver: "mock".to_owned(),
                card: "Mock Camera".to_owned(),
                bus_info: "mock:0".to_owned(),
                can_capture: true,
                can_stream: true,
            },
            format: Format::new(resolution.width, resolution.height, FourCC::YUYV),
        })
    }
}

/// Open mock device; decrements the open count on drop.
pub struct MockHandle<'a> {
    driver: &'a MockDriver,
    capabilities: DeviceCapabilities,
    format: Format,
}

impl Drop for MockHandle<'_> {
    fn drop(&mut self) {
        let log = &self.driver.log;
        log.open_now.set(log.open_now.get().saturating_sub(1));
    }
}

impl DeviceHandle for MockHandle<'_> {
    type Stream<'s> = MockStream<'s> where Self: 's;

    fn capabilities(&self) -> &DeviceCapabilities {
        &self.capabilities
    }

    fn format(&self) -> &Format {
        &self.format
    }

    fn set_iso(&mut self, iso: u32) -> Result<()> {
        self.driver.log.record(ControlEvent::Iso(iso));
        Ok(())
    }

    fn set_auto_exposure(&mut self, enabled: bool) -> Result<()> {
        self.driver.log.auto_exposure.set(enabled);
        self.driver.log.record(ControlEvent::AutoExposure(enabled));
        Ok(())
    }

    fn set_auto_white_balance(&mut self, enabled: bool) -> Result<()> {
        self.driver.log.auto_white_balance.set(enabled);
        self.driver.log.record(ControlEvent::AutoWhiteBalance(enabled));
        Ok(())
    }

    fn shutter_speed(&self) -> Result<u32> {
        Ok(self.driver.shutter_speed)
    }

    fn set_shutter_speed(&mut self, micros: u32) -> Result<()> {
        self.driver.log.record(ControlEvent::ShutterSpeed(micros));
        Ok(())
    }

    fn white_balance_gains(&self) -> Result<WhiteBalanceGains> {
        Ok(self.driver.gains)
    }

    fn set_white_balance_gains(&mut self, gains: WhiteBalanceGains) -> Result<()> {
        self.driver.log.record(ControlEvent::Gains(gains));
        Ok(())
    }

    fn create_stream(
        &mut self,
        _buffer_count: u32,
    ) -> std::result::Result<MockStream<'_>, CaptureError> {
        let log = &self.driver.log;
        log.active_streams.set(log.active_streams.get() + 1);
        log.streams_created.set(log.streams_created.get() + 1);
        Ok(MockStream {
            log,
            format: &self.format,
            pattern: self.driver.pattern,
            sequence: 0,
        })
    }
}

/// Test pattern types for mock frame generation.
#[derive(Debug, Clone, Copy)]
pub enum TestPattern {
    /// SMPTE color bars pattern.
    ColorBars,
    /// Horizontal gradient from dark to light.
    Gradient,
    /// Solid color with specified Y, U, V values.
    Solid(u8, u8, u8),
}

/// Mock capture stream; releases its "buffers" on drop.
pub struct MockStream<'a> {
    log: &'a MockLog,
    format: &'a Format,
    pattern: TestPattern,
    sequence: u32,
}

impl Drop for MockStream<'_> {
    fn drop(&mut self) {
        self.log
            .active_streams
            .set(self.log.active_streams.get().saturating_sub(1));
    }
}

impl CaptureStream for MockStream<'_> {
    fn next_frame(&mut self) -> std::result::Result<Frame, CaptureError> {
        let attempt = self.log.captures.get();
        self.log.captures.set(attempt + 1);
        if self.log.fail_captures.borrow().contains(&attempt) {
            return Err(CaptureError::Timeout);
        }

        let data = generate_test_frame(self.format, self.pattern);
        let seq = self.sequence;
        self.sequence += 1;

        Frame::from_yuyv(
            &data,
            self.format,
            FrameMetadata {
                sequence: seq,
                timestamp: Duration::from_millis(u64::from(seq) * 33), // ~30fps
            },
        )
    }
}

/// Generate YUYV test frame data based on pattern.
fn generate_test_frame(format: &Format, pattern: TestPattern) -> Vec<u8> {
    let size = (format.width * format.height * 2) as usize; // YUYV = 2 bytes/pixel
    let mut data = vec![0u8; size];

    match pattern {
        TestPattern::ColorBars => generate_color_bars(&mut data, format.width),
        TestPattern::Gradient => generate_gradient(&mut data, format.width),
        TestPattern::Solid(y, u, v) => fill_pairs(&mut data, |_| (y, u, v)),
    }

    data
}

/// Fill every `[Y0 U Y1 V]` pair with the value computed from its pixel index.
fn fill_pairs<F: Fn(usize) -> (u8, u8, u8)>(data: &mut [u8], value: F) {
    for (pair, quad) in data.chunks_exact_mut(4).enumerate() {
        let (y, u, v) = value(pair * 2);
        quad.copy_from_slice(&[y, u, y, v]);
    }
}

/// Generate YUYV color bars pattern.
fn generate_color_bars(data: &mut [u8], width: u32) {
    // 8 color bars: White, Yellow, Cyan, Green, Magenta, Red, Blue, Black
    const BARS: [(u8, u8, u8); 8] = [
        (235, 128, 128),
        (210, 16, 146),
        (170, 166, 16),
        (145, 54, 34),
        (106, 202, 222),
        (81, 90, 240),
        (41, 240, 110),
        (16, 128, 128),
    ];
    let width = width as usize;
    let bar_width = (width / 8).max(1);

    fill_pairs(data, |pixel| {
        let x = pixel % width;
        BARS.get((x / bar_width).min(7)).copied().unwrap_or(BARS[7])
    });
}

/// Generate YUYV horizontal gradient pattern.
fn generate_gradient(data: &mut [u8], width: u32) {
    let width = width as usize;
    fill_pairs(data, |pixel| {
        #[allow(clippy::cast_possible_truncation)]
        let y = (((pixel % width) * 255) / width) as u8;
        (y, 128, 128)
    });
}

/// Virtual clock: `sleep` advances time instantly.
#[derive(Debug)]
pub struct MockClock {
    now: Cell<Duration>,
    base: NaiveDateTime,
}

impl Default for MockClock {
    fn default() -> Self {
        Self::new()
    }
}

impl MockClock {
    /// Clock at zero, wall time 2024-06-01 12:00:00.
    #[must_use]
    pub fn new() -> Self {
        let base = NaiveDate::from_ymd_opt(2024, 6, 1)
            .and_then(|date| date.and_hms_opt(12, 0, 0))
            .unwrap_or_default();
        Self {
            now: Cell::new(Duration::ZERO),
            base,
        }
    }
}

impl Clock for MockClock {
    fn elapsed(&self) -> Duration {
        self.now.get()
    }

    fn sleep(&self, duration: Duration) {
        self.now.set(self.now.get() + duration);
    }

    fn local_time(&self) -> NaiveDateTime {
        let offset = TimeDelta::from_std(self.now.get()).unwrap_or_else(|_| TimeDelta::zero());
        self.base + offset
    }
}

/// What the mock surface was asked to do.
#[derive(Debug, Default)]
pub struct SurfaceLog {
    shown: RefCell<Vec<(String, Resolution)>>,
    waits: RefCell<Vec<Option<Duration>>>,
    keys: RefCell<VecDeque<Option<char>>>,
    close_calls: Cell<usize>,
}

impl SurfaceLog {
    /// Titles and sizes of shown frames, in order.
    pub fn shown(&self) -> Vec<(String, Resolution)> {
        self.shown.borrow().clone()
    }

    /// Timeouts passed to `wait_key`, in order.
    pub fn waits(&self) -> Vec<Option<Duration>> {
        self.waits.borrow().clone()
    }

    /// Number of `close_all` calls.
    pub fn close_calls(&self) -> usize {
        self.close_calls.get()
    }
}

/// Scripted preview surface. Waits advance the shared mock clock.
pub struct MockSurface {
    log: Rc<SurfaceLog>,
    clock: Rc<MockClock>,
}

impl MockSurface {
    /// Surface returning `keys` from successive waits, then nothing.
    pub fn new<I>(clock: Rc<MockClock>, keys: I) -> Self
    where
        I: IntoIterator<Item = Option<char>>,
    {
        let log = SurfaceLog::default();
        log.keys.borrow_mut().extend(keys);
        Self {
            log: Rc::new(log),
            clock,
        }
    }

    /// Shared log of surface calls.
    pub fn log(&self) -> Rc<SurfaceLog> {
        Rc::clone(&self.log)
    }
}

impl PreviewSurface for MockSurface {
    fn show(&mut self, title: &str, frame: &Frame) -> std::result::Result<(), DisplayError> {
        self.log
            .shown
            .borrow_mut()
            .push((title.to_owned(), Resolution::new(frame.width, frame.height)));
        Ok(())
    }

    fn wait_key(&mut self, timeout: Option<Duration>) -> Option<char> {
        self.log.waits.borrow_mut().push(timeout);
        let key = self.log.keys.borrow_mut().pop_front().flatten();
        if key.is_none() {
            if let Some(timeout) = timeout {
                self.clock.sleep(timeout);
            }
        }
        key
    }

    fn close_all(&mut self) {
        self.log.close_calls.set(self.log.close_calls.get() + 1);
    }
}

/// What the mock store was asked to save.
#[derive(Debug, Default)]
pub struct StoreLog {
    attempts: Cell<usize>,
    fail_on: RefCell<HashSet<usize>>,
    saved: RefCell<Vec<PathBuf>>,
}

impl StoreLog {
    /// Save calls, successful or not.
    pub fn attempts(&self) -> usize {
        self.attempts.get()
    }

    /// Paths reported as written.
    pub fn saved(&self) -> Vec<PathBuf> {
        self.saved.borrow().clone()
    }

    /// Make the save call with the given zero-based index fail.
    pub fn fail_on(&self, index: usize) {
        self.fail_on.borrow_mut().insert(index);
    }
}

/// In-memory store that can be told to fail specific saves.
#[derive(Default)]
pub struct MockStore {
    log: Rc<StoreLog>,
}

impl MockStore {
    /// Shared log of save calls.
    pub fn log(&self) -> Rc<StoreLog> {
        Rc::clone(&self.log)
    }
}

impl ImageStore for MockStore {
    fn save(
        &mut self,
        _frame: &Frame,
        folder: &str,
        stem: &str,
    ) -> std::result::Result<PathBuf, StorageError> {
        let attempt = self.log.attempts.get();
        self.log.attempts.set(attempt + 1);
        let path = PathBuf::from(folder).join(format!("{stem}.png"));
        if self.log.fail_on.borrow().contains(&attempt) {
            return Err(StorageError::CreateDir {
                path,
                source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only"),
            });
        }
        self.log.saved.borrow_mut().push(path.clone());
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_driver_tracks_open_handles() {
        let mut driver = MockDriver::new();
        let log = driver.log();
        {
            let handle = driver
                .open(Resolution::new(16, 8), 30)
                .expect("open should succeed");
            assert_eq!(handle.capabilities().driver, "mock");
            assert_eq!(log.open_now(), 1);
        }
        assert_eq!(log.open_now(), 0);
        assert_eq!(log.max_open(), 1);
    }

    #[test]
    fn test_color_bars_pattern() {
        let format = Format::new(64, 8, FourCC::YUYV);
        let data = generate_test_frame(&format, TestPattern::ColorBars);
        assert_eq!(data.len(), 64 * 8 * 2);
        // First bar should be white (Y=235), last black (Y=16)
        assert_eq!(data.first(), Some(&235));
        assert_eq!(data.get(62 * 2), Some(&16));
    }

    #[test]
    fn test_gradient_pattern() {
        let mut driver = MockDriver::new().with_pattern(TestPattern::Gradient);
        let mut handle = driver
            .open(Resolution::new(64, 4), 30)
            .expect("open should succeed");
        let mut stream = handle.create_stream(1).expect("stream");
        let frame = stream.next_frame().expect("frame");

        let (left, _, _) = frame.pixel_at(0, 2).expect("left pixel");
        let (right, _, _) = frame.pixel_at(63, 2).expect("right pixel");
        assert!(left < 10);
        assert!(right > 200);
    }

    #[test]
    fn test_solid_pattern() {
        let format = Format::new(8, 8, FourCC::YUYV);
        let data = generate_test_frame(&format, TestPattern::Solid(128, 64, 192));
        assert_eq!(data.get(..4), Some(&[128u8, 64, 128, 192][..]));
    }

    #[test]
    fn test_mock_clock_advances_on_sleep() {
        let clock = MockClock::new();
        let start = clock.local_time();
        clock.sleep(Duration::from_secs(61));
        assert_eq!(clock.elapsed(), Duration::from_secs(61));
        assert_eq!((clock.local_time() - start).num_seconds(), 61);
    }
}
