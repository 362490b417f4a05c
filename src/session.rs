//! Session controller: preview, still, timelapse and output modes.

use std::path::PathBuf;
use std::rc::Rc;
use std::time::Duration;

use log::{debug, error, info, warn};

use crate::camera::Camera;
use crate::capture::{capture_one, capture_stream};
use crate::clock::Clock;
use crate::error::SessionError;
use crate::params::{CameraParameters, CapturePurpose, ParameterStore};
use crate::preview::{show_or_warn, PreviewSurface, QUIT_KEY, SAVE_KEY};
use crate::store::{date_folder, file_stem, resize_for_preview, timelapse_folder, ImageStore};
use crate::traits::{CameraDriver, Frame};

/// Allowance added to every bounded duration to absorb calibration and open
/// latency before the loop starts producing frames.
pub const DURATION_GRACE: Duration = Duration::from_secs(2);

/// Sub-interval used while waiting out the pre-start delay.
pub const DELAY_POLL: Duration = Duration::from_secs(3);

const VIDEO_KEY_POLL: Duration = Duration::from_millis(1);
const TIMELAPSE_KEY_POLL: Duration = Duration::from_millis(500);

const PREVIEW_VIDEO_TITLE: &str = "Preview Video";
const PREVIEW_STILL_TITLE: &str = "Preview Still";

/// Which modes to run and their timing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionOptions {
    /// Run the live video preview.
    pub preview_video: bool,
    /// Capture and show one still, save on the save key.
    pub preview_still: bool,
    /// Timelapse interval; `None` disables timelapse.
    pub time_lapse: Option<Duration>,
    /// Bound for video preview and timelapse, or the still preview key wait.
    /// Zero means unbounded.
    pub time: Duration,
    /// Wait before a timelapse starts.
    pub delay: Duration,
    /// Calibrate once and lock exposure and white balance.
    pub fixed: bool,
    /// Persist the final image.
    pub output: bool,
    /// Added to `time` before a bounded loop terminates.
    pub grace: Duration,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            preview_video: false,
            preview_still: false,
            time_lapse: None,
            time: Duration::ZERO,
            delay: Duration::ZERO,
            fixed: false,
            output: false,
            grace: DURATION_GRACE,
        }
    }
}

impl SessionOptions {
    /// Whether any mode is enabled.
    pub const fn any_mode(&self) -> bool {
        self.preview_video || self.preview_still || self.time_lapse.is_some() || self.output
    }
}

/// Where the controller is within the current mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No mode running.
    Idle,
    /// Loading parameters and calibrating.
    Calibrating,
    /// Device open and frames being read.
    Capturing,
    /// Timelapse sleeping between shots.
    AwaitingInterval,
    /// Mode finished.
    Terminated,
}

fn transition(state: &mut SessionState, next: SessionState) {
    if *state != next {
        debug!("{state:?} -> {next:?}");
        *state = next;
    }
}

/// Termination predicate for bounded loops.
#[derive(Debug, Clone, Copy)]
struct Deadline {
    limit: Option<Duration>,
}

impl Deadline {
    fn new(started: Duration, bound: Duration, grace: Duration) -> Self {
        Self {
            limit: (!bound.is_zero()).then(|| started + bound + grace),
        }
    }

    fn passed(self, now: Duration) -> bool {
        self.limit.is_some_and(|limit| now > limit)
    }
}

/// One timelapse run and what it produced.
#[derive(Debug, Clone)]
pub struct TimelapseSession {
    /// Folder below the store root, named after the start time.
    pub folder: String,
    /// Time between shots.
    pub interval: Duration,
    /// Clock reading when the loop started.
    pub started: Duration,
    /// Configured bound, if any.
    pub bound: Option<Duration>,
    /// Capture attempts made.
    pub attempts: usize,
    /// Files written.
    pub stored: Vec<PathBuf>,
    /// Shots lost to capture errors.
    pub capture_failures: usize,
    /// Shots captured but not persisted.
    pub storage_failures: usize,
}

/// Drives the camera through the enabled modes, in order: video preview,
/// still preview, timelapse, output.
pub struct SessionController<D> {
    camera: Camera<D>,
    parameters: ParameterStore,
    store: Box<dyn ImageStore>,
    surface: Box<dyn PreviewSurface>,
    clock: Rc<dyn Clock>,
    options: SessionOptions,
    state: SessionState,
    current_image: Option<Frame>,
}

impl<D: CameraDriver> SessionController<D> {
    /// Assemble a controller. Nothing touches the device until a mode runs.
    pub fn new(
        driver: D,
        parameters: ParameterStore,
        store: Box<dyn ImageStore>,
        surface: Box<dyn PreviewSurface>,
        clock: Rc<dyn Clock>,
        options: SessionOptions,
    ) -> Self {
        Self {
            camera: Camera::new(driver, Rc::clone(&clock)),
            parameters,
            store,
            surface,
            clock,
            options,
            state: SessionState::Idle,
            current_image: None,
        }
    }

    /// Current state.
    pub const fn state(&self) -> SessionState {
        self.state
    }

    /// Frame held from the last mode, if any.
    pub const fn current_image(&self) -> Option<&Frame> {
        self.current_image.as_ref()
    }

    /// Run every enabled mode, then destroy all windows, on success or error.
    pub fn run(&mut self) -> Result<(), SessionError> {
        let result = self.run_modes();
        self.surface.close_all();
        transition(&mut self.state, SessionState::Terminated);
        info!("Terminating Program");
        result
    }

    fn run_modes(&mut self) -> Result<(), SessionError> {
        if self.options.preview_video {
            self.preview_video()?;
        }
        if self.options.preview_still {
            self.preview_still()?;
        }
        if let Some(interval) = self.options.time_lapse {
            self.timelapse(interval)?;
        }
        if self.options.output {
            self.output()?;
        }
        Ok(())
    }

    /// Stream video-resolution frames to the preview until the quit key or
    /// the time bound. The last frame becomes the current image.
    pub fn preview_video(&mut self) -> Result<(), SessionError> {
        transition(&mut self.state, SessionState::Idle);
        let parameters = self.calibrate()?;
        let deadline = Deadline::new(self.clock.elapsed(), self.options.time, self.options.grace);

        info!("Starting Preview");
        let mut handle = self
            .camera
            .open(&parameters, CapturePurpose::Video, self.options.fixed)?;
        transition(&mut self.state, SessionState::Capturing);

        let mut last = None;
        for frame in capture_stream(&mut handle)? {
            let frame = frame?;
            let preview = resize_for_preview(&frame, parameters.preview);
            show_or_warn(self.surface.as_mut(), PREVIEW_VIDEO_TITLE, &preview);
            let key = self.surface.wait_key(Some(VIDEO_KEY_POLL));
            last = Some(frame);

            if key == Some(QUIT_KEY) {
                info!("Preview stopped by user");
                break;
            }
            if deadline.passed(self.clock.elapsed()) {
                debug!("Preview time elapsed");
                break;
            }
        }
        Camera::<D>::close(handle);

        if last.is_some() {
            self.current_image = last;
        }
        transition(&mut self.state, SessionState::Terminated);
        Ok(())
    }

    /// Capture one still, show it and wait for a key. Only the save key
    /// persists it; the frame becomes the current image either way.
    pub fn preview_still(&mut self) -> Result<Option<PathBuf>, SessionError> {
        transition(&mut self.state, SessionState::Idle);
        let parameters = self.calibrate()?;
        let frame = self.capture_still(&parameters)?;
        transition(&mut self.state, SessionState::Terminated);

        let preview = resize_for_preview(&frame, parameters.preview);
        show_or_warn(self.surface.as_mut(), PREVIEW_STILL_TITLE, &preview);
        let timeout = (!self.options.time.is_zero()).then_some(self.options.time);
        let key = self.surface.wait_key(timeout);

        let saved = if key == Some(SAVE_KEY) {
            self.persist(&frame, None)
        } else {
            debug!("Still preview discarded (key {key:?})");
            None
        };
        self.current_image = Some(frame);
        Ok(saved)
    }

    /// Capture one still every `interval` into a session folder until the
    /// quit key or the time bound.
    ///
    /// The device is opened and released for every shot. Capture and storage
    /// failures are logged and the loop goes on to the next shot.
    pub fn timelapse(&mut self, interval: Duration) -> Result<TimelapseSession, SessionError> {
        transition(&mut self.state, SessionState::Idle);
        self.delay_start();
        let parameters = self.calibrate()?;

        let started = self.clock.elapsed();
        let deadline = Deadline::new(started, self.options.time, self.options.grace);
        let mut session = TimelapseSession {
            folder: timelapse_folder(self.clock.local_time()),
            interval,
            started,
            bound: (!self.options.time.is_zero()).then_some(self.options.time),
            attempts: 0,
            stored: Vec::new(),
            capture_failures: 0,
            storage_failures: 0,
        };
        info!(
            "Starting timelapse into {} every {interval:?}",
            session.folder
        );

        loop {
            transition(&mut self.state, SessionState::Capturing);
            session.attempts += 1;

            match self.capture_still(&parameters) {
                Ok(frame) => {
                    match self.persist(&frame, Some(&session.folder)) {
                        Some(path) => session.stored.push(path),
                        None => session.storage_failures += 1,
                    }
                    let title = file_stem(self.clock.local_time());
                    self.surface.close_all();
                    show_or_warn(
                        self.surface.as_mut(),
                        &title,
                        &resize_for_preview(&frame, parameters.preview),
                    );
                    self.current_image = Some(frame);
                }
                Err(SessionError::Capture(err)) => {
                    warn!("Shot {} failed: {err}", session.attempts);
                    session.capture_failures += 1;
                }
                Err(err) => return Err(err),
            }

            if self.surface.wait_key(Some(TIMELAPSE_KEY_POLL)) == Some(QUIT_KEY) {
                info!("Timelapse stopped by user");
                break;
            }
            if deadline.passed(self.clock.elapsed()) {
                break;
            }

            transition(&mut self.state, SessionState::AwaitingInterval);
            self.clock.sleep(interval);
        }

        transition(&mut self.state, SessionState::Terminated);
        info!(
            "Timelapse finished: {} shots, {} stored",
            session.attempts,
            session.stored.len()
        );
        Ok(session)
    }

    /// Persist the current image, capturing a new one if no mode produced it.
    pub fn output(&mut self) -> Result<Option<PathBuf>, SessionError> {
        let frame = match self.current_image.take() {
            Some(frame) => frame,
            None => {
                transition(&mut self.state, SessionState::Idle);
                let parameters = self.calibrate()?;
                let frame = self.capture_still(&parameters)?;
                transition(&mut self.state, SessionState::Terminated);
                frame
            }
        };

        let saved = self.persist(&frame, None);
        self.current_image = Some(frame);
        Ok(saved)
    }

    fn calibrate(&mut self) -> Result<CameraParameters, SessionError> {
        transition(&mut self.state, SessionState::Calibrating);
        info!("Initialize Camera");
        let parameters = CameraParameters::from_store(&self.parameters)?;
        Ok(self.camera.calibrate(parameters, self.options.fixed)?)
    }

    /// Open, read one frame, release.
    fn capture_still(&mut self, parameters: &CameraParameters) -> Result<Frame, SessionError> {
        transition(&mut self.state, SessionState::Capturing);
        let mut handle = self
            .camera
            .open(parameters, CapturePurpose::Still, self.options.fixed)?;
        let frame = capture_one(&mut handle);
        Camera::<D>::close(handle);
        Ok(frame?)
    }

    /// Save into `folder`, or the date folder. Failures are reported, not raised.
    fn persist(&mut self, frame: &Frame, folder: Option<&str>) -> Option<PathBuf> {
        let now = self.clock.local_time();
        let folder = folder.map_or_else(|| date_folder(now), ToOwned::to_owned);

        match self.store.save(frame, &folder, &file_stem(now)) {
            Ok(path) => {
                info!("Image was saved to {}", path.display());
                Some(path)
            }
            Err(err) => {
                error!("Could not save image: {err}");
                None
            }
        }
    }

    /// Block for the configured pre-start delay in `DELAY_POLL` steps.
    fn delay_start(&self) {
        let delay = self.options.delay;
        if delay.is_zero() {
            return;
        }

        info!("Delaying start by {delay:?}");
        let started = self.clock.elapsed();
        loop {
            let waited = self.clock.elapsed().saturating_sub(started);
            if waited >= delay {
                break;
            }
            self.clock.sleep(DELAY_POLL.min(delay - waited));
        }
    }
}
