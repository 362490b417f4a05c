//! Camera parameters and the key/value store they are read from.

use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;

use ini::Ini;
use log::debug;

use crate::error::ConfigurationError;
use crate::traits::{Resolution, WhiteBalanceGains};

/// Section of the configuration file holding the camera parameters.
pub const SECTION: &str = "camera_parameters";

/// Named camera parameters as raw strings.
#[derive(Debug, Clone, Default)]
pub struct ParameterStore {
    values: HashMap<String, String>,
}

impl ParameterStore {
    /// Load the `[camera_parameters]` section of an INI file.
    pub fn from_ini_file(path: &Path) -> Result<Self, ConfigurationError> {
        let ini = Ini::load_from_file(path).map_err(|source| ConfigurationError::Load {
            path: path.to_path_buf(),
            source,
        })?;
        let section = ini
            .section(Some(SECTION))
            .ok_or(ConfigurationError::MissingSection(SECTION))?;

        let values: HashMap<String, String> = section
            .iter()
            .map(|(key, value)| (key.to_lowercase(), value.trim().to_owned()))
            .collect();
        debug!("Loaded {} parameters from {}", values.len(), path.display());

        Ok(Self { values })
    }

    /// Build a store from literal pairs.
    pub fn from_pairs<'a, I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        Self {
            values: pairs
                .into_iter()
                .map(|(key, value)| (key.to_owned(), value.to_owned()))
                .collect(),
        }
    }

    /// Raw value of a parameter.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    fn parse<T: FromStr>(&self, key: &'static str) -> Result<T, ConfigurationError> {
        let raw = self.get(key).ok_or(ConfigurationError::MissingKey(key))?;
        raw.parse().map_err(|_| ConfigurationError::Malformed {
            key,
            value: raw.to_owned(),
        })
    }
}

/// What an opened handle is used for; selects the resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapturePurpose {
    /// Continuous preview at the video resolution.
    Video,
    /// Single frames at the still-capture resolution.
    Still,
}

/// Snapshot of the camera settings for one session.
#[derive(Debug, Clone, PartialEq)]
pub struct CameraParameters {
    /// Still-capture resolution.
    pub frame: Resolution,
    /// Video preview resolution.
    pub video: Resolution,
    /// Frames per second requested from the driver.
    pub frame_rate: u32,
    /// Sensor ISO.
    pub iso: u32,
    /// Size of the preview window.
    pub preview: Resolution,
    /// Exposure time in microseconds discovered by calibration.
    pub shutter_speed: Option<u32>,
    /// White-balance gains discovered by calibration.
    pub awb_gains: Option<WhiteBalanceGains>,
}

impl CameraParameters {
    /// Read every required parameter; any missing or malformed key is fatal.
    pub fn from_store(store: &ParameterStore) -> Result<Self, ConfigurationError> {
        Ok(Self {
            frame: Resolution::new(store.parse("frame_width")?, store.parse("frame_height")?),
            video: Resolution::new(store.parse("vid_width")?, store.parse("vid_height")?),
            frame_rate: store.parse("frame_rate")?,
            iso: store.parse("iso")?,
            preview: Resolution::new(
                store.parse("preview_width")?,
                store.parse("preview_height")?,
            ),
            shutter_speed: None,
            awb_gains: None,
        })
    }

    /// Resolution used for the given purpose.
    #[must_use]
    pub const fn resolution_for(&self, purpose: CapturePurpose) -> Resolution {
        match purpose {
            CapturePurpose::Video => self.video,
            CapturePurpose::Still => self.frame,
        }
    }
}
