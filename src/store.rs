//! Persisting frames as PNG files and preparing them for display.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use image::imageops::{self, FilterType};
use image::{ImageBuffer, ImageFormat, Rgb, RgbImage};
use log::trace;

use crate::error::StorageError;
use crate::traits::{Frame, Resolution};

/// Default root folder for stored images.
pub const DEFAULT_ROOT: &str = "images";

/// Folder for ad hoc saves: `YYYY_MM_DD`.
#[must_use]
pub fn date_folder(time: NaiveDateTime) -> String {
    time.format("%Y_%m_%d").to_string()
}

/// Folder for a timelapse session started at `time`: `YYYY_MM_DD-HH_MM_Timelapse`.
#[must_use]
pub fn timelapse_folder(time: NaiveDateTime) -> String {
    format!("{}_Timelapse", time.format("%Y_%m_%d-%H_%M"))
}

/// File stem for a capture taken at `time`: `YYYY_MM_DD-HH_MM_SS`.
///
/// Second granularity; two saves in the same second overwrite each other.
#[must_use]
pub fn file_stem(time: NaiveDateTime) -> String {
    time.format("%Y_%m_%d-%H_%M_%S").to_string()
}

/// Destination for captured frames.
pub trait ImageStore {
    /// Write `frame` as `<folder>/<stem>.png` and return the written path.
    fn save(&mut self, frame: &Frame, folder: &str, stem: &str) -> Result<PathBuf, StorageError>;
}

/// Writes PNG files below a root directory, creating folders on demand.
#[derive(Debug, Clone)]
pub struct PngStore {
    root: PathBuf,
}

impl PngStore {
    /// Store rooted at `root`.
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        Self { root: root.into() }
    }

    /// Root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl Default for PngStore {
    fn default() -> Self {
        Self::new(DEFAULT_ROOT)
    }
}

impl ImageStore for PngStore {
    fn save(&mut self, frame: &Frame, folder: &str, stem: &str) -> Result<PathBuf, StorageError> {
        let dir = self.root.join(folder);
        fs::create_dir_all(&dir).map_err(|source| StorageError::CreateDir {
            path: dir.clone(),
            source,
        })?;

        let path = dir.join(format!("{stem}.png"));
        let rgb = to_rgb_image(frame)?;
        rgb.save_with_format(&path, ImageFormat::Png)
            .map_err(|source| StorageError::Encode {
                path: path.clone(),
                source,
            })?;

        trace!("Wrote {}", path.display());
        Ok(path)
    }
}

/// Reorder BGR pixels into an `RgbImage`.
fn to_rgb_image(frame: &Frame) -> Result<RgbImage, StorageError> {
    let invalid = || StorageError::InvalidFrame {
        width: frame.width,
        height: frame.height,
    };
    let expected = (frame.width as usize) * (frame.height as usize) * 3;
    if frame.data.len() != expected {
        return Err(invalid());
    }

    let rgb: Vec<u8> = frame
        .data
        .chunks_exact(3)
        .flat_map(|px| match *px {
            [b, g, r] => [r, g, b],
            _ => [0, 0, 0],
        })
        .collect();
    ImageBuffer::from_raw(frame.width, frame.height, rgb).ok_or_else(invalid)
}

/// Downscale a frame to the preview size, keeping BGR order.
///
/// Returns a copy of the input when the buffer does not match its dimensions.
#[must_use]
pub fn resize_for_preview(frame: &Frame, size: Resolution) -> Frame {
    let Some(buffer) =
        ImageBuffer::<Rgb<u8>, &[u8]>::from_raw(frame.width, frame.height, frame.data.as_slice())
    else {
        return frame.clone();
    };

    let resized = imageops::resize(&buffer, size.width, size.height, FilterType::Triangle);
    Frame {
        width: size.width,
        height: size.height,
        data: resized.into_raw(),
        metadata: frame.metadata.clone(),
    }
}
