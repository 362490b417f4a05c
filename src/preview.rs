//! Preview surfaces: where frames are shown and keypresses come from.

use std::io::{self, Read};
use std::thread;
use std::time::Duration;

use crossbeam_channel::Receiver;
use log::{debug, info, trace, warn};

use crate::clock::Clock;
use crate::error::DisplayError;
use crate::traits::Frame;

/// Key that ends the video preview and timelapse loops.
pub const QUIT_KEY: char = 'q';

/// Key that persists the still preview.
pub const SAVE_KEY: char = 's';

/// A set of titled windows plus a keypress source.
pub trait PreviewSurface {
    /// Show `frame` in the window named `title`, creating it if needed.
    fn show(&mut self, title: &str, frame: &Frame) -> Result<(), DisplayError>;

    /// Wait for one keypress. `None` as timeout waits indefinitely.
    fn wait_key(&mut self, timeout: Option<Duration>) -> Option<char>;

    /// Destroy every open window.
    fn close_all(&mut self);
}

/// Surface for hosts without a display: frames are only logged and keys come
/// from a byte source such as stdin, one key per non-whitespace byte.
///
/// The source is read on a background thread; a terminal delivers keys once
/// the line is submitted (`q` then Enter).
pub struct HeadlessSurface<C> {
    clock: C,
    keys: Option<Receiver<char>>,
}

impl<C: Clock> HeadlessSurface<C> {
    /// Headless surface with no key source; waits only consume time on `clock`.
    pub const fn new(clock: C) -> Self {
        Self { clock, keys: None }
    }

    /// Headless surface reading keys from `source`.
    pub fn with_key_source<R>(clock: C, source: R) -> Self
    where
        R: Read + Send + 'static,
    {
        let (sender, receiver) = crossbeam_channel::unbounded();
        thread::spawn(move || {
            for byte in source.bytes() {
                let Ok(byte) = byte else { break };
                if byte.is_ascii_whitespace() {
                    continue;
                }
                if sender.send(char::from(byte)).is_err() {
                    break;
                }
            }
            debug!("Key source closed");
        });
        Self {
            clock,
            keys: Some(receiver),
        }
    }

    /// Headless surface reading keys from stdin.
    pub fn with_stdin(clock: C) -> Self {
        Self::with_key_source(clock, io::stdin())
    }
}

impl<C: Clock> PreviewSurface for HeadlessSurface<C> {
    fn show(&mut self, title: &str, frame: &Frame) -> Result<(), DisplayError> {
        trace!("[{title}] frame {} {}x{}", frame.metadata.sequence, frame.width, frame.height);
        Ok(())
    }

    fn wait_key(&mut self, timeout: Option<Duration>) -> Option<char> {
        match (&self.keys, timeout) {
            (Some(keys), Some(timeout)) => keys.recv_timeout(timeout).ok(),
            (Some(keys), None) => keys.recv().ok(),
            (None, Some(timeout)) => {
                self.clock.sleep(timeout);
                None
            }
            (None, None) => {
                info!("No key source attached, not waiting for a key");
                None
            }
        }
    }

    fn close_all(&mut self) {}
}

#[cfg(feature = "window")]
pub use window::WindowSurface;

#[cfg(feature = "window")]
mod window {
    use std::collections::HashMap;
    use std::time::{Duration, Instant};

    use log::debug;
    use minifb::{Key, KeyRepeat, Window, WindowOptions};

    use super::PreviewSurface;
    use crate::error::DisplayError;
    use crate::traits::Frame;

    const POLL_STEP: Duration = Duration::from_millis(10);

    /// Desktop windows backed by `minifb`.
    #[derive(Default)]
    pub struct WindowSurface {
        windows: HashMap<String, Window>,
    }

    impl WindowSurface {
        /// Surface with no window open yet.
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        fn pressed_key(&mut self) -> Option<char> {
            self.windows.values_mut().find_map(|window| {
                window.update();
                window
                    .get_keys_pressed(KeyRepeat::No)
                    .into_iter()
                    .next()
                    .map(key_char)
            })
        }
    }

    fn key_char(key: Key) -> char {
        match key {
            Key::Q => 'q',
            Key::S => 's',
            Key::Escape => '\u{1b}',
            Key::Space => ' ',
            Key::Enter => '\n',
            _ => '?',
        }
    }

    /// Pack BGR bytes as `0RGB` words.
    fn to_argb(frame: &Frame) -> Vec<u32> {
        frame
            .data
            .chunks_exact(3)
            .map(|px| match *px {
                [b, g, r] => (u32::from(r) << 16) | (u32::from(g) << 8) | u32::from(b),
                _ => 0,
            })
            .collect()
    }

    impl PreviewSurface for WindowSurface {
        fn show(&mut self, title: &str, frame: &Frame) -> Result<(), DisplayError> {
            let width = frame.width as usize;
            let height = frame.height as usize;

            if !self.windows.contains_key(title) {
                debug!("Opening window {title}");
                let window = Window::new(title, width, height, WindowOptions::default())
                    .map_err(|err| DisplayError(err.to_string()))?;
                self.windows.insert(title.to_owned(), window);
            }

            if let Some(window) = self.windows.get_mut(title) {
                window
                    .update_with_buffer(&to_argb(frame), width, height)
                    .map_err(|err| DisplayError(err.to_string()))?;
            }
            Ok(())
        }

        fn wait_key(&mut self, timeout: Option<Duration>) -> Option<char> {
            let started = Instant::now();
            loop {
                if let Some(key) = self.pressed_key() {
                    return Some(key);
                }
                if self.windows.values().all(|window| !window.is_open()) {
                    return None;
                }
                if timeout.is_some_and(|limit| started.elapsed() >= limit) {
                    return None;
                }
                std::thread::sleep(POLL_STEP);
            }
        }

        fn close_all(&mut self) {
            self.windows.clear();
        }
    }
}

/// Log and swallow a failed `show`; preview problems never stop a capture loop.
pub(crate) fn show_or_warn(surface: &mut dyn PreviewSurface, title: &str, frame: &Frame) {
    if let Err(err) = surface.show(title, frame) {
        warn!("{err}");
    }
}
