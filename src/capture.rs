//! Frame capture on an open handle.

use log::trace;

use crate::error::CaptureError;
use crate::traits::{CaptureStream, DeviceHandle, Frame};

/// Buffers queued for a single-shot capture.
const SINGLE_SHOT_BUFFERS: u32 = 1;

/// Buffers queued for continuous capture.
const STREAM_BUFFERS: u32 = 4;

/// Capture exactly one frame. No retry on failure.
pub fn capture_one<H: DeviceHandle>(handle: &mut H) -> Result<Frame, CaptureError> {
    let mut stream = handle.create_stream(SINGLE_SHOT_BUFFERS)?;
    let frame = stream.next_frame()?;
    trace!(
        "Captured frame {} ({}x{})",
        frame.metadata.sequence,
        frame.width,
        frame.height
    );
    Ok(frame)
}

/// Start a fresh, infinite frame stream.
///
/// The stream's buffers live as long as the returned iterator; stop iterating
/// and drop it to release them.
pub fn capture_stream<H: DeviceHandle>(
    handle: &mut H,
) -> Result<Frames<H::Stream<'_>>, CaptureError> {
    Ok(Frames {
        stream: handle.create_stream(STREAM_BUFFERS)?,
    })
}

/// Iterator over continuously polled frames. Never returns `None`.
pub struct Frames<S> {
    stream: S,
}

impl<S: CaptureStream> Iterator for Frames<S> {
    type Item = Result<Frame, CaptureError>;

    fn next(&mut self) -> Option<Self::Item> {
        Some(self.stream.next_frame())
    }
}
