//! Input device abstraction consumed by the capture engine.
//!
//! Frames are 16-bit signed mono PCM samples. A stream read blocks until a
//! full frame is available; device-side overflow is absorbed by the backend
//! (oldest audio dropped) rather than reported as an error.

use crate::error::Result;

/// An open input stream.
pub trait InputStream {
    /// Read exactly `frame_size` samples, blocking until they are available.
    ///
    /// # Errors
    ///
    /// Returns an error if the device stopped delivering audio. The caller
    /// may treat this as a dropped frame and keep reading.
    fn read(&mut self, frame_size: usize) -> Result<Vec<i16>>;

    /// Release the device. Calling this more than once is a no-op.
    fn close(&mut self);
}

/// A source of input streams.
pub trait AudioDevice: Send + Sync {
    /// Open an input stream delivering `channels`-channel PCM at `sample_rate`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::VoiceError::DeviceUnavailable`] if no stream can be opened.
    fn open_input_stream(
        &self,
        sample_rate: u32,
        channels: u16,
        frame_size: usize,
    ) -> Result<Box<dyn InputStream>>;

    /// Human-readable device name for logs.
    fn name(&self) -> String;

    /// Probe whether a stream can be opened right now.
    fn is_available(&self, sample_rate: u32, channels: u16, frame_size: usize) -> bool {
        match self.open_input_stream(sample_rate, channels, frame_size) {
            Ok(stream) => {
                drop(StreamGuard::new(stream));
                true
            }
            Err(e) => {
                tracing::error!(device = %self.name(), "input device unavailable: {e}");
                false
            }
        }
    }
}

/// Owns an open stream and closes it when dropped, on every exit path.
pub struct StreamGuard {
    stream: Box<dyn InputStream>,
}

impl StreamGuard {
    /// Take ownership of `stream`.
    pub fn new(stream: Box<dyn InputStream>) -> Self {
        Self { stream }
    }

    /// Read one frame from the wrapped stream.
    ///
    /// # Errors
    ///
    /// Propagates the stream's read error.
    pub fn read(&mut self, frame_size: usize) -> Result<Vec<i16>> {
        self.stream.read(frame_size)
    }
}

impl Drop for StreamGuard {
    fn drop(&mut self) {
        self.stream.close();
    }
}
