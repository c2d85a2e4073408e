//! Microphone input via cpal.
//!
//! Captures at the device's native configuration and converts to 16-bit
//! mono PCM at the requested rate inside the audio callback. Converted
//! chunks are handed to the reading thread over a bounded channel; when the
//! reader falls behind, new chunks are dropped instead of blocking the
//! audio thread.

use crate::audio::device::{AudioDevice, InputStream};
use crate::audio::level::f32_to_i16;
use crate::config::AudioConfig;
use crate::error::{Result, VoiceError};
use cpal::StreamConfig;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use crossbeam_channel::{Receiver, RecvTimeoutError, bounded};
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Callback chunks buffered between the audio thread and the reader.
const CHUNK_BUFFER: usize = 64;

/// Input device backed by the system audio host.
pub struct CpalInput {
    device_name: Option<String>,
    read_timeout: Duration,
}

impl CpalInput {
    /// Create an input for the configured device (or the system default).
    ///
    /// The device is resolved on every `open_input_stream`, so a device
    /// plugged in after startup is picked up by the next capture.
    pub fn new(config: &AudioConfig) -> Self {
        Self {
            device_name: config.input_device.clone(),
            read_timeout: Duration::from_millis(config.read_timeout_ms.max(1)),
        }
    }

    fn resolve_device(&self) -> Result<cpal::Device> {
        let host = cpal::default_host();
        if let Some(ref name) = self.device_name {
            host.input_devices()
                .map_err(|e| {
                    VoiceError::DeviceUnavailable(format!("cannot enumerate devices: {e}"))
                })?
                .find(|d| {
                    d.description()
                        .ok()
                        .map(|desc| desc.name() == name)
                        .unwrap_or(false)
                })
                .ok_or_else(|| {
                    VoiceError::DeviceUnavailable(format!("input device '{name}' not found"))
                })
        } else {
            host.default_input_device()
                .ok_or_else(|| VoiceError::DeviceUnavailable("no default input device".into()))
        }
    }

    /// List available input devices.
    ///
    /// # Errors
    ///
    /// Returns an error if devices cannot be enumerated.
    pub fn list_input_devices() -> Result<Vec<String>> {
        let names = cpal::default_host()
            .input_devices()
            .map_err(|e| VoiceError::Audio(format!("cannot enumerate devices: {e}")))?
            .filter_map(|device| device.description().ok())
            .map(|desc| desc.name().to_owned())
            .collect();
        Ok(names)
    }
}

impl AudioDevice for CpalInput {
    fn open_input_stream(
        &self,
        sample_rate: u32,
        channels: u16,
        frame_size: usize,
    ) -> Result<Box<dyn InputStream>> {
        if channels != 1 {
            return Err(VoiceError::DeviceUnavailable(format!(
                "only mono capture is supported, {channels} channels requested"
            )));
        }

        let device = self.resolve_device()?;
        let default_config = device
            .default_input_config()
            .map_err(|e| VoiceError::DeviceUnavailable(format!("no default input config: {e}")))?;

        let native_rate = default_config.sample_rate();
        let native_channels = default_config.channels();
        let stream_config = StreamConfig {
            channels: native_channels,
            sample_rate: native_rate,
            buffer_size: cpal::BufferSize::Default,
        };

        let converter = FrameConverter {
            channels: usize::from(native_channels.max(1)),
            step: f64::from(native_rate) / f64::from(sample_rate.max(1)),
        };
        let (tx, rx) = bounded::<Vec<i16>>(CHUNK_BUFFER);
        let overflow = Arc::new(AtomicU64::new(0));
        let overflow_cb = Arc::clone(&overflow);

        let stream = device
            .build_input_stream(
                &stream_config,
                move |data: &[f32], _info: &cpal::InputCallbackInfo| {
                    if tx.try_send(converter.convert(data)).is_err() {
                        overflow_cb.fetch_add(1, Ordering::Relaxed);
                    }
                },
                move |err| {
                    error!("audio input stream error: {err}");
                },
                None,
            )
            .map_err(|e| {
                VoiceError::DeviceUnavailable(format!("failed to build input stream: {e}"))
            })?;

        stream.play().map_err(|e| {
            VoiceError::DeviceUnavailable(format!("failed to start input stream: {e}"))
        })?;

        debug!(
            native_rate,
            native_channels, sample_rate, frame_size, "input stream opened"
        );

        Ok(Box::new(CpalStream {
            stream: Some(stream),
            rx,
            pending: VecDeque::with_capacity(frame_size * 2),
            read_timeout: self.read_timeout,
            overflow,
        }))
    }

    fn name(&self) -> String {
        match self.resolve_device() {
            Ok(device) => device
                .description()
                .map(|d| d.name().to_owned())
                .unwrap_or_else(|_| "<unknown>".into()),
            Err(_) => self
                .device_name
                .clone()
                .unwrap_or_else(|| "<default>".into()),
        }
    }
}

/// An open cpal input stream with a frame-assembling read side.
struct CpalStream {
    stream: Option<cpal::Stream>,
    rx: Receiver<Vec<i16>>,
    pending: VecDeque<i16>,
    read_timeout: Duration,
    overflow: Arc<AtomicU64>,
}

impl InputStream for CpalStream {
    fn read(&mut self, frame_size: usize) -> Result<Vec<i16>> {
        if self.stream.is_none() {
            return Err(VoiceError::Audio("read on closed stream".into()));
        }

        let deadline = Instant::now() + self.read_timeout;
        while self.pending.len() < frame_size {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.rx.recv_timeout(remaining) {
                Ok(chunk) => self.pending.extend(chunk),
                Err(RecvTimeoutError::Timeout) => {
                    return Err(VoiceError::Audio(format!(
                        "no audio within {}ms",
                        self.read_timeout.as_millis()
                    )));
                }
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(VoiceError::Audio("input stream disconnected".into()));
                }
            }
        }

        Ok(self.pending.drain(..frame_size).collect())
    }

    fn close(&mut self) {
        if let Some(stream) = self.stream.take() {
            if let Err(e) = stream.pause() {
                warn!("failed to pause input stream: {e}");
            }
            drop(stream);
            let dropped = self.overflow.load(Ordering::Relaxed);
            if dropped > 0 {
                info!(dropped, "input stream closed, overflowed chunks discarded");
            } else {
                debug!("input stream closed");
            }
        }
    }
}

impl Drop for CpalStream {
    fn drop(&mut self) {
        self.close();
    }
}

/// Turns one native callback buffer into decoder-ready samples: mono,
/// 16-bit, at the capture rate the stream was opened with.
///
/// Channels are averaged per interleaved frame and the capture rate is
/// reached by linear interpolation between neighbouring native frames.
/// No anti-alias filter is applied; speech energy sits well below the
/// 8kHz Nyquist limit of a 16kHz capture.
#[derive(Debug, Clone, Copy)]
struct FrameConverter {
    channels: usize,
    /// Native frames per output sample.
    step: f64,
}

impl FrameConverter {
    fn convert(&self, data: &[f32]) -> Vec<i16> {
        let native_frames = data.len() / self.channels;
        if native_frames == 0 {
            return Vec::new();
        }
        let mono_at = |frame: usize| -> f64 {
            let start = frame * self.channels;
            let sum: f32 = data[start..start + self.channels].iter().sum();
            f64::from(sum) / self.channels as f64
        };

        let out_len = (native_frames as f64 / self.step) as usize;
        (0..out_len)
            .map(|i| {
                let pos = i as f64 * self.step;
                let idx = (pos as usize).min(native_frames - 1);
                let frac = pos - idx as f64;
                let sample = if idx + 1 < native_frames {
                    mono_at(idx) * (1.0 - frac) + mono_at(idx + 1) * frac
                } else {
                    mono_at(idx)
                };
                f32_to_i16(sample as f32)
            })
            .collect()
    }
}
