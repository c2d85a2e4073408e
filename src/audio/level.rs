//! Frame level metering and sample conversion.

/// Peak absolute amplitude of a frame.
pub fn peak(frame: &[i16]) -> u16 {
    frame.iter().map(|s| s.unsigned_abs()).max().unwrap_or(0)
}

/// Zero `frame` if its peak is below `threshold`.
///
/// Returns `true` if the frame was silenced.
pub fn apply_noise_gate(frame: &mut [i16], threshold: u16) -> bool {
    if peak(frame) >= threshold {
        return false;
    }
    frame.fill(0);
    true
}

/// Convert a float sample in `[-1.0, 1.0]` to 16-bit PCM.
pub fn f32_to_i16(sample: f32) -> i16 {
    (sample * 32767.0).clamp(-32768.0, 32767.0) as i16
}
