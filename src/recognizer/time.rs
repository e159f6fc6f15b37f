//! Conversions between seconds and protobuf durations.

use prost_types::Duration;

use crate::config::audio::CHANNELS;
use crate::types::AudioEncoding;

const NANOS_PER_SECOND: i64 = 1_000_000_000;

/// Duration of `secs` seconds, rounded to the nanosecond.
pub fn duration_from_secs(secs: f64) -> Duration {
    let total = (secs * NANOS_PER_SECOND as f64).round() as i64;
    Duration {
        seconds: total.div_euclid(NANOS_PER_SECOND),
        nanos: total.rem_euclid(NANOS_PER_SECOND) as i32,
    }
}

/// Length of `duration` in seconds.
pub fn duration_to_secs(duration: &Duration) -> f64 {
    duration.seconds as f64 + duration.nanos as f64 / NANOS_PER_SECOND as f64
}

/// Sum of two durations.
pub fn add_duration(a: &Duration, b: &Duration) -> Duration {
    duration_from_secs(duration_to_secs(a) + duration_to_secs(b))
}

/// Seconds of audio in `audio_len` bytes.
///
/// Only mono audio is supported, so a frame is a single sample.
pub fn audio_duration_secs(audio_len: usize, encoding: AudioEncoding, sample_rate_hz: u32) -> f64 {
    if sample_rate_hz == 0 {
        return 0.0;
    }
    let bytes_per_frame = encoding.sample_size_in_bytes() * CHANNELS;
    let frames = audio_len as f64 / bytes_per_frame as f64;
    frames / sample_rate_hz as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fractional_seconds() {
        assert_eq!(duration_from_secs(4.4), Duration { seconds: 4, nanos: 400_000_000 });
        assert_eq!(duration_from_secs(6.0), Duration { seconds: 6, nanos: 0 });
        assert_eq!(duration_from_secs(0.0), Duration::default());
    }

    #[test]
    fn test_add_duration_rounds_float_error() {
        let total = add_duration(&duration_from_secs(3.4), &duration_from_secs(1.0));
        assert_eq!(total, Duration { seconds: 4, nanos: 400_000_000 });
    }

    #[test]
    fn test_audio_duration() {
        assert_eq!(audio_duration_secs(32000, AudioEncoding::Pcm, 16000), 1.0);
        assert_eq!(audio_duration_secs(4, AudioEncoding::Pcm, 8000), 0.00025);
        assert_eq!(audio_duration_secs(4, AudioEncoding::Pcm, 0), 0.0);
    }
}
