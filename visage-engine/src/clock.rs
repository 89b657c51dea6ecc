//! Clock synchronization between the speech service and local playback
//!
//! Viseme events carry timestamps on the remote audio-authoring clock.
//! Each time the audio pipeline schedules a chunk for playback it reports
//! how that remote clock relates to the local one; this module keeps the
//! most recent of those samples and converts authoring timestamps into
//! local deadlines, pulled forward by the configured lead time so mouth
//! motion lands slightly before the sound.

use tracing::warn;

/// One timing notification from the audio-playback pipeline.
///
/// Replaced wholesale on every notification - samples are never merged or
/// averaged, the latest one simply wins.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimingSample {
    /// Remote authoring-clock timestamp of the scheduled chunk, in ms.
    pub server_ms: f64,
    /// Local wall-clock timestamp when the notification arrived, in ms.
    pub client_ms: f64,
    /// Local playback-clock instant the chunk will start sounding, in ms.
    pub playback_start_ms: f64,
    /// Duration of the scheduled chunk, in ms.
    pub duration_ms: f64,
    /// Lead time requested by the pipeline, in ms.
    pub lead_ms: f64,
}

impl TimingSample {
    /// A sample with any non-finite field would poison every deadline
    /// computed from it.
    fn is_well_formed(&self) -> bool {
        self.server_ms.is_finite()
            && self.client_ms.is_finite()
            && self.playback_start_ms.is_finite()
            && self.duration_ms.is_finite()
            && self.lead_ms.is_finite()
            && self.lead_ms >= 0.0
    }
}

/// Holds the latest timing sample and maps authoring time to local time.
#[derive(Debug, Default)]
pub struct ClockSync {
    sample: Option<TimingSample>,
    /// Overrides the sample's lead time when set via the control surface.
    lead_override_ms: Option<f64>,
    rejected: u64,
}

impl ClockSync {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accept a new timing sample, replacing the previous one.
    ///
    /// Garbled samples are logged and ignored; the held sample is never
    /// corrupted. Returns whether the sample was accepted (callers must
    /// reschedule queued events after an accepted sample).
    pub fn on_audio_scheduled(&mut self, sample: TimingSample) -> bool {
        if !sample.is_well_formed() {
            self.rejected += 1;
            warn!(?sample, "ignoring garbled timing sample");
            return false;
        }
        self.sample = Some(sample);
        true
    }

    /// Convert an authoring timestamp into a local playback deadline.
    ///
    /// Returns None until the first sample arrives - events must be held
    /// unscheduled rather than fired immediately at time zero.
    pub fn to_local_deadline(&self, authoring_ms: f64) -> Option<f64> {
        let sample = self.sample.as_ref()?;
        if !authoring_ms.is_finite() {
            return None;
        }
        let lead = self.lead_override_ms.unwrap_or(sample.lead_ms);
        Some(sample.playback_start_ms + (authoring_ms - sample.server_ms) - lead)
    }

    /// Override the lead time from the control surface (0 - 500 ms).
    pub fn set_lead_time(&mut self, ms: f64) {
        if ms.is_finite() {
            self.lead_override_ms = Some(ms.clamp(0.0, 500.0));
        }
    }

    /// True once at least one sample has been accepted.
    pub fn has_sample(&self) -> bool {
        self.sample.is_some()
    }

    /// Number of garbled samples dropped so far.
    pub fn rejected_samples(&self) -> u64 {
        self.rejected
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> TimingSample {
        TimingSample {
            server_ms: 1000.0,
            client_ms: 900.0,
            playback_start_ms: 2000.0,
            duration_ms: 400.0,
            lead_ms: 50.0,
        }
    }

    #[test]
    fn test_unscheduled_before_first_sample() {
        let clock = ClockSync::new();
        assert!(!clock.has_sample());
        assert_eq!(clock.to_local_deadline(1100.0), None);
    }

    #[test]
    fn test_deadline_formula() {
        let mut clock = ClockSync::new();
        assert!(clock.on_audio_scheduled(sample()));
        // playback_start + (authoring - server) - lead = 2000 + 100 - 50
        assert_eq!(clock.to_local_deadline(1100.0), Some(2050.0));
    }

    #[test]
    fn test_deadline_is_idempotent() {
        let mut clock = ClockSync::new();
        clock.on_audio_scheduled(sample());
        assert_eq!(clock.to_local_deadline(1234.5), clock.to_local_deadline(1234.5));
    }

    #[test]
    fn test_last_sample_wins() {
        let mut clock = ClockSync::new();
        clock.on_audio_scheduled(sample());
        let mut later = sample();
        later.playback_start_ms = 5000.0;
        later.server_ms = 4000.0;
        clock.on_audio_scheduled(later);
        assert_eq!(clock.to_local_deadline(4100.0), Some(5050.0));
    }

    #[test]
    fn test_garbled_sample_is_ignored() {
        let mut clock = ClockSync::new();
        clock.on_audio_scheduled(sample());

        let mut bad = sample();
        bad.playback_start_ms = f64::NAN;
        assert!(!clock.on_audio_scheduled(bad));
        assert_eq!(clock.rejected_samples(), 1);
        // The held sample survives intact.
        assert_eq!(clock.to_local_deadline(1100.0), Some(2050.0));
    }

    #[test]
    fn test_lead_override() {
        let mut clock = ClockSync::new();
        clock.on_audio_scheduled(sample());
        clock.set_lead_time(100.0);
        assert_eq!(clock.to_local_deadline(1100.0), Some(2000.0));
        // New samples keep respecting the override.
        clock.on_audio_scheduled(sample());
        assert_eq!(clock.to_local_deadline(1100.0), Some(2000.0));
    }
}
