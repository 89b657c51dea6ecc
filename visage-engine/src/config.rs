//! Engine tuning parameters
//!
//! Purely in-memory, injected at bind time. There is no persisted
//! configuration: every session starts from these values.

/// Tunable parameters for the playback engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Maximum number of queued viseme events.
    pub queue_capacity: usize,
    /// Fraction of the queue evicted (oldest first) when a push overflows.
    pub eviction_fraction: f32,
    /// Blend window between two visemes, in ms.
    pub transition_ms: f64,
    /// How long a viseme is held at full intensity, in ms.
    pub hold_ms: f64,
    /// Blend window back to silence, in ms.
    pub decay_ms: f64,
    /// Resting intensity of the silence channel. Slightly above zero keeps
    /// the mouth looking naturally closed rather than collapsed.
    pub rest_intensity: f32,
    /// How far mouth motion leads the audio, in ms.
    pub lead_ms: f64,
    /// Only events from this speaker are animated; "*" accepts any.
    pub target_speaker: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 120,
            eviction_fraction: 0.5,
            transition_ms: 60.0,
            hold_ms: 90.0,
            decay_ms: 120.0,
            rest_intensity: 0.1,
            lead_ms: 50.0,
            target_speaker: "*".to_string(),
        }
    }
}

impl EngineConfig {
    /// Set the queue capacity (at least 2).
    pub fn set_queue_capacity(&mut self, capacity: usize) {
        self.queue_capacity = capacity.max(2);
    }

    /// Set the overflow eviction fraction (0.1 - 0.9).
    pub fn set_eviction_fraction(&mut self, fraction: f32) {
        self.eviction_fraction = fraction.clamp(0.1, 0.9);
    }

    /// Set the transition window in ms (5 - 500).
    pub fn set_transition_ms(&mut self, ms: f64) {
        self.transition_ms = ms.clamp(5.0, 500.0);
    }

    /// Set the hold window in ms (0 - 1000).
    pub fn set_hold_ms(&mut self, ms: f64) {
        self.hold_ms = ms.clamp(0.0, 1000.0);
    }

    /// Set the decay window in ms (5 - 1000).
    pub fn set_decay_ms(&mut self, ms: f64) {
        self.decay_ms = ms.clamp(5.0, 1000.0);
    }

    /// Set the resting intensity (0.0 - 0.5).
    pub fn set_rest_intensity(&mut self, intensity: f32) {
        self.rest_intensity = intensity.clamp(0.0, 0.5);
    }

    /// Set the animation lead time in ms (0 - 500).
    pub fn set_lead_ms(&mut self, ms: f64) {
        self.lead_ms = ms.clamp(0.0, 500.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_sane() {
        let config = EngineConfig::default();
        assert!(config.queue_capacity >= 2);
        assert!(config.transition_ms > 0.0);
        assert!((0.0..=0.5).contains(&config.rest_intensity));
        assert_eq!(config.target_speaker, "*");
    }

    #[test]
    fn test_setters_clamp() {
        let mut config = EngineConfig::default();
        config.set_queue_capacity(0);
        assert_eq!(config.queue_capacity, 2);
        config.set_eviction_fraction(2.0);
        assert_eq!(config.eviction_fraction, 0.9);
        config.set_transition_ms(0.0);
        assert_eq!(config.transition_ms, 5.0);
        config.set_lead_ms(-10.0);
        assert_eq!(config.lead_ms, 0.0);
        config.set_rest_intensity(0.9);
        assert_eq!(config.rest_intensity, 0.5);
    }
}
