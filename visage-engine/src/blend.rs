//! Blend state machine - transition, hold, decay
//!
//! Advances the face from the currently-applied channel toward the next
//! viseme's channel with an eased cross-fade, holds it, and decays back to
//! the silence pose between utterances. Every state change writes channel
//! intensities immediately so the render step always sees current values.

use visage_rig::ChannelTable;

use crate::config::EngineConfig;

/// Phase of the blend state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BlendPhase {
    /// Nothing playing; the face rests at the settled pose.
    #[default]
    Idle,
    /// Cross-fading from the previous channel to the target channel.
    Transitioning,
    /// Target channel held at full intensity.
    Holding,
    /// Cross-fading back to the silence channel.
    Decaying,
}

/// Smoothstep ease: t*t*(3 - 2t), clamped to [0, 1].
#[inline]
fn smoothstep(t: f64) -> f32 {
    let t = t.clamp(0.0, 1.0);
    (t * t * (3.0 - 2.0 * t)) as f32
}

/// Per-avatar blend state.
///
/// Mutated only from the tick domain. Elapsed time comes from the caller's
/// monotonic clock milliseconds, never wall time.
#[derive(Debug)]
pub struct BlendEngine {
    phase: BlendPhase,
    phase_start_ms: f64,

    /// Channel fading out and its intensity when the blend started.
    from_slot: Option<usize>,
    from_intensity: f32,
    /// Channel fading in and its intensity at blend completion.
    to_slot: Option<usize>,
    to_intensity: f32,
    /// Ease value written on the most recent advance.
    last_eased: f32,

    /// Pose after the last completed blend.
    settled_slot: Option<usize>,
    settled_intensity: f32,

    /// Channel representing silence, if the rig has one.
    silence_slot: Option<usize>,

    transition_ms: f64,
    hold_ms: f64,
    decay_ms: f64,
    rest_intensity: f32,
}

impl BlendEngine {
    pub fn new(silence_slot: Option<usize>, config: &EngineConfig) -> Self {
        Self {
            phase: BlendPhase::Idle,
            phase_start_ms: 0.0,
            from_slot: None,
            from_intensity: 0.0,
            to_slot: None,
            to_intensity: 0.0,
            last_eased: 1.0,
            settled_slot: None,
            settled_intensity: 0.0,
            silence_slot,
            transition_ms: config.transition_ms,
            hold_ms: config.hold_ms,
            decay_ms: config.decay_ms,
            rest_intensity: config.rest_intensity,
        }
    }

    /// Current phase.
    pub fn phase(&self) -> BlendPhase {
        self.phase
    }

    /// Milliseconds spent in the current phase.
    pub fn phase_elapsed(&self, now_ms: f64) -> f64 {
        (now_ms - self.phase_start_ms).max(0.0)
    }

    /// Hold window length in ms.
    pub fn hold_ms(&self) -> f64 {
        self.hold_ms
    }

    /// Start a cross-fade toward `slot` at full intensity.
    pub fn begin_transition(&mut self, table: &mut ChannelTable, now_ms: f64, slot: usize) {
        self.begin_blend(table, now_ms, Some(slot), 1.0, BlendPhase::Transitioning);
    }

    /// Start the decay toward the silence pose, from whatever is currently
    /// visible and regardless of the current phase.
    pub fn begin_decay(&mut self, table: &mut ChannelTable, now_ms: f64) {
        self.begin_blend(
            table,
            now_ms,
            self.silence_slot,
            if self.silence_slot.is_some() {
                self.rest_intensity
            } else {
                0.0
            },
            BlendPhase::Decaying,
        );
    }

    /// Advance an in-flight blend. No-op in Idle and Holding.
    pub fn advance(&mut self, table: &mut ChannelTable, now_ms: f64) {
        let (window, next) = match self.phase {
            BlendPhase::Transitioning => (self.transition_ms, BlendPhase::Holding),
            BlendPhase::Decaying => (self.decay_ms, BlendPhase::Idle),
            BlendPhase::Idle | BlendPhase::Holding => return,
        };

        let t = if window <= 0.0 {
            1.0
        } else {
            self.phase_elapsed(now_ms) / window
        };
        let eased = smoothstep(t);
        self.last_eased = eased;
        self.write_blend(table, eased);

        if t >= 1.0 {
            self.settled_slot = self.to_slot;
            self.settled_intensity = self.to_intensity;
            self.from_slot = self.to_slot;
            self.from_intensity = self.to_intensity;
            self.phase = next;
            self.phase_start_ms = now_ms;
        }
    }

    fn begin_blend(
        &mut self,
        table: &mut ChannelTable,
        now_ms: f64,
        to_slot: Option<usize>,
        to_intensity: f32,
        phase: BlendPhase,
    ) {
        let (from_slot, from_intensity) = self.visible();

        // A preempted blend can leave a third channel partially raised;
        // release anything that is neither endpoint of the new blend.
        for slot in [self.from_slot, self.to_slot, self.settled_slot]
            .into_iter()
            .flatten()
        {
            if Some(slot) != from_slot && Some(slot) != to_slot {
                table.set_intensity(slot, 0.0);
            }
        }

        self.from_slot = from_slot;
        self.from_intensity = from_intensity;
        self.to_slot = to_slot;
        self.to_intensity = to_intensity.clamp(0.0, 1.0);
        self.phase = phase;
        self.phase_start_ms = now_ms;
        self.last_eased = 0.0;
        self.write_blend(table, 0.0);
    }

    /// The dominant on-screen channel right now, used as the starting
    /// point when a new blend preempts an unfinished one.
    fn visible(&self) -> (Option<usize>, f32) {
        match self.phase {
            BlendPhase::Transitioning | BlendPhase::Decaying => {
                let outgoing = self.from_intensity * (1.0 - self.last_eased);
                let incoming = self.to_intensity * self.last_eased;
                if incoming >= outgoing {
                    (self.to_slot, incoming)
                } else {
                    (self.from_slot, outgoing)
                }
            }
            BlendPhase::Idle | BlendPhase::Holding => (self.settled_slot, self.settled_intensity),
        }
    }

    /// Write both endpoints of the blend at ease position `eased`. The
    /// outgoing channel falls as the incoming one rises, so both may be
    /// non-zero mid-blend.
    fn write_blend(&self, table: &mut ChannelTable, eased: f32) {
        match (self.from_slot, self.to_slot) {
            (Some(from), Some(to)) if from == to => {
                let v = self.from_intensity + (self.to_intensity - self.from_intensity) * eased;
                table.set_intensity(from, v);
            }
            (from, to) => {
                if let Some(from) = from {
                    table.set_intensity(from, self.from_intensity * (1.0 - eased));
                }
                if let Some(to) = to {
                    table.set_intensity(to, self.to_intensity * eased);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SIL: usize = 0;
    const AA: usize = 1;
    const PP: usize = 2;

    fn table() -> ChannelTable {
        ChannelTable::new([
            ("viseme_sil".to_string(), 0),
            ("viseme_aa".to_string(), 1),
            ("viseme_PP".to_string(), 2),
        ])
    }

    fn engine() -> BlendEngine {
        BlendEngine::new(Some(SIL), &EngineConfig::default())
    }

    fn assert_in_range(t: &ChannelTable) {
        for (_, intensity) in t.iter() {
            assert!((0.0..=1.0).contains(&intensity), "intensity {intensity} out of range");
        }
    }

    #[test]
    fn test_smoothstep_shape() {
        assert_eq!(smoothstep(0.0), 0.0);
        assert_eq!(smoothstep(1.0), 1.0);
        assert!((smoothstep(0.5) - 0.5).abs() < 1e-6);
        // Clamped outside the window.
        assert_eq!(smoothstep(-1.0), 0.0);
        assert_eq!(smoothstep(2.0), 1.0);
    }

    #[test]
    fn test_transition_completes_to_holding() {
        let mut t = table();
        let mut b = engine();

        b.begin_transition(&mut t, 0.0, AA);
        assert_eq!(b.phase(), BlendPhase::Transitioning);
        assert_eq!(t.intensity(AA), 0.0);

        b.advance(&mut t, 30.0); // halfway through the 60ms window
        assert!((t.intensity(AA) - 0.5).abs() < 1e-3);
        assert_in_range(&t);

        b.advance(&mut t, 60.0);
        assert_eq!(b.phase(), BlendPhase::Holding);
        assert_eq!(t.intensity(AA), 1.0);
    }

    #[test]
    fn test_cross_fade_is_symmetric() {
        let mut t = table();
        let mut b = engine();

        b.begin_transition(&mut t, 0.0, AA);
        b.advance(&mut t, 60.0);

        // Second viseme: AA fades out while PP fades in.
        b.begin_transition(&mut t, 100.0, PP);
        b.advance(&mut t, 130.0);
        let out = t.intensity(AA);
        let inn = t.intensity(PP);
        assert!(out > 0.0 && inn > 0.0, "both channels active mid-blend");
        assert!((out - 0.5).abs() < 1e-3);
        assert!((inn - 0.5).abs() < 1e-3);
        assert_in_range(&t);

        b.advance(&mut t, 160.0);
        assert_eq!(t.intensity(AA), 0.0);
        assert_eq!(t.intensity(PP), 1.0);
    }

    #[test]
    fn test_decay_settles_at_rest_intensity() {
        let mut t = table();
        let mut b = engine();

        b.begin_transition(&mut t, 0.0, AA);
        b.advance(&mut t, 60.0);
        b.begin_decay(&mut t, 200.0);
        assert_eq!(b.phase(), BlendPhase::Decaying);

        b.advance(&mut t, 200.0 + 120.0);
        assert_eq!(b.phase(), BlendPhase::Idle);
        assert_eq!(t.intensity(AA), 0.0);
        assert!((t.intensity(SIL) - 0.1).abs() < 1e-3);
    }

    #[test]
    fn test_decay_mid_transition_starts_from_visible() {
        let mut t = table();
        let mut b = engine();

        b.begin_transition(&mut t, 0.0, AA);
        b.advance(&mut t, 45.0); // eased past halfway; AA dominates

        b.begin_decay(&mut t, 45.0);
        assert_eq!(b.phase(), BlendPhase::Decaying);
        assert_in_range(&t);

        // Decay finishes at the rest pose without snapping.
        for step in 1..=12 {
            b.advance(&mut t, 45.0 + step as f64 * 10.0);
            assert_in_range(&t);
        }
        assert_eq!(b.phase(), BlendPhase::Idle);
        assert!((t.intensity(SIL) - 0.1).abs() < 1e-3);
        assert_eq!(t.intensity(AA), 0.0);
    }

    #[test]
    fn test_preemption_releases_orphaned_channels() {
        let mut t = table();
        let mut b = engine();

        b.begin_transition(&mut t, 0.0, AA);
        b.advance(&mut t, 60.0);
        b.begin_transition(&mut t, 100.0, PP);
        b.advance(&mut t, 130.0); // AA and PP both partially raised

        // New blend only involves PP and SIL; AA must be released.
        b.begin_decay(&mut t, 130.0);
        assert_eq!(t.intensity(AA), 0.0);
        assert_in_range(&t);
    }

    #[test]
    fn test_repeated_viseme_blends_on_one_channel() {
        let mut t = table();
        let mut b = engine();

        b.begin_transition(&mut t, 0.0, AA);
        b.advance(&mut t, 60.0);
        b.begin_transition(&mut t, 100.0, AA);
        b.advance(&mut t, 130.0);
        // Same channel in and out: stays at full, no dip.
        assert_eq!(t.intensity(AA), 1.0);
    }

    #[test]
    fn test_no_silence_channel_decays_to_zero() {
        let mut t = table();
        let mut b = BlendEngine::new(None, &EngineConfig::default());

        b.begin_transition(&mut t, 0.0, AA);
        b.advance(&mut t, 60.0);
        b.begin_decay(&mut t, 100.0);
        b.advance(&mut t, 100.0 + 120.0);
        assert_eq!(b.phase(), BlendPhase::Idle);
        assert!(t.iter().all(|(_, i)| i == 0.0));
    }

    #[test]
    fn test_intensities_always_in_range() {
        let mut t = table();
        let mut b = engine();
        let mut now = 0.0;

        for slot in [AA, PP, AA, SIL, PP] {
            b.begin_transition(&mut t, now, slot);
            for _ in 0..10 {
                now += 7.0;
                b.advance(&mut t, now);
                assert_in_range(&t);
            }
        }
        b.begin_decay(&mut t, now);
        for _ in 0..20 {
            now += 16.0;
            b.advance(&mut t, now);
            assert_in_range(&t);
        }
    }
}
