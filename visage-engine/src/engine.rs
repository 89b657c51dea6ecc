//! Engine state and cross-thread handle
//!
//! The tick domain (the host's per-frame callback) exclusively owns
//! `EngineState`; everything arriving from other threads - viseme events,
//! audio timing notifications, control commands - goes through the bounded
//! command channel held by `LipSyncEngine` and is drained at the start of
//! each tick. The tick never blocks and never panics: bad input is counted
//! and dropped, and the face keeps animating with whatever is known.

use std::sync::Arc;
use std::time::Instant;

use crossbeam_channel::{bounded, Receiver, Sender};
use parking_lot::RwLock;
use tracing::{debug, warn};
use visage_rig::{bind, BindError, ChannelInventory, ChannelTable, NamingConvention, VisemeClass};

use crate::blend::{BlendEngine, BlendPhase};
use crate::clock::{ClockSync, TimingSample};
use crate::config::EngineConfig;
use crate::queue::{EventQueue, VisemeEvent};

/// A viseme event as delivered by the transport, before validation.
#[derive(Debug, Clone)]
pub struct VisemePayload {
    /// Phoneme-class id; unknown values are dropped as malformed.
    pub viseme_id: i64,
    /// Offset on the remote audio-authoring clock, in ms.
    pub audio_offset_ms: f64,
    /// Utterance the event belongs to.
    pub utterance_id: String,
    /// Speaker the event belongs to.
    pub speaker_id: String,
}

/// An audio-scheduling notification as delivered by the playback pipeline.
#[derive(Debug, Clone, Copy)]
pub struct TimingPayload {
    pub server_timestamp_ms: f64,
    pub client_timestamp_ms: f64,
    pub scheduled_playback_ms: f64,
    pub duration_ms: f64,
    pub lead_time_ms: f64,
}

impl From<TimingPayload> for TimingSample {
    fn from(p: TimingPayload) -> Self {
        TimingSample {
            server_ms: p.server_timestamp_ms,
            client_ms: p.client_timestamp_ms,
            playback_start_ms: p.scheduled_playback_ms,
            duration_ms: p.duration_ms,
            lead_ms: p.lead_time_ms,
        }
    }
}

/// Commands sent to the engine's tick domain.
#[derive(Debug, Clone)]
pub enum LipSyncCommand {
    /// An inbound viseme event.
    Viseme(VisemePayload),
    /// An inbound audio timing notification.
    AudioScheduled(TimingPayload),
    /// Enable or disable facial animation.
    SetEnabled(bool),
    /// Abort the current utterance and decay to silence.
    Silence,
    /// Change the animation lead time, in ms.
    SetLeadTime(f64),
}

/// Diagnostic counters. Faults inside the tick domain are counted here,
/// never raised.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncStats {
    /// Events with an unknown class id or non-finite offset.
    pub malformed: u64,
    /// Events filtered out by the speaker check.
    pub wrong_speaker: u64,
    /// Events discarded while the engine was disabled.
    pub dropped_disabled: u64,
    /// Events queued without a deadline (no clock sample yet).
    pub held_unscheduled: u64,
    /// Events dropped by queue overflow eviction.
    pub evicted: u64,
    /// Due events skipped by burst coalescing.
    pub skipped_stale: u64,
    /// Consumed events whose class has no channel on this rig.
    pub no_effect: u64,
    /// Garbled timing samples ignored.
    pub rejected_timing: u64,
}

/// Snapshot of the queue and blend state for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QueueStatus {
    pub length: usize,
    pub phase: BlendPhase,
    pub next_deadline_ms: Option<f64>,
}

/// Handle for threads outside the tick domain.
///
/// All sends are fire-and-forget: a full channel drops the command rather
/// than blocking the sender.
#[derive(Debug, Clone)]
pub struct LipSyncEngine {
    command_tx: Sender<LipSyncCommand>,
}

impl LipSyncEngine {
    /// Create the command channel pair.
    /// Buffer size of 1024 provides headroom for event bursts without saturation.
    pub fn create_channels() -> (Sender<LipSyncCommand>, Receiver<LipSyncCommand>) {
        bounded(1024)
    }

    /// Create a new engine handle.
    pub fn new(command_tx: Sender<LipSyncCommand>) -> Self {
        Self { command_tx }
    }

    /// Send a command. Returns false if the channel was full.
    pub fn send(&self, cmd: LipSyncCommand) -> bool {
        self.command_tx.try_send(cmd).is_ok()
    }

    /// Forward a viseme event.
    pub fn viseme(&self, payload: VisemePayload) -> bool {
        self.send(LipSyncCommand::Viseme(payload))
    }

    /// Forward an audio timing notification.
    pub fn audio_scheduled(&self, payload: TimingPayload) -> bool {
        self.send(LipSyncCommand::AudioScheduled(payload))
    }

    pub fn set_enabled(&self, enabled: bool) -> bool {
        self.send(LipSyncCommand::SetEnabled(enabled))
    }

    pub fn set_silence(&self) -> bool {
        self.send(LipSyncCommand::Silence)
    }

    pub fn set_lead_time(&self, ms: f64) -> bool {
        self.send(LipSyncCommand::SetLeadTime(ms))
    }
}

/// Lip-sync engine state, owned by the tick domain.
pub struct EngineState {
    /// Channel table shared with the render step (it reads, we write).
    table: Arc<RwLock<ChannelTable>>,
    /// Slot for each viseme class under the bound convention.
    class_slots: [Option<usize>; VisemeClass::COUNT],
    convention: NamingConvention,

    clock: ClockSync,
    queue: EventQueue,
    blend: BlendEngine,

    command_rx: Receiver<LipSyncCommand>,
    config: EngineConfig,
    enabled: bool,

    /// Monotonic reference for the convenience `tick()` entry point.
    epoch: Instant,
    /// Time of the most recent tick, on the caller's clock.
    last_now_ms: f64,
    /// Sequence counter for event ids.
    seq: u64,
    stats: SyncStats,
}

impl EngineState {
    /// Bind an avatar's channel inventory and build the engine around it.
    pub fn bind(
        inventories: &[ChannelInventory],
        config: EngineConfig,
        command_rx: Receiver<LipSyncCommand>,
    ) -> Result<Self, BindError> {
        let binding = bind(inventories)?;
        debug!(
            convention = ?binding.convention,
            channels = binding.table.len(),
            "lip sync bound"
        );

        let blend = BlendEngine::new(binding.silence_slot(), &config);
        let queue = EventQueue::new(config.queue_capacity, config.eviction_fraction);
        let mut clock = ClockSync::new();
        clock.set_lead_time(config.lead_ms);

        Ok(Self {
            table: Arc::new(RwLock::new(binding.table)),
            class_slots: binding.class_slots,
            convention: binding.convention,
            clock,
            queue,
            blend,
            command_rx,
            config,
            enabled: true,
            epoch: Instant::now(),
            last_now_ms: 0.0,
            seq: 0,
            stats: SyncStats::default(),
        })
    }

    /// Shared handle to the channel table for the render step.
    pub fn table(&self) -> Arc<RwLock<ChannelTable>> {
        self.table.clone()
    }

    /// Naming convention selected at bind time.
    pub fn convention(&self) -> NamingConvention {
        self.convention
    }

    /// Advance one frame using the internal monotonic clock.
    ///
    /// Hosts whose audio pipeline reports playback times on its own clock
    /// should call `tick_at` with that clock instead, so deadlines and
    /// frame times share a timebase.
    pub fn tick(&mut self) {
        let now_ms = self.epoch.elapsed().as_secs_f64() * 1000.0;
        self.tick_at(now_ms);
    }

    /// Advance one frame at an explicit time in ms. Total: drains pending
    /// commands, advances the blend, writes the table; never blocks or
    /// panics.
    pub fn tick_at(&mut self, now_ms: f64) {
        self.last_now_ms = now_ms;

        // Drain cross-thread input without waiting on the network.
        while let Ok(cmd) = self.command_rx.try_recv() {
            self.handle_command(cmd);
        }

        if !self.enabled && self.blend.phase() == BlendPhase::Idle {
            return;
        }

        let table = self.table.clone();
        let mut table = table.write();
        match self.blend.phase() {
            BlendPhase::Idle => {
                self.start_next_due(&mut table, now_ms);
            }
            BlendPhase::Transitioning => {
                self.blend.advance(&mut table, now_ms);
            }
            BlendPhase::Holding => {
                if self.blend.phase_elapsed(now_ms) >= self.blend.hold_ms()
                    && !self.start_next_due(&mut table, now_ms)
                {
                    self.blend.begin_decay(&mut table, now_ms);
                }
            }
            BlendPhase::Decaying => {
                // A new utterance may preempt the decay; it is not a
                // viseme-to-viseme transition.
                if !self.start_next_due(&mut table, now_ms) {
                    self.blend.advance(&mut table, now_ms);
                }
            }
        }
    }

    /// Process a command.
    pub fn handle_command(&mut self, cmd: LipSyncCommand) {
        match cmd {
            LipSyncCommand::Viseme(payload) => self.ingest_viseme(payload),
            LipSyncCommand::AudioScheduled(payload) => self.audio_scheduled(payload),
            LipSyncCommand::SetEnabled(enabled) => self.set_enabled(enabled),
            LipSyncCommand::Silence => self.set_silence(),
            LipSyncCommand::SetLeadTime(ms) => self.set_lead_time(ms),
        }
    }

    /// Accept a timing notification and reschedule everything queued.
    pub fn audio_scheduled(&mut self, payload: TimingPayload) {
        if self.clock.on_audio_scheduled(payload.into()) {
            self.queue.reschedule_all(&self.clock);
        }
    }

    /// Enable or disable facial animation. Disabling decays to silence;
    /// timing samples are still accepted while disabled so a re-enable
    /// resynchronizes instantly.
    pub fn set_enabled(&mut self, enabled: bool) {
        if self.enabled && !enabled {
            self.set_silence();
        }
        self.enabled = enabled;
    }

    /// Immediate reset: clear the queue and decay to silence from whatever
    /// the blend is doing, regardless of phase.
    pub fn set_silence(&mut self) {
        self.queue.clear();
        let table = self.table.clone();
        let mut table = table.write();
        self.blend.begin_decay(&mut table, self.last_now_ms);
    }

    /// Change the animation lead time and reschedule queued events.
    pub fn set_lead_time(&mut self, ms: f64) {
        self.clock.set_lead_time(ms);
        self.queue.reschedule_all(&self.clock);
    }

    /// Queue and blend snapshot for diagnostics.
    pub fn queue_status(&self) -> QueueStatus {
        QueueStatus {
            length: self.queue.len(),
            phase: self.blend.phase(),
            next_deadline_ms: self.queue.next_deadline(),
        }
    }

    /// Diagnostic counters.
    pub fn stats(&self) -> SyncStats {
        let mut stats = self.stats;
        stats.evicted = self.queue.evicted();
        stats.skipped_stale = self.queue.skipped_stale();
        stats.rejected_timing = self.clock.rejected_samples();
        stats
    }

    /// Validate and enqueue one viseme payload.
    fn ingest_viseme(&mut self, payload: VisemePayload) {
        if !self.enabled {
            self.stats.dropped_disabled += 1;
            return;
        }

        if self.config.target_speaker != "*" && payload.speaker_id != self.config.target_speaker {
            self.stats.wrong_speaker += 1;
            return;
        }

        let Some(class) = VisemeClass::from_id(payload.viseme_id) else {
            self.stats.malformed += 1;
            warn!(id = payload.viseme_id, "dropping event with unknown viseme id");
            return;
        };
        if !payload.audio_offset_ms.is_finite() {
            self.stats.malformed += 1;
            warn!("dropping event with non-finite audio offset");
            return;
        }

        let deadline_ms = self.clock.to_local_deadline(payload.audio_offset_ms);
        if deadline_ms.is_none() {
            self.stats.held_unscheduled += 1;
        }

        self.seq += 1;
        self.queue.push(VisemeEvent {
            id: format!("{}#{}", payload.utterance_id, self.seq),
            class,
            authoring_ms: payload.audio_offset_ms,
            deadline_ms,
            utterance: payload.utterance_id,
        });
    }

    /// Pop the freshest due event and start blending toward it. Returns
    /// false when nothing was due or the event has no channel on this rig.
    fn start_next_due(&mut self, table: &mut ChannelTable, now_ms: f64) -> bool {
        let Some(event) = self.queue.pop_latest_due(now_ms) else {
            return false;
        };
        match self.class_slots[event.class as usize] {
            Some(slot) => {
                self.blend.begin_transition(table, now_ms, slot);
                true
            }
            None => {
                // The convention cannot express this class; consume the
                // event with no facial effect.
                self.stats.no_effect += 1;
                false
            }
        }
    }
}
