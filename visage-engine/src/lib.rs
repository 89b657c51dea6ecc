//! Playback engine for Visage
//!
//! Converts the speech service's viseme event stream into per-frame
//! morph-target intensities: clock synchronization, a bounded deadline
//! queue, and the transition/hold/decay blend state machine.

mod blend;
mod clock;
mod config;
mod engine;
mod queue;

pub use blend::{BlendEngine, BlendPhase};
pub use clock::{ClockSync, TimingSample};
pub use config::EngineConfig;
pub use engine::{
    EngineState, LipSyncCommand, LipSyncEngine, QueueStatus, SyncStats, TimingPayload,
    VisemePayload,
};
pub use queue::{EventQueue, VisemeEvent};
