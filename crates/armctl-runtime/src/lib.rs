//! `armctl-runtime` – the live control loop of the arm.
//!
//! Everything here runs on Tokio. The pieces are independent handles wired
//! together by [`ArmSession`][session::ArmSession]:
//!
//! # Modules
//!
//! - [`synchronizer`] – [`PoseSynchronizer`][synchronizer::PoseSynchronizer]:
//!   sole owner of the committed pose, the preview and the interaction lock.
//!   Lock ownership decides which of the operator, the hardware or playback
//!   may write the committed pose.
//! - [`dispatcher`] – [`CommandDispatcher`][dispatcher::CommandDispatcher]:
//!   trailing-debounce queue in front of the actuation service. Only the last
//!   command of a burst is sent; failures are counted and logged, never
//!   retried.
//! - [`sequence`] – [`SequenceRecorder`][sequence::SequenceRecorder] and
//!   [`SequencePlayer`][sequence::SequencePlayer]: record the active pose as
//!   steps and replay a stored sequence under the lock, cancellable between
//!   steps.
//! - [`render`] – [`PoseRenderer`][render::PoseRenderer]: read-only consumer
//!   of synchronizer snapshots.
//! - [`session`] – [`ArmSession`][session::ArmSession]: the operator
//!   workflow (targets, jogging, gripper, recording, library, playback).
//! - [`telemetry`] – [`init_tracing`][telemetry::init_tracing]: process-wide
//!   `tracing` subscriber with optional OTLP export.

pub mod dispatcher;
pub mod render;
pub mod sequence;
pub mod session;
pub mod synchronizer;
pub mod telemetry;

#[cfg(test)]
mod testing;

pub use dispatcher::{CommandDispatcher, DispatchStats, DispatcherConfig, PoseCommand};
pub use render::{PoseRenderer, TracingRenderer, spawn_renderer};
pub use sequence::{
    PlaybackConfig, PlaybackEvent, PlaybackHandle, PlaybackOutcome, PlaybackReport,
    SequencePlayer, SequenceRecorder,
};
pub use session::{ArmSession, Axis, SessionConfig, SessionStatus};
pub use synchronizer::{PoseSynchronizer, PromoteOutcome, PushOutcome, SyncPhase, SyncSnapshot};
pub use telemetry::{LogFormat, TracerProviderGuard, init_tracing};
