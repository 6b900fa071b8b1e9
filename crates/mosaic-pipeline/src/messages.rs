//! Typed channel vocabulary between the pipeline actors.
//!
//! Payloads are transferred, never shared: a sender must not touch a
//! message after sending it.

use mosaic_core::{OpaqueFrame, VisualUnit};

/// Input events accepted by the router actor.
#[derive(Debug)]
pub enum SourceEvent {
    /// A decoded frame to fan out to every lane (opaque-frame sources).
    Unit(OpaqueFrame),
    /// Start of a new composite round for lane-local source kinds; no bulk
    /// data moves through the router.
    Tick,
    /// Finish the in-flight fan-out, then shut down.
    Stop,
}

/// Commands the router sends to lane actors.
#[derive(Debug)]
pub enum LaneCommand {
    /// Take ownership of a duplicated source unit.
    Deliver(VisualUnit),
    /// Produce this round's unit lane-locally.
    Refresh,
    Stop,
}

/// Messages delivered to the compositor actor.
#[derive(Debug)]
pub enum CompositorMsg {
    Unit { lane_id: u32, unit: VisualUnit },
}
