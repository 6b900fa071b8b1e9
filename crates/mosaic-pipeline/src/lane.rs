//! Lane actors: one per stream, turning router commands into visual units
//! for the compositor.
//!
//! Opaque-frame lanes simply hand their duplicate on. Lane-local kinds
//! produce the unit themselves on every `Refresh`: still-image lanes
//! re-serve a frame decoded once at startup, planar-chunk lanes generate
//! solid-color Y/U/V planes that re-roll every thirty rounds.

use std::path::Path;

use mosaic_core::{MosaicError, OpaqueFrame, PlanarBuffers, VisualUnit};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::messages::{CompositorMsg, LaneCommand};

/// Rounds a generated color stays on screen before re-rolling.
const COLOR_HOLD_ROUNDS: u32 = 30;

/// Solid-color Y/U/V plane generator with a per-lane random sequence.
pub struct ColorCycle {
    width: u32,
    height: u32,
    counter: u32,
    y: u8,
    u: u8,
    v: u8,
    rng_state: u64,
}

impl ColorCycle {
    pub fn new(width: u32, height: u32, seed: u64) -> Self {
        let mut cycle = Self {
            width,
            height,
            counter: 0,
            y: 0,
            u: 0,
            v: 0,
            rng_state: seed.wrapping_mul(0x9E37_79B9_7F4A_7C15) | 1,
        };
        cycle.reroll();
        cycle
    }

    /// Planes for the next round; the color changes every
    /// [`COLOR_HOLD_ROUNDS`] rounds.
    pub fn next_buffers(&mut self) -> PlanarBuffers {
        if self.counter >= COLOR_HOLD_ROUNDS {
            self.reroll();
            self.counter = 0;
        }
        self.counter += 1;

        let mut buffers = PlanarBuffers::new(self.width, self.height);
        buffers.y.fill(self.y);
        buffers.u.fill(self.u);
        buffers.v.fill(self.v);
        buffers
    }

    fn reroll(&mut self) {
        self.y = self.next_byte();
        self.u = self.next_byte();
        self.v = self.next_byte();
    }

    // xorshift64; only feeds synthetic test colors.
    fn next_byte(&mut self) -> u8 {
        let mut x = self.rng_state;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.rng_state = x;
        (x >> 32) as u8
    }
}

/// Decode a still image to an RGBA frame served on every round.
pub fn load_still(path: &Path) -> Result<OpaqueFrame, MosaicError> {
    let img = image::open(path).map_err(|e| {
        MosaicError::InvalidArgument(format!(
            "failed to load still image '{}': {}",
            path.display(),
            e
        ))
    })?;
    let rgba = img.to_rgba8();
    let (width, height) = rgba.dimensions();
    Ok(OpaqueFrame::new(width, height, 0, rgba.into_raw()))
}

/// What a lane produces on each round.
pub enum LaneSource {
    /// Deliver router duplicates unchanged.
    Forward,
    /// Re-serve a frame decoded once at startup.
    Still(OpaqueFrame),
    /// Generate planar color data locally.
    ColorCycle(ColorCycle),
}

/// A single per-stream actor feeding the compositor.
pub struct LaneActor {
    lane_id: u32,
    source: LaneSource,
    compositor_tx: mpsc::UnboundedSender<CompositorMsg>,
}

impl LaneActor {
    pub fn new(
        lane_id: u32,
        source: LaneSource,
        compositor_tx: mpsc::UnboundedSender<CompositorMsg>,
    ) -> Self {
        Self {
            lane_id,
            source,
            compositor_tx,
        }
    }

    /// Actor loop: consume router commands until `Stop` or the router
    /// hangs up. Dropping the compositor sender on exit is what lets the
    /// compositor drain and shut down.
    pub async fn run(mut self, mut rx: mpsc::UnboundedReceiver<LaneCommand>) {
        while let Some(command) = rx.recv().await {
            match command {
                LaneCommand::Deliver(unit) => self.emit(unit),
                LaneCommand::Refresh => self.refresh(),
                LaneCommand::Stop => break,
            }
        }
        debug!(lane = self.lane_id, "lane stopped");
    }

    fn refresh(&mut self) {
        match &mut self.source {
            LaneSource::Forward => {}
            LaneSource::Still(frame) => {
                let unit = VisualUnit::Opaque(frame.duplicate());
                self.emit(unit);
            }
            LaneSource::ColorCycle(cycle) => {
                let unit = VisualUnit::Buffers(cycle.next_buffers());
                self.emit(unit);
            }
        }
    }

    fn emit(&mut self, unit: VisualUnit) {
        let msg = CompositorMsg::Unit {
            lane_id: self.lane_id,
            unit,
        };
        if self.compositor_tx.send(msg).is_err() {
            warn!(lane = self.lane_id, "compositor channel closed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_color_cycle_plane_sizes() {
        let mut cycle = ColorCycle::new(320, 240, 7);
        let buffers = cycle.next_buffers();
        assert_eq!(buffers.y.len(), 320 * 240);
        assert_eq!(buffers.u.len(), 160 * 120);
        assert_eq!(buffers.v.len(), 160 * 120);
    }

    #[test]
    fn test_color_stable_within_hold_window() {
        let mut cycle = ColorCycle::new(16, 16, 42);
        let first = cycle.next_buffers();
        for _ in 0..(COLOR_HOLD_ROUNDS - 1) {
            let again = cycle.next_buffers();
            assert_eq!(again.y[0], first.y[0]);
            assert_eq!(again.u[0], first.u[0]);
            assert_eq!(again.v[0], first.v[0]);
        }
    }

    #[test]
    fn test_lane_seeds_differ() {
        let a = ColorCycle::new(16, 16, 1).next_buffers();
        let b = ColorCycle::new(16, 16, 2).next_buffers();
        // Not a strong guarantee in general, but these seeds diverge.
        assert_ne!((a.y[0], a.u[0], a.v[0]), (b.y[0], b.u[0], b.v[0]));
    }

    #[tokio::test]
    async fn test_refresh_emits_planar_unit() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut lane = LaneActor::new(3, LaneSource::ColorCycle(ColorCycle::new(8, 8, 3)), tx);
        lane.refresh();
        match rx.try_recv().unwrap() {
            CompositorMsg::Unit { lane_id, unit } => {
                assert_eq!(lane_id, 3);
                assert!(matches!(unit, VisualUnit::Buffers(_)));
            }
        }
    }

    #[tokio::test]
    async fn test_deliver_forwards_unit() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let lane = LaneActor::new(0, LaneSource::Forward, tx);

        cmd_tx
            .send(LaneCommand::Deliver(VisualUnit::Opaque(
                OpaqueFrame::solid(2, 2, 5, [1, 2, 3, 4]),
            )))
            .unwrap();
        cmd_tx.send(LaneCommand::Stop).unwrap();
        lane.run(cmd_rx).await;

        match rx.try_recv().unwrap() {
            CompositorMsg::Unit { lane_id, unit } => {
                assert_eq!(lane_id, 0);
                let (w, h) = unit.dimensions();
                assert_eq!((w, h), (2, 2));
            }
        }
        // The lane exits on Stop and drops its sender.
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_still_lane_reserves_same_bytes() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let frame = OpaqueFrame::solid(4, 4, 0, [8, 8, 8, 255]);
        let bytes = frame.bytes.clone();
        let mut lane = LaneActor::new(1, LaneSource::Still(frame), tx);

        lane.refresh();
        lane.refresh();
        for _ in 0..2 {
            match rx.try_recv().unwrap() {
                CompositorMsg::Unit {
                    unit: VisualUnit::Opaque(dup),
                    ..
                } => assert!(std::sync::Arc::ptr_eq(&bytes, &dup.bytes)),
                other => panic!("expected opaque unit, got {other:?}"),
            }
        }
    }
}
