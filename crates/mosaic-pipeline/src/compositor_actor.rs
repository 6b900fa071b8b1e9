//! Compositor actor: owns the GPU context, the lane compositor, and the
//! animation driver.
//!
//! Device acquisition is asynchronous, so the actor runs a two-state
//! lifecycle: lane units arriving while `Uninitialized` are queued and
//! flushed in arrival order on the transition to `Ready`. From then on the
//! actor alternates between consuming lane units and performing one draw
//! per animation tick until every lane sender hangs up.

use std::sync::Arc;

use mosaic_core::{MosaicError, MosaicResult, SessionConfig, VisualUnit};
use mosaic_render::driver::DriverStats;
use mosaic_render::pool::PoolStats;
use mosaic_render::{AnimationDriver, DrawOutcome, GpuContext, LaneCompositor};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::messages::CompositorMsg;

/// Final diagnostics from a compositor run.
#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct CompositorReport {
    pub pool: PoolStats,
    pub driver: DriverStats,
}

/// Pending work while the device request is in flight.
struct PendingUnits {
    units: Vec<(u32, VisualUnit)>,
}

pub struct CompositorActor {
    config: SessionConfig,
}

impl CompositorActor {
    pub fn new(config: SessionConfig) -> Self {
        Self { config }
    }

    pub async fn run(
        self,
        mut rx: mpsc::UnboundedReceiver<CompositorMsg>,
    ) -> MosaicResult<CompositorReport> {
        let mut driver = AnimationDriver::new(self.config.frame_rate);

        // Uninitialized: queue units until the device resolves.
        let mut pending = PendingUnits { units: Vec::new() };
        let init = GpuContext::init();
        tokio::pin!(init);
        let gpu = loop {
            tokio::select! {
                result = &mut init => {
                    let ctx = result
                        .map_err(|e| MosaicError::render(format!("GPU setup failed: {e}")))?;
                    break Arc::new(ctx);
                }
                msg = rx.recv() => match msg {
                    Some(CompositorMsg::Unit { lane_id, unit }) => {
                        pending.units.push((lane_id, unit));
                    }
                    // Every lane hung up before the device arrived.
                    None => {
                        return Ok(CompositorReport {
                            pool: PoolStats::default(),
                            driver: driver.stats(),
                        });
                    }
                },
            }
        };

        let mut compositor = LaneCompositor::new(gpu, &self.config.compositor())?;
        info!(
            streams = self.config.stream_count,
            surface_w = compositor.viewport().surface_width,
            surface_h = compositor.viewport().surface_height,
            "compositor ready"
        );

        // Ready: flush the queued units in arrival order.
        let had_pending = !pending.units.is_empty();
        for (lane_id, unit) in pending.units.drain(..) {
            apply_unit(&mut compositor, lane_id, unit);
        }
        if had_pending {
            driver.arm();
        }

        loop {
            let scheduled = driver.is_scheduled();
            tokio::select! {
                msg = rx.recv() => match msg {
                    Some(CompositorMsg::Unit { lane_id, unit }) => {
                        apply_unit(&mut compositor, lane_id, unit);
                        driver.arm();
                    }
                    None => {
                        driver.request_stop();
                        driver.observe_stop();
                        break;
                    }
                },
                _ = driver.tick(), if scheduled => {
                    // Stop is only ever observed here, between draws.
                    if driver.observe_stop() {
                        break;
                    }
                    match compositor.draw() {
                        Ok(DrawOutcome::Submitted { submissions }) => {
                            driver.record_drawn();
                            debug!(submissions, "frame drawn");
                        }
                        Ok(DrawOutcome::Gated { cached, expected }) => {
                            driver.record_skipped();
                            debug!(cached, expected, "frame gated");
                        }
                        Err(err) => {
                            // A failed draw is a skipped frame; the loop
                            // is rescheduled regardless.
                            driver.record_skipped();
                            warn!(%err, "draw failed, skipping frame");
                        }
                    }
                }
            }
        }

        let pool = compositor.pool_stats();
        compositor.teardown();
        Ok(CompositorReport {
            pool,
            driver: driver.stats(),
        })
    }
}

fn apply_unit(compositor: &mut LaneCompositor, lane_id: u32, unit: VisualUnit) {
    if let Err(err) = compositor.on_lane_unit(lane_id, unit) {
        warn!(lane = lane_id, %err, "lane unit rejected");
    }
}
