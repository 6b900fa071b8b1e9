//! Session orchestrator.
//!
//! Owns every actor handle explicitly — router, lanes, compositor — and
//! wires their channels at spawn time; there is no ambient shared state.
//! Stopping a session drains the in-flight fan-out, lets the lanes exit,
//! tears down the compositor and pool, and returns the final diagnostics.

use mosaic_core::{MosaicError, MosaicResult, SessionConfig, SourceKind};
use mosaic_render::driver::DriverStats;
use mosaic_render::pool::PoolStats;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::info;

use crate::compositor_actor::{CompositorActor, CompositorReport};
use crate::lane::{ColorCycle, LaneActor, LaneSource};
use crate::messages::SourceEvent;
use crate::router::{FrameRouter, RouterConfig, RouterStats};

/// Final diagnostic summary emitted on stop.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSummary {
    pub router: RouterStats,
    pub pool: PoolStats,
    pub driver: DriverStats,
}

/// A running compositing session.
pub struct Session {
    source_tx: mpsc::UnboundedSender<SourceEvent>,
    router: JoinHandle<RouterStats>,
    lanes: Vec<JoinHandle<()>>,
    compositor: JoinHandle<MosaicResult<CompositorReport>>,
}

impl Session {
    /// Validate `config`, wire the channels, and spawn all actors.
    pub fn spawn(config: SessionConfig) -> MosaicResult<Self> {
        config.validate()?;

        let (source_tx, source_rx) = mpsc::unbounded_channel();
        let (compositor_tx, compositor_rx) = mpsc::unbounded_channel();

        let mut lane_txs = Vec::with_capacity(config.stream_count as usize);
        let mut lanes = Vec::with_capacity(config.stream_count as usize);
        for lane_id in 0..config.stream_count {
            let source = lane_source(&config, lane_id)?;
            let (tx, rx) = mpsc::unbounded_channel();
            lane_txs.push(tx);
            let actor = LaneActor::new(lane_id, source, compositor_tx.clone());
            lanes.push(tokio::spawn(actor.run(rx)));
        }
        // The lanes hold the only compositor senders: when the last lane
        // exits, the compositor drains and shuts down.
        drop(compositor_tx);

        let router = FrameRouter::new(
            RouterConfig {
                lane_count: config.stream_count,
                source_kind: config.source_kind,
            },
            lane_txs,
        );
        let router = tokio::spawn(router.run(source_rx));
        let compositor = tokio::spawn(CompositorActor::new(config).run(compositor_rx));

        Ok(Self {
            source_tx,
            router,
            lanes,
            compositor,
        })
    }

    /// Sender feeding source events into the router.
    pub fn source(&self) -> mpsc::UnboundedSender<SourceEvent> {
        self.source_tx.clone()
    }

    /// Stop the session: drain, tear down, and collect the summary.
    pub async fn stop(self) -> MosaicResult<SessionSummary> {
        // The router finishes the in-flight fan-out before acting on this.
        let _ = self.source_tx.send(SourceEvent::Stop);

        let router = self
            .router
            .await
            .map_err(|e| MosaicError::render(format!("router task failed: {e}")))?;
        for lane in self.lanes {
            lane.await
                .map_err(|e| MosaicError::render(format!("lane task failed: {e}")))?;
        }
        let report = self
            .compositor
            .await
            .map_err(|e| MosaicError::render(format!("compositor task failed: {e}")))??;

        let summary = SessionSummary {
            router,
            pool: report.pool,
            driver: report.driver,
        };
        info!(
            frames_drawn = summary.driver.frames_drawn,
            frames_skipped = summary.driver.frames_skipped,
            used_bytes = summary.pool.used_bytes,
            allocated_bytes = summary.pool.allocated_bytes,
            "session stopped"
        );
        Ok(summary)
    }
}

fn lane_source(config: &SessionConfig, lane_id: u32) -> MosaicResult<LaneSource> {
    match config.source_kind {
        SourceKind::OpaqueFrame => Ok(LaneSource::Forward),
        SourceKind::StillImage => {
            let path = config.still_image.as_deref().ok_or_else(|| {
                MosaicError::unsupported("still-image source requires a still_image path")
            })?;
            Ok(LaneSource::Still(crate::lane::load_still(path)?))
        }
        SourceKind::PlanarChunk => Ok(LaneSource::ColorCycle(ColorCycle::new(
            config.tile_width,
            config.tile_height,
            u64::from(lane_id) + 1,
        ))),
    }
}
