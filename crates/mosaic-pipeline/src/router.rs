//! Frame router: fans one source stream out to L independent lanes.
//!
//! The router is a single-threaded actor over an ordered input channel, so
//! at most one source unit is ever being fanned out: the next event is not
//! received until every ownership transfer for the current one is done.

use mosaic_core::{SourceKind, VisualUnit};
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::messages::{LaneCommand, SourceEvent};

/// Router setup parameters.
#[derive(Debug, Clone, Copy)]
pub struct RouterConfig {
    pub lane_count: u32,
    pub source_kind: SourceKind,
}

/// Per-lane delivery counters.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct LaneDelivery {
    pub delivered: u64,
    pub skipped: u64,
}

/// Router diagnostics reported in the session summary.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RouterStats {
    /// Completed fan-out rounds.
    pub rounds: u64,
    pub lanes: Vec<LaneDelivery>,
}

struct LaneLink {
    tx: mpsc::UnboundedSender<LaneCommand>,
    delivery: LaneDelivery,
    closed_logged: bool,
}

/// Fan-out stage between the capture source and the lane actors.
pub struct FrameRouter {
    config: RouterConfig,
    lanes: Vec<LaneLink>,
    rounds: u64,
}

impl FrameRouter {
    pub fn new(config: RouterConfig, lane_txs: Vec<mpsc::UnboundedSender<LaneCommand>>) -> Self {
        debug_assert_eq!(lane_txs.len(), config.lane_count as usize);
        Self {
            config,
            lanes: lane_txs
                .into_iter()
                .map(|tx| LaneLink {
                    tx,
                    delivery: LaneDelivery::default(),
                    closed_logged: false,
                })
                .collect(),
            rounds: 0,
        }
    }

    /// Actor loop: drain source events until `Stop` (or the source hangs
    /// up), then stop the lanes and report.
    pub async fn run(mut self, mut rx: mpsc::UnboundedReceiver<SourceEvent>) -> RouterStats {
        while let Some(event) = rx.recv().await {
            match event {
                SourceEvent::Unit(frame) => self.fan_out_frame(frame),
                SourceEvent::Tick => self.fan_out_refresh(),
                SourceEvent::Stop => break,
            }
        }
        // The current fan-out is complete; lanes may now shut down.
        for lane in 0..self.lanes.len() {
            self.send(lane, LaneCommand::Stop);
        }
        debug!(rounds = self.rounds, "router stopped");
        self.stats()
    }

    /// Fan a decoded frame out as shallow per-lane duplicates.
    fn fan_out_frame(&mut self, frame: mosaic_core::OpaqueFrame) {
        if self.config.source_kind != SourceKind::OpaqueFrame {
            warn!("dropping opaque frame routed to a lane-local source kind");
            return;
        }
        for lane in 0..self.lanes.len() {
            let duplicate = frame.duplicate();
            self.send(lane, LaneCommand::Deliver(VisualUnit::Opaque(duplicate)));
        }
        // All duplicates are produced; the original is released here.
        drop(frame);
        self.rounds += 1;
    }

    /// Signal a new composite round; lanes generate their units locally.
    fn fan_out_refresh(&mut self) {
        for lane in 0..self.lanes.len() {
            self.send(lane, LaneCommand::Refresh);
        }
        self.rounds += 1;
    }

    fn send(&mut self, lane: usize, command: LaneCommand) {
        let link = &mut self.lanes[lane];
        match link.tx.send(command) {
            Ok(()) => link.delivery.delivered += 1,
            Err(_) => {
                // A closed lane is skipped, not fatal to the others.
                link.delivery.skipped += 1;
                if !link.closed_logged {
                    warn!(lane, "lane channel closed, skipping");
                    link.closed_logged = true;
                }
            }
        }
    }

    pub fn stats(&self) -> RouterStats {
        RouterStats {
            rounds: self.rounds,
            lanes: self.lanes.iter().map(|link| link.delivery).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mosaic_core::{OpaqueFrame, VisualUnit};
    use std::sync::Arc;

    fn router_with_lanes(
        lane_count: u32,
        source_kind: SourceKind,
    ) -> (
        FrameRouter,
        Vec<mpsc::UnboundedReceiver<LaneCommand>>,
    ) {
        let mut txs = Vec::new();
        let mut rxs = Vec::new();
        for _ in 0..lane_count {
            let (tx, rx) = mpsc::unbounded_channel();
            txs.push(tx);
            rxs.push(rx);
        }
        (
            FrameRouter::new(
                RouterConfig {
                    lane_count,
                    source_kind,
                },
                txs,
            ),
            rxs,
        )
    }

    #[tokio::test]
    async fn test_fan_out_duplicates_share_bytes() {
        let (mut router, mut rxs) = router_with_lanes(3, SourceKind::OpaqueFrame);
        let frame = OpaqueFrame::solid(4, 4, 0, [9, 9, 9, 255]);
        let bytes = frame.bytes.clone();

        router.fan_out_frame(frame);

        for rx in &mut rxs {
            match rx.try_recv().unwrap() {
                LaneCommand::Deliver(VisualUnit::Opaque(dup)) => {
                    assert!(Arc::ptr_eq(&bytes, &dup.bytes));
                }
                other => panic!("expected Deliver, got {other:?}"),
            }
        }
        assert_eq!(router.stats().rounds, 1);
    }

    #[tokio::test]
    async fn test_closed_lane_is_skipped_not_fatal() {
        let (mut router, mut rxs) = router_with_lanes(3, SourceKind::OpaqueFrame);
        rxs.remove(1); // lane 1 hangs up

        router.fan_out_frame(OpaqueFrame::solid(2, 2, 0, [0; 4]));
        router.fan_out_frame(OpaqueFrame::solid(2, 2, 0, [0; 4]));

        let stats = router.stats();
        assert_eq!(stats.lanes[0].delivered, 2);
        assert_eq!(stats.lanes[1].skipped, 2);
        assert_eq!(stats.lanes[2].delivered, 2);
        // The healthy lanes still got both frames.
        assert_eq!(rxs[0].len(), 2);
        assert_eq!(rxs[1].len(), 2);
    }

    #[tokio::test]
    async fn test_refresh_signals_every_lane() {
        let (mut router, mut rxs) = router_with_lanes(2, SourceKind::PlanarChunk);
        router.fan_out_refresh();
        for rx in &mut rxs {
            assert!(matches!(rx.try_recv().unwrap(), LaneCommand::Refresh));
        }
    }

    #[tokio::test]
    async fn test_frame_dropped_for_lane_local_kind() {
        let (mut router, mut rxs) = router_with_lanes(2, SourceKind::PlanarChunk);
        router.fan_out_frame(OpaqueFrame::solid(2, 2, 0, [0; 4]));
        assert!(rxs[0].try_recv().is_err());
        assert_eq!(router.stats().rounds, 0);
    }

    #[tokio::test]
    async fn test_run_drains_then_stops_lanes() {
        let (router, mut rxs) = router_with_lanes(2, SourceKind::OpaqueFrame);
        let (tx, rx) = mpsc::unbounded_channel();

        tx.send(SourceEvent::Unit(OpaqueFrame::solid(2, 2, 0, [1; 4])))
            .unwrap();
        tx.send(SourceEvent::Stop).unwrap();

        let stats = router.run(rx).await;
        assert_eq!(stats.rounds, 1);
        for rx in &mut rxs {
            assert!(matches!(rx.try_recv().unwrap(), LaneCommand::Deliver(_)));
            assert!(matches!(rx.try_recv().unwrap(), LaneCommand::Stop));
        }
    }
}
