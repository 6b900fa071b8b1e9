//! End-to-end pipeline tests: router and lane actors wired over real
//! channels, with the test standing in for the compositor actor.

use std::collections::HashMap;
use std::sync::Arc;

use mosaic_core::{OpaqueFrame, SourceKind, VisualUnit};
use mosaic_pipeline::lane::{ColorCycle, LaneActor, LaneSource};
use mosaic_pipeline::messages::{CompositorMsg, SourceEvent};
use mosaic_pipeline::router::{FrameRouter, RouterConfig};
use tokio::sync::mpsc;

struct Pipeline {
    source_tx: mpsc::UnboundedSender<SourceEvent>,
    compositor_rx: mpsc::UnboundedReceiver<CompositorMsg>,
    router: tokio::task::JoinHandle<mosaic_pipeline::RouterStats>,
}

fn spawn_pipeline(lane_count: u32, source_kind: SourceKind) -> Pipeline {
    let (source_tx, source_rx) = mpsc::unbounded_channel();
    let (compositor_tx, compositor_rx) = mpsc::unbounded_channel();

    let mut lane_txs = Vec::new();
    for lane_id in 0..lane_count {
        let source = match source_kind {
            SourceKind::OpaqueFrame => LaneSource::Forward,
            SourceKind::PlanarChunk => {
                LaneSource::ColorCycle(ColorCycle::new(16, 16, u64::from(lane_id) + 1))
            }
            SourceKind::StillImage => {
                LaneSource::Still(OpaqueFrame::solid(16, 16, 0, [5, 5, 5, 255]))
            }
        };
        let (tx, rx) = mpsc::unbounded_channel();
        lane_txs.push(tx);
        tokio::spawn(LaneActor::new(lane_id, source, compositor_tx.clone()).run(rx));
    }
    drop(compositor_tx);

    let router = FrameRouter::new(
        RouterConfig {
            lane_count,
            source_kind,
        },
        lane_txs,
    );
    let router = tokio::spawn(router.run(source_rx));

    Pipeline {
        source_tx,
        compositor_rx,
        router,
    }
}

#[tokio::test]
async fn planar_rounds_reach_every_lane_in_order() {
    let mut pl = spawn_pipeline(4, SourceKind::PlanarChunk);

    for _ in 0..3 {
        pl.source_tx.send(SourceEvent::Tick).unwrap();
    }
    pl.source_tx.send(SourceEvent::Stop).unwrap();

    let mut per_lane: HashMap<u32, Vec<VisualUnit>> = HashMap::new();
    while let Some(CompositorMsg::Unit { lane_id, unit }) = pl.compositor_rx.recv().await {
        per_lane.entry(lane_id).or_default().push(unit);
    }

    assert_eq!(per_lane.len(), 4);
    for (lane_id, units) in &per_lane {
        assert_eq!(units.len(), 3, "lane {lane_id} missed a round");
        for unit in units {
            match unit {
                VisualUnit::Buffers(b) => {
                    assert_eq!(b.y.len(), 16 * 16);
                    assert_eq!(b.u.len(), 8 * 8);
                }
                other => panic!("expected planar buffers, got {other:?}"),
            }
        }
        // Within the color-hold window every round carries the same color.
        let first = match &units[0] {
            VisualUnit::Buffers(b) => (b.y[0], b.u[0], b.v[0]),
            _ => unreachable!(),
        };
        for unit in &units[1..] {
            if let VisualUnit::Buffers(b) = unit {
                assert_eq!((b.y[0], b.u[0], b.v[0]), first);
            }
        }
    }

    let stats = pl.router.await.unwrap();
    assert_eq!(stats.rounds, 3);
    for lane in &stats.lanes {
        // 3 refreshes + 1 stop per lane.
        assert_eq!(lane.delivered, 4);
        assert_eq!(lane.skipped, 0);
    }
}

#[tokio::test]
async fn opaque_fan_out_shares_bytes_and_releases_original() {
    let mut pl = spawn_pipeline(3, SourceKind::OpaqueFrame);

    let frame = OpaqueFrame::solid(8, 8, 42, [1, 2, 3, 255]);
    let bytes = frame.bytes.clone();
    pl.source_tx.send(SourceEvent::Unit(frame)).unwrap();
    pl.source_tx.send(SourceEvent::Stop).unwrap();

    let mut seen = Vec::new();
    while let Some(CompositorMsg::Unit { lane_id, unit }) = pl.compositor_rx.recv().await {
        match unit {
            VisualUnit::Opaque(dup) => {
                assert!(Arc::ptr_eq(&bytes, &dup.bytes));
                assert_eq!(dup.timestamp_us, 42);
                seen.push((lane_id, dup));
            }
            other => panic!("expected opaque frame, got {other:?}"),
        }
    }
    assert_eq!(seen.len(), 3);

    pl.router.await.unwrap();
    // Only our probe and the three delivered duplicates hold the pixels;
    // the router's original is gone.
    drop(seen);
    assert_eq!(Arc::strong_count(&bytes), 1);
}

#[tokio::test]
async fn still_lanes_reserve_on_every_round() {
    let mut pl = spawn_pipeline(2, SourceKind::StillImage);

    pl.source_tx.send(SourceEvent::Tick).unwrap();
    pl.source_tx.send(SourceEvent::Tick).unwrap();
    pl.source_tx.send(SourceEvent::Stop).unwrap();

    let mut count = 0;
    while let Some(CompositorMsg::Unit { unit, .. }) = pl.compositor_rx.recv().await {
        assert!(matches!(unit, VisualUnit::Opaque(_)));
        count += 1;
    }
    assert_eq!(count, 4);
    pl.router.await.unwrap();
}
