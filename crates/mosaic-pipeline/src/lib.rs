//! # mosaic-pipeline
//!
//! The Mosaic frame-distribution pipeline: a router actor fanning one
//! source stream out to L independent lane actors, the compositor actor
//! consuming lane units behind its two-state setup lifecycle, and the
//! session orchestrator that owns all of them.

pub mod compositor_actor;
pub mod lane;
pub mod messages;
pub mod router;
pub mod session;

pub use messages::{CompositorMsg, LaneCommand, SourceEvent};
pub use router::{FrameRouter, RouterConfig, RouterStats};
pub use session::{Session, SessionSummary};
