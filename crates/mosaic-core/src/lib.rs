//! # mosaic-core
//!
//! Core types and primitives for the Mosaic grid compositor.
//! This crate contains the foundational types shared across all Mosaic
//! crates: source kinds, visual units, grid layout, configuration, and
//! error types.

pub mod config;
pub mod error;
pub mod unit;
pub mod viewport;

pub use config::{CompositorConfig, SessionConfig, SubmissionStrategy, UploadStrategy};
pub use error::{MosaicError, MosaicResult};
pub use unit::{OpaqueFrame, PlanarBuffers, PlanarFormat, PlanarFrame, SourceKind, VisualUnit};
pub use viewport::Viewport;
