//! Splice planner — core engine.
//!
//! This crate provides:
//! - **models**: Data structures (TimelineItem, FrameFingerprint, Segment).
//! - **error**: The `SpliceError` taxonomy, all fatal per spec.
//! - **projector**: Projects a timeline description into a per-frame fingerprint sequence.
//! - **diff**: Longest-common-subsequence diffing between two fingerprint sequences.
//! - **probe**: The media-probe collaborator port (`ffprobe` JSON contract) and its test fake.
//! - **keyframe**: The Keyframe Oracle — next/previous keyframe queries and DTS/PTS skew.
//! - **planner**: The Snap & Glue Planner — passes A through F.
//! - **nle**: The NLE projection and render-scheduling collaborator ports, plus test fakes.
//! - **emitter**: The concat-muxer script emitter and the `Muxer` collaborator port.
//! - **workspace**: Scratch-directory management for intermediate render outputs.

pub mod diff;
pub mod emitter;
pub mod error;
pub mod keyframe;
pub mod models;
pub mod nle;
pub mod planner;
pub mod probe;
pub mod projector;
pub mod workspace;

// Re-export key types for convenience.
pub use error::SpliceError;
pub use models::*;
