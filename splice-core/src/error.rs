//! The `SpliceError` taxonomy (spec §7).
//!
//! Every variant is fatal — the planner has no partial-recovery mode because
//! an incorrect plan corrupts the output stream. Errors always identify the
//! offending segment, frame, or subprocess.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SpliceError {
    #[error("baseline and target timelines differ: {0}")]
    InputMismatch(String),

    #[error("no prior render found matching '{0}'")]
    NoTemplateRender(String),

    #[error("media probe failed: {0}")]
    ProbeFailed(String),

    #[error("keyframe oracle failed for frame {frame}: {reason}")]
    KeyframeNotFound { frame: i64, reason: String },

    #[error("plan inconsistent after pass '{pass}': {reason} (this is a planner bug)")]
    PlanInconsistent { pass: &'static str, reason: String },

    #[error("render job '{name}' reported non-complete status: {status}")]
    RenderFailed { name: String, status: String },

    #[error("concat/remux step failed: {0}")]
    MuxFailed(String),
}

pub type Result<T> = std::result::Result<T, SpliceError>;
