//! Data models for the splice planner (spec §3).
//!
//! Timeline-frame positions, source-media frame numbers, and segments all
//! live in the same signed `i64` "frame" unit; the type system keeps
//! baseline-file coordinates and target-timeline coordinates apart by
//! attaching them to distinct fields (`OriginalSegment::original_frame` is a
//! baseline-file frame, `TargetSegment::original_frame` is a target-timeline
//! frame) rather than by newtype, matching the comment in the original
//! source about keeping the two meanings strictly separated.

use num_rational::Ratio;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Frame-counted position or duration. Signed so nudges and deltas compose
/// without wraparound games; all invariants require non-negative values
/// where the spec calls for them.
pub type Frame = i64;

/// Exact rational number used for time-bases, frame rates, and DTS/PTS
/// skew. Floating point fails for NTSC's 1001 denominator (spec §9).
pub type Rational = Ratio<i64>;

// ---------------------------------------------------------------------------
//  TimelineItem / TimelineDescription
// ---------------------------------------------------------------------------

/// One clip, transition, or composition placed on a video track (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimelineItem {
    /// Clip name, or a stable media-pool id when one is available.
    pub media_id: String,
    /// Timeline start frame (inclusive).
    pub start: Frame,
    /// Timeline end frame (exclusive).
    pub end: Frame,
    /// Source-media frame the item starts reading from. Absent for
    /// transitions/compositions that have no single source clip.
    pub source_start_frame: Option<Frame>,
    /// Whether this item has a non-zero left trim — the only way to
    /// disambiguate `source_start_frame == 0` (true first frame) from the
    /// NLE's conflated "one past first frame" encoding (spec §4.1).
    pub has_left_trim: bool,
    /// Opaque per-item properties. `BTreeMap` keeps the encoding
    /// deterministic without a separate sort step.
    pub properties: BTreeMap<String, String>,
}

impl TimelineItem {
    pub fn new(media_id: impl Into<String>, start: Frame, end: Frame) -> Self {
        Self {
            media_id: media_id.into(),
            start,
            end,
            source_start_frame: None,
            has_left_trim: false,
            properties: BTreeMap::new(),
        }
    }

    /// The per-frame source-index rule (spec §4.1): absent source start is
    /// treated as 0 (transitions) with no advance; a source start of exactly
    /// 0 with a left trim present is bumped to 1.
    pub fn effective_source_start(&self) -> Frame {
        match self.source_start_frame {
            None => 0,
            Some(0) if self.has_left_trim => 1,
            Some(f) => f,
        }
    }

    /// Whether the per-frame source index advances while walking this
    /// item's frame range. Transitions (no `source_start_frame`) are hashed
    /// but never advance.
    pub fn source_index_advances(&self) -> bool {
        self.source_start_frame.is_some()
    }
}

/// A projected timeline: start/end frame, framerate, and video tracks in
/// ascending visitation order (spec §4.1).
#[derive(Debug, Clone)]
pub struct TimelineDescription {
    pub start_frame: Frame,
    pub end_frame: Frame,
    pub framerate: Rational,
    /// `video_tracks[k]` holds the items on track index `k`, visited lowest
    /// first; higher tracks layer onto lower via hash update.
    pub video_tracks: Vec<Vec<TimelineItem>>,
}

impl TimelineDescription {
    pub fn length(&self) -> Frame {
        self.end_frame - self.start_frame
    }
}

// ---------------------------------------------------------------------------
//  FrameFingerprint / FrameSequence
// ---------------------------------------------------------------------------

/// An opaque fixed-width digest identifying the visible composition at one
/// timeline frame. Two frames with identical fingerprints must produce
/// identical pixels.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FrameFingerprint(pub [u8; 32]);

impl fmt::Debug for FrameFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fingerprint(")?;
        for byte in &self.0[..4] {
            write!(f, "{:02x}", byte)?;
        }
        write!(f, "…)")
    }
}

/// An ordered sequence of `FrameFingerprint`, indexed 0…N-1.
pub type FrameSequence = Vec<FrameFingerprint>;

// ---------------------------------------------------------------------------
//  Segment
// ---------------------------------------------------------------------------

/// A run copied byte-for-byte from the baseline render.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OriginalSegment {
    /// 0-indexed frame in the baseline file where this run's first frame
    /// lives.
    pub original_frame: Frame,
    /// Signed offset such that `original_frame + position_delta` is this
    /// run's start in the target timeline.
    pub position_delta: Frame,
    /// Run length in frames. Always positive once all passes have run.
    pub duration: Frame,
    /// First keyframe at or after `original_frame`. Populated by Pass A.
    pub in_keyframe: Option<Frame>,
    /// Last keyframe at or before `original_frame + duration`. Populated by
    /// Pass A.
    pub out_keyframe: Option<Frame>,
    /// Frames between the out keyframe's DTS and PTS; non-positive. Used to
    /// extend the emitted outpoint so the muxer's DTS-based stop does not
    /// truncate the segment.
    pub out_kf_dts_delta: Option<Rational>,
}

impl OriginalSegment {
    /// This run's start frame in the target timeline.
    pub fn target_start(&self) -> Frame {
        self.original_frame + self.position_delta
    }

    /// The baseline-file frame one past this run's last frame.
    pub fn original_end(&self) -> Frame {
        self.original_frame + self.duration
    }
}

/// A run that must be re-rendered by the NLE.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TargetSegment {
    /// Target-timeline frame of this run's first frame.
    pub original_frame: Frame,
    /// Run length in frames.
    pub duration: Frame,
}

impl TargetSegment {
    pub fn target_start(&self) -> Frame {
        self.original_frame
    }
}

/// A contiguous range of the target timeline: either copied from the
/// baseline (`Original`) or re-encoded (`Target`). Modeled as a tagged
/// union rather than trait-object dispatch so passes can pattern-match
/// exhaustively (spec §9).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind")]
pub enum Segment {
    Original(OriginalSegment),
    Target(TargetSegment),
}

impl Segment {
    pub fn new_original(original_frame: Frame, position_delta: Frame, duration: Frame) -> Self {
        Segment::Original(OriginalSegment {
            original_frame,
            position_delta,
            duration,
            in_keyframe: None,
            out_keyframe: None,
            out_kf_dts_delta: None,
        })
    }

    pub fn new_target(original_frame: Frame, duration: Frame) -> Self {
        Segment::Target(TargetSegment {
            original_frame,
            duration,
        })
    }

    pub fn duration(&self) -> Frame {
        match self {
            Segment::Original(s) => s.duration,
            Segment::Target(s) => s.duration,
        }
    }

    pub fn set_duration(&mut self, duration: Frame) {
        match self {
            Segment::Original(s) => s.duration = duration,
            Segment::Target(s) => s.duration = duration,
        }
    }

    pub fn target_start(&self) -> Frame {
        match self {
            Segment::Original(s) => s.target_start(),
            Segment::Target(s) => s.target_start(),
        }
    }

    pub fn is_target(&self) -> bool {
        matches!(self, Segment::Target(_))
    }

    pub fn as_original(&self) -> Option<&OriginalSegment> {
        match self {
            Segment::Original(s) => Some(s),
            Segment::Target(_) => None,
        }
    }

    pub fn as_original_mut(&mut self) -> Option<&mut OriginalSegment> {
        match self {
            Segment::Original(s) => Some(s),
            Segment::Target(_) => None,
        }
    }
}
