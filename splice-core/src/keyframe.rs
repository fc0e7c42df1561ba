//! Keyframe Oracle (spec §4.3).
//!
//! Consumes per-frame queries and answers two questions in baseline-frame
//! units: "first keyframe at or after this position" (in-keyframe queries,
//! inclusive of the queried frame itself) and "last keyframe strictly
//! before this position" (out-keyframe queries — the queried frame is
//! itself an exclusive boundary, so its own packet is never a candidate),
//! plus the DTS-PTS skew in frames at each answering keyframe.

use std::collections::{BTreeMap, HashMap};

use num_rational::Ratio;

use crate::error::SpliceError;
use crate::models::{Frame, Rational};
use crate::probe::{MediaProbe, PacketInfo, ProbeResponse};

/// The oracle's answer for one queried frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KeyframeAnswer {
    pub keyframe_frame: Frame,
    /// `(dts - pts) / ticks_per_frame` at the answering packet, in frames.
    /// Non-positive. `0` for the end-of-stream sentinel.
    pub dts_skew: Rational,
}

/// Answers for a batch of queries: queried frame -> answer.
pub type KeyframeAnswers = HashMap<Frame, KeyframeAnswer>;

pub struct KeyframeOracle<'p> {
    probe: &'p dyn MediaProbe,
    media_path: String,
    framerate: Rational,
}

impl<'p> KeyframeOracle<'p> {
    pub fn new(probe: &'p dyn MediaProbe, media_path: impl Into<String>, framerate: Rational) -> Self {
        Self {
            probe,
            media_path: media_path.into(),
            framerate,
        }
    }

    /// Answer next-keyframe queries for `in_frames` and previous-keyframe
    /// queries for `out_frames` in a single batched probe request.
    pub fn query(
        &self,
        in_frames: &[Frame],
        out_frames: &[Frame],
    ) -> Result<(KeyframeAnswers, KeyframeAnswers), SpliceError> {
        let interval_str = build_read_intervals(in_frames, out_frames, self.framerate);
        let response = self.probe.probe(&self.media_path, &interval_str)?;
        let packets = dedup_and_sort(&response);
        let ticks_per_frame = ticks_per_frame(&response);

        let mut in_answers = HashMap::new();
        for &frame in in_frames {
            let answer = answer_next(&packets, &response, frame, ticks_per_frame)?;
            in_answers.insert(frame, answer);
        }

        let mut out_answers = HashMap::new();
        for &frame in out_frames {
            let answer = answer_prev(&packets, frame, ticks_per_frame)?;
            out_answers.insert(frame, answer);
        }

        Ok((in_answers, out_answers))
    }
}

fn build_read_intervals(in_frames: &[Frame], out_frames: &[Frame], framerate: Rational) -> String {
    let mut frames: Vec<Frame> = in_frames.iter().chain(out_frames.iter()).copied().collect();
    frames.sort_unstable();
    frames.dedup();

    frames
        .into_iter()
        .map(|f| {
            let seconds = Ratio::new(f, 1) / framerate;
            let seconds_f64 = *seconds.numer() as f64 / *seconds.denom() as f64;
            format!("{}%+#100", seconds_f64)
        })
        .collect::<Vec<_>>()
        .join(",")
}

fn dedup_and_sort(response: &ProbeResponse) -> Vec<PacketInfo> {
    let mut by_pts: BTreeMap<i64, PacketInfo> = BTreeMap::new();
    for packet in &response.packets {
        by_pts.insert(packet.pts, *packet);
    }
    by_pts.into_values().collect()
}

fn ticks_per_frame(response: &ProbeResponse) -> Rational {
    (Ratio::new(1, 1) / response.stream.avg_frame_rate) / response.stream.time_base
}

fn rational_to_exact_i64(r: Rational, context: &str) -> Result<i64, SpliceError> {
    if *r.denom() != 1 {
        return Err(SpliceError::ProbeFailed(format!(
            "{} did not land on an exact tick boundary: {}",
            context, r
        )));
    }
    Ok(*r.numer())
}

fn frame_to_pts(frame: Frame, ticks_per_frame: Rational) -> Result<i64, SpliceError> {
    rational_to_exact_i64(Ratio::new(frame, 1) * ticks_per_frame, "frame-to-pts conversion")
}

fn pts_to_frame(pts: i64, ticks_per_frame: Rational) -> Result<Frame, SpliceError> {
    rational_to_exact_i64(Ratio::new(pts, 1) / ticks_per_frame, "pts-to-frame conversion")
}

fn find_packet_index(packets: &[PacketInfo], target_pts: i64) -> Option<usize> {
    packets.binary_search_by_key(&target_pts, |p| p.pts).ok()
}

fn dts_skew_at(packet: &PacketInfo, ticks_per_frame: Rational) -> Rational {
    Ratio::new(packet.dts - packet.pts, 1) / ticks_per_frame
}

fn answer_next(
    packets: &[PacketInfo],
    response: &ProbeResponse,
    frame: Frame,
    ticks_per_frame: Rational,
) -> Result<KeyframeAnswer, SpliceError> {
    let target_pts = frame_to_pts(frame, ticks_per_frame)?;
    let idx = find_packet_index(packets, target_pts).ok_or_else(|| SpliceError::KeyframeNotFound {
        frame,
        reason: "no packet found at the queried PTS".into(),
    })?;

    for packet in &packets[idx..] {
        if packet.is_keyframe {
            return Ok(KeyframeAnswer {
                keyframe_frame: pts_to_frame(packet.pts, ticks_per_frame)?,
                dts_skew: dts_skew_at(packet, ticks_per_frame),
            });
        }
    }

    // End-of-stream sentinel: the final packet is the file's terminal
    // boundary, treated as if it were a keyframe (spec §4.3).
    if let Some(last) = packets.last() {
        if last.pts + last.duration == response.stream.duration_ts {
            return Ok(KeyframeAnswer {
                keyframe_frame: pts_to_frame(last.pts, ticks_per_frame)?,
                dts_skew: Ratio::new(0, 1),
            });
        }
    }

    Err(SpliceError::KeyframeNotFound {
        frame,
        reason: "forward scan reached end of packet stream without a keyframe".into(),
    })
}

fn answer_prev(packets: &[PacketInfo], frame: Frame, ticks_per_frame: Rational) -> Result<KeyframeAnswer, SpliceError> {
    let target_pts = frame_to_pts(frame, ticks_per_frame)?;
    let idx = find_packet_index(packets, target_pts).ok_or_else(|| SpliceError::KeyframeNotFound {
        frame,
        reason: "no packet found at the queried PTS".into(),
    })?;

    // Strictly before `idx`: the queried frame is an exclusive boundary, so
    // its own packet is never a candidate (spec §4.3, §4.4 Pass A).
    for packet in packets[..idx].iter().rev() {
        if packet.is_keyframe {
            return Ok(KeyframeAnswer {
                keyframe_frame: pts_to_frame(packet.pts, ticks_per_frame)?,
                dts_skew: dts_skew_at(packet, ticks_per_frame),
            });
        }
    }

    Err(SpliceError::KeyframeNotFound {
        frame,
        reason: "backward scan reached start of packet stream without a keyframe".into(),
    })
}
