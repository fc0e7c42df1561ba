//! Snap & Glue Planner (spec §4.4) — the heart of the splice planner.
//!
//! Runs passes A through F over a segment list produced by [`crate::diff`],
//! turning LCS-derived runs into a plan where every kept range begins and
//! ends on a baseline keyframe.

use num_rational::Ratio;

use crate::error::SpliceError;
use crate::keyframe::KeyframeOracle;
use crate::models::{Frame, Segment};

fn start_field_mut(seg: &mut Segment) -> &mut Frame {
    match seg {
        Segment::Original(o) => &mut o.original_frame,
        Segment::Target(t) => &mut t.original_frame,
    }
}

/// Pass A — attach `in_keyframe`/`out_keyframe`/`out_kf_dts_delta` to every
/// `OriginalSegment`, batching all oracle queries into one round trip.
pub fn pass_a_keyframe_attachment(
    segments: &mut [Segment],
    oracle: &KeyframeOracle,
    baseline_len: Frame,
) -> Result<(), SpliceError> {
    let mut in_frames = Vec::new();
    let mut out_frames = Vec::new();
    for seg in segments.iter() {
        if let Segment::Original(o) = seg {
            in_frames.push(o.original_frame);
            let end = o.original_frame + o.duration;
            if end < baseline_len {
                out_frames.push(end);
            }
        }
    }

    let (in_answers, out_answers) = oracle.query(&in_frames, &out_frames)?;

    for seg in segments.iter_mut() {
        if let Segment::Original(o) = seg {
            o.in_keyframe = Some(in_answers[&o.original_frame].keyframe_frame);

            let end = o.original_frame + o.duration;
            if end >= baseline_len {
                o.out_keyframe = Some(end);
                o.out_kf_dts_delta = Some(Ratio::new(0, 1));
            } else {
                let answer = &out_answers[&end];
                o.out_keyframe = Some(answer.keyframe_frame);
                o.out_kf_dts_delta = Some(answer.dts_skew);
            }
        }
    }

    Ok(())
}

/// Pass B — promote spans narrower than one GOP to re-encode.
pub fn pass_b_unsnappable_promotion(segments: Vec<Segment>) -> Vec<Segment> {
    segments
        .into_iter()
        .map(|seg| match seg {
            Segment::Original(o) => {
                let in_kf = o.in_keyframe.expect("Pass A must run before Pass B");
                let out_kf = o.out_keyframe.expect("Pass A must run before Pass B");
                if in_kf >= out_kf {
                    Segment::new_target(o.target_start(), o.duration)
                } else {
                    Segment::Original(o)
                }
            }
            target => target,
        })
        .collect()
}

/// Pass C — collapse adjacent `TargetSegment` runs into one.
pub fn pass_c_target_coalescing(segments: Vec<Segment>) -> Vec<Segment> {
    let mut result: Vec<Segment> = Vec::with_capacity(segments.len());
    for seg in segments {
        if let Segment::Target(t) = &seg {
            if let Some(Segment::Target(prev)) = result.last_mut() {
                if prev.original_frame + prev.duration == t.original_frame {
                    prev.duration += t.duration;
                    continue;
                }
            }
        }
        result.push(seg);
    }
    result
}

/// Pass D — nudge `OriginalSegment` boundaries onto keyframes, displacing
/// the non-keyframe-aligned frames into neighbouring segments.
pub fn pass_d_boundary_nudging(segments: &mut Vec<Segment>) -> Result<(), SpliceError> {
    for k in 0..segments.len() {
        let original = match &segments[k] {
            Segment::Original(o) => Some((
                o.original_frame,
                o.duration,
                o.in_keyframe.expect("Pass A must run before Pass D"),
                o.out_keyframe.expect("Pass A must run before Pass D"),
            )),
            Segment::Target(_) => None,
        };
        let Some((original_frame, duration, in_kf, out_kf)) = original else {
            continue;
        };

        let in_nudge = in_kf - original_frame;
        let out_nudge = (original_frame + duration) - out_kf;

        if in_nudge > 0 {
            if k == 0 {
                return Err(SpliceError::PlanInconsistent {
                    pass: "D".into(),
                    reason: "first segment cannot require an in-nudge (no predecessor)".into(),
                });
            }
            let prev_duration = segments[k - 1].duration();
            segments[k - 1].set_duration(prev_duration + in_nudge);
            if let Segment::Original(o) = &mut segments[k] {
                o.duration -= in_nudge;
                o.original_frame += in_nudge;
            }
        }

        if out_nudge > 0 && k + 1 < segments.len() {
            let next_duration = segments[k + 1].duration();
            segments[k + 1].set_duration(next_duration + out_nudge);
            *start_field_mut(&mut segments[k + 1]) -= out_nudge;
            if let Segment::Original(o) = &mut segments[k] {
                o.duration -= out_nudge;
            }
        }
    }

    Ok(())
}

/// Pass E — split any `OriginalSegment` still overhanging its out-keyframe
/// (Pass D had no successor to absorb the tail into) and glue the residual.
pub fn pass_e_trailing_glue_insertion(segments: Vec<Segment>) -> Vec<Segment> {
    let mut result = Vec::with_capacity(segments.len());
    for seg in segments {
        match seg {
            Segment::Original(mut o) => {
                let out_kf = o.out_keyframe.expect("Pass A must run before Pass E");
                let end = o.original_frame + o.duration;
                if out_kf < end {
                    let residual = end - out_kf;
                    let glue_start = o.original_frame + o.position_delta + (out_kf - o.original_frame);
                    o.duration = out_kf - o.original_frame;
                    result.push(Segment::Original(o));
                    result.push(Segment::new_target(glue_start, residual));
                } else {
                    result.push(Segment::Original(o));
                }
            }
            target => result.push(target),
        }
    }
    result
}

/// Pass F — verify the §3 invariants hold; fail fatally otherwise.
pub fn pass_f_consistency_check(segments: &[Segment], target_length: Frame) -> Result<(), SpliceError> {
    let total: Frame = segments.iter().map(Segment::duration).sum();
    if total != target_length {
        return Err(SpliceError::PlanInconsistent {
            pass: "F".into(),
            reason: format!("total duration {} does not match target length {}", total, target_length),
        });
    }

    for seg in segments {
        match seg {
            Segment::Original(o) => {
                if o.duration <= 0 || o.original_frame < 0 {
                    return Err(SpliceError::PlanInconsistent {
                        pass: "F".into(),
                        reason: format!("non-positive duration or negative frame in {:?}", o),
                    });
                }
                if Some(o.original_frame) != o.in_keyframe {
                    return Err(SpliceError::PlanInconsistent {
                        pass: "F".into(),
                        reason: format!("original_frame does not equal in_keyframe: {:?}", o),
                    });
                }
                if Some(o.original_frame + o.duration) != o.out_keyframe {
                    return Err(SpliceError::PlanInconsistent {
                        pass: "F".into(),
                        reason: format!("original_frame + duration does not equal out_keyframe: {:?}", o),
                    });
                }
            }
            Segment::Target(t) => {
                if t.duration <= 0 || t.original_frame < 0 {
                    return Err(SpliceError::PlanInconsistent {
                        pass: "F".into(),
                        reason: format!("non-positive duration or negative frame in {:?}", t),
                    });
                }
            }
        }
    }

    for pair in segments.windows(2) {
        if pair[0].is_target() && pair[1].is_target() {
            return Err(SpliceError::PlanInconsistent {
                pass: "F".into(),
                reason: "two consecutive TargetSegments survived coalescing".into(),
            });
        }
    }

    Ok(())
}

/// Run the full pass pipeline A through F.
pub fn plan_splice(
    mut segments: Vec<Segment>,
    oracle: &KeyframeOracle,
    baseline_len: Frame,
    target_length: Frame,
) -> Result<Vec<Segment>, SpliceError> {
    pass_a_keyframe_attachment(&mut segments, oracle, baseline_len)?;
    let segments = pass_b_unsnappable_promotion(segments);
    let mut segments = pass_c_target_coalescing(segments);
    pass_d_boundary_nudging(&mut segments)?;
    let segments = pass_e_trailing_glue_insertion(segments);
    pass_f_consistency_check(&segments, target_length)?;
    Ok(segments)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::{PacketInfo, ProbeResponse, ScriptedProbe, StreamInfo};

    /// Keyframes every 10 frames across a 100-frame baseline, 1:1 frame/tick
    /// mapping so the arithmetic in assertions stays legible.
    fn gop10_probe(baseline_len: i64) -> ScriptedProbe {
        let packets = (0..baseline_len)
            .map(|f| PacketInfo {
                pts: f,
                dts: f,
                duration: 1,
                is_keyframe: f % 10 == 0,
            })
            .collect();
        ScriptedProbe::new(ProbeResponse {
            stream: StreamInfo {
                time_base: Ratio::new(1, 1),
                avg_frame_rate: Ratio::new(1, 1),
                duration_ts: baseline_len,
            },
            packets,
        })
    }

    #[test]
    fn scenario_no_edit_single_segment_survives_unchanged() {
        let probe = gop10_probe(100);
        let oracle = KeyframeOracle::new(&probe, "base.mp4", Ratio::new(1, 1));
        let segments = vec![Segment::new_original(0, 0, 100)];
        let plan = plan_splice(segments, &oracle, 100, 100).unwrap();
        assert_eq!(plan.len(), 1);
        match &plan[0] {
            Segment::Original(o) => {
                assert_eq!(o.original_frame, 0);
                assert_eq!(o.duration, 100);
                assert_eq!(o.in_keyframe, Some(0));
                assert_eq!(o.out_keyframe, Some(100));
            }
            other => panic!("expected Original, got {:?}", other),
        }
    }

    #[test]
    fn total_duration_is_preserved_through_every_pass() {
        let probe = gop10_probe(100);
        let oracle = KeyframeOracle::new(&probe, "base.mp4", Ratio::new(1, 1));
        // insertion of 5 frames at baseline position 30: of=0..30 kept,
        // 5 new frames, of=30..100 kept (delta +5).
        let segments = vec![
            Segment::new_original(0, 0, 30),
            Segment::new_target(30, 5),
            Segment::new_original(30, 5, 70),
        ];
        let plan = plan_splice(segments, &oracle, 100, 105).unwrap();
        let total: Frame = plan.iter().map(Segment::duration).sum();
        assert_eq!(total, 105);
    }

    #[test]
    fn every_original_segment_lands_on_keyframes_after_full_pipeline() {
        let probe = gop10_probe(100);
        let oracle = KeyframeOracle::new(&probe, "base.mp4", Ratio::new(1, 1));
        let segments = vec![
            Segment::new_original(0, 0, 32),
            Segment::new_target(32, 3),
            Segment::new_original(32, 3, 68),
        ];
        let plan = plan_splice(segments, &oracle, 100, 103).unwrap();
        for seg in &plan {
            if let Segment::Original(o) = seg {
                assert_eq!(Some(o.original_frame), o.in_keyframe);
                assert_eq!(Some(o.original_frame + o.duration), o.out_keyframe);
            }
        }
    }

    #[test]
    fn no_two_consecutive_target_segments_survive() {
        let probe = gop10_probe(100);
        let oracle = KeyframeOracle::new(&probe, "base.mp4", Ratio::new(1, 1));
        // edit within a single GOP: kept run [20..30) is narrower than one
        // GOP once its own keyframe pair collapses, forcing promotion.
        let segments = vec![
            Segment::new_original(0, 0, 20),
            Segment::new_original(20, 0, 10),
            Segment::new_target(30, 4),
            Segment::new_original(30, 4, 70),
        ];
        let plan = plan_splice(segments, &oracle, 100, 104).unwrap();
        for pair in plan.windows(2) {
            assert!(!(pair[0].is_target() && pair[1].is_target()));
        }
    }

    #[test]
    fn pass_b_promotes_spans_without_an_interior_keyframe_pair() {
        let probe = gop10_probe(100);
        let oracle = KeyframeOracle::new(&probe, "base.mp4", Ratio::new(1, 1));
        let mut segments = vec![Segment::new_original(22, 0, 3)]; // in_kf=30, out_kf=20 -> promote
        pass_a_keyframe_attachment(&mut segments, &oracle, 100).unwrap();
        let promoted = pass_b_unsnappable_promotion(segments);
        assert!(promoted[0].is_target());
    }

    #[test]
    fn pass_c_coalesces_adjacent_targets_but_not_disjoint_ones() {
        let segments = vec![
            Segment::new_target(0, 5),
            Segment::new_target(5, 3),
            Segment::new_target(20, 2),
        ];
        let coalesced = pass_c_target_coalescing(segments);
        assert_eq!(coalesced.len(), 2);
        assert_eq!(coalesced[0].duration(), 8);
        assert_eq!(coalesced[1].duration(), 2);
    }

    #[test]
    fn end_of_file_segment_skips_out_nudge_and_uses_zero_dts_delta() {
        let probe = gop10_probe(100);
        let oracle = KeyframeOracle::new(&probe, "base.mp4", Ratio::new(1, 1));
        let mut segments = vec![Segment::new_original(0, 0, 30), Segment::new_original(30, 0, 70)];
        pass_a_keyframe_attachment(&mut segments, &oracle, 100).unwrap();
        match &segments[1] {
            Segment::Original(o) => {
                assert_eq!(o.out_keyframe, Some(100));
                assert_eq!(o.out_kf_dts_delta, Some(Ratio::new(0, 1)));
            }
            other => panic!("expected Original, got {:?}", other),
        }
    }

    #[test]
    fn inconsistent_plan_is_rejected() {
        let segments = vec![Segment::new_original(0, 0, 50)];
        let err = pass_f_consistency_check(&segments, 100).unwrap_err();
        assert!(matches!(err, SpliceError::PlanInconsistent { .. }));
    }
}
