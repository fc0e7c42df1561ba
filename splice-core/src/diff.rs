//! Diff Engine (spec §4.2).
//!
//! Computes the longest common subsequence of two fingerprint sequences,
//! then walks the LCS against both sequences simultaneously to produce a
//! segment list: runs that match become `OriginalSegment`s, runs present
//! only in the target become `TargetSegment`s, and runs present only in the
//! baseline are silently skipped (absorbed by the surrounding match runs —
//! spec §9's "suspect source behaviour" note on pure deletions).

use crate::models::{Frame, FrameFingerprint, FrameSequence, Segment};

/// Standard O(mn) DP longest common subsequence.
pub fn longest_common_subsequence(s1: &FrameSequence, s2: &FrameSequence) -> FrameSequence {
    let m = s1.len();
    let n = s2.len();
    let mut table = vec![vec![0usize; n + 1]; m + 1];

    for i in 1..=m {
        for j in 1..=n {
            table[i][j] = if s1[i - 1] == s2[j - 1] {
                table[i - 1][j - 1] + 1
            } else {
                table[i - 1][j].max(table[i][j - 1])
            };
        }
    }

    let mut index = table[m][n];
    let mut result = vec![FrameFingerprint([0u8; 32]); index];
    let (mut i, mut j) = (m, n);
    while i > 0 && j > 0 {
        if s1[i - 1] == s2[j - 1] {
            index -= 1;
            result[index] = s1[i - 1];
            i -= 1;
            j -= 1;
        } else if table[i - 1][j] > table[i][j - 1] {
            i -= 1;
        } else {
            j -= 1;
        }
    }
    result
}

/// Index into a fingerprint sequence, yielding a distinct sentinel (`None`)
/// for any index past the end — this is what keeps the walk below from
/// prematurely stopping while one sequence still has a suffix (spec §4.2).
fn at(seq: &FrameSequence, idx: usize) -> Option<FrameFingerprint> {
    seq.get(idx).copied()
}

/// Diff two fingerprint sequences into a segment list describing how to
/// build `target` out of runs of `baseline` plus insertions.
pub fn diff(baseline: &FrameSequence, target: &FrameSequence) -> Vec<Segment> {
    let lcs = longest_common_subsequence(baseline, target);
    let mut segments = Vec::new();
    let (mut s, mut i, mut j) = (0usize, 0usize, 0usize);

    let sequence_left = |s: usize, i: usize, j: usize| s < lcs.len() || i < baseline.len() || j < target.len();

    while sequence_left(s, i, j) {
        // Walk the match run until sequences diverge.
        let run_start_i = i;
        while sequence_left(s, i, j) {
            let (a, b, c) = (at(&lcs, s), at(baseline, i), at(target, j));
            if a.is_some() && a == b && b == c {
                s += 1;
                i += 1;
                j += 1;
            } else {
                break;
            }
        }
        if run_start_i != i {
            segments.push(Segment::new_original(
                run_start_i as Frame,
                j as Frame - i as Frame,
                (i - run_start_i) as Frame,
            ));
        }

        if !sequence_left(s, i, j) {
            break;
        }

        // Insertion: walk target frames until the LCS resumes.
        if at(&lcs, s) != at(target, j) {
            let run_start_j = j;
            while at(&lcs, s) != at(target, j) {
                j += 1;
            }
            segments.push(Segment::new_target(run_start_j as Frame, (j - run_start_j) as Frame));
        }

        // Deletion: walk baseline frames until the LCS resumes. Emits no
        // segment — the deleted frames are simply skipped by the
        // surrounding segment boundaries.
        if at(&lcs, s) != at(baseline, i) {
            while at(&lcs, s) != at(baseline, i) {
                i += 1;
            }
        }
    }

    segments
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{OriginalSegment, TargetSegment};

    fn fp(tag: u8) -> FrameFingerprint {
        let mut bytes = [0u8; 32];
        bytes[0] = tag;
        FrameFingerprint(bytes)
    }

    fn seq(tags: &[u8]) -> FrameSequence {
        tags.iter().map(|&t| fp(t)).collect()
    }

    #[test]
    fn no_edit_yields_single_original_segment() {
        let s = seq(&[0, 1, 2, 3, 4]);
        let segs = diff(&s, &s);
        assert_eq!(segs.len(), 1);
        match &segs[0] {
            Segment::Original(OriginalSegment {
                original_frame,
                position_delta,
                duration,
                ..
            }) => {
                assert_eq!(*original_frame, 0);
                assert_eq!(*position_delta, 0);
                assert_eq!(*duration, 5);
            }
            other => panic!("expected OriginalSegment, got {:?}", other),
        }
    }

    #[test]
    fn insertion_at_start_yields_leading_target_segment() {
        let baseline = seq(&[0, 1, 2]);
        let target = seq(&[9, 9, 0, 1, 2]);
        let segs = diff(&baseline, &target);
        assert_eq!(segs.len(), 2);
        match &segs[0] {
            Segment::Target(TargetSegment { original_frame, duration }) => {
                assert_eq!(*original_frame, 0);
                assert_eq!(*duration, 2);
            }
            other => panic!("expected leading TargetSegment, got {:?}", other),
        }
        match &segs[1] {
            Segment::Original(OriginalSegment { original_frame, duration, .. }) => {
                assert_eq!(*original_frame, 0);
                assert_eq!(*duration, 3);
            }
            other => panic!("expected trailing OriginalSegment, got {:?}", other),
        }
    }

    #[test]
    fn insertion_in_middle_splits_into_two_originals_and_a_target() {
        let baseline = seq(&[0, 1, 2, 3, 4]);
        let target = seq(&[0, 1, 9, 9, 2, 3, 4]);
        let segs = diff(&baseline, &target);
        assert_eq!(segs.len(), 3);
        assert!(matches!(segs[0], Segment::Original(_)));
        assert!(matches!(segs[1], Segment::Target(_)));
        assert!(matches!(segs[2], Segment::Original(_)));
        let total: Frame = segs.iter().map(|s| s.duration()).sum();
        assert_eq!(total, target.len() as Frame);
    }

    #[test]
    fn pure_deletion_emits_no_target_segment() {
        let baseline = seq(&[0, 1, 2, 3, 4]);
        let target = seq(&[0, 1, 4]);
        let segs = diff(&baseline, &target);
        // no insertion anywhere, so every segment must be Original.
        assert!(segs.iter().all(|s| !s.is_target()));
        let total: Frame = segs.iter().map(|s| s.duration()).sum();
        assert_eq!(total, target.len() as Frame);
    }

    #[test]
    fn empty_baseline_yields_single_target_segment() {
        let baseline: FrameSequence = seq(&[]);
        let target = seq(&[0, 1, 2]);
        let segs = diff(&baseline, &target);
        assert_eq!(segs.len(), 1);
        assert!(segs[0].is_target());
        assert_eq!(segs[0].duration(), 3);
    }

    #[test]
    fn empty_target_yields_no_segments() {
        let baseline = seq(&[0, 1, 2]);
        let target: FrameSequence = seq(&[]);
        let segs = diff(&baseline, &target);
        let total: Frame = segs.iter().map(|s| s.duration()).sum();
        assert_eq!(total, 0);
    }
}
