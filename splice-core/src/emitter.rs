//! Splice Emitter (spec §4.5) and the `Muxer` collaborator port.
//!
//! Turns a finished segment plan into the concat-muxer script text (spec
//! §6's grammar) and drives the downstream concat/remux subprocess calls.

use std::process::Command;

use num_rational::Ratio;

use crate::error::SpliceError;
use crate::models::{Frame, Rational, Segment};

/// `⌊frame × 1_000_000 / framerate⌋`. Truncating, not rounding, so segment
/// durations still sum additively in the muxer's microsecond clock.
pub fn frames_to_micros(frames: Frame, framerate: Rational) -> i64 {
    let micros = Ratio::new(frames, 1) * Ratio::new(1_000_000, 1) / framerate;
    micros.to_integer()
}

/// Render-file naming convention for a target segment (spec §5): the k-th
/// glue in emission order.
pub fn glue_file_name(index: usize, ext: &str) -> String {
    format!("glue{}.{}", index, ext)
}

/// Build the concat-muxer script text for the final segment plan.
pub fn emit_script(segments: &[Segment], base_path: &str, tempdir: &str, framerate: Rational, ext: &str) -> String {
    let mut script = String::new();
    let mut glue_index = 0usize;

    for seg in segments {
        match seg {
            Segment::Original(o) => {
                let dts_delta = o.out_kf_dts_delta.expect("segment must be Pass-A-attached before emission");
                let inpoint = frames_to_micros(o.original_frame, framerate);
                let outpoint_frames = Ratio::new(o.original_frame + o.duration, 1) + dts_delta;
                let outpoint = (outpoint_frames * Ratio::new(1_000_000, 1) / framerate).to_integer();
                let duration = frames_to_micros(o.duration, framerate);

                script.push_str(&format!("file '{}'\n", base_path));
                script.push_str(&format!("inpoint {}us\n", inpoint));
                script.push_str(&format!("outpoint {}us\n", outpoint));
                script.push_str(&format!("duration {}us\n", duration));
            }
            Segment::Target(t) => {
                let glue_path = format!("{}/{}", tempdir, glue_file_name(glue_index, ext));
                glue_index += 1;
                let duration = frames_to_micros(t.duration, framerate);

                script.push_str(&format!("file '{}'\n", glue_path));
                script.push_str(&format!("duration {}us\n", duration));
            }
        }
    }

    script
}

/// The concat-muxer collaborator port: strips the baseline's audio so the
/// concat demuxer doesn't choke on interleaved audio packets, writes the
/// concat script to that demuxer, and remuxes the stripped audio track back
/// in from the full re-export.
pub trait Muxer {
    /// Copy `input_path`'s video streams only into `output_path` (spec
    /// §4.5: the concatenation demuxer can get confused by interleaved
    /// audio packets, and the audio is re-added after concatenation anyway).
    fn strip_video(&self, input_path: &str, output_path: &str) -> Result<(), SpliceError>;
    fn concat(&self, script_path: &str, output_path: &str) -> Result<(), SpliceError>;
    fn remux_audio(&self, video_path: &str, audio_path: &str, output_path: &str) -> Result<(), SpliceError>;
}

pub struct FfmpegMuxer;

impl Muxer for FfmpegMuxer {
    fn strip_video(&self, input_path: &str, output_path: &str) -> Result<(), SpliceError> {
        let status = Command::new("ffmpeg")
            .args(["-y", "-i", input_path, "-c", "copy", "-map", "0:v", output_path])
            .status()
            .map_err(|e| SpliceError::MuxFailed(format!("failed to spawn ffmpeg audio strip: {}", e)))?;

        if !status.success() {
            return Err(SpliceError::MuxFailed(format!("ffmpeg audio strip exited with {}", status)));
        }
        Ok(())
    }

    fn concat(&self, script_path: &str, output_path: &str) -> Result<(), SpliceError> {
        let status = Command::new("ffmpeg")
            .args([
                "-y",
                "-f",
                "concat",
                "-safe",
                "0",
                "-i",
                script_path,
                "-c",
                "copy",
                output_path,
            ])
            .status()
            .map_err(|e| SpliceError::MuxFailed(format!("failed to spawn ffmpeg concat: {}", e)))?;

        if !status.success() {
            return Err(SpliceError::MuxFailed(format!("ffmpeg concat exited with {}", status)));
        }
        Ok(())
    }

    fn remux_audio(&self, video_path: &str, audio_path: &str, output_path: &str) -> Result<(), SpliceError> {
        let status = Command::new("ffmpeg")
            .args([
                "-y", "-i", video_path, "-i", audio_path, "-c", "copy", "-map", "0:v:0", "-map", "1:a:0",
                // the NLE's export tends to leave auxiliary data streams behind
                // that downstream muxers choke on.
                "-map", "-1:d", output_path,
            ])
            .status()
            .map_err(|e| SpliceError::MuxFailed(format!("failed to spawn ffmpeg remux: {}", e)))?;

        if !status.success() {
            return Err(SpliceError::MuxFailed(format!("ffmpeg remux exited with {}", status)));
        }
        Ok(())
    }
}

/// Test fake recording the calls it would have made instead of shelling out.
#[derive(Default)]
pub struct ScriptedMuxer {
    pub fail_strip: bool,
    pub fail_concat: bool,
    pub fail_remux: bool,
}

impl Muxer for ScriptedMuxer {
    fn strip_video(&self, _input_path: &str, _output_path: &str) -> Result<(), SpliceError> {
        if self.fail_strip {
            return Err(SpliceError::MuxFailed("scripted audio strip failure".into()));
        }
        Ok(())
    }

    fn concat(&self, _script_path: &str, _output_path: &str) -> Result<(), SpliceError> {
        if self.fail_concat {
            return Err(SpliceError::MuxFailed("scripted concat failure".into()));
        }
        Ok(())
    }

    fn remux_audio(&self, _video_path: &str, _audio_path: &str, _output_path: &str) -> Result<(), SpliceError> {
        if self.fail_remux {
            return Err(SpliceError::MuxFailed("scripted remux failure".into()));
        }
        Ok(())
    }
}
