//! Media-probe collaborator port (spec §4.3, §6).
//!
//! This module is deliberately thin: it shells out to `ffprobe`, parses its
//! JSON contract, and hands back typed stream/packet records. All business
//! logic (deduplication, keyframe scanning, DTS/PTS skew) lives in
//! [`crate::keyframe`] so it can run against a scripted fake without a real
//! `ffprobe` binary on the test machine (spec §9's narrow-port requirement).

use std::process::Command;

use num_rational::Ratio;
use serde::Deserialize;

use crate::error::SpliceError;
use crate::models::Rational;

/// A single video packet as reported by `ffprobe -show_packets`.
#[derive(Debug, Clone, Copy)]
pub struct PacketInfo {
    pub pts: i64,
    pub dts: i64,
    pub duration: i64,
    pub is_keyframe: bool,
}

/// `streams[0]` from the probe JSON (spec §6).
#[derive(Debug, Clone)]
pub struct StreamInfo {
    pub time_base: Rational,
    pub avg_frame_rate: Rational,
    pub duration_ts: i64,
}

/// The full parsed response to one batched probe request.
#[derive(Debug, Clone)]
pub struct ProbeResponse {
    pub stream: StreamInfo,
    pub packets: Vec<PacketInfo>,
}

/// The media-probe collaborator. Given a media path and a
/// `-read_intervals`-style interval string, return the parsed stream and
/// packet data.
pub trait MediaProbe {
    fn probe(&self, media_path: &str, read_intervals: &str) -> Result<ProbeResponse, SpliceError>;
}

// ---------------------------------------------------------------------------
//  Raw JSON contract (spec §6)
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct RawProbeOutput {
    streams: Vec<RawStream>,
    packets: Vec<RawPacket>,
}

#[derive(Debug, Deserialize)]
struct RawStream {
    time_base: String,
    avg_frame_rate: String,
    duration_ts: i64,
}

#[derive(Debug, Deserialize)]
struct RawPacket {
    pts: i64,
    dts: i64,
    duration: i64,
    flags: String,
}

fn parse_ratio(field: &str) -> Result<Rational, SpliceError> {
    let (num, den) = field
        .split_once('/')
        .ok_or_else(|| SpliceError::ProbeFailed(format!("malformed rational field: {}", field)))?;
    let num: i64 = num
        .parse()
        .map_err(|_| SpliceError::ProbeFailed(format!("malformed rational field: {}", field)))?;
    let den: i64 = den
        .parse()
        .map_err(|_| SpliceError::ProbeFailed(format!("malformed rational field: {}", field)))?;
    Ok(Ratio::new(num, den))
}

fn parse_raw(json: &[u8]) -> Result<ProbeResponse, SpliceError> {
    let raw: RawProbeOutput = serde_json::from_slice(json)
        .map_err(|e| SpliceError::ProbeFailed(format!("malformed probe JSON: {}", e)))?;

    let stream = raw
        .streams
        .first()
        .ok_or_else(|| SpliceError::ProbeFailed("probe response had no video streams".into()))?;

    let stream_info = StreamInfo {
        time_base: parse_ratio(&stream.time_base)?,
        avg_frame_rate: parse_ratio(&stream.avg_frame_rate)?,
        duration_ts: stream.duration_ts,
    };

    let packets = raw
        .packets
        .into_iter()
        .map(|p| PacketInfo {
            pts: p.pts,
            dts: p.dts,
            duration: p.duration,
            is_keyframe: p.flags == "K__",
        })
        .collect();

    Ok(ProbeResponse {
        stream: stream_info,
        packets,
    })
}

// ---------------------------------------------------------------------------
//  Production implementation: shells out to ffprobe
// ---------------------------------------------------------------------------

pub struct FfprobeProbe;

impl MediaProbe for FfprobeProbe {
    fn probe(&self, media_path: &str, read_intervals: &str) -> Result<ProbeResponse, SpliceError> {
        let output = Command::new("ffprobe")
            .args([
                "-print_format",
                "json",
                "-select_streams",
                "v:0",
                "-show_streams",
                "-show_packets",
                "-read_intervals",
                read_intervals,
                "-i",
                media_path,
            ])
            .output()
            .map_err(|e| SpliceError::ProbeFailed(format!("failed to spawn ffprobe: {}", e)))?;

        if !output.status.success() {
            return Err(SpliceError::ProbeFailed(format!(
                "ffprobe exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr)
            )));
        }

        parse_raw(&output.stdout)
    }
}

// ---------------------------------------------------------------------------
//  Test fake
// ---------------------------------------------------------------------------

/// An in-memory fake that returns a scripted response regardless of the
/// requested interval string — lets planner tests run without a real media
/// file or `ffprobe` binary.
pub struct ScriptedProbe {
    pub response: ProbeResponse,
}

impl ScriptedProbe {
    pub fn new(response: ProbeResponse) -> Self {
        Self { response }
    }
}

impl MediaProbe for ScriptedProbe {
    fn probe(&self, _media_path: &str, _read_intervals: &str) -> Result<ProbeResponse, SpliceError> {
        Ok(self.response.clone())
    }
}
