//! NLE projection and render-scheduling collaborator ports (spec §6).
//!
//! These traits model what the core consumes from the editor: timeline
//! enumeration/inspection for the Projector, and render-job scheduling for
//! the Splice Emitter's glue renders. Kept narrow so unit tests can swap in
//! [`JsonTimelineSource`]/[`FakeRenderScheduler`] instead of driving a real
//! NLE process (spec §9). The proprietary NLE scripting API itself is out of
//! scope (spec §1); [`JsonTimelineSource`] is the concrete headless stand-in
//! this crate ships, reading the same fields a live NLE session would report.

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::thread;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::SpliceError;
use crate::models::{Frame, Rational, TimelineItem};

/// One enumerable timeline's header fields (spec §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimelineInfo {
    pub name: String,
    pub start_frame: Frame,
    pub end_frame: Frame,
    pub track_count: usize,
    pub framerate: Rational,
}

pub trait TimelineSource {
    fn timeline_count(&self) -> usize;
    fn timeline_info(&self, index: usize) -> Result<TimelineInfo, SpliceError>;
    /// Items on `track` (0-indexed, ascending = lowest first) of the given
    /// timeline, in timeline order.
    fn timeline_items(&self, index: usize, track: usize) -> Result<Vec<TimelineItem>, SpliceError>;
}

/// A scheduled glue render (spec §6: `{mark_in, mark_out, export_video,
/// export_audio, target_dir, custom_name}`).
#[derive(Debug, Clone, Serialize)]
pub struct RenderJobSpec {
    pub mark_in: Frame,
    pub mark_out: Frame,
    pub export_video: bool,
    pub export_audio: bool,
    pub target_dir: String,
    pub custom_name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderStatus {
    Queued,
    Rendering,
    Complete,
    Failed,
}

pub trait RenderScheduler {
    /// Names of render jobs already known to the session. Used to confirm a
    /// dimension-template job exists before scheduling a new one (spec
    /// §4.6: new jobs carry no resolution/codec settings of their own and
    /// rely on the session templating them from a prior render).
    fn existing_job_names(&self) -> Result<Vec<String>, SpliceError>;
    /// Load a render preset into the session ahead of scheduling. Fails if
    /// the named preset cannot be found.
    fn load_preset(&self, preset_name: &str) -> Result<(), SpliceError>;
    /// Schedule a render job, returning an opaque job id.
    fn schedule(&self, job: &RenderJobSpec) -> Result<String, SpliceError>;
    /// Read the job's current terminal/non-terminal status.
    fn poll(&self, job_id: &str) -> Result<RenderStatus, SpliceError>;
}

/// Confirms a prior render job named `template_name` exists for the session
/// to template new jobs' dimensions/codec settings from (spec §4.6).
pub fn require_template(scheduler: &dyn RenderScheduler, template_name: &str) -> Result<(), SpliceError> {
    let jobs = scheduler.existing_job_names()?;
    if jobs.iter().any(|name| name == template_name) {
        Ok(())
    } else {
        Err(SpliceError::NoTemplateRender(template_name.to_string()))
    }
}

/// Block until `job_id` reaches a terminal status, polling every
/// `poll_interval` (spec §5: "bounded sleep, ≈1s"). `max_polls` bounds the
/// wait so a stuck render fails rather than hanging the process forever.
pub fn wait_for_render(
    scheduler: &dyn RenderScheduler,
    job_id: &str,
    poll_interval: Duration,
    max_polls: u32,
) -> Result<(), SpliceError> {
    for _ in 0..max_polls {
        match scheduler.poll(job_id)? {
            RenderStatus::Complete => return Ok(()),
            RenderStatus::Failed => {
                return Err(SpliceError::RenderFailed {
                    name: job_id.to_string(),
                    status: "failed".to_string(),
                })
            }
            RenderStatus::Queued | RenderStatus::Rendering => thread::sleep(poll_interval),
        }
    }

    Err(SpliceError::RenderFailed {
        name: job_id.to_string(),
        status: "timed out waiting for completion".to_string(),
    })
}

/// Drives render scheduling through an external "bridge" executable that
/// speaks JSON over stdio — the render-job equivalent of [`crate::probe`]'s
/// `ffprobe` subprocess, since the actual render action can only be carried
/// out by the NLE process itself (spec §9's narrow-port collaborator model).
pub struct CommandRenderScheduler {
    bridge_path: String,
}

impl CommandRenderScheduler {
    pub fn new(bridge_path: impl Into<String>) -> Self {
        Self {
            bridge_path: bridge_path.into(),
        }
    }
}

impl RenderScheduler for CommandRenderScheduler {
    fn existing_job_names(&self) -> Result<Vec<String>, SpliceError> {
        use std::process::Command;

        let output = Command::new(&self.bridge_path)
            .arg("jobs")
            .output()
            .map_err(|e| SpliceError::RenderFailed {
                name: "jobs".to_string(),
                status: format!("failed to spawn render bridge: {}", e),
            })?;
        if !output.status.success() {
            return Err(SpliceError::RenderFailed {
                name: "jobs".to_string(),
                status: format!("render bridge jobs exited with {}", output.status),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout)
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect())
    }

    fn load_preset(&self, preset_name: &str) -> Result<(), SpliceError> {
        use std::process::Command;

        let output = Command::new(&self.bridge_path)
            .args(["preset", preset_name])
            .output()
            .map_err(|e| SpliceError::RenderFailed {
                name: preset_name.to_string(),
                status: format!("failed to spawn render bridge: {}", e),
            })?;
        if !output.status.success() {
            return Err(SpliceError::RenderFailed {
                name: preset_name.to_string(),
                status: format!("render bridge preset exited with {}", output.status),
            });
        }
        Ok(())
    }

    fn schedule(&self, job: &RenderJobSpec) -> Result<String, SpliceError> {
        use std::io::Write;
        use std::process::{Command, Stdio};

        let mut child = Command::new(&self.bridge_path)
            .arg("schedule")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .spawn()
            .map_err(|e| SpliceError::RenderFailed {
                name: job.custom_name.clone(),
                status: format!("failed to spawn render bridge: {}", e),
            })?;

        let payload = serde_json::to_vec(job).expect("RenderJobSpec serialization cannot fail");
        child
            .stdin
            .take()
            .expect("stdin was piped")
            .write_all(&payload)
            .map_err(|e| SpliceError::RenderFailed {
                name: job.custom_name.clone(),
                status: format!("failed to write render bridge request: {}", e),
            })?;

        let output = child.wait_with_output().map_err(|e| SpliceError::RenderFailed {
            name: job.custom_name.clone(),
            status: format!("render bridge exited abnormally: {}", e),
        })?;
        if !output.status.success() {
            return Err(SpliceError::RenderFailed {
                name: job.custom_name.clone(),
                status: format!("render bridge schedule exited with {}", output.status),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    fn poll(&self, job_id: &str) -> Result<RenderStatus, SpliceError> {
        use std::process::Command;

        let output = Command::new(&self.bridge_path)
            .args(["poll", job_id])
            .output()
            .map_err(|e| SpliceError::RenderFailed {
                name: job_id.to_string(),
                status: format!("failed to spawn render bridge: {}", e),
            })?;
        if !output.status.success() {
            return Err(SpliceError::RenderFailed {
                name: job_id.to_string(),
                status: format!("render bridge poll exited with {}", output.status),
            });
        }

        match String::from_utf8_lossy(&output.stdout).trim() {
            "queued" => Ok(RenderStatus::Queued),
            "rendering" => Ok(RenderStatus::Rendering),
            "complete" => Ok(RenderStatus::Complete),
            other => Err(SpliceError::RenderFailed {
                name: job_id.to_string(),
                status: format!("unrecognised render bridge status: {}", other),
            }),
        }
    }
}

// ---------------------------------------------------------------------------
//  JsonTimelineSource: headless stand-in for the live NLE session
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct RawTimelineFile {
    timelines: Vec<RawTimelineEntry>,
}

#[derive(Debug, Deserialize)]
struct RawTimelineEntry {
    #[serde(flatten)]
    info: TimelineInfo,
    tracks: Vec<Vec<TimelineItem>>,
}

/// Reads timeline descriptions from a JSON sidecar file instead of a live
/// NLE scripting session. Also used directly in tests as an in-memory fake.
pub struct JsonTimelineSource {
    timelines: Vec<(TimelineInfo, Vec<Vec<TimelineItem>>)>,
}

impl JsonTimelineSource {
    pub fn new(timelines: Vec<(TimelineInfo, Vec<Vec<TimelineItem>>)>) -> Self {
        Self { timelines }
    }

    pub fn load_json_file(path: impl AsRef<Path>) -> Result<Self, SpliceError> {
        let bytes = fs::read(path.as_ref())
            .map_err(|e| SpliceError::InputMismatch(format!("failed to read timeline file: {}", e)))?;
        let raw: RawTimelineFile = serde_json::from_slice(&bytes)
            .map_err(|e| SpliceError::InputMismatch(format!("malformed timeline JSON: {}", e)))?;
        let timelines = raw.timelines.into_iter().map(|e| (e.info, e.tracks)).collect();
        Ok(Self { timelines })
    }

    /// Look up a timeline's index by name (for the `-t` CLI flag).
    pub fn index_of(&self, name: &str) -> Result<usize, SpliceError> {
        self.timelines
            .iter()
            .position(|(info, _)| info.name == name)
            .ok_or_else(|| SpliceError::InputMismatch(format!("no timeline named '{}'", name)))
    }
}

impl TimelineSource for JsonTimelineSource {
    fn timeline_count(&self) -> usize {
        self.timelines.len()
    }

    fn timeline_info(&self, index: usize) -> Result<TimelineInfo, SpliceError> {
        self.timelines
            .get(index)
            .map(|(info, _)| info.clone())
            .ok_or_else(|| SpliceError::InputMismatch(format!("no timeline at index {}", index)))
    }

    fn timeline_items(&self, index: usize, track: usize) -> Result<Vec<TimelineItem>, SpliceError> {
        self.timelines
            .get(index)
            .and_then(|(_, tracks)| tracks.get(track))
            .cloned()
            .ok_or_else(|| SpliceError::InputMismatch(format!("no track {} on timeline {}", track, index)))
    }
}

/// Scripted scheduler: each job id is preloaded with a fixed sequence of
/// statuses to return on successive polls, letting tests exercise both
/// immediate completion and multi-poll waits without sleeping for real.
pub struct FakeRenderScheduler {
    scripted: HashMap<String, Vec<RenderStatus>>,
    next_job_id: std::cell::Cell<u64>,
    polls_taken: std::cell::RefCell<HashMap<String, usize>>,
    job_names: Vec<String>,
    failing_preset: Option<String>,
}

impl FakeRenderScheduler {
    pub fn new(scripted: HashMap<String, Vec<RenderStatus>>) -> Self {
        Self {
            scripted,
            next_job_id: std::cell::Cell::new(0),
            polls_taken: std::cell::RefCell::new(HashMap::new()),
            job_names: Vec::new(),
            failing_preset: None,
        }
    }

    /// Seed the names `existing_job_names` reports, for exercising
    /// `require_template`.
    pub fn with_job_names(mut self, names: Vec<String>) -> Self {
        self.job_names = names;
        self
    }

    /// Make `load_preset` fail whenever it's asked to load `name`.
    pub fn failing_preset(mut self, name: impl Into<String>) -> Self {
        self.failing_preset = Some(name.into());
        self
    }
}

impl RenderScheduler for FakeRenderScheduler {
    fn existing_job_names(&self) -> Result<Vec<String>, SpliceError> {
        Ok(self.job_names.clone())
    }

    fn load_preset(&self, preset_name: &str) -> Result<(), SpliceError> {
        if self.failing_preset.as_deref() == Some(preset_name) {
            return Err(SpliceError::RenderFailed {
                name: preset_name.to_string(),
                status: "no such render preset".to_string(),
            });
        }
        Ok(())
    }

    fn schedule(&self, job: &RenderJobSpec) -> Result<String, SpliceError> {
        let id = self.next_job_id.get();
        self.next_job_id.set(id + 1);
        Ok(format!("{}:{}", job.custom_name, id))
    }

    fn poll(&self, job_id: &str) -> Result<RenderStatus, SpliceError> {
        let statuses = self
            .scripted
            .get(job_id)
            .ok_or_else(|| SpliceError::RenderFailed {
                name: job_id.to_string(),
                status: "no scripted status for this job id".to_string(),
            })?;
        let mut taken = self.polls_taken.borrow_mut();
        let count = taken.entry(job_id.to_string()).or_insert(0);
        let status = statuses.get(*count).copied().unwrap_or(RenderStatus::Failed);
        *count += 1;
        Ok(status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wait_for_render_returns_immediately_on_complete() {
        let mut scripted = HashMap::new();
        scripted.insert("glue0:0".to_string(), vec![RenderStatus::Complete]);
        let scheduler = FakeRenderScheduler::new(scripted);
        wait_for_render(&scheduler, "glue0:0", Duration::from_millis(1), 5).unwrap();
    }

    #[test]
    fn wait_for_render_polls_until_complete() {
        let mut scripted = HashMap::new();
        scripted.insert(
            "glue0:0".to_string(),
            vec![RenderStatus::Queued, RenderStatus::Rendering, RenderStatus::Complete],
        );
        let scheduler = FakeRenderScheduler::new(scripted);
        wait_for_render(&scheduler, "glue0:0", Duration::from_millis(1), 5).unwrap();
    }

    #[test]
    fn wait_for_render_fails_on_terminal_failure() {
        let mut scripted = HashMap::new();
        scripted.insert("glue0:0".to_string(), vec![RenderStatus::Failed]);
        let scheduler = FakeRenderScheduler::new(scripted);
        let err = wait_for_render(&scheduler, "glue0:0", Duration::from_millis(1), 5).unwrap_err();
        assert!(matches!(err, SpliceError::RenderFailed { .. }));
    }

    #[test]
    fn wait_for_render_times_out_past_max_polls() {
        let mut scripted = HashMap::new();
        scripted.insert(
            "glue0:0".to_string(),
            vec![RenderStatus::Rendering, RenderStatus::Rendering, RenderStatus::Rendering],
        );
        let scheduler = FakeRenderScheduler::new(scripted);
        let err = wait_for_render(&scheduler, "glue0:0", Duration::from_millis(1), 2).unwrap_err();
        assert!(matches!(err, SpliceError::RenderFailed { .. }));
    }

    #[test]
    fn require_template_passes_when_job_name_present() {
        let scheduler = FakeRenderScheduler::new(HashMap::new()).with_job_names(vec!["baseline_v1".to_string()]);
        require_template(&scheduler, "baseline_v1").unwrap();
    }

    #[test]
    fn require_template_fails_when_job_name_absent() {
        let scheduler = FakeRenderScheduler::new(HashMap::new()).with_job_names(vec!["other".to_string()]);
        let err = require_template(&scheduler, "baseline_v1").unwrap_err();
        assert!(matches!(err, SpliceError::NoTemplateRender(name) if name == "baseline_v1"));
    }

    #[test]
    fn load_preset_fails_for_scripted_failure() {
        let scheduler = FakeRenderScheduler::new(HashMap::new()).failing_preset("missing-preset");
        assert!(scheduler.load_preset("missing-preset").is_err());
        assert!(scheduler.load_preset("other-preset").is_ok());
    }

    #[test]
    fn json_timeline_source_reports_missing_index() {
        let source = JsonTimelineSource::new(vec![]);
        assert!(source.timeline_info(0).is_err());
    }

    #[test]
    fn json_timeline_source_looks_up_by_name() {
        let info = TimelineInfo {
            name: "baseline_v1".into(),
            start_frame: 0,
            end_frame: 100,
            track_count: 1,
            framerate: num_rational::Ratio::new(30, 1),
        };
        let source = JsonTimelineSource::new(vec![(info, vec![vec![]])]);
        assert_eq!(source.index_of("baseline_v1").unwrap(), 0);
        assert!(source.index_of("missing").is_err());
    }

    #[test]
    fn json_timeline_source_parses_a_sidecar_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("timelines.json");
        std::fs::write(
            &path,
            r#"{"timelines": [{"name": "t1", "start_frame": 0, "end_frame": 10, "track_count": 1,
               "framerate": [30, 1], "tracks": [[]]}]}"#,
        )
        .unwrap();
        let source = JsonTimelineSource::load_json_file(&path).unwrap();
        assert_eq!(source.timeline_count(), 1);
        assert_eq!(source.timeline_info(0).unwrap().name, "t1");
    }
}
