//! Splice planner CLI.
//!
//! Computes which GOP ranges of a previously rendered baseline can be
//! stream-copied into a revised timeline's export, schedules re-renders for
//! the remainder, and muxes the result.
//!
//! Usage:
//!     splice -t baseline_v1 --target-timeline current -f ./renders/baseline_v1.mp4 \
//!            -o ./renders/spliced.mp4 --timelines ./project_timelines.json \
//!            --render-bridge ./bin/render-bridge

use std::path::Path;
use std::time::Duration;

use clap::Parser;

use splice_core::diff::diff;
use splice_core::emitter::{emit_script, glue_file_name, FfmpegMuxer, Muxer};
use splice_core::error::SpliceError;
use splice_core::keyframe::KeyframeOracle;
use splice_core::models::{Frame, Rational, TimelineDescription};
use splice_core::nle::{
    require_template, wait_for_render, CommandRenderScheduler, JsonTimelineSource, RenderJobSpec, RenderScheduler, TimelineSource,
};
use splice_core::planner::plan_splice;
use splice_core::probe::FfprobeProbe;
use splice_core::projector::project;
use splice_core::workspace::ScratchDir;
use splice_core::Segment;

#[derive(Parser)]
#[command(
    name = "splice",
    version,
    about = "Partial-rerender splice planner for non-linear video editor timelines",
    long_about = "Given a baseline render, its timeline, and a revised timeline, computes \
                  which GOP ranges of the baseline can be stream-copied and which spans \
                  must be re-rendered, then emits a concat-muxer script and drives the mux."
)]
struct Cli {
    /// Name of the baseline timeline, as recorded in --timelines.
    #[arg(short = 't', long = "timeline")]
    timeline: String,

    /// Name of the revised (target) timeline, as recorded in --timelines.
    #[arg(long = "target-timeline")]
    target_timeline: String,

    /// Path to the baseline's previously rendered media file.
    #[arg(short = 'f', long = "baseline")]
    baseline: String,

    /// Output splice path.
    #[arg(short = 'o', long = "output")]
    output: String,

    /// JSON sidecar describing every enumerable timeline (stand-in for a
    /// live NLE scripting session; see `splice_core::nle::JsonTimelineSource`).
    #[arg(long = "timelines")]
    timelines_file: String,

    /// Render preset name loaded into the session before any job is
    /// scheduled (audio export, glue renders). Fails the run if the bridge
    /// can't find it.
    #[arg(long = "render-preset")]
    render_preset: Option<String>,

    /// Executable bridging render-job scheduling to the live NLE session.
    /// Required to execute a plan: even a plan with no glue renders still
    /// schedules a full audio re-export.
    #[arg(long = "render-bridge")]
    render_bridge: Option<String>,

    /// Emit verbose per-stage debug logging.
    #[arg(long = "debug-logs")]
    debug_logs: bool,

    /// Leave the scratch directory on disk after the run instead of
    /// deleting it.
    #[arg(long = "debug-unique-name")]
    debug_unique_name: bool,

    /// Log a summary of scheduled render jobs as they complete.
    #[arg(long = "debug-report")]
    debug_report: bool,

    /// Verbose logging (equivalent to --debug-logs).
    #[arg(short, long)]
    verbose: bool,

    /// Print the segment plan and concat script as JSON instead of invoking
    /// the NLE/muxer collaborators — a dry run suited to CI and snapshotting.
    #[arg(long)]
    json: bool,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose || cli.debug_logs { "debug" } else { "info" };
    // SAFETY: set once, before any other thread exists, at process start.
    unsafe {
        std::env::set_var("RUST_LOG", format!("splice={}", level));
    }
    env_logger::init();

    let ctx = build_plan(&cli)?;

    if cli.json {
        let ext = extension_of(&cli.baseline);
        let script = emit_script(&ctx.plan, &cli.baseline, "<scratch>", ctx.framerate, &ext);
        let preview = PlanPreview {
            original_segments: ctx.plan.iter().filter(|s| !s.is_target()).count(),
            target_segments: ctx.plan.iter().filter(|s| s.is_target()).count(),
            total_duration_frames: ctx.plan.iter().map(Segment::duration).sum(),
            segments: &ctx.plan,
            script: &script,
        };
        println!("{}", serde_json::to_string_pretty(&preview)?);
        return Ok(());
    }

    let summary = execute_plan(&cli, &ctx)?;
    print_report(&summary);
    Ok(())
}

#[derive(serde::Serialize)]
struct PlanPreview<'a> {
    original_segments: usize,
    target_segments: usize,
    total_duration_frames: i64,
    segments: &'a [Segment],
    script: &'a str,
}

struct PlanSummary {
    original_segments: usize,
    target_segments: usize,
    total_duration_frames: i64,
    output_path: String,
}

/// Everything downstream of the planner passes needs, carried as one unit
/// so `execute_plan` doesn't have to re-derive the baseline's absolute NLE
/// timeline coordinates.
struct PlanContext {
    plan: Vec<Segment>,
    framerate: Rational,
    /// Absolute NLE timeline frame the baseline/target share as their
    /// origin. `TargetSegment::original_frame` is local to this origin, not
    /// an absolute NLE frame, so render jobs must add it back in.
    start_frame: Frame,
    /// Absolute NLE end frame of the baseline timeline — the full audio
    /// re-export spans the baseline's own range, not the target's.
    baseline_end_frame: Frame,
}

/// Stages 1–4: load timelines, project, diff, and run the planner passes.
/// Shared by both the `--json` dry run and the executing path.
fn build_plan(cli: &Cli) -> anyhow::Result<PlanContext> {
    log::info!("loading timelines from {}", cli.timelines_file);
    let source = JsonTimelineSource::load_json_file(&cli.timelines_file)?;

    let baseline_idx = source.index_of(&cli.timeline)?;
    let target_idx = source.index_of(&cli.target_timeline)?;

    let baseline = load_timeline(&source, baseline_idx)?;
    let target = load_timeline(&source, target_idx)?;

    if baseline.start_frame != target.start_frame || baseline.framerate != target.framerate {
        return Err(SpliceError::InputMismatch(
            "baseline and target timelines have differing start frames or framerates".into(),
        )
        .into());
    }

    log::debug!("projecting baseline and target timelines");
    let baseline_sequence = project(&baseline);
    let target_sequence = project(&target);

    log::debug!(
        "diffing {} baseline frames against {} target frames",
        baseline_sequence.len(),
        target_sequence.len()
    );
    let segments = diff(&baseline_sequence, &target_sequence);

    let probe = FfprobeProbe;
    let oracle = KeyframeOracle::new(&probe, cli.baseline.clone(), baseline.framerate);

    log::debug!("running snap & glue planner passes");
    let plan = plan_splice(segments, &oracle, baseline_sequence.len() as i64, target.length())
        .map_err(anyhow::Error::from)?;

    Ok(PlanContext {
        plan,
        framerate: baseline.framerate,
        start_frame: baseline.start_frame,
        baseline_end_frame: baseline.end_frame,
    })
}

/// Stage 5: strip the baseline's audio, schedule the full audio re-export
/// plus any needed glue renders, write the concat script into a real scratch
/// directory, concat the video-only segments, and remux the audio back in.
fn execute_plan(cli: &Cli, ctx: &PlanContext) -> anyhow::Result<PlanSummary> {
    let Some(bridge) = &cli.render_bridge else {
        anyhow::bail!("--render-bridge is required to execute a plan (it always schedules a full audio re-export)");
    };
    let scheduler = CommandRenderScheduler::new(bridge.clone());

    require_template(&scheduler, &cli.timeline).map_err(anyhow::Error::from)?;
    if let Some(preset) = &cli.render_preset {
        scheduler.load_preset(preset).map_err(anyhow::Error::from)?;
    }

    let scratch = ScratchDir::new()?;
    let ext = extension_of(&cli.baseline);

    let muxer = FfmpegMuxer;
    muxer
        .strip_video(&cli.baseline, &scratch.base_path(&ext).to_string_lossy())
        .map_err(anyhow::Error::from)?;

    schedule_audio_export(&scheduler, &scratch, ctx.start_frame, ctx.baseline_end_frame)?;
    let glue_count = schedule_glue_renders(&ctx.plan, &scheduler, &scratch, &ext, ctx.start_frame)?;

    if cli.debug_report {
        log::info!("render bridge '{}' completed 1 audio export and {} glue job(s)", bridge, glue_count);
    }

    let script = emit_script(
        &ctx.plan,
        &scratch.base_path(&ext).to_string_lossy(),
        &scratch.path().to_string_lossy(),
        ctx.framerate,
        &ext,
    );
    std::fs::write(scratch.script_path(), &script)
        .map_err(|e| SpliceError::MuxFailed(format!("failed to write concat script: {}", e)))?;

    let video_only = scratch.video_only_path(&ext);
    muxer
        .concat(&scratch.script_path().to_string_lossy(), &video_only.to_string_lossy())
        .map_err(anyhow::Error::from)?;

    muxer
        .remux_audio(&video_only.to_string_lossy(), &scratch.audio_path(&ext).to_string_lossy(), &cli.output)
        .map_err(anyhow::Error::from)?;

    let original_segments = ctx.plan.iter().filter(|s| !s.is_target()).count();
    let target_segments = ctx.plan.iter().filter(|s| s.is_target()).count();
    let total_duration_frames = ctx.plan.iter().map(Segment::duration).sum();

    if cli.debug_unique_name {
        let persisted = scratch.persist();
        log::info!("scratch directory preserved at {}", persisted.display());
    }

    Ok(PlanSummary {
        original_segments,
        target_segments,
        total_duration_frames,
        output_path: cli.output.clone(),
    })
}

fn extension_of(path: &str) -> String {
    Path::new(path)
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("mp4")
        .to_string()
}

fn load_timeline(source: &JsonTimelineSource, index: usize) -> Result<TimelineDescription, SpliceError> {
    let info = source.timeline_info(index)?;
    let mut video_tracks = Vec::with_capacity(info.track_count);
    for track in 0..info.track_count {
        video_tracks.push(source.timeline_items(index, track)?);
    }
    Ok(TimelineDescription {
        start_frame: info.start_frame,
        end_frame: info.end_frame,
        framerate: info.framerate,
        video_tracks,
    })
}

/// Schedules the full-timeline audio re-export that every run needs
/// (spec §4.5 supplement), spanning the baseline timeline's own absolute
/// frame range rather than the target's.
fn schedule_audio_export(
    scheduler: &CommandRenderScheduler,
    scratch: &ScratchDir,
    start_frame: Frame,
    end_frame: Frame,
) -> anyhow::Result<()> {
    let job = RenderJobSpec {
        mark_in: start_frame,
        mark_out: end_frame,
        export_video: false,
        export_audio: true,
        target_dir: scratch.path().to_string_lossy().to_string(),
        custom_name: "audio".to_string(),
    };
    log::debug!("scheduling full audio re-export {:?}", job);
    let job_id = scheduler.schedule(&job).map_err(anyhow::Error::from)?;
    wait_for_render(scheduler, &job_id, Duration::from_secs(1), 3600).map_err(anyhow::Error::from)?;
    Ok(())
}

/// Schedules one glue render per `TargetSegment`, returning how many were
/// scheduled. `start_frame` converts each segment's target-timeline-local
/// `original_frame` into the absolute NLE frame the render job needs.
fn schedule_glue_renders(
    plan: &[Segment],
    scheduler: &CommandRenderScheduler,
    scratch: &ScratchDir,
    ext: &str,
    start_frame: Frame,
) -> anyhow::Result<usize> {
    let mut glue_index = 0usize;

    for seg in plan {
        if let Segment::Target(t) = seg {
            let job = RenderJobSpec {
                mark_in: start_frame + t.original_frame,
                mark_out: start_frame + t.original_frame + t.duration,
                export_video: true,
                export_audio: false,
                target_dir: scratch.path().to_string_lossy().to_string(),
                custom_name: glue_file_name(glue_index, ext),
            };
            log::debug!("scheduling glue render {:?}", job);
            let job_id = scheduler.schedule(&job).map_err(anyhow::Error::from)?;
            wait_for_render(scheduler, &job_id, Duration::from_secs(1), 3600).map_err(anyhow::Error::from)?;
            glue_index += 1;
        }
    }

    Ok(glue_index)
}

fn print_report(summary: &PlanSummary) {
    eprintln!("===========================");
    eprintln!("  Splice Planner — Result");
    eprintln!("===========================\n");
    eprintln!("Original segments: {}", summary.original_segments);
    eprintln!("Target segments:   {}", summary.target_segments);
    eprintln!("Total duration:    {} frames", summary.total_duration_frames);
    eprintln!("Output:            {}", summary.output_path);
}
