//! CLI integration tests.
//!
//! These test the splice binary's argument parsing and basic error paths.
//! Full pipeline tests require a real ffprobe/ffmpeg toolchain and fixture
//! media, so they live in `splice-core`'s scripted-fake unit tests instead.

use std::process::Command;

fn splice_bin() -> Command {
    Command::new(env!("CARGO_BIN_EXE_splice"))
}

#[test]
fn test_version() {
    let output = splice_bin().arg("--version").output().expect("Failed to run splice");
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(
        stdout.contains("0.1.0"),
        "Version output should contain 0.1.0, got: {}",
        stdout
    );
}

#[test]
fn test_help() {
    let output = splice_bin().arg("--help").output().expect("Failed to run splice");
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("splice"), "Should contain binary name");
    assert!(stdout.contains("--timeline"));
    assert!(stdout.contains("--target-timeline"));
    assert!(stdout.contains("--baseline"));
    assert!(stdout.contains("--output"));
    assert!(stdout.contains("--timelines"));
}

#[test]
fn test_missing_required_args_fails() {
    let output = splice_bin().output().expect("Failed to run splice");
    assert!(!output.status.success(), "Should fail without any arguments");
}

#[test]
fn test_missing_timelines_file_fails() {
    let output = splice_bin()
        .args([
            "-t",
            "baseline_v1",
            "--target-timeline",
            "current",
            "-f",
            "nonexistent_baseline.mp4",
            "-o",
            "out.mp4",
            "--timelines",
            "nonexistent_timelines.json",
        ])
        .output()
        .expect("Failed to run splice");
    assert!(!output.status.success(), "Should fail when the timelines sidecar is missing");
}

#[test]
fn test_unknown_timeline_name_fails() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("timelines.json");
    std::fs::write(
        &path,
        r#"{"timelines": [{"name": "baseline_v1", "start_frame": 0, "end_frame": 10,
           "track_count": 1, "framerate": [30, 1], "tracks": [[]]}]}"#,
    )
    .unwrap();

    let output = splice_bin()
        .args([
            "-t",
            "baseline_v1",
            "--target-timeline",
            "does_not_exist",
            "-f",
            "base.mp4",
            "-o",
            "out.mp4",
            "--timelines",
        ])
        .arg(&path)
        .output()
        .expect("Failed to run splice");
    assert!(!output.status.success(), "Should fail when the target timeline name is absent");
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("does_not_exist"), "Error should name the missing timeline, got: {}", stderr);
}
