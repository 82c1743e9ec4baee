#![cfg(unix)]

use std::path::{Path, PathBuf};
use std::time::Duration;

use framecards_core::db::SqliteNoteStore;
use framecards_core::extract::ExtractTool;
use framecards_core::run::{run, run_with_progress, RunConfig, RunProgress};
use framecards_core::video::ProbeTool;
use framecards_core::{CardRecord, Error, RunState};
use image::{Rgb, RgbImage};

fn sh(script: &str) -> (PathBuf, Vec<String>) {
    (
        PathBuf::from("/bin/sh"),
        vec!["-c".to_string(), script.to_string(), "sh".to_string()],
    )
}

fn probe_reporting(output: &str) -> ProbeTool {
    let (program, flags) = sh(&format!("echo '{output}'"));
    ProbeTool {
        program,
        flags,
        marker: "LENGTH=".to_string(),
    }
}

/// Copies every fixture into the output dir, but only for `--step=<expected>`.
fn extractor_copying(fixtures: &Path, expected_step: u32) -> ExtractTool {
    let script = format!(
        r#"for a in "$@"; do
  case "$a" in
    --out=*) out="${{a#--out=}}" ;;
    --step=*) step="${{a#--step=}}" ;;
  esac
done
[ "$step" = "{expected_step}" ] || exit 4
cp "{}"/* "$out"/"#,
        fixtures.to_string_lossy()
    );
    let (program, flags) = sh(&script);
    ExtractTool {
        program,
        flags,
        output_dir_prefix: "--out=".to_string(),
        step_prefix: "--step=".to_string(),
    }
}

fn write_fixtures(dir: &Path, count: usize, black: &[usize]) {
    for i in 1..=count {
        let pixel = if black.contains(&i) {
            Rgb([0, 0, 0])
        } else {
            let value = (i * 20) as u8;
            Rgb([value, value / 2, 10])
        };
        RgbImage::from_pixel(32, 18, pixel)
            .save(dir.join(format!("{i:08}.png")))
            .unwrap();
    }
}

fn dir_entries(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
        .collect();
    names.sort();
    names
}

#[test]
fn hundred_second_video_every_ten_seconds() {
    let fixtures = tempfile::tempdir().unwrap();
    let media = tempfile::tempdir().unwrap();
    let scratch = tempfile::tempdir().unwrap();
    let audit = tempfile::tempdir().unwrap();
    let notes_dir = tempfile::tempdir().unwrap();
    write_fixtures(fixtures.path(), 10, &[4]);

    let mut config = RunConfig::new("/videos/lecture.mp4", media.path());
    config.interval = Some(10);
    config.scratch_root = Some(scratch.path().to_path_buf());
    config.audit_dir = Some(audit.path().to_path_buf());
    config.card.tag = Some("lecture".to_string());
    config.probe = probe_reporting("Playing lecture.mp4 LENGTH=100.480000 (+) Video");
    config.extract = extractor_copying(fixtures.path(), 10);
    config.poll_interval = Duration::from_millis(10);

    let mut notes =
        SqliteNoteStore::open(&notes_dir.path().join("notes.sqlite"), &config.card)
            .unwrap();

    let mut states = Vec::new();
    let mut planned = None;
    let summary = run_with_progress(&config, &mut notes, None, |p| match p {
        RunProgress::State(s) => states.push(*s),
        RunProgress::Planned { plan, .. } => {
            planned = Some((plan.interval_secs(), plan.frame_count()))
        }
        _ => {}
    })
    .unwrap();

    assert_eq!(planned, Some((10, 10)));
    assert_eq!(
        states,
        vec![
            RunState::Probing,
            RunState::Planning,
            RunState::Extracting,
            RunState::Materializing,
            RunState::Cleanup,
            RunState::Idle,
        ]
    );

    assert!(summary.is_clean());
    assert_eq!(summary.materialized_count(), 9);
    assert_eq!(summary.blank_frames, 1);
    assert!(summary.scratch_removed);
    assert!(dir_entries(scratch.path()).is_empty());

    let stored = dir_entries(media.path());
    assert_eq!(stored.len(), 9);
    assert!(stored.iter().all(|n| n.starts_with("lecture_")));
    assert!(!stored.contains(&"lecture_00000004.png".to_string()));

    assert_eq!(notes.count_notes().unwrap(), 9);
    let first = &notes.list_notes().unwrap()[0];
    assert_eq!(
        first.card,
        CardRecord {
            front: "<img src=\"lecture_00000001.png\">".to_string(),
            back: "lecture".to_string(),
            tag: Some("lecture".to_string()),
        }
    );
    assert_eq!(first.note_type, "Basic");

    let log = std::fs::read_to_string(audit.path().join("lecture.csv")).unwrap();
    let lines: Vec<&str> = log.lines().collect();
    assert_eq!(lines.len(), 9);
    assert_eq!(lines[0], "lecture;00000001.png");
}

#[test]
fn frame_count_drives_the_step() {
    let fixtures = tempfile::tempdir().unwrap();
    let media = tempfile::tempdir().unwrap();
    write_fixtures(fixtures.path(), 3, &[]);

    let mut config = RunConfig::new("/videos/clip.mkv", media.path());
    config.frame_count = Some(3);
    config.probe = probe_reporting("LENGTH=100");
    // 100 / 3 frames -> one frame every 33 seconds
    config.extract = extractor_copying(fixtures.path(), 33);
    config.poll_interval = Duration::from_millis(10);

    let mut notes: Vec<CardRecord> = Vec::new();
    let summary = run(&config, &mut notes).unwrap();
    assert_eq!(summary.materialized_count(), 3);
    assert_eq!(notes.len(), 3);
    assert_eq!(notes[2].back, "clip");
}

#[test]
fn failing_extractor_fails_the_run_and_leaves_no_scratch() {
    let media = tempfile::tempdir().unwrap();
    let scratch = tempfile::tempdir().unwrap();

    let mut config = RunConfig::new("/videos/clip.mp4", media.path());
    config.scratch_root = Some(scratch.path().to_path_buf());
    config.probe = probe_reporting("LENGTH=100");
    let (program, flags) = sh("exit 1");
    config.extract = ExtractTool {
        program,
        flags,
        ..ExtractTool::default()
    };
    config.poll_interval = Duration::from_millis(10);

    let mut states = Vec::new();
    let mut notes: Vec<CardRecord> = Vec::new();
    let err = run_with_progress(&config, &mut notes, None, |p| {
        if let RunProgress::State(s) = p {
            states.push(*s);
        }
    })
    .unwrap_err();

    assert!(matches!(err, Error::ExtractionFailed(_)));
    assert_eq!(
        states,
        vec![
            RunState::Probing,
            RunState::Planning,
            RunState::Extracting,
            RunState::Cleanup,
            RunState::Failed,
        ]
    );
    assert!(dir_entries(scratch.path()).is_empty());
    assert!(notes.is_empty());
}

#[test]
fn missing_length_marker_is_probe_failure() {
    let media = tempfile::tempdir().unwrap();
    let mut config = RunConfig::new("/videos/clip.mp4", media.path());
    config.probe = probe_reporting("Playing clip.mp4");

    let mut notes: Vec<CardRecord> = Vec::new();
    let err = run(&config, &mut notes).unwrap_err();
    assert!(matches!(err, Error::ProbeFailed { .. }));
}
