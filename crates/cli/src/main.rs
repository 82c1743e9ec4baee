use std::path::{Path, PathBuf};

use framecards_core::db::SqliteNoteStore;
use framecards_core::plan::SamplingPlan;
use framecards_core::run::{run_with_progress, RunCancelToken, RunConfig, RunProgress};
use framecards_core::video::{check_tool, probe_video, ProbeTool};
use framecards_core::{Error, FrameVerdict, Result, RunState};

fn main() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .init();

    match real_main() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(2);
        }
    }
}

fn real_main() -> Result<i32> {
    let mut args = std::env::args().skip(1);
    let Some(cmd) = args.next() else {
        print_help();
        return Ok(0);
    };

    match cmd.as_str() {
        "--help" | "-h" | "help" => {
            print_help();
            Ok(0)
        }
        "probe" => {
            let mut video: Option<PathBuf> = None;
            let mut probe = ProbeTool::default();

            while let Some(arg) = args.next() {
                match arg.as_str() {
                    "--video" => video = args.next().map(PathBuf::from),
                    "--probe-tool" => probe.program = required_path(&mut args, "--probe-tool")?,
                    _ => return Err(unknown_arg(&arg)),
                }
            }

            let video = video.ok_or_else(|| missing("--video <path>"))?;
            let source = probe_video(&probe, &video)?;
            println!("duration_secs: {}", source.duration_secs);
            Ok(0)
        }
        "plan" => {
            let mut duration: Option<u32> = None;
            let mut interval: Option<u32> = None;
            let mut frames: Option<u32> = None;

            while let Some(arg) = args.next() {
                match arg.as_str() {
                    "--duration" => duration = Some(required_number(&mut args, "--duration")?),
                    "--interval" => interval = Some(required_number(&mut args, "--interval")?),
                    "--frames" => frames = Some(required_number(&mut args, "--frames")?),
                    _ => return Err(unknown_arg(&arg)),
                }
            }

            let duration = duration.ok_or_else(|| missing("--duration <seconds>"))?;
            let plan = match (interval, frames) {
                (Some(_), Some(_)) => {
                    return Err(Error::InvalidArgument(
                        "use either --interval or --frames".to_string(),
                    ))
                }
                (Some(i), None) => SamplingPlan::with_interval(duration, i)?,
                (None, Some(n)) => SamplingPlan::with_frame_count(duration, n)?,
                (None, None) => SamplingPlan::new(duration)?,
            };
            println!(
                "interval_secs: {}, frame_count: {}",
                plan.interval_secs(),
                plan.frame_count()
            );
            Ok(0)
        }
        "extract" => {
            let mut video: Option<PathBuf> = None;
            let mut media: Option<PathBuf> = None;
            let mut notes: Option<PathBuf> = None;
            let mut note_type: Option<String> = None;
            let mut rest = Vec::new();

            while let Some(arg) = args.next() {
                match arg.as_str() {
                    "--video" => video = args.next().map(PathBuf::from),
                    "--media" => media = args.next().map(PathBuf::from),
                    "--notes" => notes = args.next().map(PathBuf::from),
                    "--note-type" => note_type = args.next(),
                    _ => rest.push(arg),
                }
            }

            let video = video.ok_or_else(|| missing("--video <path>"))?;
            let media = media.ok_or_else(|| missing("--media <dir>"))?;
            if !is_video(&video) {
                tracing::warn!(
                    "{} does not look like a supported video file",
                    video.to_string_lossy()
                );
            }
            let mut config = RunConfig::new(video, media);
            if let Some(note_type) = note_type {
                config.card.note_type = note_type;
            }
            apply_run_args(&mut config, rest)?;

            let notes_path = match notes {
                Some(p) => p,
                None => default_notes_path()?,
            };
            let mut store = SqliteNoteStore::open(&notes_path, &config.card)?;

            let cancel = RunCancelToken::new();
            let handler_token = cancel.clone();
            if let Err(err) = ctrlc::set_handler(move || handler_token.cancel()) {
                tracing::warn!("could not install Ctrl-C handler: {err}");
            }

            let summary = run_with_progress(&config, &mut store, Some(&cancel), print_progress)?;

            println!(
                "materialized: {}, blank: {}, failed: {}, notes: {}",
                summary.materialized_count(),
                summary.blank_frames,
                summary.failures.len(),
                notes_path.to_string_lossy()
            );
            for failure in &summary.failures {
                eprintln!("  {}: {}", failure.frame, failure.reason);
                if let Some(stored) = &failure.stored {
                    eprintln!("    left at {}", stored.to_string_lossy());
                }
            }
            if !summary.scratch_removed {
                eprintln!("warning: scratch directory could not be fully removed");
            }
            Ok(if summary.is_clean() { 0 } else { 1 })
        }
        "check" => {
            let mut tools: Vec<PathBuf> = Vec::new();
            while let Some(arg) = args.next() {
                match arg.as_str() {
                    "--tool" => tools.push(required_path(&mut args, "--tool")?),
                    _ => return Err(unknown_arg(&arg)),
                }
            }
            if tools.is_empty() {
                tools.push(ProbeTool::default().program);
            }

            let mut code = 0;
            for tool in &tools {
                let found = check_tool(tool);
                println!(
                    "{}: {}",
                    tool.to_string_lossy(),
                    if found { "found" } else { "not found" }
                );
                if !found {
                    code = 1;
                }
            }
            Ok(code)
        }
        _ => Err(Error::InvalidArgument(format!("unknown command: {cmd}"))),
    }
}

fn apply_run_args(config: &mut RunConfig, args: Vec<String>) -> Result<()> {
    let mut args = args.into_iter();
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--interval" => config.interval = Some(required_number(&mut args, "--interval")?),
            "--frames" => config.frame_count = Some(required_number(&mut args, "--frames")?),
            "--tag" => config.card.tag = Some(args.next().ok_or_else(|| missing("--tag <tag>"))?),
            "--audit" => config.audit_dir = Some(required_path(&mut args, "--audit")?),
            "--scratch" => config.scratch_root = Some(required_path(&mut args, "--scratch")?),
            "--probe-tool" => config.probe.program = required_path(&mut args, "--probe-tool")?,
            "--extract-tool" => {
                config.extract.program = required_path(&mut args, "--extract-tool")?
            }
            _ => return Err(unknown_arg(&arg)),
        }
    }
    Ok(())
}

fn print_progress(progress: &RunProgress) {
    match progress {
        RunProgress::State(RunState::Extracting) => eprintln!("extracting frames..."),
        RunProgress::Planned { source, plan } => eprintln!(
            "{}: {}s, one frame every {}s (~{} frames)",
            source.base_name(),
            source.duration_secs,
            plan.interval_secs(),
            plan.frame_count()
        ),
        RunProgress::Frame(frame) => {
            let verdict = match frame.verdict {
                Some(FrameVerdict::Meaningful) => "kept",
                Some(FrameVerdict::Blank) => "blank",
                None => "failed",
            };
            eprintln!("[{}/{}] {} {verdict}", frame.index + 1, frame.total, frame.name);
        }
        _ => {}
    }
}

fn default_notes_path() -> Result<PathBuf> {
    let dir = dirs::data_dir()
        .map(|d| d.join("framecards"))
        .ok_or_else(|| missing("--notes <sqlite_path> (no platform data directory)"))?;
    std::fs::create_dir_all(&dir)?;
    Ok(dir.join("notes.sqlite"))
}

fn required_path(args: &mut impl Iterator<Item = String>, flag: &str) -> Result<PathBuf> {
    args.next()
        .map(PathBuf::from)
        .ok_or_else(|| missing(&format!("{flag} <path>")))
}

fn required_number(args: &mut impl Iterator<Item = String>, flag: &str) -> Result<u32> {
    let value = args
        .next()
        .ok_or_else(|| missing(&format!("{flag} <number>")))?;
    value
        .parse()
        .map_err(|_| Error::InvalidArgument(format!("{flag} expects a number, got {value}")))
}

fn missing(what: &str) -> Error {
    Error::InvalidArgument(format!("missing {what}"))
}

fn unknown_arg(arg: &str) -> Error {
    Error::InvalidArgument(format!("unknown arg: {arg}"))
}

fn is_video(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            matches!(
                ext.to_lowercase().as_str(),
                "avi" | "flv" | "mkv" | "mp4" | "mpg" | "wmv"
            )
        })
        .unwrap_or(false)
}

fn print_help() {
    println!(
        r#"framecards

USAGE:
  framecards probe   --video <path> [--probe-tool <program>]
  framecards plan    --duration <seconds> [--interval <seconds> | --frames <count>]
  framecards extract --video <path> --media <dir> [--notes <sqlite_path>]
                     [--interval <seconds> | --frames <count>] [--tag <tag>]
                     [--note-type <name>] [--audit <dir>] [--scratch <dir>]
                     [--probe-tool <program>] [--extract-tool <program>]
  framecards check   [--tool <program>]...

NOTES:
  - Frames are dumped by mpv into a scratch directory, fully black frames are
    dropped, and the rest are moved into the media directory as
    <video>_<frame> with one Basic note per frame.
  - Notes are stored in a standalone SQLite DB, by default under the platform
    data directory.
"#
    );
}
