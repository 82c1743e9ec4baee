use std::env;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use regex::Regex;

use crate::error::{Error, Result};
use crate::models::VideoSource;

pub trait DurationProbe {
    /// Duration of the video at `path` in whole seconds.
    fn duration_secs(&self, path: &Path) -> Result<u32>;
}

/// External player invoked as `<program> <flags..> <path>` that prints
/// `<marker><seconds>` somewhere in its output.
#[derive(Debug, Clone)]
pub struct ProbeTool {
    pub program: PathBuf,
    pub flags: Vec<String>,
    pub marker: String,
}

impl Default for ProbeTool {
    fn default() -> Self {
        Self {
            program: PathBuf::from("mpv"),
            flags: [
                "--term-playing-msg=LENGTH=${=duration}",
                "--vo=null",
                "--ao=null",
                "--frames=1",
                "--no-cache",
                "--no-config",
                "--quiet",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            marker: "LENGTH=".to_string(),
        }
    }
}

impl DurationProbe for ProbeTool {
    fn duration_secs(&self, path: &Path) -> Result<u32> {
        let failed = |reason: String| Error::ProbeFailed {
            path: path.to_path_buf(),
            reason,
        };

        let program = resolve_program(&self.program);
        tracing::debug!(
            "probing duration: {} {:?} {}",
            program.to_string_lossy(),
            self.flags,
            path.to_string_lossy()
        );
        let output = Command::new(&program)
            .args(&self.flags)
            .arg(path)
            .stdin(Stdio::null())
            .output()
            .map_err(|err| {
                failed(format!(
                    "could not start {}: {err}",
                    program.to_string_lossy()
                ))
            })?;

        if !output.status.success() {
            return Err(failed(format!(
                "{} exited with {}",
                program.to_string_lossy(),
                output.status
            )));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        parse_duration(&stdout, &self.marker)
            .or_else(|| parse_duration(&stderr, &self.marker))
            .ok_or_else(|| failed(format!("no {}<seconds> in tool output", self.marker)))
    }
}

/// Finds the first `<marker><digits>` token and returns the whole seconds.
/// Fractional digits after the integer part are ignored.
pub fn parse_duration(output: &str, marker: &str) -> Option<u32> {
    let pattern = format!(r"{}(\d+)", regex::escape(marker));
    let re = Regex::new(&pattern).ok()?;
    re.captures(output)?.get(1)?.as_str().parse().ok()
}

/// Probes `path` once and builds the selection's [`VideoSource`].
pub fn probe_video(probe: &dyn DurationProbe, path: &Path) -> Result<VideoSource> {
    let duration_secs = probe.duration_secs(path)?;
    if duration_secs == 0 {
        return Err(Error::ProbeFailed {
            path: path.to_path_buf(),
            reason: "reported duration is zero seconds".to_string(),
        });
    }
    tracing::info!("{} is {duration_secs}s long", path.to_string_lossy());
    VideoSource::new(path, duration_secs)
}

/// Returns true when `program --version` can be started.
pub fn check_tool(program: &Path) -> bool {
    let program = resolve_program(program);
    Command::new(&program)
        .arg("--version")
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .is_ok()
}

/// A bare program name is preferred from the executable's own directory,
/// otherwise it is left for `PATH` lookup.
pub fn resolve_program(program: &Path) -> PathBuf {
    if program.components().count() != 1 {
        return program.to_path_buf();
    }

    if let Ok(mut exe_dir) = env::current_exe() {
        exe_dir.pop();
        let mut bundled = exe_dir.join(program);
        if cfg!(windows) && bundled.extension().is_none() {
            bundled.set_extension("exe");
        }
        if bundled.is_file() {
            return bundled;
        }
    }

    program.to_path_buf()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_marker_surrounded_by_noise() {
        assert_eq!(parse_duration("...LENGTH=142...", "LENGTH="), Some(142));
        assert_eq!(
            parse_duration("Playing: clip.mp4\n \"LENGTH=93.466000\"\nExiting", "LENGTH="),
            Some(93)
        );
    }

    #[test]
    fn missing_marker_yields_none() {
        assert_eq!(parse_duration("Playing: clip.mp4", "LENGTH="), None);
        assert_eq!(parse_duration("LENGTH=", "LENGTH="), None);
        assert_eq!(parse_duration("LENGTH=abc", "LENGTH="), None);
    }

    #[test]
    fn marker_is_matched_literally() {
        assert_eq!(parse_duration("d=(7)", "d=("), Some(7));
    }

    struct Fixed(u32);

    impl DurationProbe for Fixed {
        fn duration_secs(&self, _path: &Path) -> Result<u32> {
            Ok(self.0)
        }
    }

    #[test]
    fn zero_duration_probe_is_a_failure() {
        let err = probe_video(&Fixed(0), Path::new("clip.mp4")).unwrap_err();
        assert!(matches!(err, Error::ProbeFailed { .. }));
    }

    #[test]
    fn probe_video_builds_source() {
        let source = probe_video(&Fixed(142), Path::new("/v/clip.mp4")).unwrap();
        assert_eq!(source.duration_secs, 142);
        assert_eq!(source.base_name(), "clip");
    }

    #[test]
    fn paths_with_directories_are_not_resolved() {
        assert_eq!(
            resolve_program(Path::new("/usr/bin/mpv")),
            PathBuf::from("/usr/bin/mpv")
        );
    }

    #[cfg(unix)]
    #[test]
    fn tool_output_is_parsed() {
        let probe = ProbeTool {
            program: PathBuf::from("/bin/sh"),
            flags: vec![
                "-c".to_string(),
                "echo 'Playing...'; echo 'LENGTH=142.04'".to_string(),
                "sh".to_string(),
            ],
            marker: "LENGTH=".to_string(),
        };
        assert_eq!(probe.duration_secs(Path::new("clip.mp4")).unwrap(), 142);
    }

    #[cfg(unix)]
    #[test]
    fn non_zero_exit_is_probe_failure() {
        let probe = ProbeTool {
            program: PathBuf::from("/bin/sh"),
            flags: vec!["-c".to_string(), "echo LENGTH=5; exit 3".to_string(), "sh".to_string()],
            marker: "LENGTH=".to_string(),
        };
        let err = probe.duration_secs(Path::new("clip.mp4")).unwrap_err();
        assert!(matches!(err, Error::ProbeFailed { .. }));
    }

    #[test]
    fn missing_program_is_probe_failure() {
        let probe = ProbeTool {
            program: PathBuf::from("/nonexistent/framecards-probe"),
            ..ProbeTool::default()
        };
        let err = probe.duration_secs(Path::new("clip.mp4")).unwrap_err();
        assert!(matches!(err, Error::ProbeFailed { .. }));
        assert!(!check_tool(Path::new("/nonexistent/framecards-probe")));
    }
}
