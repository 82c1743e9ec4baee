use std::fmt;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// A probed video. The duration is fixed for the lifetime of one selection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoSource {
    pub path: PathBuf,
    pub duration_secs: u32,
}

impl VideoSource {
    pub fn new(path: impl Into<PathBuf>, duration_secs: u32) -> Result<Self> {
        let path = path.into();
        if duration_secs == 0 {
            return Err(Error::InvalidArgument(format!(
                "video duration must be at least one second: {}",
                path.to_string_lossy()
            )));
        }
        base_name_of(&path)?;
        Ok(Self {
            path,
            duration_secs,
        })
    }

    /// File name without its extension, used to prefix materialized frames.
    pub fn base_name(&self) -> String {
        base_name_of(&self.path).unwrap_or_default()
    }
}

fn base_name_of(path: &Path) -> Result<String> {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().to_string())
        .filter(|stem| !stem.is_empty())
        .ok_or_else(|| {
            Error::InvalidArgument(format!(
                "video path has no file name: {}",
                path.to_string_lossy()
            ))
        })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameVerdict {
    Blank,
    Meaningful,
}

/// A file written by the extraction tool into the scratch directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFrame {
    pub path: PathBuf,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MaterializedFrame {
    pub raw_name: String,
    pub file_name: String,
    pub path: PathBuf,
}

/// Deterministic media name for a surviving frame.
pub fn materialized_name(base_name: &str, raw_name: &str) -> String {
    format!("{base_name}_{raw_name}")
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CardRecord {
    pub front: String,
    pub back: String,
    pub tag: Option<String>,
}

impl CardRecord {
    pub fn for_frame(frame: &MaterializedFrame, base_name: &str, tag: Option<&str>) -> Self {
        Self {
            front: format!("<img src=\"{}\">", frame.file_name),
            back: base_name.to_string(),
            tag: tag.map(|t| t.to_string()),
        }
    }
}

/// Explicit card settings handed to the note collaborator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CardOptions {
    pub note_type: String,
    pub tag: Option<String>,
}

impl Default for CardOptions {
    fn default() -> Self {
        Self {
            note_type: "Basic".to_string(),
            tag: None,
        }
    }
}

pub type NoteId = i64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameFailure {
    pub frame: String,
    pub reason: String,
    /// Media store path the frame was left at, when it could not be taken back out.
    pub stored: Option<PathBuf>,
}

impl FrameFailure {
    pub fn new(frame: impl Into<String>, reason: impl fmt::Display) -> Self {
        Self {
            frame: frame.into(),
            reason: reason.to_string(),
            stored: None,
        }
    }

    pub fn with_stored(mut self, stored: impl Into<PathBuf>) -> Self {
        self.stored = Some(stored.into());
        self
    }
}

impl From<FrameFailure> for Error {
    fn from(f: FrameFailure) -> Self {
        Error::MaterializeFrameFailed {
            frame: f.frame,
            reason: f.reason,
        }
    }
}

#[derive(Debug, Default, Clone)]
pub struct RunSummary {
    pub materialized: Vec<MaterializedFrame>,
    pub note_ids: Vec<NoteId>,
    pub blank_frames: u64,
    pub failures: Vec<FrameFailure>,
    pub scratch_removed: bool,
}

impl RunSummary {
    pub fn materialized_count(&self) -> usize {
        self.materialized.len()
    }

    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Probing,
    Planning,
    Extracting,
    Materializing,
    Cleanup,
    Failed,
}
