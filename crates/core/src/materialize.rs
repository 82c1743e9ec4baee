use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use crate::blank::BlankFilter;
use crate::error::Result;
use crate::extract::ScratchDirectory;
use crate::models::{
    materialized_name, CardRecord, FrameFailure, FrameVerdict, MaterializedFrame, NoteId,
    RawFrame, RunSummary, VideoSource,
};

/// Durable home for surviving frames.
pub trait MediaStore {
    /// Moves `src` into the store as `dest_name` and returns its new path.
    fn store(&mut self, src: &Path, dest_name: &str) -> Result<PathBuf>;

    /// Removes a file previously returned by [`MediaStore::store`].
    fn discard(&mut self, stored: &Path) -> Result<()>;
}

/// Receives one card per surviving frame.
pub trait NoteSink {
    fn add_note(&mut self, card: &CardRecord) -> Result<NoteId>;
}

impl NoteSink for Vec<CardRecord> {
    fn add_note(&mut self, card: &CardRecord) -> Result<NoteId> {
        self.push(card.clone());
        Ok(self.len() as NoteId - 1)
    }
}

/// Media store backed by a plain directory, such as a collection's media folder.
#[derive(Debug, Clone)]
pub struct DirMediaStore {
    root: PathBuf,
}

impl DirMediaStore {
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl MediaStore for DirMediaStore {
    fn store(&mut self, src: &Path, dest_name: &str) -> Result<PathBuf> {
        let dest = self.root.join(dest_name);
        match fs::rename(src, &dest) {
            Ok(()) => Ok(dest),
            // only a source file that rename could not move across filesystems
            // is worth a copy; anything else keeps the rename error
            Err(err) if !src.is_file() || dest.is_dir() => Err(err.into()),
            Err(rename_err) => {
                copy_then_remove(src, &dest).map_err(|copy_err| {
                    io::Error::new(
                        copy_err.kind(),
                        format!("rename failed ({rename_err}), copy failed ({copy_err})"),
                    )
                })?;
                Ok(dest)
            }
        }
    }

    fn discard(&mut self, stored: &Path) -> Result<()> {
        fs::remove_file(stored)?;
        Ok(())
    }
}

/// Copies `src` to `dest` and removes `src`. If the source cannot be
/// removed the copy is deleted again, so the file only ever lives in one place.
pub fn copy_then_remove(src: &Path, dest: &Path) -> io::Result<()> {
    fs::copy(src, dest)?;
    if let Err(err) = fs::remove_file(src) {
        let _ = fs::remove_file(dest);
        return Err(err);
    }
    Ok(())
}

/// `<sourceBaseName>;<rawFrameName>` lines for each materialized frame.
#[derive(Debug)]
pub struct AuditLog {
    path: PathBuf,
    file: File,
}

impl AuditLog {
    /// Opens `{dir}/{base_name}.csv` for appending.
    pub fn open(dir: &Path, base_name: &str) -> Result<Self> {
        fs::create_dir_all(dir)?;
        let path = dir.join(format!("{base_name}.csv"));
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self { path, file })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn record(&mut self, base_name: &str, raw_name: &str) -> Result<()> {
        writeln!(self.file, "{base_name};{raw_name}")?;
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct FrameProgress {
    pub index: usize,
    pub total: usize,
    pub name: String,
    pub verdict: Option<FrameVerdict>,
}

pub struct Materializer<'a, M: MediaStore, N: NoteSink> {
    media: &'a mut M,
    notes: &'a mut N,
    audit: Option<AuditLog>,
    tag: Option<String>,
    filter: BlankFilter,
}

impl<'a, M: MediaStore, N: NoteSink> Materializer<'a, M, N> {
    pub fn new(media: &'a mut M, notes: &'a mut N) -> Self {
        Self {
            media,
            notes,
            audit: None,
            tag: None,
            filter: BlankFilter::new(),
        }
    }

    pub fn with_audit(mut self, audit: AuditLog) -> Self {
        self.audit = Some(audit);
        self
    }

    pub fn with_tag(mut self, tag: Option<String>) -> Self {
        self.tag = tag;
        self
    }

    /// Processes every frame and then removes the scratch directory.
    pub fn materialize(&mut self, scratch: ScratchDirectory, source: &VideoSource) -> RunSummary {
        let mut summary = self.process_frames(&scratch, source, |_| {});
        summary.scratch_removed = finish_scratch(scratch);
        summary
    }

    /// Classifies, moves and records each frame in name order. Per-frame
    /// problems are collected in the summary and never stop the batch.
    pub fn process_frames<F>(
        &mut self,
        scratch: &ScratchDirectory,
        source: &VideoSource,
        mut on_frame: F,
    ) -> RunSummary
    where
        F: FnMut(&FrameProgress),
    {
        let mut summary = RunSummary::default();
        let base_name = source.base_name();

        let frames = match scratch.frames() {
            Ok(v) => v,
            Err(err) => {
                tracing::warn!("could not list extracted frames: {err}");
                summary
                    .failures
                    .push(FrameFailure::new(scratch.path().to_string_lossy(), err));
                return summary;
            }
        };

        let total = frames.len();
        tracing::info!("materializing {total} extracted frames for {base_name}");
        for (index, frame) in frames.into_iter().enumerate() {
            let verdict = match self.process_frame(&frame, &base_name, &mut summary) {
                Ok(verdict) => Some(verdict),
                Err(failure) => {
                    tracing::warn!("frame {} failed: {}", frame.name, failure.reason);
                    summary.failures.push(failure);
                    None
                }
            };
            on_frame(&FrameProgress {
                index,
                total,
                name: frame.name,
                verdict,
            });
        }

        summary
    }

    fn process_frame(
        &mut self,
        frame: &RawFrame,
        base_name: &str,
        summary: &mut RunSummary,
    ) -> std::result::Result<FrameVerdict, FrameFailure> {
        let failed = |err: crate::Error| FrameFailure::new(frame.name.clone(), err);

        let verdict = self.filter.classify_file(&frame.path).map_err(failed)?;
        tracing::debug!("{} is {:?}", frame.name, verdict);

        if verdict == FrameVerdict::Blank {
            fs::remove_file(&frame.path).map_err(|e| failed(e.into()))?;
            summary.blank_frames += 1;
            return Ok(verdict);
        }

        let file_name = materialized_name(base_name, &frame.name);
        let path = self.media.store(&frame.path, &file_name).map_err(failed)?;
        let materialized = MaterializedFrame {
            raw_name: frame.name.clone(),
            file_name,
            path,
        };

        let card = CardRecord::for_frame(&materialized, base_name, self.tag.as_deref());
        let note_id = match self.notes.add_note(&card) {
            Ok(id) => id,
            Err(err) => {
                // a frame without a note must not stay in the store
                return Err(match self.media.discard(&materialized.path) {
                    Ok(()) => failed(err),
                    Err(discard_err) => {
                        tracing::warn!(
                            "could not remove {} after failed note: {discard_err}",
                            materialized.path.to_string_lossy()
                        );
                        failed(err).with_stored(materialized.path)
                    }
                });
            }
        };
        summary.materialized.push(materialized);
        summary.note_ids.push(note_id);

        if let Some(audit) = self.audit.as_mut() {
            audit.record(base_name, &frame.name).map_err(failed)?;
        }

        Ok(verdict)
    }
}

/// Removes the scratch directory, returning whether it is gone.
pub fn finish_scratch(scratch: ScratchDirectory) -> bool {
    let path = scratch.path().to_path_buf();
    match scratch.close() {
        Ok(()) => true,
        Err(err) => {
            tracing::warn!(
                "failed to remove scratch directory {}: {err}",
                path.to_string_lossy()
            );
            // tempfile has already attempted removal; report what is left
            !path.exists()
        }
    }
}
