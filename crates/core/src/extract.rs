use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

use tempfile::TempDir;
use wait_timeout::ChildExt;
use walkdir::WalkDir;

use crate::error::{Error, Result};
use crate::models::{RawFrame, VideoSource};
use crate::plan::SamplingPlan;
use crate::run::RunCancelToken;
use crate::video::resolve_program;

const SCRATCH_PREFIX: &str = "framecards_tmp";

/// Frame dumper invoked as
/// `<program> <flags..> <output_dir_prefix><scratch> <step_prefix><interval> <video>`.
#[derive(Debug, Clone)]
pub struct ExtractTool {
    pub program: PathBuf,
    pub flags: Vec<String>,
    pub output_dir_prefix: String,
    pub step_prefix: String,
}

impl Default for ExtractTool {
    fn default() -> Self {
        Self {
            program: PathBuf::from("mpv"),
            flags: ["--vo=image", "--ao=null", "--no-config", "--quiet"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            output_dir_prefix: "--vo-image-outdir=".to_string(),
            step_prefix: "--sstep=".to_string(),
        }
    }
}

impl ExtractTool {
    fn command(&self, scratch: &Path, interval_secs: u32, video: &Path) -> Command {
        let mut cmd = Command::new(resolve_program(&self.program));
        cmd.args(&self.flags)
            .arg(format!(
                "{}{}",
                self.output_dir_prefix,
                scratch.to_string_lossy()
            ))
            .arg(format!("{}{}", self.step_prefix, interval_secs))
            .arg(video)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        cmd
    }
}

/// Per-run working directory. Removed on [`ScratchDirectory::close`] or drop.
#[derive(Debug)]
pub struct ScratchDirectory {
    dir: TempDir,
}

impl ScratchDirectory {
    pub fn create_in(root: &Path) -> Result<Self> {
        std::fs::create_dir_all(root)?;
        let dir = tempfile::Builder::new()
            .prefix(SCRATCH_PREFIX)
            .tempdir_in(root)?;
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Regular files in the directory, ordered by file name.
    pub fn frames(&self) -> Result<Vec<RawFrame>> {
        let mut frames = Vec::new();
        for entry in WalkDir::new(self.path())
            .min_depth(1)
            .max_depth(1)
            .sort_by_file_name()
        {
            let entry = entry.map_err(|err| Error::Io(err.into()))?;
            if !entry.file_type().is_file() {
                continue;
            }
            frames.push(RawFrame {
                path: entry.path().to_path_buf(),
                name: entry.file_name().to_string_lossy().to_string(),
            });
        }
        Ok(frames)
    }

    /// Removes the directory and whatever is left inside it.
    pub fn close(self) -> Result<()> {
        self.dir.close()?;
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct ExtractionOrchestrator {
    pub tool: ExtractTool,
    pub poll_interval: Duration,
}

impl Default for ExtractionOrchestrator {
    fn default() -> Self {
        Self::new(ExtractTool::default())
    }
}

impl ExtractionOrchestrator {
    pub fn new(tool: ExtractTool) -> Self {
        Self {
            tool,
            poll_interval: Duration::from_millis(100),
        }
    }

    pub fn extract(
        &self,
        source: &VideoSource,
        plan: &SamplingPlan,
        scratch_root: &Path,
    ) -> Result<ScratchDirectory> {
        self.extract_with_progress(source, plan, scratch_root, None, |_| {})
    }

    /// Runs the tool into a fresh scratch directory and waits for it to exit.
    ///
    /// `on_wait` is called with the elapsed time after every poll interval the
    /// tool is still running. On any failure the scratch directory is removed
    /// before the error is returned.
    pub fn extract_with_progress<F>(
        &self,
        source: &VideoSource,
        plan: &SamplingPlan,
        scratch_root: &Path,
        cancel: Option<&RunCancelToken>,
        mut on_wait: F,
    ) -> Result<ScratchDirectory>
    where
        F: FnMut(Duration),
    {
        let scratch = ScratchDirectory::create_in(scratch_root)?;
        match self.run_tool(source, plan, &scratch, cancel, &mut on_wait) {
            Ok(()) => Ok(scratch),
            Err(err) => {
                if let Err(cleanup) = scratch.close() {
                    tracing::warn!("failed to remove scratch directory: {cleanup}");
                }
                Err(err)
            }
        }
    }

    fn run_tool<F>(
        &self,
        source: &VideoSource,
        plan: &SamplingPlan,
        scratch: &ScratchDirectory,
        cancel: Option<&RunCancelToken>,
        on_wait: &mut F,
    ) -> Result<()>
    where
        F: FnMut(Duration),
    {
        let mut cmd = self
            .tool
            .command(scratch.path(), plan.interval_secs(), &source.path);
        tracing::debug!("running extraction command: {:?}", cmd);

        let mut child = cmd.spawn().map_err(|err| {
            Error::ExtractionFailed(format!(
                "could not start {}: {err}",
                self.tool.program.to_string_lossy()
            ))
        })?;

        let started = Instant::now();
        let status = loop {
            if let Some(cancel) = cancel {
                if cancel.is_cancelled() {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(Error::ExtractionFailed("cancelled".to_string()));
                }
            }

            match child.wait_timeout(self.poll_interval) {
                Ok(Some(status)) => break status,
                Ok(None) => on_wait(started.elapsed()),
                Err(err) => {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(Error::ExtractionFailed(format!(
                        "failed waiting for extraction tool: {err}"
                    )));
                }
            }
        };

        if !status.success() {
            return Err(Error::ExtractionFailed(format!(
                "{} exited with {status}",
                self.tool.program.to_string_lossy()
            )));
        }

        tracing::info!(
            "extraction of {} finished in {:.1}s",
            source.path.to_string_lossy(),
            started.elapsed().as_secs_f64()
        );
        Ok(())
    }
}
