//! Scratch-directory management (spec §5).
//!
//! Holds `base.<ext>` (audio-stripped baseline), `glue<k>.<ext>` (per-target
//! re-renders), `audio.<ext>` (full audio re-export), `videoonly.<ext>` (the
//! concat-only intermediate, before the audio remux), and `splice.txt` (the
//! concat script). Each file is written exactly once per run.

use std::path::{Path, PathBuf};

use tempfile::TempDir;

use crate::error::SpliceError;

/// Wraps a [`tempfile::TempDir`], adding the fixed filenames the pipeline
/// writes into it and a `persist()` escape hatch for `-debuguniquename`.
pub struct ScratchDir {
    dir: TempDir,
}

impl ScratchDir {
    pub fn new() -> Result<Self, SpliceError> {
        let dir = TempDir::new().map_err(|e| SpliceError::MuxFailed(format!("failed to create scratch dir: {}", e)))?;
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn base_path(&self, ext: &str) -> PathBuf {
        self.dir.path().join(format!("base.{}", ext))
    }

    pub fn glue_path(&self, index: usize, ext: &str) -> PathBuf {
        self.dir.path().join(crate::emitter::glue_file_name(index, ext))
    }

    pub fn audio_path(&self, ext: &str) -> PathBuf {
        self.dir.path().join(format!("audio.{}", ext))
    }

    /// The stream-copied, audio-free concat output, staged before the final
    /// remux against `audio_path` produces the real output file.
    pub fn video_only_path(&self, ext: &str) -> PathBuf {
        self.dir.path().join(format!("videoonly.{}", ext))
    }

    pub fn script_path(&self) -> PathBuf {
        self.dir.path().join("splice.txt")
    }

    /// Detach from the underlying `TempDir`'s drop-on-close behaviour so the
    /// directory survives process exit (`-debuguniquename`).
    pub fn persist(self) -> PathBuf {
        self.dir.into_path()
    }
}
