//! Audio sinks for clips received during a turn.

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chat_proto::AudioEncoding;
use tracing::debug;

/// One decoded `audio` event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioClip {
    /// Position among the clips of its turn, starting at 0.
    pub index: usize,
    pub bytes: Vec<u8>,
    pub encoding: AudioEncoding,
}

#[async_trait]
pub trait AudioPlayer: Send + Sync {
    /// Play a clip. Calls may overlap when clips arrive back to back.
    async fn play(&self, clip: AudioClip) -> Result<()>;
}

/// Discards every clip.
#[derive(Debug, Default)]
pub struct NullPlayer;

#[async_trait]
impl AudioPlayer for NullPlayer {
    async fn play(&self, clip: AudioClip) -> Result<()> {
        debug!("Discarding audio clip {} ({} bytes)", clip.index, clip.bytes.len());
        Ok(())
    }
}

/// Writes each clip to `clip-NNNN.<ext>` in a directory and optionally runs
/// a command (e.g. `aplay`) with the file path as its last argument.
#[derive(Debug)]
pub struct DirectoryPlayer {
    dir: PathBuf,
    command: Option<Vec<String>>,
    written: AtomicUsize,
}

impl DirectoryPlayer {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            command: None,
            written: AtomicUsize::new(0),
        }
    }

    /// `command` is split on whitespace; the clip path is appended.
    pub fn with_command(mut self, command: &str) -> Self {
        let parts: Vec<String> = command.split_whitespace().map(str::to_string).collect();
        self.command = (!parts.is_empty()).then_some(parts);
        self
    }
}

#[async_trait]
impl AudioPlayer for DirectoryPlayer {
    async fn play(&self, clip: AudioClip) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .with_context(|| format!("cannot create {}", self.dir.display()))?;

        // Numbered per player, not per turn.
        let seq = self.written.fetch_add(1, Ordering::Relaxed);
        let path = self
            .dir
            .join(format!("clip-{seq:04}.{}", clip.encoding.extension()));
        tokio::fs::write(&path, &clip.bytes)
            .await
            .with_context(|| format!("cannot write {}", path.display()))?;
        debug!("Wrote audio clip {} to {}", clip.index, path.display());

        if let Some((program, args)) = self.command.as_ref().and_then(|c| c.split_first()) {
            let status = tokio::process::Command::new(program)
                .args(args)
                .arg(&path)
                .status()
                .await
                .with_context(|| format!("cannot run {program}"))?;
            if !status.success() {
                bail!("{program} exited with {status}");
            }
        }
        Ok(())
    }
}
