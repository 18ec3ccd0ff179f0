//! File-based checkpointer
//!
//! # Directory Structure
//!
//! ```text
//! checkpoints/
//! └── {run_id}/
//!     ├── checkpoint_00001.json[.zst]
//!     ├── checkpoint_00002.json[.zst]
//!     └── checkpoint_00003.json[.zst]
//! ```
//!
//! Compression is chosen per file by extension when reading, so a store can
//! switch compression on or off without losing older runs.

use async_trait::async_trait;
use std::io::Write;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use super::{Checkpoint, Checkpointer};
use crate::error::CheckpointError;

const COMPRESSED_EXT: &str = ".json.zst";
const PLAIN_EXT: &str = ".json";

#[derive(Debug, Clone)]
pub struct FileCheckpointer {
    base_path: PathBuf,
    compression: bool,
}

impl FileCheckpointer {
    pub fn new(base_path: impl Into<PathBuf>, compression: bool) -> Self {
        Self {
            base_path: base_path.into(),
            compression,
        }
    }

    /// Run ids become directory names; anything that could escape the base
    /// directory is refused.
    fn run_dir(&self, run_id: &str) -> Result<PathBuf, CheckpointError> {
        let valid = !run_id.is_empty()
            && run_id.len() <= 128
            && run_id != "."
            && run_id != ".."
            && run_id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
        if !valid {
            return Err(CheckpointError::InvalidRunId(run_id.to_string()));
        }
        Ok(self.base_path.join(run_id))
    }

    fn checkpoint_path(&self, dir: &Path, sequence: usize) -> PathBuf {
        let ext = if self.compression { COMPRESSED_EXT } else { PLAIN_EXT };
        dir.join(format!("checkpoint_{:05}{}", sequence, ext))
    }

    fn compress(data: &[u8]) -> Result<Vec<u8>, CheckpointError> {
        let mut encoder = zstd::stream::Encoder::new(Vec::new(), 3)
            .map_err(|e| CheckpointError::Compression(format!("init failed: {}", e)))?;
        encoder
            .write_all(data)
            .map_err(|e| CheckpointError::Compression(format!("write failed: {}", e)))?;
        encoder
            .finish()
            .map_err(|e| CheckpointError::Compression(format!("finish failed: {}", e)))
    }

    fn decompress(data: &[u8]) -> Result<Vec<u8>, CheckpointError> {
        zstd::stream::decode_all(data).map_err(|e| CheckpointError::Compression(format!("decompression failed: {}", e)))
    }

    fn parse_sequence(path: &Path) -> Option<usize> {
        let filename = path.file_name()?.to_str()?;
        let rest = filename.strip_prefix("checkpoint_")?;
        let num = rest
            .strip_suffix(COMPRESSED_EXT)
            .or_else(|| rest.strip_suffix(PLAIN_EXT))?;
        num.parse().ok()
    }

    /// Sequence numbers with their file paths, ascending
    async fn entries(&self, dir: &Path) -> Result<Vec<(usize, PathBuf)>, CheckpointError> {
        if !fs::try_exists(dir).await? {
            return Ok(Vec::new());
        }

        let mut read_dir = fs::read_dir(dir).await?;
        let mut entries = Vec::new();
        while let Some(entry) = read_dir.next_entry().await? {
            let path = entry.path();
            if let Some(sequence) = Self::parse_sequence(&path) {
                entries.push((sequence, path));
            }
        }
        entries.sort_by_key(|(sequence, _)| *sequence);
        Ok(entries)
    }

    async fn read(path: &Path) -> Result<Checkpoint, CheckpointError> {
        let data = fs::read(path).await?;
        let json = if path.to_string_lossy().ends_with(COMPRESSED_EXT) {
            Self::decompress(&data)?
        } else {
            data
        };
        serde_json::from_slice(&json)
            .map_err(|e| CheckpointError::Corrupted(format!("{}: {}", path.display(), e)))
    }
}

#[async_trait]
impl Checkpointer for FileCheckpointer {
    async fn save(&self, checkpoint: &Checkpoint) -> Result<(), CheckpointError> {
        let dir = self.run_dir(&checkpoint.run_id)?;
        fs::create_dir_all(&dir).await?;

        let json = serde_json::to_vec_pretty(checkpoint)?;
        let data = if self.compression {
            Self::compress(&json)?
        } else {
            json
        };

        // Write to a temp file first, then rename into place
        let temp_path = dir.join(format!("checkpoint_{:05}.tmp", checkpoint.sequence));
        let final_path = self.checkpoint_path(&dir, checkpoint.sequence);

        let mut file = fs::File::create(&temp_path).await?;
        file.write_all(&data).await?;
        file.sync_all().await?;
        fs::rename(&temp_path, &final_path).await?;

        debug!(run_id = %checkpoint.run_id, sequence = checkpoint.sequence, path = %final_path.display(), "Checkpoint written");
        Ok(())
    }

    async fn load(&self, run_id: &str) -> Result<Option<Checkpoint>, CheckpointError> {
        let dir = self.run_dir(run_id)?;
        match self.entries(&dir).await?.pop() {
            Some((_, path)) => Ok(Some(Self::read(&path).await?)),
            None => Ok(None),
        }
    }

    async fn list(&self, run_id: &str) -> Result<Vec<usize>, CheckpointError> {
        let dir = self.run_dir(run_id)?;
        Ok(self.entries(&dir).await?.into_iter().map(|(seq, _)| seq).collect())
    }

    async fn list_runs(&self) -> Result<Vec<String>, CheckpointError> {
        if !fs::try_exists(&self.base_path).await? {
            return Ok(Vec::new());
        }

        let mut read_dir = fs::read_dir(&self.base_path).await?;
        let mut runs = Vec::new();
        while let Some(entry) = read_dir.next_entry().await? {
            if !entry.file_type().await?.is_dir() {
                continue;
            }
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            if !self.entries(&entry.path()).await?.is_empty() {
                runs.push(name);
            }
        }
        runs.sort();
        Ok(runs)
    }

    async fn delete(&self, run_id: &str) -> Result<(), CheckpointError> {
        let dir = self.run_dir(run_id)?;
        if fs::try_exists(&dir).await? {
            fs::remove_dir_all(&dir).await?;
        }
        Ok(())
    }
}
