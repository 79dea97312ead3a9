//! Destinations for assembled recordings.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use log::info;

use crate::error::Result;

/// Accepts one assembled audio file per recording session.
#[async_trait]
pub trait AudioSink: Send + Sync + 'static {
    async fn write(&self, name: &str, bytes: Vec<u8>) -> Result<()>;
}

/// Writes recordings into a directory, creating it on first use.
#[derive(Debug, Clone)]
pub struct FileSink {
    dir: PathBuf,
}

impl FileSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

#[async_trait]
impl AudioSink for FileSink {
    async fn write(&self, name: &str, bytes: Vec<u8>) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let path = self.dir.join(name);
        let len = bytes.len();
        tokio::fs::write(&path, bytes).await?;
        info!("Wrote recording {} ({len} bytes)", path.display());
        Ok(())
    }
}
