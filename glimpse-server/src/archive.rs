//! On-disk record of processed exchanges.
//!
//! For every handled request the archive writes
//! `<MODE>_<YYYYmmdd-HHMMSS-mmm>.jpg`, `.txt` and `.mp3` side by side.
//! A stem that is already taken gets a numeric suffix.
//! Archiving is best-effort; callers log failures and carry on.

use std::path::{Path, PathBuf};

use chrono::Local;
use glimpse_core::Mode;
use glimpse_core::record::{create_unique, file_stem};
use tokio::io::AsyncWriteExt;

use crate::backend::Reply;

#[derive(Debug, Clone)]
pub struct Archive {
    dir: PathBuf,
}

impl Archive {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Store one exchange; returns the stem the files were written under.
    pub async fn store(&self, mode: Mode, image: &[u8], reply: &Reply) -> std::io::Result<String> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let base = file_stem(mode, &Local::now());
        let (stem, mut jpg) = create_unique(&self.dir, &base, "jpg").await?;
        jpg.write_all(image).await?;
        jpg.flush().await?;

        tokio::fs::write(self.dir.join(format!("{stem}.txt")), reply.text.as_bytes()).await?;
        if !reply.audio.is_empty() {
            tokio::fs::write(self.dir.join(format!("{stem}.mp3")), &reply.audio).await?;
        }
        Ok(stem)
    }
}
