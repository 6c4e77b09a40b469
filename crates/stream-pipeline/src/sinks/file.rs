//! Appends every part, newline terminated, to one file.

use async_trait::async_trait;
use fallback_output::{Sink, SinkError};
use std::path::{Path, PathBuf};
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, warn};
use transaction_protocol::Message;

pub struct FileSink {
    label: String,
    path: PathBuf,
    file: Mutex<Option<File>>,
}

impl FileSink {
    pub fn new(label: &str, path: &Path) -> Self {
        Self {
            label: label.to_string(),
            path: path.to_path_buf(),
            file: Mutex::new(None),
        }
    }

    async fn open(&self) -> std::io::Result<File> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        debug!(path = %self.path.display(), "Opened output file");
        Ok(file)
    }
}

#[async_trait]
impl Sink for FileSink {
    fn label(&self) -> &str {
        &self.label
    }

    async fn attempt(&self, message: &Message) -> Result<(), SinkError> {
        let mut guard = self.file.lock().await;
        let mut file = match guard.take() {
            Some(file) => file,
            None => self.open().await?,
        };

        let mut buf = Vec::with_capacity(message.byte_size() + message.len());
        for part in message {
            buf.extend_from_slice(part.data());
            buf.push(b'\n');
        }

        match write_flushed(&mut file, &buf).await {
            Ok(()) => {
                *guard = Some(file);
                Ok(())
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Write failed, reopening on next attempt");
                Err(e.into())
            }
        }
    }
}

async fn write_flushed(file: &mut File, buf: &[u8]) -> std::io::Result<()> {
    file.write_all(buf).await?;
    file.flush().await
}
