//! Writes every part to its own file at an interpolated path.

use crate::error::PipelineResult;
use crate::interpolation::InterpolatedString;
use async_trait::async_trait;
use fallback_output::{Sink, SinkError};
use std::path::PathBuf;
use tracing::debug;
use transaction_protocol::Message;

pub struct FilesSink {
    label: String,
    path: InterpolatedString,
}

impl FilesSink {
    pub fn new(label: &str, path: &str) -> PipelineResult<Self> {
        Ok(Self {
            label: label.to_string(),
            path: InterpolatedString::parse(path)?,
        })
    }
}

#[async_trait]
impl Sink for FilesSink {
    fn label(&self) -> &str {
        &self.label
    }

    async fn attempt(&self, message: &Message) -> Result<(), SinkError> {
        for part in message {
            let path = PathBuf::from(self.path.render(part));
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                tokio::fs::create_dir_all(parent).await?;
            }
            tokio::fs::write(&path, part.data()).await?;
            debug!(path = %path.display(), bytes = part.data().len(), "Wrote part");
        }
        Ok(())
    }
}
