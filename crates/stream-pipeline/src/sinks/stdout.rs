//! Writes every part, newline terminated, to standard output.

use async_trait::async_trait;
use fallback_output::{Sink, SinkError};
use tokio::io::{AsyncWriteExt, Stdout};
use tokio::sync::Mutex;
use transaction_protocol::Message;

pub struct StdoutSink {
    label: String,
    out: Mutex<Stdout>,
}

impl StdoutSink {
    pub fn new(label: &str) -> Self {
        Self {
            label: label.to_string(),
            out: Mutex::new(tokio::io::stdout()),
        }
    }
}

#[async_trait]
impl Sink for StdoutSink {
    fn label(&self) -> &str {
        &self.label
    }

    async fn attempt(&self, message: &Message) -> Result<(), SinkError> {
        let mut buf = Vec::with_capacity(message.byte_size() + message.len());
        for part in message {
            buf.extend_from_slice(part.data());
            buf.push(b'\n');
        }

        let mut out = self.out.lock().await;
        out.write_all(&buf).await?;
        out.flush().await?;
        Ok(())
    }
}
