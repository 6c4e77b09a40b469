//! Line-oriented source feeding a pipeline.

use crate::error::PipelineResult;
use serde::Serialize;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::{debug, info, warn};
use transaction_protocol::{DeliveryError, Message, TransactionSender};

/// Counts reported when a source finishes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SourceStats {
    pub delivered: u64,
    pub rejected: u64,
}

/// Reads newline-delimited messages and delivers them one at a time.
///
/// Each line becomes a single-part message. The next line is read only
/// after the previous one has been acknowledged, so a slow pipeline slows
/// the reader down. Empty lines are skipped.
pub struct LineSource<R> {
    reader: R,
    sender: TransactionSender,
}

impl<R> LineSource<R>
where
    R: AsyncBufRead + Unpin,
{
    pub fn new(reader: R, sender: TransactionSender) -> Self {
        Self { reader, sender }
    }

    /// Run until end of input or until the pipeline stops taking messages.
    pub async fn run(mut self) -> PipelineResult<SourceStats> {
        let mut stats = SourceStats::default();
        let mut line = Vec::new();

        loop {
            line.clear();
            if self.reader.read_until(b'\n', &mut line).await? == 0 {
                debug!("Source reached end of input");
                break;
            }

            let content = trim_line_ending(&line);
            if content.is_empty() {
                continue;
            }

            match self.sender.deliver(Message::from_bytes([content.to_vec()])).await {
                Ok(()) => stats.delivered += 1,
                Err(DeliveryError::Closed | DeliveryError::ShuttingDown) => {
                    info!("Pipeline stopped taking input, source exiting");
                    break;
                }
                Err(e) => {
                    stats.rejected += 1;
                    warn!(error = %e, "Message rejected");
                }
            }
        }

        Ok(stats)
    }
}

fn trim_line_ending(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    line.strip_suffix(b"\r").unwrap_or(line)
}
