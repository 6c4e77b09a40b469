//! Byte-accounted FIFO queue backing the memory buffer.

use serde::Serialize;
use std::collections::VecDeque;
use transaction_protocol::Message;

/// A message at rest in the buffer, with the size it was accounted at.
#[derive(Debug, Clone)]
pub struct BufferedEntry {
    message: Message,
    size: usize,
}

impl BufferedEntry {
    fn new(message: Message) -> Self {
        let size = message.byte_size();
        Self { message, size }
    }

    pub fn message(&self) -> &Message {
        &self.message
    }

    pub fn size(&self) -> usize {
        self.size
    }
}

/// Point-in-time view of a buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BufferStatus {
    /// Entries waiting to be forwarded (including the one in flight).
    pub pending: usize,
    /// Sum of the accounted sizes of those entries.
    pub used_bytes: usize,
    /// Configured ceiling.
    pub limit: usize,
}

/// Oldest-first queue with a running byte total.
///
/// `used_bytes` always equals the sum of the stored entries' sizes: it is
/// only changed by `push` and `shift`, each with the entry's own size.
#[derive(Debug)]
pub struct BufferQueue {
    entries: VecDeque<BufferedEntry>,
    used: usize,
    limit: usize,
}

impl BufferQueue {
    pub fn new(limit: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            used: 0,
            limit,
        }
    }

    /// Append to the tail. Returns whether usage now exceeds the limit.
    pub fn push(&mut self, message: Message) -> bool {
        let entry = BufferedEntry::new(message);
        self.used += entry.size;
        self.entries.push_back(entry);
        self.limit_reached()
    }

    /// Copy of the head entry's message, leaving it queued.
    pub fn pop(&self) -> Option<Message> {
        self.entries.front().map(|e| e.message.clone())
    }

    /// Remove the head entry, returning the size released.
    pub fn shift(&mut self) -> Option<usize> {
        let entry = self.entries.pop_front()?;
        self.used -= entry.size;
        Some(entry.size)
    }

    pub fn limit_reached(&self) -> bool {
        self.used > self.limit
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn used_bytes(&self) -> usize {
        self.used
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn head(&self) -> Option<&BufferedEntry> {
        self.entries.front()
    }

    pub fn status(&self) -> BufferStatus {
        BufferStatus {
            pending: self.entries.len(),
            used_bytes: self.used,
            limit: self.limit,
        }
    }
}
