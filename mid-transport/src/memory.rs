//! In-memory transport driven by a reply script

use crate::error::{MidError, MidResult};
use crate::stream::{StreamAccessor, TransportLayer};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::time::Duration;

/// Scripted stand-in for a hub link
///
/// Every completed `write` pops the next scripted reply and makes it
/// readable, chunk by chunk, the way datagrams arrive on a UDP socket. A
/// scripted `None` models a hub that stays silent: reads then fail with
/// [`MidError::Timeout`].
#[derive(Debug, Default)]
pub struct MemoryTransport {
    script: VecDeque<Option<Vec<Vec<u8>>>>,
    inbound: VecDeque<Vec<u8>>,
    written: Vec<Vec<u8>>,
    timeout: Option<Duration>,
    clears: usize,
    closed: bool,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self {
            closed: true,
            ..Self::default()
        }
    }

    /// Queue a reply made of a single chunk
    pub fn reply(mut self, bytes: impl Into<Vec<u8>>) -> Self {
        self.script.push_back(Some(vec![bytes.into()]));
        self
    }

    /// Queue a reply delivered as several chunks
    pub fn reply_chunks(mut self, chunks: Vec<Vec<u8>>) -> Self {
        self.script.push_back(Some(chunks));
        self
    }

    /// Queue a command the hub never answers
    pub fn silence(mut self) -> Self {
        self.script.push_back(None);
        self
    }

    /// Leave bytes in the input buffer before any command is sent
    pub fn stale_input(mut self, bytes: impl Into<Vec<u8>>) -> Self {
        self.inbound.push_back(bytes.into());
        self
    }

    /// Frames written so far, one entry per `write` call
    pub fn written(&self) -> &[Vec<u8>] {
        &self.written
    }

    /// Number of times the input buffer was cleared
    pub fn clear_count(&self) -> usize {
        self.clears
    }

    /// Last timeout set by the session
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Scripted replies not yet consumed
    pub fn remaining_script(&self) -> usize {
        self.script.len()
    }
}

#[async_trait]
impl TransportLayer for MemoryTransport {
    async fn open(&mut self) -> MidResult<()> {
        self.closed = false;
        Ok(())
    }
}

#[async_trait]
impl StreamAccessor for MemoryTransport {
    async fn set_timeout(&mut self, timeout: Option<Duration>) -> MidResult<()> {
        self.timeout = timeout;
        Ok(())
    }

    async fn read(&mut self, buf: &mut [u8]) -> MidResult<usize> {
        let Some(chunk) = self.inbound.front_mut() else {
            return Err(MidError::Timeout);
        };

        let n = buf.len().min(chunk.len());
        buf[..n].copy_from_slice(&chunk[..n]);
        chunk.drain(..n);
        if chunk.is_empty() {
            self.inbound.pop_front();
        }
        Ok(n)
    }

    async fn write(&mut self, buf: &[u8]) -> MidResult<usize> {
        if self.closed {
            return Err(MidError::Connection(std::io::Error::new(
                std::io::ErrorKind::NotConnected,
                "Memory transport not opened",
            )));
        }
        self.written.push(buf.to_vec());
        if let Some(Some(chunks)) = self.script.pop_front() {
            self.inbound
                .extend(chunks.into_iter().filter(|chunk| !chunk.is_empty()));
        }
        Ok(buf.len())
    }

    async fn flush(&mut self) -> MidResult<()> {
        Ok(())
    }

    async fn clear_input(&mut self) -> MidResult<()> {
        self.inbound.clear();
        self.clears += 1;
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed
    }

    async fn close(&mut self) -> MidResult<()> {
        self.closed = true;
        Ok(())
    }
}
