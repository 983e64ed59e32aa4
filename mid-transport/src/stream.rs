//! Byte link traits shared by every hub transport

use crate::error::{MidError, MidResult};
use async_trait::async_trait;
use std::io::ErrorKind;
use std::time::Duration;

/// Byte-level access to an opened hub link
///
/// Reads honour the timeout last given to [`set_timeout`](Self::set_timeout);
/// a read that times out fails with `MidError::Timeout`.
#[async_trait]
pub trait StreamAccessor: Send + Sync {
    /// Set the timeout applied to each read; `None` waits forever
    async fn set_timeout(&mut self, timeout: Option<Duration>) -> MidResult<()>;

    /// Read whatever is available, at most `buf.len()` bytes; 0 means the
    /// link was closed by the other end
    async fn read(&mut self, buf: &mut [u8]) -> MidResult<usize>;

    /// Fill `buf` completely
    async fn read_exact(&mut self, buf: &mut [u8]) -> MidResult<()> {
        let mut filled = 0;
        while filled < buf.len() {
            match self.read(&mut buf[filled..]).await? {
                0 => {
                    return Err(MidError::Connection(std::io::Error::new(
                        ErrorKind::UnexpectedEof,
                        format!("Link closed after {} of {} bytes", filled, buf.len()),
                    )));
                }
                n => filled += n,
            }
        }
        Ok(())
    }

    /// Write some of `buf`, returning how much was taken
    async fn write(&mut self, buf: &[u8]) -> MidResult<usize>;

    /// Write a whole frame
    async fn write_all(&mut self, buf: &[u8]) -> MidResult<()> {
        let mut rest = buf;
        while !rest.is_empty() {
            match self.write(rest).await? {
                0 => {
                    return Err(MidError::Connection(std::io::Error::new(
                        ErrorKind::WriteZero,
                        format!("Link took {} of {} bytes", buf.len() - rest.len(), buf.len()),
                    )));
                }
                n => rest = &rest[n..],
            }
        }
        Ok(())
    }

    async fn flush(&mut self) -> MidResult<()>;

    /// Drop every byte received but not read yet
    ///
    /// Called before a command whenever framing may be out of step, e.g.
    /// after a timeout or an unparsable reply.
    async fn clear_input(&mut self) -> MidResult<()> {
        Ok(())
    }

    fn is_closed(&self) -> bool;

    async fn close(&mut self) -> MidResult<()>;
}

/// A hub link that can be opened
#[async_trait]
pub trait TransportLayer: StreamAccessor {
    async fn open(&mut self) -> MidResult<()>;
}
