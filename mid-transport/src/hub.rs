//! Transport chosen at runtime

use crate::error::MidResult;
use crate::memory::MemoryTransport;
use crate::serial::SerialTransport;
use crate::stream::{StreamAccessor, TransportLayer};
use crate::udp::UdpTransport;
use async_trait::async_trait;
use std::time::Duration;

/// Any of the links a hub can sit behind
#[derive(Debug)]
pub enum HubTransport {
    Serial(SerialTransport),
    Udp(UdpTransport),
    Memory(MemoryTransport),
}

impl HubTransport {
    /// Check if replies arrive as whole datagrams
    pub fn is_datagram(&self) -> bool {
        matches!(self, HubTransport::Udp(_) | HubTransport::Memory(_))
    }
}

macro_rules! delegate {
    ($self:ident, $t:ident => $call:expr) => {
        match $self {
            HubTransport::Serial($t) => $call,
            HubTransport::Udp($t) => $call,
            HubTransport::Memory($t) => $call,
        }
    };
}

#[async_trait]
impl TransportLayer for HubTransport {
    async fn open(&mut self) -> MidResult<()> {
        delegate!(self, t => t.open().await)
    }
}

#[async_trait]
impl StreamAccessor for HubTransport {
    async fn set_timeout(&mut self, timeout: Option<Duration>) -> MidResult<()> {
        delegate!(self, t => t.set_timeout(timeout).await)
    }

    async fn read(&mut self, buf: &mut [u8]) -> MidResult<usize> {
        delegate!(self, t => t.read(buf).await)
    }

    async fn write(&mut self, buf: &[u8]) -> MidResult<usize> {
        delegate!(self, t => t.write(buf).await)
    }

    async fn flush(&mut self) -> MidResult<()> {
        delegate!(self, t => t.flush().await)
    }

    async fn clear_input(&mut self) -> MidResult<()> {
        delegate!(self, t => t.clear_input().await)
    }

    fn is_closed(&self) -> bool {
        delegate!(self, t => t.is_closed())
    }

    async fn close(&mut self) -> MidResult<()> {
        delegate!(self, t => t.close().await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_delegates_to_inner_transport() {
        let mut transport = HubTransport::Memory(MemoryTransport::new().reply(vec![3, 1, 0]));
        assert!(transport.is_datagram());
        assert!(transport.is_closed());

        transport.open().await.unwrap();
        transport.write_all(&[130]).await.unwrap();
        let mut buf = [0u8; 8];
        assert_eq!(transport.read(&mut buf).await.unwrap(), 3);

        transport.close().await.unwrap();
        assert!(transport.is_closed());
    }
}
