//! UDP link to an Ethernet-attached hub

use crate::error::{MidError, MidResult};
use crate::stream::{StreamAccessor, TransportLayer};
use async_trait::async_trait;
use log::debug;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::UdpSocket;

/// Largest datagram accepted from the hub
pub const MAX_UDP_PAYLOAD_SIZE: usize = 65507;

/// UDP link settings
#[derive(Debug, Clone)]
pub struct UdpSettings {
    /// Address the MID binds to; the hub answers to this address
    pub local_address: SocketAddr,
    /// Address of the hub
    pub remote_address: SocketAddr,
    pub timeout: Option<Duration>,
}

impl UdpSettings {
    pub fn new(local_address: SocketAddr, remote_address: SocketAddr) -> Self {
        Self::with_timeout(local_address, remote_address, Duration::from_secs(10))
    }

    pub fn with_timeout(
        local_address: SocketAddr,
        remote_address: SocketAddr,
        timeout: Duration,
    ) -> Self {
        Self {
            local_address,
            remote_address,
            timeout: Some(timeout),
        }
    }
}

/// Hub behind a UDP socket
///
/// Every `read` consumes exactly one datagram from the hub. Bytes that do
/// not fit the caller's buffer are dropped with the datagram.
#[derive(Debug)]
pub struct UdpTransport {
    socket: Option<UdpSocket>,
    settings: UdpSettings,
    datagram: Vec<u8>,
}

impl UdpTransport {
    pub fn new(settings: UdpSettings) -> Self {
        Self {
            socket: None,
            settings,
            datagram: vec![0u8; MAX_UDP_PAYLOAD_SIZE],
        }
    }

    /// Parse both "host:port" addresses
    pub fn from_addresses(local: &str, remote: &str) -> MidResult<Self> {
        let local: SocketAddr = local
            .parse()
            .map_err(|e| MidError::Config(format!("Invalid local UDP address: {}", e)))?;
        let remote: SocketAddr = remote
            .parse()
            .map_err(|e| MidError::Config(format!("Invalid hub UDP address: {}", e)))?;
        Ok(Self::new(UdpSettings::new(local, remote)))
    }

    pub fn settings(&self) -> &UdpSettings {
        &self.settings
    }

    fn socket(&self) -> MidResult<&UdpSocket> {
        self.socket.as_ref().ok_or_else(|| {
            MidError::Connection(std::io::Error::new(
                std::io::ErrorKind::NotConnected,
                format!("No socket bound for hub {}", self.settings.remote_address),
            ))
        })
    }

    /// Wait for the next datagram from the hub, returning its length
    async fn receive(&mut self) -> MidResult<usize> {
        loop {
            let timeout = self.settings.timeout;
            let socket = self.socket.as_ref().ok_or_else(|| {
                MidError::Connection(std::io::Error::new(
                    std::io::ErrorKind::NotConnected,
                    format!("No socket bound for hub {}", self.settings.remote_address),
                ))
            })?;
            let recv = socket.recv_from(&mut self.datagram);

            let (len, addr) = match timeout {
                Some(limit) => tokio::time::timeout(limit, recv)
                    .await
                    .map_err(|_| MidError::Timeout)?
                    .map_err(MidError::Connection)?,
                None => recv.await.map_err(MidError::Connection)?,
            };

            // Only the hub may feed the reply buffer
            if addr == self.settings.remote_address {
                return Ok(len);
            }
            debug!("dropping {} byte datagram from unexpected peer {}", len, addr);
        }
    }
}

#[async_trait]
impl TransportLayer for UdpTransport {
    async fn open(&mut self) -> MidResult<()> {
        if self.socket.is_some() {
            return Err(MidError::Connection(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("Socket for hub {} is already bound", self.settings.remote_address),
            )));
        }

        let socket = UdpSocket::bind(self.settings.local_address)
            .await
            .map_err(MidError::Connection)?;

        debug!(
            "bound {} for hub at {}",
            self.settings.local_address, self.settings.remote_address
        );
        self.socket = Some(socket);
        Ok(())
    }
}

#[async_trait]
impl StreamAccessor for UdpTransport {
    async fn set_timeout(&mut self, timeout: Option<Duration>) -> MidResult<()> {
        self.settings.timeout = timeout;
        Ok(())
    }

    async fn read(&mut self, buf: &mut [u8]) -> MidResult<usize> {
        let len = self.receive().await?;
        let taken = buf.len().min(len);
        buf[..taken].copy_from_slice(&self.datagram[..taken]);
        if taken < len {
            debug!("truncated {} byte datagram to {} bytes", len, taken);
        }
        Ok(taken)
    }

    async fn write(&mut self, buf: &[u8]) -> MidResult<usize> {
        let socket = self.socket()?;
        let packet = &buf[..buf.len().min(MAX_UDP_PAYLOAD_SIZE)];

        if let Some(timeout) = self.settings.timeout {
            tokio::time::timeout(timeout, socket.send_to(packet, self.settings.remote_address))
                .await
                .map_err(|_| MidError::Timeout)?
                .map_err(MidError::Connection)
        } else {
            socket
                .send_to(packet, self.settings.remote_address)
                .await
                .map_err(MidError::Connection)
        }
    }

    async fn flush(&mut self) -> MidResult<()> {
        Ok(())
    }

    async fn clear_input(&mut self) -> MidResult<()> {
        let socket = self.socket()?;
        let mut scratch = [0u8; 512];
        let mut dropped = 0usize;
        loop {
            match socket.try_recv_from(&mut scratch) {
                Ok(_) => dropped += 1,
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => break,
                Err(e) => return Err(MidError::Connection(e)),
            }
        }
        if dropped > 0 {
            debug!("discarded {} stale datagram(s)", dropped);
        }
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.socket.is_none()
    }

    async fn close(&mut self) -> MidResult<()> {
        self.socket = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_udp_settings() {
        let local: SocketAddr = "0.0.0.0:4000".parse().unwrap();
        let remote: SocketAddr = "192.168.1.50:4001".parse().unwrap();
        let settings = UdpSettings::new(local, remote);
        assert_eq!(settings.remote_address, remote);
        assert!(settings.timeout.is_some());
    }

    #[test]
    fn test_invalid_address() {
        let err = UdpTransport::from_addresses("nope", "127.0.0.1:1").unwrap_err();
        assert!(matches!(err, MidError::Config(_)));
    }

    #[tokio::test]
    async fn test_datagram_exchange() {
        let hub = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let hub_addr = hub.local_addr().unwrap();
        let settings = UdpSettings::with_timeout(
            "127.0.0.1:0".parse().unwrap(),
            hub_addr,
            Duration::from_secs(2),
        );
        let mut transport = UdpTransport::new(settings);
        transport.open().await.unwrap();

        transport.write_all(b"DERV\x82\x7b\x00").await.unwrap();
        let mut request = [0u8; 16];
        let (len, mid_addr) = hub.recv_from(&mut request).await.unwrap();
        assert_eq!(&request[..len], b"DERV\x82\x7b\x00");

        hub.send_to(&[3, 124, 0], mid_addr).await.unwrap();
        let mut reply = [0u8; 512];
        let n = transport.read(&mut reply).await.unwrap();
        assert_eq!(&reply[..n], &[3, 124, 0]);
    }

    #[tokio::test]
    async fn test_oversized_datagram_is_not_carried_over() {
        let hub = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let settings = UdpSettings::with_timeout(
            "127.0.0.1:0".parse().unwrap(),
            hub.local_addr().unwrap(),
            Duration::from_secs(2),
        );
        let mut transport = UdpTransport::new(settings);
        transport.open().await.unwrap();
        transport.write_all(&[0x55]).await.unwrap();
        let mut request = [0u8; 4];
        let (_, mid_addr) = hub.recv_from(&mut request).await.unwrap();

        hub.send_to(&[1, 2, 3, 4, 5, 6, 7, 8], mid_addr).await.unwrap();
        hub.send_to(&[9], mid_addr).await.unwrap();

        let mut reply = [0u8; 4];
        assert_eq!(transport.read(&mut reply).await.unwrap(), 4);
        assert_eq!(reply, [1, 2, 3, 4]);
        let n = transport.read(&mut reply).await.unwrap();
        assert_eq!(&reply[..n], &[9]);
    }

    #[tokio::test]
    async fn test_read_timeout() {
        let settings = UdpSettings::with_timeout(
            "127.0.0.1:0".parse().unwrap(),
            "127.0.0.1:9".parse().unwrap(),
            Duration::from_millis(20),
        );
        let mut transport = UdpTransport::new(settings);
        transport.open().await.unwrap();
        let mut buf = [0u8; 8];
        assert!(matches!(transport.read(&mut buf).await, Err(MidError::Timeout)));
    }
}
