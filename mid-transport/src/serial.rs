//! RS-485 serial link to the hub

use crate::error::{MidError, MidResult};
use crate::stream::{StreamAccessor, TransportLayer};
use async_trait::async_trait;
use log::debug;
use std::fmt;
use std::future::Future;
use std::io::ErrorKind;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_serial::{ClearBuffer, DataBits, FlowControl, Parity, SerialPort, SerialStream, StopBits};

/// Baud rate the hub firmware uses on its host link
pub const DEFAULT_BAUD_RATE: u32 = 9600;

/// Serial line settings; the hub always talks 8N1 without flow control
#[derive(Debug, Clone)]
pub struct SerialSettings {
    pub port_name: String,
    pub baud_rate: u32,
    pub data_bits: DataBits,
    pub stop_bits: StopBits,
    pub parity: Parity,
    pub flow_control: FlowControl,
    pub timeout: Option<Duration>,
}

impl SerialSettings {
    pub fn new(port_name: impl Into<String>, baud_rate: u32) -> Self {
        Self::with_timeout(port_name, baud_rate, Duration::from_secs(10))
    }

    pub fn with_timeout(port_name: impl Into<String>, baud_rate: u32, timeout: Duration) -> Self {
        Self {
            port_name: port_name.into(),
            baud_rate,
            data_bits: DataBits::Eight,
            stop_bits: StopBits::One,
            parity: Parity::None,
            flow_control: FlowControl::None,
            timeout: Some(timeout),
        }
    }
}

impl Default for SerialSettings {
    fn default() -> Self {
        Self::new("/dev/ttyUSB0", DEFAULT_BAUD_RATE)
    }
}

/// Hub behind a serial port
pub struct SerialTransport {
    port: Option<SerialStream>,
    settings: SerialSettings,
}

impl SerialTransport {
    pub fn new(settings: SerialSettings) -> Self {
        Self {
            port: None,
            settings,
        }
    }

    pub fn settings(&self) -> &SerialSettings {
        &self.settings
    }

    fn port(&mut self) -> MidResult<&mut SerialStream> {
        let name = &self.settings.port_name;
        match self.port.as_mut() {
            Some(port) => Ok(port),
            None => Err(MidError::Connection(std::io::Error::new(
                ErrorKind::NotConnected,
                format!("Serial port {} is not open", name),
            ))),
        }
    }
}

/// Run an I/O future under an optional timeout
async fn bounded<F, T>(timeout: Option<Duration>, io: F) -> MidResult<T>
where
    F: Future<Output = std::io::Result<T>>,
{
    match timeout {
        Some(limit) => tokio::time::timeout(limit, io)
            .await
            .map_err(|_| MidError::Timeout)?
            .map_err(MidError::Connection),
        None => io.await.map_err(MidError::Connection),
    }
}

impl fmt::Debug for SerialTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SerialTransport")
            .field("settings", &self.settings)
            .field("open", &self.port.is_some())
            .finish()
    }
}

#[async_trait]
impl TransportLayer for SerialTransport {
    async fn open(&mut self) -> MidResult<()> {
        if self.port.is_some() {
            return Err(MidError::Connection(std::io::Error::new(
                ErrorKind::InvalidInput,
                format!("Serial port {} is already open", self.settings.port_name),
            )));
        }

        let builder = tokio_serial::new(&self.settings.port_name, self.settings.baud_rate)
            .data_bits(self.settings.data_bits)
            .stop_bits(self.settings.stop_bits)
            .parity(self.settings.parity)
            .flow_control(self.settings.flow_control);
        let port = SerialStream::open(&builder).map_err(|e| {
            MidError::Connection(std::io::Error::other(format!(
                "Cannot open serial port {}: {}",
                self.settings.port_name, e
            )))
        })?;

        debug!(
            "Hub serial link on {} at {} baud",
            self.settings.port_name, self.settings.baud_rate
        );
        self.port = Some(port);
        Ok(())
    }
}

#[async_trait]
impl StreamAccessor for SerialTransport {
    async fn set_timeout(&mut self, timeout: Option<Duration>) -> MidResult<()> {
        self.settings.timeout = timeout;
        Ok(())
    }

    async fn read(&mut self, buf: &mut [u8]) -> MidResult<usize> {
        let timeout = self.settings.timeout;
        let port = self.port()?;
        let result = bounded(timeout, port.read(buf)).await;
        // a serial port only reports EOF or an I/O error once the adapter is gone
        if matches!(result, Ok(0) | Err(MidError::Connection(_))) {
            self.port = None;
        }
        result
    }

    async fn write(&mut self, buf: &[u8]) -> MidResult<usize> {
        let timeout = self.settings.timeout;
        let port = self.port()?;
        bounded(timeout, port.write(buf)).await
    }

    async fn flush(&mut self) -> MidResult<()> {
        self.port()?.flush().await.map_err(MidError::Connection)
    }

    async fn clear_input(&mut self) -> MidResult<()> {
        self.port()?
            .clear(ClearBuffer::All)
            .map_err(|e| MidError::Connection(e.into()))
    }

    fn is_closed(&self) -> bool {
        self.port.is_none()
    }

    async fn close(&mut self) -> MidResult<()> {
        if let Some(mut port) = self.port.take() {
            port.flush().await.map_err(MidError::Connection)?;
        }
        Ok(())
    }
}
