//! Serial/USB transport implementation.
//!
//! EnOcean gateways (USB 300, TCM 310 modules, older TCM 120 boards) show up
//! as plain serial ports running 8N1 at a fixed baud rate.

use std::time::Duration;

use futures::future::BoxFuture;
use tokio::io::AsyncReadExt;
use tokio_serial::{SerialPortBuilderExt, SerialStream};

use crate::error::{Error, Result};
use crate::protocol::ProtocolVersion;
use crate::transport::{BoxReader, BoxWriter, Transport};

/// Default connection delay.
pub const DEFAULT_CONNECTION_DELAY: Duration = Duration::from_millis(100);

/// Default time spent discarding bytes buffered before the port was opened.
pub const DEFAULT_DRAIN_DURATION: Duration = Duration::from_millis(200);

/// Configuration for serial transport.
#[derive(Debug, Clone)]
pub struct SerialConfig {
    /// Serial port path (e.g., "/dev/ttyUSB0" or "COM3").
    pub port: String,
    /// Baud rate.
    pub baud_rate: u32,
    /// Delay after opening the port before reading stale data.
    pub connection_delay: Duration,
    /// How long to discard stale bytes after the connection delay.
    pub drain_duration: Duration,
}

impl SerialConfig {
    /// Creates an ESP3 serial configuration with default settings.
    #[must_use]
    pub fn new(port: impl Into<String>) -> Self {
        Self::for_protocol(port, ProtocolVersion::Esp3)
    }

    /// Creates a configuration with the baud rate of `version`.
    #[must_use]
    pub fn for_protocol(port: impl Into<String>, version: ProtocolVersion) -> Self {
        Self {
            port: port.into(),
            baud_rate: version.baud_rate(),
            connection_delay: DEFAULT_CONNECTION_DELAY,
            drain_duration: DEFAULT_DRAIN_DURATION,
        }
    }

    /// Sets the baud rate.
    #[must_use]
    pub const fn baud_rate(mut self, rate: u32) -> Self {
        self.baud_rate = rate;
        self
    }

    /// Sets the connection delay.
    #[must_use]
    pub const fn connection_delay(mut self, delay: Duration) -> Self {
        self.connection_delay = delay;
        self
    }

    /// Sets the stale-byte drain duration. Zero disables draining.
    #[must_use]
    pub const fn drain_duration(mut self, duration: Duration) -> Self {
        self.drain_duration = duration;
        self
    }
}

/// Serial transport for EnOcean gateways.
pub struct SerialTransport {
    config: SerialConfig,
}

impl SerialTransport {
    /// Creates a new serial transport with the given configuration.
    #[must_use]
    pub const fn new(config: SerialConfig) -> Self {
        Self { config }
    }

    /// Creates an ESP3 serial transport for the given port.
    #[must_use]
    pub fn with_port(port: impl Into<String>) -> Self {
        Self::new(SerialConfig::new(port))
    }

    /// Returns the configuration.
    #[must_use]
    pub const fn config(&self) -> &SerialConfig {
        &self.config
    }

    /// Discards bytes the gateway buffered before we opened the port.
    async fn drain(&self, stream: &mut SerialStream) {
        if self.config.drain_duration.is_zero() {
            return;
        }

        let mut buf = [0u8; 256];
        let mut total_drained = 0usize;
        let deadline = tokio::time::Instant::now() + self.config.drain_duration;
        while tokio::time::Instant::now() < deadline {
            match tokio::time::timeout(Duration::from_millis(20), stream.read(&mut buf)).await {
                Ok(Ok(n)) if n > 0 => total_drained += n,
                _ => tokio::time::sleep(Duration::from_millis(10)).await,
            }
        }

        if total_drained > 0 {
            tracing::debug!("drained {} stale bytes from buffer", total_drained);
        }
    }
}

impl Transport for SerialTransport {
    fn open(&mut self) -> BoxFuture<'_, Result<(BoxReader, BoxWriter)>> {
        Box::pin(async move {
            tracing::info!(
                "opening serial port {} at {} baud",
                self.config.port,
                self.config.baud_rate
            );

            let mut stream = tokio_serial::new(&self.config.port, self.config.baud_rate)
                .data_bits(tokio_serial::DataBits::Eight)
                .parity(tokio_serial::Parity::None)
                .stop_bits(tokio_serial::StopBits::One)
                .flow_control(tokio_serial::FlowControl::None)
                .open_native_async()
                .map_err(Error::Serial)?;

            tokio::time::sleep(self.config.connection_delay).await;
            self.drain(&mut stream).await;

            let (reader, writer) = tokio::io::split(stream);
            tracing::info!("serial port {} open", self.config.port);
            Ok((Box::new(reader) as BoxReader, Box::new(writer) as BoxWriter))
        })
    }
}

/// Lists available serial ports.
///
/// # Errors
///
/// Returns an error if the port list cannot be retrieved.
pub fn list_ports() -> Result<Vec<String>> {
    let ports = tokio_serial::available_ports().map_err(Error::Serial)?;
    Ok(ports.into_iter().map(|p| p.port_name).collect())
}
