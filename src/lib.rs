//! # enocean
//!
//! An async link layer for EnOcean serial gateways.
//!
//! This library talks to USB and serial EnOcean gateways (USB 300, TCM 310,
//! TCM 120) over their ESP2 or ESP3 serial protocols.
//!
//! ## Features
//!
//! - Async/await based API using Tokio
//! - ESP2 and ESP3 framing with automatic resynchronization
//! - Paced, single-outstanding request queue
//! - Per-sender listener dispatch with exclusive teach-in discovery
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use enocean::{RadioTelegram, SenderId, Transceiver};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), enocean::Error> {
//!     let mut transceiver = Transceiver::serial("/dev/ttyUSB0").await?;
//!     transceiver.start_receiving()?;
//!
//!     let version = transceiver.read_version().await?;
//!     println!("Firmware: {}", version.app_version_string());
//!
//!     // Print every telegram of one rocker switch
//!     transceiver.add_packet_listener(
//!         Arc::new(|telegram: &RadioTelegram| println!("{:02X?}", telegram.data())),
//!         SenderId::new(0x0029_8979),
//!     );
//!
//!     tokio::time::sleep(std::time::Duration::from_secs(60)).await;
//!     transceiver.shutdown();
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! The library is organized into several modules:
//!
//! - [`protocol`] - Packet model, ESP2/ESP3 framing, common commands
//! - [`transport`] - Transport implementations (currently USB/Serial)
//! - [`queue`] - Paced outbound request queue
//! - [`listener`] - Listener traits and dispatch of telegrams and events
//! - [`event`] - Broadcast of packets no listener handles
//! - [`transceiver`] - High-level [`Transceiver`]

pub mod error;
pub mod event;
pub mod listener;
pub mod protocol;
pub mod queue;
pub mod transceiver;
pub mod transport;

// Re-exports for convenience
pub use error::{Error, FrameError, Result};
pub use event::{PacketDispatcher, PacketFilter, Subscription};
pub use listener::{
    ErrorListener, EventListener, ListenerRegistry, PacketListener, Routing, TeachInListener,
};
pub use protocol::{
    BaseIdResponse, CommonCommand, EventMessage, EventType, Framer, Packet, PacketType,
    ProtocolVersion, RadioTelegram, RawPacket, RepeaterResponse, Response, ResponseType, Rorg,
    SenderId, VersionResponse,
};
pub use queue::{Request, RequestQueue, ResponseListener};
pub use transceiver::{Transceiver, TransceiverConfig};
pub use transport::{SerialConfig, SerialTransport, Transport, serial::list_ports};
