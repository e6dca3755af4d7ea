//! Transport layer for gateway communication.
//!
//! A transport opens the byte stream to the gateway and hands back its two
//! halves. The read half goes to the receive loop, the write half to the
//! request queue. Currently only USB/Serial is implemented.

pub mod serial;

use futures::future::BoxFuture;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::error::Result;

/// Read half of an open transport.
pub type BoxReader = Box<dyn AsyncRead + Send + Unpin>;

/// Write half of an open transport.
pub type BoxWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Trait for transport implementations.
pub trait Transport: Send {
    /// Opens the byte stream to the gateway.
    fn open(&mut self) -> BoxFuture<'_, Result<(BoxReader, BoxWriter)>>;
}

pub use serial::{SerialConfig, SerialTransport};
