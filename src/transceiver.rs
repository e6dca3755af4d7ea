//! Main [`Transceiver`] implementation.
//!
//! The transceiver owns the connection to one gateway. It combines the
//! framer, the request queue and the listener registry into one interface.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::io::AsyncReadExt;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::error::{Error, Result};
use crate::event::{DEFAULT_SUBSCRIPTION_CAPACITY, PacketDispatcher, PacketFilter, Subscription};
use crate::listener::{
    ErrorListener, EventListener, ListenerRegistry, PacketListener, TeachInListener,
};
use crate::protocol::{
    BaseIdResponse, CommonCommand, Framer, Packet, ProtocolVersion, RepeaterResponse, Response,
    SenderId, VersionResponse,
};
use crate::queue::{
    DEFAULT_PACING_INTERVAL, DEFAULT_QUEUE_CAPACITY, QueueHandle, Request, RequestQueue,
    ResponseListener,
};
use crate::transport::{BoxReader, BoxWriter, SerialTransport, Transport, serial::SerialConfig};

/// Default size of the serial read buffer.
pub const DEFAULT_READ_BUFFER_SIZE: usize = 1024;

/// Configuration for a [`Transceiver`].
#[derive(Clone)]
pub struct TransceiverConfig {
    /// Protocol version spoken by the gateway.
    pub protocol: ProtocolVersion,
    /// Delay between consecutive requests.
    pub pacing_interval: Duration,
    /// Number of requests that may wait in the queue.
    pub queue_capacity: usize,
    /// Size of the serial read buffer.
    pub read_buffer_size: usize,
    /// Buffer size of unrouted packet subscriptions.
    pub subscription_capacity: usize,
    /// Sender id whose base id block is ignored on receive.
    pub filtered_sender_id: Option<SenderId>,
    /// Receives I/O failures of the read loop and the request queue.
    pub error_listener: Option<Arc<dyn ErrorListener>>,
}

impl TransceiverConfig {
    /// Creates a configuration for `protocol` with default settings.
    #[must_use]
    pub fn new(protocol: ProtocolVersion) -> Self {
        Self {
            protocol,
            pacing_interval: DEFAULT_PACING_INTERVAL,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
            subscription_capacity: DEFAULT_SUBSCRIPTION_CAPACITY,
            filtered_sender_id: None,
            error_listener: None,
        }
    }

    /// Sets the pacing interval.
    #[must_use]
    pub const fn pacing_interval(mut self, interval: Duration) -> Self {
        self.pacing_interval = interval;
        self
    }

    /// Sets the queue capacity.
    #[must_use]
    pub const fn queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    /// Sets the read buffer size.
    #[must_use]
    pub const fn read_buffer_size(mut self, size: usize) -> Self {
        self.read_buffer_size = size;
        self
    }

    /// Sets the subscription buffer size.
    #[must_use]
    pub const fn subscription_capacity(mut self, capacity: usize) -> Self {
        self.subscription_capacity = capacity;
        self
    }

    /// Ignores telegrams from the base id block of `sender_id`.
    #[must_use]
    pub const fn filtered_sender_id(mut self, sender_id: SenderId) -> Self {
        self.filtered_sender_id = Some(sender_id);
        self
    }

    /// Sets the error listener.
    #[must_use]
    pub fn error_listener(mut self, listener: Arc<dyn ErrorListener>) -> Self {
        self.error_listener = Some(listener);
        self
    }
}

impl Default for TransceiverConfig {
    fn default() -> Self {
        Self::new(ProtocolVersion::default())
    }
}

impl std::fmt::Debug for TransceiverConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransceiverConfig")
            .field("protocol", &self.protocol)
            .field("pacing_interval", &self.pacing_interval)
            .field("queue_capacity", &self.queue_capacity)
            .field("read_buffer_size", &self.read_buffer_size)
            .field("subscription_capacity", &self.subscription_capacity)
            .field("filtered_sender_id", &self.filtered_sender_id)
            .field("error_listener", &self.error_listener.is_some())
            .finish()
    }
}

fn report(listener: Option<&Arc<dyn ErrorListener>>, error: &Error) {
    if let Some(listener) = listener {
        listener.error_occurred(error);
    }
}

/// Connection to one EnOcean gateway.
///
/// ```no_run
/// use std::sync::Arc;
///
/// use enocean::{RadioTelegram, SenderId, Transceiver};
///
/// #[tokio::main]
/// async fn main() -> Result<(), enocean::Error> {
///     let mut transceiver = Transceiver::serial("/dev/ttyUSB0").await?;
///     transceiver.start_receiving()?;
///
///     let base = transceiver.read_base_id().await?;
///     println!("Base id: {}", base.base_id);
///
///     transceiver.add_packet_listener(
///         Arc::new(|telegram: &RadioTelegram| println!("{telegram:?}")),
///         SenderId::new(0x0029_8979),
///     );
///     Ok(())
/// }
/// ```
pub struct Transceiver {
    config: TransceiverConfig,
    listeners: Arc<ListenerRegistry>,
    dispatcher: PacketDispatcher,
    queue: Option<QueueHandle>,
    reader: Mutex<Option<BoxReader>>,
    read_task: Mutex<Option<JoinHandle<()>>>,
    queue_task: Mutex<Option<JoinHandle<()>>>,
    shut_down: AtomicBool,
}

impl Transceiver {
    /// Creates a transceiver that is not yet connected.
    #[must_use]
    pub fn new(config: TransceiverConfig) -> Self {
        let listeners = ListenerRegistry::new();
        listeners.set_filtered_sender_id(config.filtered_sender_id);
        let dispatcher = PacketDispatcher::new(config.subscription_capacity);

        Self {
            config,
            listeners: Arc::new(listeners),
            dispatcher,
            queue: None,
            reader: Mutex::new(None),
            read_task: Mutex::new(None),
            queue_task: Mutex::new(None),
            shut_down: AtomicBool::new(false),
        }
    }

    /// Opens an ESP3 gateway on a serial port.
    ///
    /// # Errors
    ///
    /// Returns an error if the port cannot be opened.
    pub async fn serial(port: impl Into<String>) -> Result<Self> {
        let mut transceiver = Self::new(TransceiverConfig::default());
        transceiver
            .initialize(&mut SerialTransport::new(SerialConfig::new(port)))
            .await?;
        Ok(transceiver)
    }

    /// Returns the configuration.
    #[must_use]
    pub const fn config(&self) -> &TransceiverConfig {
        &self.config
    }

    /// Opens the transport and starts the request queue.
    ///
    /// Does nothing if already initialized.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotConnected`] after [`shutdown`](Self::shutdown), or
    /// an error if the transport cannot be opened.
    pub async fn initialize<T: Transport + ?Sized>(&mut self, transport: &mut T) -> Result<()> {
        if self.is_shut_down() {
            return Err(Error::NotConnected);
        }
        if self.queue.is_some() {
            return Ok(());
        }
        let (reader, writer) = transport.open().await?;
        self.attach(reader, writer);
        Ok(())
    }

    /// Starts the request queue on already opened stream halves.
    ///
    /// Does nothing if already initialized or shut down.
    pub fn attach(&mut self, reader: BoxReader, writer: BoxWriter) {
        if self.queue.is_some() || self.is_shut_down() {
            return;
        }

        let (queue, task) = RequestQueue::spawn(
            writer,
            self.config.queue_capacity,
            self.config.pacing_interval,
            self.config.error_listener.clone(),
        );
        self.queue = Some(queue);
        *self.reader.get_mut().unwrap_or_else(PoisonError::into_inner) = Some(reader);
        *self.queue_task.lock().unwrap_or_else(PoisonError::into_inner) = Some(task);

        tracing::info!("transceiver initialized ({:?})", self.config.protocol);
    }

    /// Starts the receive loop.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotConnected`] before initialization or after
    /// shutdown, and [`Error::AlreadyReceiving`] if the loop was already
    /// started.
    pub fn start_receiving(&mut self) -> Result<()> {
        if self.is_shut_down() {
            return Err(Error::NotConnected);
        }
        let Some(reader) = self.reader.get_mut().unwrap_or_else(PoisonError::into_inner).take() else {
            return Err(if self.queue.is_some() {
                Error::AlreadyReceiving
            } else {
                Error::NotConnected
            });
        };
        let queue = self.queue.clone().ok_or(Error::NotConnected)?;

        let read_loop = ReadLoop {
            reader,
            framer: self.config.protocol.framer(),
            buffer_size: self.config.read_buffer_size.max(1),
            listeners: Arc::clone(&self.listeners),
            dispatcher: self.dispatcher.clone(),
            queue,
            error_listener: self.config.error_listener.clone(),
        };
        let task = tokio::spawn(read_loop.run());
        *self.read_task.lock().unwrap_or_else(PoisonError::into_inner) = Some(task);

        tracing::debug!("receive loop started");
        Ok(())
    }

    /// Returns true while the receive loop is running.
    #[must_use]
    pub fn is_receiving(&self) -> bool {
        self.read_task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|task| !task.is_finished())
    }

    /// Stops the receive loop and the request queue and releases every listener.
    ///
    /// Pending requests are dropped and both stream halves are closed. The
    /// transceiver cannot be started again. Safe to call more than once.
    pub fn shutdown(&self) {
        let already = self.shut_down.swap(true, Ordering::AcqRel);

        drop(self.reader.lock().unwrap_or_else(PoisonError::into_inner).take());
        if let Some(task) = self.read_task.lock().unwrap_or_else(PoisonError::into_inner).take() {
            task.abort();
        }
        if let Some(task) = self.queue_task.lock().unwrap_or_else(PoisonError::into_inner).take() {
            task.abort();
        }
        self.listeners.clear();

        if !already {
            tracing::info!("transceiver shut down");
        }
    }

    /// Returns true once [`shutdown`](Self::shutdown) has been called.
    #[must_use]
    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::Acquire)
    }

    /// Queues a packet for sending.
    ///
    /// `response_listener` is called with the gateway's response if one
    /// arrives before the next request is sent.
    ///
    /// # Errors
    ///
    /// Returns an error if the transceiver is not initialized or the packet
    /// cannot be encoded in the configured protocol version.
    pub fn send(&self, packet: Packet, response_listener: Option<ResponseListener>) -> Result<()> {
        if self.is_shut_down() {
            return Err(Error::NotConnected);
        }
        let queue = self.queue.as_ref().ok_or(Error::NotConnected)?;
        let frame = self.config.protocol.encode(&packet)?;
        queue.enqueue(Request::new(packet, frame, response_listener))
    }

    /// Sends a packet and waits for the gateway's response.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoResponse`] if the next request went out (or the
    /// request was dropped) before a response arrived.
    pub async fn request(&self, packet: Packet) -> Result<Response> {
        let (tx, rx) = oneshot::channel();
        self.send(
            packet,
            Some(Box::new(move |response: &Response| {
                let _ = tx.send(response.clone());
            })),
        )?;
        rx.await.map_err(|_| Error::NoResponse)
    }

    /// Reads the gateway's base id.
    ///
    /// # Errors
    ///
    /// Returns an error if the gateway does not answer or rejects the command.
    pub async fn read_base_id(&self) -> Result<BaseIdResponse> {
        let response = self.request(CommonCommand::ReadIdBase.into()).await?;
        BaseIdResponse::try_from(&response)
    }

    /// Reads the gateway's firmware version.
    ///
    /// # Errors
    ///
    /// Returns an error if the gateway does not answer or rejects the command.
    pub async fn read_version(&self) -> Result<VersionResponse> {
        let response = self.request(CommonCommand::ReadVersion.into()).await?;
        VersionResponse::try_from(&response)
    }

    /// Reads the gateway's repeater configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the gateway does not answer or rejects the command.
    pub async fn read_repeater(&self) -> Result<RepeaterResponse> {
        let response = self.request(CommonCommand::ReadRepeater.into()).await?;
        RepeaterResponse::try_from(&response)
    }

    /// Registers a listener for telegrams from `sender_id`.
    pub fn add_packet_listener(&self, listener: Arc<dyn PacketListener>, sender_id: SenderId) {
        self.listeners.add_packet_listener(listener, sender_id);
    }

    /// Removes a listener registered for `sender_id`.
    pub fn remove_packet_listener(&self, listener: &Arc<dyn PacketListener>, sender_id: SenderId) {
        self.listeners.remove_packet_listener(listener, sender_id);
    }

    /// Registers an event listener.
    pub fn add_event_listener(&self, listener: Arc<dyn EventListener>) {
        self.listeners.add_event_listener(listener);
    }

    /// Removes an event listener.
    pub fn remove_event_listener(&self, listener: &Arc<dyn EventListener>) {
        self.listeners.remove_event_listener(listener);
    }

    /// Routes teach-in traffic to `listener` exclusively.
    pub fn start_discovery(&self, listener: Arc<dyn TeachInListener>) {
        self.listeners.start_discovery(listener);
    }

    /// Ends discovery.
    pub fn stop_discovery(&self) {
        self.listeners.stop_discovery();
    }

    /// Ignores telegrams from the base id block of `sender_id`.
    pub fn set_filtered_sender_id(&self, sender_id: Option<SenderId>) {
        self.listeners.set_filtered_sender_id(sender_id);
    }

    /// Sets the error listener.
    ///
    /// Applies to the queue and receive loop started after this call.
    pub fn set_error_listener(&mut self, listener: Arc<dyn ErrorListener>) {
        self.config.error_listener = Some(listener);
    }

    /// Subscribes to packets no listener handles.
    #[must_use]
    pub fn subscribe(&self, filter: Option<PacketFilter>) -> Subscription {
        self.dispatcher.subscribe(filter)
    }

    /// Waits for the next unrouted packet matching `filter`.
    ///
    /// Returns `None` if `timeout` elapses first.
    pub async fn wait_for(&self, filter: PacketFilter, timeout: Duration) -> Option<Packet> {
        self.dispatcher.wait_for(filter, timeout).await
    }
}

impl Drop for Transceiver {
    fn drop(&mut self) {
        let tasks = [&self.read_task, &self.queue_task];
        for task in tasks {
            if let Some(task) = task.lock().unwrap_or_else(PoisonError::into_inner).take() {
                task.abort();
            }
        }
    }
}

/// Receive side: bytes to packets to their destination.
struct ReadLoop {
    reader: BoxReader,
    framer: Box<dyn Framer>,
    buffer_size: usize,
    listeners: Arc<ListenerRegistry>,
    dispatcher: PacketDispatcher,
    queue: QueueHandle,
    error_listener: Option<Arc<dyn ErrorListener>>,
}

impl ReadLoop {
    async fn run(mut self) {
        let mut buf = vec![0u8; self.buffer_size];

        loop {
            let n = match self.reader.read(&mut buf).await {
                Ok(0) => {
                    tracing::debug!("serial port closed");
                    let error = Error::Io(io::Error::new(
                        io::ErrorKind::ConnectionReset,
                        "serial port closed",
                    ));
                    report(self.error_listener.as_ref(), &error);
                    return;
                }
                Ok(n) => n,
                Err(e) => {
                    tracing::error!("serial read error: {}", e);
                    report(self.error_listener.as_ref(), &Error::Io(e));
                    return;
                }
            };

            tracing::trace!("received {} bytes", n);
            self.framer.feed(&buf[..n]);
            while let Some(packet) = self.framer.decode() {
                self.route(packet);
            }
        }
    }

    fn route(&self, packet: Packet) {
        match packet {
            Packet::Radio(telegram) => {
                let routing = self.listeners.dispatch_telegram(&telegram);
                tracing::trace!("telegram from {:?}: {:?}", telegram.sender_id(), routing);
            }
            Packet::Event(event) => {
                let routing = self.listeners.dispatch_event(&event);
                tracing::trace!("event {:?}: {:?}", event.event_type(), routing);
            }
            Packet::Response(response) => self.queue.handle_response(response),
            Packet::Other(raw) => {
                tracing::debug!(
                    "received {:?} packet: {}",
                    raw.packet_type(),
                    hex::encode(raw.payload())
                );
                self.dispatcher.dispatch(Packet::Other(raw));
            }
        }
    }
}
