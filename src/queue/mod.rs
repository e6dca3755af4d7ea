//! Outbound request queue.
//!
//! Requests are written one at a time. After each write the queue waits the
//! pacing interval before sending the next request, whether or not the
//! gateway answered. A response arriving in that window is handed to the
//! current request's listener.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::{Error, Result};
use crate::listener::ErrorListener;
use crate::protocol::{Packet, Response};

/// Default delay between two consecutive requests.
pub const DEFAULT_PACING_INTERVAL: Duration = Duration::from_millis(250);

/// Default number of requests that may wait in the queue.
pub const DEFAULT_QUEUE_CAPACITY: usize = 64;

/// Callback invoked with the gateway's response to a request.
pub type ResponseListener = Box<dyn FnOnce(&Response) + Send>;

/// An encoded packet waiting to be written.
pub struct Request {
    packet: Packet,
    frame: Bytes,
    response_listener: Option<ResponseListener>,
}

impl Request {
    /// Creates a request from a packet and its encoded frame.
    #[must_use]
    pub fn new(packet: Packet, frame: Bytes, response_listener: Option<ResponseListener>) -> Self {
        Self {
            packet,
            frame,
            response_listener,
        }
    }

    /// Returns the packet being sent.
    #[must_use]
    pub const fn packet(&self) -> &Packet {
        &self.packet
    }

    /// Returns the encoded frame.
    #[must_use]
    pub const fn frame(&self) -> &Bytes {
        &self.frame
    }
}

impl fmt::Debug for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Request")
            .field("packet_type", &self.packet.packet_type())
            .field("frame", &hex::encode(&self.frame))
            .field("has_listener", &self.response_listener.is_some())
            .finish()
    }
}

/// Sending side of a running [`RequestQueue`].
#[derive(Clone)]
pub struct QueueHandle {
    requests: mpsc::Sender<Request>,
    responses: mpsc::UnboundedSender<Response>,
}

impl QueueHandle {
    /// Appends a request without waiting.
    ///
    /// A full queue drops the request and logs an error; the request's
    /// listener is released without being called.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotConnected`] if the queue has been shut down.
    pub fn enqueue(&self, request: Request) -> Result<()> {
        match self.requests.try_send(request) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(request)) => {
                tracing::error!("request queue full, dropping {:?}", request.packet.packet_type());
                Ok(())
            }
            Err(mpsc::error::TrySendError::Closed(_)) => Err(Error::NotConnected),
        }
    }

    /// Forwards a response received from the gateway.
    pub fn handle_response(&self, response: Response) {
        if self.responses.send(response).is_err() {
            tracing::trace!("request queue stopped, dropping response");
        }
    }
}

/// Single-owner request queue.
///
/// Owns the write half of the serial stream; run it with [`RequestQueue::spawn`].
pub struct RequestQueue<W> {
    writer: W,
    requests: mpsc::Receiver<Request>,
    responses: mpsc::UnboundedReceiver<Response>,
    pacing_interval: Duration,
    error_listener: Option<Arc<dyn ErrorListener>>,
    current: Option<Request>,
}

impl<W> RequestQueue<W>
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    /// Creates a queue and its handle without starting it.
    pub fn new(
        writer: W,
        capacity: usize,
        pacing_interval: Duration,
        error_listener: Option<Arc<dyn ErrorListener>>,
    ) -> (Self, QueueHandle) {
        let (request_tx, request_rx) = mpsc::channel(capacity.max(1));
        let (response_tx, response_rx) = mpsc::unbounded_channel();

        let queue = Self {
            writer,
            requests: request_rx,
            responses: response_rx,
            pacing_interval,
            error_listener,
            current: None,
        };
        let handle = QueueHandle {
            requests: request_tx,
            responses: response_tx,
        };
        (queue, handle)
    }

    /// Creates a queue and runs it on a new task.
    pub fn spawn(
        writer: W,
        capacity: usize,
        pacing_interval: Duration,
        error_listener: Option<Arc<dyn ErrorListener>>,
    ) -> (QueueHandle, JoinHandle<()>) {
        let (queue, handle) = Self::new(writer, capacity, pacing_interval, error_listener);
        (handle, tokio::spawn(queue.run()))
    }

    /// Processes requests until every [`QueueHandle`] is dropped.
    pub async fn run(mut self) {
        loop {
            let request = tokio::select! {
                request = self.requests.recv() => match request {
                    Some(request) => request,
                    None => break,
                },
                Some(response) = self.responses.recv() => {
                    self.handle_response(&response);
                    continue;
                }
            };

            self.send(request).await;

            let pacing = tokio::time::sleep(self.pacing_interval);
            tokio::pin!(pacing);
            loop {
                tokio::select! {
                    () = &mut pacing => break,
                    Some(response) = self.responses.recv() => self.handle_response(&response),
                }
            }

            if let Some(request) = self.current.take() {
                if request.response_listener.is_some() {
                    tracing::trace!("no response to {:?}", request.packet.packet_type());
                }
            }
        }
        tracing::debug!("request queue stopped");
    }

    async fn send(&mut self, request: Request) {
        tracing::trace!("sending {:?}: {}", request.packet.packet_type(), hex::encode(&request.frame));
        let frame = request.frame.clone();
        self.current = Some(request);

        let result = match self.writer.write_all(&frame).await {
            Ok(()) => self.writer.flush().await,
            Err(e) => Err(e),
        };

        if let Err(e) = result {
            tracing::error!("failed to write request: {}", e);
            if let Some(listener) = &self.error_listener {
                listener.error_occurred(&Error::Io(e));
            }
        }
    }

    fn handle_response(&mut self, response: &Response) {
        let Some(current) = self.current.as_mut() else {
            tracing::trace!("response {:?} without pending request", response.response_type());
            return;
        };
        match current.response_listener.take() {
            Some(listener) => listener(response),
            None => tracing::trace!("no listener for response {:?}", response.response_type()),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io;
    use std::pin::Pin;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::task::{Context, Poll};

    use super::*;
    use crate::protocol::{CommonCommand, ProtocolVersion, ResponseType};

    #[derive(Clone, Default)]
    struct RecordingWriter {
        writes: Arc<Mutex<Vec<Vec<u8>>>>,
        fail: bool,
    }

    impl RecordingWriter {
        fn failing() -> Self {
            Self {
                fail: true,
                ..Self::default()
            }
        }

        fn count(&self) -> usize {
            self.writes.lock().unwrap().len()
        }
    }

    impl AsyncWrite for RecordingWriter {
        fn poll_write(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            buf: &[u8],
        ) -> Poll<io::Result<usize>> {
            self.writes.lock().unwrap().push(buf.to_vec());
            if self.fail {
                return Poll::Ready(Err(io::Error::new(io::ErrorKind::BrokenPipe, "unplugged")));
            }
            Poll::Ready(Ok(buf.len()))
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }

        fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }
    }

    fn request(command: CommonCommand, listener: Option<ResponseListener>) -> Request {
        let packet: Packet = command.into();
        let frame = ProtocolVersion::Esp3.encode(&packet).unwrap();
        Request::new(packet, frame, listener)
    }

    fn counting_listener(counter: &Arc<AtomicUsize>) -> Option<ResponseListener> {
        let counter = Arc::clone(counter);
        Some(Box::new(move |_: &Response| {
            counter.fetch_add(1, Ordering::SeqCst);
        }))
    }

    async fn advance(ms: u64) {
        tokio::time::sleep(Duration::from_millis(ms)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_request_in_flight() {
        let writer = RecordingWriter::default();
        let (handle, _task) = RequestQueue::spawn(writer.clone(), 8, DEFAULT_PACING_INTERVAL, None);

        handle.enqueue(request(CommonCommand::ReadVersion, None)).unwrap();
        handle.enqueue(request(CommonCommand::ReadIdBase, None)).unwrap();

        advance(10).await;
        assert_eq!(writer.count(), 1);
        advance(200).await;
        assert_eq!(writer.count(), 1);
        advance(50).await;
        assert_eq!(writer.count(), 2);

        let writes = writer.writes.lock().unwrap();
        assert_eq!(writes[0], [0x55, 0x00, 0x01, 0x00, 0x05, 0x70, 0x03, 0x09]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_response_does_not_advance_queue() {
        let writer = RecordingWriter::default();
        let (handle, _task) = RequestQueue::spawn(writer.clone(), 8, DEFAULT_PACING_INTERVAL, None);
        let answered = Arc::new(AtomicUsize::new(0));

        handle
            .enqueue(request(CommonCommand::ReadVersion, counting_listener(&answered)))
            .unwrap();
        handle.enqueue(request(CommonCommand::ReadIdBase, None)).unwrap();

        advance(10).await;
        handle.handle_response(Response::new(ResponseType::Ok, &[]));
        advance(10).await;
        assert_eq!(answered.load(Ordering::SeqCst), 1);
        assert_eq!(writer.count(), 1);

        advance(240).await;
        assert_eq!(writer.count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unanswered_request_listener_never_called() {
        let writer = RecordingWriter::default();
        let (handle, _task) = RequestQueue::spawn(writer.clone(), 8, DEFAULT_PACING_INTERVAL, None);
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));

        handle
            .enqueue(request(CommonCommand::ReadVersion, counting_listener(&first)))
            .unwrap();
        handle
            .enqueue(request(CommonCommand::ReadIdBase, counting_listener(&second)))
            .unwrap();

        advance(260).await;
        assert_eq!(writer.count(), 2);
        handle.handle_response(Response::new(ResponseType::Ok, &[]));
        advance(10).await;

        assert_eq!(first.load(Ordering::SeqCst), 0);
        assert_eq!(second.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_listener_consumed_by_first_response() {
        let writer = RecordingWriter::default();
        let (handle, _task) = RequestQueue::spawn(writer, 8, DEFAULT_PACING_INTERVAL, None);
        let answered = Arc::new(AtomicUsize::new(0));

        handle
            .enqueue(request(CommonCommand::ReadVersion, counting_listener(&answered)))
            .unwrap();
        advance(10).await;
        handle.handle_response(Response::new(ResponseType::Ok, &[]));
        handle.handle_response(Response::new(ResponseType::Ok, &[]));
        advance(10).await;

        assert_eq!(answered.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_response_without_request_ignored() {
        let writer = RecordingWriter::default();
        let (handle, task) = RequestQueue::spawn(writer.clone(), 8, DEFAULT_PACING_INTERVAL, None);

        handle.handle_response(Response::new(ResponseType::Ok, &[]));
        advance(10).await;
        assert_eq!(writer.count(), 0);
        assert!(!task.is_finished());
    }

    #[tokio::test(start_paused = true)]
    async fn test_full_queue_drops_request() {
        let writer = RecordingWriter::default();
        let (handle, _task) = RequestQueue::spawn(writer.clone(), 1, DEFAULT_PACING_INTERVAL, None);
        let dropped = Arc::new(AtomicUsize::new(0));

        // The queue task has not run yet, so the first request fills the channel.
        handle.enqueue(request(CommonCommand::ReadVersion, None)).unwrap();
        assert!(
            handle
                .enqueue(request(CommonCommand::ReadIdBase, counting_listener(&dropped)))
                .is_ok()
        );

        advance(600).await;
        assert_eq!(writer.count(), 1);
        assert_eq!(dropped.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_write_error_reported_and_queue_advances() {
        let writer = RecordingWriter::failing();
        let errors = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&errors);
        let listener: Arc<dyn ErrorListener> = Arc::new(move |error: &Error| {
            assert!(matches!(error, Error::Io(_)));
            counter.fetch_add(1, Ordering::SeqCst);
        });
        let (handle, _task) =
            RequestQueue::spawn(writer.clone(), 8, DEFAULT_PACING_INTERVAL, Some(listener));

        handle.enqueue(request(CommonCommand::ReadVersion, None)).unwrap();
        handle.enqueue(request(CommonCommand::ReadIdBase, None)).unwrap();

        advance(10).await;
        assert_eq!(errors.load(Ordering::SeqCst), 1);
        advance(250).await;
        assert_eq!(errors.load(Ordering::SeqCst), 2);
        assert_eq!(writer.count(), 2);
    }

    #[tokio::test]
    async fn test_enqueue_after_stop() {
        let writer = RecordingWriter::default();
        let (handle, task) = RequestQueue::spawn(writer, 8, DEFAULT_PACING_INTERVAL, None);
        task.abort();
        let _ = task.await;

        assert!(matches!(
            handle.enqueue(request(CommonCommand::ReadVersion, None)),
            Err(Error::NotConnected)
        ));
    }
}
