use crate::config::Config;
use crate::error::{Result, YeelightError};
use crate::protocol::{LineBuffer, Request, RequestId, Response};
use crate::types::DeviceInfo;
use std::collections::HashMap;
use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio::time::timeout;

/// Correlation ids wrap below this bound
const MAX_REQUEST_ID: RequestId = 1_000_000;

const READ_CHUNK_SIZE: usize = 1024;

/// A request waiting for its reply
struct PendingRequest {
    request: Request,
    tx: oneshot::Sender<Result<Response>>,
}

/// Correlation state shared with the reader task
struct ConnectionState {
    pending_requests: HashMap<RequestId, PendingRequest>,
    next_id: RequestId,
}

impl ConnectionState {
    fn new() -> Self {
        Self {
            pending_requests: HashMap::new(),
            next_id: 1,
        }
    }

    /// Next free id; 0 is never handed out since devices treat it as absent
    fn allocate_id(&mut self) -> RequestId {
        loop {
            let id = self.next_id;
            self.next_id = if id + 1 >= MAX_REQUEST_ID { 1 } else { id + 1 };
            if !self.pending_requests.contains_key(&id) {
                return id;
            }
        }
    }

    /// Reject every outstanding request with `ConnectionClosed`
    fn fail_all(&mut self) -> usize {
        let count = self.pending_requests.len();
        for (id, pending) in self.pending_requests.drain() {
            tracing::debug!("Failing request {} ({}): connection closed", id, pending.request.method.as_str());
            let _ = pending.tx.send(Err(YeelightError::ConnectionClosed));
        }
        count
    }
}

/// One live TCP stream: the write half plus the task reading the other half
struct Link {
    writer: OwnedWriteHalf,
    reader: JoinHandle<()>,
    generation: u64,
}

impl Link {
    fn is_alive(&self) -> bool {
        !self.reader.is_finished()
    }
}

impl Drop for Link {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

/// Low-level line-protocol connection to one device
///
/// Requests are tagged with a correlation id and registered in a pending
/// table before they are written. A background reader task matches replies
/// back to the waiting caller by id, so replies may arrive in any order.
pub struct Connection {
    label: String,
    address: String,
    config: Config,
    state: Arc<Mutex<ConnectionState>>,
    link: Arc<Mutex<Option<Link>>>,
    generation: AtomicU64,
}

impl Connection {
    /// Create a disconnected connection for the given device
    pub fn new(info: &DeviceInfo, config: Config) -> Self {
        Self {
            label: info.label(),
            address: info.address(),
            config,
            state: Arc::new(Mutex::new(ConnectionState::new())),
            link: Arc::new(Mutex::new(None)),
            generation: AtomicU64::new(0),
        }
    }

    /// Open a fresh stream, replacing any existing one
    ///
    /// Requests still waiting on the replaced stream fail with
    /// `ConnectionClosed`.
    pub async fn connect(&self) -> Result<()> {
        let mut link = self.link.lock().await;
        if let Some(old) = link.take() {
            tracing::debug!("Replacing existing stream to {}", self.label);
            drop(old);
            self.fail_pending().await;
        }
        *link = Some(self.open_link().await?);
        Ok(())
    }

    /// Close the stream and fail every outstanding request
    pub async fn disconnect(&self) {
        let mut link = self.link.lock().await;
        if link.take().is_some() {
            tracing::info!("Disconnected from device {}", self.label);
        }
        let failed = self.fail_pending().await;
        if failed > 0 {
            tracing::debug!("Failed {} pending request(s) on {}", failed, self.label);
        }
    }

    /// Whether a stream is open and its reader is still running
    pub async fn is_connected(&self) -> bool {
        self.link.lock().await.as_ref().is_some_and(Link::is_alive)
    }

    /// Number of requests waiting for a reply
    pub async fn pending_count(&self) -> usize {
        self.state.lock().await.pending_requests.len()
    }

    /// Send a request and wait for the reply with the default timeout
    pub async fn send_request(&self, request: Request) -> Result<Response> {
        self.send_request_with_timeout(request, self.config.request_timeout())
            .await
    }

    /// Send a request and wait for the reply
    ///
    /// Exactly one outcome is produced per request: the matching reply, a
    /// timeout, or a transport error.
    pub async fn send_request_with_timeout(
        &self,
        mut request: Request,
        wait: std::time::Duration,
    ) -> Result<Response> {
        let (tx, rx) = oneshot::channel();

        // Register before writing so a fast reply always finds its entry
        let request_id = {
            let mut state = self.state.lock().await;
            let limit = self.config.max_pending.min(MAX_REQUEST_ID as usize - 1);
            if state.pending_requests.len() >= limit {
                return Err(YeelightError::QueueFull {
                    device: self.label.clone(),
                    limit,
                });
            }

            let id = state.allocate_id();
            request.id = id;
            state.pending_requests.insert(
                id,
                PendingRequest {
                    request: request.clone(),
                    tx,
                },
            );
            id
        };

        let line = match request.to_line() {
            Ok(line) => line,
            Err(e) => {
                self.forget(request_id).await;
                return Err(e.into());
            }
        };

        if let Err(e) = self.write_line(&line).await {
            self.forget(request_id).await;
            return Err(e);
        }

        if self.config.verbose {
            tracing::debug!("Request {} to {}: {}", request_id, self.label, line.trim_end());
        }

        let response = match timeout(wait, rx).await {
            Ok(Ok(result)) => result?,
            Ok(Err(_)) => return Err(YeelightError::ConnectionClosed),
            Err(_) => {
                if let Some(pending) = self.forget(request_id).await {
                    tracing::warn!(
                        "Timeout waiting for response {} ({}) from device {}",
                        request_id,
                        pending.request.method.as_str(),
                        self.label
                    );
                }
                return Err(YeelightError::Timeout);
            }
        };

        if let Some(error) = &response.error {
            return Err(YeelightError::Device {
                code: error.code,
                message: error.message.clone(),
            });
        }

        Ok(response)
    }

    async fn forget(&self, request_id: RequestId) -> Option<PendingRequest> {
        self.state.lock().await.pending_requests.remove(&request_id)
    }

    async fn fail_pending(&self) -> usize {
        self.state.lock().await.fail_all()
    }

    /// Write one frame, opening the stream first if there is no live one
    async fn write_line(&self, line: &str) -> Result<()> {
        let mut link = self.link.lock().await;

        if !link.as_ref().is_some_and(Link::is_alive) {
            link.take();
            *link = Some(self.open_link().await?);
        }
        let Some(active) = link.as_mut() else {
            return Err(YeelightError::ConnectionClosed);
        };

        if let Err(e) = active.writer.write_all(line.as_bytes()).await {
            tracing::error!("Failed to send request to device {}: {}", self.label, e);
            link.take();
            self.fail_pending().await;
            return Err(e.into());
        }
        Ok(())
    }

    async fn open_link(&self) -> Result<Link> {
        tracing::info!("Connecting to device {} at {}", self.label, self.address);

        let stream = match timeout(self.config.connect_timeout(), TcpStream::connect(&self.address)).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => return Err(self.connect_error(e)),
            Err(_) => {
                return Err(self.connect_error(io::Error::new(
                    io::ErrorKind::TimedOut,
                    "connect timed out",
                )))
            }
        };
        if let Err(e) = stream.set_nodelay(true) {
            tracing::debug!("Could not set TCP_NODELAY for {}: {}", self.label, e);
        }

        let (read_half, writer) = stream.into_split();
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;

        let reader = Reader {
            label: self.label.clone(),
            verbose: self.config.verbose,
            state: self.state.clone(),
            link: Arc::downgrade(&self.link),
            generation,
        };
        let reader = tokio::spawn(reader.run(read_half));

        tracing::info!("Connected to device {}", self.label);
        Ok(Link {
            writer,
            reader,
            generation,
        })
    }

    fn connect_error(&self, source: io::Error) -> YeelightError {
        tracing::error!("Failed to connect to device {} at {}: {}", self.label, self.address, source);
        YeelightError::Connect {
            device: format!("{} at {}", self.label, self.address),
            source,
        }
    }
}

/// Background task dispatching replies for one stream
struct Reader {
    label: String,
    verbose: bool,
    state: Arc<Mutex<ConnectionState>>,
    link: Weak<Mutex<Option<Link>>>,
    generation: u64,
}

impl Reader {
    async fn run(self, mut stream: OwnedReadHalf) {
        let mut frames = LineBuffer::new();
        let mut chunk = [0u8; READ_CHUNK_SIZE];

        loop {
            match stream.read(&mut chunk).await {
                Ok(0) => {
                    tracing::info!("Connection to device {} closed", self.label);
                    break;
                }
                Ok(n) => {
                    for line in frames.push(&chunk[..n]) {
                        self.dispatch(&line).await;
                    }
                }
                Err(e) => {
                    tracing::error!("Read error on device {}: {}", self.label, e);
                    break;
                }
            }
        }

        if frames.pending_len() > 0 {
            tracing::debug!(
                "Discarding {} byte(s) of incomplete frame from {}",
                frames.pending_len(),
                self.label
            );
        }
        self.teardown().await;
    }

    async fn dispatch(&self, line: &str) {
        if self.verbose {
            tracing::debug!("Received from {}: {}", self.label, line);
        }

        let response: Response = match serde_json::from_str(line) {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!("Dropping unparseable line from {}: {} ({})", self.label, line, e);
                return;
            }
        };

        let id = match response.id {
            Some(id) if id != 0 => id,
            _ => {
                if let Some(method) = &response.method {
                    tracing::debug!("Ignoring '{}' notification from {}", method, self.label);
                } else {
                    tracing::warn!("Response does not contain an id: {}", line);
                }
                return;
            }
        };

        let pending = self.state.lock().await.pending_requests.remove(&id);
        match pending {
            Some(pending) => {
                let _ = pending.tx.send(Ok(response));
            }
            None => {
                tracing::debug!("No pending request {} on {}, dropping reply", id, self.label);
            }
        }
    }

    /// Clear the stream reference if it is still ours and fail what was waiting on it
    async fn teardown(self) {
        let Some(shared) = self.link.upgrade() else {
            return;
        };
        let mut link = shared.lock().await;
        if !link.as_ref().is_some_and(|l| l.generation == self.generation) {
            return;
        }

        let failed = self.state.lock().await.fail_all();
        if failed > 0 {
            tracing::warn!("{} request(s) to {} failed: connection closed", failed, self.label);
        }
        // Dropping the link aborts this task; nothing may await after this point
        link.take();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocate_id_skips_occupied_and_wraps() {
        let mut state = ConnectionState::new();
        state.next_id = MAX_REQUEST_ID - 1;

        let (tx, _rx) = oneshot::channel();
        state.pending_requests.insert(
            1,
            PendingRequest {
                request: Request::new(crate::protocol::Method::Toggle, vec![]),
                tx,
            },
        );

        assert_eq!(state.allocate_id(), MAX_REQUEST_ID - 1);
        // wraps past the bound, skips 0 and the occupied id 1
        assert_eq!(state.allocate_id(), 2);
        assert_eq!(state.allocate_id(), 3);
    }

    #[test]
    fn test_fail_all_rejects_every_waiter() {
        let mut state = ConnectionState::new();
        let mut receivers = Vec::new();
        for _ in 0..3 {
            let (tx, rx) = oneshot::channel();
            let id = state.allocate_id();
            state.pending_requests.insert(
                id,
                PendingRequest {
                    request: Request::new(crate::protocol::Method::Toggle, vec![]),
                    tx,
                },
            );
            receivers.push(rx);
        }

        assert_eq!(state.fail_all(), 3);
        assert!(state.pending_requests.is_empty());
        for mut rx in receivers {
            assert!(matches!(rx.try_recv(), Ok(Err(YeelightError::ConnectionClosed))));
        }
    }
}
