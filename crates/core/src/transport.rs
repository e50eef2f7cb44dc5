//! Sending one range of the file to the signed URL

use crate::constants::*;
use crate::error::{Error, Result};
use crate::protocol::ByteRange;
use crate::reader::{ChunkReader, ProgressSink};
use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::Stream;
use http::StatusCode;
use reqwest::header::{CONTENT_LENGTH, CONTENT_RANGE, CONTENT_TYPE, RANGE};
use reqwest::{redirect, Body, Client};
use serde::{Deserialize, Serialize};
use std::io;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

/// One range, ready to be sent
pub struct ChunkRequest {
    pub url: String,
    pub range: ByteRange,
    pub file_len: u64,
    pub reader: ChunkReader,
    pub progress: ProgressSink,
}

/// What the server answered for a range
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkResponse {
    pub status: StatusCode,
    /// `Range` header, present on "resume incomplete" answers
    pub range: Option<String>,
}

impl ChunkResponse {
    pub fn new(status: StatusCode) -> Self {
        Self { status, range: None }
    }

    pub fn with_range(mut self, range: impl Into<String>) -> Self {
        self.range = Some(range.into());
        self
    }
}

/// Sends ranges over the wire. Cancellation is done by dropping the
/// returned future.
#[async_trait]
pub trait ChunkTransport: Send + Sync {
    async fn send_chunk(&self, request: ChunkRequest) -> Result<ChunkResponse>;
}

/// Timeouts applied to every chunk request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpSettings {
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_read_timeout")]
    pub read_timeout_secs: u64,
    /// Longest the connection may refuse body bytes before the range is
    /// given up. This is an idle window, so a slow but steady upload of a
    /// large range never hits it.
    #[serde(default = "default_write_timeout")]
    pub write_timeout_secs: u64,
}

fn default_connect_timeout() -> u64 {
    DEFAULT_CONNECT_TIMEOUT_SECS
}

fn default_read_timeout() -> u64 {
    DEFAULT_READ_TIMEOUT_SECS
}

fn default_write_timeout() -> u64 {
    DEFAULT_WRITE_TIMEOUT_SECS
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            connect_timeout_secs: default_connect_timeout(),
            read_timeout_secs: default_read_timeout(),
            write_timeout_secs: default_write_timeout(),
        }
    }
}

/// [`ChunkTransport`] backed by `reqwest`
#[derive(Debug, Clone)]
pub struct HttpTransport {
    http_client: Client,
    write_timeout: Duration,
}

impl HttpTransport {
    pub fn new(settings: &HttpSettings) -> Result<Self> {
        // A 308 here means "resume incomplete", never a redirect to follow.
        let http_client = Client::builder()
            .connect_timeout(Duration::from_secs(settings.connect_timeout_secs))
            .read_timeout(Duration::from_secs(settings.read_timeout_secs))
            .redirect(redirect::Policy::none())
            .build()
            .map_err(|e| Error::HttpClient(e.to_string()))?;

        Ok(Self {
            http_client,
            write_timeout: Duration::from_secs(settings.write_timeout_secs),
        })
    }
}

#[async_trait]
impl ChunkTransport for HttpTransport {
    async fn send_chunk(&self, request: ChunkRequest) -> Result<ChunkResponse> {
        let content_range = request.range.content_range(request.file_len);
        debug!(%content_range, "sending range");

        let length = request.reader.len();
        let watch = WriteWatch::default();
        let body = Body::wrap_stream(WatchedBody::new(
            request.reader.into_stream(request.progress),
            watch.clone(),
            length,
        ));

        let send = self
            .http_client
            .put(&request.url)
            .header(CONTENT_RANGE, content_range)
            .header(CONTENT_TYPE, OCTET_STREAM)
            .header(CONTENT_LENGTH, length)
            .body(body)
            .send();

        let response = tokio::select! {
            response = send => response?,
            _ = watch.stalled(self.write_timeout) => {
                warn!(
                    timeout_secs = self.write_timeout.as_secs(),
                    "connection stopped taking body bytes"
                );
                return Err(Error::Timeout);
            }
        };

        let status = response.status();
        let range = response
            .headers()
            .get(RANGE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        debug!(%status, ?range, "range answered");

        Ok(ChunkResponse { status, range })
    }
}

/// Shared record of when the body last handed a frame to the connection
/// without being asked for the next one. Zero means nothing is waiting.
#[derive(Debug, Clone)]
struct WriteWatch {
    origin: Instant,
    waiting_since_ms: Arc<AtomicU64>,
}

impl Default for WriteWatch {
    fn default() -> Self {
        Self {
            origin: Instant::now(),
            waiting_since_ms: Arc::new(AtomicU64::new(0)),
        }
    }
}

impl WriteWatch {
    fn frame_handed_over(&self) {
        let since = self.origin.elapsed().as_millis() as u64 + 1;
        self.waiting_since_ms.store(since, Ordering::SeqCst);
    }

    fn frame_taken(&self) {
        self.waiting_since_ms.store(0, Ordering::SeqCst);
    }

    fn waiting_since(&self) -> Option<Instant> {
        match self.waiting_since_ms.load(Ordering::SeqCst) {
            0 => None,
            ms => Some(self.origin + Duration::from_millis(ms - 1)),
        }
    }

    /// Resolves once a single frame has waited longer than `idle`.
    async fn stalled(&self, idle: Duration) {
        loop {
            match self.waiting_since() {
                Some(since) if since.elapsed() >= idle => return,
                Some(since) => tokio::time::sleep_until(since + idle).await,
                None => tokio::time::sleep(idle).await,
            }
        }
    }
}

/// Request body that reports to a [`WriteWatch`] how long the connection
/// takes to ask for each next frame.
struct WatchedBody<S> {
    inner: Pin<Box<S>>,
    watch: WriteWatch,
    remaining: u64,
}

impl<S> WatchedBody<S> {
    fn new(inner: S, watch: WriteWatch, length: u64) -> Self {
        Self {
            inner: Box::pin(inner),
            watch,
            remaining: length,
        }
    }
}

impl<S> Stream for WatchedBody<S>
where
    S: Stream<Item = io::Result<Bytes>>,
{
    type Item = io::Result<Bytes>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.watch.frame_taken();
        let polled = self.inner.as_mut().poll_next(cx);
        if let Poll::Ready(Some(Ok(frame))) = &polled {
            self.remaining = self.remaining.saturating_sub(frame.len() as u64);
            // Past the last frame the wait belongs to the read timeout.
            if self.remaining > 0 {
                self.watch.frame_handed_over();
            }
        }
        polled
    }
}
