//! Upload session state machine
//!
//! A session is a single actor task that owns all upload state. Host
//! commands, chunk results, retry timers and connectivity changes all
//! reach it as messages, so no two transitions ever interleave. Events go
//! out on an unbounded channel, which means a handler may call back into
//! the session (for example `pause` from inside a progress handler)
//! without deadlocking.

use crate::connectivity::{Connectivity, NetworkMonitor};
use crate::constants::SOMETHING_WENT_WRONG;
use crate::error::{Error, Result};
use crate::event::{UploadEvent, UploadEvents};
use crate::options::UploadConfig;
use crate::protocol::{check_response, ByteRange};
use crate::reader::{ChunkReader, ProgressSink};
use crate::retry::{backoff_delay, RetryScheduler};
use crate::transport::{ChunkRequest, ChunkResponse, ChunkTransport};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::sync::watch;
use tokio::time::Instant;
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

/// Where a session is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadStatus {
    Idle,
    Uploading,
    Paused,
    Aborted,
    Completed,
    Failed,
}

impl UploadStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            UploadStatus::Aborted | UploadStatus::Completed | UploadStatus::Failed
        )
    }
}

/// Read-only copy of the session state, republished after every transition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadSnapshot {
    pub status: UploadStatus,
    pub total_chunks: u64,
    pub committed_offset: u64,
    pub chunks_completed: u64,
    pub consecutive_failures: u32,
    pub is_offline: bool,
    pub in_flight: bool,
    pub retry_pending: bool,
}

enum Command {
    Start,
    Pause,
    Resume,
    Abort,
    ChunkFinished {
        attempt: u64,
        result: Result<ChunkResponse>,
    },
    RetryFired {
        retry: u64,
    },
    Connectivity(Connectivity),
    HandleDropped,
}

/// Handle to a running upload.
///
/// Dropping the handle does not stop an upload that is in progress; call
/// [`abort`](Self::abort) for that. The upload runs on until it reaches a
/// terminal event. A session dropped before `start`, or while paused, can
/// never make progress again and is aborted.
pub struct UploadSession {
    id: Uuid,
    mailbox: UnboundedSender<Command>,
    started: AtomicBool,
    snapshot: watch::Receiver<UploadSnapshot>,
    _detach: DropGuard,
}

impl UploadSession {
    /// Spawn the session actor on the current tokio runtime.
    ///
    /// Nothing is sent until [`start`](Self::start) is called.
    pub fn spawn(
        config: UploadConfig,
        transport: Arc<dyn ChunkTransport>,
        network: Arc<dyn NetworkMonitor>,
    ) -> (Self, UploadEvents) {
        let id = Uuid::new_v4();
        let (mailbox_tx, mailbox_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        let detached = CancellationToken::new();

        let state = UploadState::default();
        let (snapshot_tx, snapshot_rx) = watch::channel(state.snapshot(false));

        let actor = SessionActor {
            config,
            transport,
            network,
            connectivity: None,
            seen_initial_connectivity: false,
            mailbox: mailbox_rx,
            loopback: mailbox_tx.clone(),
            detached: detached.clone(),
            handle_gone: false,
            events: events_tx,
            snapshot: snapshot_tx,
            retry: RetryScheduler::new(),
            retries_scheduled: 0,
            pending_retry: None,
            state,
        };
        tokio::spawn(actor.run().instrument(info_span!("upload", session = %id)));

        let session = Self {
            id,
            mailbox: mailbox_tx,
            started: AtomicBool::new(false),
            snapshot: snapshot_rx,
            _detach: detached.drop_guard(),
        };
        (session, events_rx)
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Begin uploading. A session can be started once; later calls fail
    /// with [`Error::AlreadyStarted`] and leave the upload untouched.
    pub fn start(&self) -> Result<()> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(Error::AlreadyStarted);
        }
        self.mailbox
            .send(Command::Start)
            .map_err(|_| Error::SessionClosed)
    }

    /// Suspend after discarding the range currently on the wire.
    pub fn pause(&self) {
        let _ = self.mailbox.send(Command::Pause);
    }

    /// Continue from the last committed offset.
    pub fn resume(&self) {
        let _ = self.mailbox.send(Command::Resume);
    }

    /// Stop for good. Safe to call any number of times.
    pub fn abort(&self) {
        let _ = self.mailbox.send(Command::Abort);
    }

    pub fn snapshot(&self) -> UploadSnapshot {
        self.snapshot.borrow().clone()
    }

    /// Receiver that observes every published snapshot
    pub fn watch(&self) -> watch::Receiver<UploadSnapshot> {
        self.snapshot.clone()
    }

    /// Wait until the session reaches a terminal status.
    pub async fn finished(&self) -> UploadSnapshot {
        let mut rx = self.snapshot.clone();
        let finished = rx
            .wait_for(|snapshot| snapshot.status.is_terminal())
            .await
            .map(|snapshot| (*snapshot).clone());
        finished.unwrap_or_else(|_| rx.borrow().clone())
    }
}

struct InFlight {
    attempt: u64,
    cancel: CancellationToken,
}

struct UploadState {
    status: UploadStatus,
    total_chunks: u64,
    committed_offset: u64,
    chunks_completed: u64,
    consecutive_failures: u32,
    started_at: Option<Instant>,
    is_offline: bool,
    in_flight: Option<InFlight>,
    attempts: u64,
}

impl Default for UploadState {
    fn default() -> Self {
        Self {
            status: UploadStatus::Idle,
            total_chunks: 0,
            committed_offset: 0,
            chunks_completed: 0,
            consecutive_failures: 0,
            started_at: None,
            is_offline: false,
            in_flight: None,
            attempts: 0,
        }
    }
}

impl UploadState {
    fn snapshot(&self, retry_pending: bool) -> UploadSnapshot {
        UploadSnapshot {
            status: self.status,
            total_chunks: self.total_chunks,
            committed_offset: self.committed_offset,
            chunks_completed: self.chunks_completed,
            consecutive_failures: self.consecutive_failures,
            is_offline: self.is_offline,
            in_flight: self.in_flight.is_some(),
            retry_pending,
        }
    }
}

struct SessionActor {
    config: UploadConfig,
    transport: Arc<dyn ChunkTransport>,
    network: Arc<dyn NetworkMonitor>,
    connectivity: Option<UnboundedReceiver<Connectivity>>,
    seen_initial_connectivity: bool,
    mailbox: UnboundedReceiver<Command>,
    /// Held for the actor's whole life, so the mailbox only closes once the
    /// actor itself has stopped.
    loopback: UnboundedSender<Command>,
    detached: CancellationToken,
    handle_gone: bool,
    events: UnboundedSender<UploadEvent>,
    snapshot: watch::Sender<UploadSnapshot>,
    retry: RetryScheduler,
    retries_scheduled: u64,
    pending_retry: Option<u64>,
    state: UploadState,
}

/// Error text for a failed range, with a fallback for errors that carry none
fn failure_detail(err: &Error) -> String {
    let detail = err.to_string();
    if detail.trim().is_empty() {
        SOMETHING_WENT_WRONG.to_string()
    } else {
        detail
    }
}

/// Next connectivity change, or never once the subscription is gone.
async fn next_change(slot: &mut Option<UnboundedReceiver<Connectivity>>) -> Connectivity {
    let received = match slot.as_mut() {
        Some(rx) => rx.recv().await,
        None => None,
    };
    match received {
        Some(change) => change,
        None => {
            *slot = None;
            std::future::pending().await
        }
    }
}

impl SessionActor {
    async fn run(mut self) {
        loop {
            // Commands the handle queued before it was dropped run first.
            let command = tokio::select! {
                biased;
                command = self.mailbox.recv() => match command {
                    Some(command) => command,
                    None => break,
                },
                change = next_change(&mut self.connectivity) => Command::Connectivity(change),
                _ = self.detached.cancelled(), if !self.handle_gone => Command::HandleDropped,
            };

            self.handle(command);
            self.publish();

            if self.state.status.is_terminal() {
                break;
            }
        }

        self.cancel_in_flight();
        self.cancel_retry();
        // Unregisters from the monitor.
        self.connectivity = None;
        self.publish();
        debug!("session actor stopped");
    }

    fn handle(&mut self, command: Command) {
        match command {
            Command::Start => self.start(),
            Command::Pause => self.pause(),
            Command::Resume => self.resume(),
            Command::Abort => self.abort(),
            Command::ChunkFinished { attempt, result } => self.chunk_finished(attempt, result),
            Command::RetryFired { retry } => self.retry_fired(retry),
            Command::Connectivity(change) => self.connectivity_changed(change),
            Command::HandleDropped => self.handle_dropped(),
        }
    }

    fn publish(&self) {
        self.snapshot
            .send_replace(self.state.snapshot(self.pending_retry.is_some()));
    }

    fn emit(&self, event: UploadEvent) {
        let _ = self.events.send(event);
    }

    fn elapsed(&self) -> std::time::Duration {
        self.state
            .started_at
            .map(|started| started.elapsed())
            .unwrap_or_default()
    }

    /// Bytes in the range starting at the committed offset, 0 once done
    fn current_chunk_size(&self) -> u64 {
        ByteRange::next(
            self.state.committed_offset,
            self.config.chunk_size(),
            self.config.file_len(),
        )
        .map(|range| range.len())
        .unwrap_or(0)
    }

    fn start(&mut self) {
        if self.state.status != UploadStatus::Idle {
            warn!(status = ?self.state.status, "ignoring start");
            return;
        }

        self.state.started_at = Some(Instant::now());
        self.state.total_chunks = self.config.total_chunks();
        self.state.committed_offset = 0;
        self.state.chunks_completed = 0;
        self.state.consecutive_failures = 0;
        self.state.status = UploadStatus::Uploading;
        self.connectivity = Some(self.network.subscribe());

        info!(
            file = %self.config.path().display(),
            file_len = self.config.file_len(),
            chunk_size = self.config.chunk_size(),
            total_chunks = self.state.total_chunks,
            "upload started"
        );
        self.emit(UploadEvent::Init);
        self.send_current_range();
    }

    fn pause(&mut self) {
        if self.state.status != UploadStatus::Uploading {
            return;
        }
        self.state.status = UploadStatus::Paused;
        self.cancel_in_flight();
        self.cancel_retry();
        info!(committed = self.state.committed_offset, "upload paused");
        self.emit(UploadEvent::Paused);
    }

    fn resume(&mut self) {
        if self.state.status != UploadStatus::Paused
            || self.state.chunks_completed >= self.state.total_chunks
        {
            return;
        }
        self.state.status = UploadStatus::Uploading;
        info!(committed = self.state.committed_offset, "upload resumed");
        self.emit(UploadEvent::Resumed);
        if !self.state.is_offline {
            self.send_current_range();
        }
    }

    fn abort(&mut self) {
        if self.state.status.is_terminal() {
            return;
        }
        self.cancel_in_flight();
        self.cancel_retry();
        self.state.status = UploadStatus::Aborted;
        self.state.committed_offset = 0;
        info!("upload aborted");
        self.emit(UploadEvent::Aborted);
    }

    fn handle_dropped(&mut self) {
        self.handle_gone = true;
        match self.state.status {
            UploadStatus::Idle | UploadStatus::Paused => {
                info!(status = ?self.state.status, "session handle dropped, nothing left to resume");
                self.abort();
            }
            status => debug!(?status, "session handle dropped, upload continues"),
        }
    }

    fn send_current_range(&mut self) {
        if self.state.in_flight.is_some() {
            return;
        }

        let file_len = self.config.file_len();
        let range = match ByteRange::next(
            self.state.committed_offset,
            self.config.chunk_size(),
            file_len,
        ) {
            Ok(range) => range,
            Err(e) => return self.chunk_failed(e),
        };
        let reader = match ChunkReader::new(self.config.path(), range.start, range.end, file_len) {
            Ok(reader) => reader,
            Err(e) => return self.chunk_failed(e),
        };
        let mailbox = self.loopback.clone();

        self.state.attempts += 1;
        let attempt = self.state.attempts;
        let cancel = CancellationToken::new();

        let progress: ProgressSink = {
            let events = self.events.clone();
            let cancel = cancel.clone();
            Arc::new(move |written, _total| {
                if cancel.is_cancelled() {
                    return;
                }
                let percent = ((range.start + written) as f64 * 100.0 / file_len as f64).min(100.0);
                let _ = events.send(UploadEvent::Progress { percent });
            })
        };

        let request = ChunkRequest {
            url: self.config.url().to_string(),
            range,
            file_len,
            reader,
            progress,
        };

        debug!(attempt, start = range.start, end = range.end, "sending range");
        let transport = Arc::clone(&self.transport);
        let token = cancel.clone();
        tokio::spawn(
            async move {
                let result = tokio::select! {
                    _ = token.cancelled() => return,
                    result = transport.send_chunk(request) => result,
                };
                let _ = mailbox.send(Command::ChunkFinished { attempt, result });
            }
            .in_current_span(),
        );

        self.state.in_flight = Some(InFlight { attempt, cancel });
    }

    fn cancel_in_flight(&mut self) {
        if let Some(in_flight) = self.state.in_flight.take() {
            debug!(attempt = in_flight.attempt, "cancelling request");
            in_flight.cancel.cancel();
        }
    }

    fn cancel_retry(&mut self) {
        self.retry.cancel();
        self.pending_retry = None;
    }

    fn chunk_finished(&mut self, attempt: u64, result: Result<ChunkResponse>) {
        match &self.state.in_flight {
            Some(in_flight) if in_flight.attempt == attempt => {}
            _ => {
                debug!(attempt, "discarding result of cancelled request");
                return;
            }
        }
        self.state.in_flight = None;

        if self.state.status != UploadStatus::Uploading {
            return;
        }

        let outcome = ByteRange::next(
            self.state.committed_offset,
            self.config.chunk_size(),
            self.config.file_len(),
        )
        .and_then(|range| {
            let response = result?;
            check_response(response.status, response.range.as_deref(), range)?;
            Ok(range)
        });

        match outcome {
            Ok(range) => self.commit(range),
            Err(e) => self.chunk_failed(e),
        }
    }

    fn commit(&mut self, range: ByteRange) {
        self.cancel_retry();
        self.state.chunks_completed += 1;
        self.state.committed_offset = range.end;
        self.state.consecutive_failures = 0;

        debug!(
            committed = self.state.committed_offset,
            chunks_completed = self.state.chunks_completed,
            "range committed"
        );
        self.emit(UploadEvent::ChunkHandled {
            total_chunks: self.state.total_chunks,
            file_size: self.config.file_len(),
            chunks_completed: self.state.chunks_completed,
            chunk_size: self.current_chunk_size(),
        });

        if self.state.chunks_completed >= self.state.total_chunks {
            self.state.status = UploadStatus::Completed;
            let elapsed = self.elapsed();
            info!(elapsed_ms = elapsed.as_millis() as u64, "upload completed");
            self.emit(UploadEvent::Success { elapsed });
        } else {
            self.send_current_range();
        }
    }

    fn chunk_failed(&mut self, err: Error) {
        let can_retry = self.state.status == UploadStatus::Uploading
            && !self.state.is_offline
            && self.state.consecutive_failures < self.config.max_retries();

        if !can_retry {
            self.fail(format!("Chunk Uploading Failed:\n{}", failure_detail(&err)));
            return;
        }

        let mailbox = self.loopback.clone();
        let delay = backoff_delay(
            self.state.consecutive_failures,
            self.config.retry_delay(),
            self.config.max_retry_delay(),
        );
        warn!(
            error = %err,
            failures = self.state.consecutive_failures,
            delay_ms = delay.as_millis() as u64,
            "range failed, retrying"
        );

        self.retries_scheduled += 1;
        let retry = self.retries_scheduled;
        self.pending_retry = Some(retry);
        self.retry.schedule_after(delay, move || {
            let _ = mailbox.send(Command::RetryFired { retry });
        });
    }

    fn retry_fired(&mut self, retry: u64) {
        if self.pending_retry != Some(retry) {
            return;
        }
        self.pending_retry = None;

        if self.state.status != UploadStatus::Uploading || self.state.is_offline {
            return;
        }

        self.state.consecutive_failures += 1;
        self.emit(UploadEvent::ChunkFailed {
            retry_count: self.state.consecutive_failures,
            chunks_completed: self.state.chunks_completed,
            chunk_size: self.current_chunk_size(),
        });
        self.send_current_range();
    }

    fn fail(&mut self, message: String) {
        self.cancel_in_flight();
        self.cancel_retry();
        self.state.status = UploadStatus::Failed;
        let elapsed = self.elapsed();
        error!(%message, elapsed_ms = elapsed.as_millis() as u64, "upload failed");
        self.emit(UploadEvent::Error { message, elapsed });
    }

    fn connectivity_changed(&mut self, change: Connectivity) {
        if !self.seen_initial_connectivity {
            self.seen_initial_connectivity = true;
            if change.is_online() {
                debug!("initial connectivity: available");
                return;
            }
        }

        match change {
            Connectivity::Lost => {
                if self.state.is_offline {
                    return;
                }
                self.state.is_offline = true;
                self.cancel_in_flight();
                self.cancel_retry();
                warn!("network lost");
                self.emit(UploadEvent::NetworkStateChanged { online: false });
            }
            Connectivity::Available => {
                if !self.state.is_offline {
                    return;
                }
                self.state.is_offline = false;
                info!("network available");
                self.emit(UploadEvent::NetworkStateChanged { online: true });
                if self.state.status == UploadStatus::Uploading {
                    self.send_current_range();
                }
            }
        }
    }
}
