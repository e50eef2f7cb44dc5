//! Lifecycle and progress events emitted by an upload session

use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;

/// Everything a session reports to its host, in emission order
#[derive(Debug, Clone, PartialEq)]
pub enum UploadEvent {
    /// The session started and is about to send the first range
    Init,
    /// Share of the file written to the wire, 0 to 100
    Progress { percent: f64 },
    /// A range was committed by the server
    ChunkHandled {
        total_chunks: u64,
        file_size: u64,
        chunks_completed: u64,
        chunk_size: u64,
    },
    /// A failed range is being sent again
    ChunkFailed {
        retry_count: u32,
        chunks_completed: u64,
        chunk_size: u64,
    },
    NetworkStateChanged { online: bool },
    Paused,
    Resumed,
    Aborted,
    Success { elapsed: Duration },
    Error { message: String, elapsed: Duration },
}

impl UploadEvent {
    /// Whether no further events follow this one
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            UploadEvent::Aborted | UploadEvent::Success { .. } | UploadEvent::Error { .. }
        )
    }
}

/// Receiving half of a session's event stream
pub type UploadEvents = UnboundedReceiver<UploadEvent>;

/// Callback-style view of [`UploadEvent`]; every method defaults to doing
/// nothing.
pub trait UploadCallbacks: Send {
    fn on_upload_init(&mut self) {}
    fn on_progress_update(&mut self, _percent: f64) {}
    fn on_chunk_handled(
        &mut self,
        _total_chunks: u64,
        _file_size: u64,
        _chunks_completed: u64,
        _chunk_size: u64,
    ) {
    }
    fn on_chunk_uploading_failed(&mut self, _retry_count: u32, _chunks_completed: u64, _chunk_size: u64) {}
    fn on_network_state_change(&mut self, _online: bool) {}
    fn on_pause_uploading(&mut self) {}
    fn on_resume_uploading(&mut self) {}
    fn on_abort(&mut self) {}
    fn on_success(&mut self, _elapsed_ms: u64) {}
    fn on_error(&mut self, _message: &str, _elapsed_ms: u64) {}
}

/// Route one event to the matching callback.
pub fn dispatch<C: UploadCallbacks + ?Sized>(event: &UploadEvent, callbacks: &mut C) {
    match event {
        UploadEvent::Init => callbacks.on_upload_init(),
        UploadEvent::Progress { percent } => callbacks.on_progress_update(*percent),
        UploadEvent::ChunkHandled {
            total_chunks,
            file_size,
            chunks_completed,
            chunk_size,
        } => callbacks.on_chunk_handled(*total_chunks, *file_size, *chunks_completed, *chunk_size),
        UploadEvent::ChunkFailed {
            retry_count,
            chunks_completed,
            chunk_size,
        } => callbacks.on_chunk_uploading_failed(*retry_count, *chunks_completed, *chunk_size),
        UploadEvent::NetworkStateChanged { online } => callbacks.on_network_state_change(*online),
        UploadEvent::Paused => callbacks.on_pause_uploading(),
        UploadEvent::Resumed => callbacks.on_resume_uploading(),
        UploadEvent::Aborted => callbacks.on_abort(),
        UploadEvent::Success { elapsed } => callbacks.on_success(elapsed.as_millis() as u64),
        UploadEvent::Error { message, elapsed } => {
            callbacks.on_error(message, elapsed.as_millis() as u64)
        }
    }
}

/// Drain `events` into `callbacks` until the terminal event or until the
/// session goes away.
pub async fn forward_events<C: UploadCallbacks + ?Sized>(mut events: UploadEvents, callbacks: &mut C) {
    while let Some(event) = events.recv().await {
        dispatch(&event, callbacks);
        if event.is_terminal() {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    #[derive(Default)]
    struct Recorder {
        calls: Vec<String>,
    }

    impl UploadCallbacks for Recorder {
        fn on_upload_init(&mut self) {
            self.calls.push("init".into());
        }
        fn on_chunk_handled(&mut self, total: u64, size: u64, done: u64, chunk: u64) {
            self.calls.push(format!("chunk {}/{} {} {}", done, total, size, chunk));
        }
        fn on_success(&mut self, elapsed_ms: u64) {
            self.calls.push(format!("success {}", elapsed_ms));
        }
        fn on_error(&mut self, message: &str, elapsed_ms: u64) {
            self.calls.push(format!("error {} {}", message, elapsed_ms));
        }
    }

    #[tokio::test]
    async fn test_forward_stops_at_terminal_event() {
        let (tx, rx) = mpsc::unbounded_channel();
        tx.send(UploadEvent::Init).unwrap();
        tx.send(UploadEvent::Progress { percent: 50.0 }).unwrap();
        tx.send(UploadEvent::ChunkHandled {
            total_chunks: 2,
            file_size: 10,
            chunks_completed: 1,
            chunk_size: 5,
        })
        .unwrap();
        tx.send(UploadEvent::Success {
            elapsed: Duration::from_millis(1500),
        })
        .unwrap();
        tx.send(UploadEvent::Init).unwrap();

        let mut recorder = Recorder::default();
        forward_events(rx, &mut recorder).await;

        assert_eq!(
            recorder.calls,
            vec!["init", "chunk 1/2 10 5", "success 1500"]
        );
    }

    #[test]
    fn test_error_dispatch() {
        let mut recorder = Recorder::default();
        dispatch(
            &UploadEvent::Error {
                message: "boom".into(),
                elapsed: Duration::from_secs(2),
            },
            &mut recorder,
        );
        assert_eq!(recorder.calls, vec!["error boom 2000"]);
    }

    #[test]
    fn test_terminal_events() {
        assert!(UploadEvent::Aborted.is_terminal());
        assert!(!UploadEvent::Paused.is_terminal());
        assert!(!UploadEvent::ChunkFailed {
            retry_count: 1,
            chunks_completed: 0,
            chunk_size: 1
        }
        .is_terminal());
    }
}
