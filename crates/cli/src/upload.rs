//! `pushpilot upload`: drive one upload session from the terminal

use crate::handlers::format_bytes;
use anyhow::Result;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use pushpilot_core::{
    config_exists, forward_events, load_config, ConfigError, ConnectivityMonitor,
    ControlPlaneClient, CreateUploadRequest, HttpTransport, NetworkMonitor, NoopMonitor,
    ReachabilityProbe, UploadCallbacks, UploadSession,
};
use std::io::BufRead;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

const MIB: u64 = 1024 * 1024;

#[derive(Debug)]
pub struct UploadArgs {
    pub file: PathBuf,
    pub url: Option<String>,
    pub chunk_size_mb: Option<u64>,
    pub max_retries: Option<u32>,
    pub retry_delay_ms: Option<u64>,
    pub probe: bool,
}

/// How the session ended, as seen through its events
#[derive(Debug, Clone, PartialEq)]
enum Outcome {
    Completed { elapsed_ms: u64 },
    Aborted,
    Failed { message: String },
}

/// Renders session events on an indicatif bar
struct TerminalReporter {
    bar: ProgressBar,
    outcome: Option<Outcome>,
}

impl TerminalReporter {
    fn new(bar: ProgressBar) -> Self {
        Self { bar, outcome: None }
    }
}

impl UploadCallbacks for TerminalReporter {
    fn on_upload_init(&mut self) {
        self.bar.set_message("uploading");
    }

    fn on_progress_update(&mut self, percent: f64) {
        self.bar.set_position(percent.floor() as u64);
    }

    fn on_chunk_handled(
        &mut self,
        total_chunks: u64,
        _file_size: u64,
        chunks_completed: u64,
        _chunk_size: u64,
    ) {
        self.bar
            .set_message(format!("chunk {}/{}", chunks_completed, total_chunks));
    }

    fn on_chunk_uploading_failed(&mut self, retry_count: u32, chunks_completed: u64, chunk_size: u64) {
        self.bar.println(format!(
            "  ⚠️  Chunk {} ({}) failed, retry #{}",
            chunks_completed + 1,
            format_bytes(chunk_size),
            retry_count
        ));
    }

    fn on_network_state_change(&mut self, online: bool) {
        if online {
            self.bar.println("  🌐 Network is back, resuming");
            self.bar.set_message("uploading");
        } else {
            self.bar.println("  📴 Network lost, waiting");
            self.bar.set_message("offline");
        }
    }

    fn on_pause_uploading(&mut self) {
        self.bar.set_message("paused (r + Enter to resume)");
    }

    fn on_resume_uploading(&mut self) {
        self.bar.set_message("uploading");
    }

    fn on_abort(&mut self) {
        self.bar.abandon_with_message("aborted");
        self.outcome = Some(Outcome::Aborted);
    }

    fn on_success(&mut self, elapsed_ms: u64) {
        self.bar.finish_with_message("done");
        self.outcome = Some(Outcome::Completed { elapsed_ms });
    }

    fn on_error(&mut self, message: &str, _elapsed_ms: u64) {
        self.bar.abandon_with_message("failed");
        self.outcome = Some(Outcome::Failed {
            message: message.to_string(),
        });
    }
}

/// Handle upload command
pub async fn handle_upload(args: UploadArgs) -> Result<()> {
    let config = if config_exists() {
        Some(load_config()?)
    } else {
        None
    };

    let mut options = config
        .as_ref()
        .map(|c| c.upload.clone())
        .unwrap_or_default()
        .to_options()
        .file(&args.file);
    if let Some(mb) = args.chunk_size_mb {
        options = options.chunk_size(mb.saturating_mul(MIB));
    }
    if let Some(retries) = args.max_retries {
        options = options.max_retries(retries);
    }
    if let Some(ms) = args.retry_delay_ms {
        let delay = Duration::from_millis(ms);
        let max_delay = options.max_retry_delay.max(delay);
        options = options.retry_delay(delay).max_retry_delay(max_delay);
    }

    // Everything but the destination has to be valid before asking for one.
    match options.validate() {
        Ok(_) | Err(ConfigError::MissingUrl) => {}
        Err(e) => return Err(e.into()),
    }

    let url = match args.url {
        Some(url) => url,
        None => {
            let config = config.as_ref().ok_or_else(|| {
                anyhow::anyhow!("No --url given and no configuration found (run 'pushpilot init')")
            })?;
            println!("Requesting signed URL...");
            let client = ControlPlaneClient::from_config(&config.control_plane);
            let upload = client.create_upload(&CreateUploadRequest::default()).await?;
            if let Some(id) = &upload.upload_id {
                println!("  Upload ID: {}", id);
            }
            upload.url
        }
    };

    let upload_config = options.signed_url(url).validate()?;
    let settings = config.map(|c| c.http).unwrap_or_default();
    let transport = Arc::new(HttpTransport::new(&settings)?);

    let probe = if args.probe {
        let monitor = ConnectivityMonitor::global().clone();
        let probe = ReachabilityProbe::for_url(upload_config.url())?;
        debug!(host = probe.target(), "starting reachability probe");
        Some((probe.spawn(monitor.clone()), monitor))
    } else {
        None
    };
    let network: Arc<dyn NetworkMonitor> = match &probe {
        Some((_, monitor)) => Arc::new(monitor.clone()),
        None => Arc::new(NoopMonitor),
    };

    println!(
        "Uploading {} ({}) in {} chunk(s) of {}",
        upload_config.path().display(),
        format_bytes(upload_config.file_len()),
        upload_config.total_chunks(),
        format_bytes(upload_config.chunk_size())
    );
    println!("  Type p, r or a then Enter to pause, resume or abort. Ctrl-C aborts.");
    println!();

    let (session, events) = UploadSession::spawn(upload_config, transport, network);
    let session = Arc::new(session);
    debug!(session = %session.id(), "session spawned");

    let bar = ProgressBar::new(100);
    bar.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos:>3}% {msg}")?
            .progress_chars("=> "),
    );
    bar.enable_steady_tick(Duration::from_millis(120));

    spawn_controls(Arc::clone(&session));
    session.start()?;

    let mut reporter = TerminalReporter::new(bar.clone());
    {
        let forward = forward_events(events, &mut reporter);
        tokio::pin!(forward);
        loop {
            tokio::select! {
                _ = &mut forward => break,
                _ = tokio::signal::ctrl_c() => {
                    bar.println("  Aborting...");
                    session.abort();
                }
            }
        }
    }

    if let Some((handle, _)) = probe {
        handle.abort();
    }

    match reporter.outcome {
        Some(Outcome::Completed { elapsed_ms }) => {
            println!();
            println!(
                "  {} Upload complete in {:.1}s",
                style("✅").green(),
                elapsed_ms as f64 / 1000.0
            );
            Ok(())
        }
        Some(Outcome::Aborted) => Err(anyhow::anyhow!("Upload aborted")),
        Some(Outcome::Failed { message }) => Err(anyhow::anyhow!(message)),
        None => Err(anyhow::anyhow!("Upload session ended without a result")),
    }
}

/// Read pause/resume/abort commands from stdin on a plain thread, so a
/// pending read never holds up runtime shutdown.
fn spawn_controls(session: Arc<UploadSession>) {
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else {
                break;
            };
            match line.trim() {
                "p" | "pause" => session.pause(),
                "r" | "resume" => session.resume(),
                "a" | "abort" => session.abort(),
                "" => {}
                other => warn!(command = other, "unknown command, use p, r or a"),
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use pushpilot_core::{dispatch, UploadEvent};

    #[test]
    fn test_reporter_records_outcome() {
        let mut reporter = TerminalReporter::new(ProgressBar::hidden());
        dispatch(&UploadEvent::Init, &mut reporter);
        dispatch(&UploadEvent::Progress { percent: 42.7 }, &mut reporter);
        assert_eq!(reporter.bar.position(), 42);
        assert!(reporter.outcome.is_none());

        dispatch(
            &UploadEvent::Success {
                elapsed: Duration::from_millis(1500),
            },
            &mut reporter,
        );
        assert_eq!(
            reporter.outcome,
            Some(Outcome::Completed { elapsed_ms: 1500 })
        );
    }

    #[test]
    fn test_reporter_records_failure() {
        let mut reporter = TerminalReporter::new(ProgressBar::hidden());
        dispatch(
            &UploadEvent::Error {
                message: "Chunk Uploading Failed:\nboom".to_string(),
                elapsed: Duration::ZERO,
            },
            &mut reporter,
        );
        assert!(matches!(
            reporter.outcome,
            Some(Outcome::Failed { ref message }) if message.ends_with("boom")
        ));
    }
}
