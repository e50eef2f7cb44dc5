//! Network reachability notifications

use crate::error::{Error, Result};
use reqwest::Url;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Reachability state reported by a monitor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Connectivity {
    Available,
    Lost,
}

impl Connectivity {
    pub fn is_online(self) -> bool {
        self == Connectivity::Available
    }
}

/// Something an upload session can subscribe to for reachability changes.
pub trait NetworkMonitor: Send + Sync {
    /// Register the listener. Only one listener is active per monitor: a new
    /// subscription closes the previous one. The current state, when known,
    /// is delivered first.
    fn subscribe(&self) -> UnboundedReceiver<Connectivity>;
}

/// Edge-triggered connectivity fan-in with a single listener.
///
/// Platform glue (or [`ReachabilityProbe`]) feeds it with [`set`](Self::set);
/// sessions consume it through [`NetworkMonitor`].
#[derive(Clone, Default)]
pub struct ConnectivityMonitor {
    inner: Arc<Mutex<MonitorState>>,
}

#[derive(Default)]
struct MonitorState {
    current: Option<Connectivity>,
    listener: Option<UnboundedSender<Connectivity>>,
}

impl ConnectivityMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Process-wide monitor, created on first use
    pub fn global() -> &'static ConnectivityMonitor {
        static GLOBAL: OnceLock<ConnectivityMonitor> = OnceLock::new();
        GLOBAL.get_or_init(ConnectivityMonitor::new)
    }

    fn state(&self) -> MutexGuard<'_, MonitorState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record a reachability observation. Returns `true` when it was a
    /// transition and a listener received it.
    pub fn set(&self, connectivity: Connectivity) -> bool {
        let mut state = self.state();
        if state.current == Some(connectivity) {
            return false;
        }
        state.current = Some(connectivity);
        debug!(?connectivity, "connectivity changed");

        let delivered = state
            .listener
            .as_ref()
            .map(|listener| listener.send(connectivity).is_ok())
            .unwrap_or(false);
        if !delivered {
            state.listener = None;
        }
        delivered
    }

    pub fn current(&self) -> Option<Connectivity> {
        self.state().current
    }

    pub fn has_listener(&self) -> bool {
        self.state()
            .listener
            .as_ref()
            .map(|listener| !listener.is_closed())
            .unwrap_or(false)
    }
}

impl NetworkMonitor for ConnectivityMonitor {
    fn subscribe(&self) -> UnboundedReceiver<Connectivity> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut state = self.state();
        if let Some(current) = state.current {
            let _ = tx.send(current);
        }
        if state.listener.replace(tx).is_some() {
            debug!("replaced previous connectivity listener");
        }
        rx
    }
}

/// Monitor that never reports anything, for hosts without reachability data
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopMonitor;

impl NetworkMonitor for NoopMonitor {
    fn subscribe(&self) -> UnboundedReceiver<Connectivity> {
        let (_tx, rx) = mpsc::unbounded_channel();
        rx
    }
}

/// Periodic TCP connect probe against the upload host
#[derive(Debug, Clone)]
pub struct ReachabilityProbe {
    target: String,
    interval: Duration,
    timeout: Duration,
}

impl ReachabilityProbe {
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            interval: Duration::from_secs(5),
            timeout: Duration::from_secs(3),
        }
    }

    /// Probe the host and port a signed URL points at.
    pub fn for_url(url: &str) -> Result<Self> {
        let parsed = Url::parse(url).map_err(|e| Error::InvalidInput(format!("Invalid URL: {}", e)))?;
        let host = parsed
            .host_str()
            .ok_or_else(|| Error::InvalidInput("URL has no host".to_string()))?;
        let port = parsed
            .port_or_known_default()
            .ok_or_else(|| Error::InvalidInput("URL has no port".to_string()))?;
        Ok(Self::new(format!("{}:{}", host, port)))
    }

    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub async fn probe_once(&self) -> Connectivity {
        match tokio::time::timeout(self.timeout, TcpStream::connect(&self.target)).await {
            Ok(Ok(_)) => Connectivity::Available,
            _ => Connectivity::Lost,
        }
    }

    /// Probe forever, publishing transitions into `monitor`.
    pub fn spawn(self, monitor: ConnectivityMonitor) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!(host = %self.target, "starting reachability probe");
            loop {
                let connectivity = self.probe_once().await;
                monitor.set(connectivity);
                tokio::time::sleep(self.interval).await;
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_subscribe_delivers_current_state() {
        let monitor = ConnectivityMonitor::new();
        monitor.set(Connectivity::Available);

        let mut rx = monitor.subscribe();
        assert_eq!(rx.recv().await, Some(Connectivity::Available));
    }

    #[tokio::test]
    async fn test_notifications_are_edge_triggered() {
        let monitor = ConnectivityMonitor::new();
        let mut rx = monitor.subscribe();

        assert!(monitor.set(Connectivity::Lost));
        assert!(!monitor.set(Connectivity::Lost));
        assert!(monitor.set(Connectivity::Available));

        assert_eq!(rx.recv().await, Some(Connectivity::Lost));
        assert_eq!(rx.recv().await, Some(Connectivity::Available));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_new_subscription_replaces_previous() {
        let monitor = ConnectivityMonitor::new();
        let mut first = monitor.subscribe();
        let mut second = monitor.subscribe();

        monitor.set(Connectivity::Lost);

        assert_eq!(first.recv().await, None);
        assert_eq!(second.recv().await, Some(Connectivity::Lost));
    }

    #[tokio::test]
    async fn test_dropped_listener_is_released() {
        let monitor = ConnectivityMonitor::new();
        let rx = monitor.subscribe();
        assert!(monitor.has_listener());

        drop(rx);
        assert!(!monitor.has_listener());
        assert!(!monitor.set(Connectivity::Lost));
        assert_eq!(monitor.current(), Some(Connectivity::Lost));
    }

    #[test]
    fn test_global_is_shared() {
        let a = ConnectivityMonitor::global();
        let b = ConnectivityMonitor::global();
        assert!(Arc::ptr_eq(&a.inner, &b.inner));
    }

    #[test]
    fn test_probe_target_from_url() {
        let probe = ReachabilityProbe::for_url("https://uploads.example.com/v1/put?sig=1").unwrap();
        assert_eq!(probe.target(), "uploads.example.com:443");

        let probe = ReachabilityProbe::for_url("http://127.0.0.1:8080/x").unwrap();
        assert_eq!(probe.target(), "127.0.0.1:8080");

        assert!(ReachabilityProbe::for_url("not a url").is_err());
    }

    #[tokio::test]
    async fn test_probe_detects_listener() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let probe = ReachabilityProbe::new(addr.to_string());
        assert_eq!(probe.probe_once().await, Connectivity::Available);

        drop(listener);
        assert_eq!(probe.probe_once().await, Connectivity::Lost);
    }
}
