//! pushpilot-core - Core library for the pushpilot uploader
//!
//! This library provides a resumable, chunked upload client for pre-signed
//! URLs: range planning, streaming chunk bodies, retry with backoff,
//! connectivity handling and the upload session state machine, plus the
//! control-plane client and configuration management used by the CLI.

pub mod config;
pub mod connectivity;
pub mod constants;
pub mod control_plane;
pub mod error;
pub mod event;
pub mod options;
pub mod protocol;
pub mod reader;
pub mod retry;
pub mod session;
pub mod transport;

// Re-export commonly used types
pub use config::{
    config_exists, get_config_path, load_config, parse_config, save_config, validate_config,
};
pub use config::{Config, ConfigFile, ControlPlaneConfig, LoggingConfig, UploadDefaults};
pub use connectivity::{
    Connectivity, ConnectivityMonitor, NetworkMonitor, NoopMonitor, ReachabilityProbe,
};
pub use control_plane::{ControlPlaneClient, CreateUploadRequest, SignedUpload};
pub use error::{ConfigError, Error, Result};
pub use event::{dispatch, forward_events, UploadCallbacks, UploadEvent, UploadEvents};
pub use options::{UploadConfig, UploadOptions};
pub use protocol::{check_response, plan_ranges, ByteRange};
pub use reader::{ChunkReader, ProgressSink};
pub use retry::{backoff_delay, RetryScheduler};
pub use session::{UploadSession, UploadSnapshot, UploadStatus};
pub use transport::{ChunkRequest, ChunkResponse, ChunkTransport, HttpSettings, HttpTransport};
