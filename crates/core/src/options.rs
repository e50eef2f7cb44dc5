//! Upload options and their validation into an immutable [`UploadConfig`]

use crate::constants::*;
use crate::error::ConfigError;
use std::fs::File;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Options for a single upload, as supplied by the host
#[derive(Debug, Clone)]
pub struct UploadOptions {
    pub file: Option<PathBuf>,
    pub signed_url: Option<String>,
    pub chunk_size: u64,
    pub max_retries: u32,
    pub retry_delay: Duration,
    pub max_retry_delay: Duration,
}

impl Default for UploadOptions {
    fn default() -> Self {
        Self {
            file: None,
            signed_url: None,
            chunk_size: DEFAULT_CHUNK_SIZE,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_delay: Duration::from_millis(DEFAULT_RETRY_DELAY_MS),
            max_retry_delay: Duration::from_millis(DEFAULT_MAX_RETRY_DELAY_MS),
        }
    }
}

impl UploadOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn file(mut self, path: impl Into<PathBuf>) -> Self {
        self.file = Some(path.into());
        self
    }

    pub fn signed_url(mut self, url: impl Into<String>) -> Self {
        self.signed_url = Some(url.into());
        self
    }

    /// Chunk size in bytes
    pub fn chunk_size(mut self, bytes: u64) -> Self {
        self.chunk_size = bytes;
        self
    }

    pub fn max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    pub fn retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    pub fn max_retry_delay(mut self, delay: Duration) -> Self {
        self.max_retry_delay = delay;
        self
    }

    /// Check every option and probe the file, producing a configuration a
    /// session can run with.
    pub fn validate(&self) -> Result<UploadConfig, ConfigError> {
        if !(MIN_CHUNK_SIZE..=MAX_CHUNK_SIZE).contains(&self.chunk_size) {
            return Err(ConfigError::ChunkSize(self.chunk_size));
        }

        let path = self.file.as_deref().ok_or(ConfigError::MissingFile)?;
        let file_len = probe_file(path)?;

        let url = match self.signed_url.as_deref().map(str::trim) {
            Some(url) if !url.is_empty() => url.to_string(),
            _ => return Err(ConfigError::MissingUrl),
        };

        if self.max_retry_delay < self.retry_delay {
            return Err(ConfigError::RetryDelay);
        }

        Ok(UploadConfig {
            path: path.to_path_buf(),
            file_len,
            url,
            chunk_size: self.chunk_size,
            max_retries: self.max_retries,
            retry_delay: self.retry_delay,
            max_retry_delay: self.max_retry_delay,
        })
    }
}

/// Open the file once to prove it is a readable, non-empty regular file.
fn probe_file(path: &Path) -> Result<u64, ConfigError> {
    let file = File::open(path).map_err(|e| match e.kind() {
        ErrorKind::NotFound => ConfigError::FileNotFound(path.to_path_buf()),
        _ => ConfigError::FileNotReadable(path.to_path_buf()),
    })?;
    let metadata = file
        .metadata()
        .map_err(|_| ConfigError::FileNotReadable(path.to_path_buf()))?;

    if !metadata.is_file() {
        return Err(ConfigError::FileNotReadable(path.to_path_buf()));
    }
    if metadata.len() == 0 {
        return Err(ConfigError::FileEmpty(path.to_path_buf()));
    }

    Ok(metadata.len())
}

/// Validated, immutable upload configuration
#[derive(Debug, Clone)]
pub struct UploadConfig {
    path: PathBuf,
    file_len: u64,
    url: String,
    chunk_size: u64,
    max_retries: u32,
    retry_delay: Duration,
    max_retry_delay: Duration,
}

impl UploadConfig {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn file_len(&self) -> u64 {
        self.file_len
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn chunk_size(&self) -> u64 {
        self.chunk_size
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    pub fn retry_delay(&self) -> Duration {
        self.retry_delay
    }

    pub fn max_retry_delay(&self) -> Duration {
        self.max_retry_delay
    }

    /// Number of ranges needed to cover the file
    pub fn total_chunks(&self) -> u64 {
        self.file_len.div_ceil(self.chunk_size)
    }
}
