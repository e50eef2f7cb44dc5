//! Limits and defaults shared by the upload pipeline

pub const MIN_CHUNK_SIZE: u64 = 5 * 1024 * 1024; // 5 MiB
pub const MAX_CHUNK_SIZE: u64 = 500 * 1024 * 1024; // 500 MiB
pub const DEFAULT_CHUNK_SIZE: u64 = 16 * 1024; // rejected unless overridden
pub const DEFAULT_RETRY_DELAY_MS: u64 = 2_000;
pub const DEFAULT_MAX_RETRY_DELAY_MS: u64 = 10_000;
pub const DEFAULT_MAX_RETRIES: u32 = 5;
pub const DEFAULT_BUFFER_SIZE: usize = 8 * 1024; // 8 KiB

pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_READ_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_WRITE_TIMEOUT_SECS: u64 = 120;

pub const OCTET_STREAM: &str = "application/octet-stream";
pub const SOMETHING_WENT_WRONG: &str = "Something went wrong";
