//! Lazy, bounded reads of one byte range of a file

use crate::constants::DEFAULT_BUFFER_SIZE;
use crate::error::Result;
use crate::protocol::ByteRange;
use bytes::Bytes;
use futures::stream::{self, Stream};
use std::io::{self, SeekFrom};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};

/// Receives `(bytes_read_so_far, bytes_in_range)` after every read
pub type ProgressSink = Arc<dyn Fn(u64, u64) + Send + Sync>;

/// Reads exactly one [`ByteRange`] of a file as a stream of buffers
#[derive(Debug, Clone)]
pub struct ChunkReader {
    path: PathBuf,
    range: ByteRange,
    buffer_size: usize,
}

impl ChunkReader {
    /// Create a reader for `[start, end)` of a file of `file_len` bytes.
    ///
    /// Nothing is opened until the stream is first polled.
    pub fn new(path: impl Into<PathBuf>, start: u64, end: u64, file_len: u64) -> Result<Self> {
        let range = ByteRange::checked(start, end, file_len)?;
        Ok(Self {
            path: path.into(),
            range,
            buffer_size: DEFAULT_BUFFER_SIZE,
        })
    }

    pub fn with_buffer_size(mut self, buffer_size: usize) -> Self {
        self.buffer_size = buffer_size.max(1);
        self
    }

    pub fn range(&self) -> ByteRange {
        self.range
    }

    pub fn len(&self) -> u64 {
        self.range.len()
    }

    pub fn is_empty(&self) -> bool {
        self.range.is_empty()
    }

    /// Consume the reader into a finite stream covering the range.
    pub fn into_stream(
        self,
        progress: ProgressSink,
    ) -> impl Stream<Item = io::Result<Bytes>> + Send + 'static {
        let state = ReadState {
            file: None,
            reader: self,
            written: 0,
            progress,
        };

        stream::try_unfold(state, read_next)
    }
}

struct ReadState {
    file: Option<File>,
    reader: ChunkReader,
    written: u64,
    progress: ProgressSink,
}

async fn read_next(mut state: ReadState) -> io::Result<Option<(Bytes, ReadState)>> {
    let range = state.reader.range;
    let total = range.len();
    if state.written >= total {
        return Ok(None);
    }

    let mut file = match state.file.take() {
        Some(file) => file,
        None => {
            let mut file = File::open(&state.reader.path).await?;
            file.seek(SeekFrom::Start(range.start)).await?;
            file
        }
    };

    let want = (state.reader.buffer_size as u64).min(total - state.written) as usize;
    let mut buf = vec![0u8; want];
    let read = file.read(&mut buf).await?;
    if read == 0 {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            format!(
                "file ended {} bytes into range {}..{}",
                state.written, range.start, range.end
            ),
        ));
    }
    buf.truncate(read);

    state.written += read as u64;
    state.file = Some(file);
    (state.progress)(state.written, total);

    Ok(Some((Bytes::from(buf), state)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use futures::TryStreamExt;
    use std::io::Write;
    use std::sync::Mutex;
    use tempfile::NamedTempFile;

    fn numbered_file(len: usize) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        let data: Vec<u8> = (0..len).map(|i| (i % 251) as u8).collect();
        file.write_all(&data).unwrap();
        file.flush().unwrap();
        file
    }

    fn recorder() -> (ProgressSink, Arc<Mutex<Vec<(u64, u64)>>>) {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let sink_calls = calls.clone();
        let sink: ProgressSink = Arc::new(move |written, total| {
            sink_calls.lock().unwrap().push((written, total));
        });
        (sink, calls)
    }

    #[tokio::test]
    async fn test_reads_exactly_the_range() {
        let file = numbered_file(10_000);
        let reader = ChunkReader::new(file.path(), 1_000, 4_500, 10_000)
            .unwrap()
            .with_buffer_size(1024);
        let (sink, calls) = recorder();

        let chunks: Vec<Bytes> = reader.into_stream(sink).try_collect().await.unwrap();
        let body: Vec<u8> = chunks.iter().flat_map(|c| c.iter().copied()).collect();

        let expected: Vec<u8> = (1_000..4_500).map(|i| (i % 251) as u8).collect();
        assert_eq!(body, expected);
        assert!(chunks.iter().all(|c| c.len() <= 1024));

        let calls = calls.lock().unwrap();
        assert_eq!(calls.last(), Some(&(3_500, 3_500)));
        assert!(calls.windows(2).all(|w| w[0].0 < w[1].0));
    }

    #[tokio::test]
    async fn test_last_range_stops_at_end_of_file() {
        let file = numbered_file(100);
        let reader = ChunkReader::new(file.path(), 64, 100, 100).unwrap();
        let (sink, _) = recorder();

        let chunks: Vec<Bytes> = reader.into_stream(sink).try_collect().await.unwrap();
        let total: usize = chunks.iter().map(Bytes::len).sum();
        assert_eq!(total, 36);
    }

    #[test]
    fn test_range_errors() {
        assert!(matches!(
            ChunkReader::new("/dev/null", 100, 120, 100),
            Err(Error::InvalidRange { .. })
        ));
        assert!(matches!(
            ChunkReader::new("/dev/null", 10, 10, 100),
            Err(Error::InvalidRange { .. })
        ));
    }

    #[tokio::test]
    async fn test_truncated_file_fails_the_stream() {
        let file = numbered_file(50);
        // Claims the file is longer than it is.
        let reader = ChunkReader::new(file.path(), 0, 80, 80).unwrap();
        let (sink, _) = recorder();

        let result: io::Result<Vec<Bytes>> = reader.into_stream(sink).try_collect().await;
        assert_eq!(result.unwrap_err().kind(), io::ErrorKind::UnexpectedEof);
    }
}
