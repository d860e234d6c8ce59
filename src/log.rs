use crate::logger::SharedLogger;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncSeekExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::watch;
use tokio::task::JoinHandle;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// How often the access log file is checked for new content.
pub const TAIL_POLL_INTERVAL: Duration = Duration::from_millis(10);

const COPY_CHUNK: usize = 8192;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogKind {
    Access,
    Error,
}

impl fmt::Display for LogKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogKind::Access => f.write_str("access_log"),
            LogKind::Error => f.write_str("error_log"),
        }
    }
}

/// In-memory log collector. Reading drains it.
#[derive(Debug, Clone, Default)]
pub struct LogBuffer {
    inner: Arc<Mutex<Vec<u8>>>,
}

impl LogBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&self, bytes: &[u8]) {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend_from_slice(bytes);
    }

    /// Returns everything appended since the previous call.
    pub fn take(&self) -> Vec<u8> {
        std::mem::take(&mut *self.inner.lock().unwrap_or_else(PoisonError::into_inner))
    }

    pub fn take_string(&self) -> String {
        String::from_utf8_lossy(&self.take()).into_owned()
    }

    /// Current contents, without draining.
    pub fn peek_string(&self) -> String {
        String::from_utf8_lossy(&self.inner.lock().unwrap_or_else(PoisonError::into_inner))
            .into_owned()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub type SharedWriter = Arc<tokio::sync::Mutex<Box<dyn AsyncWrite + Send + Unpin>>>;

/// Where log bytes are published.
#[derive(Clone)]
pub enum LogSink {
    Buffer(LogBuffer),
    Writer(SharedWriter),
}

impl LogSink {
    pub fn writer(w: impl AsyncWrite + Send + Unpin + 'static) -> Self {
        LogSink::Writer(Arc::new(tokio::sync::Mutex::new(Box::new(w))))
    }

    pub async fn publish(&self, bytes: &[u8]) -> io::Result<()> {
        match self {
            LogSink::Buffer(buf) => {
                buf.append(bytes);
                Ok(())
            }
            LogSink::Writer(w) => {
                let mut w = w.lock().await;
                w.write_all(bytes).await?;
                w.flush().await
            }
        }
    }
}

impl fmt::Debug for LogSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogSink::Buffer(buf) => f.debug_tuple("Buffer").field(&buf.len()).finish(),
            LogSink::Writer(_) => f.write_str("Writer"),
        }
    }
}

/// What to do with nginx's error log, which is expected on its stderr.
#[derive(Clone, Default)]
pub enum ErrorLog {
    /// Collect into a buffer readable with `read_error_log()`.
    #[default]
    Buffer,
    Ignore,
    /// Pass through to this process's stderr.
    Inherit,
    Writer(SharedWriter),
}

impl ErrorLog {
    pub fn writer(w: impl AsyncWrite + Send + Unpin + 'static) -> Self {
        ErrorLog::Writer(Arc::new(tokio::sync::Mutex::new(Box::new(w))))
    }
}

/// What to do with nginx's access log, expected in `<work_dir>/access.log`.
#[derive(Clone, Default)]
pub enum AccessLog {
    /// Collect into a buffer readable with `read_access_log()`.
    #[default]
    Buffer,
    Ignore,
    Writer(SharedWriter),
}

impl AccessLog {
    pub fn writer(w: impl AsyncWrite + Send + Unpin + 'static) -> Self {
        AccessLog::Writer(Arc::new(tokio::sync::Mutex::new(Box::new(w))))
    }
}

// ---------------------------------------------------------------------------
// LogTailer
// ---------------------------------------------------------------------------

struct TailState {
    path: PathBuf,
    offset: u64,
    sink: LogSink,
}

impl TailState {
    async fn poll(&mut self) -> io::Result<usize> {
        let mut file = match tokio::fs::File::open(&self.path).await {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e),
        };

        let len = file.metadata().await?.len();
        if len < self.offset {
            // Truncated or replaced by a new file.
            self.offset = 0;
        }
        if len == self.offset {
            return Ok(0);
        }

        file.seek(io::SeekFrom::Start(self.offset)).await?;
        let mut buf = Vec::with_capacity((len - self.offset) as usize);
        file.take(len - self.offset).read_to_end(&mut buf).await?;

        self.offset += buf.len() as u64;
        self.sink.publish(&buf).await?;
        Ok(buf.len())
    }
}

/// Follows a file from its beginning (it doesn't need to exist yet) and
/// publishes appended bytes to a sink.
pub struct LogTailer {
    path: PathBuf,
    state: Arc<tokio::sync::Mutex<TailState>>,
    shutdown: watch::Sender<bool>,
    task: Option<JoinHandle<()>>,
}

impl LogTailer {
    pub fn start(path: PathBuf, sink: LogSink, interval: Duration, logger: SharedLogger) -> Self {
        let state = Arc::new(tokio::sync::Mutex::new(TailState {
            path: path.clone(),
            offset: 0,
            sink,
        }));
        let (shutdown, mut shutdown_rx) = watch::channel(false);

        logger.debug(&format!("begins polling of {}", path.display()));

        let task_state = Arc::clone(&state);
        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = tokio::time::sleep(interval) => {}
                    _ = shutdown_rx.changed() => return,
                }
                let result = task_state.lock().await.poll().await;
                if let Err(e) = result {
                    let path = task_state.lock().await.path.clone();
                    logger.warn(&format!("failed to read {}: {e}", path.display()));
                }
            }
        });

        Self {
            path,
            state,
            shutdown,
            task: Some(task),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads whatever was appended since the last poll right now.
    pub async fn poll(&self) -> io::Result<usize> {
        self.state.lock().await.poll().await
    }

    /// Stops polling, publishes the remaining bytes and deletes the file, so
    /// the next run doesn't pick up stale content.
    pub async fn stop(&mut self) -> io::Result<()> {
        let Some(task) = self.task.take() else {
            return Ok(());
        };
        let _ = self.shutdown.send(true);
        let _ = task.await;

        let flushed = self.poll().await;
        let removed = match tokio::fs::remove_file(&self.path).await {
            Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
            _ => Ok(()),
        };
        flushed.and(removed)
    }

    pub fn is_running(&self) -> bool {
        self.task.is_some()
    }
}

impl Drop for LogTailer {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

// ---------------------------------------------------------------------------
// Log copier
// ---------------------------------------------------------------------------

pub fn spawn_log_copier(
    kind: LogKind,
    reader: impl AsyncRead + Unpin + Send + 'static,
    sink: LogSink,
    logger: SharedLogger,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        if let Err(e) = run_log_copier(reader, sink).await {
            logger.warn(&format!("{kind} copier error: {e}"));
        }
    })
}

async fn run_log_copier(
    mut reader: impl AsyncRead + Unpin + Send + 'static,
    sink: LogSink,
) -> io::Result<()> {
    let mut buf = vec![0u8; COPY_CHUNK];
    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            break; // EOF
        }
        sink.publish(&buf[..n]).await?;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logger;
    use std::io::Write;

    fn append(path: &Path, text: &str) {
        let mut f = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .unwrap();
        f.write_all(text.as_bytes()).unwrap();
    }

    fn tailer(path: &Path, buf: &LogBuffer) -> LogTailer {
        LogTailer::start(
            path.to_path_buf(),
            LogSink::Buffer(buf.clone()),
            // Long interval so that only explicit polls read.
            Duration::from_secs(3600),
            logger::noop(),
        )
    }

    #[test]
    fn test_buffer_take_drains() {
        let buf = LogBuffer::new();
        buf.append(b"hello ");
        buf.append(b"world");
        assert_eq!(buf.peek_string(), "hello world");
        assert_eq!(buf.take_string(), "hello world");
        assert_eq!(buf.take_string(), "");
        buf.append(b"again");
        assert_eq!(buf.take_string(), "again");
    }

    #[test]
    fn test_log_kind_display() {
        assert_eq!(LogKind::Access.to_string(), "access_log");
        assert_eq!(LogKind::Error.to_string(), "error_log");
    }

    #[tokio::test]
    async fn test_tail_file_created_later() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("access.log");
        let buf = LogBuffer::new();
        let mut tail = tailer(&path, &buf);

        assert_eq!(tail.poll().await.unwrap(), 0);

        append(&path, "GET /a\n");
        assert_eq!(tail.poll().await.unwrap(), 7);
        assert_eq!(buf.take_string(), "GET /a\n");

        append(&path, "GET /b\n");
        append(&path, "GET /c\n");
        tail.poll().await.unwrap();
        assert_eq!(buf.take_string(), "GET /b\nGET /c\n");

        tail.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_tail_reads_existing_content_from_start() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("access.log");
        append(&path, "old\n");
        let buf = LogBuffer::new();
        let mut tail = tailer(&path, &buf);

        tail.poll().await.unwrap();
        assert_eq!(buf.take_string(), "old\n");
        tail.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_tail_restarts_after_truncation() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("access.log");
        let buf = LogBuffer::new();
        let mut tail = tailer(&path, &buf);

        append(&path, "first line\n");
        tail.poll().await.unwrap();
        buf.take();

        std::fs::write(&path, "new\n").unwrap();
        tail.poll().await.unwrap();
        assert_eq!(buf.take_string(), "new\n");
        tail.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_tail_background_polling() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("access.log");
        let buf = LogBuffer::new();
        let mut tail = LogTailer::start(
            path.clone(),
            LogSink::Buffer(buf.clone()),
            TAIL_POLL_INTERVAL,
            logger::noop(),
        );

        append(&path, "background\n");
        let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
        while buf.is_empty() && tokio::time::Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(buf.take_string(), "background\n");
        tail.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_stop_flushes_and_deletes_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("access.log");
        let buf = LogBuffer::new();
        let mut tail = tailer(&path, &buf);

        append(&path, "last words\n");
        tail.stop().await.unwrap();

        assert_eq!(buf.take_string(), "last words\n");
        assert!(!path.exists());
        assert!(!tail.is_running());
        // Second stop is a no-op.
        tail.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_stop_without_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut tail = tailer(&dir.path().join("never.log"), &LogBuffer::new());
        tail.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_writer_sink() {
        let (writer, mut reader) = tokio::io::duplex(1024);
        let sink = LogSink::writer(writer);
        sink.publish(b"to the writer").await.unwrap();

        let mut out = vec![0u8; 13];
        reader.read_exact(&mut out).await.unwrap();
        assert_eq!(out, b"to the writer");
    }

    #[tokio::test]
    async fn test_copier_forwards_until_eof() {
        let buf = LogBuffer::new();
        let input = b"2024/01/01 [notice] using the \"epoll\" event method\n".to_vec();
        let reader = tokio::io::BufReader::new(std::io::Cursor::new(input.clone()));

        spawn_log_copier(LogKind::Error, reader, LogSink::Buffer(buf.clone()), logger::noop())
            .await
            .unwrap();

        assert_eq!(buf.take(), input);
    }
}
