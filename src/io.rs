//! Stdio endpoints: where a command's streams come from and where they go.
//!
//! Builtins write through [`ShellWriter`] and read through [`ShellReader`];
//! external processes are wired to the same endpoints by copier tasks. Both
//! types are cheap to clone so a context can be handed to sequential
//! commands, subshells, and pipeline stages.

use std::io;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::pipe::{PipeReader, PipeWriter};

pub(crate) type BoxFuture<'a, T> =
    Pin<Box<dyn std::future::Future<Output = T> + Send + 'a>>;

/// How a builder attaches stdout or stderr.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StdioMode {
    /// Stream to the parent process descriptor.
    #[default]
    Inherit,
    /// Discard.
    Null,
    /// Capture into the result.
    Piped,
    /// Stream to the parent *and* capture.
    InheritPiped,
}

/// Shared capture target for `Piped` output.
#[derive(Clone, Default)]
pub struct CaptureBuffer {
    data: Arc<Mutex<Vec<u8>>>,
}

impl CaptureBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&self, bytes: &[u8]) {
        self.data
            .lock()
            .expect("capture lock poisoned")
            .extend_from_slice(bytes);
    }

    /// Take the captured bytes, leaving the buffer empty.
    pub fn take(&self) -> Vec<u8> {
        std::mem::take(&mut *self.data.lock().expect("capture lock poisoned"))
    }
}

impl std::fmt::Debug for CaptureBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let len = self.data.lock().map(|data| data.len()).unwrap_or(0);
        f.debug_struct("CaptureBuffer").field("len", &len).finish()
    }
}

/// A byte sink for a command's stdout or stderr.
#[derive(Clone)]
pub enum ShellWriter {
    /// The parent process stdout.
    Stdout,
    /// The parent process stderr.
    Stderr,
    Null,
    Capture(CaptureBuffer),
    Pipe(PipeWriter),
    File(Arc<tokio::sync::Mutex<tokio::fs::File>>),
    /// Any caller-supplied sink.
    Writer(Arc<tokio::sync::Mutex<Box<dyn AsyncWrite + Send + Unpin>>>),
    /// Duplicate into two sinks (`InheritPiped`, combined capture).
    Tee(Box<ShellWriter>, Box<ShellWriter>),
}

impl ShellWriter {
    pub fn from_writer(writer: impl AsyncWrite + Send + Unpin + 'static) -> Self {
        ShellWriter::Writer(Arc::new(tokio::sync::Mutex::new(Box::new(writer))))
    }

    pub(crate) fn from_file(file: tokio::fs::File) -> Self {
        ShellWriter::File(Arc::new(tokio::sync::Mutex::new(file)))
    }

    pub(crate) fn tee(self, other: ShellWriter) -> Self {
        ShellWriter::Tee(Box::new(self), Box::new(other))
    }

    pub fn write_all<'a>(&'a mut self, bytes: &'a [u8]) -> BoxFuture<'a, io::Result<()>> {
        Box::pin(async move {
            match self {
                ShellWriter::Stdout => {
                    let mut out = tokio::io::stdout();
                    out.write_all(bytes).await?;
                    out.flush().await
                }
                ShellWriter::Stderr => {
                    let mut err = tokio::io::stderr();
                    err.write_all(bytes).await?;
                    err.flush().await
                }
                ShellWriter::Null => Ok(()),
                ShellWriter::Capture(buffer) => {
                    buffer.append(bytes);
                    Ok(())
                }
                ShellWriter::Pipe(writer) => writer.write_all(bytes).await,
                ShellWriter::File(file) => {
                    let mut file = file.lock().await;
                    file.write_all(bytes).await?;
                    // tokio files complete writes on the blocking pool;
                    // flush so the bytes are durable before the command's
                    // result is observable.
                    file.flush().await
                }
                ShellWriter::Writer(writer) => {
                    let mut writer = writer.lock().await;
                    writer.write_all(bytes).await?;
                    writer.flush().await
                }
                ShellWriter::Tee(first, second) => {
                    first.write_all(bytes).await?;
                    second.write_all(bytes).await
                }
            }
        })
    }

    pub async fn write_line(&mut self, line: &str) -> io::Result<()> {
        let mut data = Vec::with_capacity(line.len() + 1);
        data.extend_from_slice(line.as_bytes());
        data.push(b'\n');
        self.write_all(&data).await
    }

    /// Copy `reader` to completion into this writer. If the downstream side
    /// goes away (broken pipe) the remaining input is still drained so the
    /// producer never blocks on a full buffer.
    pub(crate) async fn drain_from<R: AsyncRead + Unpin>(
        &mut self,
        mut reader: R,
    ) -> io::Result<u64> {
        let mut buf = [0u8; 8192];
        let mut total = 0u64;
        let mut downstream_gone = false;
        loop {
            let n = reader.read(&mut buf).await?;
            if n == 0 {
                return Ok(total);
            }
            if !downstream_gone {
                match self.write_all(&buf[..n]).await {
                    Ok(()) => total += n as u64,
                    Err(err) if err.kind() == io::ErrorKind::BrokenPipe => downstream_gone = true,
                    Err(err) => return Err(err),
                }
            }
        }
    }
}

impl std::fmt::Debug for ShellWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ShellWriter::Stdout => "Stdout",
            ShellWriter::Stderr => "Stderr",
            ShellWriter::Null => "Null",
            ShellWriter::Capture(_) => "Capture",
            ShellWriter::Pipe(_) => "Pipe",
            ShellWriter::File(_) => "File",
            ShellWriter::Writer(_) => "Writer",
            ShellWriter::Tee(_, _) => "Tee",
        };
        f.write_str(name)
    }
}

type SharedStream = Arc<Mutex<Option<Box<dyn AsyncRead + Send + Unpin>>>>;

/// A byte source for a command's stdin.
#[derive(Clone)]
pub enum ShellReader {
    /// The parent process stdin (meaningful for spawned children; builtins
    /// read it as empty rather than stealing the terminal).
    Inherit,
    Null,
    /// A fixed buffer; every consumer reads it from the start.
    Bytes(Arc<Vec<u8>>),
    /// A caller-supplied stream. Consumed by the first reader; later
    /// consumers see EOF.
    Reader(SharedStream),
    /// The read end of an in-process pipe.
    Pipe(SharedStream),
}

impl ShellReader {
    pub fn from_reader(reader: impl AsyncRead + Send + Unpin + 'static) -> Self {
        ShellReader::Reader(Arc::new(Mutex::new(Some(Box::new(reader)))))
    }

    pub(crate) fn from_pipe(reader: PipeReader) -> Self {
        ShellReader::Pipe(Arc::new(Mutex::new(Some(Box::new(reader)))))
    }

    /// Take the underlying stream, if this endpoint carries one.
    pub(crate) fn take_stream(&self) -> Option<Box<dyn AsyncRead + Send + Unpin>> {
        match self {
            ShellReader::Reader(slot) | ShellReader::Pipe(slot) => {
                slot.lock().expect("stdin lock poisoned").take()
            }
            _ => None,
        }
    }

    /// Read everything this endpoint will yield.
    pub async fn read_to_end(&mut self) -> io::Result<Vec<u8>> {
        match self {
            ShellReader::Inherit | ShellReader::Null => Ok(Vec::new()),
            ShellReader::Bytes(bytes) => Ok((**bytes).clone()),
            ShellReader::Reader(_) | ShellReader::Pipe(_) => match self.take_stream() {
                Some(mut stream) => {
                    let mut out = Vec::new();
                    stream.read_to_end(&mut out).await?;
                    Ok(out)
                }
                None => Ok(Vec::new()),
            },
        }
    }
}

impl From<&str> for ShellReader {
    fn from(text: &str) -> Self {
        ShellReader::Bytes(Arc::new(text.as_bytes().to_vec()))
    }
}

impl From<String> for ShellReader {
    fn from(text: String) -> Self {
        ShellReader::Bytes(Arc::new(text.into_bytes()))
    }
}

impl From<Vec<u8>> for ShellReader {
    fn from(bytes: Vec<u8>) -> Self {
        ShellReader::Bytes(Arc::new(bytes))
    }
}

impl From<&[u8]> for ShellReader {
    fn from(bytes: &[u8]) -> Self {
        ShellReader::Bytes(Arc::new(bytes.to_vec()))
    }
}

impl std::fmt::Debug for ShellReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ShellReader::Inherit => "Inherit",
            ShellReader::Null => "Null",
            ShellReader::Bytes(_) => "Bytes",
            ShellReader::Reader(_) => "Reader",
            ShellReader::Pipe(_) => "Pipe",
        };
        f.write_str(name)
    }
}
