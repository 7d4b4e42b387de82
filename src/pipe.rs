//! Bounded in-process byte pipe connecting pipeline stages.
//!
//! The writer blocks when the ring buffer is full and the reader blocks when
//! it is empty, matching OS pipe semantics with a 64KB buffer. Writers are
//! cheaply cloneable (a stage may hand its stdout to several sequential
//! commands); the reader observes EOF once every writer handle has been
//! dropped, and writers observe a broken pipe once the reader is gone.

use std::collections::VecDeque;
use std::io;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll, Waker};

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

/// Buffer capacity, matching the Linux kernel pipe default.
pub const PIPE_CAPACITY: usize = 64 * 1024;

struct Inner {
    buffer: VecDeque<u8>,
    capacity: usize,
    /// Live writer handles. EOF once this reaches zero.
    writers: usize,
    reader_alive: bool,
    read_waker: Option<Waker>,
    write_wakers: Vec<Waker>,
}

impl Inner {
    fn wake_reader(&mut self) {
        if let Some(waker) = self.read_waker.take() {
            waker.wake();
        }
    }

    fn wake_writers(&mut self) {
        for waker in self.write_wakers.drain(..) {
            waker.wake();
        }
    }
}

/// Writing end of a pipe. Cloneable; dropping the last clone signals EOF.
pub struct PipeWriter {
    shared: Arc<Mutex<Inner>>,
}

/// Reading end of a pipe.
pub struct PipeReader {
    shared: Arc<Mutex<Inner>>,
}

/// Create a connected pipe pair with the default capacity.
pub fn pipe() -> (PipeWriter, PipeReader) {
    pipe_with_capacity(PIPE_CAPACITY)
}

pub fn pipe_with_capacity(capacity: usize) -> (PipeWriter, PipeReader) {
    let shared = Arc::new(Mutex::new(Inner {
        buffer: VecDeque::new(),
        capacity,
        writers: 1,
        reader_alive: true,
        read_waker: None,
        write_wakers: Vec::new(),
    }));
    (
        PipeWriter {
            shared: shared.clone(),
        },
        PipeReader { shared },
    )
}

impl Clone for PipeWriter {
    fn clone(&self) -> Self {
        self.shared.lock().expect("pipe lock poisoned").writers += 1;
        Self {
            shared: self.shared.clone(),
        }
    }
}

impl Drop for PipeWriter {
    fn drop(&mut self) {
        let mut inner = self.shared.lock().expect("pipe lock poisoned");
        inner.writers -= 1;
        if inner.writers == 0 {
            inner.wake_reader();
        }
    }
}

impl Drop for PipeReader {
    fn drop(&mut self) {
        let mut inner = self.shared.lock().expect("pipe lock poisoned");
        inner.reader_alive = false;
        inner.buffer.clear();
        inner.wake_writers();
    }
}

impl AsyncWrite for PipeWriter {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        if buf.is_empty() {
            return Poll::Ready(Ok(0));
        }
        let mut inner = self.shared.lock().expect("pipe lock poisoned");
        if !inner.reader_alive {
            return Poll::Ready(Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "pipe reader closed",
            )));
        }
        let available = inner.capacity.saturating_sub(inner.buffer.len());
        if available == 0 {
            inner.write_wakers.push(cx.waker().clone());
            return Poll::Pending;
        }
        let len = buf.len().min(available);
        inner.buffer.extend(&buf[..len]);
        inner.wake_reader();
        Poll::Ready(Ok(len))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        // EOF is signalled by dropping the last writer handle.
        Poll::Ready(Ok(()))
    }
}

impl AsyncRead for PipeReader {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let mut inner = self.shared.lock().expect("pipe lock poisoned");
        if inner.buffer.is_empty() {
            if inner.writers == 0 {
                return Poll::Ready(Ok(()));
            }
            inner.read_waker = Some(cx.waker().clone());
            return Poll::Pending;
        }
        let len = buf.remaining().min(inner.buffer.len());
        let (front, back) = inner.buffer.as_slices();
        if len <= front.len() {
            buf.put_slice(&front[..len]);
        } else {
            buf.put_slice(front);
            buf.put_slice(&back[..len - front.len()]);
        }
        inner.buffer.drain(..len);
        inner.wake_writers();
        Poll::Ready(Ok(()))
    }
}

impl std::fmt::Debug for PipeWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipeWriter").finish()
    }
}

impl std::fmt::Debug for PipeReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipeReader").finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    #[tokio::test]
    async fn write_then_read() {
        let (mut writer, mut reader) = pipe();
        writer.write_all(b"hello").await.unwrap();
        drop(writer);

        let mut out = Vec::new();
        reader.read_to_end(&mut out).await.unwrap();
        assert_eq!(out, b"hello");
    }

    #[tokio::test]
    async fn eof_waits_for_every_writer_clone() {
        let (mut writer, mut reader) = pipe();
        let mut second = writer.clone();

        writer.write_all(b"one ").await.unwrap();
        drop(writer);
        second.write_all(b"two").await.unwrap();
        drop(second);

        let mut out = Vec::new();
        reader.read_to_end(&mut out).await.unwrap();
        assert_eq!(out, b"one two");
    }

    #[tokio::test]
    async fn backpressure_does_not_lose_bytes() {
        let (mut writer, mut reader) = pipe_with_capacity(16);
        let payload: Vec<u8> = (0..10_000u32).map(|i| (i % 251) as u8).collect();
        let expected = payload.clone();

        let write_task = tokio::spawn(async move {
            writer.write_all(&payload).await.unwrap();
        });

        let mut out = Vec::new();
        reader.read_to_end(&mut out).await.unwrap();
        write_task.await.unwrap();
        assert_eq!(out, expected);
    }

    #[tokio::test]
    async fn dropped_reader_breaks_the_pipe() {
        let (mut writer, reader) = pipe_with_capacity(8);
        drop(reader);
        let err = writer.write_all(b"data").await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
    }

    #[tokio::test]
    async fn empty_pipe_reads_eof() {
        let (writer, mut reader) = pipe();
        drop(writer);
        let mut out = Vec::new();
        reader.read_to_end(&mut out).await.unwrap();
        assert!(out.is_empty());
    }
}
