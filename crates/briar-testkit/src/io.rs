//! Streams that fail on purpose.
//!
//! Closing the stream is the only way to cancel a session, so a forced
//! failure mid-read or mid-write is how tests exercise the disposal path.

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

/// What a [`FaultyReader`] does once its data runs out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AfterData {
    /// Report a clean end of stream.
    Eof,
    /// Fail with `ConnectionReset`.
    Fail,
    /// Never produce anything again.
    Hang,
}

/// Yields `data`, then behaves as `after` says.
#[derive(Debug)]
pub struct FaultyReader {
    data: Vec<u8>,
    position: usize,
    after: AfterData,
}

impl FaultyReader {
    pub fn new(data: Vec<u8>, after: AfterData) -> Self {
        Self {
            data,
            position: 0,
            after,
        }
    }

    /// Yields the first `cut` bytes of `data`, then fails.
    pub fn truncated(mut data: Vec<u8>, cut: usize) -> Self {
        data.truncate(cut);
        Self::new(data, AfterData::Fail)
    }
}

impl AsyncRead for FaultyReader {
    fn poll_read(
        mut self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        if self.position < self.data.len() {
            let n = buf.remaining().min(self.data.len() - self.position);
            let start = self.position;
            buf.put_slice(&self.data[start..start + n]);
            self.position += n;
            return Poll::Ready(Ok(()));
        }
        match self.after {
            AfterData::Eof => Poll::Ready(Ok(())),
            AfterData::Fail => Poll::Ready(Err(io::Error::new(
                io::ErrorKind::ConnectionReset,
                "injected read fault",
            ))),
            AfterData::Hang => Poll::Pending,
        }
    }
}

/// Accepts `limit` bytes, then fails every write with `BrokenPipe`.
#[derive(Debug)]
pub struct FailingWriter {
    written: Vec<u8>,
    limit: usize,
    shut_down: bool,
}

impl FailingWriter {
    pub fn new(limit: usize) -> Self {
        Self {
            written: Vec::new(),
            limit,
            shut_down: false,
        }
    }

    pub fn written(&self) -> &[u8] {
        &self.written
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down
    }
}

impl AsyncWrite for FailingWriter {
    fn poll_write(
        mut self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let room = self.limit.saturating_sub(self.written.len());
        if room == 0 || self.shut_down {
            return Poll::Ready(Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "injected write fault",
            )));
        }
        let n = room.min(buf.len());
        self.written.extend_from_slice(&buf[..n]);
        Poll::Ready(Ok(n))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.shut_down = true;
        Poll::Ready(Ok(()))
    }
}

/// A bidirectional stream built from a faulty reader and a failing writer.
#[derive(Debug)]
pub struct FaultyStream {
    pub reader: FaultyReader,
    pub writer: FailingWriter,
}

impl FaultyStream {
    pub fn new(reader: FaultyReader, writer: FailingWriter) -> Self {
        Self { reader, writer }
    }
}

impl AsyncRead for FaultyStream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.reader).poll_read(cx, buf)
    }
}

impl AsyncWrite for FaultyStream {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.writer).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.writer).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.writer).poll_shutdown(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    #[tokio::test]
    async fn test_truncated_reader_fails_after_cut() {
        let mut reader = FaultyReader::truncated(vec![1, 2, 3, 4], 2);
        let mut buf = [0u8; 2];
        reader.read_exact(&mut buf).await.unwrap();
        assert_eq!(buf, [1, 2]);
        let err = reader.read(&mut buf).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::ConnectionReset);
    }

    #[tokio::test]
    async fn test_writer_fails_past_limit() {
        let mut writer = FailingWriter::new(3);
        let err = writer.write_all(b"hello").await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
        assert_eq!(writer.written(), b"hel");
        writer.shutdown().await.unwrap();
        assert!(writer.is_shut_down());
    }
}
