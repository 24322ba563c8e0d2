use std::io;

use async_trait::async_trait;
use pairmerge_protocol::{LineCodec, MAX_LINE_BYTES};
use tokio::io::{
    AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader,
};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::TcpStream;
use tokio::sync::mpsc::error::TryRecvError;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::{ChannelError, ChannelResult};
use crate::transport::LineTransport;

/// Transport over an async byte stream, one message per `\n`-terminated line.
///
/// A background task reads lines from the stream into a queue, which keeps
/// `try_recv_line` non-blocking and lets a pending `recv_line` be dropped
/// without losing a half-read line. A line that is too long or not UTF-8 is
/// queued as a decode error and ends the reader.
pub struct StreamTransport<W> {
    writer: Option<W>,
    lines: UnboundedReceiver<ChannelResult<String>>,
    reader_task: JoinHandle<()>,
    label: String,
}

impl<W: AsyncWrite + Unpin + Send> StreamTransport<W> {
    pub fn new<R>(reader: R, writer: W, label: impl Into<String>) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let label = label.into();
        let (tx, rx) = unbounded_channel();
        let task_label = label.clone();
        let reader_task = tokio::spawn(async move {
            let mut reader = BufReader::new(reader);
            loop {
                match read_line(&mut reader).await {
                    Ok(Some(line)) => {
                        if tx.send(Ok(line)).is_err() {
                            break;
                        }
                    }
                    Ok(None) => {
                        debug!(transport = %task_label, "stream reached end of input");
                        break;
                    }
                    Err(e) => {
                        warn!(transport = %task_label, error = %e, "stream reader stopped");
                        let _ = tx.send(Err(e));
                        break;
                    }
                }
            }
        });
        Self { writer: Some(writer), lines: rx, reader_task, label }
    }
}

impl StreamTransport<OwnedWriteHalf> {
    /// Wrap a connected TCP socket.
    pub fn from_tcp(stream: TcpStream) -> Self {
        let label = match stream.peer_addr() {
            Ok(addr) => format!("tcp:{addr}"),
            Err(_) => "tcp".to_string(),
        };
        let (reader, writer) = stream.into_split();
        Self::new(reader, writer, label)
    }
}

/// Read one `\n`-terminated line, reading at most one byte past the limit.
///
/// `Ok(None)` means a clean end of input. A final line without a terminator is
/// still returned.
async fn read_line<R: AsyncBufRead + Unpin>(reader: &mut R) -> ChannelResult<Option<String>> {
    let mut buf = Vec::new();
    let limit = MAX_LINE_BYTES as u64 + 2;
    let n = (&mut *reader).take(limit).read_until(b'\n', &mut buf).await?;
    if n == 0 {
        return Ok(None);
    }
    if buf.last() == Some(&b'\n') {
        buf.pop();
        if buf.last() == Some(&b'\r') {
            buf.pop();
        }
    }
    // A read cut off by the limit leaves more than MAX_LINE_BYTES in `buf`,
    // which `line_text` rejects.
    Ok(Some(LineCodec::line_text(&buf)?.to_string()))
}

fn send_error(e: io::Error) -> ChannelError {
    match e.kind() {
        io::ErrorKind::BrokenPipe
        | io::ErrorKind::ConnectionReset
        | io::ErrorKind::ConnectionAborted
        | io::ErrorKind::NotConnected => ChannelError::Unavailable(e.to_string()),
        _ => ChannelError::Io(e),
    }
}

#[async_trait]
impl<W: AsyncWrite + Unpin + Send> LineTransport for StreamTransport<W> {
    async fn send_line(&mut self, line: &str) -> ChannelResult<()> {
        let writer = self
            .writer
            .as_mut()
            .ok_or_else(|| ChannelError::Unavailable("closed locally".into()))?;
        writer.write_all(line.as_bytes()).await.map_err(send_error)?;
        writer.write_all(b"\n").await.map_err(send_error)?;
        writer.flush().await.map_err(send_error)
    }

    async fn recv_line(&mut self) -> ChannelResult<String> {
        match self.lines.recv().await {
            Some(Ok(line)) => Ok(line),
            Some(Err(e)) => Err(e),
            None => Err(ChannelError::Closed),
        }
    }

    async fn try_recv_line(&mut self) -> ChannelResult<Option<String>> {
        match self.lines.try_recv() {
            Ok(Ok(line)) => Ok(Some(line)),
            Ok(Err(e)) => Err(e),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => Err(ChannelError::Closed),
        }
    }

    async fn close(&mut self) -> ChannelResult<()> {
        if let Some(mut writer) = self.writer.take() {
            writer.shutdown().await.map_err(send_error)?;
        }
        Ok(())
    }

    fn describe(&self) -> String {
        self.label.clone()
    }
}

impl<W> Drop for StreamTransport<W> {
    fn drop(&mut self) {
        self.reader_task.abort();
    }
}
