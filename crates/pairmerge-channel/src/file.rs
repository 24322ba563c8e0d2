use std::collections::VecDeque;
use std::io::{self, SeekFrom};
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use pairmerge_protocol::{LineCodec, ProtocolError, MAX_LINE_BYTES};
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tracing::{debug, warn};

use crate::error::{ChannelError, ChannelResult};
use crate::transport::LineTransport;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Transport over a pair of append-only files.
///
/// Each worker appends its lines to its outbox and reads the partner's lines
/// from its inbox (the partner's outbox). Reading tracks a byte offset into
/// the inbox, so lines are consumed exactly once. A trailing fragment without
/// a newline is still being written and is left for the next poll.
///
/// [`offset`](Self::offset) counts only lines already handed to the caller,
/// so it can be stored and passed back to [`resume_from`](LineTransport::resume_from)
/// after a restart.
///
/// Files carry no close signal: `recv_line` keeps polling until a line shows
/// up, and callers bound the wait with a timeout.
pub struct FileTransport {
    inbox: PathBuf,
    outbox: PathBuf,
    /// End of the last line moved into `pending`.
    read_offset: u64,
    /// End of the last line returned to the caller.
    delivered_offset: u64,
    /// Complete lines with the inbox offset just past each one.
    pending: VecDeque<(String, u64)>,
    /// Set when a poll stopped at a line that cannot be decoded.
    rejected: Option<ProtocolError>,
    poll_interval: Duration,
    closed: bool,
}

impl FileTransport {
    pub fn new(inbox: impl Into<PathBuf>, outbox: impl Into<PathBuf>) -> Self {
        Self {
            inbox: inbox.into(),
            outbox: outbox.into(),
            read_offset: 0,
            delivered_offset: 0,
            pending: VecDeque::new(),
            rejected: None,
            poll_interval: DEFAULT_POLL_INTERVAL,
            closed: false,
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn inbox(&self) -> &Path {
        &self.inbox
    }

    pub fn outbox(&self) -> &Path {
        &self.outbox
    }

    /// Bytes of the inbox delivered to the caller so far.
    pub fn offset(&self) -> u64 {
        self.delivered_offset
    }

    fn next_pending(&mut self) -> ChannelResult<Option<String>> {
        if let Some((line, end)) = self.pending.pop_front() {
            self.delivered_offset = end;
            return Ok(Some(line));
        }
        match self.rejected.take() {
            Some(e) => Err(e.into()),
            None => Ok(None),
        }
    }

    /// Queue every complete line appended to the inbox since the last poll.
    ///
    /// Stops at the first line that fails [`LineCodec::line_text`]: the lines
    /// before it are queued, the offset stays in front of it, and the error is
    /// reported once the queue drains.
    async fn poll(&mut self) -> ChannelResult<()> {
        if self.rejected.is_some() {
            return Ok(());
        }
        let mut file = match File::open(&self.inbox).await {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e.into()),
        };
        file.seek(SeekFrom::Start(self.read_offset)).await?;
        let mut buf = Vec::new();
        file.read_to_end(&mut buf).await?;

        let mut batch = Vec::new();
        let mut consumed = 0usize;
        let mut rejected = None;
        while let Some(len) = buf[consumed..].iter().position(|b| *b == b'\n') {
            let raw = &buf[consumed..consumed + len];
            let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
            match LineCodec::line_text(raw) {
                Ok(line) => {
                    consumed += len + 1;
                    batch.push((line.to_string(), self.read_offset + consumed as u64));
                }
                Err(e) => {
                    rejected = Some(e);
                    break;
                }
            }
        }
        if rejected.is_none() && buf.len() - consumed > MAX_LINE_BYTES + 1 {
            rejected = LineCodec::line_text(&buf[consumed..]).err();
        }

        self.read_offset += consumed as u64;
        self.pending.extend(batch);
        if let Some(e) = &rejected {
            warn!(inbox = %self.inbox.display(), offset = self.read_offset, error = %e, "undecodable inbox line");
        }
        self.rejected = rejected;
        debug!(inbox = %self.inbox.display(), offset = self.read_offset, queued = self.pending.len(), "inbox polled");
        Ok(())
    }
}

#[async_trait]
impl LineTransport for FileTransport {
    async fn send_line(&mut self, line: &str) -> ChannelResult<()> {
        if self.closed {
            return Err(ChannelError::Unavailable("closed locally".into()));
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.outbox)
            .await
            .map_err(|e| ChannelError::Unavailable(format!("{}: {e}", self.outbox.display())))?;
        let mut framed = String::with_capacity(line.len() + 1);
        framed.push_str(line);
        framed.push('\n');
        file.write_all(framed.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }

    async fn recv_line(&mut self) -> ChannelResult<String> {
        loop {
            if let Some(line) = self.next_pending()? {
                return Ok(line);
            }
            self.poll().await?;
            if self.pending.is_empty() && self.rejected.is_none() {
                tokio::time::sleep(self.poll_interval).await;
            }
        }
    }

    async fn try_recv_line(&mut self) -> ChannelResult<Option<String>> {
        if self.pending.is_empty() && self.rejected.is_none() {
            self.poll().await?;
        }
        self.next_pending()
    }

    async fn close(&mut self) -> ChannelResult<()> {
        self.closed = true;
        Ok(())
    }

    fn resume_point(&self) -> Option<u64> {
        Some(self.delivered_offset)
    }

    async fn resume_from(&mut self, point: u64) -> ChannelResult<()> {
        self.pending.clear();
        self.rejected = None;
        self.read_offset = point;
        self.delivered_offset = point;
        debug!(inbox = %self.inbox.display(), offset = point, "resuming inbox");
        Ok(())
    }

    fn describe(&self) -> String {
        format!("file:{}->{}", self.outbox.display(), self.inbox.display())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn pair(dir: &Path) -> (FileTransport, FileTransport) {
        let a_to_b = dir.join("a_to_b");
        let b_to_a = dir.join("b_to_a");
        (
            FileTransport::new(&b_to_a, &a_to_b).with_poll_interval(Duration::from_millis(1)),
            FileTransport::new(&a_to_b, &b_to_a).with_poll_interval(Duration::from_millis(1)),
        )
    }

    #[tokio::test]
    async fn lines_are_appended_and_read_once() {
        let dir = tempfile::tempdir().unwrap();
        let (mut a, mut b) = pair(dir.path());
        a.send_line("one").await.unwrap();
        a.send_line("two").await.unwrap();
        assert_eq!(b.recv_line().await.unwrap(), "one");
        assert_eq!(b.recv_line().await.unwrap(), "two");
        assert_eq!(b.try_recv_line().await.unwrap(), None);
        let contents = std::fs::read_to_string(dir.path().join("a_to_b")).unwrap();
        assert_eq!(contents, "one\ntwo\n");
        assert_eq!(b.offset(), contents.len() as u64);
    }

    #[tokio::test]
    async fn missing_inbox_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let (_a, mut b) = pair(dir.path());
        assert_eq!(b.try_recv_line().await.unwrap(), None);
    }

    #[tokio::test]
    async fn partial_line_waits_for_newline() {
        let dir = tempfile::tempdir().unwrap();
        let (_a, mut b) = pair(dir.path());
        let path = dir.path().join("a_to_b");
        let mut f = std::fs::OpenOptions::new().create(true).append(true).open(&path).unwrap();
        write!(f, "whole\npart").unwrap();
        f.flush().unwrap();
        assert_eq!(b.try_recv_line().await.unwrap(), Some("whole".into()));
        assert_eq!(b.try_recv_line().await.unwrap(), None);
        writeln!(f, "ial").unwrap();
        f.flush().unwrap();
        assert_eq!(b.try_recv_line().await.unwrap(), Some("partial".into()));
    }

    #[tokio::test]
    async fn closed_transport_rejects_sends() {
        let dir = tempfile::tempdir().unwrap();
        let (mut a, _b) = pair(dir.path());
        a.close().await.unwrap();
        assert!(matches!(a.send_line("x").await, Err(ChannelError::Unavailable(_))));
    }

    fn append_raw(path: &Path, bytes: &[u8]) {
        let mut f = std::fs::OpenOptions::new().create(true).append(true).open(path).unwrap();
        f.write_all(bytes).unwrap();
        f.flush().unwrap();
    }

    #[tokio::test]
    async fn invalid_utf8_is_a_decode_error_after_good_lines() {
        let dir = tempfile::tempdir().unwrap();
        let (_a, mut b) = pair(dir.path());
        let good = b"{\"msg_type\":\"HEAD\",\"values\":[1]}\n";
        append_raw(&dir.path().join("a_to_b"), good);
        append_raw(&dir.path().join("a_to_b"), b"\xff\xfe\n");

        assert_eq!(b.recv_line().await.unwrap(), r#"{"msg_type":"HEAD","values":[1]}"#);
        assert_eq!(b.offset(), good.len() as u64);
        for _ in 0..3 {
            let err = b.try_recv_line().await.unwrap_err();
            assert!(matches!(err, ChannelError::Protocol(ProtocolError::Decode { .. })), "got {err}");
            assert_eq!(b.offset(), good.len() as u64);
        }
    }

    #[tokio::test]
    async fn bad_line_first_in_batch_delivers_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let (_a, mut b) = pair(dir.path());
        append_raw(&dir.path().join("a_to_b"), b"\xff\n{\"msg_type\":\"END\",\"values\":[]}\n");
        assert!(b.recv_line().await.is_err());
        assert!(b.recv_line().await.is_err());
        assert_eq!(b.offset(), 0);
    }

    #[tokio::test]
    async fn overlong_fragment_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let (_a, mut b) = pair(dir.path());
        append_raw(&dir.path().join("a_to_b"), &vec![b'x'; MAX_LINE_BYTES + 2]);
        let err = b.try_recv_line().await.unwrap_err();
        assert!(err.to_string().contains("exceeds"));
    }

    #[tokio::test]
    async fn resume_skips_delivered_lines() {
        let dir = tempfile::tempdir().unwrap();
        let (mut a, mut b) = pair(dir.path());
        for line in ["one", "two", "three"] {
            a.send_line(line).await.unwrap();
        }
        assert_eq!(b.recv_line().await.unwrap(), "one");
        let point = b.resume_point().unwrap();

        let (_, mut restarted) = pair(dir.path());
        restarted.resume_from(point).await.unwrap();
        assert_eq!(restarted.recv_line().await.unwrap(), "two");
        assert_eq!(restarted.recv_line().await.unwrap(), "three");
        assert_eq!(restarted.try_recv_line().await.unwrap(), None);
    }
}
