//! Log Demultiplexer - Docker's multiplexed stdout/stderr framing
//!
//! Without a TTY, the runtime returns both output channels interleaved on
//! one byte stream as a sequence of frames:
//!
//! ```text
//! [tag: u8][reserved: 3 bytes][length: u32 big-endian][payload: length bytes]
//! ```
//!
//! `tag` is 0 for stdin, 1 for stdout, 2 for stderr.
//!
//! **Decoding rules:**
//! - Fewer than 8 bytes left at end-of-stream is a normal end, not an error
//! - A zero length (or one that is negative as a signed 32-bit value) skips
//!   the header and reads no payload
//! - A payload cut short by end-of-stream keeps what arrived and marks the
//!   output as truncated
//! - Unknown tags are discarded
//!
//! Channels are accumulated as raw bytes and decoded as UTF-8 once at the
//! end, so a code point split across two frames is not mangled.

pub const HEADER_LEN: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    Stdin,
    Stdout,
    Stderr,
}

impl StreamKind {
    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(StreamKind::Stdin),
            1 => Some(StreamKind::Stdout),
            2 => Some(StreamKind::Stderr),
            _ => None,
        }
    }

    pub fn tag(self) -> u8 {
        match self {
            StreamKind::Stdin => 0,
            StreamKind::Stdout => 1,
            StreamKind::Stderr => 2,
        }
    }
}

/// Append one frame in wire format to `out`
pub fn encode_frame(kind: StreamKind, payload: &[u8], out: &mut Vec<u8>) {
    let len = u32::try_from(payload.len()).unwrap_or(u32::MAX);
    out.push(kind.tag());
    out.extend_from_slice(&[0, 0, 0]);
    out.extend_from_slice(&len.to_be_bytes());
    out.extend_from_slice(&payload[..len as usize]);
}

/// Decoded channels of one container run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DemuxedOutput {
    pub stdout: String,
    pub stderr: String,
    /// Stream ended inside a payload, or a channel hit the capture cap
    pub truncated: bool,
}

/// Incremental decoder. Feed chunks as they arrive, then `finish`.
#[derive(Debug)]
pub struct Demultiplexer {
    pending: Vec<u8>,
    stdout: Vec<u8>,
    stderr: Vec<u8>,
    limit: usize,
    clipped: bool,
}

impl Demultiplexer {
    /// `limit` caps each channel; bytes beyond it are dropped.
    pub fn new(limit: usize) -> Self {
        Self {
            pending: Vec::new(),
            stdout: Vec::new(),
            stderr: Vec::new(),
            limit,
            clipped: false,
        }
    }

    pub fn feed(&mut self, chunk: &[u8]) {
        self.pending.extend_from_slice(chunk);

        let mut pos = 0;
        while self.pending.len() - pos >= HEADER_LEN {
            let header = &self.pending[pos..pos + HEADER_LEN];
            let tag = header[0];
            let len = u32::from_be_bytes([header[4], header[5], header[6], header[7]]);

            if len == 0 || len > i32::MAX as u32 {
                pos += HEADER_LEN;
                continue;
            }

            let len = len as usize;
            let body_start = pos + HEADER_LEN;
            if self.pending.len() - body_start < len {
                // wait for the rest of the payload
                break;
            }

            let body = body_start..body_start + len;
            self.append(tag, body);
            pos = body_start + len;
        }

        self.pending.drain(..pos);
    }

    pub fn finish(mut self) -> DemuxedOutput {
        let mut truncated = false;

        // A complete header with a partial payload: keep what arrived.
        // Anything shorter than a header is an ordinary end of stream.
        if self.pending.len() >= HEADER_LEN {
            let tag = self.pending[0];
            let body = HEADER_LEN..self.pending.len();
            self.append(tag, body);
            truncated = true;
        }

        DemuxedOutput {
            stdout: String::from_utf8_lossy(&self.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&self.stderr).into_owned(),
            truncated: truncated || self.clipped,
        }
    }

    fn append(&mut self, tag: u8, body: std::ops::Range<usize>) {
        let channel = match StreamKind::from_tag(tag) {
            Some(StreamKind::Stdout) => &mut self.stdout,
            Some(StreamKind::Stderr) => &mut self.stderr,
            _ => return,
        };

        let payload = &self.pending[body];
        let room = self.limit.saturating_sub(channel.len());
        if payload.len() > room {
            self.clipped = true;
        }
        channel.extend_from_slice(&payload[..payload.len().min(room)]);
    }
}

/// Decode a complete raw stream in one go
pub fn demultiplex(raw: &[u8]) -> DemuxedOutput {
    let mut demux = Demultiplexer::new(usize::MAX);
    demux.feed(raw);
    demux.finish()
}
