//! Datagram I/O over a connected byte stream.
//!
//! The transport is reliable and ordered but offers no message framing, so
//! this module recovers datagram boundaries itself:
//!
//! - **Frames** are length-prefixed: read the 15-byte header, take the
//!   declared length, then read the padded payload and CRC trailer.
//! - **Acknowledgements** are always exactly [`ACK_LEN`] bytes.
//!
//! A corrupted length field makes the declared size wrong, so a frame that
//! fails its CRC says nothing about where the next one starts. The
//! [`FrameReader`] therefore buffers the stream and, after a failure, slides
//! forward one byte at a time until a candidate frame verifies again:
//!
//! ```text
//!  in sync ──CRC ok──▶ Frame                  resyncing ──CRC ok──▶ Frame, in sync
//!     │                                          │  ▲
//!     └──CRC bad / stalled──▶ Corrupt, drop 1 ──▶└──┘ bad / stalled: drop 1 byte
//! ```
//!
//! Only the first failure after a good frame is reported; the engines react
//! to it once (count, NAK) and retransmissions supply the next good frame.
//!
//! Every outbound datagram goes through a [`Simulator`] inside
//! [`LinkWriter::transmit`], so impairments are invisible to the engines.
//!
//! A clean end-of-stream *between* datagrams is the normal end of a session
//! and is reported as `Ok(None)`. End-of-stream *inside* a datagram is an
//! [`io::ErrorKind::UnexpectedEof`] error.

use std::io;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;

use crate::frame::{self, FrameError, ACK_LEN, HEADER_LEN, MAX_PAYLOAD};
use crate::simulator::{Simulator, SimulatorStats};

/// Capacity of the acknowledgement queue between listener and state loop.
pub const ACK_QUEUE: usize = 64;

/// How long a partly received frame may wait for its next byte.
///
/// Frames are written in one piece, so a body that stops short was sized
/// from a corrupted length field.
pub const STALL: Duration = Duration::from_millis(100);

const READ_CHUNK: usize = 4096;

/// Outcome of one [`LinkWriter::transmit`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transmit {
    /// Bytes (possibly corrupted) were written to the transport.
    Sent,
    /// The simulated channel lost the datagram; nothing was written.
    Dropped,
}

// ---------------------------------------------------------------------------
// LinkWriter
// ---------------------------------------------------------------------------

/// Write half of a link with a channel simulator in front of it.
#[derive(Debug)]
pub struct LinkWriter<W> {
    inner: W,
    sim: Simulator,
}

impl<W: AsyncWrite + Unpin> LinkWriter<W> {
    pub fn new(inner: W, sim: Simulator) -> Self {
        Self { inner, sim }
    }

    /// Push one datagram through the simulator and onto the transport.
    ///
    /// `datagram` itself is never modified; corruption applies to a copy so
    /// cached bytes stay pristine for retransmission.
    pub async fn transmit(&mut self, datagram: &[u8]) -> io::Result<Transmit> {
        self.sim.delay().await;
        let mut wire = datagram.to_vec();
        self.sim.corrupt(&mut wire);
        if self.sim.drop_frame() {
            log::debug!("[sim] dropped {}-byte datagram", wire.len());
            return Ok(Transmit::Dropped);
        }
        self.inner.write_all(&wire).await?;
        self.inner.flush().await?;
        Ok(Transmit::Sent)
    }

    /// Half-close the transport so the peer sees end-of-stream.
    pub async fn shutdown(&mut self) -> io::Result<()> {
        self.inner.shutdown().await
    }

    pub fn stats(&self) -> SimulatorStats {
        self.sim.stats()
    }
}

// ---------------------------------------------------------------------------
// Readers
// ---------------------------------------------------------------------------

/// Fill `buf` from `reader`.
///
/// Returns `Ok(false)` if the stream ended before the first byte.
async fn fill<R: AsyncRead + Unpin>(reader: &mut R, buf: &mut [u8]) -> io::Result<bool> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = reader.read(&mut buf[filled..]).await?;
        if n == 0 {
            if filled == 0 {
                return Ok(false);
            }
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("stream ended {filled} bytes into a {}-byte read", buf.len()),
            ));
        }
        filled += n;
    }
    Ok(true)
}

// ---------------------------------------------------------------------------
// FrameReader
// ---------------------------------------------------------------------------

/// One datagram pulled off the stream by a [`FrameReader`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    /// A frame whose CRC-32 trailer checked out, exactly as received.
    Frame(Vec<u8>),
    /// The bytes at a frame boundary did not form a valid frame; the reader
    /// is hunting for the next one.
    Corrupt(FrameError),
}

enum Candidate {
    Valid(usize),
    Invalid(FrameError),
    /// More bytes are needed; `needed` is the full candidate size if known.
    Incomplete { needed: Option<usize> },
}

/// Buffered frame reader that resynchronises after integrity failures.
#[derive(Debug)]
pub struct FrameReader<R> {
    inner: R,
    buf: Vec<u8>,
    resyncing: bool,
    eof: bool,
    skipped: u64,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            buf: Vec::with_capacity(READ_CHUNK),
            resyncing: false,
            eof: false,
            skipped: 0,
        }
    }

    /// Bytes discarded while hunting for a frame boundary.
    pub fn skipped(&self) -> u64 {
        self.skipped
    }

    /// Next datagram, or `Ok(None)` on end-of-stream at a frame boundary.
    ///
    /// End-of-stream inside a frame is an [`io::ErrorKind::UnexpectedEof`]
    /// error unless the reader is resynchronising, in which case the
    /// leftover bytes are discarded.
    pub async fn next(&mut self) -> io::Result<Option<Inbound>> {
        loop {
            match self.candidate() {
                Candidate::Valid(len) => {
                    if self.resyncing {
                        self.resyncing = false;
                        log::info!("frame boundary recovered ({} bytes skipped so far)", self.skipped);
                    }
                    let bytes = self.buf.drain(..len).collect();
                    return Ok(Some(Inbound::Frame(bytes)));
                }
                Candidate::Invalid(e) => {
                    if let Some(corrupt) = self.slip(e) {
                        return Ok(Some(corrupt));
                    }
                }
                Candidate::Incomplete { needed } => {
                    let stalled = if self.eof {
                        true
                    } else {
                        !self.fill(needed.is_some()).await?
                    };
                    if !stalled {
                        continue;
                    }
                    if self.eof && !self.resyncing {
                        if self.buf.is_empty() {
                            return Ok(None);
                        }
                        return Err(io::Error::new(
                            io::ErrorKind::UnexpectedEof,
                            format!("stream ended {} bytes into a frame", self.buf.len()),
                        ));
                    }
                    match needed {
                        Some(min) => {
                            let e = FrameError::TooShort { len: self.buf.len(), min };
                            if let Some(corrupt) = self.slip(e) {
                                return Ok(Some(corrupt));
                            }
                        }
                        None => {
                            // Resyncing at end-of-stream with less than a header left.
                            if !self.buf.is_empty() {
                                log::warn!("discarding {} trailing byte(s)", self.buf.len());
                                self.skipped += self.buf.len() as u64;
                                self.buf.clear();
                            }
                            return Ok(None);
                        }
                    }
                }
            }
        }
    }

    /// Classify the bytes at the front of the buffer.
    fn candidate(&self) -> Candidate {
        if self.buf.len() < HEADER_LEN {
            return Candidate::Incomplete { needed: None };
        }
        let Some(declared) = frame::declared_len(&self.buf) else {
            return Candidate::Incomplete { needed: None };
        };
        if usize::from(declared) > MAX_PAYLOAD {
            return Candidate::Invalid(FrameError::BadLength(declared));
        }
        let len = frame::frame_len(declared);
        match self.buf.get(..len) {
            Some(bytes) => match frame::check(bytes) {
                Ok(()) => Candidate::Valid(len),
                Err(e) => Candidate::Invalid(e),
            },
            None => Candidate::Incomplete { needed: Some(len) },
        }
    }

    /// Drop the first buffered byte. Returns the failure to report when it
    /// ends a run of good frames.
    fn slip(&mut self, error: FrameError) -> Option<Inbound> {
        self.buf.remove(0);
        self.skipped += 1;
        if self.resyncing {
            return None;
        }
        self.resyncing = true;
        log::debug!("frame boundary lost: {error}");
        Some(Inbound::Corrupt(error))
    }

    /// Append whatever the transport has next.
    ///
    /// With `bounded` set the wait is limited to [`STALL`]; `Ok(false)` means
    /// it expired.
    async fn fill(&mut self, bounded: bool) -> io::Result<bool> {
        let mut chunk = [0u8; READ_CHUNK];
        let n = if bounded {
            match timeout(STALL, self.inner.read(&mut chunk)).await {
                Ok(read) => read?,
                Err(_) => return Ok(false),
            }
        } else {
            self.inner.read(&mut chunk).await?
        };
        if n == 0 {
            self.eof = true;
        } else {
            self.buf.extend_from_slice(&chunk[..n]);
        }
        Ok(true)
    }
}

/// Read one acknowledgement datagram.
pub async fn read_ack<R: AsyncRead + Unpin>(reader: &mut R) -> io::Result<Option<[u8; ACK_LEN]>> {
    let mut buf = [0u8; ACK_LEN];
    if !fill(reader, &mut buf).await? {
        return Ok(None);
    }
    Ok(Some(buf))
}

/// Spawn a task that reads acknowledgement datagrams and queues them.
///
/// The task ends (dropping `tx`) on end-of-stream, after forwarding a read
/// error, or once the receiving side of the queue is gone.
pub fn spawn_ack_listener<R>(
    mut reader: R,
    tx: mpsc::Sender<io::Result<[u8; ACK_LEN]>>,
) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        loop {
            match read_ack(&mut reader).await {
                Ok(Some(datagram)) => {
                    if tx.send(Ok(datagram)).await.is_err() {
                        break;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    let _ = tx.send(Err(e)).await;
                    break;
                }
            }
        }
    })
}
