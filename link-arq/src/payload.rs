//! Where payloads come from and where delivered payloads go.
//!
//! Sender roles pull from any `IntoIterator<Item = Vec<u8>>`; a
//! [`LineSource`] turns a text file into one payload per line. Receiver roles
//! push into a [`PayloadSink`].

use std::io::{self, BufRead, Write};

use rand::Rng;

use crate::frame::MAX_PAYLOAD;

/// Consumer of payloads delivered in order by a receiver role.
pub trait PayloadSink {
    /// Accept one payload. An error aborts the session.
    fn deliver(&mut self, payload: Vec<u8>) -> io::Result<()>;
}

impl PayloadSink for Vec<Vec<u8>> {
    fn deliver(&mut self, payload: Vec<u8>) -> io::Result<()> {
        self.push(payload);
        Ok(())
    }
}

impl<S: PayloadSink + ?Sized> PayloadSink for &mut S {
    fn deliver(&mut self, payload: Vec<u8>) -> io::Result<()> {
        (**self).deliver(payload)
    }
}

/// Writes each payload followed by `\n`.
#[derive(Debug)]
pub struct LineSink<W> {
    writer: W,
}

impl<W: Write> LineSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> PayloadSink for LineSink<W> {
    fn deliver(&mut self, payload: Vec<u8>) -> io::Result<()> {
        self.writer.write_all(&payload)?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()
    }
}

/// Lazily yields one payload per `\n`-terminated line, terminator stripped.
///
/// A trailing `\r` is stripped too. A read error ends the iteration and is
/// kept for [`LineSource::take_error`], so a caller can tell a truncated
/// source from a finished one.
#[derive(Debug)]
pub struct LineSource<R> {
    reader: R,
    line: usize,
    failed: bool,
    error: Option<io::Error>,
}

impl<R: BufRead> LineSource<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            line: 0,
            failed: false,
            error: None,
        }
    }

    /// The read error that ended the iteration, if any.
    pub fn take_error(&mut self) -> Option<io::Error> {
        self.error.take()
    }
}

impl<R: BufRead> Iterator for LineSource<R> {
    type Item = Vec<u8>;

    fn next(&mut self) -> Option<Vec<u8>> {
        if self.failed {
            return None;
        }
        let mut buf = Vec::new();
        match self.reader.read_until(b'\n', &mut buf) {
            Ok(0) => None,
            Ok(_) => {
                self.line += 1;
                if buf.last() == Some(&b'\n') {
                    buf.pop();
                }
                if buf.last() == Some(&b'\r') {
                    buf.pop();
                }
                Some(buf)
            }
            Err(e) => {
                log::error!("payload source: read failed after line {}: {e}", self.line);
                self.failed = true;
                self.error = Some(e);
                None
            }
        }
    }
}

/// Split payloads larger than [`MAX_PAYLOAD`] into frame-sized chunks.
pub fn chunked<I>(source: I) -> impl Iterator<Item = Vec<u8>>
where
    I: IntoIterator<Item = Vec<u8>>,
{
    source.into_iter().flat_map(|payload| {
        if payload.len() <= MAX_PAYLOAD {
            vec![payload]
        } else {
            log::debug!("splitting {}-byte payload", payload.len());
            payload.chunks(MAX_PAYLOAD).map(<[u8]>::to_vec).collect()
        }
    })
}

/// Random test payloads: `count` lines of `min_len..=max_len` bytes with no
/// `\n` or `\r`, so each survives a round trip through a line file.
pub fn generate<R: Rng>(rng: &mut R, count: usize, min_len: usize, max_len: usize) -> Vec<Vec<u8>> {
    let (lo, hi) = if min_len <= max_len {
        (min_len, max_len)
    } else {
        (max_len, min_len)
    };
    (0..count)
        .map(|_| {
            let len = rng.random_range(lo..=hi);
            (0..len)
                .map(|_| loop {
                    let b: u8 = rng.random();
                    if b != b'\n' && b != b'\r' {
                        break b;
                    }
                })
                .collect()
        })
        .collect()
}

/// Write `payloads` as lines.
pub fn write_lines<W: Write>(mut writer: W, payloads: &[Vec<u8>]) -> io::Result<()> {
    for p in payloads {
        writer.write_all(p)?;
        writer.write_all(b"\n")?;
    }
    writer.flush()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn line_source_strips_terminators() {
        let src = LineSource::new(&b"alpha\nbeta\r\n\ngamma"[..]);
        let lines: Vec<Vec<u8>> = src.collect();
        assert_eq!(
            lines,
            vec![b"alpha".to_vec(), b"beta".to_vec(), Vec::new(), b"gamma".to_vec()]
        );
    }

    /// Serves one line, then fails every read.
    struct FailingReader {
        served: bool,
    }

    impl io::Read for FailingReader {
        fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            Err(io::Error::other("disk gone"))
        }
    }

    impl BufRead for FailingReader {
        fn fill_buf(&mut self) -> io::Result<&[u8]> {
            if self.served {
                Err(io::Error::other("disk gone"))
            } else {
                Ok(b"first\n")
            }
        }

        fn consume(&mut self, amt: usize) {
            if amt > 0 {
                self.served = true;
            }
        }
    }

    #[test]
    fn line_source_keeps_read_error() {
        let mut src = LineSource::new(FailingReader { served: false });
        assert_eq!(src.next(), Some(b"first".to_vec()));
        assert_eq!(src.next(), None);
        assert_eq!(src.next(), None);
        let err = src.take_error().expect("read error was dropped");
        assert_eq!(err.to_string(), "disk gone");
        assert!(src.take_error().is_none());
    }

    #[test]
    fn finished_line_source_has_no_error() {
        let mut src = LineSource::new(&b"a\nb\n"[..]);
        assert_eq!(src.by_ref().count(), 2);
        assert!(src.take_error().is_none());
    }

    #[test]
    fn line_sink_appends_newlines() {
        let mut sink = LineSink::new(Vec::new());
        sink.deliver(b"one".to_vec()).unwrap();
        sink.deliver(b"two".to_vec()).unwrap();
        assert_eq!(sink.into_inner(), b"one\ntwo\n");
    }

    #[test]
    fn oversized_payloads_are_chunked() {
        let big = vec![7u8; MAX_PAYLOAD * 2 + 10];
        let out: Vec<Vec<u8>> = chunked(vec![b"hi".to_vec(), big, Vec::new()]).collect();
        let lens: Vec<usize> = out.iter().map(Vec::len).collect();
        assert_eq!(lens, vec![2, MAX_PAYLOAD, MAX_PAYLOAD, 10, 0]);
    }

    #[test]
    fn generated_payloads_respect_bounds() {
        let mut rng = StdRng::seed_from_u64(12345);
        let data = generate(&mut rng, 50, 10, 120);
        assert_eq!(data.len(), 50);
        for p in &data {
            assert!((10..=120).contains(&p.len()));
            assert!(!p.contains(&b'\n') && !p.contains(&b'\r'));
        }
    }

    #[test]
    fn generation_is_reproducible() {
        let a = generate(&mut StdRng::seed_from_u64(1), 5, 1, 40);
        let b = generate(&mut StdRng::seed_from_u64(1), 5, 1, 40);
        assert_eq!(a, b);
    }

    #[test]
    fn generated_file_reads_back_line_for_line() {
        let data = generate(&mut StdRng::seed_from_u64(9), 20, 0, 60);
        let mut file = Vec::new();
        write_lines(&mut file, &data).unwrap();
        let back: Vec<Vec<u8>> = LineSource::new(&file[..]).collect();
        assert_eq!(back, data);
    }
}
