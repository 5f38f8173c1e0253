//! Wire-format definitions for link frames and acknowledgements.
//!
//! Every data unit exchanged between the sender and receiver roles is either a
//! [`Frame`] (sender → receiver) or an [`Ack`] datagram (receiver → sender).
//! This module is responsible for:
//! - Defining the on-wire binary layout of both.
//! - Serialising them, padding short payloads and appending the CRC-32 trailer.
//! - Deserialising raw bytes back, returning errors for truncated input.
//! - Verifying the CRC-32 trailer.
//!
//! No I/O happens here.
//!
//! # Frame format
//!
//! All multi-byte integers are **big-endian**.
//!
//! ```text
//!  0           6          12      14    15                      15+P    15+P+4
//! +-----------+-----------+-------+-----+-----------------------+--------+
//! |  src MAC  |  dst MAC  |  len  | seq | payload, padded to P  | CRC-32 |
//! +-----------+-----------+-------+-----+-----------------------+--------+
//!                                         P = max(len, MIN_PAYLOAD)
//! ```
//!
//! The CRC covers header, payload and padding exactly as transmitted.
//!
//! # Acknowledgement format
//!
//! ```text
//! +------+-----+--------+
//! | type | seq | CRC-32 |     type: 0x06 = ACK, 0x15 = NAK
//! +------+-----+--------+
//! ```

use std::fmt;

use crc::{Crc, CRC_32_ISO_HDLC};
use rand::Rng;
use thiserror::Error;

/// Byte length of the fixed-size frame header on the wire.
pub const HEADER_LEN: usize = 15;
/// Payloads shorter than this are padded up to it.
pub const MIN_PAYLOAD: usize = 46;
/// Largest payload a single frame may carry.
pub const MAX_PAYLOAD: usize = 1500;
/// Byte length of the CRC-32 trailer.
pub const CRC_LEN: usize = 4;
/// Shortest byte sequence that can possibly be a frame.
pub const MIN_FRAME_LEN: usize = HEADER_LEN + MIN_PAYLOAD + CRC_LEN;
/// Byte length of an acknowledgement datagram.
pub const ACK_LEN: usize = 6;
/// Filler used to pad short payloads.
pub const PAD_BYTE: u8 = b' ';

// Byte offsets of each field within the serialised header.
const OFF_SRC: usize = 0;
const OFF_DST: usize = 6;
const OFF_LEN: usize = 12;
const OFF_SEQ: usize = 14;

/// Reflected CRC-32 (polynomial 0xEDB88320, init and final XOR 0xFFFFFFFF).
const CRC32: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);

/// Compute the CRC-32 of `data`.
pub fn crc32(data: &[u8]) -> u32 {
    CRC32.checksum(data)
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors that can arise when building or parsing a datagram.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FrameError {
    /// Not enough bytes to hold the structure being parsed.
    #[error("datagram too short: {len} bytes, need at least {min}")]
    TooShort { len: usize, min: usize },
    /// The CRC-32 trailer does not match the recomputed value.
    #[error("CRC mismatch: trailer {expected:#010x}, computed {actual:#010x}")]
    Integrity { expected: u32, actual: u32 },
    /// Acknowledgement carries a type byte other than ACK or NAK.
    #[error("unknown acknowledgement type {0:#04x}")]
    UnknownAckType(u8),
    /// Payload exceeds [`MAX_PAYLOAD`].
    #[error("payload of {0} bytes exceeds the {MAX_PAYLOAD}-byte maximum")]
    PayloadTooLarge(usize),
    /// Header declares a payload longer than any frame can carry.
    #[error("header declares a {0}-byte payload")]
    BadLength(u16),
}

// ---------------------------------------------------------------------------
// MacAddr
// ---------------------------------------------------------------------------

/// 6-byte link address. Only used to label frames inside the simulation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct MacAddr(pub [u8; 6]);

impl MacAddr {
    /// A random locally administered unicast address.
    pub fn random<R: Rng>(rng: &mut R) -> Self {
        let mut octets = [0u8; 6];
        rng.fill(&mut octets);
        octets[0] = (octets[0] & 0xFE) | 0x02;
        Self(octets)
    }
}

impl fmt::Display for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{a:02x}:{b:02x}:{c:02x}:{d:02x}:{e:02x}:{g:02x}")
    }
}

// ---------------------------------------------------------------------------
// Frame
// ---------------------------------------------------------------------------

/// Fixed-size frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub src: MacAddr,
    pub dst: MacAddr,
    /// Declared payload length, excluding padding.
    pub length: u16,
    /// Modulo-256 sequence number.
    pub seq: u8,
}

/// Number of payload bytes on the wire for a declared `length`.
pub fn padded_len(length: u16) -> usize {
    usize::from(length).max(MIN_PAYLOAD)
}

/// Total frame size on the wire for a declared `length`.
pub fn frame_len(length: u16) -> usize {
    HEADER_LEN + padded_len(length) + CRC_LEN
}

/// Declared length carried in a serialised header, `None` when `buf` is
/// too short to contain the length field.
pub fn declared_len(buf: &[u8]) -> Option<u16> {
    match buf.get(OFF_LEN..OFF_LEN + 2) {
        Some(&[hi, lo]) => Some(u16::from_be_bytes([hi, lo])),
        _ => None,
    }
}

/// A link frame: header plus the payload bytes (padding stripped).
///
/// Only [`Frame::new`] and [`Frame::decode`] build frames, so the declared
/// length always matches the payload and never exceeds [`MAX_PAYLOAD`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    header: Header,
    payload: Vec<u8>,
}

impl Frame {
    /// Build a frame, deriving the declared length from `payload`.
    pub fn new(src: MacAddr, dst: MacAddr, seq: u8, payload: Vec<u8>) -> Result<Self, FrameError> {
        if payload.len() > MAX_PAYLOAD {
            return Err(FrameError::PayloadTooLarge(payload.len()));
        }
        Ok(Self {
            header: Header {
                src,
                dst,
                length: payload.len() as u16,
                seq,
            },
            payload,
        })
    }

    pub fn header(&self) -> &Header {
        &self.header
    }

    pub fn seq(&self) -> u8 {
        self.header.seq
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn into_payload(self) -> Vec<u8> {
        self.payload
    }

    /// Serialise this frame, padding the payload and appending the CRC-32.
    pub fn encode(&self) -> Vec<u8> {
        let length = self.header.length;
        let mut buf = Vec::with_capacity(frame_len(length));

        buf.extend_from_slice(&self.header.src.0);
        buf.extend_from_slice(&self.header.dst.0);
        buf.extend_from_slice(&length.to_be_bytes());
        buf.push(self.header.seq);
        buf.extend_from_slice(&self.payload);
        buf.resize(HEADER_LEN + padded_len(length), PAD_BYTE);

        let crc = crc32(&buf);
        buf.extend_from_slice(&crc.to_be_bytes());
        buf
    }

    /// Parse a [`Frame`] from raw bytes.
    ///
    /// Only the structure is checked here; call [`verify`] or [`check`] for
    /// integrity. Fails when `buf` is shorter than the minimum frame or
    /// than the size implied by its declared length, and when the declared
    /// length exceeds [`MAX_PAYLOAD`].
    pub fn decode(buf: &[u8]) -> Result<Self, FrameError> {
        let length = match declared_len(buf) {
            Some(length) if buf.len() >= MIN_FRAME_LEN => length,
            _ => {
                return Err(FrameError::TooShort {
                    len: buf.len(),
                    min: MIN_FRAME_LEN,
                })
            }
        };
        if usize::from(length) > MAX_PAYLOAD {
            return Err(FrameError::BadLength(length));
        }
        let needed = frame_len(length);
        if buf.len() < needed {
            return Err(FrameError::TooShort {
                len: buf.len(),
                min: needed,
            });
        }

        let mut src = [0u8; 6];
        let mut dst = [0u8; 6];
        src.copy_from_slice(&buf[OFF_SRC..OFF_SRC + 6]);
        dst.copy_from_slice(&buf[OFF_DST..OFF_DST + 6]);

        Ok(Frame {
            header: Header {
                src: MacAddr(src),
                dst: MacAddr(dst),
                length,
                seq: buf[OFF_SEQ],
            },
            payload: buf[HEADER_LEN..HEADER_LEN + usize::from(length)].to_vec(),
        })
    }
}

/// Check the CRC-32 trailer of a serialised datagram.
///
/// The CRC is recomputed over everything but the last [`CRC_LEN`] bytes.
pub fn check(buf: &[u8]) -> Result<(), FrameError> {
    if buf.len() < CRC_LEN {
        return Err(FrameError::TooShort {
            len: buf.len(),
            min: CRC_LEN,
        });
    }
    let (body, trailer) = buf.split_at(buf.len() - CRC_LEN);
    let expected = u32::from_be_bytes([trailer[0], trailer[1], trailer[2], trailer[3]]);
    let actual = crc32(body);
    if expected != actual {
        return Err(FrameError::Integrity { expected, actual });
    }
    Ok(())
}

/// `true` when the CRC-32 trailer of `buf` matches its contents.
pub fn verify(buf: &[u8]) -> bool {
    check(buf).is_ok()
}

// ---------------------------------------------------------------------------
// Ack
// ---------------------------------------------------------------------------

/// Positive or negative acknowledgement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckKind {
    Ack,
    Nak,
}

impl AckKind {
    pub const ACK_BYTE: u8 = 0x06;
    pub const NAK_BYTE: u8 = 0x15;

    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            Self::ACK_BYTE => Some(AckKind::Ack),
            Self::NAK_BYTE => Some(AckKind::Nak),
            _ => None,
        }
    }

    pub fn to_u8(self) -> u8 {
        match self {
            AckKind::Ack => Self::ACK_BYTE,
            AckKind::Nak => Self::NAK_BYTE,
        }
    }
}

impl fmt::Display for AckKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AckKind::Ack => f.write_str("ACK"),
            AckKind::Nak => f.write_str("NAK"),
        }
    }
}

/// An acknowledgement datagram.
///
/// The meaning of `seq` depends on the engine: Go-Back-N sends the next
/// expected sequence number, the other engines name the frame itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ack {
    pub kind: AckKind,
    pub seq: u8,
}

impl Ack {
    pub fn ack(seq: u8) -> Self {
        Self { kind: AckKind::Ack, seq }
    }

    pub fn nak(seq: u8) -> Self {
        Self { kind: AckKind::Nak, seq }
    }

    /// Serialise as `[type][seq][CRC-32]`.
    pub fn encode(&self) -> [u8; ACK_LEN] {
        let body = [self.kind.to_u8(), self.seq];
        let crc = crc32(&body).to_be_bytes();
        [body[0], body[1], crc[0], crc[1], crc[2], crc[3]]
    }

    /// Parse and verify an acknowledgement datagram.
    ///
    /// The CRC is checked before the type byte is interpreted.
    pub fn decode(buf: &[u8]) -> Result<Self, FrameError> {
        if buf.len() < ACK_LEN {
            return Err(FrameError::TooShort {
                len: buf.len(),
                min: ACK_LEN,
            });
        }
        check(&buf[..ACK_LEN])?;
        let kind = AckKind::from_u8(buf[0]).ok_or(FrameError::UnknownAckType(buf[0]))?;
        Ok(Self { kind, seq: buf[1] })
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    const SRC: MacAddr = MacAddr([0x02, 0, 0, 0, 0, 0x01]);
    const DST: MacAddr = MacAddr([0x02, 0, 0, 0, 0, 0x02]);

    fn make_frame(seq: u8, payload: &[u8]) -> Frame {
        Frame::new(SRC, DST, seq, payload.to_vec()).unwrap()
    }

    #[test]
    fn crc32_check_value() {
        // Standard check value for CRC-32/ISO-HDLC.
        assert_eq!(crc32(b"123456789"), 0xCBF4_3926);
    }

    #[test]
    fn encode_decode_roundtrip() {
        let frame = make_frame(7, b"hello link layer");
        let bytes = frame.encode();
        assert!(verify(&bytes));
        let decoded = Frame::decode(&bytes).unwrap();
        assert_eq!(decoded, frame);
    }

    #[test]
    fn short_payload_is_padded_with_spaces() {
        let bytes = make_frame(0, b"abc").encode();
        assert_eq!(bytes.len(), MIN_FRAME_LEN);
        assert_eq!(&bytes[HEADER_LEN..HEADER_LEN + 3], b"abc");
        assert!(bytes[HEADER_LEN + 3..HEADER_LEN + MIN_PAYLOAD]
            .iter()
            .all(|&b| b == PAD_BYTE));
        // Declared length is the real payload length, not the padded one.
        assert_eq!(declared_len(&bytes), Some(3));
        assert_eq!(Frame::decode(&bytes).unwrap().payload(), b"abc");
    }

    #[test]
    fn long_payload_is_not_padded() {
        let payload = vec![0xAB; 100];
        let bytes = make_frame(1, &payload).encode();
        assert_eq!(bytes.len(), HEADER_LEN + 100 + CRC_LEN);
        assert_eq!(frame_len(100), bytes.len());
    }

    #[test]
    fn length_field_is_big_endian() {
        let payload = vec![0u8; 0x0102];
        let bytes = make_frame(0, &payload).encode();
        assert_eq!(&bytes[OFF_LEN..OFF_LEN + 2], &[0x01, 0x02]);
    }

    #[test]
    fn header_fields_on_wire() {
        let bytes = make_frame(0xFE, b"x").encode();
        assert_eq!(&bytes[OFF_SRC..OFF_SRC + 6], &SRC.0);
        assert_eq!(&bytes[OFF_DST..OFF_DST + 6], &DST.0);
        assert_eq!(bytes[OFF_SEQ], 0xFE);
    }

    #[test]
    fn every_single_bit_flip_is_detected() {
        let bytes = make_frame(42, b"single bit errors never slip through").encode();
        for byte in 0..bytes.len() {
            for bit in 0..8 {
                let mut corrupted = bytes.clone();
                corrupted[byte] ^= 1 << bit;
                assert!(!verify(&corrupted), "flip at byte {byte} bit {bit} undetected");
            }
        }
    }

    #[test]
    fn check_reports_both_crc_values() {
        let mut bytes = make_frame(3, b"payload").encode();
        bytes[HEADER_LEN] ^= 0x01;
        match check(&bytes) {
            Err(FrameError::Integrity { expected, actual }) => assert_ne!(expected, actual),
            other => panic!("expected integrity error, got {other:?}"),
        }
    }

    #[test]
    fn decode_rejects_buffer_below_minimum() {
        let bytes = make_frame(0, b"abc").encode();
        assert_eq!(
            Frame::decode(&bytes[..MIN_FRAME_LEN - 1]),
            Err(FrameError::TooShort {
                len: MIN_FRAME_LEN - 1,
                min: MIN_FRAME_LEN
            })
        );
        assert!(matches!(Frame::decode(&[]), Err(FrameError::TooShort { .. })));
    }

    #[test]
    fn decode_rejects_truncated_long_frame() {
        let mut bytes = make_frame(0, &[7u8; 200]).encode();
        bytes.pop();
        assert_eq!(
            Frame::decode(&bytes),
            Err(FrameError::TooShort {
                len: frame_len(200) - 1,
                min: frame_len(200)
            })
        );
    }

    #[test]
    fn declared_len_needs_the_length_field() {
        assert_eq!(declared_len(&[0u8; OFF_LEN + 1]), None);
        assert_eq!(declared_len(&[]), None);
        let bytes = make_frame(0, &[1u8; 300]).encode();
        assert_eq!(declared_len(&bytes[..HEADER_LEN]), Some(300));
    }

    #[test]
    fn decode_rejects_impossible_length() {
        let mut bytes = make_frame(0, b"abc").encode();
        bytes[OFF_LEN] = 0x10;
        bytes.resize(frame_len(0x1003), 0);
        assert_eq!(Frame::decode(&bytes), Err(FrameError::BadLength(0x1003)));
    }

    #[test]
    fn encoded_length_matches_payload() {
        let frame = make_frame(4, &[9u8; MAX_PAYLOAD]);
        assert_eq!(frame.header().length as usize, MAX_PAYLOAD);
        let bytes = frame.encode();
        assert_eq!(declared_len(&bytes), Some(MAX_PAYLOAD as u16));
        assert_eq!(bytes.len(), frame_len(MAX_PAYLOAD as u16));
        assert_eq!(Frame::decode(&bytes).unwrap().into_payload().len(), MAX_PAYLOAD);
    }

    #[test]
    fn oversized_payload_rejected() {
        let err = Frame::new(SRC, DST, 0, vec![0; MAX_PAYLOAD + 1]).unwrap_err();
        assert_eq!(err, FrameError::PayloadTooLarge(MAX_PAYLOAD + 1));
        assert!(Frame::new(SRC, DST, 0, vec![0; MAX_PAYLOAD]).is_ok());
    }

    #[test]
    fn ack_wire_layout() {
        let bytes = Ack::ack(9).encode();
        assert_eq!(bytes[0], 0x06);
        assert_eq!(bytes[1], 9);
        assert_eq!(&bytes[2..], &crc32(&[0x06, 9]).to_be_bytes());

        let nak = Ack::nak(200).encode();
        assert_eq!(nak[0], 0x15);
        assert_eq!(Ack::decode(&nak).unwrap(), Ack::nak(200));
    }

    #[test]
    fn corrupted_ack_is_rejected() {
        let mut bytes = Ack::ack(5).encode();
        bytes[1] ^= 0x10;
        assert!(matches!(Ack::decode(&bytes), Err(FrameError::Integrity { .. })));
    }

    #[test]
    fn unknown_ack_type_is_rejected() {
        let body = [0x42, 1];
        let crc = crc32(&body).to_be_bytes();
        let bytes = [body[0], body[1], crc[0], crc[1], crc[2], crc[3]];
        assert_eq!(Ack::decode(&bytes), Err(FrameError::UnknownAckType(0x42)));
    }

    #[test]
    fn short_ack_is_rejected() {
        assert_eq!(
            Ack::decode(&[0x06, 1, 0]),
            Err(FrameError::TooShort { len: 3, min: ACK_LEN })
        );
    }

    #[test]
    fn random_mac_is_local_unicast() {
        let mut rng = StdRng::seed_from_u64(1);
        for _ in 0..32 {
            let mac = MacAddr::random(&mut rng);
            assert_eq!(mac.0[0] & 0x01, 0, "multicast bit set");
            assert_eq!(mac.0[0] & 0x02, 0x02, "local bit clear");
        }
    }

    #[test]
    fn mac_display_is_colon_hex() {
        let mac = MacAddr([0x02, 0xab, 0x00, 0x10, 0xff, 0x01]);
        assert_eq!(mac.to_string(), "02:ab:00:10:ff:01");
    }
}
