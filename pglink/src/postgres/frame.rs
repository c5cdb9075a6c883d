//! Backend message framing.
//!
//! ```text
//! ┏━━━━┳━━━━━━━━━━━━━━━━━━━┳━━━━━━━━━━━━┓
//! ┃ Ty ┃       Length      ┃    Body    ┃
//! ┣━━━━╋━━━━━━━━━━━━━━━━━━━╋━━━━━━━━━━━━┫
//! ┃ u8 ┃        i32        ┃ Length - 4 ┃
//! ┗━━━━┻━━━━━━━━━━━━━━━━━━━┻━━━━━━━━━━━━┛
//! ```
//!
//! Length counts itself and the body, but not the type byte.
use bytes::{Buf, Bytes, BytesMut};
use std::fmt;

use crate::ext::FmtExt;

/// Message type byte and length.
pub const HEADER_LEN: usize = 1 + 4;

/// Largest frame accepted from the backend, counted from the type byte.
///
/// The body must be smaller than 1 MiB.
pub const MAX_FRAME_LEN: usize = HEADER_LEN + 1024 * 1024 - 1;

/// A raw backend message, type byte and undecoded body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub msgtype: u8,
    pub body: Bytes,
}

impl Frame {
    /// Size of this frame on the wire.
    pub fn wire_len(&self) -> usize {
        HEADER_LEN + self.body.len()
    }
}

/// Try to split the next complete frame from the front of `buf`.
///
/// Returns `Ok(None)` when more bytes are required, in which case `buf` is untouched.
///
/// The header is validated as soon as it is buffered, so a nonsense or oversized frame is
/// rejected without ever waiting for its body.
pub fn decode_next(buf: &mut BytesMut) -> Result<Option<Frame>, FrameError> {
    let Some(mut header) = buf.get(..HEADER_LEN) else {
        return Ok(None);
    };

    let msgtype = header.get_u8();
    let len = header.get_i32();

    if len < 4 {
        return Err(FrameError::NonsenseMessageLength { msgtype, frame_len: 1 + i64::from(len) });
    }

    // `len` is positive and counts the 4 length bytes
    let frame_len = 1 + len as usize;

    if frame_len > MAX_FRAME_LEN {
        return Err(FrameError::MessageTooLong { msgtype, frame_len });
    }

    if buf.len() < frame_len {
        return Ok(None);
    }

    buf.advance(HEADER_LEN);
    let body = buf.split_to(frame_len - HEADER_LEN).freeze();

    Ok(Some(Frame { msgtype, body }))
}

/// Number of bytes that must be buffered before [`decode_next`] can make progress.
pub fn required_len(buf: &[u8]) -> usize {
    match buf.get(1..HEADER_LEN) {
        Some(len) => {
            let len = i32::from_be_bytes([len[0], len[1], len[2], len[3]]);
            1 + usize::try_from(len).unwrap_or_default()
        }
        None => HEADER_LEN,
    }
}

/// The stream ended, any bytes left in `buf` belong to an incomplete frame.
pub fn eof(buf: &[u8]) -> FrameError {
    FrameError::UnexpectedEof { unconsumed: buf.len() }
}

/// An error when splitting backend messages from the byte stream.
///
/// Every frame error is fatal to the connection, there is no way to resynchronize.
#[derive(Clone, PartialEq, Eq)]
pub enum FrameError {
    /// Declared length is below 4, the length field cannot count itself.
    ///
    /// `frame_len` is the declared frame size counted from the type byte.
    NonsenseMessageLength { msgtype: u8, frame_len: i64 },
    /// Declared frame size, counted from the type byte, is over [`MAX_FRAME_LEN`].
    MessageTooLong { msgtype: u8, frame_len: usize },
    /// The stream ended before a complete frame was received.
    ///
    /// `unconsumed` is the number of bytes received for the incomplete frame, zero if the
    /// stream ended exactly between two frames.
    UnexpectedEof { unconsumed: usize },
}

impl FrameError {
    /// Returns `true` if the stream ended.
    pub fn is_eof(&self) -> bool {
        matches!(self, FrameError::UnexpectedEof { .. })
    }
}

impl std::error::Error for FrameError { }

impl fmt::Display for FrameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            FrameError::NonsenseMessageLength { msgtype, frame_len } => write!(
                f,
                "nonsense message length: `{}` frame declares {frame_len} bytes, at least {HEADER_LEN} required",
                [msgtype].lossy(),
            ),
            FrameError::MessageTooLong { msgtype, frame_len } => write!(
                f,
                "message too long: `{}` frame declares {frame_len} bytes, limit is {MAX_FRAME_LEN}",
                [msgtype].lossy(),
            ),
            FrameError::UnexpectedEof { unconsumed: 0 } => {
                f.write_str("unexpected EOF: connection closed by server")
            }
            FrameError::UnexpectedEof { unconsumed } => write!(
                f,
                "unexpected EOF: connection closed with {unconsumed} unconsumed bytes of an incomplete message",
            ),
        }
    }
}

impl fmt::Debug for FrameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            FrameError::NonsenseMessageLength { frame_len, .. } => write!(f, "NonsenseMessageLength({frame_len})"),
            FrameError::MessageTooLong { frame_len, .. } => write!(f, "MessageTooLong({frame_len})"),
            FrameError::UnexpectedEof { unconsumed } => write!(f, "UnexpectedEof({unconsumed})"),
        }
    }
}

#[cfg(test)]
mod test {
    use bytes::BufMut;

    use super::*;

    fn frame(msgtype: u8, body: &[u8]) -> BytesMut {
        let mut buf = BytesMut::new();
        buf.put_u8(msgtype);
        buf.put_i32(4 + body.len() as i32);
        buf.put_slice(body);
        buf
    }

    #[test]
    fn need_header() {
        let mut buf = BytesMut::from(&b"Z\0\0"[..]);
        assert_eq!(decode_next(&mut buf).unwrap(), None);
        assert_eq!(buf.len(), 3);
        assert_eq!(required_len(&buf), HEADER_LEN);
    }

    #[test]
    fn need_body() {
        let mut buf = frame(b'Z', b"I");
        buf.truncate(5);
        assert_eq!(decode_next(&mut buf).unwrap(), None);
        assert_eq!(required_len(&buf), 6);
    }

    #[test]
    fn complete_frames() {
        let mut buf = frame(b'Z', b"I");
        buf.extend_from_slice(&frame(b'1', b""));
        buf.extend_from_slice(b"2\0");

        let first = decode_next(&mut buf).unwrap().unwrap();
        assert_eq!(first.msgtype, b'Z');
        assert_eq!(&first.body[..], b"I");
        assert_eq!(first.wire_len(), 6);

        let second = decode_next(&mut buf).unwrap().unwrap();
        assert_eq!(second.msgtype, b'1');
        assert!(second.body.is_empty());

        assert_eq!(decode_next(&mut buf).unwrap(), None);
        assert_eq!(&buf[..], b"2\0");
    }

    #[test]
    fn nonsense_length() {
        let mut buf = BytesMut::from(&b"R\0\0\0\x03"[..]);
        let err = decode_next(&mut buf).unwrap_err();
        assert_eq!(err, FrameError::NonsenseMessageLength { msgtype: b'R', frame_len: 4 });
    }

    #[test]
    fn negative_length() {
        let mut buf = BytesMut::from(&b"D\xff\xff\xff\xff"[..]);
        let err = decode_next(&mut buf).unwrap_err();
        assert_eq!(err, FrameError::NonsenseMessageLength { msgtype: b'D', frame_len: 0 });
    }

    #[test]
    fn too_long_rejected_from_header_alone() {
        let mut buf = BytesMut::new();
        buf.put_u8(b'D');
        buf.put_i32(4 + 1024 * 1024);
        let err = decode_next(&mut buf).unwrap_err();
        assert_eq!(err, FrameError::MessageTooLong { msgtype: b'D', frame_len: 1_048_581 });
        assert!(err.to_string().contains("1048581"));
    }

    #[test]
    fn largest_frame_accepted() {
        let body = vec![0u8; 1024 * 1024 - 1];
        let mut buf = frame(b'D', &body);
        assert_eq!(buf.len(), MAX_FRAME_LEN);
        let msg = decode_next(&mut buf).unwrap().unwrap();
        assert_eq!(msg.body.len(), body.len());
    }

    #[test]
    fn eof_counts_partial_frame() {
        let mut buf = frame(b'C', b"SELECT 1\0");
        buf.truncate(8);
        assert_eq!(decode_next(&mut buf).unwrap(), None);
        assert_eq!(eof(&buf), FrameError::UnexpectedEof { unconsumed: 8 });
        assert!(eof(&[]).is_eof());
    }
}
