//! Wire protocol codec for chat frames.
//!
//! Every frame is a fixed-width ASCII decimal length followed by the body:
//!
//! ```text
//! [4 bytes: body length, right-justified, space-padded] [body: length bytes]
//! ```
//!
//! For example the body `hello` travels as `"   5hello"`. Bodies longer
//! than [`MAX_BODY_LEN`] are rejected when the header is decoded, before
//! any body bytes are read.

use std::fmt;
use std::io;

use bytes::{BufMut, Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::constants::{HEADER_LEN, MAX_BODY_LEN};
use crate::message::Message;

/// Errors produced while decoding frames.
#[derive(Debug)]
pub enum FrameError {
    /// Declared (or supplied) body length exceeds [`MAX_BODY_LEN`].
    InvalidLength(usize),
    /// Header bytes are not a space-padded decimal number.
    MalformedHeader([u8; HEADER_LEN]),
    /// Underlying read failed, including EOF in the middle of a frame.
    Io(io::Error),
}

impl FrameError {
    /// Whether this error is the peer closing the stream.
    pub fn is_eof(&self) -> bool {
        matches!(self, Self::Io(e) if e.kind() == io::ErrorKind::UnexpectedEof)
    }
}

impl fmt::Display for FrameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidLength(len) => {
                write!(f, "Invalid frame length: {len} bytes (max {MAX_BODY_LEN})")
            }
            Self::MalformedHeader(raw) => {
                write!(f, "Malformed frame header: {:?}", String::from_utf8_lossy(raw))
            }
            Self::Io(e) => write!(f, "Frame I/O error: {e}"),
        }
    }
}

impl std::error::Error for FrameError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for FrameError {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}

/// Encode a message into wire format: header followed by body.
pub fn encode(message: &Message) -> Bytes {
    let body = message.body();
    let mut buf = BytesMut::with_capacity(HEADER_LEN + body.len());
    buf.put_slice(&encode_header(body.len()));
    buf.put_slice(body);
    buf.freeze()
}

/// Render a body length as the fixed-width header.
fn encode_header(len: usize) -> [u8; HEADER_LEN] {
    let text = format!("{len:>width$}", width = HEADER_LEN);
    let mut header = [b' '; HEADER_LEN];
    header.copy_from_slice(&text.as_bytes()[..HEADER_LEN]);
    header
}

/// Parse a frame header into the body length it announces.
///
/// Leading spaces are padding. Anything other than padding followed by at
/// least one ASCII digit is malformed.
///
/// # Errors
///
/// [`FrameError::InvalidLength`] if the length exceeds [`MAX_BODY_LEN`],
/// [`FrameError::MalformedHeader`] if the bytes are not a decimal number.
pub fn decode_header(header: &[u8; HEADER_LEN]) -> Result<usize, FrameError> {
    let digits = {
        let start = header.iter().take_while(|b| **b == b' ').count();
        &header[start..]
    };

    if digits.is_empty() || !digits.iter().all(u8::is_ascii_digit) {
        return Err(FrameError::MalformedHeader(*header));
    }

    let len = digits
        .iter()
        .fold(0usize, |acc, d| acc * 10 + usize::from(d - b'0'));

    if len > MAX_BODY_LEN {
        return Err(FrameError::InvalidLength(len));
    }
    Ok(len)
}

/// Wrap a body whose length was validated by [`decode_header`].
pub fn decode_body(length: usize, mut body: Bytes) -> Message {
    debug_assert_eq!(body.len(), length, "body must match the decoded header");
    body.truncate(length);
    Message::from_trusted(body)
}

/// Read one complete frame from `reader`.
///
/// Reads exactly [`HEADER_LEN`] bytes, validates them, then reads exactly
/// the announced number of body bytes. A rejected header leaves the body
/// unread.
///
/// # Errors
///
/// Any [`FrameError`]; the stream is not usable after an error.
pub async fn read_message<R>(reader: &mut R) -> Result<Message, FrameError>
where
    R: AsyncRead + Unpin,
{
    let mut header = [0u8; HEADER_LEN];
    reader.read_exact(&mut header).await?;
    let length = decode_header(&header)?;

    let mut body = BytesMut::zeroed(length);
    reader.read_exact(&mut body).await?;
    Ok(decode_body(length, body.freeze()))
}
