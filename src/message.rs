//! The chat message value carried by every frame.

use bytes::Bytes;

use crate::constants::MAX_BODY_LEN;
use crate::framing::FrameError;

/// One chat message: an immutable body of at most [`MAX_BODY_LEN`] bytes.
///
/// The body is reference-counted, so cloning a message for every member of
/// a room does not copy the payload.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Message {
    body: Bytes,
}

impl Message {
    /// Create a message, rejecting bodies longer than [`MAX_BODY_LEN`].
    ///
    /// # Errors
    ///
    /// Returns [`FrameError::InvalidLength`] carrying the rejected length.
    pub fn new(body: impl Into<Bytes>) -> Result<Self, FrameError> {
        let body = body.into();
        if body.len() > MAX_BODY_LEN {
            return Err(FrameError::InvalidLength(body.len()));
        }
        Ok(Self { body })
    }

    /// Create a message, silently cutting the body at [`MAX_BODY_LEN`] bytes.
    pub fn truncated(body: impl Into<Bytes>) -> Self {
        let mut body = body.into();
        if body.len() > MAX_BODY_LEN {
            log::debug!(
                "Truncating {}-byte message body to {MAX_BODY_LEN} bytes",
                body.len()
            );
            body.truncate(MAX_BODY_LEN);
        }
        Self { body }
    }

    /// Wrap a body the codec has already bounds-checked.
    pub(crate) fn from_trusted(body: Bytes) -> Self {
        debug_assert!(body.len() <= MAX_BODY_LEN);
        Self { body }
    }

    /// Message body bytes.
    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Body length in bytes.
    pub fn len(&self) -> usize {
        self.body.len()
    }

    /// Whether the body is empty.
    pub fn is_empty(&self) -> bool {
        self.body.is_empty()
    }
}
