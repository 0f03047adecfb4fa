//! Application-wide constants for relaychat.
//!
//! Protocol limits and runtime tuning values live here so the codec, the
//! room and the server agree on them.
//!
//! # Categories
//!
//! - **Protocol**: frame header layout and body limits
//! - **Room**: history retention
//! - **Server**: accept loop behaviour

use std::time::Duration;

// ============================================================================
// Protocol
// ============================================================================

/// Width of the ASCII decimal length header that prefixes every frame.
pub const HEADER_LEN: usize = 4;

/// Largest body a single frame may carry, in bytes.
///
/// The header could represent up to 9999, but peers reject anything above
/// this limit.
pub const MAX_BODY_LEN: usize = 512;

// The header must be wide enough to print MAX_BODY_LEN in decimal.
const _: () = assert!(MAX_BODY_LEN < 10usize.pow(HEADER_LEN as u32));

// ============================================================================
// Room
// ============================================================================

/// Number of recent messages a room keeps for replay to new participants.
pub const DEFAULT_HISTORY_LIMIT: usize = 100;

// ============================================================================
// Server
// ============================================================================

/// Back-off after a failed `accept()` before trying again.
///
/// Accept errors are usually resource exhaustion (EMFILE); retrying in a
/// tight loop would spin a core.
pub const ACCEPT_RETRY_DELAY: Duration = Duration::from_millis(100);
