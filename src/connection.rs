//! Per-socket connection: independent read and write pipelines.
//!
//! Each connection owns two tokio tasks:
//! - Read task: `ReadingHeader -> ReadingBody -> ReadingHeader ...`, handing
//!   every decoded message to the owner as a [`ConnectionEvent`]
//! - Write task: drains a FIFO queue, one frame in flight at a time
//!
//! Either side failing (or an explicit close) cancels both. The read task
//! always exits last and reports exactly one [`ConnectionEvent::Closed`].

// Rust guideline compliant 2026-02

use std::fmt;
use std::io;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::io::AsyncWriteExt;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::framing::{self, FrameError};
use crate::message::Message;
use crate::participant::{Participant, ParticipantId};

/// Notification from a connection to whoever owns it.
#[derive(Debug)]
pub enum ConnectionEvent {
    /// A complete message arrived from the peer.
    Message {
        /// Connection that received it.
        id: ParticipantId,
        /// The decoded message.
        message: Message,
    },
    /// The connection reached its terminal state. Sent exactly once.
    Closed {
        /// Connection that closed.
        id: ParticipantId,
        /// Why it closed.
        reason: CloseReason,
    },
}

/// Why a connection closed.
#[derive(Debug)]
pub enum CloseReason {
    /// Local side asked for it (`close`, `finish`, or the owner went away).
    Requested,
    /// Peer closed the stream between frames.
    PeerClosed,
    /// Reading or decoding a frame failed.
    ReadFailed(FrameError),
    /// Writing a frame failed.
    WriteFailed(io::Error),
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Requested => write!(f, "closed locally"),
            Self::PeerClosed => write!(f, "peer closed"),
            Self::ReadFailed(e) => write!(f, "read failed: {e}"),
            Self::WriteFailed(e) => write!(f, "write failed: {e}"),
        }
    }
}

/// Entry in the outbound queue.
#[derive(Debug)]
enum Outbound {
    Message(Message),
    /// Flush everything queued before this marker, then close.
    Finish,
}

/// State shared by the handle and both pipeline tasks.
#[derive(Debug)]
struct Shared {
    id: ParticipantId,
    peer: Option<SocketAddr>,
    outbound_tx: UnboundedSender<Outbound>,
    cancel: CancellationToken,
    /// First close reason recorded wins.
    close_reason: Mutex<Option<CloseReason>>,
}

impl Shared {
    fn close(&self, reason: CloseReason) {
        {
            let mut slot = self
                .close_reason
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            if slot.is_none() {
                *slot = Some(reason);
            }
        }
        self.cancel.cancel();
    }

    /// Peer address for log lines.
    fn peer_label(&self) -> String {
        self.peer
            .map_or_else(|| "unknown peer".to_string(), |addr| addr.to_string())
    }

    fn take_reason(&self) -> CloseReason {
        self.close_reason
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .unwrap_or(CloseReason::Requested)
    }
}

/// Cheap, cloneable handle for queueing messages on a connection.
///
/// Holding a handle does not keep the socket open; once the connection
/// closes, [`ConnectionHandle::send`] returns `false`.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    shared: Arc<Shared>,
}

impl ConnectionHandle {
    /// Connection identity.
    pub fn id(&self) -> ParticipantId {
        self.shared.id
    }

    /// Remote address, if the socket reported one.
    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.shared.peer
    }

    /// Append a message to the outbound queue.
    ///
    /// Returns `false` if the connection is closed.
    pub fn send(&self, message: Message) -> bool {
        if self.shared.cancel.is_cancelled() {
            return false;
        }
        self.shared
            .outbound_tx
            .send(Outbound::Message(message))
            .is_ok()
    }

    /// Close once everything queued so far has been written.
    ///
    /// Returns `false` if the connection is already closed.
    pub fn finish(&self) -> bool {
        if self.shared.cancel.is_cancelled() {
            return false;
        }
        self.shared.outbound_tx.send(Outbound::Finish).is_ok()
    }

    /// Close immediately, abandoning any pending read or queued write.
    pub fn close(&self) {
        self.shared.close(CloseReason::Requested);
    }

    /// Whether the connection has closed (or is closing).
    pub fn is_closed(&self) -> bool {
        self.shared.cancel.is_cancelled()
    }
}

impl Participant for ConnectionHandle {
    fn id(&self) -> ParticipantId {
        self.shared.id
    }

    fn deliver(&self, message: Message) -> bool {
        self.send(message)
    }
}

/// Owning side of a connection: the handle plus both pipeline tasks.
#[derive(Debug)]
pub struct Connection {
    handle: ConnectionHandle,
    read_handle: JoinHandle<()>,
    write_handle: JoinHandle<()>,
}

impl Connection {
    /// Start both pipelines for `stream`.
    ///
    /// Messages and the final close notification are sent on `events`,
    /// converted into the owner's event type.
    pub fn spawn<E>(stream: TcpStream, events: UnboundedSender<E>) -> Self
    where
        E: From<ConnectionEvent> + Send + 'static,
    {
        let peer = stream.peer_addr().ok();
        let (reader, writer) = stream.into_split();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();

        let shared = Arc::new(Shared {
            id: ParticipantId::new(),
            peer,
            outbound_tx,
            cancel: CancellationToken::new(),
            close_reason: Mutex::new(None),
        });

        let read_handle = tokio::spawn(read_loop(Arc::clone(&shared), reader, events));
        let write_handle = tokio::spawn(write_loop(Arc::clone(&shared), writer, outbound_rx));

        Self {
            handle: ConnectionHandle { shared },
            read_handle,
            write_handle,
        }
    }

    /// Connection identity.
    pub fn id(&self) -> ParticipantId {
        self.handle.id()
    }

    /// A new handle to this connection.
    pub fn handle(&self) -> ConnectionHandle {
        self.handle.clone()
    }

    /// See [`ConnectionHandle::send`].
    pub fn send(&self, message: Message) -> bool {
        self.handle.send(message)
    }

    /// See [`ConnectionHandle::finish`].
    pub fn finish(&self) -> bool {
        self.handle.finish()
    }

    /// See [`ConnectionHandle::close`].
    pub fn close(&self) {
        self.handle.close();
    }

    /// Wait for both pipelines to exit.
    pub async fn join(self) {
        let id = self.handle.id();
        for (side, task) in [("read", self.read_handle), ("write", self.write_handle)] {
            if let Err(e) = task.await {
                log::error!("[Conn] {id} {side} task failed: {e}");
            }
        }
    }
}

/// Read pipeline. Owns the close notification.
async fn read_loop<E>(shared: Arc<Shared>, mut reader: OwnedReadHalf, events: UnboundedSender<E>)
where
    E: From<ConnectionEvent> + Send + 'static,
{
    let id = shared.id;
    let peer = shared.peer_label();

    loop {
        let result = tokio::select! {
            biased;
            () = shared.cancel.cancelled() => break,
            result = framing::read_message(&mut reader) => result,
        };

        match result {
            Ok(message) => {
                if events.send(E::from(ConnectionEvent::Message { id, message })).is_err() {
                    log::debug!("[Conn] {id} owner dropped, closing");
                    shared.close(CloseReason::Requested);
                    break;
                }
            }
            Err(e) if e.is_eof() => {
                shared.close(CloseReason::PeerClosed);
                break;
            }
            Err(e) => {
                log::warn!("[Conn] {id} ({peer}) read error: {e}");
                shared.close(CloseReason::ReadFailed(e));
                break;
            }
        }
    }

    let reason = shared.take_reason();
    log::debug!("[Conn] {id} ({peer}) read pipeline stopped: {reason}");
    let _ = events.send(E::from(ConnectionEvent::Closed { id, reason }));
}

/// Write pipeline. At most one frame is in flight.
async fn write_loop(
    shared: Arc<Shared>,
    mut writer: OwnedWriteHalf,
    mut outbound_rx: UnboundedReceiver<Outbound>,
) {
    let id = shared.id;

    loop {
        let next = tokio::select! {
            biased;
            () = shared.cancel.cancelled() => break,
            next = outbound_rx.recv() => next,
        };

        match next {
            Some(Outbound::Message(message)) => {
                let frame = framing::encode(&message);
                let written = tokio::select! {
                    biased;
                    () = shared.cancel.cancelled() => break,
                    written = writer.write_all(&frame) => written,
                };
                if let Err(e) = written {
                    log::warn!("[Conn] {id} ({}) write error: {e}", shared.peer_label());
                    shared.close(CloseReason::WriteFailed(e));
                    break;
                }
            }
            Some(Outbound::Finish) => {
                if let Err(e) = writer.shutdown().await {
                    log::debug!("[Conn] {id} shutdown after flush failed: {e}");
                }
                shared.close(CloseReason::Requested);
                break;
            }
            None => break,
        }
    }

    outbound_rx.close();
    let discarded = outbound_rx.len();
    if discarded > 0 {
        log::debug!("[Conn] {id} discarded {discarded} queued messages");
    }
}
