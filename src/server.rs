//! TCP chat server.
//!
//! One accept task per listening socket hands new streams to a single
//! event loop. Every listener has its own [`ChatRoom`]; clients on one port
//! never see another port's traffic or history. The loop owns all rooms and
//! the table of live [`Connection`]s, so every join, leave and delivery is
//! processed one at a time in the order events arrive.
//!
//! ```text
//! accept task (port A) ─┐                          ┌─► ChatRoom (A)
//! accept task (port B) ─┼─► ServerEvent queue ─► event loop ─► ChatRoom (B)
//! connection read tasks ┘                          │
//!                                                  └─► Connection table
//! ```

// Rust guideline compliant 2026-02

use std::collections::HashMap;
use std::net::SocketAddr;

use anyhow::{bail, Context, Result};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc::{self, UnboundedSender};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::connection::{Connection, ConnectionEvent};
use crate::constants::ACCEPT_RETRY_DELAY;
use crate::participant::ParticipantId;
use crate::room::ChatRoom;

/// Event delivered to the server event loop.
#[derive(Debug)]
pub enum ServerEvent {
    /// An accept task produced a new socket.
    Accepted {
        /// The accepted stream.
        stream: TcpStream,
        /// Remote address reported by `accept()`.
        peer: SocketAddr,
        /// Index of the listener (and its room) that accepted it.
        room: usize,
    },
    /// A connection read a message or closed.
    Connection(ConnectionEvent),
}

impl From<ConnectionEvent> for ServerEvent {
    fn from(event: ConnectionEvent) -> Self {
        Self::Connection(event)
    }
}

/// Bound, not yet running, chat server.
#[derive(Debug)]
pub struct ChatServer {
    /// Listeners paired with their rooms, in bind order.
    listeners: Vec<(TcpListener, ChatRoom)>,
}

impl ChatServer {
    /// Bind every address in `addrs`, each with a room of its own.
    ///
    /// # Errors
    ///
    /// Returns an error if `addrs` is empty or any address cannot be bound.
    pub async fn bind(addrs: &[SocketAddr], config: &Config) -> Result<Self> {
        if addrs.is_empty() {
            bail!("No listen addresses given");
        }

        let mut listeners = Vec::with_capacity(addrs.len());
        for addr in addrs {
            let listener = TcpListener::bind(addr)
                .await
                .with_context(|| format!("Failed to bind {addr}"))?;
            log::info!("[Server] Listening on {}", listener.local_addr()?);
            listeners.push((listener, ChatRoom::with_history_limit(config.history_limit)));
        }

        Ok(Self { listeners })
    }

    /// Addresses actually bound (useful after binding port 0).
    pub fn local_addrs(&self) -> Vec<SocketAddr> {
        self.listeners
            .iter()
            .filter_map(|(l, _)| l.local_addr().ok())
            .collect()
    }

    /// Run until `shutdown` is cancelled.
    ///
    /// On shutdown the accept tasks stop and every connection is closed.
    pub async fn run(self, shutdown: CancellationToken) -> Result<()> {
        let (event_tx, mut event_rx) = mpsc::unbounded_channel::<ServerEvent>();

        let mut rooms = Vec::with_capacity(self.listeners.len());
        let mut accept_handles: Vec<JoinHandle<()>> = Vec::with_capacity(self.listeners.len());
        for (index, (listener, room)) in self.listeners.into_iter().enumerate() {
            rooms.push(room);
            accept_handles.push(tokio::spawn(accept_loop(
                listener,
                index,
                event_tx.clone(),
                shutdown.clone(),
            )));
        }

        let mut state = ServerState {
            rooms,
            connections: HashMap::new(),
            event_tx,
        };

        loop {
            let event = tokio::select! {
                biased;
                () = shutdown.cancelled() => break,
                event = event_rx.recv() => event,
            };
            match event {
                Some(event) => state.handle_event(event),
                None => break,
            }
        }

        log::info!("[Server] Shutting down");
        for handle in accept_handles {
            handle.abort();
        }
        state.close_all().await;
        Ok(())
    }
}

/// Everything the event loop owns.
#[derive(Debug)]
struct ServerState {
    /// One room per listener, indexed like the listeners.
    rooms: Vec<ChatRoom>,
    /// Owning table of live connections and the room each one joined; rooms
    /// only hold handles.
    connections: HashMap<ParticipantId, (usize, Connection)>,
    /// Cloned into every new connection's read pipeline.
    event_tx: UnboundedSender<ServerEvent>,
}

impl ServerState {
    fn handle_event(&mut self, event: ServerEvent) {
        match event {
            ServerEvent::Accepted { stream, peer, room } => {
                let Some(target) = self.rooms.get_mut(room) else {
                    log::error!("[Server] No room {room} for client from {peer}");
                    return;
                };
                let conn = Connection::spawn(stream, self.event_tx.clone());
                let id = conn.id();
                log::info!("[Server] Client connected: {id} from {peer} (room {room})");

                // Join before any of this connection's own events can be
                // handled: they queue behind the current one.
                target.join(Box::new(conn.handle()));
                self.connections.insert(id, (room, conn));
            }
            ServerEvent::Connection(ConnectionEvent::Message { id, message }) => {
                let Some(room) = self.room_of(id) else {
                    log::debug!("[Server] Dropping message from unknown connection {id}");
                    return;
                };
                let recipients = room.deliver(message);
                log::debug!("[Server] {id} broadcast to {recipients} members");
            }
            ServerEvent::Connection(ConnectionEvent::Closed { id, reason }) => {
                log::info!("[Server] Client disconnected: {id} ({reason})");
                if let Some(room) = self.room_of(id) {
                    room.leave(id);
                }
                self.connections.remove(&id);
            }
        }
    }

    fn room_of(&mut self, id: ParticipantId) -> Option<&mut ChatRoom> {
        let (room, _) = self.connections.get(&id)?;
        self.rooms.get_mut(*room)
    }

    async fn close_all(&mut self) {
        let connections: Vec<(usize, Connection)> =
            self.connections.drain().map(|(_, entry)| entry).collect();
        for (room, conn) in &connections {
            if let Some(room) = self.rooms.get_mut(*room) {
                room.leave(conn.id());
            }
            conn.close();
        }
        for (_, conn) in connections {
            conn.join().await;
        }
    }
}

/// Accept loop for one listener, run as its own tokio task.
async fn accept_loop(
    listener: TcpListener,
    room: usize,
    event_tx: UnboundedSender<ServerEvent>,
    shutdown: CancellationToken,
) {
    loop {
        let accepted = tokio::select! {
            biased;
            () = shutdown.cancelled() => break,
            accepted = listener.accept() => accepted,
        };

        match accepted {
            Ok((stream, peer)) => {
                if let Err(e) = stream.set_nodelay(true) {
                    log::debug!("[Server] set_nodelay failed for {peer}: {e}");
                }
                if event_tx.send(ServerEvent::Accepted { stream, peer, room }).is_err() {
                    log::warn!("[Server] Event loop gone, stopping accept loop");
                    break;
                }
            }
            Err(e) => {
                log::error!("[Server] Accept error: {e}");
                tokio::time::sleep(ACCEPT_RETRY_DELAY).await;
            }
        }
    }
}
