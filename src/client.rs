//! Interactive chat client driver.
//!
//! Bridges a line-oriented input/output pair (stdin/stdout in the binary)
//! to one [`Connection`]:
//!
//! ```text
//! input lines --send_line--> Connection write queue --frames--> server
//! output     <--body + \n--- ConnectionEvent::Message <--frames-- server
//! ```

use std::fmt;

use anyhow::{Context, Result};
use bytes::Bytes;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpStream, ToSocketAddrs};
use tokio::sync::mpsc::{self, UnboundedReceiver};

use crate::connection::{CloseReason, Connection, ConnectionEvent};
use crate::message::Message;

/// A connected client.
#[derive(Debug)]
pub struct ChatClient {
    conn: Connection,
    events: UnboundedReceiver<ConnectionEvent>,
}

impl ChatClient {
    /// Resolve `addr` and connect.
    ///
    /// # Errors
    ///
    /// Returns an error naming `addr` if resolution or connection fails.
    pub async fn connect<A>(addr: A) -> Result<Self>
    where
        A: ToSocketAddrs + fmt::Display,
    {
        let stream = TcpStream::connect(&addr)
            .await
            .with_context(|| format!("connect failed: {addr}"))?;
        if let Err(e) = stream.set_nodelay(true) {
            log::debug!("[Client] set_nodelay failed: {e}");
        }
        log::info!("[Client] Connected to {addr}");
        Ok(Self::from_stream(stream))
    }

    /// Wrap an already connected stream.
    pub fn from_stream(stream: TcpStream) -> Self {
        let (tx, events) = mpsc::unbounded_channel();
        let conn = Connection::spawn(stream, tx);
        Self { conn, events }
    }

    /// Queue one line of input, cut to the maximum body length.
    ///
    /// Returns `false` if the connection is already closed.
    pub fn send_line(&self, line: &[u8]) -> bool {
        self.conn
            .send(Message::truncated(Bytes::copy_from_slice(line)))
    }

    /// Pump `input` lines to the server and broadcasts to `output` until
    /// the connection closes.
    ///
    /// Input EOF flushes everything already queued, then closes.
    ///
    /// # Errors
    ///
    /// Returns an error if writing to `output` fails.
    pub async fn run<I, O>(mut self, input: I, output: O) -> Result<()>
    where
        I: AsyncBufRead + Unpin,
        O: AsyncWrite + Unpin,
    {
        let result = self.pump(input, output).await;
        self.conn.close();
        self.conn.join().await;
        result
    }

    async fn pump<I, O>(&mut self, mut input: I, mut output: O) -> Result<()>
    where
        I: AsyncBufRead + Unpin,
        O: AsyncWrite + Unpin,
    {
        let mut line = Vec::new();
        let mut input_done = false;

        loop {
            tokio::select! {
                event = self.events.recv() => match event {
                    Some(ConnectionEvent::Message { message, .. }) => {
                        output
                            .write_all(message.body())
                            .await
                            .context("Failed to write output")?;
                        output.write_all(b"\n").await.context("Failed to write output")?;
                        output.flush().await.context("Failed to flush output")?;
                    }
                    Some(ConnectionEvent::Closed { reason, .. }) => {
                        match reason {
                            CloseReason::Requested | CloseReason::PeerClosed => {
                                log::info!("[Client] Connection closed: {reason}");
                            }
                            _ => log::warn!("[Client] Connection closed: {reason}"),
                        }
                        return Ok(());
                    }
                    None => return Ok(()),
                },
                // Partial reads stay in `line` if the other branch wins.
                read = input.read_until(b'\n', &mut line), if !input_done => match read {
                    Ok(0) => {
                        log::debug!("[Client] Input closed, flushing and disconnecting");
                        input_done = true;
                        self.conn.finish();
                    }
                    Ok(_) => {
                        self.send_line(strip_line_ending(&line));
                        line.clear();
                    }
                    Err(e) => {
                        log::warn!("[Client] Input read failed: {e}");
                        input_done = true;
                        self.conn.finish();
                    }
                },
            }
        }
    }
}

/// Drop a trailing `\n` and a `\r` just before it.
fn strip_line_ending(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    line.strip_suffix(b"\r").unwrap_or(line)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use tokio::io::{AsyncReadExt, BufReader};
    use tokio::net::TcpListener;

    use crate::constants::MAX_BODY_LEN;
    use crate::framing;

    const WAIT: Duration = Duration::from_secs(2);

    /// A client plus the server-side socket it is talking to.
    async fn connected() -> (ChatClient, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (client, accepted) = tokio::join!(ChatClient::connect(addr), listener.accept());
        (client.unwrap(), accepted.unwrap().0)
    }

    async fn server_recv(server: &mut TcpStream) -> Vec<u8> {
        tokio::time::timeout(WAIT, framing::read_message(server))
            .await
            .expect("Timed out waiting for client frame")
            .expect("Frame read failed")
            .body()
            .to_vec()
    }

    #[test]
    fn test_strip_line_ending() {
        assert_eq!(strip_line_ending(b"hi\n"), b"hi");
        assert_eq!(strip_line_ending(b"hi\r\n"), b"hi");
        assert_eq!(strip_line_ending(b"hi"), b"hi");
        assert_eq!(strip_line_ending(b"a\rb\n"), b"a\rb");
        assert_eq!(strip_line_ending(b"\n"), b"");
    }

    #[tokio::test]
    async fn test_connect_failure_names_address() {
        // Bind then drop to get a port nobody is listening on.
        let addr = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap()
        };
        let err = ChatClient::connect(addr).await.unwrap_err();
        let shown = format!("{err:#}");
        assert!(shown.starts_with("connect failed"), "{shown}");
        assert!(shown.contains(&addr.to_string()), "{shown}");
    }

    #[tokio::test]
    async fn test_send_line_truncates_long_input() {
        let (client, mut server) = connected().await;

        assert!(client.send_line(&vec![b'z'; MAX_BODY_LEN + 100]));
        let body = server_recv(&mut server).await;
        assert_eq!(body.len(), MAX_BODY_LEN);
    }

    #[tokio::test]
    async fn test_run_sends_lines_and_flushes_on_eof() {
        let (client, mut server) = connected().await;

        // Last line has no newline and must still be sent.
        let input = BufReader::new(&b"one\r\ntwo\n\nthree"[..]);
        let (output, _output_peer) = tokio::io::duplex(1024);
        let run = tokio::spawn(client.run(input, output));

        for expected in [&b"one"[..], b"two", b"", b"three"] {
            assert_eq!(server_recv(&mut server).await, expected);
        }
        let eof = tokio::time::timeout(WAIT, framing::read_message(&mut server))
            .await
            .unwrap()
            .unwrap_err();
        assert!(eof.is_eof());

        tokio::time::timeout(WAIT, run)
            .await
            .expect("client should stop after input EOF")
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_run_prints_broadcasts_and_stops_when_server_closes() {
        let (client, mut server) = connected().await;

        let (_input_peer, input) = tokio::io::duplex(64);
        let (output, mut output_peer) = tokio::io::duplex(1024);
        let run = tokio::spawn(client.run(BufReader::new(input), output));

        for text in ["hello", "world"] {
            let frame = framing::encode(&Message::new(text.as_bytes().to_vec()).unwrap());
            server.write_all(&frame).await.unwrap();
        }
        drop(server);

        // Input is still open; the server closing alone must end the run.
        tokio::time::timeout(WAIT, run)
            .await
            .expect("client should stop when the server closes")
            .unwrap()
            .unwrap();

        let mut printed = String::new();
        output_peer.read_to_string(&mut printed).await.unwrap();
        assert_eq!(printed, "hello\nworld\n");
    }
}
