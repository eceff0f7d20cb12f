//! Connection - Handles an individual IRC client.
//!
//! Each Connection runs in its own Tokio task. One `select!` loop reads
//! lines, dispatches them in arrival order, and drains the connection's
//! outbound queue, so every write to the socket goes through one sink:
//!
//! ```text
//!   socket ──▶ FramedRead<LineCodec> ──▶ Registry::dispatch ──┐
//!                                                            ▼
//!   socket ◀── FramedWrite<LineCodec> ◀── outbound queue ◀── handlers,
//!                                                            broadcasters
//! ```

use echohub_proto::{LineCodec, Message, MessageParseError};
use futures_util::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio_util::codec::{FramedRead, FramedWrite};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::error::HandlerError;
use crate::handlers::{Context, HandshakeState, IrcServices, Registry};
use crate::state::{IrcConnection, irc_connection_id};

/// Why the loop ended.
#[derive(Debug)]
enum Exit {
    Eof,
    Quit,
    Cancelled,
    Io(String),
}

/// A client connection handler.
pub struct Connection<S> {
    conn: Arc<IrcConnection>,
    outbound: mpsc::UnboundedReceiver<Message>,
    stream: S,
    services: Arc<IrcServices>,
    registry: Arc<Registry>,
}

impl<S> Connection<S>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    /// Register a new connection. It is visible to broadcasters from here on,
    /// though it receives nothing until it joins a channel.
    pub fn new(
        stream: S,
        addr: SocketAddr,
        services: Arc<IrcServices>,
        registry: Arc<Registry>,
        shutdown: CancellationToken,
    ) -> Self {
        let (conn, outbound) = IrcConnection::new(irc_connection_id(), addr, shutdown);
        services.connections.insert(Arc::clone(&conn));
        Self {
            conn,
            outbound,
            stream,
            services,
            registry,
        }
    }

    pub fn id(&self) -> &str {
        self.conn.id()
    }

    /// Serve the client until it quits, the socket fails or shutdown fires.
    /// Cleanup runs exactly once on the way out.
    #[instrument(skip(self), fields(conn = %self.conn.id(), addr = %self.conn.addr()), name = "connection")]
    pub async fn run(self) {
        let Self {
            conn,
            mut outbound,
            stream,
            services,
            registry,
        } = self;

        let (reader, writer) = tokio::io::split(stream);
        let mut lines = FramedRead::new(reader, LineCodec::new());
        let mut sink = FramedWrite::new(writer, LineCodec::new());
        let mut handshake = HandshakeState::default();
        let cancel = conn.cancel_token().clone();

        let exit = loop {
            tokio::select! {
                _ = cancel.cancelled() => break Exit::Cancelled,

                Some(msg) = outbound.recv() => {
                    conn.mark_written();
                    if let Err(e) = sink.send(msg).await {
                        break Exit::Io(e.to_string());
                    }
                }

                line = lines.next() => {
                    let line = match line {
                        None => break Exit::Eof,
                        Some(Err(e)) => break Exit::Io(e.to_string()),
                        Some(Ok(line)) => line,
                    };
                    conn.touch();
                    if line.trim().is_empty() {
                        continue;
                    }

                    let mut ctx = Context {
                        conn: &conn,
                        services: &services,
                        handshake: &mut handshake,
                    };
                    let msg = match Message::parse(&line) {
                        Ok(msg) => msg,
                        Err(MessageParseError::InvalidCommand(token)) => {
                            debug!(command = %token, "Unparseable command token");
                            if let Err(HandlerError::Send(e)) = registry.reject_command(&ctx, &token) {
                                break Exit::Io(e.to_string());
                            }
                            continue;
                        }
                        Err(e) => {
                            debug!(error = %e, "Ignoring malformed line");
                            continue;
                        }
                    };

                    match registry.dispatch(&mut ctx, &msg).await {
                        Ok(()) => {}
                        Err(HandlerError::Quit(_)) => break Exit::Quit,
                        Err(HandlerError::Send(e)) => break Exit::Io(e.to_string()),
                        Err(e) => warn!(command = %msg.command, error = %e, "Handler failed"),
                    }
                }
            }
        };

        // Whatever is still queued (the ERROR line of a QUIT or a forced
        // disconnect) goes out before the socket closes.
        while let Ok(msg) = outbound.try_recv() {
            conn.mark_written();
            if sink.send(msg).await.is_err() {
                break;
            }
        }
        let _ = sink.close().await;

        let was_registered = conn.is_registered();
        services.connections.remove(conn.id());
        if was_registered {
            services.chat.disconnect(conn.id()).await;
            crate::metrics::irc_connection_closed();
        }
        info!(reason = ?exit, nick = %conn.nick_or_star(), "Connection closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::testing;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream};

    struct Peer {
        reader: BufReader<tokio::io::ReadHalf<DuplexStream>>,
        writer: tokio::io::WriteHalf<DuplexStream>,
    }

    impl Peer {
        async fn send(&mut self, line: &str) {
            self.writer
                .write_all(format!("{}\r\n", line).as_bytes())
                .await
                .unwrap();
        }

        async fn recv(&mut self) -> Option<String> {
            let mut line = String::new();
            match self.reader.read_line(&mut line).await.unwrap() {
                0 => None,
                _ => Some(line.trim_end().to_string()),
            }
        }

        /// Read until a line contains `needle`.
        async fn expect(&mut self, needle: &str) -> String {
            loop {
                let line = self.recv().await.expect("stream ended");
                if line.contains(needle) {
                    return line;
                }
            }
        }
    }

    async fn spawn(
        services: &Arc<IrcServices>,
        shutdown: CancellationToken,
    ) -> (Peer, tokio::task::JoinHandle<()>) {
        let (client, server) = tokio::io::duplex(16 * 1024);
        let connection = Connection::new(
            server,
            "127.0.0.1:40000".parse().unwrap(),
            Arc::clone(services),
            Arc::new(Registry::new()),
            shutdown,
        );
        let task = tokio::spawn(connection.run());
        let (reader, writer) = tokio::io::split(client);
        (
            Peer {
                reader: BufReader::new(reader),
                writer,
            },
            task,
        )
    }

    #[tokio::test]
    async fn quit_flushes_error_and_cleans_up() {
        let services = Arc::new(testing::services(None).await);
        let (mut peer, task) = spawn(&services, CancellationToken::new()).await;

        peer.send("PASS secret").await;
        peer.send("NICK alice").await;
        peer.send("USER alice 0 * :Alice").await;
        peer.expect(" 001 ").await;
        assert!(services.chat.presence().is_online("alice"));

        peer.send("QUIT :see you").await;
        assert_eq!(
            peer.expect("ERROR").await,
            "ERROR :Closing Link: alice (see you)"
        );
        task.await.unwrap();
        assert!(services.connections.is_empty());
        assert!(!services.chat.presence().is_online("alice"));
    }

    #[tokio::test]
    async fn garbage_does_not_drop_the_client() {
        let services = Arc::new(testing::services(None).await);
        let (mut peer, _task) = spawn(&services, CancellationToken::new()).await;

        peer.send(":::").await;
        peer.send("").await;
        peer.send("PING :still-here").await;
        assert_eq!(
            peer.expect("PONG").await,
            ":irc.test PONG irc.test :still-here"
        );
    }

    #[tokio::test]
    async fn bad_command_token_gets_unknown_command() {
        let services = Arc::new(testing::services(None).await);
        let (mut peer, _task) = spawn(&services, CancellationToken::new()).await;

        peer.send("PRIV-MSG #x :hi").await;
        assert_eq!(
            peer.expect(" 421 ").await,
            ":irc.test 421 * PRIV-MSG :Unknown command"
        );

        peer.send("PASS pw").await;
        peer.send("NICK dave").await;
        peer.send("USER dave 0 * :Dave").await;
        peer.expect(" 001 ").await;
        peer.send("JO!N #general").await;
        assert_eq!(
            peer.expect(" 421 ").await,
            ":irc.test 421 dave JO!N :Unknown command"
        );
    }

    #[tokio::test]
    async fn shutdown_token_ends_the_loop() {
        let services = Arc::new(testing::services(None).await);
        let shutdown = CancellationToken::new();
        let (mut peer, task) = spawn(&services, shutdown.child_token()).await;

        peer.send("PASS hunter2").await;
        peer.send("NICK bob").await;
        peer.send("USER bob 0 * :Bob").await;
        peer.expect(" 001 ").await;

        shutdown.cancel();
        task.await.unwrap();
        assert!(!services.chat.presence().is_online("bob"));
    }

    #[tokio::test]
    async fn eof_runs_disconnect() {
        let services = Arc::new(testing::services(None).await);
        let (mut peer, task) = spawn(&services, CancellationToken::new()).await;
        peer.send("PASS pw").await;
        peer.send("NICK carol").await;
        peer.send("USER carol 0 * :Carol").await;
        peer.expect(" 001 ").await;

        drop(peer);
        task.await.unwrap();
        assert!(!services.chat.presence().is_online("carol"));
    }
}
