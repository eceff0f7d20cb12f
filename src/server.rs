//! Process wiring: build the shared state once, start every listener, and
//! tear it all down in order.

use std::net::SocketAddr;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::broadcast::{Broadcaster, Broadcasters, HubBroadcaster, IrcBroadcaster};
use crate::chat::{ChatService, ChatSettings, EmbedFetcher, HttpEmbedFetcher, NoopEmbedFetcher};
use crate::config::Config;
use crate::crypto::Envelope;
use crate::db::Database;
use crate::format::IrcFormatter;
use crate::handlers::{IrcServices, ServerInfo};
use crate::hub::{HubConnections, HubGateway};
use crate::network::IrcGateway;
use crate::state::{IrcRegistry, PresenceTracker};

/// A running server.
pub struct Server {
    chat: Arc<ChatService>,
    irc_addr: SocketAddr,
    hub_addr: Option<SocketAddr>,
    shutdown: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl Server {
    /// Open storage, provision, bind listeners and start serving.
    pub async fn start(config: &Config, shutdown: CancellationToken) -> anyhow::Result<Self> {
        let db = Database::new(config.database_path()).await?;
        let envelope = Arc::new(Envelope::new(&config.security.message_key)?);

        let presence = Arc::new(PresenceTracker::new());
        let hub = Arc::new(HubConnections::new());
        let connections = Arc::new(IrcRegistry::new());
        let formatter = IrcFormatter::new(&config.server.host_tag, &config.limits);

        let adapters: Vec<Arc<dyn Broadcaster>> = vec![
            Arc::new(IrcBroadcaster::new(
                Arc::clone(&connections),
                Arc::clone(&envelope),
                formatter.clone(),
                &config.server.name,
            )),
            Arc::new(HubBroadcaster::new(hub.clone())),
        ];

        let embeds: Arc<dyn EmbedFetcher> = if config.embeds.enabled {
            Arc::new(HttpEmbedFetcher::new(&config.embeds))
        } else {
            info!("Link previews disabled");
            Arc::new(NoopEmbedFetcher)
        };

        let chat = Arc::new(ChatService::new(
            db,
            Arc::clone(&envelope),
            presence,
            Broadcasters::new(adapters),
            embeds,
            ChatSettings {
                limits: config.limits.clone(),
                encrypt_at_rest: config.security.encrypt_at_rest,
                default_channel: config.default_channel(),
            },
        ));
        chat.provision(&config.accounts, &config.channels).await?;

        let services = Arc::new(IrcServices {
            info: ServerInfo {
                name: config.server.name.clone(),
                network: config.server.network.clone(),
                description: config.server.description.clone(),
                version: format!("echohub-{}", env!("CARGO_PKG_VERSION")),
                created: chrono::Utc::now().to_rfc2822(),
                motd: config.motd.load_lines(),
                max_channel_name: config.limits.max_channel_name,
            },
            chat: Arc::clone(&chat),
            connections,
            formatter,
            envelope,
        });

        let mut tasks = Vec::new();

        let irc = IrcGateway::bind(&config.listen, services, shutdown.clone()).await?;
        let irc_addr = irc.local_addr()?;
        tasks.push(tokio::spawn(async move {
            if let Err(e) = irc.run().await {
                error!(error = %e, "IRC gateway failed");
            }
        }));

        let hub_addr = match &config.websocket {
            Some(ws) => {
                let gateway =
                    HubGateway::bind(ws, Arc::clone(&chat), hub, shutdown.clone()).await?;
                let addr = gateway.local_addr()?;
                tasks.push(tokio::spawn(async move {
                    if let Err(e) = gateway.run().await {
                        error!(error = %e, "Hub gateway failed");
                    }
                }));
                Some(addr)
            }
            None => {
                info!("Hub listener disabled");
                None
            }
        };

        // metrics_port = 0 disables the HTTP endpoint.
        let metrics_port = config.server.metrics_port.unwrap_or(9090);
        if metrics_port == 0 {
            info!("Metrics disabled");
        } else {
            crate::metrics::init();
            let token = shutdown.clone();
            tasks.push(tokio::spawn(crate::http::run_http_server(metrics_port, token)));
            info!(port = metrics_port, "Prometheus HTTP server started");
        }

        Ok(Self {
            chat,
            irc_addr,
            hub_addr,
            shutdown,
            tasks,
        })
    }

    pub fn irc_addr(&self) -> SocketAddr {
        self.irc_addr
    }

    pub fn hub_addr(&self) -> Option<SocketAddr> {
        self.hub_addr
    }

    /// Tell every client why, cancel every loop and wait for the listeners.
    pub async fn stop(self, reason: &str) {
        self.chat.shutdown(reason).await;
        self.shutdown.cancel();
        for task in self.tasks {
            let _ = task.await;
        }
        info!("Server stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::{SinkExt, StreamExt};
    use serde_json::{Value, json};
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
    use tokio::net::TcpStream;
    use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
    use tokio_tungstenite::tungstenite::Message as WsMessage;
    use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

    const CONFIG: &str = r#"
        [server]
        name = "irc.echohub.test"
        network = "EchoNet"
        metrics_port = 0

        [listen]
        address = "127.0.0.1:0"

        [websocket]
        address = "127.0.0.1:0"

        [database]
        path = ":memory:"

        [security]
        message_key = "end-to-end-envelope-key-for-tests"

        [embeds]
        enabled = false

        [[accounts]]
        username = "alice"
        password = "alicepw"

        [[accounts]]
        username = "bob"
        password = "bobpw"

        [[accounts]]
        username = "carol"
        password = "carolpw"

        [[accounts]]
        username = "mod"
        password = "modpw"
        role = "mod"

        [[channels]]
        name = "general"
    "#;

    async fn start() -> (Server, Config) {
        let config = Config::parse(CONFIG).unwrap();
        let server = Server::start(&config, CancellationToken::new()).await.unwrap();
        (server, config)
    }

    struct IrcClient {
        reader: BufReader<OwnedReadHalf>,
        writer: OwnedWriteHalf,
    }

    impl IrcClient {
        async fn connect(addr: SocketAddr) -> Self {
            let (read, write) = TcpStream::connect(addr).await.unwrap().into_split();
            Self {
                reader: BufReader::new(read),
                writer: write,
            }
        }

        async fn send(&mut self, line: &str) {
            self.writer
                .write_all(format!("{}\r\n", line).as_bytes())
                .await
                .unwrap();
        }

        async fn recv(&mut self) -> Option<String> {
            let mut line = String::new();
            let read = tokio::time::timeout(
                std::time::Duration::from_secs(5),
                self.reader.read_line(&mut line),
            )
            .await
            .expect("timed out waiting for a line")
            .unwrap();
            (read > 0).then(|| line.trim_end().to_string())
        }

        async fn expect(&mut self, needle: &str) -> String {
            loop {
                let line = self.recv().await.expect("stream ended");
                if line.contains(needle) {
                    return line;
                }
            }
        }

        async fn login(addr: SocketAddr, user: &str, pass: &str) -> Self {
            let mut client = Self::connect(addr).await;
            client.send(&format!("PASS {}", pass)).await;
            client.send(&format!("NICK {}", user)).await;
            client.send(&format!("USER {} 0 * :{}", user, user)).await;
            client.expect(" 001 ").await;
            client
        }

        async fn join(&mut self, channel: &str) {
            self.send(&format!("JOIN {}", channel)).await;
            self.expect(" 366 ").await;
        }
    }

    type Ws = WebSocketStream<MaybeTlsStream<TcpStream>>;

    async fn hub_login(addr: SocketAddr, user: &str, pass: &str) -> Ws {
        let (mut ws, _) = connect_async(format!("ws://{}", addr)).await.unwrap();
        let auth = json!({"type": "authenticate", "username": user, "password": pass});
        ws.send(WsMessage::Text(auth.to_string())).await.unwrap();
        assert_eq!(next_event(&mut ws, "ready").await["user"]["username"], user);
        ws
    }

    async fn next_event(ws: &mut Ws, kind: &str) -> Value {
        loop {
            let frame = tokio::time::timeout(std::time::Duration::from_secs(5), ws.next())
                .await
                .expect("timed out waiting for a frame")
                .unwrap()
                .unwrap();
            if let WsMessage::Text(text) = frame {
                let value: Value = serde_json::from_str(&text).unwrap();
                if value["type"] == kind {
                    return value;
                }
            }
        }
    }

    #[tokio::test]
    async fn irc_message_reaches_hub_and_other_irc_clients() {
        let (server, config) = start().await;
        let irc = server.irc_addr();
        let hub = server.hub_addr().unwrap();

        let mut alice = IrcClient::login(irc, "alice", "alicepw").await;
        let mut carol = IrcClient::login(irc, "carol", "carolpw").await;
        alice.join("#general").await;
        carol.join("#General").await;

        let mut bob = hub_login(hub, "bob", "bobpw").await;
        bob.send(WsMessage::Text(json!({"type": "joinChannel", "channel": "general"}).to_string()))
            .await
            .unwrap();
        next_event(&mut bob, "joined").await;

        alice.send("PRIVMSG #general :hello").await;

        assert_eq!(
            carol.expect("PRIVMSG").await,
            ":alice!alice@echohub PRIVMSG #general :hello"
        );

        let event = next_event(&mut bob, "messageSent").await;
        let sealed = event["message"]["content"].as_str().unwrap();
        let envelope = Envelope::new(&config.security.message_key).unwrap();
        assert_eq!(envelope.open(sealed).unwrap(), "hello");
        assert_eq!(event["message"]["username"], "alice");

        // Alice gets no echo of her own line.
        alice.send("PING :sync").await;
        loop {
            let line = alice.recv().await.expect("stream ended");
            assert!(!line.contains("PRIVMSG"), "unexpected echo: {}", line);
            if line.contains("PONG") {
                break;
            }
        }

        server.stop("test over").await;
    }

    #[tokio::test]
    async fn hub_message_reaches_irc_decrypted() {
        let (server, config) = start().await;
        let mut alice = IrcClient::login(server.irc_addr(), "alice", "alicepw").await;
        alice.join("#general").await;

        let mut bob = hub_login(server.hub_addr().unwrap(), "bob", "bobpw").await;
        bob.send(WsMessage::Text(json!({"type": "joinChannel", "channel": "general"}).to_string()))
            .await
            .unwrap();
        next_event(&mut bob, "joined").await;
        assert_eq!(alice.expect("JOIN").await, ":bob!bob@echohub JOIN #general");

        let sealed = Envelope::new(&config.security.message_key)
            .unwrap()
            .seal("from the hub")
            .unwrap();
        bob.send(WsMessage::Text(
            json!({"type": "sendMessage", "channel": "general", "content": sealed}).to_string(),
        ))
        .await
        .unwrap();

        assert_eq!(
            alice.expect("PRIVMSG").await,
            ":bob!bob@echohub PRIVMSG #general :from the hub"
        );
        server.stop("test over").await;
    }

    #[tokio::test]
    async fn sasl_retry_over_tcp() {
        let (server, _) = start().await;
        let mut c = IrcClient::connect(server.irc_addr()).await;
        c.send("CAP LS 302").await;
        c.expect("CAP * LS").await;
        c.send("CAP REQ :sasl").await;
        c.expect("ACK").await;

        c.send("AUTHENTICATE PLAIN").await;
        c.expect("AUTHENTICATE +").await;
        c.send(&format!(
            "AUTHENTICATE {}",
            echohub_proto::sasl::encode_plain("bob", "wrongpassword")
        ))
        .await;
        c.expect(" 904 ").await;

        c.send("AUTHENTICATE PLAIN").await;
        c.expect("AUTHENTICATE +").await;
        c.send(&format!(
            "AUTHENTICATE {}",
            echohub_proto::sasl::encode_plain("bob", "bobpw")
        ))
        .await;
        c.expect(" 903 ").await;

        c.send("NICK bob").await;
        c.send("USER bob 0 * :Bob").await;
        c.send("CAP END").await;
        c.expect(" 001 bob ").await;
        server.stop("test over").await;
    }

    #[tokio::test]
    async fn kick_from_hub_disconnects_irc_user() {
        let (server, _) = start().await;
        let mut alice = IrcClient::login(server.irc_addr(), "alice", "alicepw").await;
        let mut carol = IrcClient::login(server.irc_addr(), "carol", "carolpw").await;
        alice.join("#general").await;
        carol.join("#general").await;

        let mut moderator = hub_login(server.hub_addr().unwrap(), "mod", "modpw").await;
        moderator
            .send(WsMessage::Text(
                json!({"type": "kick", "username": "alice", "reason": "spam"}).to_string(),
            ))
            .await
            .unwrap();
        next_event(&mut moderator, "ok").await;

        assert_eq!(
            carol.expect("KICK").await,
            ":mod!mod@echohub KICK #general alice :spam"
        );
        alice.expect("ERROR :Closing Link: alice").await;
        loop {
            if alice.recv().await.is_none() {
                break;
            }
        }
        server.stop("test over").await;
    }

    #[tokio::test]
    async fn stop_closes_irc_clients() {
        let (server, _) = start().await;
        let mut alice = IrcClient::login(server.irc_addr(), "alice", "alicepw").await;
        server.stop("Server shutting down").await;
        assert_eq!(
            alice.expect("ERROR").await,
            "ERROR :Closing Link: alice (Server shutting down)"
        );
    }
}
