//! WebSocket listener for hub clients.
//!
//! Each socket gets one task. The first text frame must authenticate; after
//! that the task multiplexes client requests and queued outbound frames in a
//! single `select!` loop so every write goes through one sink.

use futures_util::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::{WebSocketStream, accept_hdr_async};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use super::protocol::{ChannelInfo, HubEvent, HubRequest, UserInfo};
use super::transport::{HubConnections, HubTransport, Outbound};
use crate::chat::{Actor, ChatService, SendRequest};
use crate::config::WebSocketConfig;
use crate::db::UserRecord;
use crate::error::{ChatError, ChatResult};
use crate::state::hub_connection_id;

/// How long a fresh socket may take to send `authenticate`.
const AUTH_TIMEOUT: Duration = Duration::from_secs(30);

pub struct HubGateway {
    listener: TcpListener,
    allow_origins: Arc<Vec<String>>,
    chat: Arc<ChatService>,
    hub: Arc<HubConnections>,
    shutdown: CancellationToken,
}

impl HubGateway {
    pub async fn bind(
        config: &WebSocketConfig,
        chat: Arc<ChatService>,
        hub: Arc<HubConnections>,
        shutdown: CancellationToken,
    ) -> anyhow::Result<Self> {
        let listener = TcpListener::bind(config.address).await?;
        info!(address = %listener.local_addr()?, "Hub listener bound");
        Ok(Self {
            listener,
            allow_origins: Arc::new(config.allow_origins.clone()),
            chat,
            hub,
            shutdown,
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept sockets until shutdown.
    #[instrument(skip(self), name = "hub_gateway")]
    pub async fn run(self) -> anyhow::Result<()> {
        loop {
            let (stream, addr) = tokio::select! {
                _ = self.shutdown.cancelled() => break,
                accepted = self.listener.accept() => match accepted {
                    Ok(pair) => pair,
                    Err(e) => {
                        error!(error = %e, "Failed to accept hub connection");
                        continue;
                    }
                },
            };

            debug!(%addr, "Hub connection attempt");
            let allowed = Arc::clone(&self.allow_origins);
            let chat = Arc::clone(&self.chat);
            let hub = Arc::clone(&self.hub);
            let shutdown = self.shutdown.child_token();
            tokio::spawn(async move {
                serve(stream, addr, allowed, chat, hub, shutdown).await;
            });
        }
        info!("Hub listener stopped");
        Ok(())
    }
}

/// Empty allow-list admits everyone; `*` admits everyone too.
fn origin_allowed(allowed: &[String], origin: Option<&str>) -> bool {
    if allowed.is_empty() {
        return true;
    }
    origin.is_some_and(|origin| allowed.iter().any(|a| a == "*" || a == origin))
}

fn forbidden(reason: &str) -> ErrorResponse {
    let mut response = ErrorResponse::new(Some(reason.to_string()));
    *response.status_mut() = http::StatusCode::FORBIDDEN;
    response
}

type Socket = WebSocketStream<TcpStream>;

async fn serve(
    stream: TcpStream,
    addr: SocketAddr,
    allowed: Arc<Vec<String>>,
    chat: Arc<ChatService>,
    hub: Arc<HubConnections>,
    shutdown: CancellationToken,
) {
    let check_origin = |req: &Request, response: Response| {
        let origin = req
            .headers()
            .get("Origin")
            .and_then(|o| o.to_str().ok());
        if origin_allowed(&allowed, origin) {
            Ok(response)
        } else {
            warn!(%addr, origin = ?origin, "Hub origin rejected");
            Err(forbidden("Origin not allowed"))
        }
    };

    let mut socket = match accept_hdr_async(stream, check_origin).await {
        Ok(socket) => socket,
        Err(e) => {
            debug!(%addr, error = %e, "Hub handshake failed");
            return;
        }
    };

    let user = match tokio::time::timeout(AUTH_TIMEOUT, authenticate(&mut socket, &chat)).await {
        Ok(Some(user)) => user,
        Ok(None) => return,
        Err(_) => {
            debug!(%addr, "Hub authentication timed out");
            let _ = close(&mut socket, "Authentication timeout").await;
            return;
        }
    };

    let conn_id = hub_connection_id();
    let session = HubSession {
        conn_id: &conn_id,
        user,
        chat: &chat,
        hub: &hub,
    };
    session.run(socket, addr, shutdown).await;
}

/// Read frames until one authenticates. Returns `None` once the socket is
/// closed or the credentials are refused.
async fn authenticate(socket: &mut Socket, chat: &ChatService) -> Option<UserRecord> {
    while let Some(frame) = socket.next().await {
        let text = match frame {
            Ok(WsMessage::Text(text)) => text,
            Ok(WsMessage::Close(_)) | Err(_) => return None,
            Ok(_) => continue,
        };

        let reply = match serde_json::from_str::<HubRequest>(&text) {
            Ok(HubRequest::Authenticate { username, password }) => {
                match chat.authenticate(&username, &password).await {
                    Ok(user) => return Some(user),
                    Err(e) => {
                        info!(user = %username, "Hub authentication failed");
                        e.user_message()
                    }
                }
            }
            Ok(_) => "Authenticate first".to_string(),
            Err(_) => "Malformed request".to_string(),
        };

        let _ = send_event(socket, &HubEvent::Error { message: reply }).await;
        let _ = close(socket, "Authentication failed").await;
        return None;
    }
    None
}

async fn send_event(socket: &mut Socket, event: &HubEvent) -> anyhow::Result<()> {
    let text = serde_json::to_string(event)?;
    socket.send(WsMessage::Text(text)).await?;
    Ok(())
}

async fn close(socket: &mut Socket, reason: &str) -> anyhow::Result<()> {
    socket
        .send(WsMessage::Close(Some(CloseFrame {
            code: CloseCode::Normal,
            reason: reason.to_string().into(),
        })))
        .await?;
    Ok(())
}

/// One authenticated hub socket.
struct HubSession<'a> {
    conn_id: &'a str,
    user: UserRecord,
    chat: &'a ChatService,
    hub: &'a HubConnections,
}

impl HubSession<'_> {
    fn actor(&self) -> Actor<'_> {
        Actor {
            user_id: self.user.id,
            username: &self.user.username,
            conn_id: self.conn_id,
        }
    }

    #[instrument(skip_all, fields(conn = %self.conn_id, user = %self.user.username), name = "hub_session")]
    async fn run(&self, mut socket: Socket, addr: SocketAddr, shutdown: CancellationToken) {
        let mut outbound = self.hub.register(self.conn_id, &self.user.username);
        crate::metrics::hub_connection_opened();
        info!(%addr, "Hub client authenticated");

        if let Err(e) = self.start().await {
            warn!(error = %e, "Hub session setup failed");
        } else {
            self.event_loop(&mut socket, &mut outbound, &shutdown).await;
        }

        self.hub.unregister(self.conn_id);
        self.chat.disconnect(self.conn_id).await;
        crate::metrics::hub_connection_closed();
        info!("Hub client disconnected");
    }

    async fn start(&self) -> ChatResult<()> {
        self.chat
            .connect(self.conn_id, self.user.id, &self.user.username)
            .await?;
        let channels = self.chat.memberships(self.user.id).await?;
        self.reply(&HubEvent::Ready {
            connection_id: self.conn_id.to_string(),
            user: UserInfo::from(&self.user),
            channels,
        });
        Ok(())
    }

    async fn event_loop(
        &self,
        socket: &mut Socket,
        outbound: &mut tokio::sync::mpsc::UnboundedReceiver<Outbound>,
        shutdown: &CancellationToken,
    ) {
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    let _ = close(socket, "Server shutting down").await;
                    break;
                }

                frame = socket.next() => match frame {
                    Some(Ok(WsMessage::Text(text))) => self.handle_text(&text).await,
                    Some(Ok(WsMessage::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        debug!(error = %e, "Hub read error");
                        break;
                    }
                },

                queued = outbound.recv() => match queued {
                    Some(Outbound::Frame(frame)) => {
                        if let Err(e) = socket.send(WsMessage::Text(frame.to_string())).await {
                            debug!(error = %e, "Hub write error");
                            break;
                        }
                    }
                    Some(Outbound::Close(reason)) => {
                        let _ = close(socket, &reason).await;
                        break;
                    }
                    None => break,
                },
            }
        }
    }

    async fn handle_text(&self, text: &str) {
        let request = match serde_json::from_str::<HubRequest>(text) {
            Ok(request) => request,
            Err(e) => {
                debug!(error = %e, "Malformed hub request");
                self.chat.notify_error(self.conn_id, "Malformed request").await;
                return;
            }
        };

        let kind = request.kind();
        match self.handle(request).await {
            Ok(Some(event)) => self.reply(&event),
            Ok(None) => {}
            Err(e) => {
                debug!(request = kind, error = %e, "Hub request failed");
                self.chat.notify_error(self.conn_id, &e.user_message()).await;
            }
        }
    }

    fn reply(&self, event: &HubEvent) {
        if let Err(e) = self.hub.send_to(self.conn_id, event) {
            debug!(error = %e, "Hub reply dropped");
        }
    }

    fn ok(request: &str) -> Option<HubEvent> {
        Some(HubEvent::Ok {
            request: request.to_string(),
        })
    }

    async fn handle(&self, request: HubRequest) -> ChatResult<Option<HubEvent>> {
        let actor = self.actor();
        let kind = request.kind();
        match request {
            HubRequest::Authenticate { .. } => Err(ChatError::validation("Already authenticated")),

            HubRequest::JoinChannel { channel } => {
                let outcome = self.chat.join_channel(&actor, &channel).await?;
                let name = outcome.channel.name.clone();
                self.hub.add_to_group(self.conn_id, &name);
                Ok(Some(HubEvent::Joined {
                    channel: ChannelInfo::from(&outcome.channel),
                    members: self.chat.members(&name),
                    history: outcome.history,
                }))
            }

            HubRequest::LeaveChannel { channel, reason } => {
                let record = self.chat.channel(&channel).await?;
                self.chat
                    .leave_channel(&actor, &record.name, reason.as_deref())
                    .await?;
                self.hub.remove_from_group(self.conn_id, &record.name);
                Ok(Some(HubEvent::Left {
                    channel: record.name,
                }))
            }

            HubRequest::SendMessage {
                channel,
                content,
                kind: message_kind,
                attachment,
            } => {
                let request = SendRequest {
                    channel,
                    content,
                    kind: message_kind,
                    attachment,
                };
                // Other hub sessions get the broadcast; the sender gets its own copy here.
                let message = self.chat.send_message(&actor, request).await?;
                Ok(Some(HubEvent::MessageSent { message }))
            }

            HubRequest::UpdateStatus { status, message } => {
                self.chat
                    .update_status(&actor, status, message.as_deref())
                    .await?;
                Ok(Self::ok(kind))
            }

            HubRequest::SetTopic { channel, topic } => {
                self.chat.set_topic(&actor, &channel, topic.as_deref()).await?;
                Ok(Self::ok(kind))
            }

            HubRequest::Kick { username, reason } => {
                self.chat.kick(&actor, &username, reason.as_deref()).await?;
                Ok(Self::ok(kind))
            }

            HubRequest::Ban { username, reason } => {
                self.chat.ban(&actor, &username, reason.as_deref()).await?;
                Ok(Self::ok(kind))
            }

            HubRequest::Mute { username, minutes } => {
                self.chat.mute(&actor, &username, minutes).await?;
                Ok(Self::ok(kind))
            }

            HubRequest::Unmute { username } => {
                self.chat.unmute(&actor, &username).await?;
                Ok(Self::ok(kind))
            }

            HubRequest::DeleteMessage { message_id } => {
                self.chat.delete_message(&actor, message_id).await?;
                Ok(Self::ok(kind))
            }

            HubRequest::ClearChannel { channel } => {
                self.chat.clear_channel(&actor, &channel).await?;
                Ok(Self::ok(kind))
            }

            HubRequest::DeleteChannel { channel } => {
                self.chat.delete_channel(&actor, &channel).await?;
                Ok(Self::ok(kind))
            }

            HubRequest::AssignRole { username, role } => {
                self.chat.assign_role(&actor, &username, role).await?;
                Ok(Self::ok(kind))
            }

            HubRequest::Ping => Ok(Some(HubEvent::Pong)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broadcast::{Broadcaster, Broadcasters, HubBroadcaster};
    use crate::chat::{ChatSettings, NoopEmbedFetcher, Role};
    use crate::crypto::Envelope;
    use crate::db::Database;
    use crate::state::PresenceTracker;
    use serde_json::{Value, json};
    use tokio_tungstenite::connect_async;

    #[test]
    fn origin_rules() {
        assert!(origin_allowed(&[], None));
        assert!(origin_allowed(&["*".to_string()], Some("https://x.test")));
        let only = vec!["https://chat.test".to_string()];
        assert!(origin_allowed(&only, Some("https://chat.test")));
        assert!(!origin_allowed(&only, Some("https://evil.test")));
        assert!(!origin_allowed(&only, None));
    }

    async fn gateway(allow_origins: Vec<String>) -> (SocketAddr, CancellationToken) {
        let db = Database::new(":memory:").await.unwrap();
        db.users().create("alice", "secret", Role::User).await.unwrap();
        let hub = Arc::new(HubConnections::new());
        let adapter: Arc<dyn Broadcaster> = Arc::new(HubBroadcaster::new(hub.clone()));
        let chat = Arc::new(ChatService::new(
            db,
            Arc::new(Envelope::new("gateway-test").unwrap()),
            Arc::new(PresenceTracker::new()),
            Broadcasters::new(vec![adapter]),
            Arc::new(NoopEmbedFetcher),
            ChatSettings::default(),
        ));
        let shutdown = CancellationToken::new();
        let config = WebSocketConfig {
            address: "127.0.0.1:0".parse().unwrap(),
            allow_origins,
        };
        let gateway = HubGateway::bind(&config, chat, hub, shutdown.clone())
            .await
            .unwrap();
        let addr = gateway.local_addr().unwrap();
        tokio::spawn(gateway.run());
        (addr, shutdown)
    }

    type Client = WebSocketStream<tokio_tungstenite::MaybeTlsStream<TcpStream>>;

    async fn next_json(ws: &mut Client) -> Value {
        loop {
            match ws.next().await.unwrap().unwrap() {
                WsMessage::Text(text) => return serde_json::from_str(&text).unwrap(),
                WsMessage::Close(_) => panic!("socket closed"),
                _ => continue,
            }
        }
    }

    #[tokio::test]
    async fn authenticate_join_and_send() {
        let (addr, shutdown) = gateway(Vec::new()).await;
        let (mut ws, _) = connect_async(format!("ws://{}", addr)).await.unwrap();

        let auth = json!({"type": "authenticate", "username": "alice", "password": "secret"});
        ws.send(WsMessage::Text(auth.to_string())).await.unwrap();
        let ready = next_json(&mut ws).await;
        assert_eq!(ready["type"], "ready");
        assert_eq!(ready["user"]["username"], "alice");
        assert!(ready["connectionId"].as_str().unwrap().starts_with("hub-"));

        let join = json!({"type": "joinChannel", "channel": "#Lobby"});
        ws.send(WsMessage::Text(join.to_string())).await.unwrap();
        let joined = next_json(&mut ws).await;
        assert_eq!(joined["type"], "joined");
        assert_eq!(joined["channel"]["name"], "lobby");
        assert_eq!(joined["members"], json!(["alice"]));

        let send = json!({"type": "sendMessage", "channel": "lobby", "content": "hi"});
        ws.send(WsMessage::Text(send.to_string())).await.unwrap();
        let sent = next_json(&mut ws).await;
        assert_eq!(sent["type"], "messageSent");
        assert!(sent["message"]["content"].as_str().unwrap().starts_with("ENC:"));

        ws.send(WsMessage::Text(r#"{"type":"bogus"}"#.into())).await.unwrap();
        let err = next_json(&mut ws).await;
        assert_eq!(err["type"], "error");

        shutdown.cancel();
    }

    #[tokio::test]
    async fn wrong_password_is_refused() {
        let (addr, shutdown) = gateway(Vec::new()).await;
        let (mut ws, _) = connect_async(format!("ws://{}", addr)).await.unwrap();

        let auth = json!({"type": "authenticate", "username": "alice", "password": "nope"});
        ws.send(WsMessage::Text(auth.to_string())).await.unwrap();
        let reply = next_json(&mut ws).await;
        assert_eq!(reply["type"], "error");
        assert_eq!(reply["message"], "authentication failed");

        shutdown.cancel();
    }

    #[tokio::test]
    async fn disallowed_origin_fails_handshake() {
        let (addr, shutdown) = gateway(vec!["https://chat.test".into()]).await;
        let request = http::Request::builder()
            .uri(format!("ws://{}", addr))
            .header("Host", addr.to_string())
            .header("Origin", "https://evil.test")
            .header("Connection", "Upgrade")
            .header("Upgrade", "websocket")
            .header("Sec-WebSocket-Version", "13")
            .header("Sec-WebSocket-Key", "dGhlIHNhbXBsZSBub25jZQ==")
            .body(())
            .unwrap();
        assert!(connect_async(request).await.is_err());
        shutdown.cancel();
    }
}
