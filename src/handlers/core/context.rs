//! Command handler context and core types.
//!
//! A [`Context`] is built per dispatched line. It borrows the connection
//! handle, the process-wide [`IrcServices`] and the connection's
//! [`HandshakeState`], which only the owning socket task ever touches.

use async_trait::async_trait;
use echohub_proto::{Message, Response};
use std::collections::HashSet;
use std::sync::Arc;

use crate::chat::{Actor, ChatService};
use crate::crypto::Envelope;
use crate::db::UserRecord;
use crate::error::{HandlerError, HandlerResult};
use crate::format::IrcFormatter;
use crate::state::{IrcConnection, IrcRegistry};

/// Static facts about this server, as advertised to clients.
#[derive(Debug, Clone)]
pub struct ServerInfo {
    pub name: String,
    pub network: String,
    pub description: String,
    pub version: String,
    /// Human-readable start time for 003.
    pub created: String,
    /// `None` when no MOTD is configured.
    pub motd: Option<Vec<String>>,
    pub max_channel_name: usize,
}

/// Everything a handler may reach beyond its own connection.
pub struct IrcServices {
    pub info: ServerInfo,
    pub chat: Arc<ChatService>,
    pub connections: Arc<IrcRegistry>,
    pub formatter: IrcFormatter,
    pub envelope: Arc<Envelope>,
}

/// SASL exchange progress.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum SaslState {
    #[default]
    Idle,
    /// `AUTHENTICATE PLAIN` accepted; payload chunks expected.
    AwaitingPayload,
}

/// State tracked during client registration handshake.
#[derive(Debug, Default)]
pub struct HandshakeState {
    /// Password supplied via PASS.
    pub password: Option<String>,
    /// Registration is held while CAP negotiation is open.
    pub cap_negotiating: bool,
    /// Capabilities enabled by this client.
    pub capabilities: HashSet<String>,
    pub sasl_state: SaslState,
    /// Accumulates chunked AUTHENTICATE payloads.
    pub sasl_buffer: String,
    /// Account verified through SASL, consumed at registration.
    pub sasl_account: Option<UserRecord>,
}

impl HandshakeState {
    pub fn reset_sasl(&mut self) {
        self.sasl_state = SaslState::Idle;
        self.sasl_buffer.clear();
    }
}

/// The authenticated account behind a registered connection.
#[derive(Debug, Clone)]
pub struct Account {
    pub user_id: i64,
    pub username: String,
}

impl Account {
    pub fn actor<'a>(&'a self, conn_id: &'a str) -> Actor<'a> {
        Actor {
            user_id: self.user_id,
            username: &self.username,
            conn_id,
        }
    }
}

/// Handler context passed to each command handler.
pub struct Context<'a> {
    pub conn: &'a Arc<IrcConnection>,
    pub services: &'a IrcServices,
    pub handshake: &'a mut HandshakeState,
}

impl Context<'_> {
    pub fn server_name(&self) -> &str {
        &self.services.info.name
    }

    pub fn chat(&self) -> &ChatService {
        &self.services.chat
    }

    /// Nick for numerics, `*` before one is set.
    pub fn nick(&self) -> String {
        self.conn.nick_or_star()
    }

    /// Queue a line for this client.
    pub fn send(&self, msg: Message) -> HandlerResult {
        self.conn.send(msg).map_err(|e| {
            HandlerError::Send(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                e.to_string(),
            ))
        })
    }

    /// Numeric reply addressed to this client; the nick is prepended.
    pub fn reply<I, P>(&self, response: Response, params: I) -> HandlerResult
    where
        I: IntoIterator<Item = P>,
        P: Into<String>,
    {
        let mut all = vec![self.nick()];
        all.extend(params.into_iter().map(Into::into));
        self.send(Message::response(self.server_name(), response, all))
    }

    /// Server NOTICE to this client.
    pub fn notice(&self, text: &str) -> HandlerResult {
        let nick = self.nick();
        self.send(
            Message::new("NOTICE", [nick.as_str(), text])
                .with_prefix(self.server_name())
                .with_trailing(),
        )
    }

    /// The account bound to this connection. Only registered connections
    /// have one.
    pub fn account(&self) -> Result<Account, HandlerError> {
        let identity = self.conn.identity();
        match (identity.registered, identity.user_id, identity.account) {
            (true, Some(user_id), Some(username)) => Ok(Account { user_id, username }),
            _ => Err(HandlerError::NotRegistered),
        }
    }

    /// `nick!ident@host` of this connection.
    pub fn hostmask(&self) -> String {
        self.conn.hostmask(self.services.formatter.host_tag())
    }
}

/// A command handler.
#[async_trait]
pub trait Handler: Send + Sync {
    async fn handle(&self, ctx: &mut Context<'_>, msg: &Message) -> HandlerResult;
}
