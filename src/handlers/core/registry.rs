//! Command handler registry and dispatch.

use echohub_proto::Message;
use std::collections::HashMap;
use tracing::{Instrument, Level, debug, span};

use super::context::{Context, Handler};
use crate::error::{HandlerError, HandlerResult};
use crate::handlers::{
    cap::{AuthenticateHandler, CapHandler},
    channel::{JoinHandler, ListHandler, NamesHandler, PartHandler, TopicHandler},
    connection::{NickHandler, PassHandler, PingHandler, PongHandler, QuitHandler, UserHandler},
    messaging::PrivmsgHandler,
    mode::ModeHandler,
    server_query::MotdHandler,
    user_query::{WhoHandler, WhoisHandler},
    user_status::AwayHandler,
};

/// Commands accepted before registration completes.
const PRE_REGISTRATION: &[&str] = &[
    "CAP",
    "PASS",
    "NICK",
    "USER",
    "AUTHENTICATE",
    "PING",
    "PONG",
    "QUIT",
];

/// Registry of command handlers.
pub struct Registry {
    handlers: HashMap<&'static str, Box<dyn Handler>>,
}

impl Registry {
    pub fn new() -> Self {
        let mut handlers: HashMap<&'static str, Box<dyn Handler>> = HashMap::new();

        // Connection/registration handlers
        handlers.insert("CAP", Box::new(CapHandler));
        handlers.insert("AUTHENTICATE", Box::new(AuthenticateHandler));
        handlers.insert("PASS", Box::new(PassHandler));
        handlers.insert("NICK", Box::new(NickHandler));
        handlers.insert("USER", Box::new(UserHandler));
        handlers.insert("PING", Box::new(PingHandler));
        handlers.insert("PONG", Box::new(PongHandler));
        handlers.insert("QUIT", Box::new(QuitHandler));

        // Channel handlers
        handlers.insert("JOIN", Box::new(JoinHandler));
        handlers.insert("PART", Box::new(PartHandler));
        handlers.insert("NAMES", Box::new(NamesHandler));
        handlers.insert("TOPIC", Box::new(TopicHandler));
        handlers.insert("LIST", Box::new(ListHandler));
        handlers.insert("MODE", Box::new(ModeHandler));

        // Messaging
        handlers.insert("PRIVMSG", Box::new(PrivmsgHandler));

        // Queries and status
        handlers.insert("WHO", Box::new(WhoHandler));
        handlers.insert("WHOIS", Box::new(WhoisHandler));
        handlers.insert("AWAY", Box::new(AwayHandler));
        handlers.insert("MOTD", Box::new(MotdHandler));

        Self { handlers }
    }

    /// Dispatch one parsed line.
    ///
    /// Errors that map to a numeric are answered here and swallowed; only
    /// `Quit`, `Send` and `Internal` reach the connection loop.
    pub async fn dispatch(&self, ctx: &mut Context<'_>, msg: &Message) -> HandlerResult {
        let cmd_name = msg.command.as_str();

        let result = if !ctx.conn.is_registered() && !PRE_REGISTRATION.contains(&cmd_name) {
            Err(HandlerError::NotRegistered)
        } else if let Some(handler) = self.handlers.get(cmd_name) {
            crate::metrics::record_command(cmd_name);
            let irc_span = span!(
                Level::DEBUG,
                "irc.command",
                command = %cmd_name,
                conn = %ctx.conn.id(),
                channel = msg.arg(0).filter(|a| echohub_proto::is_channel_target(a)),
            );
            handler.handle(ctx, msg).instrument(irc_span).await
        } else {
            Err(HandlerError::UnknownCommand(cmd_name.to_string()))
        };

        let Err(e) = result else {
            return Ok(());
        };

        crate::metrics::record_command_error(cmd_name, e.error_code());
        match e.to_irc_reply(ctx.server_name(), &ctx.nick(), cmd_name) {
            Some(reply) => {
                debug!(command = %cmd_name, error = %e, "Command error");
                ctx.send(reply)
            }
            None => Err(e),
        }
    }

    /// Answer a line whose command token could not be parsed.
    pub fn reject_command(&self, ctx: &Context<'_>, token: &str) -> HandlerResult {
        let e = HandlerError::UnknownCommand(token.to_string());
        crate::metrics::record_command_error("UNPARSED", e.error_code());
        match e.to_irc_reply(ctx.server_name(), &ctx.nick(), token) {
            Some(reply) => ctx.send(reply),
            None => Ok(()),
        }
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}
