//! PRIVMSG handler.
//!
//! Only channel targets are accepted. The text goes through the shared send
//! path, which persists it and fans it out to both protocols.

use async_trait::async_trait;
use echohub_proto::{Message, Response, irc_channel, is_channel_target};
use tracing::debug;

use super::helpers::targets;
use super::{Context, Handler};
use crate::chat::SendRequest;
use crate::chat::validation::validate_channel_name;
use crate::crypto::strip_marker;
use crate::error::{HandlerError, HandlerResult};

/// Handler for PRIVMSG command.
pub struct PrivmsgHandler;

#[async_trait]
impl Handler for PrivmsgHandler {
    async fn handle(&self, ctx: &mut Context<'_>, msg: &Message) -> HandlerResult {
        if msg.arg_count() < 2 {
            return Err(HandlerError::NeedMoreParams);
        }
        let raw_targets = msg.arg(0).unwrap_or_default();
        let text = strip_marker(msg.arg(1).unwrap_or_default());
        let account = ctx.account()?;
        let conn_id = ctx.conn.id().to_string();

        for target in targets(raw_targets) {
            if !is_channel_target(target) {
                ctx.reply(
                    Response::ERR_NOSUCHNICK,
                    [target.to_string(), "Private messages are not supported".to_string()],
                )?;
                continue;
            }

            let shown = validate_channel_name(target, ctx.services.info.max_channel_name)
                .map(|name| irc_channel(&name))
                .unwrap_or_else(|_| target.to_string());

            let request = SendRequest::text(target, text.clone());
            if let Err(e) = ctx.chat().send_message(&account.actor(&conn_id), request).await {
                debug!(conn = %conn_id, channel = %target, error = %e, "Send rejected");
                ctx.reply(
                    Response::ERR_CANNOTSENDTOCHAN,
                    [shown, format!("Cannot send to channel: {}", e.user_message())],
                )?;
            }
        }
        Ok(())
    }
}
