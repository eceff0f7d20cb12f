//! TOPIC handler.
//!
//! Topics are read-only over IRC; they are set from the hub.

use async_trait::async_trait;
use echohub_proto::{Message, Response, irc_channel};

use crate::error::{HandlerError, HandlerResult};
use crate::handlers::helpers::{canonical_or_reply, send_topic};
use crate::handlers::{Context, Handler};

/// Handler for TOPIC command.
pub struct TopicHandler;

#[async_trait]
impl Handler for TopicHandler {
    async fn handle(&self, ctx: &mut Context<'_>, msg: &Message) -> HandlerResult {
        let raw = msg.arg(0).ok_or(HandlerError::NeedMoreParams)?;
        let Some(name) = canonical_or_reply(ctx, raw)? else {
            return Ok(());
        };

        if msg.arg_count() > 1 {
            return ctx.reply(
                Response::ERR_CHANOPRIVSNEEDED,
                [irc_channel(&name), "You're not channel operator".to_string()],
            );
        }

        match ctx.chat().channel(&name).await {
            Ok(channel) => send_topic(ctx, &channel),
            Err(e) => ctx.reply(
                Response::ERR_NOSUCHCHANNEL,
                [irc_channel(&name), e.user_message()],
            ),
        }
    }
}
