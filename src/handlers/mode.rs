//! MODE handler.
//!
//! Modes carry no state here; queries and change requests alike receive the
//! empty mode string. Moderation happens through the hub.

use async_trait::async_trait;
use echohub_proto::{Message, Response, irc_channel, is_channel_target};

use super::{Context, Handler};
use crate::chat::validation::validate_channel_name;
use crate::error::{HandlerError, HandlerResult};

/// Handler for MODE command.
pub struct ModeHandler;

#[async_trait]
impl Handler for ModeHandler {
    async fn handle(&self, ctx: &mut Context<'_>, msg: &Message) -> HandlerResult {
        let target = msg.arg(0).ok_or(HandlerError::NeedMoreParams)?;

        if is_channel_target(target) {
            let shown = validate_channel_name(target, ctx.services.info.max_channel_name)
                .map(|name| irc_channel(&name))
                .unwrap_or_else(|_| target.to_string());
            ctx.reply(Response::RPL_CHANNELMODEIS, [shown, "+".to_string()])
        } else {
            ctx.reply(Response::RPL_UMODEIS, ["+"])
        }
    }
}
