//! LIST handler.

use async_trait::async_trait;
use echohub_proto::{Message, Response, irc_channel};

use crate::db::Visibility;
use crate::error::{HandlerError, HandlerResult};
use crate::handlers::{Context, Handler};

/// Handler for LIST command. Private channels are omitted.
pub struct ListHandler;

#[async_trait]
impl Handler for ListHandler {
    async fn handle(&self, ctx: &mut Context<'_>, _msg: &Message) -> HandlerResult {
        let channels = ctx
            .chat()
            .list_channels()
            .await
            .map_err(|e| HandlerError::Internal(e.to_string()))?;

        for channel in channels
            .iter()
            .filter(|c| c.visibility == Visibility::Public)
        {
            let count = ctx.chat().members(&channel.name).len();
            ctx.reply(
                Response::RPL_LIST,
                [
                    irc_channel(&channel.name),
                    count.to_string(),
                    channel.topic.clone().unwrap_or_default(),
                ],
            )?;
        }
        ctx.reply(Response::RPL_LISTEND, ["End of /LIST"])
    }
}
