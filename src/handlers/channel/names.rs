//! NAMES handler.

use async_trait::async_trait;
use echohub_proto::{Message, Response, canonical_channel, irc_channel};

use crate::error::HandlerResult;
use crate::handlers::helpers::{send_names, targets};
use crate::handlers::{Context, Handler};

/// Handler for NAMES command. Without arguments it lists every channel this
/// connection is in.
pub struct NamesHandler;

#[async_trait]
impl Handler for NamesHandler {
    async fn handle(&self, ctx: &mut Context<'_>, msg: &Message) -> HandlerResult {
        let Some(raw) = msg.arg(0) else {
            for channel in ctx.conn.channels() {
                send_names(ctx, &channel)?;
            }
            return Ok(());
        };

        for target in targets(raw) {
            match ctx.chat().channel(target).await {
                Ok(channel) => send_names(ctx, &channel.name)?,
                Err(_) => ctx.reply(
                    Response::RPL_ENDOFNAMES,
                    [irc_channel(&canonical_channel(target)), "End of /NAMES list".to_string()],
                )?,
            }
        }
        Ok(())
    }
}
