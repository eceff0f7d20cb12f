//! PART handler.

use async_trait::async_trait;
use echohub_proto::{Message, Response, irc_channel};

use crate::error::{ChatError, HandlerError, HandlerResult};
use crate::handlers::helpers::{canonical_or_reply, targets};
use crate::handlers::{Context, Handler};

/// Handler for PART command: `PART <channel>{,<channel>} [:reason]`.
pub struct PartHandler;

#[async_trait]
impl Handler for PartHandler {
    async fn handle(&self, ctx: &mut Context<'_>, msg: &Message) -> HandlerResult {
        let raw = msg.arg(0).ok_or(HandlerError::NeedMoreParams)?;
        let reason = msg.arg(1).filter(|r| !r.is_empty());
        let account = ctx.account()?;
        let conn_id = ctx.conn.id().to_string();

        for target in targets(raw) {
            let Some(name) = canonical_or_reply(ctx, target)? else {
                continue;
            };
            if !ctx.conn.in_channel(&name) {
                ctx.reply(
                    Response::ERR_NOTONCHANNEL,
                    [irc_channel(&name), "You're not on that channel".to_string()],
                )?;
                continue;
            }

            match ctx
                .chat()
                .leave_channel(&account.actor(&conn_id), &name, reason)
                .await
            {
                Ok(_) => {}
                Err(ChatError::NotFound(_)) => {
                    ctx.conn.part_channel(&name);
                    ctx.reply(
                        Response::ERR_NOSUCHCHANNEL,
                        [irc_channel(&name), "No such channel".to_string()],
                    )?;
                    continue;
                }
                Err(e) => return Err(HandlerError::Internal(e.to_string())),
            }

            // The broadcast already parted us when presence changed. A user
            // whose other connection keeps them present gets a local echo.
            if ctx.conn.part_channel(&name) {
                let mut params = vec![irc_channel(&name)];
                params.extend(reason.map(str::to_string));
                let mut line = Message::new("PART", params)
                    .with_prefix(ctx.services.formatter.user_prefix(&account.username));
                if reason.is_some() {
                    line = line.with_trailing();
                }
                ctx.send(line)?;
            }
        }
        Ok(())
    }
}
