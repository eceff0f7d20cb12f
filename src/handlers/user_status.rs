//! AWAY handler.
//!
//! Goes through the shared status update, so hub clients in the user's
//! channels see the change too.

use async_trait::async_trait;
use echohub_proto::{Message, Response};
use tracing::debug;

use super::{Context, Handler};
use crate::db::UserStatus;
use crate::error::HandlerResult;

/// Handler for AWAY command: `AWAY [:message]`.
pub struct AwayHandler;

#[async_trait]
impl Handler for AwayHandler {
    async fn handle(&self, ctx: &mut Context<'_>, msg: &Message) -> HandlerResult {
        let account = ctx.account()?;
        let conn_id = ctx.conn.id().to_string();
        let away_msg = msg.arg(0).filter(|m| !m.trim().is_empty());

        let status = if away_msg.is_some() {
            UserStatus::Away
        } else {
            UserStatus::Online
        };

        if let Err(e) = ctx
            .chat()
            .update_status(&account.actor(&conn_id), status, away_msg)
            .await
        {
            debug!(conn = %conn_id, error = %e, "Status update rejected");
            return ctx.notice(&e.user_message());
        }

        ctx.conn
            .update_identity(|identity| identity.away = away_msg.map(str::to_string));
        match away_msg {
            Some(_) => ctx.reply(Response::RPL_NOWAWAY, ["You have been marked as being away"]),
            None => ctx.reply(Response::RPL_UNAWAY, ["You are no longer marked as being away"]),
        }
    }
}
