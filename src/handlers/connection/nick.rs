//! NICK handler.
//!
//! Before registration the nick is only a login hint. Afterwards it is bound
//! to the account, so the only accepted change is a different capitalisation
//! of the account name.

use async_trait::async_trait;
use echohub_proto::Message;
use tracing::debug;

use super::welcome::try_register;
use crate::chat::validation::is_valid_nickname;
use crate::error::{HandlerError, HandlerResult};
use crate::handlers::{Context, Handler};

/// Handler for NICK command.
pub struct NickHandler;

#[async_trait]
impl Handler for NickHandler {
    async fn handle(&self, ctx: &mut Context<'_>, msg: &Message) -> HandlerResult {
        let nick = msg
            .arg(0)
            .filter(|n| !n.is_empty())
            .ok_or(HandlerError::NoNicknameGiven)?;
        if !is_valid_nickname(nick) {
            return Err(HandlerError::ErroneousNickname(nick.to_string()));
        }

        if !ctx.conn.is_registered() {
            ctx.conn.update_identity(|identity| identity.nick = Some(nick.to_string()));
            return try_register(ctx).await;
        }

        let account = ctx.account()?;
        if !nick.eq_ignore_ascii_case(&account.username) {
            if ctx
                .services
                .connections
                .nick_held_by_other(nick, Some(&account.username))
            {
                return Err(HandlerError::NicknameInUse(nick.to_string()));
            }
            return Err(HandlerError::ErroneousNickname(nick.to_string()));
        }

        let old_mask = ctx.hostmask();
        ctx.conn.update_identity(|identity| identity.nick = Some(nick.to_string()));
        debug!(conn = %ctx.conn.id(), nick = %nick, "Nick re-cased");
        ctx.send(Message::new("NICK", [nick]).with_prefix(old_mask).with_trailing())
    }
}
