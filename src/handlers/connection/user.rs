//! USER handler.

use async_trait::async_trait;
use echohub_proto::Message;

use super::welcome::try_register;
use crate::error::{HandlerError, HandlerResult};
use crate::handlers::{Context, Handler};

/// Handler for USER command: `USER <ident> <mode> <unused> :<realname>`.
pub struct UserHandler;

#[async_trait]
impl Handler for UserHandler {
    async fn handle(&self, ctx: &mut Context<'_>, msg: &Message) -> HandlerResult {
        if ctx.conn.is_registered() {
            return Err(HandlerError::AlreadyRegistered);
        }
        if msg.arg_count() < 4 {
            return Err(HandlerError::NeedMoreParams);
        }
        let ident = msg.arg(0).unwrap_or_default();
        let realname = msg.arg(3).unwrap_or_default();
        if ident.is_empty() {
            return Err(HandlerError::NeedMoreParams);
        }

        ctx.conn.update_identity(|identity| {
            identity.ident = Some(ident.to_string());
            identity.realname = Some(realname.to_string());
        });
        try_register(ctx).await
    }
}
