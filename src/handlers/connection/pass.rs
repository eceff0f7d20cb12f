//! PASS handler.

use async_trait::async_trait;
use echohub_proto::Message;

use crate::error::{HandlerError, HandlerResult};
use crate::handlers::{Context, Handler};

/// Handler for PASS command.
pub struct PassHandler;

#[async_trait]
impl Handler for PassHandler {
    async fn handle(&self, ctx: &mut Context<'_>, msg: &Message) -> HandlerResult {
        if ctx.conn.is_registered() {
            return Err(HandlerError::AlreadyRegistered);
        }
        let password = msg.arg(0).ok_or(HandlerError::NeedMoreParams)?;
        ctx.handshake.password = Some(password.to_string());
        Ok(())
    }
}
