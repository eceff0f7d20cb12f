//! PING and PONG handlers.

use async_trait::async_trait;
use echohub_proto::Message;

use crate::error::{HandlerError, HandlerResult};
use crate::handlers::{Context, Handler};

/// Handler for PING command.
pub struct PingHandler;

#[async_trait]
impl Handler for PingHandler {
    async fn handle(&self, ctx: &mut Context<'_>, msg: &Message) -> HandlerResult {
        let token = msg.arg(0).ok_or(HandlerError::NeedMoreParams)?;
        let server = ctx.server_name().to_string();
        ctx.send(
            Message::new("PONG", [server.as_str(), token])
                .with_prefix(server.clone())
                .with_trailing(),
        )
    }
}

/// Handler for PONG command. Activity is recorded by the connection loop.
pub struct PongHandler;

#[async_trait]
impl Handler for PongHandler {
    async fn handle(&self, _ctx: &mut Context<'_>, _msg: &Message) -> HandlerResult {
        Ok(())
    }
}
