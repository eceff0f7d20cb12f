//! QUIT handler for terminating client sessions.

use async_trait::async_trait;
use echohub_proto::Message;
use tracing::info;

use crate::error::{HandlerError, HandlerResult};
use crate::handlers::{Context, Handler};

const DEFAULT_REASON: &str = "Client quit";

/// Handler for QUIT command.
pub struct QuitHandler;

#[async_trait]
impl Handler for QuitHandler {
    async fn handle(&self, ctx: &mut Context<'_>, msg: &Message) -> HandlerResult {
        let reason = msg
            .arg(0)
            .filter(|r| !r.is_empty())
            .unwrap_or(DEFAULT_REASON)
            .to_string();

        info!(conn = %ctx.conn.id(), nick = %ctx.nick(), reason = %reason, "Client quit");

        let line = format!("Closing Link: {} ({})", ctx.nick(), reason);
        ctx.send(Message::new("ERROR", [line]).with_trailing())?;

        // The connection loop flushes the ERROR line and tears down.
        Err(HandlerError::Quit(Some(reason)))
    }
}
