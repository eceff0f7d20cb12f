//! MOTD handler.

use async_trait::async_trait;
use echohub_proto::Message;

use super::connection::welcome::send_motd;
use super::{Context, Handler};
use crate::error::HandlerResult;

/// Handler for MOTD command.
pub struct MotdHandler;

#[async_trait]
impl Handler for MotdHandler {
    async fn handle(&self, ctx: &mut Context<'_>, _msg: &Message) -> HandlerResult {
        send_motd(ctx)
    }
}
