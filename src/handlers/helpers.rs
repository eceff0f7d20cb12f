//! Reply builders shared by several handlers.

use echohub_proto::{Response, irc_channel};

use super::Context;
use crate::chat::validation::validate_channel_name;
use crate::db::ChannelRecord;
use crate::error::{HandlerError, HandlerResult};

/// Longest 353 member list, in bytes, before a new line is started.
const NAMES_LINE_BYTES: usize = 400;

/// Canonical form of a channel argument, or `None` after replying 403.
pub fn canonical_or_reply(ctx: &Context<'_>, raw: &str) -> Result<Option<String>, HandlerError> {
    match validate_channel_name(raw, ctx.services.info.max_channel_name) {
        Ok(name) => Ok(Some(name)),
        Err(e) => {
            ctx.reply(Response::ERR_NOSUCHCHANNEL, [raw.to_string(), e.user_message()])?;
            Ok(None)
        }
    }
}

/// 332 or 331 for `channel`.
pub fn send_topic(ctx: &Context<'_>, channel: &ChannelRecord) -> HandlerResult {
    let target = irc_channel(&channel.name);
    match channel.topic.as_deref() {
        Some(topic) => ctx.reply(Response::RPL_TOPIC, [target, topic.to_string()]),
        None => ctx.reply(Response::RPL_NOTOPIC, [target, "No topic is set".to_string()]),
    }
}

/// 353 lines for the online members of `channel`, then 366.
pub fn send_names(ctx: &Context<'_>, channel: &str) -> HandlerResult {
    let target = irc_channel(channel);
    let members = ctx.chat().members(channel);

    let mut line = String::new();
    for member in members {
        if !line.is_empty() && line.len() + member.len() + 1 > NAMES_LINE_BYTES {
            ctx.reply(
                Response::RPL_NAMREPLY,
                ["=".to_string(), target.clone(), std::mem::take(&mut line)],
            )?;
        }
        if !line.is_empty() {
            line.push(' ');
        }
        line.push_str(&member);
    }
    if !line.is_empty() {
        ctx.reply(Response::RPL_NAMREPLY, ["=".to_string(), target.clone(), line])?;
    }

    ctx.reply(
        Response::RPL_ENDOFNAMES,
        [target, "End of /NAMES list".to_string()],
    )
}

/// Split a comma-joined target list, skipping empty entries.
pub fn targets(raw: &str) -> impl Iterator<Item = &str> {
    raw.split(',').map(str::trim).filter(|t| !t.is_empty())
}
