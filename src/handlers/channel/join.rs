//! JOIN handler.
//!
//! `JOIN <channel>{,<channel>}` or `JOIN 0` to leave everything.
//! Unknown channels are created. Joining sends the JOIN echo, topic, names
//! and the recent history window, decrypted for this client.

use async_trait::async_trait;
use echohub_proto::{Message, Response, irc_channel};
use tracing::debug;

use crate::error::{HandlerError, HandlerResult};
use crate::state::connection::MAX_SENDQ;
use crate::handlers::helpers::{canonical_or_reply, send_names, send_topic, targets};
use crate::handlers::{Context, Handler};

/// History lines a JOIN may queue, leaving room in the send queue for
/// everything else.
const REPLAY_LINE_BUDGET: usize = MAX_SENDQ / 2;

/// Handler for JOIN command.
pub struct JoinHandler;

#[async_trait]
impl Handler for JoinHandler {
    async fn handle(&self, ctx: &mut Context<'_>, msg: &Message) -> HandlerResult {
        let raw = msg.arg(0).ok_or(HandlerError::NeedMoreParams)?;
        if raw == "0" {
            return part_all(ctx).await;
        }

        for target in targets(raw) {
            let Some(name) = canonical_or_reply(ctx, target)? else {
                continue;
            };
            if ctx.conn.in_channel(&name) {
                continue;
            }
            join_one(ctx, target, &name).await?;
        }
        Ok(())
    }
}

async fn join_one(ctx: &mut Context<'_>, target: &str, name: &str) -> HandlerResult {
    let account = ctx.account()?;
    let conn_id = ctx.conn.id().to_string();

    let outcome = match ctx.chat().join_channel(&account.actor(&conn_id), name).await {
        Ok(outcome) => outcome,
        Err(e) => {
            return ctx.reply(
                Response::ERR_NOSUCHCHANNEL,
                [target.to_string(), e.user_message()],
            );
        }
    };

    ctx.conn.join_channel(name);
    ctx.send(
        Message::new("JOIN", [irc_channel(name)])
            .with_prefix(ctx.services.formatter.user_prefix(&account.username)),
    )?;
    send_topic(ctx, &outcome.channel)?;
    send_names(ctx, name)?;

    let formatter = &ctx.services.formatter;
    let envelope = &ctx.services.envelope;
    let rendered = outcome.history.iter().map(|message| {
        let plaintext = envelope.open_or_placeholder(&message.content);
        formatter.render(message, &plaintext)
    });
    for line in replay_window(rendered.collect(), REPLAY_LINE_BUDGET) {
        ctx.send(line)?;
    }

    debug!(
        conn = %conn_id,
        channel = %name,
        history = outcome.history.len(),
        "Joined channel"
    );
    Ok(())
}

/// Newest messages that fit in `budget` lines, flattened oldest first.
fn replay_window(rendered: Vec<Vec<Message>>, budget: usize) -> Vec<Message> {
    let mut used = 0;
    let kept: Vec<Vec<Message>> = rendered
        .into_iter()
        .rev()
        .take_while(|lines| {
            used += lines.len();
            used <= budget
        })
        .collect();
    kept.into_iter().rev().flatten().collect()
}

async fn part_all(ctx: &mut Context<'_>) -> HandlerResult {
    let account = ctx.account()?;
    let conn_id = ctx.conn.id().to_string();
    let prefix = ctx.services.formatter.user_prefix(&account.username);

    for channel in ctx.conn.channels() {
        if let Err(e) = ctx
            .chat()
            .leave_channel(&account.actor(&conn_id), &channel, None)
            .await
        {
            debug!(conn = %conn_id, channel = %channel, error = %e, "Part failed");
        }
        if ctx.conn.part_channel(&channel) {
            ctx.send(Message::new("PART", [irc_channel(&channel)]).with_prefix(prefix.clone()))?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(tag: &str, n: usize) -> Vec<Message> {
        (0..n).map(|i| Message::new("PRIVMSG", ["#c".to_string(), format!("{}{}", tag, i)])).collect()
    }

    #[test]
    fn replay_keeps_newest_within_budget() {
        let out = replay_window(vec![lines("a", 3), lines("b", 2), lines("c", 2)], 5);
        let texts: Vec<&str> = out.iter().map(|m| m.params[1].as_str()).collect();
        assert_eq!(texts, vec!["b0", "b1", "c0", "c1"]);
    }

    #[test]
    fn replay_of_oversized_history_fits_send_queue() {
        let history: Vec<Vec<Message>> = (0..200).map(|_| lines("x", 64)).collect();
        let out = replay_window(history, REPLAY_LINE_BUDGET);
        assert!(out.len() <= REPLAY_LINE_BUDGET);
        assert!(!out.is_empty());
    }
}
