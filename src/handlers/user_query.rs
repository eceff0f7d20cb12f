//! User query handlers: WHO, WHOIS.

use async_trait::async_trait;
use echohub_proto::{Message, Response, irc_channel, is_channel_target};

use super::{Context, Handler};
use crate::db::{UserRecord, UserStatus};
use crate::error::{HandlerError, HandlerResult};

/// Handler for WHO command.
///
/// `WHO <#channel>` lists online members with an H/G away flag;
/// `WHO <nick>` describes one online user.
pub struct WhoHandler;

#[async_trait]
impl Handler for WhoHandler {
    async fn handle(&self, ctx: &mut Context<'_>, msg: &Message) -> HandlerResult {
        let mask = msg.arg(0).unwrap_or("*");

        if is_channel_target(mask) {
            if let Ok(channel) = ctx.chat().channel(mask).await {
                let shown = irc_channel(&channel.name);
                for member in ctx.chat().members(&channel.name) {
                    let away = lookup(ctx, &member).await?.is_some_and(|u| is_away(&u));
                    who_reply(ctx, &shown, &member, away)?;
                }
            }
        } else if ctx.chat().presence().is_online(mask)
            && let Some(user) = lookup(ctx, mask).await?
        {
            who_reply(ctx, "*", &user.username, is_away(&user))?;
        }

        ctx.reply(Response::RPL_ENDOFWHO, [mask, "End of /WHO list"])
    }
}

fn who_reply(ctx: &Context<'_>, channel: &str, username: &str, away: bool) -> HandlerResult {
    let host = ctx.services.formatter.host_tag().to_string();
    ctx.reply(
        Response::RPL_WHOREPLY,
        [
            channel.to_string(),
            username.to_string(),
            host,
            ctx.server_name().to_string(),
            username.to_string(),
            if away { "G" } else { "H" }.to_string(),
            format!("0 {}", username),
        ],
    )
}

/// Handler for WHOIS command: `WHOIS [server] <nick>`.
pub struct WhoisHandler;

#[async_trait]
impl Handler for WhoisHandler {
    async fn handle(&self, ctx: &mut Context<'_>, msg: &Message) -> HandlerResult {
        let count = msg.arg_count();
        if count == 0 {
            return Err(HandlerError::NoNicknameGiven);
        }
        let target = msg.arg(count - 1).unwrap_or_default();

        let user = match lookup(ctx, target).await? {
            Some(user) if ctx.chat().presence().is_online(&user.username) => user,
            _ => {
                ctx.reply(
                    Response::ERR_NOSUCHNICK,
                    [target.to_string(), "No such nick/channel".to_string()],
                )?;
                return ctx.reply(Response::RPL_ENDOFWHOIS, [target, "End of /WHOIS list"]);
            }
        };
        let name = user.username.clone();
        let host = ctx.services.formatter.host_tag().to_string();

        ctx.reply(
            Response::RPL_WHOISUSER,
            [name.clone(), name.clone(), host, "*".to_string(), name.clone()],
        )?;

        let channels = ctx.chat().presence().channels_of(&name);
        if !channels.is_empty() {
            let list: Vec<String> = channels.iter().map(|c| irc_channel(c)).collect();
            ctx.reply(Response::RPL_WHOISCHANNELS, [name.clone(), list.join(" ")])?;
        }

        let info = &ctx.services.info;
        ctx.reply(
            Response::RPL_WHOISSERVER,
            [name.clone(), info.name.clone(), info.description.clone()],
        )?;

        if is_away(&user) {
            ctx.reply(
                Response::RPL_AWAY,
                [name.clone(), user.status_message.clone().unwrap_or_else(|| "Away".to_string())],
            )?;
        }

        // Idle time is only known for IRC sessions; hub-only users report 0.
        let (idle, signon) = ctx
            .services
            .connections
            .of_user(&name)
            .iter()
            .map(|conn| (conn.idle_secs(), conn.signon()))
            .min_by_key(|(idle, _)| *idle)
            .unwrap_or((0, user.last_seen_at / 1000));
        ctx.reply(
            Response::RPL_WHOISIDLE,
            [
                name.clone(),
                idle.to_string(),
                signon.to_string(),
                "seconds idle, signon time".to_string(),
            ],
        )?;

        ctx.reply(Response::RPL_ENDOFWHOIS, [name, "End of /WHOIS list".to_string()])
    }
}

async fn lookup(ctx: &Context<'_>, username: &str) -> Result<Option<UserRecord>, HandlerError> {
    ctx.chat()
        .user(username)
        .await
        .map_err(|e| HandlerError::Internal(e.to_string()))
}

fn is_away(user: &UserRecord) -> bool {
    user.status == UserStatus::Away
}
