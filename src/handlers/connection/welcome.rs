//! Registration completion and the welcome burst.
//!
//! Registration needs NICK and USER, no open CAP negotiation, and an account:
//! either one already verified through SASL or a PASS checked against the
//! nickname. On success the nick is pinned to the account name.

use echohub_proto::{Message, Response};
use tracing::info;

use crate::db::UserRecord;
use crate::error::{ChatError, HandlerError, HandlerResult};
use crate::handlers::Context;

/// Attempt to complete registration. Does nothing until every piece is in.
pub async fn try_register(ctx: &mut Context<'_>) -> HandlerResult {
    let identity = ctx.conn.identity();
    if identity.registered || ctx.handshake.cap_negotiating {
        return Ok(());
    }
    let (Some(nick), Some(_)) = (identity.nick.clone(), identity.ident.clone()) else {
        return Ok(());
    };

    let user = match ctx.handshake.sasl_account.take() {
        Some(user) => user,
        None => match authenticate_pass(ctx, &nick).await? {
            Some(user) => user,
            None => return Ok(()),
        },
    };

    complete(ctx, &nick, user).await
}

/// Check PASS against the nickname. Replies 464 and returns `None` on failure.
async fn authenticate_pass(ctx: &mut Context<'_>, nick: &str) -> Result<Option<UserRecord>, HandlerError> {
    let Some(password) = ctx.handshake.password.take() else {
        ctx.reply(Response::ERR_PASSWDMISMATCH, ["Password required"])?;
        return Ok(None);
    };

    match ctx.chat().authenticate(nick, &password).await {
        Ok(user) => Ok(Some(user)),
        Err(ChatError::Auth) => {
            info!(conn = %ctx.conn.id(), nick = %nick, "Password rejected");
            ctx.reply(Response::ERR_PASSWDMISMATCH, ["Password incorrect"])?;
            Ok(None)
        }
        Err(e) => Err(HandlerError::Internal(e.to_string())),
    }
}

async fn complete(ctx: &mut Context<'_>, requested_nick: &str, user: UserRecord) -> HandlerResult {
    let old_mask = ctx.hostmask();
    ctx.conn.update_identity(|identity| {
        identity.nick = Some(user.username.clone());
        identity.ident = Some(user.username.clone());
        identity.user_id = Some(user.id);
        identity.account = Some(user.username.clone());
        identity.registered = true;
    });

    if requested_nick != user.username {
        ctx.send(Message::new("NICK", [user.username.as_str()]).with_prefix(old_mask).with_trailing())?;
    }

    ctx.chat()
        .connect(ctx.conn.id(), user.id, &user.username)
        .await
        .map_err(|e| HandlerError::Internal(e.to_string()))?;
    crate::metrics::irc_connection_opened();
    info!(conn = %ctx.conn.id(), user = %user.username, "IRC client registered");

    send_welcome(ctx)?;
    send_motd(ctx)
}

/// 001 through 005.
pub fn send_welcome(ctx: &Context<'_>) -> HandlerResult {
    let info = &ctx.services.info;
    let nick = ctx.nick();

    ctx.reply(
        Response::RPL_WELCOME,
        [format!(
            "Welcome to the {} Network, {}",
            info.network,
            ctx.hostmask()
        )],
    )?;
    ctx.reply(
        Response::RPL_YOURHOST,
        [format!(
            "Your host is {}, running version {}",
            info.name, info.version
        )],
    )?;
    ctx.reply(
        Response::RPL_CREATED,
        [format!("This server was created {}", info.created)],
    )?;

    let mut myinfo = Message::response(
        &info.name,
        Response::RPL_MYINFO,
        vec![nick.clone(), info.name.clone(), info.version.clone(), "i".into(), "t".into()],
    );
    myinfo.trailing = false;
    ctx.send(myinfo)?;

    ctx.reply(
        Response::RPL_ISUPPORT,
        [
            "CHANTYPES=#".to_string(),
            "CASEMAPPING=ascii".to_string(),
            format!("CHANNELLEN={}", info.max_channel_name + 1),
            format!("NICKLEN={}", crate::chat::validation::MAX_NICK_LEN),
            format!("NETWORK={}", info.network),
            "are supported by this server".to_string(),
        ],
    )
}

/// MOTD block, or 422 when none is configured.
pub fn send_motd(ctx: &Context<'_>) -> HandlerResult {
    let info = &ctx.services.info;
    let Some(lines) = info.motd.as_ref() else {
        return ctx.reply(Response::ERR_NOMOTD, ["MOTD File is missing"]);
    };

    ctx.reply(
        Response::RPL_MOTDSTART,
        [format!("- {} Message of the day - ", info.name)],
    )?;
    for line in lines {
        ctx.reply(Response::RPL_MOTD, [format!("- {}", line)])?;
    }
    ctx.reply(Response::RPL_ENDOFMOTD, ["End of /MOTD command."])
}
