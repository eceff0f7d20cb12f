//! CAP and AUTHENTICATE handlers.
//!
//! The only capability offered is `sasl`, and the only mechanism is PLAIN.
//! An open `CAP LS` holds registration until `CAP END`.

use async_trait::async_trait;
use echohub_proto::sasl::{SaslMechanism, is_final_chunk};
use echohub_proto::{Message, Response, decode_plain};
use tracing::{debug, info};

use crate::error::{ChatError, HandlerError, HandlerResult};
use crate::handlers::connection::welcome::try_register;
use crate::handlers::{Context, Handler, SaslState};

/// Capabilities this server advertises.
pub const SUPPORTED_CAPS: &[&str] = &["sasl"];

/// Upper bound on an accumulated AUTHENTICATE payload.
const MAX_SASL_PAYLOAD: usize = 8192;

/// Handler for CAP command.
pub struct CapHandler;

#[async_trait]
impl Handler for CapHandler {
    async fn handle(&self, ctx: &mut Context<'_>, msg: &Message) -> HandlerResult {
        let sub = msg
            .arg(0)
            .ok_or(HandlerError::NeedMoreParams)?
            .to_ascii_uppercase();

        match sub.as_str() {
            "LS" => {
                if !ctx.conn.is_registered() {
                    ctx.handshake.cap_negotiating = true;
                }
                cap_reply(ctx, "LS", &SUPPORTED_CAPS.join(" "))
            }
            "REQ" => {
                let requested = msg.arg(1).unwrap_or_default();
                let known = requested.split_whitespace().all(|cap| {
                    SUPPORTED_CAPS.contains(&cap.trim_start_matches('-'))
                });
                if !known || requested.trim().is_empty() {
                    return cap_reply(ctx, "NAK", requested);
                }

                for cap in requested.split_whitespace() {
                    match cap.strip_prefix('-') {
                        Some(name) => {
                            ctx.handshake.capabilities.remove(name);
                        }
                        None => {
                            ctx.handshake.capabilities.insert(cap.to_string());
                        }
                    }
                }
                cap_reply(ctx, "ACK", requested)
            }
            "LIST" => {
                let mut enabled: Vec<&str> =
                    ctx.handshake.capabilities.iter().map(String::as_str).collect();
                enabled.sort_unstable();
                cap_reply(ctx, "LIST", &enabled.join(" "))
            }
            "END" => {
                ctx.handshake.cap_negotiating = false;
                try_register(ctx).await
            }
            other => {
                debug!(conn = %ctx.conn.id(), subcommand = %other, "Unknown CAP subcommand");
                Err(HandlerError::NeedMoreParams)
            }
        }
    }
}

fn cap_reply(ctx: &Context<'_>, sub: &str, body: &str) -> HandlerResult {
    let nick = ctx.nick();
    ctx.send(
        Message::new("CAP", [nick.as_str(), sub, body])
            .with_prefix(ctx.server_name())
            .with_trailing(),
    )
}

/// Handler for AUTHENTICATE command.
pub struct AuthenticateHandler;

#[async_trait]
impl Handler for AuthenticateHandler {
    async fn handle(&self, ctx: &mut Context<'_>, msg: &Message) -> HandlerResult {
        if ctx.conn.is_registered() {
            return Err(HandlerError::AlreadyRegistered);
        }
        let arg = msg.arg(0).ok_or(HandlerError::NeedMoreParams)?;

        if arg == "*" {
            ctx.handshake.reset_sasl();
            return ctx.reply(Response::ERR_SASLFAIL, ["SASL authentication aborted"]);
        }

        match ctx.handshake.sasl_state {
            SaslState::Idle => match SaslMechanism::parse(arg) {
                SaslMechanism::Plain => {
                    ctx.handshake.sasl_state = SaslState::AwaitingPayload;
                    ctx.send(Message::new("AUTHENTICATE", ["+"]))
                }
                SaslMechanism::Unknown(name) => {
                    debug!(conn = %ctx.conn.id(), mechanism = %name, "Unsupported SASL mechanism");
                    ctx.reply(Response::ERR_SASLFAIL, ["SASL authentication failed"])
                }
            },
            SaslState::AwaitingPayload => {
                if arg != "+" {
                    ctx.handshake.sasl_buffer.push_str(arg);
                }
                if ctx.handshake.sasl_buffer.len() > MAX_SASL_PAYLOAD {
                    ctx.handshake.reset_sasl();
                    return ctx.reply(Response::ERR_SASLFAIL, ["SASL message too long"]);
                }
                if !is_final_chunk(arg) {
                    return Ok(());
                }

                let payload = std::mem::take(&mut ctx.handshake.sasl_buffer);
                ctx.handshake.reset_sasl();
                finish_plain(ctx, &payload).await
            }
        }
    }
}

async fn finish_plain(ctx: &mut Context<'_>, payload: &str) -> HandlerResult {
    let creds = match decode_plain(payload) {
        Ok(creds) => creds,
        Err(e) => {
            debug!(conn = %ctx.conn.id(), error = %e, "Malformed SASL payload");
            return ctx.reply(Response::ERR_SASLFAIL, ["SASL authentication failed"]);
        }
    };

    match ctx.chat().authenticate(&creds.authcid, &creds.password).await {
        Ok(user) => {
            info!(conn = %ctx.conn.id(), account = %user.username, "SASL login");
            let mask = ctx.hostmask();
            ctx.reply(
                Response::RPL_LOGGEDIN,
                [
                    mask,
                    user.username.clone(),
                    format!("You are now logged in as {}", user.username),
                ],
            )?;
            ctx.reply(Response::RPL_SASLSUCCESS, ["SASL authentication successful"])?;
            ctx.handshake.sasl_account = Some(user);
            Ok(())
        }
        Err(ChatError::Auth) => {
            info!(conn = %ctx.conn.id(), account = %creds.authcid, "SASL login rejected");
            ctx.reply(Response::ERR_SASLFAIL, ["SASL authentication failed"])
        }
        Err(e) => Err(HandlerError::Internal(e.to_string())),
    }
}
