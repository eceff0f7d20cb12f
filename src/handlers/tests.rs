use echohub_proto::Message;
use echohub_proto::sasl::encode_plain;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio_util::sync::CancellationToken;

use super::*;
use crate::error::{HandlerError, HandlerResult};
use crate::state::{IrcConnection, irc_connection_id};

struct Harness {
    services: IrcServices,
    registry: Registry,
}

struct Client {
    conn: Arc<IrcConnection>,
    rx: UnboundedReceiver<Message>,
    handshake: HandshakeState,
}

impl Client {
    fn drain(&mut self) -> Vec<String> {
        let mut lines = Vec::new();
        while let Ok(msg) = self.rx.try_recv() {
            self.conn.mark_written();
            lines.push(msg.to_string());
        }
        lines
    }
}

fn has_numeric(lines: &[String], code: &str) -> bool {
    lines
        .iter()
        .any(|l| l.split(' ').nth(1) == Some(code))
}

impl Harness {
    async fn new(motd: Option<Vec<String>>) -> Self {
        Self {
            services: testing::services(motd).await,
            registry: Registry::new(),
        }
    }

    fn client(&self) -> Client {
        let (conn, rx) = IrcConnection::new(
            irc_connection_id(),
            "127.0.0.1:6667".parse().unwrap(),
            CancellationToken::new(),
        );
        self.services.connections.insert(conn.clone());
        Client {
            conn,
            rx,
            handshake: HandshakeState::default(),
        }
    }

    async fn line(&self, client: &mut Client, line: &str) -> HandlerResult {
        let msg = Message::parse(line).unwrap();
        let mut ctx = Context {
            conn: &client.conn,
            services: &self.services,
            handshake: &mut client.handshake,
        };
        self.registry.dispatch(&mut ctx, &msg).await
    }

    async fn login(&self, user: &str, pass: &str) -> Client {
        let mut client = self.client();
        self.line(&mut client, &format!("PASS {}", pass)).await.unwrap();
        self.line(&mut client, &format!("NICK {}", user)).await.unwrap();
        self.line(&mut client, &format!("USER {} 0 * :{}", user, user))
            .await
            .unwrap();
        assert!(client.conn.is_registered(), "{} failed to register", user);
        client.drain();
        client
    }
}

#[tokio::test]
async fn password_registration_sends_welcome_burst() {
    let h = Harness::new(Some(vec!["be nice".into()])).await;
    let mut c = h.client();
    h.line(&mut c, "PASS secret").await.unwrap();
    h.line(&mut c, "NICK alice").await.unwrap();
    h.line(&mut c, "USER alice 0 * :Alice").await.unwrap();

    let lines = c.drain();
    for code in ["001", "002", "003", "004", "005", "375", "372", "376"] {
        assert!(has_numeric(&lines, code), "missing {} in {:?}", code, lines);
    }
    assert!(lines[0].starts_with(":irc.test 001 alice :Welcome to the TestNet Network"));
    assert!(h.services.chat.presence().is_online("alice"));
}

#[tokio::test]
async fn missing_motd_replies_422() {
    let h = Harness::new(None).await;
    let mut c = h.client();
    h.line(&mut c, "PASS secret").await.unwrap();
    h.line(&mut c, "NICK alice").await.unwrap();
    h.line(&mut c, "USER alice 0 * :Alice").await.unwrap();
    assert!(has_numeric(&c.drain(), "422"));
}

#[tokio::test]
async fn registration_needs_a_good_password() {
    let h = Harness::new(None).await;
    let mut c = h.client();
    h.line(&mut c, "NICK alice").await.unwrap();
    h.line(&mut c, "USER alice 0 * :Alice").await.unwrap();
    let lines = c.drain();
    assert!(lines.iter().any(|l| l.contains("464") && l.contains("Password required")));
    assert!(!c.conn.is_registered());

    h.line(&mut c, "PASS wrong").await.unwrap();
    h.line(&mut c, "NICK alice").await.unwrap();
    let lines = c.drain();
    assert!(lines.iter().any(|l| l.contains("464") && l.contains("Password incorrect")));
    assert!(!c.conn.is_registered());

    h.line(&mut c, "PASS secret").await.unwrap();
    h.line(&mut c, "NICK alice").await.unwrap();
    assert!(c.conn.is_registered());
}

#[tokio::test]
async fn commands_before_registration_get_451() {
    let h = Harness::new(None).await;
    let mut c = h.client();
    h.line(&mut c, "JOIN #general").await.unwrap();
    assert!(has_numeric(&c.drain(), "451"));
}

#[tokio::test]
async fn unknown_command_and_missing_params() {
    let h = Harness::new(None).await;
    let mut c = h.login("alice", "secret").await;
    h.line(&mut c, "FROBNICATE").await.unwrap();
    h.line(&mut c, "PRIVMSG #general").await.unwrap();
    h.line(&mut c, "USER a b c :d").await.unwrap();
    let lines = c.drain();
    assert!(has_numeric(&lines, "421"));
    assert!(has_numeric(&lines, "461"));
    assert!(has_numeric(&lines, "462"));
}

#[tokio::test]
async fn sasl_failure_then_retry_registers() {
    let h = Harness::new(None).await;
    let mut c = h.client();

    h.line(&mut c, "CAP LS 302").await.unwrap();
    h.line(&mut c, "CAP REQ :sasl").await.unwrap();
    let lines = c.drain();
    assert!(lines.iter().any(|l| l.contains("CAP * LS :sasl")));
    assert!(lines.iter().any(|l| l.contains("CAP * ACK :sasl")));

    h.line(&mut c, "AUTHENTICATE PLAIN").await.unwrap();
    assert_eq!(c.drain(), vec!["AUTHENTICATE +".to_string()]);
    h.line(&mut c, &format!("AUTHENTICATE {}", encode_plain("bob", "wrongpassword")))
        .await
        .unwrap();
    assert!(has_numeric(&c.drain(), "904"));
    assert!(!c.conn.is_registered());

    h.line(&mut c, "AUTHENTICATE PLAIN").await.unwrap();
    h.line(&mut c, &format!("AUTHENTICATE {}", encode_plain("bob", "hunter2")))
        .await
        .unwrap();
    let lines = c.drain();
    assert!(has_numeric(&lines, "900"));
    assert!(has_numeric(&lines, "903"));

    h.line(&mut c, "NICK bob").await.unwrap();
    h.line(&mut c, "USER bob 0 * :Bob").await.unwrap();
    assert!(!c.conn.is_registered(), "held until CAP END");
    h.line(&mut c, "CAP END").await.unwrap();
    assert!(c.conn.is_registered());
    assert!(has_numeric(&c.drain(), "001"));
}

#[tokio::test]
async fn sasl_unknown_mechanism_and_abort() {
    let h = Harness::new(None).await;
    let mut c = h.client();
    h.line(&mut c, "AUTHENTICATE EXTERNAL").await.unwrap();
    assert!(has_numeric(&c.drain(), "904"));

    h.line(&mut c, "AUTHENTICATE PLAIN").await.unwrap();
    h.line(&mut c, "AUTHENTICATE *").await.unwrap();
    let lines = c.drain();
    assert!(lines.iter().any(|l| l.contains("904") && l.contains("aborted")));
    assert_eq!(c.handshake.sasl_state, SaslState::Idle);
}

#[tokio::test]
async fn cap_nak_for_unknown_capability() {
    let h = Harness::new(None).await;
    let mut c = h.client();
    h.line(&mut c, "CAP REQ :sasl multi-prefix").await.unwrap();
    assert!(c.drain().iter().any(|l| l.contains("NAK")));
    assert!(c.handshake.capabilities.is_empty());
}

#[tokio::test]
async fn nick_is_bound_to_the_account() {
    let h = Harness::new(None).await;
    let mut c = h.client();
    h.line(&mut c, "PASS secret").await.unwrap();
    h.line(&mut c, "NICK Alice").await.unwrap();
    h.line(&mut c, "USER alice 0 * :Alice").await.unwrap();
    let lines = c.drain();
    assert!(lines.iter().any(|l| l.starts_with(":Alice!alice@echohub NICK :alice")));

    h.line(&mut c, "NICK ALICE").await.unwrap();
    assert!(c.drain().iter().any(|l| l.ends_with("NICK :ALICE")));

    let _bob = h.login("bob", "hunter2").await;
    h.line(&mut c, "NICK bob").await.unwrap();
    h.line(&mut c, "NICK mallory").await.unwrap();
    h.line(&mut c, "NICK").await.unwrap();
    let lines = c.drain();
    assert!(has_numeric(&lines, "433"));
    assert!(has_numeric(&lines, "432"));
    assert!(has_numeric(&lines, "431"));
}

#[tokio::test]
async fn join_sends_echo_topic_names_and_history() {
    let h = Harness::new(None).await;
    let mut alice = h.login("alice", "secret").await;
    h.line(&mut alice, "JOIN #General").await.unwrap();
    h.line(&mut alice, "PRIVMSG #general :time is 12:30:00").await.unwrap();
    let lines = alice.drain();
    assert!(lines.iter().any(|l| l == ":alice!alice@echohub JOIN #general"));
    assert!(has_numeric(&lines, "331"));
    assert!(lines.iter().any(|l| l.contains(" 353 alice = #general :alice")));
    assert!(has_numeric(&lines, "366"));
    assert!(!lines.iter().any(|l| l.contains("PRIVMSG")), "no self echo");

    let mut bob = h.login("bob", "hunter2").await;
    h.line(&mut bob, "JOIN #general").await.unwrap();
    let lines = bob.drain();
    assert!(lines
        .iter()
        .any(|l| l == ":alice!alice@echohub PRIVMSG #general :time is 12:30:00"));

    assert!(alice
        .drain()
        .iter()
        .any(|l| l == ":bob!bob@echohub JOIN #general"));
}

#[tokio::test]
async fn rejoin_does_not_repeat_join() {
    let h = Harness::new(None).await;
    let mut alice = h.login("alice", "secret").await;
    let mut bob = h.login("bob", "hunter2").await;
    h.line(&mut bob, "JOIN #general").await.unwrap();
    bob.drain();

    h.line(&mut alice, "JOIN #general,#GENERAL").await.unwrap();
    let joins = bob.drain().iter().filter(|l| l.contains("JOIN")).count();
    assert_eq!(joins, 1);
}

#[tokio::test]
async fn messages_reach_other_members() {
    let h = Harness::new(None).await;
    let mut alice = h.login("alice", "secret").await;
    let mut carol = h.login("carol", "pw").await;
    h.line(&mut alice, "JOIN #general").await.unwrap();
    h.line(&mut carol, "JOIN #general").await.unwrap();
    alice.drain();
    carol.drain();

    h.line(&mut alice, "PRIVMSG #general :hello").await.unwrap();
    assert_eq!(
        carol.drain(),
        vec![":alice!alice@echohub PRIVMSG #general :hello".to_string()]
    );
    assert!(alice.drain().is_empty());
}

#[tokio::test]
async fn private_messages_and_bad_sends_are_refused() {
    let h = Harness::new(None).await;
    let mut alice = h.login("alice", "secret").await;
    h.line(&mut alice, "PRIVMSG bob :hi").await.unwrap();
    h.line(&mut alice, "PRIVMSG #nowhere :hi").await.unwrap();
    let lines = alice.drain();
    assert!(lines.iter().any(|l| l.contains("401") && l.contains("not supported")));
    assert!(lines
        .iter()
        .any(|l| l.contains("404") && l.contains("Cannot send to channel")));
}

#[tokio::test]
async fn part_echoes_and_requires_membership() {
    let h = Harness::new(None).await;
    let mut alice = h.login("alice", "secret").await;
    h.line(&mut alice, "PART #general").await.unwrap();
    assert!(has_numeric(&alice.drain(), "442"));

    h.line(&mut alice, "JOIN #general").await.unwrap();
    alice.drain();
    h.line(&mut alice, "PART #general :bye now").await.unwrap();
    assert!(alice
        .drain()
        .iter()
        .any(|l| l == ":alice!alice@echohub PART #general :bye now"));
    assert!(!alice.conn.in_channel("general"));
}

#[tokio::test]
async fn join_zero_parts_everything() {
    let h = Harness::new(None).await;
    let mut alice = h.login("alice", "secret").await;
    h.line(&mut alice, "JOIN #a,#b").await.unwrap();
    alice.drain();
    h.line(&mut alice, "JOIN 0").await.unwrap();
    let parts = alice.drain().iter().filter(|l| l.contains(" PART ")).count();
    assert_eq!(parts, 2);
    assert!(alice.conn.channels().is_empty());
}

#[tokio::test]
async fn topic_is_read_only() {
    let h = Harness::new(None).await;
    let mut alice = h.login("alice", "secret").await;
    h.line(&mut alice, "JOIN #general").await.unwrap();
    alice.drain();
    h.line(&mut alice, "TOPIC #general :new topic").await.unwrap();
    h.line(&mut alice, "TOPIC #general").await.unwrap();
    h.line(&mut alice, "TOPIC #missing").await.unwrap();
    let lines = alice.drain();
    assert!(has_numeric(&lines, "482"));
    assert!(has_numeric(&lines, "331"));
    assert!(has_numeric(&lines, "403"));
}

#[tokio::test]
async fn invalid_channel_names_get_403() {
    let h = Harness::new(None).await;
    let mut alice = h.login("alice", "secret").await;
    h.line(&mut alice, "JOIN #bad!name").await.unwrap();
    assert!(has_numeric(&alice.drain(), "403"));
}

#[tokio::test]
async fn away_toggles_and_shows_in_who_and_whois() {
    let h = Harness::new(None).await;
    let mut alice = h.login("alice", "secret").await;
    let mut bob = h.login("bob", "hunter2").await;
    h.line(&mut alice, "JOIN #general").await.unwrap();
    h.line(&mut alice, "AWAY :lunch").await.unwrap();
    assert!(has_numeric(&alice.drain(), "306"));

    h.line(&mut bob, "WHO #general").await.unwrap();
    h.line(&mut bob, "WHOIS alice").await.unwrap();
    let lines = bob.drain();
    assert!(lines
        .iter()
        .any(|l| l.contains(" 352 bob #general alice echohub irc.test alice G :0 alice")));
    assert!(has_numeric(&lines, "315"));
    assert!(lines.iter().any(|l| l.contains(" 301 bob alice :lunch")));
    assert!(lines.iter().any(|l| l.contains(" 319 bob alice :#general")));
    assert!(has_numeric(&lines, "317"));
    assert!(has_numeric(&lines, "318"));

    h.line(&mut alice, "AWAY").await.unwrap();
    assert!(has_numeric(&alice.drain(), "305"));
}

#[tokio::test]
async fn whois_unknown_user_is_401() {
    let h = Harness::new(None).await;
    let mut alice = h.login("alice", "secret").await;
    h.line(&mut alice, "WHOIS ghost").await.unwrap();
    let lines = alice.drain();
    assert!(has_numeric(&lines, "401"));
    assert!(has_numeric(&lines, "318"));
}

#[tokio::test]
async fn list_names_mode_and_motd() {
    let h = Harness::new(Some(vec!["hi".into()])).await;
    let mut alice = h.login("alice", "secret").await;
    h.line(&mut alice, "JOIN #general").await.unwrap();
    alice.drain();

    h.line(&mut alice, "LIST").await.unwrap();
    h.line(&mut alice, "NAMES").await.unwrap();
    h.line(&mut alice, "MODE #general").await.unwrap();
    h.line(&mut alice, "MODE alice +i").await.unwrap();
    h.line(&mut alice, "MOTD").await.unwrap();
    let lines = alice.drain();
    assert!(lines.iter().any(|l| l.contains(" 322 alice #general 1 :")));
    assert!(has_numeric(&lines, "323"));
    assert!(has_numeric(&lines, "353"));
    assert!(lines.iter().any(|l| l.contains(" 324 alice #general :+")));
    assert!(lines.iter().any(|l| l.contains(" 221 alice :+")));
    assert!(has_numeric(&lines, "372"));
}

#[tokio::test]
async fn ping_and_quit() {
    let h = Harness::new(None).await;
    let mut c = h.client();
    h.line(&mut c, "PING :abc").await.unwrap();
    assert_eq!(c.drain(), vec![":irc.test PONG irc.test :abc".to_string()]);

    let result = h.line(&mut c, "QUIT").await;
    assert!(matches!(result, Err(HandlerError::Quit(Some(ref r))) if r == "Client quit"));
    assert_eq!(c.drain(), vec!["ERROR :Closing Link: * (Client quit)".to_string()]);
}
