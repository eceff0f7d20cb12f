//! Test fixtures: handler services over an in-memory database with three
//! accounts (`alice`/`secret`, `bob`/`hunter2`, `carol`/`pw`) and an IRC
//! broadcaster wired to the connection registry.

use std::sync::Arc;

use super::{IrcServices, ServerInfo};
use crate::broadcast::{Broadcaster, Broadcasters, IrcBroadcaster};
use crate::chat::{ChatService, ChatSettings, NoopEmbedFetcher, Role};
use crate::config::LimitsConfig;
use crate::crypto::Envelope;
use crate::db::Database;
use crate::format::IrcFormatter;
use crate::state::{IrcRegistry, PresenceTracker};

pub async fn services(motd: Option<Vec<String>>) -> IrcServices {
    let db = Database::new(":memory:").await.unwrap();
    for (name, pass) in [("alice", "secret"), ("bob", "hunter2"), ("carol", "pw")] {
        db.users().create(name, pass, Role::User).await.unwrap();
    }

    let limits = LimitsConfig::default();
    let envelope = Arc::new(Envelope::new("handler-test").unwrap());
    let connections = Arc::new(IrcRegistry::new());
    let formatter = IrcFormatter::new("echohub", &limits);
    let adapter: Arc<dyn Broadcaster> = Arc::new(IrcBroadcaster::new(
        connections.clone(),
        envelope.clone(),
        formatter.clone(),
        "irc.test",
    ));
    let chat = Arc::new(ChatService::new(
        db,
        envelope.clone(),
        Arc::new(PresenceTracker::new()),
        Broadcasters::new(vec![adapter]),
        Arc::new(NoopEmbedFetcher),
        ChatSettings {
            limits: limits.clone(),
            ..ChatSettings::default()
        },
    ));

    let info = ServerInfo {
        name: "irc.test".into(),
        network: "TestNet".into(),
        description: "test server".into(),
        version: "echohub-test".into(),
        created: "today".into(),
        motd,
        max_channel_name: limits.max_channel_name,
    };

    IrcServices {
        info,
        chat,
        connections,
        formatter,
        envelope,
    }
}
