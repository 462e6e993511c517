use std::sync::Arc;

use serde_json::json;
use shared::{
    domain::{DirectMessageSession, EntityKind},
    error::ClientError,
};

use crate::{
    directory::Directory,
    resolver::Resolver,
    test_support::{channel_list, group_list, user_list, FakeRpc},
};

fn resolver(rpc: &Arc<FakeRpc>) -> (Resolver, Arc<Directory>) {
    let directory = Arc::new(Directory::new(rpc.clone(), true));
    (Resolver::new(Arc::clone(&directory), rpc.clone()), directory)
}

#[tokio::test]
async fn id_for_returns_entity_id_or_none() {
    let rpc = FakeRpc::new();
    rpc.reply("groups.list", group_list());
    let (resolver, _) = resolver(&rpc);

    assert_eq!(
        resolver.id_for(EntityKind::Group, "admins").await.expect("id"),
        Some("G1".to_string())
    );
    assert_eq!(
        resolver.id_for(EntityKind::Group, "nobody").await.expect("id"),
        None
    );
}

#[tokio::test]
async fn chat_id_for_reuses_known_session_without_opening() {
    let rpc = FakeRpc::new();
    rpc.reply("users.list", user_list());
    let (resolver, directory) = resolver(&rpc);
    directory
        .seed_dm_sessions(vec![DirectMessageSession::new("D1", "U1")])
        .await;

    let chat_id = resolver.chat_id_for("alice").await.expect("chat id");

    assert_eq!(chat_id, Some("D1".to_string()));
    assert_eq!(rpc.call_count("im.open"), 0);
}

#[tokio::test]
async fn chat_id_for_opens_one_session_and_remembers_it() {
    let rpc = FakeRpc::new();
    rpc.reply("users.list", user_list());
    rpc.reply("im.open", json!({"channel": {"id": "D2"}}));
    let (resolver, directory) = resolver(&rpc);

    assert_eq!(
        resolver.chat_id_for("bob").await.expect("chat id"),
        Some("D2".to_string())
    );
    assert_eq!(rpc.call_count("im.open"), 1);
    assert_eq!(
        rpc.last_params("im.open").get("user"),
        Some(&json!("U2"))
    );
    assert_eq!(
        directory.find_dm_session("U2").await,
        Some(DirectMessageSession::new("D2", "U2"))
    );

    assert_eq!(
        resolver.chat_id_for("bob").await.expect("chat id"),
        Some("D2".to_string())
    );
    assert_eq!(rpc.call_count("im.open"), 1);
}

#[tokio::test]
async fn chat_id_for_unknown_user_does_not_open() {
    let rpc = FakeRpc::new();
    rpc.reply("users.list", user_list());
    let (resolver, _) = resolver(&rpc);

    assert_eq!(resolver.chat_id_for("mallory").await.expect("chat id"), None);
    assert_eq!(rpc.call_count("im.open"), 0);
}

#[tokio::test]
async fn failed_open_is_reported_and_not_remembered() {
    let rpc = FakeRpc::new();
    rpc.reply("users.list", user_list());
    rpc.fail("im.open", "user_not_found");
    let (resolver, directory) = resolver(&rpc);

    let err = resolver.chat_id_for("bob").await.expect_err("open fails");
    assert!(matches!(err, ClientError::Api { .. }));
    assert!(directory.find_dm_session("U2").await.is_none());
}

#[tokio::test]
async fn infer_kind_prefers_channel_over_user() {
    let rpc = FakeRpc::new();
    rpc.reply("channels.list", channel_list());
    rpc.reply("users.list", user_list());
    let (resolver, _) = resolver(&rpc);

    assert_eq!(
        resolver.infer_kind("shared").await.expect("kind"),
        Some(EntityKind::Channel)
    );
    assert_eq!(rpc.call_count("users.list"), 0);
}

#[tokio::test]
async fn infer_kind_prefers_user_over_group() {
    let rpc = FakeRpc::new();
    rpc.reply("channels.list", channel_list());
    rpc.reply("users.list", user_list());
    rpc.reply("groups.list", group_list());
    let (resolver, _) = resolver(&rpc);

    assert_eq!(
        resolver.infer_kind("bob").await.expect("kind"),
        Some(EntityKind::User)
    );
    assert_eq!(
        resolver.infer_kind("admins").await.expect("kind"),
        Some(EntityKind::Group)
    );
    assert_eq!(resolver.infer_kind("nobody").await.expect("kind"), None);
    assert_eq!(rpc.call_count("groups.list"), 1);
}
