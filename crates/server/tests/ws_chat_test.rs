mod common;

use common::ws_helpers::{drain_messages, send_json, start_server, ws_connect};
use serde_json::json;

#[tokio::test]
async fn join_chat_rejects_non_member_and_blocks_fanout() {
    let (base, pool) = start_server().await;
    let (alice_id, alice_token) = common::create_test_user(&pool, "vc-alice", "alice").await;
    let (_, carol_token) = common::create_test_user(&pool, "vc-carol", "carol").await;
    let chat_id = common::create_file_chat(&pool, &alice_id, "F1", "plan.pdf").await;

    let mut alice_ws = ws_connect(&base, &alice_token).await;
    let mut carol_ws = ws_connect(&base, &carol_token).await;
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    drain_messages(&mut carol_ws).await;

    send_json(&mut carol_ws, &json!({"type": "join_chat", "chatId": chat_id})).await;
    tokio::time::sleep(std::time::Duration::from_millis(200)).await;

    let msgs = drain_messages(&mut carol_ws).await;
    let denied = msgs.iter().any(|m| m["type"] == "error");
    assert!(denied, "non-member join should produce an error event: {:?}", msgs);

    // Carol was not subscribed: alice's message never reaches her
    send_json(&mut alice_ws, &json!({"type": "join_chat", "chatId": chat_id})).await;
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    send_json(
        &mut alice_ws,
        &json!({"type": "send_message", "chatId": chat_id, "content": "secret"}),
    )
    .await;
    tokio::time::sleep(std::time::Duration::from_millis(300)).await;

    let msgs = drain_messages(&mut carol_ws).await;
    let leaked = msgs.iter().any(|m| m["type"] == "new_message");
    assert!(!leaked, "non-member must not receive room fan-out");
}

#[tokio::test]
async fn join_chats_bulk_subscribes_all_rooms() {
    let (base, pool) = start_server().await;
    let (alice_id, alice_token) = common::create_test_user(&pool, "vc-alice", "alice").await;
    let (bob_id, bob_token) = common::create_test_user(&pool, "vc-bob", "bob").await;
    let chat_a = common::create_file_chat(&pool, &alice_id, "F1", "a.dwg").await;
    let chat_b = common::create_file_chat(&pool, &alice_id, "F2", "b.dwg").await;
    common::add_chat_member(&pool, &chat_a, &bob_id, "member").await;
    common::add_chat_member(&pool, &chat_b, &bob_id, "member").await;

    let mut alice_ws = ws_connect(&base, &alice_token).await;
    let mut bob_ws = ws_connect(&base, &bob_token).await;
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;

    send_json(&mut bob_ws, &json!({"type": "join_chats"})).await;
    send_json(&mut alice_ws, &json!({"type": "join_chats"})).await;
    tokio::time::sleep(std::time::Duration::from_millis(200)).await;
    drain_messages(&mut bob_ws).await;

    for (chat_id, text) in [(&chat_a, "in a"), (&chat_b, "in b")] {
        send_json(
            &mut alice_ws,
            &json!({"type": "send_message", "chatId": chat_id, "content": text}),
        )
        .await;
    }
    tokio::time::sleep(std::time::Duration::from_millis(300)).await;

    let msgs = drain_messages(&mut bob_ws).await;
    for text in ["in a", "in b"] {
        let got = msgs
            .iter()
            .any(|m| m["type"] == "new_message" && m["message"]["content"] == text);
        assert!(got, "bob should receive '{}' after bulk join: {:?}", text, msgs);
    }
}

#[tokio::test]
async fn send_message_fans_out_populated_payload() {
    let (base, pool) = start_server().await;
    let (alice_id, alice_token) = common::create_test_user(&pool, "vc-alice", "alice").await;
    let (bob_id, bob_token) = common::create_test_user(&pool, "vc-bob", "bob").await;
    let chat_id = common::create_file_chat(&pool, &alice_id, "F1", "plan.pdf").await;
    common::add_chat_member(&pool, &chat_id, &bob_id, "member").await;

    let mut alice_ws = ws_connect(&base, &alice_token).await;
    let mut bob_ws = ws_connect(&base, &bob_token).await;
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    send_json(&mut alice_ws, &json!({"type": "join_chat", "chatId": chat_id})).await;
    send_json(&mut bob_ws, &json!({"type": "join_chat", "chatId": chat_id})).await;
    tokio::time::sleep(std::time::Duration::from_millis(200)).await;
    drain_messages(&mut alice_ws).await;
    drain_messages(&mut bob_ws).await;

    send_json(
        &mut alice_ws,
        &json!({"type": "send_message", "chatId": chat_id, "content": "hello bob"}),
    )
    .await;
    tokio::time::sleep(std::time::Duration::from_millis(300)).await;

    let msgs = drain_messages(&mut bob_ws).await;
    let msg = msgs
        .iter()
        .find(|m| m["type"] == "new_message")
        .expect("bob should receive the message");
    assert_eq!(msg["chatId"], chat_id.as_str());
    assert_eq!(msg["message"]["content"], "hello bob");
    assert_eq!(msg["message"]["kind"], "text");
    assert_eq!(msg["message"]["sender"]["id"], alice_id.as_str());
    assert_eq!(msg["message"]["sender"]["name"], "alice");

    // Sender's own connection gets the fan-out too
    let msgs = drain_messages(&mut alice_ws).await;
    assert!(msgs.iter().any(|m| m["type"] == "new_message"));

    // The chat's latest-message pointer advanced
    let last = sqlx::query_scalar::<_, Option<String>>(
        "SELECT last_message_id FROM chats WHERE id = ?",
    )
    .bind(&chat_id)
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(last.as_deref(), msg["message"]["id"].as_str());
}

#[tokio::test]
async fn send_message_resolves_reply_target() {
    let (base, pool) = start_server().await;
    let (alice_id, alice_token) = common::create_test_user(&pool, "vc-alice", "alice").await;
    let chat_id = common::create_file_chat(&pool, &alice_id, "F1", "plan.pdf").await;
    let original =
        common::insert_message_at(&pool, &chat_id, &alice_id, "original", "2026-01-01T00:00:01Z")
            .await;

    let mut ws = ws_connect(&base, &alice_token).await;
    send_json(&mut ws, &json!({"type": "join_chat", "chatId": chat_id})).await;
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    drain_messages(&mut ws).await;

    send_json(
        &mut ws,
        &json!({
            "type": "send_message",
            "chatId": chat_id,
            "content": "replying",
            "replyTo": original
        }),
    )
    .await;
    tokio::time::sleep(std::time::Duration::from_millis(300)).await;

    let msgs = drain_messages(&mut ws).await;
    let msg = msgs
        .iter()
        .find(|m| m["type"] == "new_message")
        .expect("should receive reply");
    assert_eq!(msg["message"]["replyTo"]["id"], original.as_str());
    assert_eq!(msg["message"]["replyTo"]["content"], "original");
    assert_eq!(msg["message"]["replyTo"]["senderName"], "alice");
}

#[tokio::test]
async fn send_message_enforces_length_limit() {
    let (base, pool) = start_server().await;
    let (alice_id, alice_token) = common::create_test_user(&pool, "vc-alice", "alice").await;
    let chat_id = common::create_file_chat(&pool, &alice_id, "F1", "plan.pdf").await;

    let mut ws = ws_connect(&base, &alice_token).await;
    send_json(&mut ws, &json!({"type": "join_chat", "chatId": chat_id})).await;
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    drain_messages(&mut ws).await;

    let long = "x".repeat(4001);
    send_json(
        &mut ws,
        &json!({"type": "send_message", "chatId": chat_id, "content": long}),
    )
    .await;
    tokio::time::sleep(std::time::Duration::from_millis(300)).await;

    let msgs = drain_messages(&mut ws).await;
    assert!(msgs.iter().any(|m| m["type"] == "error"));

    let count = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM messages WHERE chat_id = ?",
    )
    .bind(&chat_id)
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(count, 0);
}

#[tokio::test]
async fn member_join_marks_read_and_notifies_room() {
    let (base, pool) = start_server().await;
    let (alice_id, alice_token) = common::create_test_user(&pool, "vc-alice", "alice").await;
    let (bob_id, bob_token) = common::create_test_user(&pool, "vc-bob", "bob").await;
    let chat_id = common::create_file_chat(&pool, &alice_id, "F1", "plan.pdf").await;
    common::add_chat_member(&pool, &chat_id, &bob_id, "member").await;
    common::insert_message_at(&pool, &chat_id, &alice_id, "unread one", "2026-01-01T00:00:01Z")
        .await;

    let mut alice_ws = ws_connect(&base, &alice_token).await;
    send_json(&mut alice_ws, &json!({"type": "join_chat", "chatId": chat_id})).await;
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    drain_messages(&mut alice_ws).await;

    let mut bob_ws = ws_connect(&base, &bob_token).await;
    send_json(&mut bob_ws, &json!({"type": "join_chat", "chatId": chat_id})).await;
    tokio::time::sleep(std::time::Duration::from_millis(300)).await;

    let msgs = drain_messages(&mut alice_ws).await;
    let read = msgs.iter().any(|m| {
        m["type"] == "messages_read"
            && m["chatId"] == chat_id.as_str()
            && m["userId"] == bob_id.as_str()
    });
    assert!(read, "alice should be told bob read the chat: {:?}", msgs);

    let receipts = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM message_reads WHERE user_id = ?",
    )
    .bind(&bob_id)
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(receipts, 1);
}

#[tokio::test]
async fn leave_chat_stops_fanout() {
    let (base, pool) = start_server().await;
    let (alice_id, alice_token) = common::create_test_user(&pool, "vc-alice", "alice").await;
    let (bob_id, bob_token) = common::create_test_user(&pool, "vc-bob", "bob").await;
    let chat_id = common::create_file_chat(&pool, &alice_id, "F1", "plan.pdf").await;
    common::add_chat_member(&pool, &chat_id, &bob_id, "member").await;

    let mut alice_ws = ws_connect(&base, &alice_token).await;
    let mut bob_ws = ws_connect(&base, &bob_token).await;
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    send_json(&mut alice_ws, &json!({"type": "join_chat", "chatId": chat_id})).await;
    send_json(&mut bob_ws, &json!({"type": "join_chat", "chatId": chat_id})).await;
    tokio::time::sleep(std::time::Duration::from_millis(200)).await;

    send_json(&mut bob_ws, &json!({"type": "leave_chat", "chatId": chat_id})).await;
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    drain_messages(&mut bob_ws).await;

    send_json(
        &mut alice_ws,
        &json!({"type": "send_message", "chatId": chat_id, "content": "anyone there"}),
    )
    .await;
    tokio::time::sleep(std::time::Duration::from_millis(300)).await;

    let msgs = drain_messages(&mut bob_ws).await;
    assert!(
        !msgs.iter().any(|m| m["type"] == "new_message"),
        "bob should not receive messages after leaving"
    );
}
