use edge_rooms::ChatRoom;
use serde_json::Value;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::timeout;

const POLL: Duration = Duration::from_millis(10);

async fn recv_frame(rx: &mut mpsc::UnboundedReceiver<String>) -> Value {
    let text = timeout(Duration::from_secs(1), rx.recv())
        .await
        .expect("frame within deadline")
        .expect("channel open");
    serde_json::from_str(&text).expect("json frame")
}

#[tokio::test]
async fn session_ids_increase_strictly_from_one() {
    let room = ChatRoom::new(POLL);
    let (tx, _rx) = mpsc::unbounded_channel();
    assert_eq!(room.add_session(tx.clone()), 1);
    assert_eq!(room.add_session(tx.clone()), 2);
    // 关闭不回收 id
    room.close_session(2);
    assert_eq!(room.add_session(tx), 3);
}

#[tokio::test]
async fn set_user_name_is_password_gated() {
    let room = ChatRoom::new(POLL);
    let (tx0, mut rx0) = mpsc::unbounded_channel();
    let (tx1, mut rx1) = mpsc::unbounded_channel();
    let (tx2, mut rx2) = mpsc::unbounded_channel();
    let s0 = room.add_session(tx0);
    let s1 = room.add_session(tx1);
    let s2 = room.add_session(tx2);

    room.handle_message(s0, r#"{"Type":"SetUserName","UserName":"Hatem","Password":"A"}"#);
    let frame = recv_frame(&mut rx0).await;
    assert_eq!(frame["Type"], "SetUserNameResult");
    assert_eq!(frame["Success"], true);

    // 同名不同口令：拒绝
    room.handle_message(s1, r#"{"Type":"SetUserName","UserName":"Hatem","Password":"B"}"#);
    let frame = recv_frame(&mut rx1).await;
    assert_eq!(frame["Success"], false);

    // 同名同口令：允许复用
    room.handle_message(s2, r#"{"Type":"SetUserName","UserName":"Hatem","Password":"A"}"#);
    let frame = recv_frame(&mut rx2).await;
    assert_eq!(frame["Success"], true);

    // 去重后的用户名列表
    room.handle_message(s0, r#"{"Type":"GetUserNames"}"#);
    let frame = recv_frame(&mut rx0).await;
    assert_eq!(frame["Type"], "UserNames");
    assert_eq!(frame["UserNames"], serde_json::json!(["Hatem"]));
}

#[tokio::test]
async fn post_chat_broadcasts_to_every_session() {
    let room = ChatRoom::new(POLL);
    let (tx0, mut rx0) = mpsc::unbounded_channel();
    let (tx1, mut rx1) = mpsc::unbounded_channel();
    let s0 = room.add_session(tx0);
    let _s1 = room.add_session(tx1);

    room.handle_message(s0, r#"{"Type":"SetUserName","UserName":"Hatem","Password":"A"}"#);
    let _ = recv_frame(&mut rx0).await;

    room.handle_message(s0, r#"{"Type":"PostChat","Chat":"hello"}"#);
    let frame0 = recv_frame(&mut rx0).await;
    let frame1 = recv_frame(&mut rx1).await;
    for frame in [frame0, frame1] {
        assert_eq!(frame["Type"], "PostChatResult");
        assert_eq!(frame["Sender"], "Hatem");
        assert_eq!(frame["Chat"], "hello");
    }
}

#[tokio::test]
async fn join_returns_log_and_names() {
    let room = ChatRoom::new(POLL);
    let (tx0, mut rx0) = mpsc::unbounded_channel();
    let s0 = room.add_session(tx0);
    room.handle_message(s0, r#"{"Type":"SetUserName","UserName":"Hatem","Password":"A"}"#);
    let _ = recv_frame(&mut rx0).await;
    room.handle_message(s0, r#"{"Type":"PostChat","Chat":"hello"}"#);
    let _ = recv_frame(&mut rx0).await;

    let (tx1, mut rx1) = mpsc::unbounded_channel();
    let s1 = room.add_session(tx1);
    room.handle_message(s1, r#"{"Type":"JoinChatRoom"}"#);
    let frame = recv_frame(&mut rx1).await;
    assert_eq!(frame["Type"], "JoinChatRoomResponse");
    assert_eq!(frame["ChatLog"][0]["Chat"], "hello");
    assert_eq!(frame["UserNames"], serde_json::json!(["Hatem"]));
}

#[tokio::test]
async fn closing_last_session_of_a_name_broadcasts_leave() {
    let room = ChatRoom::new(POLL);
    let worker = room.start();

    let (tx0, mut rx0) = mpsc::unbounded_channel();
    let (tx1, mut rx1) = mpsc::unbounded_channel();
    let s0 = room.add_session(tx0);
    let s1 = room.add_session(tx1);

    room.handle_message(s0, r#"{"Type":"SetUserName","UserName":"Hatem","Password":"A"}"#);
    let _ = recv_frame(&mut rx0).await;
    room.handle_message(s1, r#"{"Type":"SetUserName","UserName":"Maya","Password":"B"}"#);
    let _ = recv_frame(&mut rx1).await;

    room.close_session(s1);

    // worker 扫描后：Leave，然后刷新的 UserNames
    let frame = recv_frame(&mut rx0).await;
    assert_eq!(frame["Type"], "Leave");
    assert_eq!(frame["UserName"], "Maya");
    let frame = recv_frame(&mut rx0).await;
    assert_eq!(frame["Type"], "UserNames");
    assert_eq!(frame["UserNames"], serde_json::json!(["Hatem"]));

    room.stop();
    let _ = timeout(Duration::from_secs(1), worker).await;
}

#[tokio::test]
async fn second_session_with_same_name_suppresses_leave() {
    let room = ChatRoom::new(POLL);
    let worker = room.start();

    let (tx0, mut rx0) = mpsc::unbounded_channel();
    let (tx1, mut rx1) = mpsc::unbounded_channel();
    let s0 = room.add_session(tx0);
    let s1 = room.add_session(tx1);

    room.handle_message(s0, r#"{"Type":"SetUserName","UserName":"Hatem","Password":"A"}"#);
    let _ = recv_frame(&mut rx0).await;
    room.handle_message(s1, r#"{"Type":"SetUserName","UserName":"Hatem","Password":"A"}"#);
    let _ = recv_frame(&mut rx1).await;

    room.close_session(s1);
    tokio::time::sleep(Duration::from_millis(100)).await;
    // 同名会话仍在：没有 Leave 广播
    assert!(rx0.try_recv().is_err());

    room.stop();
    let _ = timeout(Duration::from_secs(1), worker).await;
}
