//! End-to-end chat flow over a real WebSocket listener.

use futures_util::{SinkExt, StreamExt};
use palaver_protocol::{codec, Frame};
use palaver_server::config::Config;
use palaver_server::directory::{open_directory, RegisterOutcome, UserDirectory};
use palaver_server::handlers::{app, AppState};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

async fn spawn_server() -> (SocketAddr, Arc<AppState>) {
    let directory = open_directory("memory://").unwrap();
    let state = Arc::new(AppState::new(Config::default(), directory));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let router = app(Arc::clone(&state));
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    (addr, state)
}

async fn connect(addr: SocketAddr) -> Client {
    let (ws, _) = connect_async(format!("ws://{addr}/ws")).await.unwrap();
    ws
}

async fn send(client: &mut Client, frame: &Frame) {
    let text = codec::encode(frame).unwrap();
    client.send(Message::Text(text)).await.unwrap();
}

async fn recv_frame(client: &mut Client) -> Frame {
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(5), client.next())
            .await
            .expect("timed out waiting for frame")
            .expect("stream ended")
            .expect("websocket error");
        match msg {
            Message::Text(text) => return codec::decode(&text).unwrap(),
            _ => continue,
        }
    }
}

/// Wait until the server has activated `n` connections.
async fn wait_active(state: &AppState, n: usize) {
    for _ in 0..100 {
        if state.registry.stats().active == n {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("never reached {n} active connections");
}

#[tokio::test]
async fn chat_roundtrip_between_two_clients() {
    let (addr, state) = spawn_server().await;

    // Y connects first
    let mut client_y = connect(addr).await;
    assert!(matches!(recv_frame(&mut client_y).await, Frame::Welcome { .. }));
    wait_active(&state, 1).await;

    // X connects and takes the name "alice", in the directory and on
    // the connection
    let mut client_x = connect(addr).await;
    assert!(matches!(recv_frame(&mut client_x).await, Frame::Welcome { .. }));
    wait_active(&state, 2).await;

    assert_eq!(
        state.directory.register("alice").await.unwrap(),
        RegisterOutcome::Registered
    );
    send(&mut client_x, &Frame::join("alice")).await;
    assert_eq!(
        recv_frame(&mut client_x).await,
        Frame::joined("alice")
    );

    send(&mut client_x, &Frame::chat("alice", "hi")).await;

    // Both clients receive exactly one copy of the message
    assert_eq!(recv_frame(&mut client_y).await, Frame::chat("alice", "hi"));
    assert_eq!(recv_frame(&mut client_x).await, Frame::chat("alice", "hi"));

    // A follow-up message arrives next, proving no duplicate of the first
    send(&mut client_x, &Frame::chat("alice", "bye")).await;
    assert_eq!(recv_frame(&mut client_y).await, Frame::chat("alice", "bye"));

    // A second registration of the same name is rejected
    assert_eq!(
        state.directory.register("alice").await.unwrap(),
        RegisterOutcome::AlreadyExists
    );
}

#[tokio::test]
async fn invalid_message_reaches_no_one() {
    let (addr, state) = spawn_server().await;

    let mut client_a = connect(addr).await;
    assert!(matches!(recv_frame(&mut client_a).await, Frame::Welcome { .. }));
    let mut client_b = connect(addr).await;
    assert!(matches!(recv_frame(&mut client_b).await, Frame::Welcome { .. }));
    wait_active(&state, 2).await;

    // Empty body is dropped server-side
    send(&mut client_a, &Frame::chat("alice", "")).await;
    // A valid message sent afterwards is the first thing anyone receives
    send(&mut client_a, &Frame::chat("alice", "only this")).await;

    assert_eq!(
        recv_frame(&mut client_b).await,
        Frame::chat("alice", "only this")
    );
}

#[tokio::test]
async fn leave_frame_removes_connection() {
    let (addr, state) = spawn_server().await;

    let mut client = connect(addr).await;
    assert!(matches!(recv_frame(&mut client).await, Frame::Welcome { .. }));
    wait_active(&state, 1).await;

    send(&mut client, &Frame::Leave).await;
    wait_active(&state, 0).await;
    assert_eq!(state.registry.stats().connections, 0);
}

#[tokio::test]
async fn second_join_is_rejected() {
    let (addr, state) = spawn_server().await;

    let mut client = connect(addr).await;
    assert!(matches!(recv_frame(&mut client).await, Frame::Welcome { .. }));
    wait_active(&state, 1).await;

    send(&mut client, &Frame::join("alice")).await;
    assert_eq!(recv_frame(&mut client).await, Frame::joined("alice"));

    send(&mut client, &Frame::join("bob")).await;
    match recv_frame(&mut client).await {
        Frame::Error { code, .. } => assert_eq!(code, palaver_protocol::codes::ALREADY_JOINED),
        other => panic!("expected error frame, got {other:?}"),
    }
}
