use canvas_core::{BroadcastHub, PanelSet, PanelStore, PersistenceManager};
use canvas_server::{router, serve, ws_router, AgentBrowserCapture, AppState};
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

struct Canvas {
    http_port: u16,
    ws_port: u16,
    store: Arc<PanelStore>,
    _root: TempDir,
}

async fn spawn_canvas(initial: PanelSet) -> Canvas {
    let root = TempDir::new().expect("temp root");
    let http = TcpListener::bind("127.0.0.1:0").await.expect("bind http");
    let ws = TcpListener::bind("127.0.0.1:0").await.expect("bind ws");
    let http_port = http.local_addr().expect("http addr").port();
    let ws_port = ws.local_addr().expect("ws addr").port();
    let store = Arc::new(PanelStore::new(
        initial,
        PersistenceManager::new(root.path().join("state.json")),
        Arc::new(BroadcastHub::default()),
        root.path(),
    ));
    let state = AppState::new(
        store.clone(),
        Arc::new(AgentBrowserCapture::default()),
        http_port,
        ws_port,
    );
    tokio::spawn(serve(http, router(state.clone()), std::future::pending()));
    tokio::spawn(serve(ws, ws_router(state), std::future::pending()));
    Canvas {
        http_port,
        ws_port,
        store,
        _root: root,
    }
}

async fn connect(url: &str) -> Socket {
    let (socket, _) = connect_async(url).await.expect("ws connect");
    socket
}

async fn next_json(socket: &mut Socket) -> Value {
    loop {
        let frame = tokio::time::timeout(Duration::from_secs(5), socket.next())
            .await
            .expect("frame before timeout")
            .expect("stream open")
            .expect("frame ok");
        if let Message::Text(text) = frame {
            return serde_json::from_str(&text).expect("event json");
        }
    }
}

async fn wait_for_subscribers(store: &PanelStore, count: usize) {
    for _ in 0..100 {
        if store.hub().subscriber_count() == count {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("expected {count} subscribers");
}

#[tokio::test]
async fn late_joiner_gets_bootstrap_replay_then_live_events() {
    let mut initial = PanelSet::new();
    initial.insert("a".to_string(), "<p>a</p>".to_string());
    initial.insert("b".to_string(), "<p>b</p>".to_string());
    let canvas = spawn_canvas(initial).await;

    let mut socket = connect(&format!("ws://127.0.0.1:{}/ws", canvas.http_port)).await;
    assert_eq!(
        next_json(&mut socket).await,
        json!({"type": "render", "panel": "a", "html": "<p>a</p>"})
    );
    assert_eq!(
        next_json(&mut socket).await,
        json!({"type": "render", "panel": "b", "html": "<p>b</p>"})
    );

    canvas
        .store
        .render(Some("c"), "<p>c</p>".to_string())
        .await
        .expect("render");
    assert_eq!(
        next_json(&mut socket).await,
        json!({"type": "panel_created", "panel": "c"})
    );
    assert_eq!(
        next_json(&mut socket).await,
        json!({"type": "render", "panel": "c", "html": "<p>c</p>"})
    );

    canvas.store.rename_panel("c", "d").await.expect("rename");
    assert_eq!(
        next_json(&mut socket).await,
        json!({"type": "panel_renamed", "from": "c", "to": "d"})
    );

    canvas.store.delete_panel("d").await.expect("delete");
    assert_eq!(
        next_json(&mut socket).await,
        json!({"type": "panel_deleted", "panel": "d"})
    );
}

#[tokio::test]
async fn standalone_ws_port_serves_the_same_feed() {
    let canvas = spawn_canvas(PanelSet::new()).await;
    let mut socket = connect(&format!("ws://127.0.0.1:{}", canvas.ws_port)).await;
    assert_eq!(
        next_json(&mut socket).await,
        json!({"type": "render", "panel": "default", "html": ""})
    );

    let http = reqwest::Client::new();
    let res = http
        .post(format!("http://127.0.0.1:{}/render", canvas.http_port))
        .json(&json!({"html": "<h1>live</h1>"}))
        .send()
        .await
        .expect("render request");
    assert!(res.status().is_success());
    assert_eq!(
        next_json(&mut socket).await,
        json!({"type": "render", "panel": "default", "html": "<h1>live</h1>"})
    );
}

#[tokio::test]
async fn closing_viewer_unsubscribes_it() {
    let canvas = spawn_canvas(PanelSet::new()).await;
    let mut socket = connect(&format!("ws://127.0.0.1:{}/ws", canvas.http_port)).await;
    next_json(&mut socket).await;
    wait_for_subscribers(&canvas.store, 1).await;

    socket.send(Message::Close(None)).await.expect("send close");
    drop(socket);
    wait_for_subscribers(&canvas.store, 0).await;

    canvas
        .store
        .render(None, "<p>nobody listening</p>".to_string())
        .await
        .expect("render with no viewers");
}
