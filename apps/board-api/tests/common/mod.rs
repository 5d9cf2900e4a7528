#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::Router;
use chrono::Utc;
use futures_util::StreamExt;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use tokio::net::TcpStream;
use tokio::time;
use tokio_tungstenite::{tungstenite, MaybeTlsStream, WebSocketStream};

use board_api::auth::tokens::Claims;
use board_api::config::Config;
use board_api::db::loads::MemoryLoadStore;
use board_api::db::users::{MemoryUserDirectory, UserDirectory};
use board_api::db::StoreError;
use board_api::models::load::{BillingStatus, Load, LoadStatus, RateType};
use board_api::models::user::{AccountType, Role, User};
use board_api::AppState;

pub const TEST_SECRET: &str = "board-api-test-secret";

pub type WsClient = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// App state over in-memory stores, plus handles to seed them.
pub struct TestContext {
    pub state: AppState,
    pub users: Arc<MemoryUserDirectory>,
    pub loads: Arc<MemoryLoadStore>,
}

/// User lookups that take `delay` to answer, to hold a handshake open.
pub struct SlowUserDirectory {
    inner: Arc<MemoryUserDirectory>,
    delay: Duration,
}

#[async_trait]
impl UserDirectory for SlowUserDirectory {
    async fn find_user(&self, user_id: &str) -> Result<Option<User>, StoreError> {
        time::sleep(self.delay).await;
        self.inner.find_user(user_id).await
    }
}

fn test_config(handshake_timeout: Duration) -> Config {
    Config {
        database_url: "postgres://localhost/board_test".to_string(),
        jwt_secret: TEST_SECRET.to_string(),
        port: 0,
        handshake_timeout,
        outbound_buffer: 64,
    }
}

pub fn test_context() -> TestContext {
    let users = Arc::new(MemoryUserDirectory::new());
    let loads = Arc::new(MemoryLoadStore::new());
    let state = AppState::new(
        test_config(Duration::from_secs(2)),
        users.clone(),
        loads.clone(),
    );
    TestContext {
        state,
        users,
        loads,
    }
}

/// Like [`test_context`], but every user lookup during the handshake waits
/// `lookup_delay` first.
pub fn slow_handshake_context(lookup_delay: Duration, handshake_timeout: Duration) -> TestContext {
    let users = Arc::new(MemoryUserDirectory::new());
    let loads = Arc::new(MemoryLoadStore::new());
    let slow = Arc::new(SlowUserDirectory {
        inner: users.clone(),
        delay: lookup_delay,
    });
    let state = AppState::new(test_config(handshake_timeout), slow, loads.clone());
    TestContext {
        state,
        users,
        loads,
    }
}

pub fn app(state: &AppState) -> Router {
    board_api::routes::router().with_state(state.clone())
}

/// Start a real TCP server for WebSocket testing. The server runs in the background.
pub async fn start_server(state: &AppState) -> SocketAddr {
    let app = app(state);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind");
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    addr
}

pub fn user(id: &str, account_type: AccountType, has_mc: bool) -> User {
    User {
        id: id.to_string(),
        email: format!("{id}@example.com"),
        company: Some(format!("{id} Logistics")),
        account_type: account_type.as_str().to_string(),
        role: Role::User.as_str().to_string(),
        has_mc,
        created_at: Utc::now(),
    }
}

/// Register a user and return a valid token for them.
pub fn seed_user(ctx: &TestContext, id: &str, account_type: AccountType, has_mc: bool) -> String {
    ctx.users.insert(user(id, account_type, has_mc));
    mint_token(id, account_type, Role::User)
}

pub fn mint_token(user_id: &str, account_type: AccountType, role: Role) -> String {
    mint_token_expiring(user_id, account_type, role, 3600)
}

pub fn mint_token_expiring(
    user_id: &str,
    account_type: AccountType,
    role: Role,
    exp_offset_secs: i64,
) -> String {
    let now = Utc::now().timestamp();
    let claims = Claims {
        user_id: user_id.to_string(),
        email: format!("{user_id}@example.com"),
        account_type,
        role,
        exp: now + exp_offset_secs,
        iat: Some(now),
    };
    jsonwebtoken::encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(TEST_SECRET.as_bytes()),
    )
    .expect("mint test token")
}

pub fn available_load(id: &str, interstate: bool) -> Load {
    let now = Utc::now();
    Load {
        id: id.to_string(),
        title: "Dry van, 40k lbs".to_string(),
        posted_by: "broker_1".to_string(),
        status: LoadStatus::Available.as_str().to_string(),
        rate: 2.5,
        rate_type: RateType::PerMile.as_str().to_string(),
        distance: Some(240),
        origin_state: "TX".to_string(),
        destination_state: if interstate { "OK" } else { "TX" }.to_string(),
        is_interstate: interstate,
        booked_by: None,
        agreed_rate: None,
        billing_status: BillingStatus::Pending.as_str().to_string(),
        booking_notes: None,
        booked_at: None,
        created_at: now,
        updated_at: now,
    }
}

pub async fn connect(addr: SocketAddr, token: &str) -> WsClient {
    let url = format!("ws://{addr}/gateway?token={token}");
    let (ws, _) = tokio_tungstenite::connect_async(&url)
        .await
        .expect("ws connect");
    ws
}

/// Connect and wait until the gateway has attached the user.
pub async fn connect_attached(ctx: &TestContext, addr: SocketAddr, user_id: &str, token: &str) -> WsClient {
    let ws = connect(addr, token).await;
    wait_until(|| ctx.state.gateway.sessions().connection_for(user_id).is_some()).await;
    ws
}

pub async fn send_event(ws: &mut WsClient, event: &str, data: serde_json::Value) {
    use futures_util::SinkExt;

    let frame = serde_json::json!({ "event": event, "data": data });
    ws.send(tungstenite::Message::Text(frame.to_string().into()))
        .await
        .expect("send event");
}

/// Read the next event frame, skipping keep-alive traffic.
pub async fn next_event(ws: &mut WsClient) -> serde_json::Value {
    loop {
        let msg = time::timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("timeout waiting for event")
            .expect("stream ended")
            .expect("ws read error");
        match msg {
            tungstenite::Message::Text(text) => {
                return serde_json::from_str(text.as_str()).expect("parse event")
            }
            tungstenite::Message::Ping(_) | tungstenite::Message::Pong(_) => continue,
            other => panic!("expected text frame, got: {other:?}"),
        }
    }
}

/// Assert nothing but keep-alive traffic arrives within `window`.
pub async fn expect_silence(ws: &mut WsClient, window: Duration) {
    let deadline = time::Instant::now() + window;
    loop {
        match time::timeout_at(deadline, ws.next()).await {
            Err(_) => return,
            Ok(Some(Ok(tungstenite::Message::Ping(_) | tungstenite::Message::Pong(_)))) => continue,
            Ok(other) => panic!("expected no event, got: {other:?}"),
        }
    }
}

/// Read until the server closes, returning the close code and reason.
pub async fn expect_close(ws: &mut WsClient) -> (u16, String) {
    loop {
        let msg = time::timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("timeout waiting for close")
            .expect("stream ended")
            .expect("ws read error");
        match msg {
            tungstenite::Message::Close(Some(frame)) => {
                return (u16::from(frame.code), frame.reason.to_string())
            }
            tungstenite::Message::Ping(_) | tungstenite::Message::Pong(_) => continue,
            other => panic!("expected close frame, got: {other:?}"),
        }
    }
}

/// Poll a condition that the server settles asynchronously.
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    let deadline = time::Instant::now() + Duration::from_secs(5);
    while !condition() {
        assert!(time::Instant::now() < deadline, "condition not met in time");
        time::sleep(Duration::from_millis(10)).await;
    }
}
