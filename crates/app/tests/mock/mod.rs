//! In-process paste service for integration tests
//!
//! Users get ids `u1, u2, ...` and pastes `p1, p2, ...`. Fetching `p999`
//! always fails with a 500 so callers can exercise the server error path.

#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use parking_lot::Mutex;
use time::OffsetDateTime;
use url::Url;
use uuid::Uuid;

use common::crypto::{PublicKey, SecretKey};
use common::keystore::KeyStore;
use common::session::SessionToken;
use dropkey::api::{
    ApiClient, AuthRequest, AuthResponse, ChallengeRequest, ChallengeResponse,
    CreatePasteResponse, NewPaste, Paste, RegisterRequest, RegisterResponse,
};
use dropkey::dispatcher::{ClientContext, Dispatcher, Event, EventReceiver};

const FAILING_PASTE_ID: &str = "p999";

#[derive(Default)]
struct ServerState {
    users: HashMap<String, PublicKey>,
    challenges: HashMap<String, String>,
    tokens: HashMap<String, String>,
    pastes: BTreeMap<String, (PublicKey, Paste)>,
    next_user: u64,
    next_paste: u64,
}

type Shared = Arc<Mutex<ServerState>>;

pub struct MockServer {
    pub url: Url,
    state: Shared,
    handle: tokio::task::JoinHandle<()>,
}

impl MockServer {
    pub async fn start() -> Self {
        let state: Shared = Arc::default();
        let app = Router::new()
            .route("/api/users", post(register))
            .route("/api/users/challenge", post(challenge))
            .route("/api/users/auth", post(auth))
            .route("/api/pastes", post(create_paste).get(list_pastes))
            .route("/api/pastes/:id", get(get_paste))
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            url: Url::parse(&format!("http://{}", addr)).unwrap(),
            state,
            handle,
        }
    }

    /// Forget every issued session token
    pub fn revoke_tokens(&self) {
        self.state.lock().tokens.clear();
    }

    /// Store a paste directly, bypassing authentication
    pub fn insert_paste(
        &self,
        owner: &PublicKey,
        ciphertext: String,
        expires_at: Option<OffsetDateTime>,
    ) -> String {
        let mut state = self.state.lock();
        state.next_paste += 1;
        let id = format!("p{}", state.next_paste);
        let paste = Paste {
            id: id.clone(),
            ciphertext,
            created_at: OffsetDateTime::now_utc(),
            expires_at,
        };
        state.pastes.insert(id.clone(), (*owner, paste));
        id
    }

    pub fn paste_count(&self) -> usize {
        self.state.lock().pastes.len()
    }
}

impl Drop for MockServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

fn error(status: StatusCode, msg: &str) -> Response {
    (status, msg.to_string()).into_response()
}

async fn register(State(state): State<Shared>, Json(req): Json<RegisterRequest>) -> Response {
    let mut state = state.lock();
    if state.users.values().any(|pk| *pk == req.public_key) {
        return error(StatusCode::CONFLICT, "public key already registered");
    }
    state.next_user += 1;
    let user_id = format!("u{}", state.next_user);
    state.users.insert(user_id.clone(), req.public_key);
    (StatusCode::CREATED, Json(RegisterResponse { user_id })).into_response()
}

async fn challenge(State(state): State<Shared>, Json(req): Json<ChallengeRequest>) -> Response {
    let mut state = state.lock();
    if !state.users.contains_key(&req.id) {
        return error(StatusCode::NOT_FOUND, "unknown user");
    }
    let challenge = STANDARD.encode(Uuid::new_v4().as_bytes());
    state.challenges.insert(challenge.clone(), req.id);
    Json(ChallengeResponse { challenge }).into_response()
}

async fn auth(State(state): State<Shared>, Json(AuthRequest(signed)): Json<AuthRequest>) -> Response {
    let mut state = state.lock();
    // challenges are single use
    match state.challenges.remove(&signed.challenge) {
        Some(user_id) if user_id == signed.id => {}
        _ => return error(StatusCode::UNAUTHORIZED, "unknown challenge"),
    }
    let Some(public_key) = state.users.get(&signed.id).copied() else {
        return error(StatusCode::NOT_FOUND, "unknown user");
    };
    if !signed.verify(&public_key) {
        return error(StatusCode::UNAUTHORIZED, "bad signature");
    }

    let token = Uuid::new_v4().to_string();
    state.tokens.insert(token.clone(), signed.id);
    Json(AuthResponse {
        session_token: SessionToken::from(token),
        expires_at: Some(OffsetDateTime::now_utc() + time::Duration::hours(1)),
    })
    .into_response()
}

async fn create_paste(
    State(state): State<Shared>,
    headers: HeaderMap,
    Json(req): Json<NewPaste>,
) -> Response {
    let mut state = state.lock();
    let token = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));
    let Some(user_id) = token.and_then(|t| state.tokens.get(t)).cloned() else {
        return error(StatusCode::UNAUTHORIZED, "invalid session");
    };
    if req.expires_in == Some(0) {
        return error(StatusCode::BAD_REQUEST, "expiresIn must be positive");
    }
    if STANDARD.decode(&req.ciphertext).is_err() {
        return error(StatusCode::UNPROCESSABLE_ENTITY, "ciphertext is not base64");
    }

    let owner = state.users[&user_id];
    state.next_paste += 1;
    let id = format!("p{}", state.next_paste);
    let now = OffsetDateTime::now_utc();
    let expires_at = req
        .expires_in
        .map(|secs| now + time::Duration::seconds(secs as i64));
    let paste = Paste {
        id: id.clone(),
        ciphertext: req.ciphertext,
        created_at: now,
        expires_at,
    };
    state.pastes.insert(id.clone(), (owner, paste));

    (
        StatusCode::CREATED,
        Json(CreatePasteResponse {
            id,
            created_at: Some(now),
            expires_at,
        }),
    )
        .into_response()
}

async fn list_pastes(
    State(state): State<Shared>,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    let Some(public_key) = query
        .get("public_key")
        .and_then(|pk| PublicKey::from_base64(pk).ok())
    else {
        return error(StatusCode::BAD_REQUEST, "missing public_key");
    };
    let state = state.lock();
    let pastes: Vec<Paste> = state
        .pastes
        .values()
        .filter(|(owner, _)| *owner == public_key)
        .map(|(_, paste)| paste.clone())
        .collect();
    Json(pastes).into_response()
}

async fn get_paste(State(state): State<Shared>, Path(id): Path<String>) -> Response {
    if id == FAILING_PASTE_ID {
        return error(StatusCode::INTERNAL_SERVER_ERROR, "storage unavailable");
    }
    let well_formed = id
        .strip_prefix('p')
        .is_some_and(|n| !n.is_empty() && n.bytes().all(|b| b.is_ascii_digit()));
    if !well_formed {
        return error(StatusCode::BAD_REQUEST, "invalid paste id");
    }

    let state = state.lock();
    let Some((_, paste)) = state.pastes.get(&id) else {
        return error(StatusCode::NOT_FOUND, "paste not found");
    };
    if paste
        .expires_at
        .is_some_and(|at| at <= OffsetDateTime::now_utc())
    {
        return error(StatusCode::GONE, "paste expired");
    }
    Json(paste.clone()).into_response()
}

/// A dispatcher over an in-memory key store with a fresh identity
pub fn client(url: &Url) -> (Dispatcher, EventReceiver) {
    client_with_identity(url, KeyStore::generate_identity().unwrap())
}

pub fn client_with_identity(url: &Url, identity: SecretKey) -> (Dispatcher, EventReceiver) {
    let api = ApiClient::new(url).unwrap();
    Dispatcher::new(ClientContext::new(api, KeyStore::ephemeral(), identity))
}

/// Wait for the next event, failing the test if none arrives promptly
pub async fn next_event(events: &EventReceiver) -> Event {
    tokio::time::timeout(std::time::Duration::from_secs(10), events.recv())
        .await
        .expect("timed out waiting for event")
        .expect("event channel closed")
}

/// Register and log in, returning the user id
pub async fn login(dispatcher: &Dispatcher, events: &EventReceiver) -> String {
    dispatcher.register();
    let user_id = match next_event(events).await {
        Event::IdentityRegistered { user_id } => user_id,
        other => panic!("expected IdentityRegistered, got {:?}", other),
    };
    dispatcher.authenticate(user_id.clone());
    match next_event(events).await {
        Event::SessionEstablished { user_id, .. } => user_id,
        other => panic!("expected SessionEstablished, got {:?}", other),
    }
}
