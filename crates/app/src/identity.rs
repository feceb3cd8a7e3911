//! Registration and challenge/response login against the paste service

use reqwest::StatusCode;

use common::crypto::{PublicKey, SecretKey};
use common::session::{Session, SessionError, SessionHandle, SignedChallenge};

use crate::api::{
    ApiClient, ApiError, AuthRequest, ChallengeRequest, RegisterRequest, RegisterResponse,
};

#[derive(Debug, thiserror::Error)]
pub enum RegisterError {
    #[error("public key is already registered: {0}")]
    Conflict(String),
    #[error("registration failed: {0}")]
    Transport(#[source] ApiError),
}

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("authentication rejected: {0}")]
    Rejected(String),
    #[error("authentication failed: {0}")]
    Transport(#[source] ApiError),
    #[error("session error: {0}")]
    Session(#[from] SessionError),
}

impl AuthError {
    fn from_api(err: ApiError) -> Self {
        match err.status() {
            Some(StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN | StatusCode::NOT_FOUND) => {
                AuthError::Rejected(err.body().unwrap_or_default().to_string())
            }
            _ => AuthError::Transport(err),
        }
    }
}

/// Claim `public_key` as a new identity.
///
/// Returns the server assigned user id. Persisting it is up to the caller.
pub async fn register(client: &ApiClient, public_key: &PublicKey) -> Result<String, RegisterError> {
    tracing::info!("REGISTER: registering public key {}", public_key);

    let request = RegisterRequest {
        public_key: *public_key,
    };
    match client.call(request).await {
        Ok(RegisterResponse { user_id }) => {
            tracing::info!("REGISTER: registered as user {}", user_id);
            Ok(user_id)
        }
        Err(ApiError::HttpStatus(StatusCode::CONFLICT, body)) => {
            tracing::warn!("REGISTER: public key already registered");
            Err(RegisterError::Conflict(body))
        }
        Err(e) => {
            tracing::error!("REGISTER: request failed: {}", e);
            Err(RegisterError::Transport(e))
        }
    }
}

/// Prove ownership of `key` for `user_id` and record the resulting session
/// in `session`.
///
/// Nothing is retried: a rejection leaves the handle in `Rejected`, any
/// other failure returns it to `Unauthenticated`.
pub async fn authenticate(
    client: &ApiClient,
    session: &SessionHandle,
    user_id: &str,
    key: &SecretKey,
) -> Result<Session, AuthError> {
    session.request_challenge(user_id)?;

    match exchange(client, session, user_id, key).await {
        Ok(established) => {
            session.establish(established.clone())?;
            tracing::info!("AUTH: session established for user {}", user_id);
            Ok(established)
        }
        Err(AuthError::Rejected(reason)) => {
            tracing::warn!("AUTH: rejected for user {}: {}", user_id, reason);
            session.reject(reason.clone())?;
            Err(AuthError::Rejected(reason))
        }
        Err(e) => {
            tracing::error!("AUTH: exchange failed for user {}: {}", user_id, e);
            session.abandon();
            Err(e)
        }
    }
}

async fn exchange(
    client: &ApiClient,
    session: &SessionHandle,
    user_id: &str,
    key: &SecretKey,
) -> Result<Session, AuthError> {
    let challenge = client
        .call(ChallengeRequest {
            id: user_id.to_string(),
        })
        .await
        .map_err(AuthError::from_api)?
        .challenge;

    let signed = SignedChallenge::sign(key, user_id, &challenge)?;
    session.submit_signature(user_id)?;

    let response = client
        .call(AuthRequest(signed))
        .await
        .map_err(AuthError::from_api)?;

    Ok(Session {
        user_id: user_id.to_string(),
        token: response.session_token,
        expires_at: response.expires_at,
    })
}
