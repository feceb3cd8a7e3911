//! Client side of the challenge/response login
//!
//! ```text
//! Unauthenticated -> ChallengeRequested -> SignatureSubmitted -> Authenticated
//!                                                             \-> Rejected
//! ```
//!
//! `Authenticated` holds until the token is discarded: logout, process exit,
//! a passed `expires_at`, or the server answering an authenticated request
//! with a 401. Sessions are never persisted.

use std::fmt;
use std::sync::Arc;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::crypto::{PublicKey, SecretKey, Signature};

/// Domain separation tag for authentication signatures
pub const AUTH_DOMAIN: &[u8] = b"dropkey-auth-v1";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error("invalid session transition from {from} to {to}")]
    InvalidTransition {
        from: &'static str,
        to: &'static str,
    },
    #[error("session belongs to user {expected}, not {actual}")]
    UserMismatch { expected: String, actual: String },
    #[error("malformed challenge: {0}")]
    MalformedChallenge(String),
}

/// The exact bytes signed to answer a challenge
///
/// `AUTH_DOMAIN || "\n" || user_id || "\n" || challenge`
pub fn challenge_message(user_id: &str, challenge: &[u8]) -> Vec<u8> {
    let mut msg = Vec::with_capacity(AUTH_DOMAIN.len() + user_id.len() + challenge.len() + 2);
    msg.extend_from_slice(AUTH_DOMAIN);
    msg.push(b'\n');
    msg.extend_from_slice(user_id.as_bytes());
    msg.push(b'\n');
    msg.extend_from_slice(challenge);
    msg
}

/// A challenge answered with the identity key, ready to submit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedChallenge {
    /// User the challenge was issued to
    pub id: String,
    /// The challenge as issued, base64
    pub challenge: String,
    /// Ed25519 signature over [`challenge_message`], base64
    pub signature: String,
}

impl SignedChallenge {
    pub fn sign(key: &SecretKey, user_id: &str, challenge: &str) -> Result<Self, SessionError> {
        let raw = STANDARD
            .decode(challenge)
            .map_err(|e| SessionError::MalformedChallenge(e.to_string()))?;
        if raw.is_empty() {
            return Err(SessionError::MalformedChallenge("empty challenge".into()));
        }

        let signature = key.sign(&challenge_message(user_id, &raw));
        Ok(Self {
            id: user_id.to_string(),
            challenge: challenge.to_string(),
            signature: STANDARD.encode(signature.to_bytes()),
        })
    }

    /// Check the signature against a registered public key
    pub fn verify(&self, public_key: &PublicKey) -> bool {
        let Ok(raw) = STANDARD.decode(&self.challenge) else {
            return false;
        };
        let Ok(sig_bytes) = STANDARD.decode(&self.signature) else {
            return false;
        };
        let Ok(signature) = Signature::from_slice(&sig_bytes) else {
            return false;
        };
        public_key
            .verify(&challenge_message(&self.id, &raw), &signature)
            .is_ok()
    }
}

/// Bearer credential issued after a successful exchange
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionToken(String);

impl fmt::Debug for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SessionToken(..)")
    }
}

impl From<String> for SessionToken {
    fn from(token: String) -> Self {
        Self(token)
    }
}

impl SessionToken {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub user_id: String,
    pub token: SessionToken,
    pub expires_at: Option<OffsetDateTime>,
}

impl Session {
    pub fn is_expired_at(&self, now: OffsetDateTime) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    Unauthenticated,
    ChallengeRequested {
        user_id: String,
    },
    SignatureSubmitted {
        user_id: String,
    },
    Authenticated(Session),
    Rejected {
        user_id: String,
        reason: String,
    },
}

impl SessionState {
    pub fn name(&self) -> &'static str {
        match self {
            SessionState::Unauthenticated => "Unauthenticated",
            SessionState::ChallengeRequested { .. } => "ChallengeRequested",
            SessionState::SignatureSubmitted { .. } => "SignatureSubmitted",
            SessionState::Authenticated(_) => "Authenticated",
            SessionState::Rejected { .. } => "Rejected",
        }
    }
}

/// Shared view of the current session
///
/// Lives in the client context rather than in a global, so two identities
/// can be driven side by side.
#[derive(Debug, Clone, Default)]
pub struct SessionHandle {
    inner: Arc<RwLock<SessionState>>,
}

impl SessionHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> SessionState {
        self.inner.read().clone()
    }

    /// The live session, if any. An expired session is discarded here.
    pub fn current(&self) -> Option<Session> {
        let mut state = self.inner.write();
        let session = match &*state {
            SessionState::Authenticated(session) => session.clone(),
            _ => return None,
        };

        if session.is_expired_at(OffsetDateTime::now_utc()) {
            tracing::info!("SESSION: token for {} expired", session.user_id);
            *state = SessionState::Unauthenticated;
            return None;
        }
        Some(session)
    }

    /// Start an exchange for `user_id`. A session past its expiry counts
    /// as absent even if nothing has called [`current`](Self::current) yet.
    pub fn request_challenge(&self, user_id: &str) -> Result<(), SessionError> {
        let now = OffsetDateTime::now_utc();
        self.transition("ChallengeRequested", |state| match state {
            SessionState::Unauthenticated | SessionState::Rejected { .. } => {
                Ok(Some(SessionState::ChallengeRequested {
                    user_id: user_id.to_string(),
                }))
            }
            SessionState::Authenticated(session) if session.is_expired_at(now) => {
                tracing::info!("SESSION: token for {} expired", session.user_id);
                Ok(Some(SessionState::ChallengeRequested {
                    user_id: user_id.to_string(),
                }))
            }
            _ => Ok(None),
        })
    }

    pub fn submit_signature(&self, user_id: &str) -> Result<(), SessionError> {
        self.transition("SignatureSubmitted", |state| match state {
            SessionState::ChallengeRequested { user_id: expected } => {
                check_user(expected, user_id)?;
                Ok(Some(SessionState::SignatureSubmitted {
                    user_id: user_id.to_string(),
                }))
            }
            _ => Ok(None),
        })
    }

    pub fn establish(&self, session: Session) -> Result<(), SessionError> {
        self.transition("Authenticated", |state| match state {
            SessionState::SignatureSubmitted { user_id: expected } => {
                check_user(expected, &session.user_id)?;
                Ok(Some(SessionState::Authenticated(session)))
            }
            _ => Ok(None),
        })
    }

    /// The server refused the identity or the signature
    pub fn reject(&self, reason: impl Into<String>) -> Result<(), SessionError> {
        let reason = reason.into();
        self.transition("Rejected", |state| match state {
            SessionState::ChallengeRequested { user_id }
            | SessionState::SignatureSubmitted { user_id } => Ok(Some(SessionState::Rejected {
                user_id: user_id.clone(),
                reason,
            })),
            _ => Ok(None),
        })
    }

    /// An exchange failed for reasons unrelated to the credentials
    pub fn abandon(&self) {
        let mut state = self.inner.write();
        if matches!(
            *state,
            SessionState::ChallengeRequested { .. } | SessionState::SignatureSubmitted { .. }
        ) {
            *state = SessionState::Unauthenticated;
        }
    }

    /// The server no longer accepts our token
    pub fn expire(&self) {
        let mut state = self.inner.write();
        if let SessionState::Authenticated(session) = &*state {
            tracing::info!("SESSION: token for {} rejected by server", session.user_id);
        } else {
            return;
        }
        *state = SessionState::Unauthenticated;
    }

    pub fn logout(&self) {
        *self.inner.write() = SessionState::Unauthenticated;
    }

    fn transition<F>(&self, to: &'static str, f: F) -> Result<(), SessionError>
    where
        F: FnOnce(&SessionState) -> Result<Option<SessionState>, SessionError>,
    {
        let mut state = self.inner.write();
        match f(&*state)? {
            Some(next) => {
                tracing::debug!("SESSION: {} -> {}", state.name(), to);
                *state = next;
                Ok(())
            }
            None => Err(SessionError::InvalidTransition {
                from: state.name(),
                to,
            }),
        }
    }
}

fn check_user(expected: &str, actual: &str) -> Result<(), SessionError> {
    if expected == actual {
        return Ok(());
    }
    Err(SessionError::UserMismatch {
        expected: expected.to_string(),
        actual: actual.to_string(),
    })
}
