use reqwest::StatusCode;
use uuid::Uuid;

use common::cipher::{CipherError, TitleError};
use common::keystore::KeyStoreError;
use common::session::SessionToken;

use crate::api::{ApiError, Paste};
use crate::identity::{AuthError, RegisterError};

/// Terminal outcome of one dispatched operation
///
/// Every dispatched operation produces exactly one of these. Events arrive
/// in completion order, so consumers match on `temp_id` / `id` rather than
/// on position.
#[derive(Debug)]
pub enum Event {
    IdentityRegistered {
        user_id: String,
    },
    RegistrationFailed {
        error: RegisterError,
    },
    SessionEstablished {
        user_id: String,
        token: SessionToken,
    },
    AuthenticationFailed {
        user_id: String,
        error: AuthError,
    },
    PasteCreated {
        temp_id: Uuid,
        id: String,
    },
    PasteCreationFailed {
        temp_id: Uuid,
        error: CreatePasteError,
    },
    /// `titles[i]` belongs to `pastes[i]`; a failed title never fails the batch
    PasteListReady {
        pastes: Vec<Paste>,
        titles: Vec<Result<String, TitleError>>,
    },
    PasteListFailed {
        error: ApiError,
    },
    PasteReady {
        paste: Paste,
        plaintext: Result<Vec<u8>, CipherError>,
    },
    PasteFetchFailed {
        id: String,
        error: FetchPasteError,
    },
}

impl Event {
    pub fn name(&self) -> &'static str {
        match self {
            Event::IdentityRegistered { .. } => "IdentityRegistered",
            Event::RegistrationFailed { .. } => "RegistrationFailed",
            Event::SessionEstablished { .. } => "SessionEstablished",
            Event::AuthenticationFailed { .. } => "AuthenticationFailed",
            Event::PasteCreated { .. } => "PasteCreated",
            Event::PasteCreationFailed { .. } => "PasteCreationFailed",
            Event::PasteListReady { .. } => "PasteListReady",
            Event::PasteListFailed { .. } => "PasteListFailed",
            Event::PasteReady { .. } => "PasteReady",
            Event::PasteFetchFailed { .. } => "PasteFetchFailed",
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            Event::RegistrationFailed { .. }
                | Event::AuthenticationFailed { .. }
                | Event::PasteCreationFailed { .. }
                | Event::PasteListFailed { .. }
                | Event::PasteFetchFailed { .. }
        )
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CreatePasteError {
    #[error("not authenticated, log in first")]
    Unauthenticated,
    #[error("session is no longer accepted by the server, log in again")]
    SessionExpired,
    #[error("paste rejected by server: {0}")]
    Rejected(String),
    #[error("failed to encrypt paste: {0}")]
    Cipher(#[from] CipherError),
    #[error("paste {id} was created but its key could not be stored: {source}")]
    KeyBinding {
        id: String,
        #[source]
        source: KeyStoreError,
    },
    #[error("create paste failed: {0}")]
    Transport(#[source] ApiError),
}

#[derive(Debug, thiserror::Error)]
pub enum FetchPasteError {
    #[error("invalid paste ID")]
    InvalidId,
    #[error("paste not found")]
    NotFound,
    #[error("paste has expired")]
    Expired,
    #[error("server error {0}: {1}")]
    Server(StatusCode, String),
    #[error("fetch paste failed: {0}")]
    Transport(#[source] ApiError),
}

impl From<ApiError> for FetchPasteError {
    fn from(err: ApiError) -> Self {
        match err {
            ApiError::HttpStatus(StatusCode::BAD_REQUEST, _) => FetchPasteError::InvalidId,
            ApiError::HttpStatus(StatusCode::NOT_FOUND, _) => FetchPasteError::NotFound,
            ApiError::HttpStatus(StatusCode::GONE, _) => FetchPasteError::Expired,
            ApiError::HttpStatus(status, body) => FetchPasteError::Server(status, body),
            e => FetchPasteError::Transport(e),
        }
    }
}
