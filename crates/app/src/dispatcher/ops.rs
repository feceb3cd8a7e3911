use reqwest::StatusCode;
use uuid::Uuid;

use common::cipher::PasteBody;

use crate::api::{ApiError, CreatePasteRequest, GetPasteRequest, ListPastesRequest, NewPaste};
use crate::identity;

use super::events::{CreatePasteError, Event, FetchPasteError};
use super::ClientContext;

/// Longest paste id accepted before any network call is made
pub const MAX_PASTE_ID_LEN: usize = 128;

/// Paste ids are 1 to 128 characters from `[A-Za-z0-9_-]`
pub fn is_valid_paste_id(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= MAX_PASTE_ID_LEN
        && id
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-')
}

pub(super) async fn register(ctx: &ClientContext) -> Event {
    match identity::register(&ctx.api, &ctx.identity.public()).await {
        Ok(user_id) => Event::IdentityRegistered { user_id },
        Err(error) => Event::RegistrationFailed { error },
    }
}

pub(super) async fn authenticate(ctx: &ClientContext, user_id: String) -> Event {
    match identity::authenticate(&ctx.api, &ctx.session, &user_id, &ctx.identity).await {
        Ok(session) => Event::SessionEstablished {
            user_id,
            token: session.token,
        },
        Err(error) => Event::AuthenticationFailed { user_id, error },
    }
}

pub(super) async fn create_paste(
    ctx: &ClientContext,
    temp_id: Uuid,
    body: PasteBody,
    expires_in: Option<u64>,
) -> Event {
    let result = create_paste_inner(ctx, temp_id, body, expires_in).await;
    ctx.pending.complete(&temp_id);

    match result {
        Ok(id) => Event::PasteCreated { temp_id, id },
        Err(error) => Event::PasteCreationFailed { temp_id, error },
    }
}

async fn create_paste_inner(
    ctx: &ClientContext,
    temp_id: Uuid,
    body: PasteBody,
    expires_in: Option<u64>,
) -> Result<String, CreatePasteError> {
    let Some(session) = ctx.session.current() else {
        tracing::warn!("CREATE PASTE: no authenticated session");
        return Err(CreatePasteError::Unauthenticated);
    };

    let temp_key = temp_id.to_string();
    let plaintext = body.to_json()?;
    let envelope = match ctx.cipher.encrypt(&temp_key, &plaintext).await {
        Ok(envelope) => envelope,
        Err(e) => {
            discard_temp_key(ctx, &temp_key).await;
            return Err(e.into());
        }
    };

    let request = CreatePasteRequest {
        paste: NewPaste {
            ciphertext: envelope.to_base64(),
            expires_in,
        },
        token: session.token,
    };

    let response = match ctx.api.call(request).await {
        Ok(response) => response,
        Err(e) => {
            discard_temp_key(ctx, &temp_key).await;
            return Err(classify_create_error(ctx, e));
        }
    };

    tracing::info!("CREATE PASTE: {} assigned id {}", temp_id, response.id);
    ctx.keys()
        .rebind_content_key(&temp_key, &response.id)
        .await
        .map_err(|source| {
            tracing::error!("CREATE PASTE: failed to bind key for {}: {}", response.id, source);
            CreatePasteError::KeyBinding {
                id: response.id.clone(),
                source,
            }
        })?;

    Ok(response.id)
}

fn classify_create_error(ctx: &ClientContext, err: ApiError) -> CreatePasteError {
    match err {
        ApiError::HttpStatus(StatusCode::UNAUTHORIZED, _) => {
            tracing::warn!("CREATE PASTE: session rejected by server");
            ctx.session.expire();
            CreatePasteError::SessionExpired
        }
        ApiError::HttpStatus(StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY, body) => {
            tracing::warn!("CREATE PASTE: rejected: {}", body);
            CreatePasteError::Rejected(body)
        }
        e => {
            tracing::error!("CREATE PASTE: request failed: {}", e);
            CreatePasteError::Transport(e)
        }
    }
}

async fn discard_temp_key(ctx: &ClientContext, temp_key: &str) {
    if let Err(e) = ctx.keys().discard_content_key(temp_key).await {
        tracing::error!("CREATE PASTE: failed to discard key {}: {}", temp_key, e);
    }
}

pub(super) async fn list_pastes(ctx: &ClientContext) -> Event {
    let request = ListPastesRequest {
        public_key: ctx.identity.public(),
    };

    match ctx.api.call(request).await {
        Ok(pastes) => {
            let titles: Vec<_> = pastes
                .iter()
                .map(|paste| ctx.cipher.title(&paste.id, &paste.ciphertext))
                .collect();
            let unreadable = titles.iter().filter(|t| t.is_err()).count();
            tracing::info!(
                "LIST PASTES: {} pastes, {} without a readable title",
                pastes.len(),
                unreadable
            );
            Event::PasteListReady { pastes, titles }
        }
        Err(error) => {
            tracing::error!("LIST PASTES: request failed: {}", error);
            Event::PasteListFailed { error }
        }
    }
}

pub(super) async fn fetch_paste(ctx: &ClientContext, id: String) -> Event {
    if !is_valid_paste_id(&id) {
        tracing::warn!("FETCH PASTE: refusing invalid id {:?}", id);
        return Event::PasteFetchFailed {
            id,
            error: FetchPasteError::InvalidId,
        };
    }

    match ctx.api.call(GetPasteRequest { id: id.clone() }).await {
        Ok(paste) => {
            let plaintext = ctx.cipher.decrypt_base64(&paste.id, &paste.ciphertext);
            if let Err(e) = &plaintext {
                tracing::debug!("FETCH PASTE: {} not readable locally: {}", paste.id, e);
            }
            Event::PasteReady { paste, plaintext }
        }
        Err(e) => {
            let error = FetchPasteError::from(e);
            tracing::warn!("FETCH PASTE: {} failed: {}", id, error);
            Event::PasteFetchFailed { id, error }
        }
    }
}
