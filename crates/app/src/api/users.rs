use reqwest::{Client, RequestBuilder, Url};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use common::crypto::PublicKey;
use common::session::{SessionToken, SignedChallenge};

use super::ApiRequest;

/// Claim a new identity with the service
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub public_key: PublicKey,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterResponse {
    #[serde(rename = "userID")]
    pub user_id: String,
}

impl ApiRequest for RegisterRequest {
    type Response = RegisterResponse;

    fn build_request(
        self,
        base_url: &Url,
        client: &Client,
    ) -> Result<RequestBuilder, url::ParseError> {
        let full_url = base_url.join("/api/users")?;
        Ok(client.post(full_url).json(&self))
    }
}

/// Ask the service for a fresh nonce to sign
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChallengeRequest {
    pub id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChallengeResponse {
    /// base64 nonce
    pub challenge: String,
}

impl ApiRequest for ChallengeRequest {
    type Response = ChallengeResponse;

    fn build_request(
        self,
        base_url: &Url,
        client: &Client,
    ) -> Result<RequestBuilder, url::ParseError> {
        let full_url = base_url.join("/api/users/challenge")?;
        Ok(client.post(full_url).json(&self))
    }
}

/// Submit a signed challenge in exchange for a session token
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AuthRequest(pub SignedChallenge);

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthResponse {
    pub session_token: SessionToken,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub expires_at: Option<OffsetDateTime>,
}

impl ApiRequest for AuthRequest {
    type Response = AuthResponse;

    fn build_request(
        self,
        base_url: &Url,
        client: &Client,
    ) -> Result<RequestBuilder, url::ParseError> {
        let full_url = base_url.join("/api/users/auth")?;
        Ok(client.post(full_url).json(&self))
    }
}
