use reqwest::{Client, RequestBuilder, Url};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use common::crypto::PublicKey;
use common::session::SessionToken;

use super::ApiRequest;

/// A paste as the service stores it: the body is ciphertext only
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Paste {
    pub id: String,
    /// base64 envelope
    pub ciphertext: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub expires_at: Option<OffsetDateTime>,
}

/// Body of a create request
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewPaste {
    pub ciphertext: String,
    /// Lifetime in seconds, server default when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct CreatePasteRequest {
    pub paste: NewPaste,
    pub token: SessionToken,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePasteResponse {
    pub id: String,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub created_at: Option<OffsetDateTime>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub expires_at: Option<OffsetDateTime>,
}

impl ApiRequest for CreatePasteRequest {
    type Response = CreatePasteResponse;

    fn build_request(
        self,
        base_url: &Url,
        client: &Client,
    ) -> Result<RequestBuilder, url::ParseError> {
        let full_url = base_url.join("/api/pastes")?;
        Ok(client
            .post(full_url)
            .bearer_auth(self.token.as_str())
            .json(&self.paste))
    }
}

/// List the pastes published under a public key
#[derive(Debug, Clone)]
pub struct ListPastesRequest {
    pub public_key: PublicKey,
}

impl ApiRequest for ListPastesRequest {
    type Response = Vec<Paste>;

    fn build_request(
        self,
        base_url: &Url,
        client: &Client,
    ) -> Result<RequestBuilder, url::ParseError> {
        let mut full_url = base_url.join("/api/pastes")?;
        full_url
            .query_pairs_mut()
            .append_pair("public_key", &self.public_key.to_base64());
        Ok(client.get(full_url))
    }
}

#[derive(Debug, Clone)]
pub struct GetPasteRequest {
    pub id: String,
}

impl ApiRequest for GetPasteRequest {
    type Response = Paste;

    fn build_request(
        self,
        base_url: &Url,
        client: &Client,
    ) -> Result<RequestBuilder, url::ParseError> {
        let full_url = base_url.join(&format!("/api/pastes/{}", self.id))?;
        Ok(client.get(full_url))
    }
}
