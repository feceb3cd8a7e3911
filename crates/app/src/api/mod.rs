//! Typed requests against the paste service
//!
//! Each request type knows how to build its own HTTP request and what it
//! expects back; [`ApiClient::call`] does the rest.

mod client;
mod error;
pub mod pastes;
pub mod users;

pub use client::ApiClient;
pub use error::ApiError;
pub use pastes::{
    CreatePasteRequest, CreatePasteResponse, GetPasteRequest, ListPastesRequest, NewPaste, Paste,
};
pub use users::{
    AuthRequest, AuthResponse, ChallengeRequest, ChallengeResponse, RegisterRequest,
    RegisterResponse,
};

use reqwest::{Client, RequestBuilder, Url};
use serde::de::DeserializeOwned;

pub trait ApiRequest {
    type Response: DeserializeOwned;

    fn build_request(self, base_url: &Url, client: &Client)
        -> Result<RequestBuilder, url::ParseError>;
}
