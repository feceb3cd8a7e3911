use clap::Args;

use common::cipher::{PasteBody, TitleError};
use dropkey::dispatcher::{Event, FetchPasteError};

use crate::cli::op::{ClientError, OpContext};

/// Fetch a paste and decrypt it if the key is held locally
#[derive(Args, Debug, Clone)]
pub struct Get {
    pub id: String,
}

#[derive(Debug, thiserror::Error)]
pub enum GetError {
    #[error(transparent)]
    Client(#[from] ClientError),
    #[error(transparent)]
    Fetch(#[from] FetchPasteError),
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Get {
    type Error = GetError;
    type Output = String;

    async fn execute(&self, ctx: &OpContext) -> Result<Self::Output, Self::Error> {
        let conn = ctx.connect().await?;
        conn.dispatcher.fetch_paste(self.id.clone());

        match conn.next_event().await? {
            Event::PasteReady { paste, plaintext } => {
                let rendered = match plaintext {
                    Ok(bytes) => match PasteBody::parse(&bytes) {
                        Ok(body) => format!("{}\n\n{}", body.title, body.body),
                        Err(_) => TitleError::MalformedBody.sentinel().to_string(),
                    },
                    Err(e) => TitleError::from(&e).sentinel().to_string(),
                };
                Ok(format!("{}\n{}", paste.id, rendered))
            }
            Event::PasteFetchFailed { error, .. } => Err(error.into()),
            other => Err(ClientError::UnexpectedEvent(other.name()).into()),
        }
    }
}
