use std::path::PathBuf;

use clap::Args;

use common::cipher::PasteBody;
use dropkey::dispatcher::{CreatePasteError, Event};

use crate::cli::op::{ClientError, OpContext};

#[derive(Args, Debug, Clone)]
pub struct Create {
    #[arg(long)]
    pub title: String,

    /// Paste body given inline
    #[arg(long, conflicts_with = "file", required_unless_present = "file")]
    pub body: Option<String>,

    /// Read the paste body from a file
    #[arg(long)]
    pub file: Option<PathBuf>,

    /// Lifetime in seconds (server default when omitted)
    #[arg(long)]
    pub expires_in: Option<u64>,
}

#[derive(Debug, thiserror::Error)]
pub enum CreateError {
    #[error(transparent)]
    Client(#[from] ClientError),
    #[error("failed to read {path}: {source}")]
    ReadBody {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Create(#[from] CreatePasteError),
}

impl Create {
    async fn body(&self) -> Result<String, CreateError> {
        match (&self.body, &self.file) {
            (Some(body), _) => Ok(body.clone()),
            (None, Some(path)) => {
                tokio::fs::read_to_string(path)
                    .await
                    .map_err(|source| CreateError::ReadBody {
                        path: path.clone(),
                        source,
                    })
            }
            (None, None) => Ok(String::new()),
        }
    }
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Create {
    type Error = CreateError;
    type Output = String;

    async fn execute(&self, ctx: &OpContext) -> Result<Self::Output, Self::Error> {
        let body = PasteBody::new(self.title.clone(), self.body().await?);

        let conn = ctx.connect().await?;
        conn.login().await?;

        let temp_id = conn.dispatcher.create_paste(body, self.expires_in);
        match conn.next_event().await? {
            Event::PasteCreated { temp_id: done, id } if done == temp_id => {
                Ok(format!("Created paste {}", id))
            }
            Event::PasteCreationFailed { temp_id: done, error } if done == temp_id => {
                Err(error.into())
            }
            other => Err(ClientError::UnexpectedEvent(other.name()).into()),
        }
    }
}
