use clap::Args;
use time::macros::format_description;

use dropkey::api::ApiError;
use dropkey::dispatcher::Event;

use crate::cli::op::{ClientError, OpContext};

/// List pastes published under the local identity
#[derive(Args, Debug, Clone)]
pub struct List;

#[derive(Debug, thiserror::Error)]
pub enum ListError {
    #[error(transparent)]
    Client(#[from] ClientError),
    #[error("list pastes failed: {0}")]
    Api(#[from] ApiError),
}

#[async_trait::async_trait]
impl crate::cli::op::Op for List {
    type Error = ListError;
    type Output = String;

    async fn execute(&self, ctx: &OpContext) -> Result<Self::Output, Self::Error> {
        let conn = ctx.connect().await?;
        conn.dispatcher.list_pastes();

        match conn.next_event().await? {
            Event::PasteListReady { pastes, titles } => {
                if pastes.is_empty() {
                    return Ok("No pastes found".to_string());
                }
                let date = format_description!("[year]-[month]-[day] [hour]:[minute]");
                let output = pastes
                    .iter()
                    .zip(titles.iter())
                    .map(|(paste, title)| {
                        let title = match title {
                            Ok(title) => title.as_str(),
                            Err(e) => e.sentinel(),
                        };
                        let created = paste
                            .created_at
                            .format(date)
                            .unwrap_or_else(|_| "-".to_string());
                        format!("{}  {}  {}", paste.id, created, title)
                    })
                    .collect::<Vec<_>>()
                    .join("\n");
                Ok(output)
            }
            Event::PasteListFailed { error } => Err(error.into()),
            other => Err(ClientError::UnexpectedEvent(other.name()).into()),
        }
    }
}
