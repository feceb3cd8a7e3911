use clap::Args;

use dropkey::dispatcher::Event;
use dropkey::identity::RegisterError;
use dropkey::state::{Account, StateError};

use crate::cli::op::{ClientError, OpContext};

#[derive(Args, Debug, Clone)]
pub struct Register;

#[derive(Debug, thiserror::Error)]
pub enum RegisterOpError {
    #[error(transparent)]
    Client(#[from] ClientError),
    #[error(transparent)]
    Register(#[from] RegisterError),
    #[error("registered as {user_id} but failed to save account: {source}")]
    SaveAccount {
        user_id: String,
        #[source]
        source: StateError,
    },
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Register {
    type Error = RegisterOpError;
    type Output = String;

    async fn execute(&self, ctx: &OpContext) -> Result<Self::Output, Self::Error> {
        let conn = ctx.connect().await?;
        conn.dispatcher.register();

        match conn.next_event().await? {
            Event::IdentityRegistered { user_id } => {
                let account = Account {
                    user_id: user_id.clone(),
                    server_url: conn.dispatcher.context().api.base_url().clone(),
                };
                conn.state
                    .save_account(&account)
                    .map_err(|source| RegisterOpError::SaveAccount {
                        user_id: user_id.clone(),
                        source,
                    })?;
                Ok(format!("Registered as user {}", user_id))
            }
            Event::RegistrationFailed { error } => Err(error.into()),
            other => Err(ClientError::UnexpectedEvent(other.name()).into()),
        }
    }
}
