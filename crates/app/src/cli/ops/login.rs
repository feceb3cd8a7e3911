use clap::Args;
use time::format_description::well_known::Rfc3339;

use crate::cli::op::{ClientError, OpContext};

/// Check that the registered identity can open a session
#[derive(Args, Debug, Clone)]
pub struct Login;

#[async_trait::async_trait]
impl crate::cli::op::Op for Login {
    type Error = ClientError;
    type Output = String;

    async fn execute(&self, ctx: &OpContext) -> Result<Self::Output, Self::Error> {
        let conn = ctx.connect().await?;
        let user_id = conn.login().await?;

        let expiry = conn
            .dispatcher
            .context()
            .session
            .current()
            .and_then(|session| session.expires_at)
            .and_then(|at| at.format(&Rfc3339).ok());

        Ok(match expiry {
            Some(at) => format!("Authenticated as user {} (session expires {})", user_id, at),
            None => format!("Authenticated as user {}", user_id),
        })
    }
}
