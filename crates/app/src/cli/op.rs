use std::error::Error;
use std::path::PathBuf;
use std::time::Duration;

use url::Url;

use dropkey::api::{ApiClient, ApiError};
use dropkey::dispatcher::{ClientContext, Dispatcher, Event, EventReceiver};
use dropkey::identity::AuthError;
use dropkey::state::{default_server_url, AppState, StateError};

/// Resolve the remote URL for the API client.
///
/// Priority: explicit `--remote` flag > config file `server_url` > hardcoded default.
pub fn resolve_remote(explicit: Option<Url>, config_path: Option<PathBuf>) -> Url {
    if let Some(url) = explicit {
        return url;
    }
    if let Ok(state) = AppState::load(config_path) {
        return state.config.server_url;
    }
    default_server_url()
}

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error(transparent)]
    State(#[from] StateError),
    #[error("failed to create API client: {0}")]
    Api(#[from] ApiError),
    #[error("no registered account. Run 'dropkey register' first")]
    NotRegistered,
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error("unexpected {0} event")]
    UnexpectedEvent(&'static str),
    #[error("dispatcher stopped before reporting a result")]
    Disconnected,
}

#[derive(Clone)]
pub struct OpContext {
    /// Explicit `--remote`, if any
    pub remote: Option<Url>,
    /// Optional custom config path (defaults to ~/.dropkey)
    pub config_path: Option<PathBuf>,
}

impl OpContext {
    pub fn new(remote: Option<Url>, config_path: Option<PathBuf>) -> Self {
        Self {
            remote,
            config_path,
        }
    }

    /// Load local state and wire up a dispatcher against the resolved remote
    pub async fn connect(&self) -> Result<Connection, ClientError> {
        let state = AppState::load(self.config_path.clone())?;
        let remote = resolve_remote(self.remote.clone(), self.config_path.clone());
        let api = ApiClient::with_timeout(
            &remote,
            Duration::from_secs(state.config.request_timeout_secs),
        )?;
        let (keys, identity) = state.open_identity().await?;

        let (dispatcher, events) = Dispatcher::new(ClientContext::new(api, keys, identity));
        Ok(Connection {
            state,
            dispatcher,
            events,
        })
    }
}

/// A loaded identity plus a live dispatcher for one command
pub struct Connection {
    pub state: AppState,
    pub dispatcher: Dispatcher,
    events: EventReceiver,
}

impl Connection {
    pub async fn next_event(&self) -> Result<Event, ClientError> {
        self.events.recv().await.ok_or(ClientError::Disconnected)
    }

    pub fn user_id(&self) -> Result<String, ClientError> {
        self.state
            .load_account()?
            .map(|account| account.user_id)
            .ok_or(ClientError::NotRegistered)
    }

    /// Run the challenge/response exchange for the registered account
    pub async fn login(&self) -> Result<String, ClientError> {
        self.dispatcher.authenticate(self.user_id()?);
        match self.next_event().await? {
            Event::SessionEstablished { user_id, .. } => Ok(user_id),
            Event::AuthenticationFailed { error, .. } => Err(error.into()),
            other => Err(ClientError::UnexpectedEvent(other.name())),
        }
    }
}

#[async_trait::async_trait]
pub trait Op: Send + Sync {
    type Error: Error + Send + Sync + 'static;
    type Output;

    async fn execute(&self, ctx: &OpContext) -> Result<Self::Output, Self::Error>;
}

#[macro_export]
macro_rules! command_enum {
    ($(($variant:ident, $type:ty)),* $(,)?) => {
        #[derive(Subcommand, Debug, Clone)]
        pub enum Command {
            $($variant($type),)*
        }

        #[derive(Debug)]
        pub enum OpOutput {
            $($variant(<$type as $crate::cli::op::Op>::Output),)*
        }

        #[derive(Debug, thiserror::Error)]
        pub enum OpError {
            $(
                #[error(transparent)]
                $variant(<$type as $crate::cli::op::Op>::Error),
            )*
        }

        #[async_trait::async_trait]
        impl $crate::cli::op::Op for Command {
            type Output = OpOutput;
            type Error = OpError;

            async fn execute(&self, ctx: &$crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
                match self {
                    $(
                        Command::$variant(op) => {
                            op.execute(ctx).await
                                .map(OpOutput::$variant)
                                .map_err(OpError::$variant)
                        },
                    )*
                }
            }
        }

        impl std::fmt::Display for OpOutput {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                match self {
                    $(
                        OpOutput::$variant(output) => write!(f, "{}", output),
                    )*
                }
            }
        }
    };
}
