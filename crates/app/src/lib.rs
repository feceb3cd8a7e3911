// Library exports for the CLI binary and integration tests

pub mod api;
pub mod dispatcher;
pub mod identity;
pub mod logging;
pub mod state;
pub mod version;

// Re-export key types for convenience
pub use api::{ApiClient, ApiError};
pub use dispatcher::{ClientContext, Dispatcher, Event, EventReceiver};
pub use state::{Account, AppConfig, AppState, StateError};
