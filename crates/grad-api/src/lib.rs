pub mod auth;
pub mod chat;
pub mod comments;
pub mod convert;
pub mod countdown;
pub mod error;
pub mod memories;
pub mod middleware;
pub mod routes;
pub mod state;
pub mod upload;
pub mod users;

pub use routes::router;
pub use state::{AppState, AppStateInner};
