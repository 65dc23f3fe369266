//! HTTP API for embedded chat widgets.

mod error;
pub mod handlers;
mod routes;
mod state;

pub use error::{ApiError, ApiResult, ErrorResponse, StreamFailure};
pub use routes::create_router;
pub use state::AppState;
