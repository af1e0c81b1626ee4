//! HTTP surface of the video pipeline: provider webhook callbacks, the
//! internal stitch trigger and health probes. The API process also runs
//! the reconciliation sweeper.

pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod routes;
pub mod state;

pub use config::ApiConfig;
pub use error::{ApiError, ApiResult};
pub use routes::create_router;
pub use state::AppState;
