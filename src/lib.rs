pub mod cache;
pub mod clock;
pub mod compression;
pub mod config;
pub mod endpoint;
pub mod error;
pub mod handlers;
pub mod health;
pub mod identity;
pub mod middleware;
pub mod rate_limiter;
pub mod report;
pub mod response;
pub mod server;
pub mod telemetry;

pub use config::Config;
pub use error::{GuardError, Result};
pub use handlers::{AppState, SharedState};
pub use response::ApiResponse;
pub use server::create_app;
