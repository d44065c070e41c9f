pub mod app;
pub mod bootstrap;
pub mod config;
pub mod metrics;
pub mod models;
pub mod organizations;
pub mod password;
pub mod store;
pub mod tokens;
pub mod user_handlers;

pub use app::{router, AppState};
pub use config::{load_auth_config, AuthConfig};
