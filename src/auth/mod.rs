mod config;
pub mod jwt;
mod sessions;

pub use config::AuthConfig;
pub use sessions::{extract_token, LoginRequest, LoginResponse, SessionManager, User};
