use log::{info, warn};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::config::AuthConfig;
use super::jwt::JwtClaims;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub username: String,
    pub display_name: String,
    pub avatar_url: String,
    pub access_token: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<User>,
}

/// Issues bearer tokens and tracks the sessions they belong to. A token
/// is valid while its signature and expiry check out and its jti is
/// still present here; logout removes the jti.
pub struct SessionManager {
    config: AuthConfig,
    // jti -> user, ahash keyed like the rest of the daemon's hot maps
    sessions: scc::HashMap<String, User, ahash::RandomState>,
}

impl SessionManager {
    pub fn new(config: AuthConfig) -> Self {
        Self {
            config,
            sessions: scc::HashMap::default(),
        }
    }

    pub fn login(&self, request: &LoginRequest) -> LoginResponse {
        let username = request.username.trim().to_lowercase();
        if username.is_empty() || request.password.is_empty() {
            return LoginResponse {
                success: false,
                message: "Username and password are required".into(),
                user: None,
            };
        }

        match self.config.users.get(&username) {
            Some(expected) if expected == &request.password => {}
            _ => {
                warn!("failed login attempt for user: {}", username);
                return LoginResponse {
                    success: false,
                    message: "Invalid username or password".into(),
                    user: None,
                };
            }
        }

        let claims = JwtClaims::new(self.config.token_ttl_secs, username.clone());
        let jti = claims.jti.clone();
        let token = claims.to_token(&self.config.jwt_secret);

        let user = User {
            id: Uuid::new_v4().to_string(),
            username: username.clone(),
            display_name: capitalize_first(&username),
            avatar_url: format!("https://mc-heads.net/avatar/{}/100", username),
            access_token: token,
        };
        let _ = self.sessions.insert(jti, user.clone());
        info!("user {} logged in", username);

        LoginResponse {
            success: true,
            message: "Login successful".into(),
            user: Some(user),
        }
    }

    pub fn logout(&self, token: &str) -> bool {
        let Ok(claims) = JwtClaims::from_token(token, &self.config.jwt_secret) else {
            return false;
        };
        match self.sessions.remove(&claims.jti) {
            Some((_, user)) => {
                info!("user {} logged out", user.username);
                true
            }
            None => false,
        }
    }

    /// Validates signature, expiry and revocation; returns the session's
    /// user on success.
    pub fn validate(&self, token: &str) -> Option<User> {
        let claims = JwtClaims::from_token(token, &self.config.jwt_secret).ok()?;
        self.sessions
            .read(&claims.jti, |_, user| user.clone())
    }
}

/// Strips the `Bearer ` prefix the UI sends; a bare token passes through.
pub fn extract_token(auth_header: Option<&str>) -> Option<&str> {
    let header = auth_header?;
    Some(header.strip_prefix("Bearer ").unwrap_or(header))
}

fn capitalize_first(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}
