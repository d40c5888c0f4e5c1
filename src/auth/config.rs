use std::borrow::Cow;
use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::auth::jwt::generate_secret_string;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    pub jwt_secret: Cow<'static, str>,
    pub token_ttl_secs: u64,
    /// Dev-grade credential table. Production deployments point the UI at
    /// a real account service instead.
    pub users: HashMap<String, String>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        let mut users = HashMap::new();
        users.insert("player".to_string(), "password".to_string());
        AuthConfig {
            jwt_secret: Cow::Owned(generate_secret_string(32).unwrap()),
            token_ttl_secs: 24 * 3600,
            users,
        }
    }
}
