use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use ring::rand::{SecureRandom, SystemRandom};
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

const ISSUER: &str = "LauncherDaemon";

const CHARS: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";
const CHARS_LEN: usize = CHARS.len();

pub fn generate_secret_string(length: usize) -> Result<String, ring::error::Unspecified> {
    let rng = SystemRandom::new();
    let mut s = String::with_capacity(length);

    for _ in 0..length {
        let idx = uniform_random_index(&rng, CHARS_LEN)?;
        s.push(CHARS[idx] as char);
    }

    Ok(s)
}

fn uniform_random_index(rng: &SystemRandom, max: usize) -> Result<usize, ring::error::Unspecified> {
    let byte_count = ((max as f64).log2() / 8.0).ceil() as usize;
    let mut buf = vec![0u8; byte_count];

    loop {
        rng.fill(&mut buf)?;
        let num = buf.iter().fold(0u64, |acc, &b| (acc << 8) | b as u64);
        if num <= (u64::MAX - (u64::MAX % max as u64)) {
            return Ok((num % max as u64) as usize);
        }
    }
}

/// Bearer-token claims. `jti` keys the active-session table so a token
/// can be revoked on logout before it expires.
#[derive(Debug, PartialEq, Serialize, Deserialize)]
pub struct JwtClaims {
    iss: String,
    aud: String,
    pub exp: u64,
    pub jti: String,
    pub sub: String,
}

impl JwtClaims {
    pub fn new(ttl_secs: u64, username: String) -> Self {
        Self {
            exp: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .unwrap()
                .as_secs()
                + ttl_secs,
            iss: ISSUER.into(),
            aud: ISSUER.into(),
            jti: uuid::Uuid::new_v4().to_string(),
            sub: username,
        }
    }

    pub fn from_token(token: &str, secret: &str) -> Result<Self, jsonwebtoken::errors::Error> {
        let mut validation = Validation::default();
        validation.set_audience(&[ISSUER.to_string()]);
        validation.set_issuer(&[ISSUER.to_string()]);
        validation.leeway = 0;

        decode::<Self>(
            token,
            &DecodingKey::from_secret(secret.as_bytes()),
            &validation,
        )
        .map(|data| data.claims)
    }

    pub fn to_token(&self, secret: &str) -> String {
        encode(
            &Header::default(),
            &self,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }
}
