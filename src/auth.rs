//! Token issuance, verification, password hashing and the `AuthUser`
//! extractor.
//!
//! Access and refresh tokens are HS256 JWTs signed with separate secrets and
//! tagged with their kind, so neither can stand in for the other.

use actix_web::cookie::{time::Duration as CookieDuration, Cookie};
use actix_web::dev::Payload;
use actix_web::{web, FromRequest, HttpRequest};
use chrono::{Duration, Utc};
use futures::future::{ready, Ready};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use log::warn;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::Config;
use crate::error::{ApiError, Result};
use crate::models::User;

pub const ACCESS_COOKIE: &str = "accessToken";
pub const REFRESH_COOKIE: &str = "refreshToken";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub username: String,
    pub email: String,
    pub fullname: String,
    pub token_type: TokenKind,
    pub iat: i64,
    pub exp: i64,
    /// Makes two tokens minted in the same second distinct.
    pub jti: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

struct SigningKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: Duration,
}

impl SigningKeys {
    fn new(secret: &str, ttl_secs: i64) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            ttl: Duration::seconds(ttl_secs),
        }
    }
}

/// The identity provider: signs and checks session tokens, hashes
/// passwords and shapes session cookies.
pub struct Identity {
    access: SigningKeys,
    refresh: SigningKeys,
    cookie_secure: bool,
    bcrypt_cost: u32,
}

impl Identity {
    pub fn new(access_secret: &str, refresh_secret: &str) -> Self {
        Self {
            access: SigningKeys::new(access_secret, 24 * 60 * 60),
            refresh: SigningKeys::new(refresh_secret, 10 * 24 * 60 * 60),
            cookie_secure: true,
            bcrypt_cost: bcrypt::DEFAULT_COST,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self {
            access: SigningKeys::new(&config.access_token_secret, config.access_token_ttl_secs),
            refresh: SigningKeys::new(
                &config.refresh_token_secret,
                config.refresh_token_ttl_secs,
            ),
            cookie_secure: config.cookie_secure,
            bcrypt_cost: config.bcrypt_cost,
        }
    }

    pub fn with_bcrypt_cost(mut self, cost: u32) -> Self {
        self.bcrypt_cost = cost;
        self
    }

    pub fn with_cookie_secure(mut self, secure: bool) -> Self {
        self.cookie_secure = secure;
        self
    }

    fn keys(&self, kind: TokenKind) -> &SigningKeys {
        match kind {
            TokenKind::Access => &self.access,
            TokenKind::Refresh => &self.refresh,
        }
    }

    fn sign(&self, user: &User, kind: TokenKind) -> Result<String> {
        let keys = self.keys(kind);
        let now = Utc::now();
        let claims = Claims {
            sub: user.id.to_string(),
            username: user.username.clone(),
            email: user.email.clone(),
            fullname: user.fullname.clone(),
            token_type: kind,
            iat: now.timestamp(),
            exp: (now + keys.ttl).timestamp(),
            jti: Uuid::new_v4().to_string(),
        };
        encode(&Header::default(), &claims, &keys.encoding)
            .map_err(|e| ApiError::Internal(format!("failed to sign token: {}", e)))
    }

    pub fn issue(&self, user: &User) -> Result<TokenPair> {
        Ok(TokenPair {
            access_token: self.sign(user, TokenKind::Access)?,
            refresh_token: self.sign(user, TokenKind::Refresh)?,
        })
    }

    pub fn verify(&self, token: &str, kind: TokenKind) -> Result<Claims> {
        let data = decode::<Claims>(token, &self.keys(kind).decoding, &Validation::default())
            .map_err(|e| {
                warn!("Rejected {:?} token: {}", kind, e);
                ApiError::unauthorized(match kind {
                    TokenKind::Access => "Invalid access token",
                    TokenKind::Refresh => "Invalid refresh token",
                })
            })?;
        if data.claims.token_type != kind {
            return Err(ApiError::unauthorized("Wrong token type"));
        }
        Ok(data.claims)
    }

    pub async fn hash_password(&self, password: &str) -> Result<String> {
        let password = password.to_string();
        let cost = self.bcrypt_cost;
        Ok(web::block(move || bcrypt::hash(password, cost)).await??)
    }

    pub async fn verify_password(&self, password: &str, hash: &str) -> Result<bool> {
        let (password, hash) = (password.to_string(), hash.to_string());
        Ok(web::block(move || bcrypt::verify(password, &hash)).await??)
    }

    pub fn session_cookies(&self, pair: &TokenPair) -> [Cookie<'static>; 2] {
        [
            self.cookie(ACCESS_COOKIE, pair.access_token.clone(), self.access.ttl),
            self.cookie(REFRESH_COOKIE, pair.refresh_token.clone(), self.refresh.ttl),
        ]
    }

    pub fn cleared_cookies(&self) -> [Cookie<'static>; 2] {
        [ACCESS_COOKIE, REFRESH_COOKIE].map(|name| {
            let mut cookie = self.cookie(name, String::new(), Duration::zero());
            cookie.make_removal();
            cookie
        })
    }

    fn cookie(&self, name: &'static str, value: String, ttl: Duration) -> Cookie<'static> {
        Cookie::build(name, value)
            .path("/")
            .http_only(true)
            .secure(self.cookie_secure)
            .max_age(CookieDuration::seconds(ttl.num_seconds()))
            .finish()
    }
}

/// The authenticated caller, taken from the `accessToken` cookie or an
/// `Authorization: Bearer` header.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: Uuid,
    pub username: String,
}

fn access_token(req: &HttpRequest) -> Option<String> {
    if let Some(cookie) = req.cookie(ACCESS_COOKIE) {
        return Some(cookie.value().to_string());
    }
    req.headers()
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(|t| t.trim().to_string())
}

fn authenticate(req: &HttpRequest) -> Result<AuthUser> {
    let identity = req
        .app_data::<web::Data<Identity>>()
        .ok_or_else(|| ApiError::Internal("identity provider is not registered".into()))?;
    let token = access_token(req).ok_or_else(|| ApiError::unauthorized("Unauthorized request"))?;
    let claims = identity.verify(&token, TokenKind::Access)?;
    let id = Uuid::parse_str(&claims.sub)
        .map_err(|_| ApiError::unauthorized("Invalid token: malformed subject"))?;
    Ok(AuthUser {
        id,
        username: claims.username,
    })
}

impl FromRequest for AuthUser {
    type Error = ApiError;
    type Future = Ready<std::result::Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        ready(authenticate(req))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user() -> User {
        let now = Utc::now();
        User {
            id: Uuid::new_v4(),
            username: "alice".into(),
            email: "alice@x.com".into(),
            fullname: "Alice".into(),
            avatar: "a".into(),
            cover_image: None,
            watch_history: vec![],
            password_hash: String::new(),
            refresh_token: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn issued_tokens_verify_with_their_own_kind_only() {
        let identity = Identity::new("access-secret", "refresh-secret");
        let user = user();
        let pair = identity.issue(&user).unwrap();

        let claims = identity.verify(&pair.access_token, TokenKind::Access).unwrap();
        assert_eq!(claims.sub, user.id.to_string());
        assert_eq!(claims.username, "alice");

        assert!(identity.verify(&pair.access_token, TokenKind::Refresh).is_err());
        assert!(identity.verify(&pair.refresh_token, TokenKind::Access).is_err());
        assert!(identity.verify(&pair.refresh_token, TokenKind::Refresh).is_ok());
    }

    #[test]
    fn consecutive_pairs_differ() {
        let identity = Identity::new("a", "r");
        let user = user();
        let first = identity.issue(&user).unwrap();
        let second = identity.issue(&user).unwrap();
        assert_ne!(first.refresh_token, second.refresh_token);
    }

    #[test]
    fn session_cookies_are_http_only() {
        let identity = Identity::new("a", "r").with_cookie_secure(false);
        let pair = identity.issue(&user()).unwrap();
        let [access, refresh] = identity.session_cookies(&pair);
        assert_eq!(access.name(), ACCESS_COOKIE);
        assert_eq!(refresh.value(), pair.refresh_token);
        assert_eq!(access.http_only(), Some(true));

        let [cleared, _] = identity.cleared_cookies();
        assert_eq!(cleared.value(), "");
    }

    #[actix_web::test]
    async fn password_hash_round_trip() {
        let identity = Identity::new("a", "r").with_bcrypt_cost(4);
        let hash = identity.hash_password("hunter2").await.unwrap();
        assert!(identity.verify_password("hunter2", &hash).await.unwrap());
        assert!(!identity.verify_password("hunter3", &hash).await.unwrap());
    }
}
