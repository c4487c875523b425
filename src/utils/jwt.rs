use crate::error::{AppError, AppResult};
use chrono::{Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum UserType {
    Member,
    Partner,
    Business,
    Master,
}

impl std::fmt::Display for UserType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UserType::Member => write!(f, "member"),
            UserType::Partner => write!(f, "partner"),
            UserType::Business => write!(f, "business"),
            UserType::Master => write!(f, "master"),
        }
    }
}

/// Decoded session. Field names follow the identity service's token layout.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionClaims {
    pub uid: i64,
    #[serde(rename = "userType")]
    pub user_type: UserType,
    pub email: String,
    pub exp: i64,
}

impl SessionClaims {
    pub fn require(&self, allowed: &[UserType]) -> AppResult<()> {
        if allowed.contains(&self.user_type) {
            Ok(())
        } else {
            Err(AppError::Forbidden)
        }
    }
}

#[derive(Clone)]
pub struct SessionTokenService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl SessionTokenService {
    pub fn new(secret: &str) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
        }
    }

    /// Tokens are normally minted by the identity service; this exists for
    /// tooling and tests that need a valid session.
    pub fn issue(
        &self,
        uid: i64,
        user_type: UserType,
        email: &str,
        ttl: Duration,
    ) -> AppResult<String> {
        let claims = SessionClaims {
            uid,
            user_type,
            email: email.to_string(),
            exp: (Utc::now() + ttl).timestamp(),
        };

        encode(&Header::default(), &claims, &self.encoding_key).map_err(AppError::JwtError)
    }

    pub fn verify(&self, token: &str) -> AppResult<SessionClaims> {
        let validation = Validation::new(Algorithm::HS256);
        decode::<SessionClaims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(AppError::JwtError)
    }
}
