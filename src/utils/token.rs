use chrono::{DateTime, Duration, TimeZone, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{ErrorMessage, HttpError};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenClaims {
    pub sub: String,
    pub iat: usize,
    pub exp: usize,
    pub jti: String,
}

impl TokenClaims {
    pub fn member_id(&self) -> Result<Uuid, HttpError> {
        Uuid::parse_str(&self.sub)
            .map_err(|_| HttpError::unauthorized(ErrorMessage::InvalidToken.to_string()))
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        Utc.timestamp_opt(self.exp as i64, 0)
            .single()
            .unwrap_or_else(Utc::now)
    }
}

/// Sign a session token for `member_id`, valid for `expires_in_minutes`.
pub fn create_token(
    member_id: &str,
    secret: &[u8],
    expires_in_minutes: i64,
) -> Result<(String, DateTime<Utc>), jsonwebtoken::errors::Error> {
    if member_id.is_empty() {
        return Err(jsonwebtoken::errors::ErrorKind::InvalidSubject.into());
    }

    let now = Utc::now();
    let expires_at = now + Duration::minutes(expires_in_minutes);
    let claims = TokenClaims {
        sub: member_id.to_string(),
        iat: now.timestamp() as usize,
        exp: expires_at.timestamp() as usize,
        jti: Uuid::new_v4().to_string(),
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret),
    )?;

    let expires_at = Utc
        .timestamp_opt(claims.exp as i64, 0)
        .single()
        .unwrap_or(expires_at);
    Ok((token, expires_at))
}

pub fn decode_token<T: Into<String>>(token: T, secret: &[u8]) -> Result<TokenClaims, HttpError> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.leeway = 0;

    decode::<TokenClaims>(&token.into(), &DecodingKey::from_secret(secret), &validation)
        .map(|data| data.claims)
        .map_err(|_| HttpError::unauthorized(ErrorMessage::InvalidToken.to_string()))
}
