//! JWT validation. Tokens carry the user id in a `userId` claim.

use crate::error::{AppError, AppResult};
use jsonwebtoken::{decode, DecodingKey, Validation};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    #[serde(rename = "userId")]
    pub user_id: String,
    pub exp: i64,
    pub iat: i64,
}

#[derive(Clone)]
pub struct JwtSecret {
    secret: String,
}

impl JwtSecret {
    pub fn new(secret: String) -> Self {
        Self { secret }
    }

    /// Returns the user id the token was issued for.
    pub fn validate(&self, token: &str) -> AppResult<String> {
        let mut validation = Validation::default();
        validation.validate_exp = true;
        let data = decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.secret.as_bytes()),
            &validation,
        )
        .map_err(|e| AppError::Jwt(e.to_string()))?;
        if data.claims.user_id.is_empty() {
            return Err(AppError::Jwt("token has no userId".to_string()));
        }
        Ok(data.claims.user_id)
    }
}

/// Tokens are minted by the account service; the hub only verifies them.
#[cfg(test)]
impl JwtSecret {
    const TOKEN_TTL_DAYS: i64 = 7;

    pub fn issue(&self, user_id: &str) -> AppResult<String> {
        use chrono::{Duration, Utc};
        use jsonwebtoken::{encode, EncodingKey, Header};

        let now = Utc::now();
        let exp = (now + Duration::days(Self::TOKEN_TTL_DAYS)).timestamp();
        let claims = Claims {
            user_id: user_id.to_string(),
            exp,
            iat: now.timestamp(),
        };
        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.secret.as_bytes()),
        )
        .map_err(|e| AppError::Jwt(e.to_string()))?;
        Ok(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn issued_token_validates_to_same_user() {
        let secret = JwtSecret::new("test-jwt-secret-min-32-chars!!".to_string());
        let token = secret.issue("64f1c0ffee").unwrap();
        assert_eq!(secret.validate(&token).unwrap(), "64f1c0ffee");
    }

    #[test]
    fn token_from_other_secret_is_rejected() {
        let a = JwtSecret::new("secret-a-secret-a-secret-a-secret".to_string());
        let b = JwtSecret::new("secret-b-secret-b-secret-b-secret".to_string());
        let token = a.issue("u1").unwrap();
        assert!(matches!(b.validate(&token), Err(AppError::Jwt(_))));
    }

    #[test]
    fn garbage_is_rejected() {
        let secret = JwtSecret::new("test-jwt-secret-min-32-chars!!".to_string());
        assert!(secret.validate("not.a.jwt").is_err());
    }
}
