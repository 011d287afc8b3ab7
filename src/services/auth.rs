use jsonwebtoken::{decode, DecodingKey, Validation};

use crate::config::JwtConfig;
use crate::error::{AppError, Result};
use crate::models::Claims;

/// Bearer token authentication.
///
/// Accounts are issued by a separate service; this side only validates the
/// HS256 access tokens it signs.
pub struct AuthService;

impl AuthService {
    /// Validate access token and extract claims
    pub fn validate_token(token: &str, config: &JwtConfig) -> Result<Claims> {
        let mut validation = Validation::default();
        validation.validate_exp = true;

        let keys = std::iter::once(config.secret.as_str())
            .chain(config.previous_secrets.iter().map(|s| s.as_str()));

        for secret in keys {
            if let Ok(token_data) = decode::<Claims>(
                token,
                &DecodingKey::from_secret(secret.as_bytes()),
                &validation,
            ) {
                return Ok(token_data.claims);
            }
        }

        Err(AppError::Unauthorized("Invalid token".to_string()))
    }

    /// Resolve an `Authorization` header to an account id.
    /// Missing, malformed or invalid credentials all mean anonymous.
    pub fn authenticate(authorization: Option<&str>, config: &JwtConfig) -> Option<String> {
        let token = authorization?.strip_prefix("Bearer ")?.trim();
        if token.is_empty() {
            return None;
        }

        match Self::validate_token(token, config) {
            Ok(claims) => Some(claims.sub),
            Err(e) => {
                tracing::debug!("Rejected bearer token: {}", e);
                None
            }
        }
    }
}

#[cfg(test)]
pub(crate) fn issue_test_token(user_id: &str, secret: &str, ttl: chrono::Duration) -> String {
    use jsonwebtoken::{encode, EncodingKey, Header};

    let now = chrono::Utc::now();
    let claims = Claims {
        sub: user_id.to_string(),
        exp: (now + ttl).timestamp() as usize,
        iat: now.timestamp() as usize,
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn config() -> JwtConfig {
        JwtConfig {
            secret: "current".to_string(),
            previous_secrets: vec!["old".to_string()],
        }
    }

    #[test]
    fn test_authenticate_valid_token() {
        let token = issue_test_token("user-1", "current", Duration::hours(1));
        let header = format!("Bearer {}", token);
        assert_eq!(
            AuthService::authenticate(Some(&header), &config()),
            Some("user-1".to_string())
        );
    }

    #[test]
    fn test_rotated_secret_still_accepted() {
        let token = issue_test_token("user-2", "old", Duration::hours(1));
        let claims = AuthService::validate_token(&token, &config()).unwrap();
        assert_eq!(claims.sub, "user-2");
    }

    #[test]
    fn test_invalid_credentials_are_anonymous() {
        let cfg = config();
        let foreign = issue_test_token("user-3", "someone-else", Duration::hours(1));
        let expired = issue_test_token("user-4", "current", Duration::hours(-2));

        assert_eq!(AuthService::authenticate(None, &cfg), None);
        assert_eq!(AuthService::authenticate(Some("Basic abc"), &cfg), None);
        assert_eq!(AuthService::authenticate(Some("Bearer "), &cfg), None);
        assert_eq!(AuthService::authenticate(Some("Bearer not-a-jwt"), &cfg), None);
        assert_eq!(
            AuthService::authenticate(Some(&format!("Bearer {}", foreign)), &cfg),
            None
        );
        assert_eq!(
            AuthService::authenticate(Some(&format!("Bearer {}", expired)), &cfg),
            None
        );
    }
}
