use jsonwebtoken::{decode, DecodingKey, Validation};

use crate::config::JwtConfig;
use crate::error::AppError;

use super::Claims;

pub struct JwtValidator {
    decoding_key: DecodingKey,
    validation: Validation,
}

impl JwtValidator {
    pub fn new(config: &JwtConfig) -> Self {
        let decoding_key = DecodingKey::from_secret(config.secret.as_bytes());

        let mut validation = Validation::default();

        if let Some(ref issuer) = config.issuer {
            validation.set_issuer(&[issuer]);
        }

        if let Some(ref audience) = config.audience {
            validation.set_audience(&[audience]);
        }

        Self {
            decoding_key,
            validation,
        }
    }

    /// Decode and verify a token, requiring a usable user id.
    pub fn validate(&self, token: &str) -> Result<Claims, AppError> {
        let token_data = decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map_err(|e| AppError::Auth(format!("Invalid token: {}", e)))?;

        if token_data.claims.user_id().is_none() {
            return Err(AppError::Auth("Token carries no user id".to_string()));
        }

        Ok(token_data.claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};

    fn create_test_config() -> JwtConfig {
        JwtConfig {
            secret: "test-secret-key-for-testing".to_string(),
            issuer: None,
            audience: None,
        }
    }

    fn create_test_token<T: serde::Serialize>(claims: &T, secret: &str) -> String {
        encode(
            &Header::default(),
            claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    #[test]
    fn test_valid_token() {
        let config = create_test_config();
        let validator = JwtValidator::new(&config);

        let claims = Claims::new("user-123", 3600);
        let token = create_test_token(&claims, &config.secret);
        let result = validator.validate(&token);

        assert!(result.is_ok());
        let validated_claims = result.unwrap();
        assert_eq!(validated_claims.user_id(), Some("user-123"));
    }

    #[test]
    fn test_legacy_id_token() {
        let config = create_test_config();
        let validator = JwtValidator::new(&config);

        let exp = chrono::Utc::now().timestamp() + 3600;
        let token = create_test_token(
            &serde_json::json!({"id": "testUserId", "email": "test@example.com", "exp": exp}),
            &config.secret,
        );

        let claims = validator.validate(&token).unwrap();
        assert_eq!(claims.user_id(), Some("testUserId"));
    }

    #[test]
    fn test_token_without_user_id_is_rejected() {
        let config = create_test_config();
        let validator = JwtValidator::new(&config);

        let exp = chrono::Utc::now().timestamp() + 3600;
        let token = create_test_token(&serde_json::json!({"exp": exp}), &config.secret);
        assert!(matches!(validator.validate(&token), Err(AppError::Auth(_))));
    }

    #[test]
    fn test_wrong_secret_and_expired_tokens() {
        let config = create_test_config();
        let validator = JwtValidator::new(&config);

        let token = create_test_token(&Claims::new("u", 3600), "another-secret");
        assert!(validator.validate(&token).is_err());

        let token = create_test_token(&Claims::new("u", -3600), &config.secret);
        assert!(validator.validate(&token).is_err());
    }

    #[test]
    fn test_invalid_token() {
        let config = create_test_config();
        let validator = JwtValidator::new(&config);

        let result = validator.validate("invalid-token");
        assert!(result.is_err());
    }
}
