use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::JwtConfig;
use crate::models::UserProfile;

/// Token service for HS256 token issuance and validation
#[derive(Clone)]
pub struct TokenService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    issuer: String,
    audience: String,
    access_token_expiry_minutes: i64,
    refresh_token_expiry_days: i64,
}

/// Claims for access tokens (short-lived)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessTokenClaims {
    /// Subject (user ID)
    pub sub: String,
    /// Email
    pub email: String,
    pub iss: String,
    pub aud: String,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    /// JWT ID
    pub jti: String,
    /// Device fingerprint the token is bound to, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,
}

/// Claims for refresh tokens (long-lived)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshTokenClaims {
    /// Subject (user ID)
    pub sub: String,
    /// Token ID (matches the stored session record)
    pub jti: String,
    pub iss: String,
    pub aud: String,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
    /// Issued at (Unix timestamp)
    pub iat: i64,
}

/// Token response returned to the controller layer
#[derive(Debug, Clone, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    pub expires_in: i64,
}

/// A freshly issued access/refresh pair
#[derive(Debug, Clone)]
pub struct IssuedTokens {
    pub access_token: String,
    pub refresh_token: String,
    pub refresh_token_id: String,
    pub expires_in: i64,
}

impl TokenService {
    pub fn new(config: &JwtConfig) -> Result<Self, anyhow::Error> {
        if config.secret.is_empty() {
            anyhow::bail!("JWT secret must not be empty");
        }

        Ok(Self {
            encoding_key: EncodingKey::from_secret(config.secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(config.secret.as_bytes()),
            issuer: config.issuer.clone(),
            audience: config.audience.clone(),
            access_token_expiry_minutes: config.access_token_expiry_minutes,
            refresh_token_expiry_days: config.refresh_token_expiry_days,
        })
    }

    /// Generate an access/refresh token pair for a user.
    pub fn issue_pair(
        &self,
        user: &UserProfile,
        device_fingerprint: Option<&str>,
    ) -> Result<IssuedTokens, anyhow::Error> {
        let now = Utc::now();

        let access_claims = AccessTokenClaims {
            sub: user.id.clone(),
            email: user.email.clone(),
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
            exp: (now + Duration::minutes(self.access_token_expiry_minutes)).timestamp(),
            iat: now.timestamp(),
            jti: Uuid::new_v4().to_string(),
            device_id: device_fingerprint.map(|s| s.to_string()),
        };

        let refresh_token_id = Uuid::new_v4().to_string();
        let refresh_claims = RefreshTokenClaims {
            sub: user.id.clone(),
            jti: refresh_token_id.clone(),
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
            exp: (now + Duration::days(self.refresh_token_expiry_days)).timestamp(),
            iat: now.timestamp(),
        };

        let header = Header::new(Algorithm::HS256);
        let access_token = encode(&header, &access_claims, &self.encoding_key)
            .map_err(|e| anyhow::anyhow!("failed to encode access token: {}", e))?;
        let refresh_token = encode(&header, &refresh_claims, &self.encoding_key)
            .map_err(|e| anyhow::anyhow!("failed to encode refresh token: {}", e))?;

        Ok(IssuedTokens {
            access_token,
            refresh_token,
            refresh_token_id,
            expires_in: self.access_token_expiry_minutes * 60,
        })
    }

    /// Validate and decode an access token.
    pub fn decode_access(&self, token: &str) -> Result<AccessTokenClaims, anyhow::Error> {
        let data = decode::<AccessTokenClaims>(token, &self.decoding_key, &self.validation())
            .map_err(|e| anyhow::anyhow!("invalid access token: {}", e))?;
        Ok(data.claims)
    }

    /// Validate and decode a refresh token.
    pub fn decode_refresh(&self, token: &str) -> Result<RefreshTokenClaims, anyhow::Error> {
        let data = decode::<RefreshTokenClaims>(token, &self.decoding_key, &self.validation())
            .map_err(|e| anyhow::anyhow!("invalid refresh token: {}", e))?;
        Ok(data.claims)
    }

    /// Pure access-token check: never errors.
    ///
    /// Returns true only if the token decodes, `exp` is in the future,
    /// issuer and audience match, and a `device_id` claim (when present)
    /// matches the given fingerprint.
    pub fn check_access(&self, token: &str, device_fingerprint: Option<&str>) -> bool {
        let claims = match self.decode_access(token) {
            Ok(claims) => claims,
            Err(_) => return false,
        };

        match (&claims.device_id, device_fingerprint) {
            (Some(bound), Some(current)) => bound == current,
            (Some(_), None) => false,
            (None, _) => true,
        }
    }

    pub fn access_token_expiry_seconds(&self) -> i64 {
        self.access_token_expiry_minutes * 60
    }

    fn validation(&self) -> Validation {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        validation.set_issuer(&[&self.issuer]);
        validation.set_audience(&[&self.audience]);
        validation
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AuthConfig;

    fn test_service() -> TokenService {
        let mut config = AuthConfig::default();
        config.jwt.secret = "test-secret".to_string();
        TokenService::new(&config.jwt).expect("failed to create token service")
    }

    fn test_user() -> UserProfile {
        UserProfile {
            id: "user_123".to_string(),
            email: "test@example.com".to_string(),
            name: None,
        }
    }

    #[test]
    fn test_rejects_empty_secret() {
        let config = AuthConfig::default();
        assert!(TokenService::new(&config.jwt).is_err());
    }

    #[test]
    fn test_issue_and_decode_pair() {
        let service = test_service();
        let tokens = service.issue_pair(&test_user(), None).unwrap();

        let access = service.decode_access(&tokens.access_token).unwrap();
        assert_eq!(access.sub, "user_123");
        assert_eq!(access.email, "test@example.com");

        let refresh = service.decode_refresh(&tokens.refresh_token).unwrap();
        assert_eq!(refresh.sub, "user_123");
        assert_eq!(refresh.jti, tokens.refresh_token_id);

        assert_eq!(tokens.expires_in, 15 * 60);
    }

    #[test]
    fn test_check_access_accepts_valid_token() {
        let service = test_service();
        let tokens = service.issue_pair(&test_user(), None).unwrap();
        assert!(service.check_access(&tokens.access_token, None));
    }

    #[test]
    fn test_check_access_rejects_garbage_without_panicking() {
        let service = test_service();
        assert!(!service.check_access("not-a-token", None));
        assert!(!service.check_access("", None));
    }

    #[test]
    fn test_check_access_enforces_device_binding() {
        let service = test_service();
        let tokens = service.issue_pair(&test_user(), Some("device-a")).unwrap();

        assert!(service.check_access(&tokens.access_token, Some("device-a")));
        assert!(!service.check_access(&tokens.access_token, Some("device-b")));
        assert!(!service.check_access(&tokens.access_token, None));
    }

    #[test]
    fn test_check_access_rejects_wrong_signer() {
        let service = test_service();

        let mut other_config = AuthConfig::default();
        other_config.jwt.secret = "different-secret".to_string();
        let other = TokenService::new(&other_config.jwt).unwrap();

        let tokens = other.issue_pair(&test_user(), None).unwrap();
        assert!(!service.check_access(&tokens.access_token, None));
    }
}
