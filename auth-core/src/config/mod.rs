use serde::Deserialize;
use std::env;

/// Configuration for the authentication core.
///
/// Load from the environment with [`AuthConfig::from_env`], or start from
/// `AuthConfig::default()` when embedding in tests.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    pub service_name: String,
    pub log_level: String,
    pub security: SecurityPolicyConfig,
    pub jwt: JwtConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SecurityPolicyConfig {
    /// Consecutive failures before an identity is locked out.
    pub max_failed_attempts: u32,
    /// How long a lockout window lasts once armed.
    pub lockout_window_seconds: u64,
    /// Inactivity budget before a session expires.
    pub session_timeout_seconds: i64,
    /// How long a pending MFA challenge stays valid.
    pub mfa_code_ttl_seconds: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    /// HS256 signing secret shared by issuance and validation.
    pub secret: String,
    pub issuer: String,
    pub audience: String,
    pub access_token_expiry_minutes: i64,
    pub refresh_token_expiry_days: i64,
    /// Safety margin: the refresh timer fires this long before the access
    /// token expires.
    pub refresh_margin_seconds: i64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            service_name: "auth-core".to_string(),
            log_level: "info".to_string(),
            security: SecurityPolicyConfig {
                max_failed_attempts: 3,
                lockout_window_seconds: 900,
                session_timeout_seconds: 3600,
                mfa_code_ttl_seconds: 300,
            },
            jwt: JwtConfig {
                secret: String::new(),
                issuer: "auth-core".to_string(),
                audience: "auth-core-clients".to_string(),
                access_token_expiry_minutes: 15,
                refresh_token_expiry_days: 7,
                refresh_margin_seconds: 60,
            },
        }
    }
}

impl AuthConfig {
    pub fn from_env() -> Result<Self, anyhow::Error> {
        let config = AuthConfig {
            service_name: get_env("AUTH_SERVICE_NAME", Some("auth-core"))?,
            log_level: get_env("AUTH_LOG_LEVEL", Some("info"))?,
            security: SecurityPolicyConfig {
                max_failed_attempts: parse_env("AUTH_MAX_FAILED_ATTEMPTS", "3")?,
                lockout_window_seconds: parse_env("AUTH_LOCKOUT_WINDOW_SECONDS", "900")?,
                session_timeout_seconds: parse_env("AUTH_SESSION_TIMEOUT_SECONDS", "3600")?,
                mfa_code_ttl_seconds: parse_env("AUTH_MFA_CODE_TTL_SECONDS", "300")?,
            },
            jwt: JwtConfig {
                secret: get_env("AUTH_JWT_SECRET", None)?,
                issuer: get_env("AUTH_JWT_ISSUER", Some("auth-core"))?,
                audience: get_env("AUTH_JWT_AUDIENCE", Some("auth-core-clients"))?,
                access_token_expiry_minutes: parse_env("AUTH_JWT_ACCESS_TOKEN_EXPIRY_MINUTES", "15")?,
                refresh_token_expiry_days: parse_env("AUTH_JWT_REFRESH_TOKEN_EXPIRY_DAYS", "7")?,
                refresh_margin_seconds: parse_env("AUTH_JWT_REFRESH_MARGIN_SECONDS", "60")?,
            },
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if self.jwt.secret.is_empty() {
            anyhow::bail!("AUTH_JWT_SECRET must not be empty");
        }
        if self.jwt.access_token_expiry_minutes <= 0 {
            anyhow::bail!("AUTH_JWT_ACCESS_TOKEN_EXPIRY_MINUTES must be positive");
        }
        if self.jwt.refresh_token_expiry_days <= 0 {
            anyhow::bail!("AUTH_JWT_REFRESH_TOKEN_EXPIRY_DAYS must be positive");
        }
        if self.jwt.refresh_margin_seconds >= self.jwt.access_token_expiry_minutes * 60 {
            anyhow::bail!("refresh margin must be smaller than the access token lifetime");
        }
        if self.security.max_failed_attempts == 0 {
            anyhow::bail!("AUTH_MAX_FAILED_ATTEMPTS must be greater than 0");
        }
        if self.security.session_timeout_seconds <= 0 {
            anyhow::bail!("AUTH_SESSION_TIMEOUT_SECONDS must be positive");
        }
        Ok(())
    }
}

fn get_env(key: &str, default: Option<&str>) -> Result<String, anyhow::Error> {
    match env::var(key) {
        Ok(val) => Ok(val),
        Err(_) => match default {
            Some(def) => Ok(def.to_string()),
            None => Err(anyhow::anyhow!("{} is required but not set", key)),
        },
    }
}

fn parse_env<T>(key: &str, default: &str) -> Result<T, anyhow::Error>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    get_env(key, Some(default))?
        .parse()
        .map_err(|e| anyhow::anyhow!("invalid value for {}: {}", key, e))
}
