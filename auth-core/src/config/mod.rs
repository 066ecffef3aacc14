use serde::Deserialize;
use service_core::error::AppError;
use std::env;

/// Canonical configuration for the three services. Construct with
/// `Default`, deserialize it from a document where missing fields take their
/// defaults, or use the `from_env` boundary adapter.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AuthCoreConfig {
    pub environment: Environment,
    pub session: SessionConfig,
    pub mfa: MfaConfig,
    pub authz: AuthzConfig,
    pub jwt: JwtConfig,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Dev,
    Prod,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub max_sessions_per_user: usize,
    pub session_ttl_seconds: i64,
    pub inactivity_timeout_seconds: i64,
    pub risk_score_threshold: f64,
    pub require_mfa: bool,
    pub sweep_interval_seconds: u64,
    pub risk: RiskPolicy,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_sessions_per_user: 5,
            session_ttl_seconds: 24 * 60 * 60,
            inactivity_timeout_seconds: 30 * 60,
            risk_score_threshold: 0.8,
            require_mfa: false,
            sweep_interval_seconds: 60,
            risk: RiskPolicy::default(),
        }
    }
}

/// Additive risk weights. Scores accumulate onto the session and are clamped
/// to `[0, 1]`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RiskPolicy {
    pub device_mismatch: f64,
    pub ip_mismatch: f64,
    pub impossible_travel: f64,
    pub user_agent_mismatch: f64,
    pub rapid_requests: f64,
    pub rapid_request_window_ms: i64,
    /// Fraction of the block threshold at which step-up is demanded.
    pub step_up_ratio: f64,
}

impl Default for RiskPolicy {
    fn default() -> Self {
        Self {
            device_mismatch: 0.5,
            ip_mismatch: 0.3,
            impossible_travel: 0.4,
            user_agent_mismatch: 0.2,
            rapid_requests: 0.1,
            rapid_request_window_ms: 100,
            step_up_ratio: 0.7,
        }
    }
}

impl RiskPolicy {
    fn from_env(is_prod: bool) -> Result<Self, AppError> {
        let defaults = Self::default();
        Ok(Self {
            device_mismatch: parse_env("RISK_DEVICE_MISMATCH", defaults.device_mismatch, is_prod)?,
            ip_mismatch: parse_env("RISK_IP_MISMATCH", defaults.ip_mismatch, is_prod)?,
            impossible_travel: parse_env(
                "RISK_IMPOSSIBLE_TRAVEL",
                defaults.impossible_travel,
                is_prod,
            )?,
            user_agent_mismatch: parse_env(
                "RISK_USER_AGENT_MISMATCH",
                defaults.user_agent_mismatch,
                is_prod,
            )?,
            rapid_requests: parse_env("RISK_RAPID_REQUESTS", defaults.rapid_requests, is_prod)?,
            rapid_request_window_ms: parse_env(
                "RISK_RAPID_REQUEST_WINDOW_MS",
                defaults.rapid_request_window_ms,
                is_prod,
            )?,
            step_up_ratio: parse_env("RISK_STEP_UP_RATIO", defaults.step_up_ratio, is_prod)?,
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MfaConfig {
    pub app_name: String,
    pub issuer: String,
    pub time_step_seconds: u64,
    pub digits: u32,
    /// Adjacent time steps accepted on either side of the current one.
    pub window: u64,
    pub backup_code_count: usize,
    pub backup_code_length: usize,
    pub max_attempts: u32,
    pub attempt_window_ms: u64,
}

impl Default for MfaConfig {
    fn default() -> Self {
        Self {
            app_name: "AuthCore".to_string(),
            issuer: "AuthCore".to_string(),
            time_step_seconds: 30,
            digits: 6,
            window: 1,
            backup_code_count: 10,
            backup_code_length: 8,
            max_attempts: 5,
            attempt_window_ms: 5 * 60 * 1000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AuthzConfig {
    /// Deny when no permission matches. Disabling this is a degraded mode.
    pub strict_mode: bool,
    pub cache_enabled: bool,
    pub cache_ttl_ms: u64,
    pub max_inheritance_depth: usize,
}

impl Default for AuthzConfig {
    fn default() -> Self {
        Self {
            strict_mode: true,
            cache_enabled: true,
            cache_ttl_ms: 5 * 60 * 1000,
            max_inheritance_depth: 10,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: String,
    pub access_token_expiry_minutes: i64,
    pub refresh_token_expiry_days: i64,
}

impl Default for JwtConfig {
    fn default() -> Self {
        Self {
            secret: String::new(),
            issuer: "auth-core".to_string(),
            access_token_expiry_minutes: 15,
            refresh_token_expiry_days: 7,
        }
    }
}

impl AuthCoreConfig {
    pub fn from_env() -> Result<Self, AppError> {
        dotenvy::dotenv().ok();

        let env_str = env::var("ENVIRONMENT").unwrap_or_else(|_| "dev".to_string());
        let environment: Environment = env_str
            .parse()
            .map_err(|e: String| AppError::ConfigError(anyhow::anyhow!(e)))?;

        let is_prod = environment == Environment::Prod;
        let session_defaults = SessionConfig::default();
        let mfa_defaults = MfaConfig::default();
        let authz_defaults = AuthzConfig::default();
        let jwt_defaults = JwtConfig::default();

        let config = AuthCoreConfig {
            environment: environment.clone(),
            session: SessionConfig {
                max_sessions_per_user: parse_env(
                    "SESSION_MAX_PER_USER",
                    session_defaults.max_sessions_per_user,
                    is_prod,
                )?,
                session_ttl_seconds: parse_env(
                    "SESSION_TTL_SECONDS",
                    session_defaults.session_ttl_seconds,
                    is_prod,
                )?,
                inactivity_timeout_seconds: parse_env(
                    "SESSION_INACTIVITY_TIMEOUT_SECONDS",
                    session_defaults.inactivity_timeout_seconds,
                    is_prod,
                )?,
                risk_score_threshold: parse_env(
                    "SESSION_RISK_SCORE_THRESHOLD",
                    session_defaults.risk_score_threshold,
                    is_prod,
                )?,
                require_mfa: parse_env("SESSION_REQUIRE_MFA", session_defaults.require_mfa, is_prod)?,
                sweep_interval_seconds: parse_env(
                    "SESSION_SWEEP_INTERVAL_SECONDS",
                    session_defaults.sweep_interval_seconds,
                    is_prod,
                )?,
                risk: RiskPolicy::from_env(is_prod)?,
            },
            mfa: MfaConfig {
                app_name: get_env("MFA_APP_NAME", Some(&mfa_defaults.app_name), is_prod)?,
                issuer: get_env("MFA_ISSUER", Some(&mfa_defaults.issuer), is_prod)?,
                time_step_seconds: parse_env(
                    "MFA_TIME_STEP_SECONDS",
                    mfa_defaults.time_step_seconds,
                    is_prod,
                )?,
                digits: parse_env("MFA_DIGITS", mfa_defaults.digits, is_prod)?,
                window: parse_env("MFA_WINDOW", mfa_defaults.window, is_prod)?,
                backup_code_count: parse_env(
                    "MFA_BACKUP_CODE_COUNT",
                    mfa_defaults.backup_code_count,
                    is_prod,
                )?,
                backup_code_length: parse_env(
                    "MFA_BACKUP_CODE_LENGTH",
                    mfa_defaults.backup_code_length,
                    is_prod,
                )?,
                max_attempts: parse_env("MFA_MAX_ATTEMPTS", mfa_defaults.max_attempts, is_prod)?,
                attempt_window_ms: parse_env(
                    "MFA_ATTEMPT_WINDOW_MS",
                    mfa_defaults.attempt_window_ms,
                    is_prod,
                )?,
            },
            authz: AuthzConfig {
                strict_mode: parse_env("AUTHZ_STRICT_MODE", authz_defaults.strict_mode, is_prod)?,
                cache_enabled: parse_env(
                    "AUTHZ_CACHE_ENABLED",
                    authz_defaults.cache_enabled,
                    is_prod,
                )?,
                cache_ttl_ms: parse_env("AUTHZ_CACHE_TTL_MS", authz_defaults.cache_ttl_ms, is_prod)?,
                max_inheritance_depth: parse_env(
                    "AUTHZ_MAX_INHERITANCE_DEPTH",
                    authz_defaults.max_inheritance_depth,
                    is_prod,
                )?,
            },
            jwt: JwtConfig {
                secret: get_env("JWT_SECRET", None, true)?,
                issuer: get_env("JWT_ISSUER", Some(&jwt_defaults.issuer), is_prod)?,
                access_token_expiry_minutes: parse_env(
                    "JWT_ACCESS_TOKEN_EXPIRY_MINUTES",
                    jwt_defaults.access_token_expiry_minutes,
                    is_prod,
                )?,
                refresh_token_expiry_days: parse_env(
                    "JWT_REFRESH_TOKEN_EXPIRY_DAYS",
                    jwt_defaults.refresh_token_expiry_days,
                    is_prod,
                )?,
            },
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), AppError> {
        let fail = |msg: &str| Err(AppError::ConfigError(anyhow::anyhow!(msg.to_string())));

        if self.session.max_sessions_per_user == 0 {
            return fail("SESSION_MAX_PER_USER must be greater than 0");
        }
        if self.session.session_ttl_seconds <= 0 {
            return fail("SESSION_TTL_SECONDS must be positive");
        }
        if self.session.inactivity_timeout_seconds <= 0 {
            return fail("SESSION_INACTIVITY_TIMEOUT_SECONDS must be positive");
        }
        if !(self.session.risk_score_threshold > 0.0 && self.session.risk_score_threshold <= 1.0) {
            return fail("SESSION_RISK_SCORE_THRESHOLD must be within (0, 1]");
        }
        if self.mfa.time_step_seconds == 0 {
            return fail("MFA_TIME_STEP_SECONDS must be positive");
        }
        if !(6..=8).contains(&self.mfa.digits) {
            return fail("MFA_DIGITS must be between 6 and 8");
        }
        if self.mfa.backup_code_length < 6 {
            return fail("MFA_BACKUP_CODE_LENGTH must be at least 6");
        }
        if self.mfa.max_attempts == 0 {
            return fail("MFA_MAX_ATTEMPTS must be greater than 0");
        }
        if self.authz.max_inheritance_depth == 0 {
            return fail("AUTHZ_MAX_INHERITANCE_DEPTH must be greater than 0");
        }
        if self.jwt.secret.len() < 32 {
            return fail("JWT_SECRET must be at least 32 bytes");
        }
        if self.jwt.access_token_expiry_minutes <= 0 {
            return fail("JWT_ACCESS_TOKEN_EXPIRY_MINUTES must be positive");
        }
        if self.jwt.refresh_token_expiry_days <= 0 {
            return fail("JWT_REFRESH_TOKEN_EXPIRY_DAYS must be positive");
        }

        let risk = &self.session.risk;
        let weights = [
            risk.device_mismatch,
            risk.ip_mismatch,
            risk.impossible_travel,
            risk.user_agent_mismatch,
            risk.rapid_requests,
        ];
        if weights.iter().any(|w| !(0.0..=1.0).contains(w)) {
            return fail("RISK_* weights must be within [0, 1]");
        }
        if risk.rapid_request_window_ms < 0 {
            return fail("RISK_RAPID_REQUEST_WINDOW_MS must not be negative");
        }
        if !(risk.step_up_ratio > 0.0 && risk.step_up_ratio <= 1.0) {
            return fail("RISK_STEP_UP_RATIO must be within (0, 1]");
        }

        if !self.authz.strict_mode {
            if self.environment == Environment::Prod {
                return fail("AUTHZ_STRICT_MODE=false is not allowed in production");
            }
            tracing::warn!("Authorization strict mode disabled: unmatched requests will be ALLOWED");
        }

        Ok(())
    }
}

fn get_env(key: &str, default: Option<&str>, is_prod: bool) -> Result<String, AppError> {
    match env::var(key) {
        Ok(val) => Ok(val),
        Err(_) => {
            if is_prod {
                Err(AppError::ConfigError(anyhow::anyhow!(format!(
                    "{} is required in production but not set",
                    key
                ))))
            } else if let Some(def) = default {
                Ok(def.to_string())
            } else {
                Err(AppError::ConfigError(anyhow::anyhow!(format!(
                    "{} is required but not set",
                    key
                ))))
            }
        }
    }
}

fn parse_env<T>(key: &str, default: T, is_prod: bool) -> Result<T, AppError>
where
    T: std::str::FromStr + ToString,
    T::Err: std::fmt::Display,
{
    get_env(key, Some(&default.to_string()), is_prod)?
        .trim()
        .parse()
        .map_err(|e: T::Err| AppError::ConfigError(anyhow::anyhow!("{} is invalid: {}", key, e)))
}

impl std::str::FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "dev" => Ok(Environment::Dev),
            "prod" => Ok(Environment::Prod),
            _ => Err(format!("Invalid environment: {}", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> AuthCoreConfig {
        AuthCoreConfig {
            jwt: JwtConfig {
                secret: "0123456789abcdef0123456789abcdef".to_string(),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[test]
    fn test_defaults_validate() {
        assert!(valid_config().validate().is_ok());
    }

    #[test]
    fn test_defaults_match_documented_values() {
        let config = AuthCoreConfig::default();
        assert_eq!(config.session.max_sessions_per_user, 5);
        assert_eq!(config.session.risk_score_threshold, 0.8);
        assert_eq!(config.mfa.window, 1);
        assert_eq!(config.mfa.backup_code_count, 10);
        assert_eq!(config.mfa.backup_code_length, 8);
        assert_eq!(config.mfa.max_attempts, 5);
        assert_eq!(config.mfa.attempt_window_ms, 300_000);
        assert!(config.authz.strict_mode);
        assert_eq!(config.authz.max_inheritance_depth, 10);
    }

    #[test]
    fn test_rejects_zero_session_cap() {
        let mut config = valid_config();
        config.session.max_sessions_per_user = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_threshold_out_of_range() {
        let mut config = valid_config();
        config.session.risk_score_threshold = 1.5;
        assert!(config.validate().is_err());
        config.session.risk_score_threshold = 0.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_short_secret() {
        let mut config = valid_config();
        config.jwt.secret = "short".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_non_strict_refused_in_prod() {
        let mut config = valid_config();
        config.authz.strict_mode = false;
        assert!(config.validate().is_ok());
        config.environment = Environment::Prod;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_out_of_range_risk_weights() {
        let mut config = valid_config();
        config.session.risk.device_mismatch = 1.5;
        assert!(config.validate().is_err());

        let mut config = valid_config();
        config.session.risk.step_up_ratio = 0.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_document_fills_defaults() {
        let config: AuthCoreConfig = serde_json::from_value(serde_json::json!({
            "environment": "prod",
            "session": { "max_sessions_per_user": 2, "risk": { "impossible_travel": 0.6 } },
            "authz": { "cache_enabled": false },
            "jwt": { "secret": "0123456789abcdef0123456789abcdef" }
        }))
        .expect("deserialize");

        assert_eq!(config.environment, Environment::Prod);
        assert_eq!(config.session.max_sessions_per_user, 2);
        assert_eq!(config.session.risk.impossible_travel, 0.6);
        assert_eq!(config.session.risk.device_mismatch, 0.5);
        assert_eq!(config.session.inactivity_timeout_seconds, 30 * 60);
        assert_eq!(config.mfa.max_attempts, 5);
        assert!(!config.authz.cache_enabled);
        assert!(config.authz.strict_mode);
        assert_eq!(config.jwt.issuer, "auth-core");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_environment_parse() {
        assert_eq!("PROD".parse::<Environment>(), Ok(Environment::Prod));
        assert!("staging".parse::<Environment>().is_err());
    }
}
