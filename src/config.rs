/*
 * Responsibility
 * - Load settings from the environment (.env via dotenvy)
 * - Validate values that would make the server unsafe (fail startup)
 */
use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

// Anything shorter than 128 bits is guessable.
const MIN_NONCE_BYTES: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnv {
    Development,
    Production,
}

impl AppEnv {
    pub fn from_env() -> Self {
        match std::env::var("APP_ENV")
            .unwrap_or_else(|_| "development".to_string())
            .to_ascii_lowercase()
            .as_str()
        {
            "production" | "prod" => Self::Production,
            _ => Self::Development,
        }
    }

    pub fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }
}

#[derive(Debug)]
pub enum ConfigError {
    Missing(&'static str),
    Invalid(&'static str),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Missing(key) => write!(f, "missing configuration: {}", key),
            ConfigError::Invalid(key) => write!(f, "invalid configuration: {}", key),
        }
    }
}

impl std::error::Error for ConfigError {}

#[derive(Clone, Debug)]
pub struct Config {
    pub addr: SocketAddr,
    pub app_env: AppEnv,

    // Absolute base URL clients use to reach us (drives expected htu)
    pub public_base_url: Option<String>,

    pub issuer: String,
    // ES256 PKCS#8 PEM; None => ephemeral key per process
    pub access_jwt_private_key_pem: Option<String>,
    pub access_token_ttl_seconds: u64,
    pub issue_refresh_token: bool,

    pub nonce_bytes: usize,
    pub nonce_ttl: Duration,

    pub dpop_max_age_seconds: i64,
    pub dpop_iat_leeway_seconds: i64,

    pub sweep_interval: Duration,
    pub request_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            addr: SocketAddr::from(([0, 0, 0, 0], 8001)),
            app_env: AppEnv::Development,
            public_base_url: None,
            issuer: "http://localhost:8001".to_string(),
            access_jwt_private_key_pem: None,
            access_token_ttl_seconds: 600, // 10 min
            issue_refresh_token: true,
            nonce_bytes: 24,
            nonce_ttl: Duration::from_secs(300),
            dpop_max_age_seconds: 60,
            dpop_iat_leeway_seconds: 5,
            sweep_interval: Duration::from_secs(60),
            request_timeout: Duration::from_secs(30),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let defaults = Self::default();

        let port: u16 = env_parse("PORT", defaults.addr.port())?;

        let addr: SocketAddr = SocketAddr::from_str(&format!("0.0.0.0:{}", port))
            .map_err(|_| ConfigError::Invalid("PORT"))?;

        let app_env = AppEnv::from_env();

        let public_base_url = std::env::var("PUBLIC_BASE_URL")
            .ok()
            .map(|s| s.trim().trim_end_matches('/').to_string())
            .filter(|s| !s.is_empty());

        if let Some(base) = public_base_url.as_deref() {
            url::Url::parse(base).map_err(|_| ConfigError::Invalid("PUBLIC_BASE_URL"))?;
        }

        let issuer = std::env::var("AUTH_ISSUER").unwrap_or(defaults.issuer);

        let access_jwt_private_key_pem = std::env::var("ACCESS_JWT_PRIVATE_KEY_PEM")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .map(|s| s.replace("\\n", "\n"));

        if access_jwt_private_key_pem.is_none() && app_env.is_production() {
            return Err(ConfigError::Missing("ACCESS_JWT_PRIVATE_KEY_PEM"));
        }

        let access_token_ttl_seconds = env_parse("ACCESS_TOKEN_TTL_SECONDS", defaults.access_token_ttl_seconds)?;

        let issue_refresh_token = std::env::var("ISSUE_REFRESH_TOKEN")
            .map(|v| !matches!(v.to_ascii_lowercase().as_str(), "0" | "false" | "no" | "off"))
            .unwrap_or(defaults.issue_refresh_token);

        let nonce_bytes: usize = env_parse("NONCE_BYTES", defaults.nonce_bytes)?;
        if nonce_bytes < MIN_NONCE_BYTES {
            return Err(ConfigError::Invalid("NONCE_BYTES"));
        }

        let nonce_ttl = Duration::from_secs(env_parse("NONCE_TTL_SECONDS", defaults.nonce_ttl.as_secs())?);

        let dpop_max_age_seconds = non_negative(
            "DPOP_MAX_AGE_SECONDS",
            env_parse("DPOP_MAX_AGE_SECONDS", defaults.dpop_max_age_seconds)?,
        )?;
        let dpop_iat_leeway_seconds = non_negative(
            "DPOP_IAT_LEEWAY_SECONDS",
            env_parse("DPOP_IAT_LEEWAY_SECONDS", defaults.dpop_iat_leeway_seconds)?,
        )?;

        let sweep_interval = Duration::from_secs(
            env_parse("STORE_SWEEP_INTERVAL_SECONDS", defaults.sweep_interval.as_secs())?.max(1),
        );
        let request_timeout = Duration::from_secs(env_parse(
            "REQUEST_TIMEOUT_SECONDS",
            defaults.request_timeout.as_secs(),
        )?);

        Ok(Config {
            addr,
            app_env,
            public_base_url,
            issuer,
            access_jwt_private_key_pem,
            access_token_ttl_seconds,
            issue_refresh_token,
            nonce_bytes,
            nonce_ttl,
            dpop_max_age_seconds,
            dpop_iat_leeway_seconds,
            sweep_interval,
            request_timeout,
        })
    }
}

// Unset -> default; set but unparsable -> startup error.
fn env_parse<T: FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    parse_setting(key, std::env::var(key).ok(), default)
}

fn parse_setting<T: FromStr>(
    key: &'static str,
    raw: Option<String>,
    default: T,
) -> Result<T, ConfigError> {
    match raw {
        None => Ok(default),
        Some(s) => s.trim().parse().map_err(|_| ConfigError::Invalid(key)),
    }
}

fn non_negative(key: &'static str, value: i64) -> Result<i64, ConfigError> {
    if value < 0 {
        return Err(ConfigError::Invalid(key));
    }
    Ok(value)
}
