/*
 * Responsibility
 * - 環境変数や設定の読み込み (IMAS URL, JWKS/Token endpoint, TTL, 必須 permission など)
 * - 設定値のバリデーション (不足なら起動失敗)
 */
use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use url::Url;

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

#[derive(Debug, PartialEq, Eq)]
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

#[derive(Debug, Clone)]
pub struct Config {
    pub addr: SocketAddr,
    pub app_env: AppEnv,

    pub jwks_url: Url,
    pub token_url: Url,
    pub jwks_ttl: Duration,
    pub allow_stale_keys: bool,
    pub leeway_seconds: u64,
    pub issuer: Option<String>,
    pub audience: Option<String>,

    pub legacy_token_header: String,
    pub required_permissions: Vec<String>,

    pub refresh_buffer: Duration,
    pub http_timeout: Duration,
    // Valkey/Redis URL for the shared refresh cache; in-process when unset
    pub refresh_cache_url: Option<String>,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let port = u16::try_from(env_u64("PORT", 3000)?)
            .map_err(|_| ConfigError::Invalid("PORT"))?;

        let addr: SocketAddr = SocketAddr::from_str(&format!("0.0.0.0:{}", port))
            .map_err(|_| ConfigError::Invalid("PORT"))?;

        let app_env = AppEnv::from_env();

        let imas_url = std::env::var("AUTH_IMAS_URL")
            .map_err(|_| ConfigError::Missing("AUTH_IMAS_URL"))
            .and_then(|v| Url::parse(&v).map_err(|_| ConfigError::Invalid("AUTH_IMAS_URL")))?;

        let jwks_url = match std::env::var("AUTH_JWKS_URL") {
            Ok(v) => Url::parse(&v).map_err(|_| ConfigError::Invalid("AUTH_JWKS_URL"))?,
            Err(_) => jwks_endpoint(&imas_url).ok_or(ConfigError::Invalid("AUTH_IMAS_URL"))?,
        };

        let token_url = match std::env::var("AUTH_TOKEN_URL") {
            Ok(v) => Url::parse(&v).map_err(|_| ConfigError::Invalid("AUTH_TOKEN_URL"))?,
            Err(_) => token_endpoint(&imas_url).ok_or(ConfigError::Invalid("AUTH_IMAS_URL"))?,
        };

        let jwks_ttl = Duration::from_secs(env_u64("AUTH_JWKS_TTL_SECONDS", 300)?);

        let allow_stale_keys = env_bool("AUTH_ALLOW_STALE_KEYS")?;

        let leeway_seconds = env_u64("AUTH_LEEWAY_SECONDS", 60)?;

        let issuer = env_non_empty("AUTH_ISSUER");
        let audience = env_non_empty("AUTH_AUDIENCE");

        let legacy_token_header = std::env::var("AUTH_LEGACY_TOKEN_HEADER")
            .unwrap_or_else(|_| "x-imid-token".to_string())
            .to_ascii_lowercase();
        if axum::http::HeaderName::from_str(&legacy_token_header).is_err() {
            return Err(ConfigError::Invalid("AUTH_LEGACY_TOKEN_HEADER"));
        }

        let required_permissions =
            permission_list(&std::env::var("AUTH_REQUIRED_PERMISSIONS").unwrap_or_default());

        let refresh_buffer = Duration::from_secs(env_u64("TOKEN_REFRESH_BUFFER_SECONDS", 30)?);

        let http_timeout = Duration::from_secs(env_u64("HTTP_TIMEOUT_SECONDS", 10)?);

        let refresh_cache_url = env_non_empty("REFRESH_CACHE_URL");

        Ok(Self {
            addr,
            app_env,
            jwks_url,
            token_url,
            jwks_ttl,
            allow_stale_keys,
            leeway_seconds,
            issuer,
            audience,
            legacy_token_header,
            required_permissions,
            refresh_buffer,
            http_timeout,
            refresh_cache_url,
        })
    }
}

/// `{imas}/v1/jwks`
pub fn jwks_endpoint(imas_url: &Url) -> Option<Url> {
    join_path(imas_url, "v1/jwks")
}

/// `{imas}/v1/access-token`
pub fn token_endpoint(imas_url: &Url) -> Option<Url> {
    join_path(imas_url, "v1/access-token")
}

// Url::join drops the last path segment unless the base ends with '/'.
fn join_path(base: &Url, path: &str) -> Option<Url> {
    let mut base = base.clone();
    if !base.path().ends_with('/') {
        let with_slash = format!("{}/", base.path());
        base.set_path(&with_slash);
    }
    base.join(path).ok()
}

/// `"a, b,,c"` -> `["a", "b", "c"]`, first occurrence wins on duplicates.
pub fn permission_list(raw: &str) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for p in raw.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        if !out.iter().any(|seen| seen == p) {
            out.push(p.to_string());
        }
    }
    out
}

fn env_u64(key: &'static str, default: u64) -> Result<u64, ConfigError> {
    parse_u64(key, std::env::var(key).ok().as_deref(), default)
}

// Unset or blank falls back to `default`; anything else must parse.
fn parse_u64(key: &'static str, raw: Option<&str>, default: u64) -> Result<u64, ConfigError> {
    match raw.map(str::trim) {
        None | Some("") => Ok(default),
        Some(v) => v.parse().map_err(|_| ConfigError::Invalid(key)),
    }
}

fn env_bool(key: &'static str) -> Result<bool, ConfigError> {
    match std::env::var(key) {
        Err(_) => Ok(false),
        Ok(v) => match v.trim().to_ascii_lowercase().as_str() {
            "" | "0" | "false" | "no" => Ok(false),
            "1" | "true" | "yes" => Ok(true),
            _ => Err(ConfigError::Invalid(key)),
        },
    }
}

fn env_non_empty(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
