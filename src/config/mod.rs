use std::env;

/// Upper bound for every minute-based setting (one year)
pub const MAX_CONFIG_MINUTES: i64 = 525_600;

/// Runtime configuration for the share service
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Database connection string (default: local SQLite file)
    pub database_url: String,

    /// Maximum upload size in bytes (default: 1 GB)
    pub max_file_size: usize,

    /// Public base URL used to build share links (default: "http://localhost:3000")
    pub base_url: String,

    /// Directory holding uploaded blobs (default: "files")
    pub files_dir: String,

    /// Expiration applied to freshly uploaded shares, in minutes (default: 30)
    pub default_share_expiry_minutes: i64,

    /// Upper bound for `expires_minutes` on settings updates (default: 1440)
    pub max_share_expiry_minutes: i64,

    /// Lifetime of login tokens in minutes (default: 1440)
    pub access_token_minutes: i64,

    /// JWT Secret Key (Required in production)
    pub jwt_secret: String,

    /// Allowed CORS Origins (comma separated)
    pub allowed_origins: Vec<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite://fileshare.db?mode=rwc".to_string(),
            max_file_size: 1024 * 1024 * 1024, // 1 GB
            base_url: "http://localhost:3000".to_string(),
            files_dir: "files".to_string(),
            default_share_expiry_minutes: 30,
            max_share_expiry_minutes: 1440,
            access_token_minutes: 1440,
            jwt_secret: "secret".to_string(),
            allowed_origins: vec![
                "http://localhost:3000".to_string(),
                "http://localhost:5173".to_string(), // Vite default
                "http://127.0.0.1:3000".to_string(),
            ],
        }
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, fallback: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(fallback)
}

/// Minute settings must be positive and bounded; anything else keeps the default
fn parse_minutes(key: &str, fallback: i64) -> i64 {
    let value = parse_env(key, fallback);
    if (1..=MAX_CONFIG_MINUTES).contains(&value) {
        value
    } else {
        tracing::warn!(
            "⚠️  {}={} is outside 1..={}, using {}",
            key,
            value,
            MAX_CONFIG_MINUTES,
            fallback
        );
        fallback
    }
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let default = Self::default();

        let max_share_expiry_minutes =
            parse_minutes("MAX_SHARE_EXPIRY_MINUTES", default.max_share_expiry_minutes);
        let mut default_share_expiry_minutes = parse_minutes(
            "DEFAULT_SHARE_EXPIRY_MINUTES",
            default.default_share_expiry_minutes,
        );
        if default_share_expiry_minutes > max_share_expiry_minutes {
            tracing::warn!(
                "⚠️  Default share expiry {}min exceeds the maximum, capping at {}min",
                default_share_expiry_minutes,
                max_share_expiry_minutes
            );
            default_share_expiry_minutes = max_share_expiry_minutes;
        }

        Self {
            database_url: env::var("DATABASE_URL").unwrap_or(default.database_url),
            max_file_size: parse_env("MAX_FILE_SIZE", default.max_file_size),
            base_url: env::var("BASE_URL").unwrap_or(default.base_url),
            files_dir: env::var("FILES_DIR").unwrap_or(default.files_dir),
            default_share_expiry_minutes,
            max_share_expiry_minutes,
            access_token_minutes: parse_minutes(
                "ACCESS_TOKEN_MINUTES",
                default.access_token_minutes,
            ),
            // Fallback for dev convenience, strictly enforced in `production()`
            jwt_secret: env::var("JWT_SECRET").unwrap_or(default.jwt_secret),
            allowed_origins: env::var("ALLOWED_ORIGINS")
                .ok()
                .map(|v| v.split(',').map(|s| s.trim().to_string()).collect())
                .unwrap_or(default.allowed_origins),
        }
    }

    /// Create config for development (in-memory database, small uploads)
    pub fn development() -> Self {
        Self {
            database_url: "sqlite::memory:".to_string(),
            max_file_size: 64 * 1024 * 1024,
            ..Self::default()
        }
    }

    /// Create config for production. Fails when `JWT_SECRET` is not set.
    pub fn production() -> anyhow::Result<Self> {
        let jwt_secret = env::var("JWT_SECRET")
            .map_err(|_| anyhow::anyhow!("CRITICAL: JWT_SECRET must be set"))?;

        Ok(Self {
            jwt_secret,
            ..Self::from_env()
        })
    }
}
