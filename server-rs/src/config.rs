use std::env;

#[derive(Clone, Debug)]
pub struct Config {
    pub port: u16,
    pub app_env: String,
    pub cors_origins: Vec<String>,
    pub public_base_url: String,
    pub store: StoreBackend,
    pub db: DbConfig,
    pub rate_limit: RateLimitConfig,
    pub ledger: LedgerConfig,
    pub default_lang: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StoreBackend {
    Postgres,
    Memory,
}

#[derive(Clone, Debug)]
pub struct DbConfig {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub user: String,
    pub password: String,
    pub pool_min: u32,
    pub pool_max: u32,
}

#[derive(Clone, Debug)]
pub struct RateLimitConfig {
    pub window_secs: u64,
    pub max_requests: u32,
    pub write_max: u32,
}

#[derive(Clone, Debug)]
pub struct LedgerConfig {
    pub bookings_page_size: i64,
    pub feed_capacity: usize,
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_or_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn explicit_database_url() -> Option<String> {
    env::var("DATABASE_URL")
        .ok()
        .or_else(|| env::var("POSTGRES_URL").ok())
        .filter(|s| !s.is_empty())
}

fn parse_store_backend(raw: Option<&str>, has_database_url: bool) -> StoreBackend {
    match raw.map(|s| s.trim().to_ascii_lowercase()).as_deref() {
        Some("postgres") | Some("pg") => StoreBackend::Postgres,
        Some("memory") | Some("mem") => StoreBackend::Memory,
        _ if has_database_url => StoreBackend::Postgres,
        _ => StoreBackend::Memory,
    }
}

impl Config {
    pub fn from_env() -> Self {
        let store_raw = env::var("STORE_BACKEND").ok();
        Self {
            port: env_or_parse("PORT", 3000),
            app_env: env_or("APP_ENV", "development"),
            cors_origins: env_or("CORS_ORIGINS", "http://localhost:5173")
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            public_base_url: env_or("PUBLIC_BASE_URL", "http://localhost:5173"),
            store: parse_store_backend(store_raw.as_deref(), explicit_database_url().is_some()),
            db: DbConfig {
                host: env_or("DB_HOST", "localhost"),
                port: env_or_parse("DB_PORT", 5432),
                database: env_or("DB_NAME", "next_up"),
                user: env_or("DB_USER", "next_up"),
                password: env_or("DB_PASSWORD", ""),
                pool_min: env_or_parse("DB_POOL_MIN", 1),
                pool_max: env_or_parse("DB_POOL_MAX", 10),
            },
            rate_limit: RateLimitConfig {
                window_secs: 60,
                max_requests: env_or_parse("RATE_LIMIT_MAX", 100),
                write_max: env_or_parse("RATE_LIMIT_WRITE", 30),
            },
            ledger: LedgerConfig {
                bookings_page_size: env_or_parse("BOOKINGS_PAGE_SIZE", 12),
                feed_capacity: env_or_parse("FEED_CAPACITY", 256),
            },
            default_lang: env_or("DEFAULT_LANG", "fo"),
        }
    }

    pub fn database_url(&self) -> String {
        if let Some(url) = explicit_database_url() {
            return url;
        }
        format!(
            "postgres://{}:{}@{}:{}/{}",
            self.db.user, self.db.password, self.db.host, self.db.port, self.db.database
        )
    }

    /// Link that opens the team in the web client.
    pub fn share_url(&self, team_id: &str) -> String {
        format!(
            "{}?team={}",
            self.public_base_url.trim_end_matches('/'),
            team_id
        )
    }
}

#[cfg(test)]
impl Config {
    pub fn for_tests() -> Self {
        Self {
            port: 0,
            app_env: "test".into(),
            cors_origins: vec![],
            public_base_url: "https://next.example/".into(),
            store: StoreBackend::Memory,
            db: DbConfig {
                host: "localhost".into(),
                port: 5432,
                database: "next_up".into(),
                user: "next_up".into(),
                password: String::new(),
                pool_min: 1,
                pool_max: 1,
            },
            rate_limit: RateLimitConfig {
                window_secs: 60,
                max_requests: 10_000,
                write_max: 10_000,
            },
            ledger: LedgerConfig {
                bookings_page_size: 12,
                feed_capacity: 16,
            },
            default_lang: "fo".into(),
        }
    }
}
