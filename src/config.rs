//! 配置系统
//! 从 APP_ 前缀的环境变量加载所有配置，使用 Secret 包装敏感信息

use config::{Config, ConfigError, Environment};
use once_cell::sync::Lazy;
use regex::Regex;
use secrecy::{ExposeSecret, Secret};
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// 运行环境: development, test, staging, production
    pub env: String,
    pub service_name: String,
    pub port: u16,
    /// 优雅关闭超时时间（秒）
    pub shutdown_timeout_secs: u64,
}

impl ServerConfig {
    pub fn addr(&self) -> String {
        format!("0.0.0.0:{}", self.port)
    }

    pub fn is_development(&self) -> bool {
        self.env.eq_ignore_ascii_case("development")
    }

    /// development/test 环境下 forgot-password 会直接返回重置令牌
    pub fn exposes_reset_token(&self) -> bool {
        self.is_development() || self.env.eq_ignore_ascii_case("test")
    }
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// 数据库连接 URL（使用 Secret 包装，防止日志泄露）
    pub url: Secret<String>,
    pub max_connections: u32,
    pub min_connections: u32,
    /// 获取连接超时时间（秒）
    pub acquire_timeout_secs: u64,
    pub idle_timeout_secs: u64,
    pub max_lifetime_secs: u64,
}

#[derive(Debug, Clone)]
pub struct RedisConfig {
    pub addr: String,
}

impl RedisConfig {
    /// 补全 redis:// 前缀
    pub fn url(&self) -> String {
        if self.addr.starts_with("redis://") || self.addr.starts_with("rediss://") {
            self.addr.clone()
        } else {
            format!("redis://{}", self.addr)
        }
    }
}

#[derive(Debug, Clone)]
pub struct RabbitMqConfig {
    pub url: Secret<String>,
    pub exchange: String,
    /// 学生注册事件创建账号时使用的初始密码
    pub student_default_password: Secret<String>,
}

#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// 日志级别: trace, debug, info, warn, error
    pub level: String,
    /// 日志格式: json, pretty
    pub format: String,
}

#[derive(Debug, Clone)]
pub struct JwtConfig {
    pub access_secret: Secret<String>,
    pub refresh_secret: Secret<String>,
    pub access_ttl: Duration,
    pub refresh_ttl: Duration,
    pub issuer: String,
    pub audience: String,
}

#[derive(Debug, Clone)]
pub struct SecurityConfig {
    pub cors_allowed_origins: Vec<String>,
    pub lockout_threshold: u32,
    pub lockout_ttl: Duration,
    pub fail_window_ttl: Duration,
    pub audit_retention_days: u32,
}

#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// 全局上限（可选），覆盖所有分类限额
    pub per_minute: Option<u32>,
    pub read_per_minute: u32,
    pub write_per_minute: u32,
    pub auth_per_minute: u32,
}

#[derive(Debug, Clone)]
pub struct PasswordConfig {
    pub min_length: usize,
    pub require_complexity: bool,
    pub history_size: usize,
    pub reset_ttl: Duration,
    pub hash_memory_kib: u32,
    pub hash_iterations: u32,
    pub hash_parallelism: u32,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub redis: RedisConfig,
    pub rabbitmq: RabbitMqConfig,
    pub logging: LoggingConfig,
    pub jwt: JwtConfig,
    pub security: SecurityConfig,
    pub rate_limit: RateLimitConfig,
    pub password: PasswordConfig,
}

/// 环境变量的扁平映射，APP_JWT_ACCESS_TTL -> jwt_access_ttl
#[derive(Debug, Deserialize)]
struct RawSettings {
    env: String,
    service_name: String,
    http_port: u16,
    shutdown_timeout_secs: u64,

    postgres_url: Secret<String>,
    db_max_connections: u32,
    db_min_connections: u32,
    db_acquire_timeout_secs: u64,
    db_idle_timeout_secs: u64,
    db_max_lifetime_secs: u64,

    redis_addr: String,
    rabbit_url: Secret<String>,
    rabbit_exchange: String,
    student_default_password: Secret<String>,

    log_level: String,
    log_format: String,

    jwt_access_secret: Secret<String>,
    jwt_refresh_secret: Secret<String>,
    jwt_access_ttl: String,
    jwt_refresh_ttl: String,
    jwt_issuer: String,
    jwt_audience: String,

    cors_allowed_origins: Vec<String>,
    lockout_threshold: u32,
    lockout_ttl: String,
    fail_window_ttl: String,
    audit_retention_days: u32,

    rate_limit_per_minute: Option<u32>,
    rate_limit_read_per_minute: u32,
    rate_limit_write_per_minute: u32,
    rate_limit_auth_per_minute: u32,

    password_min_length: usize,
    password_require_complexity: bool,
    password_history_size: usize,
    password_reset_ttl: String,
    password_hash_memory_kib: u32,
    password_hash_iterations: u32,
    password_hash_parallelism: u32,
}

impl AppConfig {
    /// 从环境变量加载配置
    pub fn from_env() -> Result<Self, ConfigError> {
        let settings = Config::builder()
            .set_default("env", "development")?
            .set_default("service_name", "auth-service")?
            .set_default("http_port", 8080)?
            .set_default("shutdown_timeout_secs", 10)?
            .set_default("postgres_url", "")?
            .set_default("db_max_connections", 10)?
            .set_default("db_min_connections", 2)?
            .set_default("db_acquire_timeout_secs", 5)?
            .set_default("db_idle_timeout_secs", 600)?
            .set_default("db_max_lifetime_secs", 1800)?
            .set_default("redis_addr", "localhost:6379")?
            .set_default("rabbit_url", "")?
            .set_default("rabbit_exchange", "sisfo.events")?
            .set_default("student_default_password", "Student@123!")?
            .set_default("log_level", "info")?
            .set_default("log_format", "json")?
            .set_default("jwt_access_secret", "")?
            .set_default("jwt_refresh_secret", "")?
            .set_default("jwt_access_ttl", "15m")?
            .set_default("jwt_refresh_ttl", "168h")?
            .set_default("jwt_issuer", "sisfo")?
            .set_default("jwt_audience", "api")?
            .set_default("cors_allowed_origins", vec!["*"])?
            .set_default("lockout_threshold", 5)?
            .set_default("lockout_ttl", "15m")?
            .set_default("fail_window_ttl", "15m")?
            .set_default("audit_retention_days", 90)?
            .set_default("rate_limit_read_per_minute", 100)?
            .set_default("rate_limit_write_per_minute", 30)?
            .set_default("rate_limit_auth_per_minute", 5)?
            .set_default("password_min_length", 8)?
            .set_default("password_require_complexity", true)?
            .set_default("password_history_size", 5)?
            .set_default("password_reset_ttl", "30m")?
            .set_default("password_hash_memory_kib", 19456)?
            .set_default("password_hash_iterations", 2)?
            .set_default("password_hash_parallelism", 1)?
            .add_source(
                Environment::with_prefix("APP")
                    .prefix_separator("_")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("cors_allowed_origins"),
            )
            .build()?;

        let raw: RawSettings = settings.try_deserialize()?;
        let config = AppConfig::try_from(raw)?;

        config.validate()?;

        Ok(config)
    }

    /// 验证配置合法性
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::Message("HTTP_PORT must be non-zero".to_string()));
        }

        match self.logging.level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => {
                return Err(ConfigError::Message(format!(
                    "Invalid log level: {}. Must be one of: trace, debug, info, warn, error",
                    self.logging.level
                )))
            }
        }

        match self.logging.format.to_lowercase().as_str() {
            "json" | "pretty" => {}
            _ => {
                return Err(ConfigError::Message(format!(
                    "Invalid log format: {}. Must be one of: json, pretty",
                    self.logging.format
                )))
            }
        }

        if self.database.max_connections < self.database.min_connections {
            return Err(ConfigError::Message(
                "DB_MAX_CONNECTIONS must be >= DB_MIN_CONNECTIONS".to_string(),
            ));
        }

        let access = self.jwt.access_secret.expose_secret();
        let refresh = self.jwt.refresh_secret.expose_secret();
        if access.is_empty() || refresh.is_empty() {
            return Err(ConfigError::Message(
                "JWT_ACCESS_SECRET and JWT_REFRESH_SECRET are required".to_string(),
            ));
        }
        if access == refresh {
            return Err(ConfigError::Message(
                "JWT_ACCESS_SECRET and JWT_REFRESH_SECRET must differ".to_string(),
            ));
        }

        if self.jwt.access_ttl.is_zero() || self.jwt.refresh_ttl.is_zero() {
            return Err(ConfigError::Message("JWT TTLs must be positive".to_string()));
        }
        if self.jwt.refresh_ttl <= self.jwt.access_ttl {
            return Err(ConfigError::Message(
                "JWT_REFRESH_TTL must be longer than JWT_ACCESS_TTL".to_string(),
            ));
        }

        if self.redis.addr.trim().is_empty() {
            return Err(ConfigError::Message("REDIS_ADDR is required".to_string()));
        }

        if self.password.min_length < 6 || self.password.min_length > 128 {
            return Err(ConfigError::Message(
                "PASSWORD_MIN_LENGTH must be between 6 and 128".to_string(),
            ));
        }

        if self.password.history_size == 0 {
            return Err(ConfigError::Message(
                "PASSWORD_HISTORY_SIZE must be at least 1".to_string(),
            ));
        }

        if self.security.lockout_threshold == 0 {
            return Err(ConfigError::Message(
                "LOCKOUT_THRESHOLD must be at least 1".to_string(),
            ));
        }

        Ok(())
    }

    /// 认证服务额外要求 Postgres 与 RabbitMQ 地址（网关不需要）
    pub fn require_persistence(&self) -> Result<(), ConfigError> {
        if self.database.url.expose_secret().trim().is_empty() {
            return Err(ConfigError::Message("POSTGRES_URL is required".to_string()));
        }
        if self.rabbitmq.url.expose_secret().trim().is_empty() {
            return Err(ConfigError::Message("RABBIT_URL is required".to_string()));
        }
        Ok(())
    }
}

impl TryFrom<RawSettings> for AppConfig {
    type Error = ConfigError;

    fn try_from(raw: RawSettings) -> Result<Self, Self::Error> {
        let cors_allowed_origins = raw
            .cors_allowed_origins
            .into_iter()
            .map(|o| o.trim().to_string())
            .filter(|o| !o.is_empty())
            .collect();

        Ok(AppConfig {
            server: ServerConfig {
                env: raw.env,
                service_name: raw.service_name,
                port: raw.http_port,
                shutdown_timeout_secs: raw.shutdown_timeout_secs,
            },
            database: DatabaseConfig {
                url: raw.postgres_url,
                max_connections: raw.db_max_connections,
                min_connections: raw.db_min_connections,
                acquire_timeout_secs: raw.db_acquire_timeout_secs,
                idle_timeout_secs: raw.db_idle_timeout_secs,
                max_lifetime_secs: raw.db_max_lifetime_secs,
            },
            redis: RedisConfig { addr: raw.redis_addr },
            rabbitmq: RabbitMqConfig {
                url: raw.rabbit_url,
                exchange: raw.rabbit_exchange,
                student_default_password: raw.student_default_password,
            },
            logging: LoggingConfig {
                level: raw.log_level,
                format: raw.log_format,
            },
            jwt: JwtConfig {
                access_secret: raw.jwt_access_secret,
                refresh_secret: raw.jwt_refresh_secret,
                access_ttl: parse_duration(&raw.jwt_access_ttl)?,
                refresh_ttl: parse_duration(&raw.jwt_refresh_ttl)?,
                issuer: raw.jwt_issuer,
                audience: raw.jwt_audience,
            },
            security: SecurityConfig {
                cors_allowed_origins,
                lockout_threshold: raw.lockout_threshold,
                lockout_ttl: parse_duration(&raw.lockout_ttl)?,
                fail_window_ttl: parse_duration(&raw.fail_window_ttl)?,
                audit_retention_days: raw.audit_retention_days,
            },
            rate_limit: RateLimitConfig {
                per_minute: raw.rate_limit_per_minute.filter(|n| *n > 0),
                read_per_minute: raw.rate_limit_read_per_minute,
                write_per_minute: raw.rate_limit_write_per_minute,
                auth_per_minute: raw.rate_limit_auth_per_minute,
            },
            password: PasswordConfig {
                min_length: raw.password_min_length,
                require_complexity: raw.password_require_complexity,
                history_size: raw.password_history_size,
                reset_ttl: parse_duration(&raw.password_reset_ttl)?,
                hash_memory_kib: raw.password_hash_memory_kib,
                hash_iterations: raw.password_hash_iterations,
                hash_parallelism: raw.password_hash_parallelism,
            },
        })
    }
}

static DURATION_PART: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(\d+)(ms|s|m|h|d)").expect("duration pattern compiles")
});

/// 解析时长: "15m", "168h", "1h30m", "30s", "1d" 或纯秒数
pub fn parse_duration(input: &str) -> Result<Duration, ConfigError> {
    let value = input.trim();
    if value.is_empty() {
        return Err(ConfigError::Message("empty duration".to_string()));
    }

    if let Ok(secs) = value.parse::<u64>() {
        return Ok(Duration::from_secs(secs));
    }

    let mut total = Duration::ZERO;
    let mut consumed = 0;
    for cap in DURATION_PART.captures_iter(value) {
        let whole = cap.get(0).map(|m| m.as_str()).unwrap_or_default();
        consumed += whole.len();

        let amount: u64 = cap[1]
            .parse()
            .map_err(|_| ConfigError::Message(format!("invalid duration: {input}")))?;
        total += match &cap[2] {
            "ms" => Duration::from_millis(amount),
            "s" => Duration::from_secs(amount),
            "m" => Duration::from_secs(amount * 60),
            "h" => Duration::from_secs(amount * 3600),
            _ => Duration::from_secs(amount * 86_400),
        };
    }

    if consumed != value.len() {
        return Err(ConfigError::Message(format!("invalid duration: {input}")));
    }

    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    const KEYS: &[&str] = &[
        "APP_JWT_ACCESS_SECRET",
        "APP_JWT_REFRESH_SECRET",
        "APP_LOG_LEVEL",
        "APP_CORS_ALLOWED_ORIGINS",
        "APP_RATE_LIMIT_PER_MINUTE",
        "APP_JWT_ACCESS_TTL",
    ];

    fn clear_env() {
        for key in KEYS {
            std::env::remove_var(key);
        }
    }

    fn set_secrets() {
        std::env::set_var("APP_JWT_ACCESS_SECRET", "access-secret-for-config-tests-0001");
        std::env::set_var("APP_JWT_REFRESH_SECRET", "refresh-secret-for-config-tests-001");
    }

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("15m").unwrap(), Duration::from_secs(900));
        assert_eq!(parse_duration("168h").unwrap(), Duration::from_secs(604_800));
        assert_eq!(parse_duration("1h30m").unwrap(), Duration::from_secs(5400));
        assert_eq!(parse_duration("1d").unwrap(), Duration::from_secs(86_400));
        assert_eq!(parse_duration("45").unwrap(), Duration::from_secs(45));
        assert_eq!(parse_duration("250ms").unwrap(), Duration::from_millis(250));
        assert!(parse_duration("").is_err());
        assert!(parse_duration("15 minutes").is_err());
        assert!(parse_duration("m15").is_err());
    }

    #[test]
    fn test_redis_url_prefix() {
        let cfg = RedisConfig { addr: "cache:6379".to_string() };
        assert_eq!(cfg.url(), "redis://cache:6379");

        let cfg = RedisConfig { addr: "redis://cache:6379/1".to_string() };
        assert_eq!(cfg.url(), "redis://cache:6379/1");
    }

    #[test]
    #[serial]
    fn test_config_defaults() {
        clear_env();
        set_secrets();

        let config = AppConfig::from_env().unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.jwt.access_ttl, Duration::from_secs(900));
        assert_eq!(config.jwt.refresh_ttl, Duration::from_secs(604_800));
        assert_eq!(config.jwt.issuer, "sisfo");
        assert_eq!(config.jwt.audience, "api");
        assert_eq!(config.rate_limit.per_minute, None);
        assert_eq!(config.rate_limit.auth_per_minute, 5);
        assert_eq!(config.password.history_size, 5);
        assert_eq!(config.rabbitmq.exchange, "sisfo.events");
        assert_eq!(config.security.cors_allowed_origins, vec!["*".to_string()]);

        clear_env();
    }

    #[test]
    #[serial]
    fn test_config_reads_lists_and_ceiling() {
        clear_env();
        set_secrets();
        std::env::set_var(
            "APP_CORS_ALLOWED_ORIGINS",
            "https://app.example.com,*.sekolah.id",
        );
        std::env::set_var("APP_RATE_LIMIT_PER_MINUTE", "1");
        std::env::set_var("APP_JWT_ACCESS_TTL", "5m");

        let config = AppConfig::from_env().unwrap();
        assert_eq!(
            config.security.cors_allowed_origins,
            vec!["https://app.example.com".to_string(), "*.sekolah.id".to_string()]
        );
        assert_eq!(config.rate_limit.per_minute, Some(1));
        assert_eq!(config.jwt.access_ttl, Duration::from_secs(300));

        clear_env();
    }

    #[test]
    #[serial]
    fn test_config_rejects_missing_secrets() {
        clear_env();

        assert!(AppConfig::from_env().is_err());
    }

    #[test]
    #[serial]
    fn test_config_rejects_equal_secrets() {
        clear_env();
        std::env::set_var("APP_JWT_ACCESS_SECRET", "same-secret-value-same-secret-value");
        std::env::set_var("APP_JWT_REFRESH_SECRET", "same-secret-value-same-secret-value");

        assert!(AppConfig::from_env().is_err());

        clear_env();
    }

    #[test]
    #[serial]
    fn test_config_validation_invalid_log_level() {
        clear_env();
        set_secrets();
        std::env::set_var("APP_LOG_LEVEL", "verbose");

        assert!(AppConfig::from_env().is_err());

        clear_env();
    }

    #[test]
    #[serial]
    fn test_require_persistence() {
        clear_env();
        set_secrets();

        let config = AppConfig::from_env().unwrap();
        assert!(config.require_persistence().is_err());

        clear_env();
    }
}
