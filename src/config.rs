use serde::{Deserialize, Serialize};
use thiserror::Error;

/// 默认的沙盒环境基础 URL（路由直接挂在 /api 下）
pub const DEFAULT_DEV_BASE_URL: &str = "https://sandbox.crewhub.dev/api";
/// 默认的生产环境基础 URL（生产路由挂在 base 之后的 /api 前缀下）
pub const DEFAULT_PROD_BASE_URL: &str = "https://mocked-up-url-for-test.com";

#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("生产模式需要有效的 API_TOKEN")]
    MissingToken,
}

/// 数据源类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SourceKind {
    Sandbox,
    Production,
}

impl SourceKind {
    /// 入库时使用的来源标记
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Sandbox => "dev",
            SourceKind::Production => "prod",
        }
    }
}

/// 已解析的数据源：基础 URL 与随每个出站请求附带的请求头
#[derive(Debug, Clone)]
pub struct ResolvedSource {
    pub kind: SourceKind,
    pub base_url: String,
    pub headers: Vec<(String, String)>,
}

/// 管道运行配置。每次运行时从环境变量重新读取，
/// 不做进程级缓存，配置变更无需重启即可生效。
#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub use_prod: bool,
    pub api_token: Option<String>,
    pub dev_base_url: String,
    pub prod_base_url: String,
    pub redis_url: Option<String>,
    pub database_url: String,
    pub wookiee_mode: bool,
    pub cache_ttl_secs: u64,
    pub fetch_concurrency: usize,
    pub backup_dir: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            use_prod: false,
            api_token: None,
            dev_base_url: DEFAULT_DEV_BASE_URL.to_string(),
            prod_base_url: DEFAULT_PROD_BASE_URL.to_string(),
            redis_url: None,
            database_url: "sqlite://crew.db?mode=rwc".to_string(),
            wookiee_mode: false,
            cache_ttl_secs: 3600,
            fetch_concurrency: 5,
            backup_dir: "backups".to_string(),
        }
    }
}

impl ApiConfig {
    /// 从环境变量读取配置
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            use_prod: env_flag("USE_PROD", false),
            api_token: env_nonempty("API_TOKEN"),
            dev_base_url: env_or("DEV_BASE_URL", &defaults.dev_base_url),
            prod_base_url: env_or("PROD_BASE_URL", &defaults.prod_base_url),
            redis_url: env_nonempty("REDIS_URL"),
            database_url: env_or("DATABASE_URL", &defaults.database_url),
            wookiee_mode: env_flag("WOOKIEE_MODE", false),
            cache_ttl_secs: env_parsed("CACHE_TTL_SECS", defaults.cache_ttl_secs),
            fetch_concurrency: env_parsed("FETCH_CONCURRENCY", defaults.fetch_concurrency),
            backup_dir: env_or("BACKUP_DIR", &defaults.backup_dir),
        }
    }

    /// 解析本次运行应使用的数据源。纯函数，无副作用。
    ///
    /// 生产模式下缺少有效 token 时立即失败，不做重试。
    pub fn resolve(&self) -> Result<ResolvedSource, ConfigError> {
        if self.use_prod {
            let token = self.api_token.as_deref().unwrap_or("").trim();
            if token.is_empty() {
                return Err(ConfigError::MissingToken);
            }
            Ok(ResolvedSource {
                kind: SourceKind::Production,
                base_url: self.prod_base_url.trim_end_matches('/').to_string(),
                headers: vec![("API-TOKEN".to_string(), token.to_string())],
            })
        } else {
            Ok(ResolvedSource {
                kind: SourceKind::Sandbox,
                base_url: self.dev_base_url.trim_end_matches('/').to_string(),
                headers: Vec::new(),
            })
        }
    }
}

fn env_flag(name: &str, default: bool) -> bool {
    match std::env::var(name) {
        Ok(v) => matches!(v.trim().to_ascii_lowercase().as_str(), "true" | "1"),
        Err(_) => default,
    }
}

fn env_or(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

fn env_nonempty(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn env_parsed<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}
