use std::env;
use std::str::FromStr;

#[derive(Debug, Clone)]
pub struct Config {
    pub log_level: String,
    pub enable_file_logs: bool,
    pub log_dir: String,
    pub sled_path: String,
    pub limits: LimitsConfig,
}

#[derive(Debug, Clone)]
pub struct LimitsConfig {
    pub review_default_limit: usize,
    pub review_max_limit: usize,
    pub mark_shown_max_batch: usize,
    pub recent_sessions_limit: usize,
    pub streak_history_days: i64,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            review_default_limit: 20,
            review_max_limit: 200,
            mark_shown_max_batch: 500,
            recent_sessions_limit: 10,
            streak_history_days: 30,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            log_level: env_or("RUST_LOG", "info"),
            enable_file_logs: env_or_bool("ENABLE_FILE_LOGS", false),
            log_dir: env_or("LOG_DIR", "./logs"),
            sled_path: env_or("SLED_PATH", "./data/progress.sled"),
            limits: LimitsConfig {
                review_default_limit: env_or_parse("REVIEW_DEFAULT_LIMIT", 20_usize),
                review_max_limit: env_or_parse("REVIEW_MAX_LIMIT", 200_usize),
                mark_shown_max_batch: env_or_parse("MARK_SHOWN_MAX_BATCH", 500_usize),
                recent_sessions_limit: env_or_parse("RECENT_SESSIONS_LIMIT", 10_usize),
                streak_history_days: env_or_parse("STREAK_HISTORY_DAYS", 30_i64),
            },
        }
    }

    pub fn load() -> Self {
        dotenvy::dotenv().ok();
        Self::from_env()
    }
}

pub fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

pub fn env_or_parse<T>(key: &str, default: T) -> T
where
    T: FromStr + Copy,
{
    match env::var(key) {
        Ok(raw) => match raw.parse::<T>() {
            Ok(v) => v,
            Err(_) => {
                tracing::warn!(
                    key,
                    value = %raw,
                    "Failed to parse env var, using default"
                );
                default
            }
        },
        Err(_) => default,
    }
}

pub fn env_or_bool(key: &str, default: bool) -> bool {
    match env::var(key) {
        Ok(raw) => match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => true,
            "0" | "false" | "no" | "off" => false,
            _ => default,
        },
        Err(_) => default,
    }
}
