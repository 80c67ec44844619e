use std::{env, fmt::Display, str::FromStr};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("Invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: Option<String>,
    pub redis_url: Option<String>,
    /// Public site root; share links and the dashboard redirect hang off it.
    pub app_url: String,
    /// Where this server is reachable; login links point here.
    pub api_url: String,
    pub jwt_secret: String,
    /// Session lifetime in minutes.
    pub jwt_maxage: i64,
    pub port: u16,
    pub service_api_key: String,
    pub login_link_ttl_minutes: i64,
    pub waitlist_rate_limit_max: usize,
    pub waitlist_rate_limit_window_secs: u64,
    pub recent_referrals_limit: i64,
    pub allowed_origins: Vec<String>,
    pub resend_api_key: Option<String>,
    pub from_email: String,
    pub log_level: String,
}

impl Config {
    pub fn init() -> Result<Config, ConfigError> {
        let jwt_secret = required("JWT_SECRET_KEY")?;
        let service_api_key = required("SERVICE_API_KEY")?;

        let app_url = optional("APP_URL").unwrap_or_else(|| "http://localhost:5173".to_string());
        let port = parsed("PORT", 8000)?;
        let api_url = optional("API_URL").unwrap_or_else(|| format!("http://localhost:{}", port));

        let allowed_origins = optional("ALLOWED_ORIGINS")
            .map(|raw| {
                raw.split(',')
                    .map(|origin| origin.trim().to_string())
                    .filter(|origin| !origin.is_empty())
                    .collect()
            })
            .unwrap_or_else(|| vec![app_url.clone()]);

        Ok(Config {
            database_url: optional("DATABASE_URL"),
            redis_url: optional("REDIS_URL"),
            app_url: trim_url(app_url),
            api_url: trim_url(api_url),
            jwt_secret,
            jwt_maxage: parsed("JWT_MAXAGE", 60)?,
            port,
            service_api_key,
            login_link_ttl_minutes: parsed("LOGIN_LINK_TTL_MINUTES", 60)?,
            waitlist_rate_limit_max: parsed("WAITLIST_RATE_LIMIT_MAX", 3)?,
            waitlist_rate_limit_window_secs: parsed("WAITLIST_RATE_LIMIT_WINDOW_SECS", 60)?,
            recent_referrals_limit: parsed("RECENT_REFERRALS_LIMIT", 20)?,
            allowed_origins,
            resend_api_key: optional("RESEND_API_KEY"),
            from_email: optional("FROM_EMAIL")
                .unwrap_or_else(|| "Qrew <noreply@qrew.app>".to_string()),
            log_level: optional("LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
        })
    }

    pub fn dashboard_url(&self) -> String {
        format!("{}/dashboard", self.app_url)
    }
}

fn trim_url(url: String) -> String {
    url.trim_end_matches('/').to_string()
}

fn required(key: &'static str) -> Result<String, ConfigError> {
    optional(key).ok_or(ConfigError::Missing(key))
}

fn optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parsed<T>(key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr + Display,
    T::Err: Display,
{
    match optional(key) {
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            key,
            reason: e.to_string(),
        }),
        None => {
            tracing::debug!("{} not set, using default: {}", key, default);
            Ok(default)
        }
    }
}

#[cfg(test)]
impl Config {
    pub fn for_tests() -> Config {
        Config {
            database_url: None,
            redis_url: None,
            app_url: "https://qrew.test".to_string(),
            api_url: "https://api.qrew.test".to_string(),
            jwt_secret: "test-secret".to_string(),
            jwt_maxage: 60,
            port: 0,
            service_api_key: "test-api-key".to_string(),
            login_link_ttl_minutes: 60,
            waitlist_rate_limit_max: 3,
            waitlist_rate_limit_window_secs: 60,
            recent_referrals_limit: 20,
            allowed_origins: vec!["https://qrew.test".to_string()],
            resend_api_key: None,
            from_email: "Qrew <noreply@qrew.test>".to_string(),
            log_level: "debug".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trailing_slashes_are_dropped() {
        assert_eq!(trim_url("https://qrew.app///".to_string()), "https://qrew.app");
    }

    #[test]
    fn dashboard_url_hangs_off_app_url() {
        let config = Config::for_tests();
        assert_eq!(config.dashboard_url(), "https://qrew.test/dashboard");
    }
}
