use marquee_shared::Showtime;
use serde::Deserialize;
use std::env;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub auth: AuthConfig,
    pub redis: Option<RedisConfig>,
    pub business_rules: BusinessRules,
    /// Showtimes registered at startup
    #[serde(default)]
    pub showtimes: Vec<Showtime>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BusinessRules {
    pub seat_hold_seconds: u64,
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_seconds: u64,
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,
}

fn default_sweep_interval() -> u64 { 15 }

fn default_event_buffer() -> usize { 256 }

/// Longest seat hold accepted from configuration
pub const MAX_SEAT_HOLD_SECONDS: u64 = 24 * 60 * 60;

/// Longest guest token lifetime accepted from configuration
pub const MAX_TOKEN_SECONDS: u64 = 366 * 24 * 60 * 60;

impl BusinessRules {
    /// Lease TTL applied to every seat lock
    pub fn seat_hold(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.seat_hold_seconds.min(MAX_SEAT_HOLD_SECONDS) as i64)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub jwt_expiration_seconds: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RedisConfig {
    pub url: String,
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = config::Config::builder()
            .add_source(config::File::with_name("config/default"))
            // Per-environment overrides are optional
            .add_source(config::File::with_name(&format!("config/{}", run_mode)).required(false))
            // Local overrides, never checked in
            .add_source(config::File::with_name("config/local").required(false))
            // e.g. `MARQUEE__SERVER__PORT=9090`
            .add_source(config::Environment::with_prefix("MARQUEE").separator("__"))
            .build()?;

        s.try_deserialize::<Config>()?.validated()
    }

    pub fn from_toml(source: &str) -> Result<Self, config::ConfigError> {
        config::Config::builder()
            .add_source(config::File::from_str(source, config::FileFormat::Toml))
            .build()?
            .try_deserialize::<Config>()?
            .validated()
    }

    /// Durations are turned into `chrono::Duration` per request, so they are
    /// bounded here instead.
    fn validated(self) -> Result<Self, config::ConfigError> {
        let rules = &self.business_rules;
        if !(1..=MAX_SEAT_HOLD_SECONDS).contains(&rules.seat_hold_seconds) {
            return Err(config::ConfigError::Message(format!(
                "business_rules.seat_hold_seconds must be between 1 and {}",
                MAX_SEAT_HOLD_SECONDS
            )));
        }
        if rules.sweep_interval_seconds == 0 || rules.sweep_interval_seconds > MAX_SEAT_HOLD_SECONDS {
            return Err(config::ConfigError::Message(format!(
                "business_rules.sweep_interval_seconds must be between 1 and {}",
                MAX_SEAT_HOLD_SECONDS
            )));
        }
        if rules.event_buffer == 0 {
            return Err(config::ConfigError::Message(
                "business_rules.event_buffer must be at least 1".to_string(),
            ));
        }
        if !(1..=MAX_TOKEN_SECONDS).contains(&self.auth.jwt_expiration_seconds) {
            return Err(config::ConfigError::Message(format!(
                "auth.jwt_expiration_seconds must be between 1 and {}",
                MAX_TOKEN_SECONDS
            )));
        }
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shipped_defaults_parse() {
        let config = Config::from_toml(include_str!("../../config/default.toml")).unwrap();

        assert_eq!(config.server.port, 8080);
        assert!(config.redis.is_none());
        assert_eq!(config.business_rules.seat_hold(), chrono::Duration::minutes(10));
        assert_eq!(config.showtimes.len(), 1);
        assert!(config.showtimes[0].validate().is_ok());
    }

    #[test]
    fn test_optional_rules_default() {
        let config = Config::from_toml(
            r#"
            [server]
            port = 3000

            [auth]
            jwt_secret = "s"
            jwt_expiration_seconds = 60

            [business_rules]
            seat_hold_seconds = 90

            [redis]
            url = "redis://cache:6379"
            "#,
        )
        .unwrap();

        assert_eq!(config.business_rules.sweep_interval_seconds, 15);
        assert_eq!(config.business_rules.event_buffer, 256);
        assert_eq!(config.redis.unwrap().url, "redis://cache:6379");
        assert!(config.showtimes.is_empty());
    }

    fn with_durations(seat_hold: u64, token: u64) -> String {
        format!(
            r#"
            [server]
            port = 3000

            [auth]
            jwt_secret = "s"
            jwt_expiration_seconds = {}

            [business_rules]
            seat_hold_seconds = {}
            "#,
            token, seat_hold
        )
    }

    #[test]
    fn test_out_of_range_durations_rejected() {
        assert!(Config::from_toml(&with_durations(600, 3600)).is_ok());
        assert!(Config::from_toml(&with_durations(MAX_SEAT_HOLD_SECONDS, MAX_TOKEN_SECONDS)).is_ok());

        assert!(Config::from_toml(&with_durations(0, 3600)).is_err());
        assert!(Config::from_toml(&with_durations(MAX_SEAT_HOLD_SECONDS + 1, 3600)).is_err());
        assert!(Config::from_toml(&with_durations(600, 0)).is_err());
        assert!(Config::from_toml(&with_durations(600, MAX_TOKEN_SECONDS + 1)).is_err());
    }
}
