use chrono::Duration;

use crate::service::affiliate_service::RegistrationSettings;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Postgres,
    Memory,
}

fn parse_var<F, T>(lookup: &F, key: &str) -> Option<T>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    lookup(key).and_then(|value| value.trim().parse().ok())
}

#[derive(Debug, Clone)]
pub struct Config {
    /// Required for the postgres backend only.
    pub database_url: Option<String>,
    pub port: u16,
    pub db_max_connections: u32,
    pub store_backend: StoreBackend,
    pub verification_ttl_hours: i64,
    pub spam_flag_threshold: i32,
    pub allowed_origins: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            database_url: None,
            port: 8000,
            db_max_connections: 10,
            store_backend: StoreBackend::Postgres,
            verification_ttl_hours: 24,
            spam_flag_threshold: 50,
            allowed_origins: vec![
                "http://localhost:5173".to_string(),
                "http://localhost:8000".to_string(),
            ],
        }
    }
}

impl Config {
    pub fn init() -> Config {
        Config::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Config
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Config::default();

        let store_backend = match lookup("STORE_BACKEND").as_deref().map(str::trim) {
            Some(value) if value.eq_ignore_ascii_case("memory") => StoreBackend::Memory,
            Some(value) if value.eq_ignore_ascii_case("postgres") => StoreBackend::Postgres,
            Some(value) => {
                tracing::warn!("Unknown STORE_BACKEND '{}', using postgres", value);
                StoreBackend::Postgres
            }
            None => StoreBackend::Postgres,
        };

        let allowed_origins = lookup("ALLOWED_ORIGINS")
            .map(|origins| {
                origins
                    .split(',')
                    .map(|origin| origin.trim().to_string())
                    .filter(|origin| !origin.is_empty())
                    .collect()
            })
            .unwrap_or(defaults.allowed_origins);

        Config {
            database_url: lookup("DATABASE_URL").filter(|url| !url.trim().is_empty()),
            port: parse_var(&lookup, "PORT").unwrap_or(defaults.port),
            db_max_connections: parse_var(&lookup, "DB_MAX_CONNECTIONS")
                .unwrap_or(defaults.db_max_connections),
            store_backend,
            verification_ttl_hours: parse_var(&lookup, "VERIFICATION_TTL_HOURS")
                .unwrap_or(defaults.verification_ttl_hours),
            spam_flag_threshold: parse_var(&lookup, "SPAM_FLAG_THRESHOLD")
                .unwrap_or(defaults.spam_flag_threshold),
            allowed_origins,
        }
    }

    pub fn registration_settings(&self) -> RegistrationSettings {
        RegistrationSettings {
            verification_ttl: Duration::hours(self.verification_ttl_hours),
            spam_flag_threshold: self.spam_flag_threshold,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config_from(vars: &[(&str, &str)]) -> Config {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_apply_when_unset() {
        let config = config_from(&[]);

        assert_eq!(config.port, 8000);
        assert_eq!(config.db_max_connections, 10);
        assert_eq!(config.store_backend, StoreBackend::Postgres);
        assert_eq!(config.database_url, None);
        assert_eq!(config.registration_settings().spam_flag_threshold, 50);
        assert_eq!(
            config.registration_settings().verification_ttl,
            Duration::hours(24)
        );
    }

    #[test]
    fn reads_overrides() {
        let config = config_from(&[
            ("DATABASE_URL", "postgres://localhost/vantex"),
            ("PORT", "9100"),
            ("STORE_BACKEND", "memory"),
            ("SPAM_FLAG_THRESHOLD", "70"),
            ("ALLOWED_ORIGINS", "https://a.example, https://b.example,"),
        ]);

        assert_eq!(config.port, 9100);
        assert_eq!(config.store_backend, StoreBackend::Memory);
        assert_eq!(config.spam_flag_threshold, 70);
        assert_eq!(
            config.allowed_origins,
            vec!["https://a.example", "https://b.example"]
        );
    }

    #[test]
    fn unparsable_numbers_fall_back() {
        let config = config_from(&[("PORT", "eighty")]);
        assert_eq!(config.port, 8000);
    }
}
