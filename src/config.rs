use serde::{Deserialize, Serialize};
use std::env;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub jwt: JwtConfig,
    pub stripe: StripeConfig,
    #[serde(default)]
    pub app: AppConfig,
    #[serde(default)]
    pub vouchers: VoucherConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

/// Key used to verify session tokens issued by the identity service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StripeConfig {
    pub secret_key: String,
    pub webhook_secret: String,
    #[serde(default = "default_webhook_tolerance")]
    pub webhook_tolerance_secs: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Public URL of the frontend; checkout redirects land here.
    pub base_url: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:3000".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoucherConfig {
    pub ttl_hours: i64,
    pub rating_reminder_delay_hours: i64,
}

impl Default for VoucherConfig {
    fn default() -> Self {
        Self {
            ttl_hours: 24,
            rating_reminder_delay_hours: 24,
        }
    }
}

fn default_webhook_tolerance() -> i64 {
    300
}

impl Config {
    pub fn from_toml() -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        let config_path = env::var("CONFIG_PATH").unwrap_or_else(|_| "config.toml".to_string());
        use std::io::ErrorKind;

        let config_result = std::fs::read_to_string(&config_path);

        let mut config: Config = match config_result {
            Ok(config_str) => toml::from_str(&config_str)
                .map_err(|e| format!("failed to parse {config_path}: {e}"))?,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                fn get_env(name: &str) -> Option<String> {
                    env::var(name).ok()
                }
                fn get_env_parse<T: std::str::FromStr>(name: &str, default: T) -> T {
                    env::var(name)
                        .ok()
                        .and_then(|v| v.parse::<T>().ok())
                        .unwrap_or(default)
                }

                let database_url = get_env("DATABASE_URL")
                    .ok_or("DATABASE_URL is not set and no config.toml was found")?;

                Config {
                    server: ServerConfig {
                        host: get_env("SERVER_HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
                        port: get_env_parse("SERVER_PORT", 8080u16),
                    },
                    database: DatabaseConfig {
                        url: database_url,
                        max_connections: get_env_parse("DB_MAX_CONNECTIONS", 10u32),
                    },
                    jwt: JwtConfig {
                        secret: get_env("JWT_SECRET").unwrap_or_default(),
                    },
                    stripe: StripeConfig {
                        secret_key: get_env("STRIPE_SECRET_KEY").unwrap_or_default(),
                        webhook_secret: get_env("STRIPE_WEBHOOK_SECRET").unwrap_or_default(),
                        webhook_tolerance_secs: get_env_parse(
                            "STRIPE_WEBHOOK_TOLERANCE_SECS",
                            default_webhook_tolerance(),
                        ),
                    },
                    app: AppConfig {
                        base_url: get_env("APP_BASE_URL")
                            .unwrap_or_else(|| AppConfig::default().base_url),
                    },
                    vouchers: VoucherConfig {
                        ttl_hours: get_env_parse("VOUCHER_TTL_HOURS", 24i64),
                        rating_reminder_delay_hours: get_env_parse(
                            "RATING_REMINDER_DELAY_HOURS",
                            24i64,
                        ),
                    },
                }
            }
            Err(e) => {
                return Err(format!("cannot read config file {config_path}: {e}").into());
            }
        };

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// The session signing key has no default.
    fn validate(&self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        if self.jwt.secret.trim().is_empty() {
            return Err("JWT_SECRET must be set to the identity service signing key".into());
        }
        Ok(())
    }

    /// Environment variables win over file values.
    fn apply_env_overrides(&mut self) {
        if let Ok(v) = env::var("SERVER_HOST") {
            self.server.host = v;
        }
        if let Some(p) = env::var("SERVER_PORT").ok().and_then(|v| v.parse().ok()) {
            self.server.port = p;
        }
        if let Ok(v) = env::var("DATABASE_URL") {
            self.database.url = v;
        }
        if let Some(mc) = env::var("DB_MAX_CONNECTIONS")
            .ok()
            .and_then(|v| v.parse().ok())
        {
            self.database.max_connections = mc;
        }
        if let Ok(v) = env::var("JWT_SECRET") {
            self.jwt.secret = v;
        }
        if let Ok(v) = env::var("STRIPE_SECRET_KEY") {
            self.stripe.secret_key = v;
        }
        if let Ok(v) = env::var("STRIPE_WEBHOOK_SECRET") {
            self.stripe.webhook_secret = v;
        }
        if let Some(n) = env::var("STRIPE_WEBHOOK_TOLERANCE_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
        {
            self.stripe.webhook_tolerance_secs = n;
        }
        if let Ok(v) = env::var("APP_BASE_URL") {
            self.app.base_url = v;
        }
        if let Some(n) = env::var("VOUCHER_TTL_HOURS")
            .ok()
            .and_then(|v| v.parse().ok())
        {
            self.vouchers.ttl_hours = n;
        }
        if let Some(n) = env::var("RATING_REMINDER_DELAY_HOURS")
            .ok()
            .and_then(|v| v.parse().ok())
        {
            self.vouchers.rating_reminder_delay_hours = n;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_minimal_toml_uses_section_defaults() {
        let raw = r#"
            [server]
            host = "127.0.0.1"
            port = 9000

            [database]
            url = "postgres://localhost/ntc"
            max_connections = 5

            [jwt]
            secret = "s3cret"

            [stripe]
            secret_key = "sk_test_123"
            webhook_secret = "whsec_123"
        "#;
        let config: Config = toml::from_str(raw).unwrap();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.stripe.webhook_tolerance_secs, 300);
        assert_eq!(config.vouchers.ttl_hours, 24);
        assert_eq!(config.vouchers.rating_reminder_delay_hours, 24);
        assert_eq!(config.app.base_url, "http://localhost:3000");
    }

    #[test]
    fn test_parse_voucher_section() {
        let raw = r#"
            [server]
            host = "0.0.0.0"
            port = 8080

            [database]
            url = "postgres://localhost/ntc"
            max_connections = 10

            [jwt]
            secret = "s3cret"

            [stripe]
            secret_key = ""
            webhook_secret = ""
            webhook_tolerance_secs = 60

            [app]
            base_url = "https://ntc.example"

            [vouchers]
            ttl_hours = 12
            rating_reminder_delay_hours = 48
        "#;
        let config: Config = toml::from_str(raw).unwrap();
        assert_eq!(config.stripe.webhook_tolerance_secs, 60);
        assert_eq!(config.app.base_url, "https://ntc.example");
        assert_eq!(config.vouchers.ttl_hours, 12);
        assert_eq!(config.vouchers.rating_reminder_delay_hours, 48);
    }

    #[test]
    fn test_blank_jwt_secret_is_rejected() {
        let raw = r#"
            [server]
            host = "0.0.0.0"
            port = 8080

            [database]
            url = "postgres://localhost/ntc"
            max_connections = 10

            [jwt]
            secret = "  "

            [stripe]
            secret_key = ""
            webhook_secret = ""
        "#;
        let mut config: Config = toml::from_str(raw).unwrap();
        assert!(config.validate().is_err());

        config.jwt.secret = "s3cret".into();
        assert!(config.validate().is_ok());
    }
}
