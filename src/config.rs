use std::env;

use thiserror::Error;

const DEFAULT_PORT: u16 = 5000;

/// Process configuration, read from the environment exactly once in `main`
/// and handed to the pieces that need it.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub jwt_secret: String,
    pub port: u16,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing environment variable {0}")]
    Missing(&'static str),
    #[error("invalid PORT value {0:?}")]
    InvalidPort(String),
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let database_url = required("MONGO_URI")?;
        let jwt_secret = required("JWT_SECRET")?;
        let port = match env::var("PORT") {
            Ok(raw) => raw.parse().map_err(|_| ConfigError::InvalidPort(raw))?,
            Err(_) => DEFAULT_PORT,
        };
        Ok(Config {
            database_url,
            jwt_secret,
            port,
        })
    }
}

fn required(key: &'static str) -> Result<String, ConfigError> {
    env::var(key).map_err(|_| ConfigError::Missing(key))
}

#[cfg(test)]
mod tests {
    use super::*;

    // Single test: the process environment is shared, so the scenarios run
    // sequentially instead of racing across test threads.
    #[test]
    fn loads_from_the_environment() {
        env::set_var("MONGO_URI", "mongodb://localhost:27017/storefront");
        env::set_var("JWT_SECRET", "test-secret");
        env::remove_var("PORT");

        let config = Config::from_env().unwrap();
        assert_eq!(config.database_url, "mongodb://localhost:27017/storefront");
        assert_eq!(config.jwt_secret, "test-secret");
        assert_eq!(config.port, DEFAULT_PORT);

        env::set_var("PORT", "8123");
        assert_eq!(Config::from_env().unwrap().port, 8123);

        env::set_var("PORT", "not-a-port");
        assert!(matches!(
            Config::from_env(),
            Err(ConfigError::InvalidPort(_))
        ));
        env::remove_var("PORT");

        env::remove_var("JWT_SECRET");
        assert!(matches!(
            Config::from_env(),
            Err(ConfigError::Missing("JWT_SECRET"))
        ));
        env::set_var("JWT_SECRET", "test-secret");

        env::remove_var("MONGO_URI");
        assert!(matches!(
            Config::from_env(),
            Err(ConfigError::Missing("MONGO_URI"))
        ));
    }
}
