use std::{env, fmt::Display, path::PathBuf, str::FromStr};

use anyhow::{Context, Result};
use tracing::info;

#[derive(Debug, Clone)]
pub struct Config {
    pub database: DatabaseConfig,
    pub server: ServerConfig,
    pub carts: CartsConfig,
    pub feed: FeedConfig,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone)]
pub struct CartsConfig {
    pub storage_dir: PathBuf,
}

#[derive(Debug, Clone)]
pub struct FeedConfig {
    /// Changes buffered per subscriber before it starts lagging.
    pub capacity: usize,
}

/// Reads the configuration from the environment. Only `DATABASE_URL` is required.
pub fn load() -> Result<Config> {
    Ok(Config {
        database: DatabaseConfig {
            url: env::var("DATABASE_URL").context("DATABASE_URL must be set")?,
            max_connections: try_load("DATABASE_MAX_CONNECTIONS", "10")?,
        },
        server: ServerConfig {
            host: try_load("SERVER_HOST", "0.0.0.0")?,
            port: try_load("SERVER_PORT", "3000")?,
        },
        carts: CartsConfig {
            storage_dir: try_load("CART_STORAGE_DIR", "./data/carts")?,
        },
        feed: FeedConfig {
            capacity: try_load("FEED_CAPACITY", "256")?,
        },
    })
}

fn try_load<T: FromStr>(key: &str, default: &str) -> Result<T>
where
    T::Err: Display,
{
    let raw = env::var(key).unwrap_or_else(|_| {
        info!("{key} not set, using default: {default}");
        default.to_string()
    });

    raw.parse()
        .map_err(|err| anyhow::anyhow!("Invalid {key} value `{raw}`: {err}"))
}
