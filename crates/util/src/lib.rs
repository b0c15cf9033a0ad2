pub mod config;

use std::{env, net::SocketAddr};

pub use config::{AppConfig, ConfigError, Environment, DEFAULT_DATABASE_URL};

pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:8080";

/// Reads `.env` into the process environment. A missing file is fine.
pub fn load_env_file() {
    dotenvy::dotenv().ok();
}

/// `APP_BIND_ADDR`, or [`DEFAULT_BIND_ADDR`].
pub fn server_bind_address() -> Result<SocketAddr, std::net::AddrParseError> {
    env::var("APP_BIND_ADDR")
        .as_deref()
        .unwrap_or(DEFAULT_BIND_ADDR)
        .parse()
}
