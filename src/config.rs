use std::net::SocketAddr;
use thiserror::Error;

pub const DEFAULT_BIND: &str = "127.0.0.1:37240";
pub const DEFAULT_COLUMNS: [&str; 3] = ["To Do", "In Progress", "Done"];

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: &'static str, value: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub database_url: Option<String>,
    pub bind: SocketAddr,
    pub pool_size: u32,
    /// Outbound queue length per realtime connection.
    pub broadcast_buffer: usize,
    /// Column titles seeded into every new project.
    pub default_columns: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: None,
            bind: SocketAddr::from(([127, 0, 0, 1], 37240)),
            pool_size: 10,
            broadcast_buffer: 64,
            default_columns: DEFAULT_COLUMNS.iter().map(|c| c.to_string()).collect(),
        }
    }
}

impl Config {
    /// Reads the process environment. Call `dotenv().ok()` first to pick up `.env`.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Config {
            database_url: lookup("DATABASE_URL").filter(|url| !url.trim().is_empty()),
            ..Default::default()
        };

        if let Some(value) = lookup("KANBAN_BIND") {
            config.bind = parse("KANBAN_BIND", &value)?;
        }
        if let Some(value) = lookup("KANBAN_POOL_SIZE") {
            config.pool_size = parse("KANBAN_POOL_SIZE", &value)?;
        }
        if let Some(value) = lookup("KANBAN_BROADCAST_BUFFER") {
            config.broadcast_buffer = parse("KANBAN_BROADCAST_BUFFER", &value)?;
        }
        if let Some(value) = lookup("KANBAN_DEFAULT_COLUMNS") {
            config.default_columns = value
                .split(',')
                .map(str::trim)
                .filter(|title| !title.is_empty())
                .map(String::from)
                .collect();
        }

        if config.pool_size == 0 {
            return Err(ConfigError::InvalidValue {
                key: "KANBAN_POOL_SIZE",
                value: "0".to_string(),
            });
        }
        Ok(config)
    }
}

fn parse<T: std::str::FromStr>(key: &'static str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key,
        value: value.to_string(),
    })
}
