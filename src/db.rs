use std::env;
use std::fmt::Formatter;

use diesel::pg::PgConnection;
use diesel::r2d2::ConnectionManager;
use dotenv::dotenv;
use log::info;

pub type Pool = r2d2::Pool<ConnectionManager<PgConnection>>;

pub const DEFAULT_DB_POOL_SIZE: u32 = 15;

const DATABASE_URL_VAR: &str = "DATABASE_URL";
const TEST_DATABASE_URL_VAR: &str = "TEST_DATABASE_URL";
const DATABASE_POOL_SIZE_VAR: &str = "DATABASE_POOL_SIZE";

embed_migrations!("./migrations");

#[derive(Debug)]
pub enum ConfigError {
    MissingVar(&'static str),
    InvalidPoolSize(String),
    Pool(r2d2::Error),
    Migration(diesel_migrations::RunMigrationsError),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        match self {
            ConfigError::MissingVar(name) => write!(f, "{} must be set", name),
            ConfigError::InvalidPoolSize(value) => {
                write!(f, "{} must be a positive integer, got `{}`", DATABASE_POOL_SIZE_VAR, value)
            },
            ConfigError::Pool(inner) => write!(f, "Failed to create db pool: {}", inner),
            ConfigError::Migration(inner) => write!(f, "Error while running migrations: {}", inner),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Pool(inner) => Some(inner),
            ConfigError::Migration(inner) => Some(inner),
            _ => None,
        }
    }
}

impl From<r2d2::Error> for ConfigError {
    fn from(error: r2d2::Error) -> Self {
        ConfigError::Pool(error)
    }
}

impl From<diesel_migrations::RunMigrationsError> for ConfigError {
    fn from(error: diesel_migrations::RunMigrationsError) -> Self {
        ConfigError::Migration(error)
    }
}

/// Connection settings, read from the environment (and `.env` if present).
#[derive(Debug, Clone, PartialEq)]
pub struct DbConfig {
    pub database_url: String,
    pub pool_size: u32,
}

impl DbConfig {
    pub fn from_env() -> Result<DbConfig, ConfigError> {
        Self::from_env_var(DATABASE_URL_VAR)
    }

    /// Same as `from_env` but pointing at `TEST_DATABASE_URL`.
    pub fn test_from_env() -> Result<DbConfig, ConfigError> {
        Self::from_env_var(TEST_DATABASE_URL_VAR)
    }

    fn from_env_var(url_var: &'static str) -> Result<DbConfig, ConfigError> {
        dotenv().ok();

        let database_url = env::var(url_var)
            .map_err(|_| ConfigError::MissingVar(url_var))?;

        let pool_size = match env::var(DATABASE_POOL_SIZE_VAR) {
            Ok(size) => parse_pool_size(&size)?,
            Err(_) => DEFAULT_DB_POOL_SIZE,
        };

        Ok(DbConfig { database_url, pool_size })
    }
}

fn parse_pool_size(value: &str) -> Result<u32, ConfigError> {
    match value.trim().parse::<u32>() {
        Ok(size) if size > 0 => Ok(size),
        _ => Err(ConfigError::InvalidPoolSize(value.to_owned())),
    }
}

pub fn init_connection_pool(config: &DbConfig) -> Result<Pool, ConfigError> {
    let manager = ConnectionManager::<PgConnection>::new(config.database_url.as_str());
    let pool = r2d2::Pool::builder()
        .max_size(config.pool_size)
        .build(manager)?;

    info!("Database pool ready (max size: {})", config.pool_size);
    Ok(pool)
}

pub fn init_test_connection_pool() -> Result<Pool, ConfigError> {
    let config = DbConfig::test_from_env()?;
    init_connection_pool(&config)
}

/// Applies the embedded migrations creating `signalement_adresse`.
pub fn run_migrations(pool: &Pool) -> Result<(), ConfigError> {
    let conn = pool.get()?;
    embedded_migrations::run(&*conn)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_size_must_be_a_positive_integer() {
        assert_eq!(parse_pool_size("20").unwrap(), 20);
        assert_eq!(parse_pool_size(" 4 ").unwrap(), 4);

        match parse_pool_size("0") {
            Err(ConfigError::InvalidPoolSize(value)) => assert_eq!(value, "0"),
            other => panic!("unexpected result: {:?}", other),
        }
        assert!(parse_pool_size("lots").is_err());
    }

    #[test]
    fn missing_var_names_the_variable() {
        let err = ConfigError::MissingVar(DATABASE_URL_VAR);
        assert_eq!(err.to_string(), "DATABASE_URL must be set");
    }
}
