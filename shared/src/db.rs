//! Database connection management.

use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions};
use std::time::Duration;
use tracing::info;

use crate::secrets::DatabaseCredentials;
use crate::{Config, Error, Result};

/// Connection options from config, letting the secret override host/port/name.
fn connect_options(config: &Config, creds: &DatabaseCredentials) -> PgConnectOptions {
    PgConnectOptions::new()
        .host(creds.host.as_deref().unwrap_or(&config.db_host))
        .port(creds.port.unwrap_or(config.db_port))
        .database(creds.dbname.as_deref().unwrap_or(&config.db_name))
        .username(&creds.username)
        .password(&creds.password)
}

/// Create a database connection pool.
pub async fn create_pool(config: &Config, creds: &DatabaseCredentials) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .acquire_timeout(Duration::from_secs(3))
        .connect_with(connect_options(config, creds))
        .await
        .map_err(Error::Database)?;

    info!("Connected to database {}", config.db_name);
    Ok(pool)
}

/// Resolve credentials from Secrets Manager and connect.
pub async fn connect_from_config(config: &Config) -> Result<PgPool> {
    let aws_config = aws_config::defaults(aws_config::BehaviorVersion::latest())
        .region(aws_config::Region::new(config.aws_region.clone()))
        .load()
        .await;
    let secrets_client = aws_sdk_secretsmanager::Client::new(&aws_config);

    let creds = crate::secrets::database_credentials(&secrets_client, &config.db_secret_arn).await?;
    create_pool(config, &creds).await
}
